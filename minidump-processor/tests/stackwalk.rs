//! End-to-end test: build a minidump byte-for-byte, parse it, and walk its
//! one thread's stack with no symbols available, exercising the
//! frame-pointer unwind fallback all the way from `process_minidump`.

use minidump::{format as md, Minidump};
use scroll::Pwrite;

use breakpad_symbols::{SimpleSymbolSupplier, Symbolizer};
use minidump_processor::{process_minidump_with_options, FrameTrust, ProcessorOptions};

const HEADER_SIZE: usize = std::mem::size_of::<md::MDRawHeader>();
const DIR_ENTRY_SIZE: usize = std::mem::size_of::<md::MDRawDirectory>();

/// Appends a length-prefixed UTF-16LE `MINIDUMP_STRING` to `bytes` and
/// returns its offset within `bytes`, matching the layout `minidump`'s own
/// reader expects (a 4-byte length in bytes followed by the UTF-16 units).
fn append_utf16_string(bytes: &mut Vec<u8>, s: &str) -> u32 {
    let rva = bytes.len() as u32;
    let units: Vec<u16> = s.encode_utf16().collect();
    let len_bytes = (units.len() * 2) as u32;
    let mut offset = bytes.len();
    bytes.resize(offset + 4, 0);
    bytes.pwrite_with(len_bytes, offset, scroll::LE).unwrap();
    offset += 4;
    for unit in units {
        bytes.resize(offset + 2, 0);
        bytes.pwrite_with(unit, offset, scroll::LE).unwrap();
        offset += 2;
    }
    rva
}

/// Lays out a minidump header, directory, and stream bodies back-to-back,
/// the way every real minidump writer does.
fn finish_dump(streams: Vec<(u32, Vec<u8>)>) -> Vec<u8> {
    let mut offset = HEADER_SIZE + DIR_ENTRY_SIZE * streams.len();
    let mut directory = Vec::new();
    let mut body = Vec::new();
    for (stream_type, bytes) in &streams {
        let dir = md::MDRawDirectory {
            stream_type: *stream_type,
            data_size: bytes.len() as u32,
            rva: offset as u32,
        };
        let mut dir_bytes = vec![0u8; DIR_ENTRY_SIZE];
        dir_bytes.pwrite_with(dir, 0, scroll::LE).unwrap();
        directory.extend_from_slice(&dir_bytes);
        body.extend_from_slice(bytes);
        offset += bytes.len();
    }
    let header = md::MDRawHeader {
        signature: md::MD_HEADER_SIGNATURE,
        version: md::MD_HEADER_VERSION,
        stream_count: streams.len() as u32,
        stream_directory_rva: HEADER_SIZE as u32,
        checksum: 0,
        time_date_stamp: 0,
        flags: 0,
    };
    let mut out = vec![0u8; HEADER_SIZE];
    out.pwrite_with(header, 0, scroll::LE).unwrap();
    out.extend(directory);
    out.extend(body);
    out
}

fn system_info_bytes() -> Vec<u8> {
    let raw = md::MDRawSystemInfo {
        processor_architecture: md::ProcessorArchitecture::X86 as u16,
        processor_level: 0,
        processor_revision: 0,
        number_of_processors: 1,
        product_type: 0,
        major_version: 0,
        minor_version: 0,
        build_number: 0,
        platform_id: md::PlatformId::Linux as u32,
        csd_version_rva: 0,
        suite_mask: 0,
        reserved2: 0,
        cpu: md::MDCpuInformation { data: [0; 6] },
    };
    let mut bytes = vec![0u8; std::mem::size_of::<md::MDRawSystemInfo>()];
    bytes.pwrite_with(raw, 0, scroll::LE).unwrap();
    bytes
}

fn x86_context_bytes(eip: u32, esp: u32, ebp: u32) -> Vec<u8> {
    let raw = md::CONTEXT_X86 {
        context_flags: md::ContextFlagsCpu::CONTEXT_X86.bits(),
        dr0: 0,
        dr1: 0,
        dr2: 0,
        dr3: 0,
        dr6: 0,
        dr7: 0,
        float_save: [0; 112],
        gs: 0,
        fs: 0,
        es: 0,
        ds: 0,
        edi: 0,
        esi: 0,
        ebx: 0,
        edx: 0,
        ecx: 0,
        eax: 0,
        ebp,
        eip,
        cs: 0,
        eflags: 0,
        esp,
        ss: 0,
        extended_registers: [0; 512],
    };
    let mut bytes = vec![0u8; std::mem::size_of::<md::CONTEXT_X86>()];
    bytes.pwrite_with(raw, 0, scroll::LE).unwrap();
    bytes
}

/// Builds a minidump with one x86 module, one thread whose context points
/// into it, and a stack region holding a single saved-ebp/return-address
/// pair so the frame-pointer walker can recover exactly one caller frame.
fn build_dump() -> Vec<u8> {
    let module_base: u64 = 0x1000;
    let module_size: u32 = 0x2000;
    let crash_eip: u32 = 0x1010;
    let caller_ra: u32 = 0x1020;
    let stack_base: u64 = 0x2000_0000;
    let esp: u32 = stack_base as u32 + 0x10;
    let ebp: u32 = stack_base as u32 + 0x20;

    let num_streams = 3; // SystemInfo, ModuleList, ThreadList
    let stream_base = HEADER_SIZE + DIR_ENTRY_SIZE * num_streams;

    let system_info = system_info_bytes();

    // ModuleList stream: count(4) + MDRawModule + name bytes + a CodeView
    // PDB70 record, so the module has a debug identifier the symbolizer
    // can key its not-found bookkeeping on.
    let module_offset = stream_base + system_info.len();
    let module_name_rva = (module_offset + 4 + std::mem::size_of::<md::MDRawModule>()) as u32;
    let mut module_names = Vec::new();
    append_utf16_string(&mut module_names, "libcrash.so");

    let cv_rva = module_name_rva + module_names.len() as u32;
    let pdb_name = b"libcrash.so.dbg\0";
    let cv_record_raw = md::MDCvInfoPdb70 {
        cv_signature: md::MD_CVINFOPDB70_SIGNATURE,
        signature: [0xAB; 16],
        age: 1,
    };
    let mut cv_bytes = vec![0u8; std::mem::size_of::<md::MDCvInfoPdb70>()];
    cv_bytes.pwrite_with(cv_record_raw, 0, scroll::LE).unwrap();
    cv_bytes.extend_from_slice(pdb_name);

    let raw_module = md::MDRawModule {
        base_of_image: module_base,
        size_of_image: module_size,
        checksum: 0,
        time_date_stamp: 0,
        module_name_rva,
        version_info: md::MDVSFixedFileInfo {
            signature: 0,
            struct_version: 0,
            file_version_hi: 0,
            file_version_lo: 0,
            product_version_hi: 0,
            product_version_lo: 0,
            file_flags_mask: 0,
            file_flags: 0,
            file_os: 0,
            file_type: 0,
            file_subtype: 0,
            file_date_hi: 0,
            file_date_lo: 0,
        },
        cv_record: md::MDLocationDescriptor {
            data_size: cv_bytes.len() as u32,
            rva: cv_rva,
        },
        misc_record: md::MDLocationDescriptor { data_size: 0, rva: 0 },
        reserved0: [0; 2],
        reserved1: [0; 2],
    };
    let mut module_stream = vec![0u8; 4];
    module_stream.pwrite_with(1u32, 0, scroll::LE).unwrap();
    let offset = module_stream.len();
    module_stream.resize(offset + std::mem::size_of::<md::MDRawModule>(), 0);
    module_stream.pwrite_with(raw_module, offset, scroll::LE).unwrap();
    module_stream.extend_from_slice(&module_names);
    module_stream.extend_from_slice(&cv_bytes);

    // ThreadList stream: count(4) + MDRawThread, with the context and
    // stack memory bytes appended right after it.
    let thread_offset = stream_base + system_info.len() + module_stream.len();
    let context_bytes = x86_context_bytes(crash_eip, esp, ebp);
    let context_local_offset = 4 + std::mem::size_of::<md::MDRawThread>();
    let context_rva = (thread_offset + context_local_offset) as u32;

    let mut stack_bytes = vec![0u8; 0x40];
    // [ebp] = saved ebp (0, so the next unwind stops); [ebp + 4] = return address.
    let ebp_local = (ebp as u64 - stack_base) as usize;
    stack_bytes.pwrite_with(0u32, ebp_local, scroll::LE).unwrap();
    stack_bytes
        .pwrite_with(caller_ra, ebp_local + 4, scroll::LE)
        .unwrap();
    let stack_local_offset = context_local_offset + context_bytes.len();
    let stack_rva = (thread_offset + stack_local_offset) as u32;

    let raw_thread = md::MDRawThread {
        thread_id: 1,
        suspend_count: 0,
        priority_class: 0,
        priority: 0,
        teb: 0,
        stack: md::MDMemoryDescriptor {
            start_of_memory_range: stack_base,
            memory: md::MDLocationDescriptor {
                data_size: stack_bytes.len() as u32,
                rva: stack_rva,
            },
        },
        thread_context: md::MDLocationDescriptor {
            data_size: context_bytes.len() as u32,
            rva: context_rva,
        },
    };
    let mut thread_stream = vec![0u8; 4];
    thread_stream.pwrite_with(1u32, 0, scroll::LE).unwrap();
    let offset = thread_stream.len();
    thread_stream.resize(offset + std::mem::size_of::<md::MDRawThread>(), 0);
    thread_stream
        .pwrite_with(raw_thread, offset, scroll::LE)
        .unwrap();
    thread_stream.extend_from_slice(&context_bytes);
    thread_stream.extend_from_slice(&stack_bytes);

    finish_dump(vec![
        (md::MDStreamType::SystemInfo as u32, system_info),
        (md::MDStreamType::ModuleList as u32, module_stream),
        (md::MDStreamType::ThreadList as u32, thread_stream),
    ])
}

#[test]
fn walks_frame_pointer_chain_with_no_symbols() {
    let dump_bytes = build_dump();
    let dump = Minidump::read(dump_bytes).unwrap();

    let symbolizer = Symbolizer::new(SimpleSymbolSupplier::new(Vec::new()));
    let mut options = ProcessorOptions::default();
    options.allow_scan = false;
    let state = process_minidump_with_options(&dump, &symbolizer, options).unwrap();

    assert_eq!(state.threads.len(), 1);
    let stack = &state.threads[0];
    assert_eq!(stack.frames.len(), 2);

    assert_eq!(stack.frames[0].trust, FrameTrust::Context);
    assert_eq!(stack.frames[0].instruction, 0x1010);

    assert_eq!(stack.frames[1].trust, FrameTrust::FramePointer);
    // The caller's frame records the return address itself, matching
    // the convention that every frame but the innermost points just past
    // the call instruction that produced it.
    assert_eq!(stack.frames[1].instruction, 0x1020);

    assert_eq!(
        state.modules_without_symbols,
        vec!["libcrash.so".to_string()]
    );

    // No exception stream and no BreakpadInfo stream means there is no
    // requesting thread to report a crash for, regardless of the threads
    // that were successfully unwound.
    assert_eq!(state.status, minidump_processor::ProcessStateStatus::NoCrashContext);
}
