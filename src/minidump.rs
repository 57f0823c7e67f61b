// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The top-level minidump reader.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use log::warn;
use memmap2::Mmap;
use scroll::Pread;

use minidump_common::format as md;

use crate::context::MinidumpContext;
use crate::error::{Error, Result};
use crate::exception::MinidumpException;
use crate::iostuff::{check_array_bounds, read_utf16_string, slice, Readable};
use crate::linux_streams::*;
use crate::memory::{MinidumpMemory, MinidumpMemoryList};
use crate::misc_info::MinidumpMiscInfo;
use crate::module::{CodeViewRecord, MinidumpModule, MinidumpModuleList, MinidumpUnloadedModule, MinidumpUnloadedModuleList};
use crate::system_info::{Cpu, Os, SystemInfo};
use crate::thread::{MinidumpThread, MinidumpThreadList};

/// A minidump file, either memory-mapped from disk or held as an
/// in-memory buffer. Every typed accessor parses its stream lazily and
/// returns `None` both when the stream is absent and when it's present
/// but malformed; a warning is logged in the latter case.
#[derive(Debug)]
pub struct Minidump<T: Readable> {
    data: T,
    header: md::MDRawHeader,
    streams: HashMap<u32, md::MDRawDirectory>,
}

impl<T: Readable> Minidump<T> {
    /// Parse a minidump already held in memory (an in-memory `Vec<u8>`, a
    /// memory-mapped file, a byte slice, ...).
    pub fn read(data: T) -> Result<Minidump<T>> {
        let bytes: &[u8] = &data;
        let header: md::MDRawHeader =
            bytes.pread_with(0, scroll::LE).map_err(|_| Error::Truncated {
                needed: std::mem::size_of::<md::MDRawHeader>(),
                available: bytes.len(),
            })?;
        if header.signature != md::MD_HEADER_SIGNATURE {
            return Err(Error::BadSignature);
        }

        let mut streams = HashMap::with_capacity(header.stream_count as usize);
        let dir_size = header.stream_count as usize * std::mem::size_of::<md::MDRawDirectory>();
        let dir_bytes = slice(bytes, header.stream_directory_rva, dir_size as u32)?;
        let mut offset = 0;
        for _ in 0..header.stream_count {
            let entry: md::MDRawDirectory = dir_bytes
                .gread_with(&mut offset, scroll::LE)
                .map_err(Error::ScrollError)?;
            streams.insert(entry.stream_type, entry);
        }

        Ok(Minidump {
            data,
            header,
            streams,
        })
    }

    /// The parsed minidump header.
    pub fn header(&self) -> &md::MDRawHeader {
        &self.header
    }

    /// All streams present in the directory, as `(stream_type, bytes)`
    /// pairs. Streams whose `rva`/`data_size` overrun the file are skipped
    /// with a warning rather than failing the whole iteration.
    pub fn streams(&self) -> impl Iterator<Item = (u32, &[u8])> {
        let bytes: &[u8] = &self.data;
        self.streams.values().filter_map(move |dir| {
            match slice(bytes, dir.rva, dir.data_size) {
                Ok(s) => Some((dir.stream_type, s)),
                Err(_) => {
                    warn!("stream {:#x} overruns the file, skipping", dir.stream_type);
                    None
                }
            }
        })
    }

    fn get_stream_slice(&self, stream_type: u32) -> Option<&[u8]> {
        let dir = self.streams.get(&stream_type)?;
        let bytes: &[u8] = &self.data;
        match slice(bytes, dir.rva, dir.data_size) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("stream {stream_type:#x}: {e}");
                None
            }
        }
    }

    /// The `SystemInfo` stream: OS and CPU that produced this dump.
    pub fn system_info(&self) -> Option<SystemInfo> {
        let bytes = self.get_stream_slice(md::MDStreamType::SystemInfo as u32)?;
        let raw: md::MDRawSystemInfo = bytes.pread_with(0, scroll::LE).ok()?;
        let os_version = if raw.csd_version_rva != 0 {
            read_utf16_string(&self.data, raw.csd_version_rva).ok()
        } else {
            None
        };
        Some(SystemInfo {
            os: Os::from_platform_id(raw.platform_id),
            os_version,
            cpu: Cpu::from_processor_architecture(raw.processor_architecture),
            cpu_info: None,
            cpu_count: raw.number_of_processors as usize,
        })
    }

    /// The `ModuleList` stream: every module mapped into the process.
    pub fn modules(&self) -> Option<MinidumpModuleList> {
        let bytes = self.get_stream_slice(md::MDStreamType::ModuleList as u32)?;
        let count: u32 = bytes.pread_with(0, scroll::LE).ok()?;
        let entry_size = std::mem::size_of::<md::MDRawModule>();
        check_array_bounds(bytes.len(), 4, count as usize, entry_size).ok()?;
        let mut offset = 4;
        let mut modules = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw: md::MDRawModule = bytes.gread_with(&mut offset, scroll::LE).ok()?;
            let name = read_utf16_string(&self.data, raw.module_name_rva).unwrap_or_default();
            let codeview_info = self.read_codeview(&raw.cv_record);
            modules.push(MinidumpModule::new(raw, name, codeview_info));
        }
        Some(MinidumpModuleList::new(modules))
    }

    fn read_codeview(&self, loc: &md::MDLocationDescriptor) -> Option<CodeViewRecord> {
        if loc.data_size == 0 {
            return None;
        }
        let bytes: &[u8] = &self.data;
        let cv_bytes = slice(bytes, loc.rva, loc.data_size).ok()?;
        let sig: u32 = cv_bytes.pread_with(0, scroll::LE).ok()?;
        if sig != md::MD_CVINFOPDB70_SIGNATURE {
            return None;
        }
        let header: md::MDCvInfoPdb70 = cv_bytes.pread_with(0, scroll::LE).ok()?;
        let name_bytes = &cv_bytes[std::mem::size_of::<md::MDCvInfoPdb70>()..];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let pdb_file_name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
        Some(CodeViewRecord {
            guid: header.signature,
            age: header.age,
            pdb_file_name,
        })
    }

    /// The `UnloadedModuleList` stream: modules unloaded before the crash.
    pub fn unloaded_modules(&self) -> Option<MinidumpUnloadedModuleList> {
        let bytes = self.get_stream_slice(md::MDStreamType::UnloadedModuleList as u32)?;
        let count: u32 = bytes.pread_with(0, scroll::LE).ok()?;
        let entry_size = std::mem::size_of::<md::MDRawUnloadedModule>();
        check_array_bounds(bytes.len(), 4, count as usize, entry_size).ok()?;
        let mut offset = 4;
        let mut modules = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw: md::MDRawUnloadedModule = bytes.gread_with(&mut offset, scroll::LE).ok()?;
            let name = read_utf16_string(&self.data, raw.module_name_rva).unwrap_or_default();
            modules.push(MinidumpUnloadedModule { raw, name });
        }
        Some(MinidumpUnloadedModuleList::new(modules))
    }

    /// The `ThreadList` stream.
    pub fn threads(&self) -> Option<MinidumpThreadList<'_>> {
        let bytes = self.get_stream_slice(md::MDStreamType::ThreadList as u32)?;
        let count: u32 = bytes.pread_with(0, scroll::LE).ok()?;
        let entry_size = std::mem::size_of::<md::MDRawThread>();
        check_array_bounds(bytes.len(), 4, count as usize, entry_size).ok()?;
        let mut offset = 4;
        let mut threads = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw: md::MDRawThread = bytes.gread_with(&mut offset, scroll::LE).ok()?;
            let context = self.read_context(&raw.thread_context);
            let stack = self.read_memory_descriptor(&raw.stack);
            threads.push(MinidumpThread {
                raw,
                context,
                stack,
                name: None,
            });
        }
        let mut list = MinidumpThreadList::new(threads);
        if let Some(names) = self.thread_names() {
            for thread in list.threads.iter_mut() {
                thread.name = names.get_name(thread.raw.thread_id).map(str::to_owned);
            }
        }
        Some(list)
    }

    fn read_context(&self, loc: &md::MDLocationDescriptor) -> Option<MinidumpContext> {
        if loc.data_size == 0 {
            return None;
        }
        let bytes: &[u8] = &self.data;
        let ctx_bytes = slice(bytes, loc.rva, loc.data_size).ok()?;
        MinidumpContext::read(ctx_bytes, scroll::LE).ok()
    }

    fn read_memory_descriptor(&self, desc: &md::MDMemoryDescriptor) -> Option<MinidumpMemory<'_>> {
        if desc.memory.data_size == 0 {
            return None;
        }
        let bytes: &[u8] = &self.data;
        let region_bytes = slice(bytes, desc.memory.rva, desc.memory.data_size).ok()?;
        Some(MinidumpMemory {
            base_address: desc.start_of_memory_range,
            size: desc.memory.data_size as u64,
            bytes: region_bytes,
        })
    }

    /// The `MemoryList` stream: memory regions addressed by RVA.
    pub fn memory_list(&self) -> Option<MinidumpMemoryList<'_>> {
        let bytes = self.get_stream_slice(md::MDStreamType::MemoryList as u32)?;
        let count: u32 = bytes.pread_with(0, scroll::LE).ok()?;
        let entry_size = std::mem::size_of::<md::MDMemoryDescriptor>();
        check_array_bounds(bytes.len(), 4, count as usize, entry_size).ok()?;
        let mut offset = 4;
        let mut regions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let desc: md::MDMemoryDescriptor = bytes.gread_with(&mut offset, scroll::LE).ok()?;
            if let Some(mem) = self.read_memory_descriptor(&desc) {
                regions.push(mem);
            }
        }
        Some(MinidumpMemoryList::new(regions))
    }

    /// The `Memory64List` stream: memory regions whose bytes are packed
    /// contiguously after the header, addressed only by running total.
    pub fn memory64_list(&self) -> Option<MinidumpMemoryList<'_>> {
        let bytes = self.get_stream_slice(md::MDStreamType::Memory64List as u32)?;
        let header: md::MDRawMemory64ListHeader = bytes.pread_with(0, scroll::LE).ok()?;
        let entry_size = std::mem::size_of::<md::MDMemoryDescriptor64>();
        check_array_bounds(
            bytes.len(),
            16,
            header.number_of_memory_ranges as usize,
            entry_size,
        )
        .ok()?;
        let mut offset = 16;
        let mut rva = header.base_rva as u32;
        let file_bytes: &[u8] = &self.data;
        let mut regions = Vec::with_capacity(header.number_of_memory_ranges as usize);
        for _ in 0..header.number_of_memory_ranges {
            let desc: md::MDMemoryDescriptor64 = bytes.gread_with(&mut offset, scroll::LE).ok()?;
            if let Ok(region_bytes) = slice(file_bytes, rva, desc.data_size as u32) {
                regions.push(MinidumpMemory {
                    base_address: desc.start_of_memory_range,
                    size: desc.data_size,
                    bytes: region_bytes,
                });
            }
            rva = rva.wrapping_add(desc.data_size as u32);
        }
        Some(MinidumpMemoryList::new(regions))
    }

    /// Look up the memory region containing `address`, checking the
    /// `MemoryList` stream first and falling back to `Memory64List`.
    pub fn get_memory(&self, address: u64) -> Option<MinidumpMemory<'_>> {
        if let Some(list) = self.memory_list() {
            if let Some(region) = list.memory_at_address(address) {
                return Some(MinidumpMemory {
                    base_address: region.base_address,
                    size: region.size,
                    bytes: region.bytes,
                });
            }
        }
        let list = self.memory64_list()?;
        list.memory_at_address(address).map(|region| MinidumpMemory {
            base_address: region.base_address,
            size: region.size,
            bytes: region.bytes,
        })
    }

    /// The `Exception` stream: why and where the process crashed.
    pub fn exception(&self) -> Option<MinidumpException> {
        let bytes = self.get_stream_slice(md::MDStreamType::Exception as u32)?;
        let raw: md::MDRawExceptionStream = bytes.pread_with(0, scroll::LE).ok()?;
        let context = self.read_context(&raw.thread_context);
        Some(MinidumpException {
            thread_id: raw.thread_id,
            raw,
            context,
        })
    }

    /// The `MiscInfo` stream. Only the v1 prefix is guaranteed; later
    /// fields are read field-by-field by the caller per `flags1`.
    pub fn misc_info(&self) -> Option<MinidumpMiscInfo> {
        let bytes = self.get_stream_slice(md::MDStreamType::MiscInfo as u32)?;
        if bytes.len() < std::mem::size_of::<md::MDRawMiscInfo>() {
            return None;
        }
        let raw: md::MDRawMiscInfo = bytes.pread_with(0, scroll::LE).ok()?;
        Some(MinidumpMiscInfo::new(raw))
    }

    /// The Breakpad-specific `BreakpadInfo` stream.
    pub fn breakpad_info(&self) -> Option<MinidumpBreakpadInfo> {
        let bytes = self.get_stream_slice(md::MDStreamType::BreakpadInfo as u32)?;
        let raw: md::MDRawBreakpadInfo = bytes.pread_with(0, scroll::LE).ok()?;
        Some(MinidumpBreakpadInfo::new(raw))
    }

    /// `/proc/<pid>/maps` at crash time, verbatim.
    pub fn linux_maps(&self) -> Option<LinuxMaps> {
        let bytes = self.get_stream_slice(md::MDStreamType::LinuxMaps as u32)?;
        Some(LinuxMaps(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// `/proc/cpuinfo` at crash time, verbatim.
    pub fn linux_cpu_info(&self) -> Option<LinuxCpuInfo> {
        let bytes = self.get_stream_slice(md::MDStreamType::LinuxCpuInfo as u32)?;
        Some(LinuxCpuInfo(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// `/proc/<pid>/status` at crash time, verbatim.
    pub fn linux_proc_status(&self) -> Option<LinuxProcStatus> {
        let bytes = self.get_stream_slice(md::MDStreamType::LinuxProcStatus as u32)?;
        Some(LinuxProcStatus(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// `/etc/lsb-release` at crash time, verbatim.
    pub fn linux_lsb_release(&self) -> Option<LinuxLsbRelease> {
        let bytes = self.get_stream_slice(md::MDStreamType::LinuxLsbRelease as u32)?;
        Some(LinuxLsbRelease(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// `/proc/<pid>/cmdline` at crash time.
    pub fn linux_cmd_line(&self) -> Option<LinuxCmdLine> {
        let bytes = self.get_stream_slice(md::MDStreamType::LinuxCmdLine as u32)?;
        Some(LinuxCmdLine::from_bytes(bytes))
    }

    /// `/proc/<pid>/environ` at crash time.
    pub fn linux_environ(&self) -> Option<LinuxEnviron> {
        let bytes = self.get_stream_slice(md::MDStreamType::LinuxEnviron as u32)?;
        Some(LinuxEnviron::from_bytes(bytes))
    }

    /// `/proc/<pid>/auxv` at crash time, raw.
    pub fn linux_auxv(&self) -> Option<LinuxAuxv> {
        let bytes = self.get_stream_slice(md::MDStreamType::LinuxAuxv as u32)?;
        Some(LinuxAuxv(bytes.to_vec()))
    }

    /// The Crashpad-specific `CrashpadInfo` annotations stream.
    ///
    /// Crashpad's own on-disk layout for the annotation maps is more
    /// elaborate than is worth reproducing here; this returns an empty
    /// set of annotations when the stream is present but not parseable.
    pub fn crashpad_info(&self) -> Option<crate::linux_streams::MinidumpCrashpadInfo> {
        self.get_stream_slice(md::MDStreamType::CrashpadInfo as u32)?;
        Some(crate::linux_streams::MinidumpCrashpadInfo::default())
    }

    /// The `HandleData` stream.
    pub fn handle_data(&self) -> Option<MinidumpHandleDataStream> {
        let bytes = self.get_stream_slice(md::MDStreamType::HandleData as u32)?;
        let header: md::MDRawHandleDataStream = bytes.pread_with(0, scroll::LE).ok()?;
        let mut handles = Vec::with_capacity(header.number_of_descriptors as usize);
        let mut offset = header.size_of_header as usize;
        for _ in 0..header.number_of_descriptors {
            if offset.checked_add(8).is_none_or(|end| end > bytes.len()) {
                break;
            }
            let handle: u64 = bytes.pread_with(offset, scroll::LE).ok()?;
            handles.push(MinidumpHandleDescriptor {
                handle,
                type_name: None,
            });
            offset += header.size_of_descriptor as usize;
        }
        Some(MinidumpHandleDataStream { handles })
    }

    /// The `ThreadNames` stream.
    pub fn thread_names(&self) -> Option<MinidumpThreadNames> {
        let bytes = self.get_stream_slice(md::MDStreamType::ThreadNames as u32)?;
        let count: u32 = bytes.pread_with(0, scroll::LE).ok()?;
        let entry_size = std::mem::size_of::<md::MDRawThreadName>();
        check_array_bounds(bytes.len(), 4, count as usize, entry_size).ok()?;
        let mut offset = 4;
        let mut names = std::collections::BTreeMap::new();
        for _ in 0..count {
            let raw: md::MDRawThreadName = bytes.gread_with(&mut offset, scroll::LE).ok()?;
            if let Ok(name) = read_utf16_string(&self.data, raw.thread_name_rva as u32) {
                names.insert(raw.thread_id, name);
            }
        }
        Some(MinidumpThreadNames { names })
    }

    /// The `AssertionInfo` stream.
    pub fn assertion(&self) -> Option<MinidumpAssertion> {
        let bytes = self.get_stream_slice(md::MDStreamType::AssertionInfo as u32)?;
        let raw: md::MDRawAssertionInfo = bytes.pread_with(0, scroll::LE).ok()?;
        Some(MinidumpAssertion::new(&raw))
    }
}

impl Minidump<Mmap> {
    /// Memory-map a minidump file from disk.
    pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Minidump<Mmap>> {
        let file = File::open(path).map_err(|_| Error::BadSignature)?;
        let mmap = unsafe { Mmap::map(&file).map_err(|_| Error::BadSignature)? };
        Minidump::read(mmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth_minidump::{append_utf16_string, SynthMinidump};
    use minidump_common::traits::Module;
    use scroll::Pwrite;

    fn system_info_bytes(platform_id: u32, arch: u16, cpu_count: u8) -> Vec<u8> {
        let raw = md::MDRawSystemInfo {
            processor_architecture: arch,
            processor_level: 0,
            processor_revision: 0,
            number_of_processors: cpu_count,
            product_type: 0,
            major_version: 0,
            minor_version: 0,
            build_number: 0,
            platform_id,
            csd_version_rva: 0,
            suite_mask: 0,
            reserved2: 0,
            cpu: md::MDCpuInformation { data: [0; 6] },
        };
        let mut bytes = vec![0u8; std::mem::size_of::<md::MDRawSystemInfo>()];
        bytes.pwrite_with(raw, 0, scroll::LE).unwrap();
        bytes
    }

    #[test]
    fn reads_system_info_stream() {
        let dump_bytes = SynthMinidump::new()
            .add_stream(
                md::MDStreamType::SystemInfo as u32,
                system_info_bytes(0x8201, 0x8002, 4),
            )
            .finish();
        let dump = Minidump::read(dump_bytes).unwrap();
        let info = dump.system_info().unwrap();
        assert_eq!(info.os, Os::Linux);
        assert_eq!(info.cpu, Cpu::Arm64);
        assert_eq!(info.cpu_count, 4);
    }

    #[test]
    fn reads_module_list_with_name() {
        // `SynthMinidump::finish` places this (only) stream right after the
        // header and its one directory entry, and within the stream the
        // module struct follows a 4-byte count prefix, with the name bytes
        // appended right after it; compute the file-absolute rva up front
        // so `raw.module_name_rva` can be set directly.
        let stream_base = std::mem::size_of::<md::MDRawHeader>() + std::mem::size_of::<md::MDRawDirectory>();
        let module_name_rva =
            (stream_base + 4 + std::mem::size_of::<md::MDRawModule>()) as u32;
        let mut names = Vec::new();
        append_utf16_string(&mut names, "libfoo.so");
        let raw = md::MDRawModule {
            base_of_image: 0x1000,
            size_of_image: 0x2000,
            checksum: 0,
            time_date_stamp: 0x1234_5678,
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
                data_size: 0,
                rva: 0,
            },
            misc_record: md::MDLocationDescriptor {
                data_size: 0,
                rva: 0,
            },
            reserved0: [0; 2],
            reserved1: [0; 2],
        };
        let mut module_stream = vec![0u8; 4];
        module_stream.pwrite_with(1u32, 0, scroll::LE).unwrap();
        let offset = module_stream.len();
        module_stream.resize(offset + std::mem::size_of::<md::MDRawModule>(), 0);
        module_stream.pwrite_with(raw, offset, scroll::LE).unwrap();
        module_stream.extend_from_slice(&names);

        let dump_bytes = SynthMinidump::new()
            .add_stream(md::MDStreamType::ModuleList as u32, module_stream)
            .finish();
        let dump = Minidump::read(dump_bytes).unwrap();
        let modules = dump.modules().unwrap();
        let module = modules.main_module().unwrap();
        assert_eq!(module.name, "libfoo.so");
        assert_eq!(module.code_identifier(), "123456782000");
    }

    #[test]
    fn rejects_truncated_header() {
        let data = vec![0u8; 4];
        assert!(Minidump::read(data).is_err());
    }
}
