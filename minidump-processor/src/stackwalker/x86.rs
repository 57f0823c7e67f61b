//! x86 and amd64 unwinding.
//!
//! CFI and `STACK WIN` are both handled inside `Symbolizer::walk_frame`
//! (CFI first, falling back to evaluating a `STACK WIN` program string when
//! no CFI rule covers the address), so both show up here as a single
//! `symbol_provider.walk_frame` call. What's specific to this architecture
//! is the frame-pointer and scan fallbacks that follow it.

use breakpad_symbols::{FrameWalker, SymbolProvider};
use minidump::{MinidumpContext, MinidumpMemory, MinidumpModuleList, MinidumpRawContext};

use super::{instruction_seems_valid, scan, ContextExt, UnwindOptions};
use crate::process_state::{FrameTrust, StackFrame};

/// amd64's SysV ABI reserves 128 bytes below RSP (the "red zone") that a
/// leaf function may use without adjusting the stack pointer; a plain scan
/// starting at RSP would miss a return address stashed there.
const AMD64_RED_ZONE: u64 = 128;

pub fn get_caller_frame(
    callee: &StackFrame,
    grand_callee: Option<&StackFrame>,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
    options: &UnwindOptions,
) -> Option<StackFrame> {
    if let Some(frame) = cfi_unwind(callee, grand_callee, stack_memory, modules, symbol_provider) {
        return Some(frame);
    }

    let is_amd64 = matches!(callee.context.raw, MinidumpRawContext::Amd64(_));
    if !is_amd64 || options.amd64_use_fp {
        if let Some(frame) = frame_pointer_unwind(callee, stack_memory, modules, symbol_provider) {
            return Some(frame);
        }
    }

    if options.allow_scan {
        let skip_words = if is_amd64 {
            AMD64_RED_ZONE / super::pointer_width(&callee.context.raw)
        } else {
            0
        };
        if let Some(frame) =
            scan::scan_for_caller(callee, stack_memory, modules, symbol_provider, skip_words)
        {
            return Some(frame);
        }
    }

    None
}

struct X86FrameWalker<'a> {
    callee: &'a StackFrame,
    grand_callee: Option<&'a StackFrame>,
    stack_memory: Option<&'a MinidumpMemory<'a>>,
    caller_context: MinidumpContext,
}

impl<'a> FrameWalker for X86FrameWalker<'a> {
    fn get_instruction(&self) -> u64 {
        self.callee.instruction
    }

    fn get_grand_callee_parameter_size(&self) -> Option<u32> {
        self.grand_callee.and_then(|f| f.parameter_size)
    }

    fn get_register_at_address(&self, address: u64) -> Option<u64> {
        let mem = self.stack_memory?;
        if super::pointer_width(&self.callee.context.raw) == 4 {
            mem.get_memory_at_address::<u32>(address).map(u64::from)
        } else {
            mem.get_memory_at_address::<u64>(address)
        }
    }

    fn get_callee_register(&self, name: &str) -> Option<u64> {
        self.callee.context.get_register(name)
    }

    fn set_caller_register(&mut self, name: &str, value: u64) -> Option<()> {
        self.caller_context.set_register(name, value)
    }

    fn clear_caller_register(&mut self, _name: &str) {}

    fn set_cfa(&mut self, value: u64) -> Option<()> {
        let sp_reg = self.caller_context.stack_pointer_register_name();
        self.set_caller_register(sp_reg, value)
    }

    fn set_ra(&mut self, value: u64) -> Option<()> {
        let ip_reg = self.caller_context.instruction_pointer_register_name();
        self.set_caller_register(ip_reg, value)
    }
}

fn cfi_unwind(
    callee: &StackFrame,
    grand_callee: Option<&StackFrame>,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
) -> Option<StackFrame> {
    let module = modules.module_at_address(callee.instruction)?;
    let mut walker = X86FrameWalker {
        callee,
        grand_callee,
        stack_memory,
        caller_context: callee.context.empty_context_like(),
    };
    symbol_provider.walk_frame(module, &mut walker)?;

    let sp_reg = walker.caller_context.stack_pointer_register_name();
    let ip_reg = walker.caller_context.instruction_pointer_register_name();
    if walker.caller_context.get_register(sp_reg).is_none()
        || walker.caller_context.get_register(ip_reg).is_none()
    {
        return None;
    }

    Some(StackFrame::from_context(walker.caller_context, FrameTrust::CallFrameInfo))
}

/// `[fp]` holds the caller's saved EBP/RBP, `[fp+word]` the return address.
fn frame_pointer_unwind(
    callee: &StackFrame,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
) -> Option<StackFrame> {
    let stack_memory = stack_memory?;
    let fp_reg = callee.context.frame_pointer_register_name()?;
    let fp = callee.context.get_register(fp_reg)?;
    if fp == 0 {
        return None;
    }

    let ptr_width = super::pointer_width(&callee.context.raw);
    let (caller_fp, caller_ra) = if ptr_width == 4 {
        let caller_fp: u32 = stack_memory.get_memory_at_address(fp)?;
        let caller_ra: u32 = stack_memory.get_memory_at_address(fp + ptr_width)?;
        (caller_fp as u64, caller_ra as u64)
    } else {
        let caller_fp: u64 = stack_memory.get_memory_at_address(fp)?;
        let caller_ra: u64 = stack_memory.get_memory_at_address(fp + ptr_width)?;
        (caller_fp, caller_ra)
    };

    if caller_ra == 0 || !instruction_seems_valid(caller_ra, modules, symbol_provider) {
        return None;
    }

    let mut caller_context = callee.context.empty_context_like();
    let ip_reg = caller_context.instruction_pointer_register_name();
    caller_context.set_register(ip_reg, caller_ra)?;
    caller_context.set_register(fp_reg, caller_fp)?;
    let sp_reg = caller_context.stack_pointer_register_name();
    caller_context.set_register(sp_reg, fp + 2 * ptr_width)?;

    Some(StackFrame::from_context(caller_context, FrameTrust::FramePointer))
}
