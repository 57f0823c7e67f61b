//! ARM and ARM64 unwinding.

use breakpad_symbols::{FrameWalker, SymbolProvider};
use minidump::{MinidumpContext, MinidumpMemory, MinidumpModuleList, MinidumpRawContext};

use super::{instruction_seems_valid, pointer_width, ContextExt, UnwindOptions};
use crate::process_state::{FrameTrust, StackFrame};

/// ARM64's pointer authentication may tag the top bits of a return address
/// stored in a register; mask them off before treating the value as code.
/// The low 48 bits are the real virtual address on every platform this
/// crate targets.
const PAC_MASK: u64 = 0x0000_ffff_ffff_ffff;

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

    if let Some(frame) = frame_pointer_unwind(callee, stack_memory, modules, symbol_provider) {
        return Some(frame);
    }

    if options.allow_scan {
        if let Some(frame) =
            super::scan::scan_for_caller(callee, stack_memory, modules, symbol_provider, 0)
        {
            return Some(frame);
        }
    }

    None
}

struct ArmFrameWalker<'a> {
    callee: &'a StackFrame,
    grand_callee: Option<&'a StackFrame>,
    stack_memory: Option<&'a MinidumpMemory<'a>>,
    caller_context: MinidumpContext,
}

impl<'a> FrameWalker for ArmFrameWalker<'a> {
    fn get_instruction(&self) -> u64 {
        self.callee.instruction
    }

    fn get_grand_callee_parameter_size(&self) -> Option<u32> {
        self.grand_callee.and_then(|f| f.parameter_size)
    }

    fn get_register_at_address(&self, address: u64) -> Option<u64> {
        let mem = self.stack_memory?;
        if pointer_width(&self.callee.context.raw) == 4 {
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
        self.set_caller_register(ip_reg, strip_pac(value))
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
    let mut walker = ArmFrameWalker {
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

/// ARM64 always saves FP/LR as a pair at `[fp]`/`[fp+word]`, same shape as
/// x86. 32-bit ARM is ambiguous about which register holds the frame
/// pointer: R11 under the AAPCS, R7 under Thumb-heavy toolchains (notably
/// Android NDK builds). Try the link register first when this is the
/// topmost frame, since it already holds the return address without
/// needing to touch memory at all.
fn frame_pointer_unwind(
    callee: &StackFrame,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
) -> Option<StackFrame> {
    if callee.trust == FrameTrust::Context {
        if let Some(frame) = link_register_unwind(callee, modules, symbol_provider) {
            return Some(frame);
        }
    }

    let stack_memory = stack_memory?;
    let ptr_width = pointer_width(&callee.context.raw);
    let is_arm64 = matches!(
        callee.context.raw,
        MinidumpRawContext::Arm64(_) | MinidumpRawContext::OldArm64(_)
    );

    let fp_candidates: &[&str] = if is_arm64 {
        &["x29"]
    } else {
        &["r11", "r7"]
    };

    for fp_reg in fp_candidates {
        let Some(fp) = callee.context.get_register(fp_reg) else {
            continue;
        };
        if fp == 0 {
            continue;
        }

        let (caller_fp, caller_ra) = if ptr_width == 4 {
            let caller_fp: Option<u32> = stack_memory.get_memory_at_address(fp);
            let caller_ra: Option<u32> = stack_memory.get_memory_at_address(fp + ptr_width);
            match (caller_fp, caller_ra) {
                (Some(fp), Some(ra)) => (fp as u64, ra as u64),
                _ => continue,
            }
        } else {
            let caller_fp: Option<u64> = stack_memory.get_memory_at_address(fp);
            let caller_ra: Option<u64> = stack_memory.get_memory_at_address(fp + ptr_width);
            match (caller_fp, caller_ra) {
                (Some(fp), Some(ra)) => (fp, ra),
                _ => continue,
            }
        };

        let caller_ra = strip_pac(caller_ra);
        if caller_ra == 0 || !instruction_seems_valid(caller_ra, modules, symbol_provider) {
            continue;
        }

        let mut caller_context = callee.context.empty_context_like();
        let ip_reg = caller_context.instruction_pointer_register_name();
        caller_context.set_register(ip_reg, caller_ra)?;
        caller_context.set_register(fp_reg, caller_fp)?;
        let sp_reg = caller_context.stack_pointer_register_name();
        caller_context.set_register(sp_reg, fp + 2 * ptr_width)?;

        return Some(StackFrame::from_context(caller_context, FrameTrust::FramePointer));
    }

    None
}

fn link_register_unwind(
    callee: &StackFrame,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
) -> Option<StackFrame> {
    let lr_reg = callee.context.link_register_name()?;
    let lr = strip_pac(callee.context.get_register(lr_reg)?);
    if lr == 0 || !instruction_seems_valid(lr, modules, symbol_provider) {
        return None;
    }

    let mut caller_context = callee.context.empty_context_like();
    let ip_reg = caller_context.instruction_pointer_register_name();
    caller_context.set_register(ip_reg, lr)?;
    let sp_reg = callee.context.stack_pointer_register_name();
    let sp = callee.context.get_register(sp_reg)?;
    caller_context.set_register(sp_reg, sp)?;

    Some(StackFrame::from_context(caller_context, FrameTrust::FramePointer))
}

fn strip_pac(address: u64) -> u64 {
    address & PAC_MASK
}
