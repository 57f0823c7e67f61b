//! Turning a thread's raw context and stack memory into a sequence of
//! `StackFrame`s.
//!
//! Each frame is resolved in order, cheapest and most trustworthy strategy
//! first: call frame information, then (x86 only) `STACK WIN` data, then a
//! frame-pointer walk, then a last-resort scan of the stack for something
//! that looks like a return address. The first strategy that produces a
//! plausible caller becomes that frame's `trust`.

mod arm;
mod scan;
mod x86;

use std::collections::HashSet;

use breakpad_symbols::{FrameWalker, SymbolProvider};
use minidump::{MinidumpContext, MinidumpMemory, MinidumpModuleList, MinidumpThread};

use crate::process_state::{CallStack, CallStackInfo, FrameTrust, StackFrame};

/// Knobs controlling how a stack is unwound, threaded down from
/// `ProcessorOptions` to every per-architecture strategy.
#[derive(Debug, Clone, Copy)]
pub struct UnwindOptions {
    /// Whether stack scanning is permitted as a last resort.
    pub allow_scan: bool,
    /// Whether amd64 is allowed to fall back to a frame-pointer walk via
    /// RBP. Disabled by default: the source only enables this based on
    /// ad-hoc per-module build metadata this implementation doesn't parse,
    /// so treat it as opt-in.
    pub amd64_use_fp: bool,
    /// Hard cap on the number of frames produced per thread.
    pub max_frames: usize,
}

impl Default for UnwindOptions {
    fn default() -> Self {
        UnwindOptions {
            allow_scan: true,
            amd64_use_fp: false,
            max_frames: 1024,
        }
    }
}

/// Per-architecture unwinding. `StackFrame`'s impl dispatches on its own
/// context's architecture to `arm`/`x86`'s implementations, or to the
/// shared frame-pointer-then-scan fallback in this module for everything
/// else (ppc, sparc, mips, riscv).
pub trait Unwind {
    fn get_caller_frame(
        &self,
        grand_callee: Option<&StackFrame>,
        stack_memory: Option<&MinidumpMemory<'_>>,
        modules: &MinidumpModuleList,
        symbol_provider: &dyn SymbolProvider,
        options: &UnwindOptions,
    ) -> Option<StackFrame>;
}

impl Unwind for StackFrame {
    fn get_caller_frame(
        &self,
        grand_callee: Option<&StackFrame>,
        stack_memory: Option<&MinidumpMemory<'_>>,
        modules: &MinidumpModuleList,
        symbol_provider: &dyn SymbolProvider,
        options: &UnwindOptions,
    ) -> Option<StackFrame> {
        get_caller_frame(self, grand_callee, stack_memory, modules, symbol_provider, options)
    }
}

/// Unwind every thread in `threads`, given the module list and a symbol
/// provider able to supply CFI and symbol names.
///
/// Returns one `CallStack` per thread, in the same order as `threads`.
/// `skip_thread_id` is the thread that wrote the dump (if known); its
/// stack is not meaningful to walk (it's unwinding the unwinder) and is
/// recorded as `DumpThreadSkipped` instead. `requesting_thread_id` is the
/// thread named by the exception record, if any; when the exception
/// record also carries its own context, that context (not the thread's
/// own, which the OS may have already unwound past the fault) is used
/// to seed that thread's stack.
pub fn walk_threads(
    threads: &minidump::MinidumpThreadList<'_>,
    memory: Option<&minidump::MinidumpMemoryList<'_>>,
    modules: &MinidumpModuleList,
    requesting_thread_id: Option<u32>,
    requesting_thread_context: Option<&MinidumpContext>,
    skip_thread_id: Option<u32>,
    symbol_provider: &dyn SymbolProvider,
    options: &UnwindOptions,
) -> Vec<CallStack> {
    threads
        .iter()
        .map(|thread| {
            if Some(thread.raw.thread_id) == skip_thread_id {
                return CallStack::with_info(CallStackInfo::DumpThreadSkipped);
            }
            let context = if Some(thread.raw.thread_id) == requesting_thread_id {
                requesting_thread_context.or_else(|| thread.context.as_ref())
            } else {
                thread.context.as_ref()
            };
            walk_stack(thread, context, memory, modules, symbol_provider, options)
        })
        .collect()
}

fn walk_stack(
    thread: &MinidumpThread<'_>,
    context: Option<&MinidumpContext>,
    memory: Option<&minidump::MinidumpMemoryList<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
    options: &UnwindOptions,
) -> CallStack {
    let Some(context) = context else {
        return CallStack::with_info(CallStackInfo::MissingContext);
    };

    let stack_memory = thread
        .stack
        .as_ref()
        .or_else(|| memory.and_then(|m| m.memory_at_address(context.get_stack_pointer())));

    let mut frames = vec![StackFrame::from_context(context.clone(), FrameTrust::Context)];
    symbolize(frames.last_mut().unwrap(), modules, symbol_provider);

    if stack_memory.is_none() {
        return CallStack {
            frames,
            info: CallStackInfo::MissingMemory,
        };
    }

    while frames.len() < options.max_frames {
        let grand_callee_idx = frames.len().checked_sub(2);
        let (callee, grand_callee) = {
            let (head, tail) = frames.split_at(frames.len() - 1);
            (&tail[0], grand_callee_idx.map(|_| &head[head.len() - 1]))
        };

        let Some(mut caller) =
            callee.get_caller_frame(grand_callee, stack_memory, modules, symbol_provider, options)
        else {
            break;
        };

        if symbol_provider.is_interrupted() {
            break;
        }

        // A caller frame identical in instruction and stack pointer to its
        // callee means the unwind made no progress; stop rather than loop.
        if caller.instruction == callee.instruction
            && caller.context.get_stack_pointer() <= callee.context.get_stack_pointer()
        {
            break;
        }

        symbolize(&mut caller, modules, symbol_provider);
        frames.push(caller);
    }

    CallStack {
        frames,
        info: CallStackInfo::Ok,
    }
}

fn symbolize(frame: &mut StackFrame, modules: &MinidumpModuleList, symbol_provider: &dyn SymbolProvider) {
    let Some(module) = modules.module_at_address(frame.instruction) else {
        return;
    };
    frame.module = Some(module.clone());
    symbol_provider.fill_symbol(module, frame);
}

fn get_caller_frame(
    callee: &StackFrame,
    grand_callee: Option<&StackFrame>,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
    options: &UnwindOptions,
) -> Option<StackFrame> {
    use minidump::MinidumpRawContext::*;
    match callee.context.raw {
        X86(_) | Amd64(_) => {
            x86::get_caller_frame(callee, grand_callee, stack_memory, modules, symbol_provider, options)
        }
        Arm(_) | Arm64(_) | OldArm64(_) => {
            arm::get_caller_frame(callee, grand_callee, stack_memory, modules, symbol_provider, options)
        }
        Ppc(_) | Ppc64(_) | Sparc(_) | Mips(_) | Riscv(_) | Riscv64(_) => {
            generic_get_caller_frame(callee, grand_callee, stack_memory, modules, symbol_provider, options)
        }
    }
}

/// The shared fallback used by architectures without a dedicated module:
/// try CFI, then a frame-pointer walk (skipped on SPARC, which has no
/// conventional frame-pointer register), then a stack scan (skipped on
/// SPARC, whose register windows make scanned addresses unreliable).
fn generic_get_caller_frame(
    callee: &StackFrame,
    grand_callee: Option<&StackFrame>,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
    options: &UnwindOptions,
) -> Option<StackFrame> {
    let is_sparc = matches!(callee.context.raw, minidump::MinidumpRawContext::Sparc(_));

    if let Some(frame) = cfi_unwind(callee, grand_callee, stack_memory, modules, symbol_provider) {
        return Some(frame);
    }

    if !is_sparc {
        if let Some(frame) = frame_pointer_unwind(callee, stack_memory, modules) {
            return Some(frame);
        }
    }

    if !is_sparc && options.allow_scan {
        if let Some(frame) = scan::scan_for_caller(callee, stack_memory, modules, symbol_provider, 0) {
            return Some(frame);
        }
    }

    None
}

/// The width, in bytes, of a general-purpose register/pointer on this
/// context's architecture.
pub(crate) fn pointer_width(raw: &minidump::MinidumpRawContext) -> u64 {
    match raw {
        minidump::MinidumpRawContext::X86(_)
        | minidump::MinidumpRawContext::Arm(_)
        | minidump::MinidumpRawContext::Ppc(_)
        | minidump::MinidumpRawContext::Riscv(_) => 4,
        _ => 8,
    }
}

/// Check whether `instruction` plausibly lands inside a known module, as a
/// cheap sanity check for values recovered by scanning the stack. Following
/// Breakpad, the address checked is `instruction - 1`, since a return
/// address points just past the call instruction that produced it.
///
/// `symbol_provider` is accepted for parity with the rest of the unwind
/// pipeline and so future refinement (e.g. rejecting addresses that fall
/// between known functions once symbols are loaded) has somewhere to hook
/// in; today this only checks module membership.
pub(crate) fn instruction_seems_valid(
    instruction: u64,
    modules: &MinidumpModuleList,
    _symbol_provider: &dyn SymbolProvider,
) -> bool {
    let Some(lookup_address) = instruction.checked_sub(1) else {
        return false;
    };
    modules.module_at_address(lookup_address).is_some()
}

struct CfiFrameWalker<'a> {
    callee: &'a StackFrame,
    grand_callee: Option<&'a StackFrame>,
    stack_memory: Option<&'a MinidumpMemory<'a>>,
    caller_context: MinidumpContext,
    recovered_registers: HashSet<&'static str>,
}

impl<'a> FrameWalker for CfiFrameWalker<'a> {
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
        let result = self.caller_context.set_register(name, value);
        if result.is_some() {
            if let Some(memoized) = self.memoize(name) {
                self.recovered_registers.insert(memoized);
            }
        }
        result
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

impl<'a> CfiFrameWalker<'a> {
    fn memoize(&self, name: &str) -> Option<&'static str> {
        self.caller_context
            .general_purpose_registers()
            .iter()
            .find(|&&r| r == name)
            .copied()
    }
}

pub(crate) trait ContextExt {
    fn stack_pointer_register_name(&self) -> &'static str;
    fn instruction_pointer_register_name(&self) -> &'static str;
}

impl ContextExt for MinidumpContext {
    fn stack_pointer_register_name(&self) -> &'static str {
        use minidump::CpuContext;
        use minidump::MinidumpRawContext::*;
        match self.raw {
            X86(ref c) => c.stack_pointer_register_name(),
            Amd64(ref c) => c.stack_pointer_register_name(),
            Arm(ref c) => c.stack_pointer_register_name(),
            Arm64(ref c) => c.stack_pointer_register_name(),
            OldArm64(ref c) => c.stack_pointer_register_name(),
            Ppc(ref c) => c.stack_pointer_register_name(),
            Ppc64(ref c) => c.stack_pointer_register_name(),
            Sparc(ref c) => c.stack_pointer_register_name(),
            Mips(ref c) => c.stack_pointer_register_name(),
            Riscv(ref c) => c.stack_pointer_register_name(),
            Riscv64(ref c) => c.stack_pointer_register_name(),
        }
    }

    fn instruction_pointer_register_name(&self) -> &'static str {
        use minidump::CpuContext;
        use minidump::MinidumpRawContext::*;
        match self.raw {
            X86(ref c) => c.instruction_pointer_register_name(),
            Amd64(ref c) => c.instruction_pointer_register_name(),
            Arm(ref c) => c.instruction_pointer_register_name(),
            Arm64(ref c) => c.instruction_pointer_register_name(),
            OldArm64(ref c) => c.instruction_pointer_register_name(),
            Ppc(ref c) => c.instruction_pointer_register_name(),
            Ppc64(ref c) => c.instruction_pointer_register_name(),
            Sparc(ref c) => c.instruction_pointer_register_name(),
            Mips(ref c) => c.instruction_pointer_register_name(),
            Riscv(ref c) => c.instruction_pointer_register_name(),
            Riscv64(ref c) => c.instruction_pointer_register_name(),
        }
    }
}

/// Try to recover the caller's context via call frame information.
/// Succeeds only if the CFI rules recovered both a stack pointer and an
/// instruction pointer for the caller.
fn cfi_unwind(
    callee: &StackFrame,
    grand_callee: Option<&StackFrame>,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
) -> Option<StackFrame> {
    let module = modules.module_at_address(callee.instruction)?;
    let mut walker = CfiFrameWalker {
        callee,
        grand_callee,
        stack_memory,
        caller_context: callee.context.empty_context_like(),
        recovered_registers: HashSet::new(),
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

/// A conventional frame-pointer walk: the word at `[fp]` is the caller's
/// saved frame pointer, and the word right after it is the return address.
/// This holds for every architecture with a dedicated frame-pointer
/// register except ARM64 (handled separately in `arm.rs`, which also
/// strips pointer-authentication tags) and SPARC (no frame pointer).
fn frame_pointer_unwind(
    callee: &StackFrame,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
) -> Option<StackFrame> {
    let stack_memory = stack_memory?;
    let fp_reg = callee.context.frame_pointer_register_name()?;
    let fp = callee.context.get_register(fp_reg)?;
    if fp == 0 {
        return None;
    }

    let ptr_width = pointer_width(&callee.context.raw);

    let (caller_fp, caller_ra) = if ptr_width == 4 {
        let caller_fp: u32 = stack_memory.get_memory_at_address(fp)?;
        let caller_ra: u32 = stack_memory.get_memory_at_address(fp + ptr_width)?;
        (caller_fp as u64, caller_ra as u64)
    } else {
        let caller_fp: u64 = stack_memory.get_memory_at_address(fp)?;
        let caller_ra: u64 = stack_memory.get_memory_at_address(fp + ptr_width)?;
        (caller_fp, caller_ra)
    };

    if caller_ra == 0 || modules.module_at_address(caller_ra).is_none() {
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
