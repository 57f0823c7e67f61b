//! Stack scanning: the last-resort unwind strategy, tried only once CFI and
//! a frame-pointer walk have both failed.
//!
//! This walks the stack a word at a time looking for a value that could
//! plausibly be a return address left behind by a `call`-style instruction,
//! i.e. one that lands inside a known module. It's unsound in general (any
//! stack value that happens to look like a code address will be mistaken
//! for one) but is what Breakpad falls back to, and recovers useful frames
//! often enough in practice to be worth keeping as a last resort.

use breakpad_symbols::SymbolProvider;
use minidump::{MinidumpMemory, MinidumpModuleList};

use super::{instruction_seems_valid, pointer_width, ContextExt};
use crate::process_state::{FrameTrust, StackFrame};

/// How far past the starting stack pointer to scan before giving up.
const MAX_SCAN_WORDS: u64 = 1024;

/// Scan stack memory for a plausible return address, starting `skip_words`
/// words past the callee's stack pointer (used by callers that know a
/// minimum argument area must be skipped before the saved return address).
pub fn scan_for_caller(
    callee: &StackFrame,
    stack_memory: Option<&MinidumpMemory<'_>>,
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
    skip_words: u64,
) -> Option<StackFrame> {
    let stack_memory = stack_memory?;
    let sp_reg = callee.context.stack_pointer_register_name();
    let sp = callee.context.get_register(sp_reg)?;
    let ptr_width = pointer_width(&callee.context.raw);

    let start = sp.checked_add(skip_words.checked_mul(ptr_width)?)?;

    for i in 0..MAX_SCAN_WORDS {
        let address = start.checked_add(i.checked_mul(ptr_width)?)?;
        let candidate = if ptr_width == 4 {
            stack_memory.get_memory_at_address::<u32>(address).map(u64::from)
        } else {
            stack_memory.get_memory_at_address::<u64>(address)
        }?;

        if !instruction_seems_valid(candidate, modules, symbol_provider) {
            continue;
        }

        let caller_sp = address.checked_add(ptr_width)?;
        let mut caller_context = callee.context.empty_context_like();
        let ip_reg = caller_context.instruction_pointer_register_name();
        caller_context.set_register(ip_reg, candidate)?;
        caller_context.set_register(sp_reg, caller_sp)?;

        return Some(StackFrame::from_context(caller_context, FrameTrust::Scan));
    }

    None
}
