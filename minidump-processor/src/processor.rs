//! Turning a parsed `Minidump` into a `ProcessState`: selecting the crash
//! context, walking every thread's stack, and recording which modules'
//! symbols were missing or corrupt.

use chrono::{TimeZone, Utc};

use breakpad_symbols::SymbolProvider;
use minidump::{Minidump, MinidumpModuleList, MinidumpUnloadedModuleList, Module, Readable};

use crate::process_state::{CallStack, CallStackInfo, ProcessState, ProcessStateStatus};
use crate::stackwalker::{self, UnwindOptions};

/// Options controlling how a minidump is processed.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct ProcessorOptions {
    /// Whether stack scanning is permitted as a last-resort unwind strategy.
    pub allow_scan: bool,
    /// Hard cap on the number of frames produced per thread.
    pub max_frames: usize,
    /// Whether amd64 may fall back to a frame-pointer walk via RBP.
    pub amd64_use_fp: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        let unwind = UnwindOptions::default();
        ProcessorOptions {
            allow_scan: unwind.allow_scan,
            max_frames: unwind.max_frames,
            amd64_use_fp: unwind.amd64_use_fp,
        }
    }
}

impl From<ProcessorOptions> for UnwindOptions {
    fn from(options: ProcessorOptions) -> UnwindOptions {
        UnwindOptions {
            allow_scan: options.allow_scan,
            amd64_use_fp: options.amd64_use_fp,
            max_frames: options.max_frames,
        }
    }
}

/// An error encountered while assembling a `ProcessState`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("the thread list stream was not found")]
    MissingThreadList,
    #[error("the system information stream was not found")]
    MissingSystemInfo,
}

/// Unwind every thread in `dump` and assemble a `ProcessState`.
pub fn process_minidump<T: Readable>(
    dump: &Minidump<T>,
    symbol_provider: &dyn SymbolProvider,
) -> Result<ProcessState, ProcessError> {
    process_minidump_with_options(dump, symbol_provider, ProcessorOptions::default())
}

/// The same as [`process_minidump`] but with extra options.
pub fn process_minidump_with_options<T: Readable>(
    dump: &Minidump<T>,
    symbol_provider: &dyn SymbolProvider,
    options: ProcessorOptions,
) -> Result<ProcessState, ProcessError> {
    let thread_list = dump.threads().ok_or(ProcessError::MissingThreadList)?;
    let system_info = dump.system_info().ok_or(ProcessError::MissingSystemInfo)?;

    let modules = dump.modules().unwrap_or_else(|| MinidumpModuleList::new(Vec::new()));
    let unloaded_modules = dump
        .unloaded_modules()
        .unwrap_or_else(|| MinidumpUnloadedModuleList::new(Vec::new()));
    let memory_list = dump.memory_list().or_else(|| dump.memory64_list());

    let misc_info = dump.misc_info();
    let process_id = misc_info.as_ref().and_then(|info| info.process_id());
    let process_create_time = misc_info
        .as_ref()
        .and_then(|info| info.process_create_time())
        .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single());

    let breakpad_info = dump.breakpad_info();
    let skip_thread_id = breakpad_info.as_ref().and_then(|info| info.dump_thread_id());
    let breakpad_requesting_thread_id =
        breakpad_info.as_ref().and_then(|info| info.requesting_thread_id());

    let exception = dump.exception();
    let assertion = dump.assertion().map(|a| {
        format!("{} ({}:{} in {})", a.expression, a.file, a.line, a.function)
    });

    // The exception stream's own thread, if present, takes priority over the
    // BreakpadInfo stream's hint; the crash context it carries is used in
    // place of that thread's own context, since the OS may have already
    // unwound past the fault by the time the thread's own context was
    // captured.
    let (requesting_thread_id, requesting_thread_context, crash_reason, crash_address) =
        match exception.as_ref() {
            Some(exception) => (
                Some(exception.thread_id),
                exception.context.as_ref(),
                Some(exception.get_crash_reason(system_info.os.platform_id())),
                Some(exception.get_crash_address(system_info.os.platform_id())),
            ),
            None => (breakpad_requesting_thread_id, None, None, None),
        };

    let unwind_options: UnwindOptions = options.into();
    let call_stacks = stackwalker::walk_threads(
        &thread_list,
        memory_list.as_ref(),
        &modules,
        requesting_thread_id,
        requesting_thread_context,
        skip_thread_id,
        symbol_provider,
        &unwind_options,
    );

    let requesting_thread = requesting_thread_id
        .and_then(|id| thread_list.iter().position(|t| t.raw.thread_id == id));

    let status = process_status(
        requesting_thread_id.is_some(),
        &call_stacks,
        symbol_provider,
    );

    let (modules_without_symbols, modules_with_corrupt_symbols) =
        module_symbol_names(&modules, symbol_provider);

    Ok(ProcessState {
        process_id,
        time: Utc
            .timestamp_opt(dump.header().time_date_stamp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now),
        process_create_time,
        crash_reason,
        crash_address,
        assertion,
        requesting_thread,
        threads: call_stacks,
        system_info,
        modules,
        unloaded_modules,
        modules_without_symbols,
        modules_with_corrupt_symbols,
        status,
    })
}

fn process_status(
    has_requesting_thread: bool,
    call_stacks: &[CallStack],
    symbol_provider: &dyn SymbolProvider,
) -> ProcessStateStatus {
    if symbol_provider.is_interrupted() {
        return ProcessStateStatus::Interrupted;
    }
    if !has_requesting_thread {
        return ProcessStateStatus::NoCrashContext;
    }
    let any_unwound = call_stacks
        .iter()
        .any(|stack| stack.info == CallStackInfo::Ok);
    if any_unwound {
        ProcessStateStatus::Crashed
    } else {
        ProcessStateStatus::Ok
    }
}

/// Cross-reference the symbol provider's debug-identifier-keyed stats
/// against the module list to get back the code-file names `ProcessState`
/// records its per-module symbol status under.
fn module_symbol_names(
    modules: &MinidumpModuleList,
    symbol_provider: &dyn SymbolProvider,
) -> (Vec<String>, Vec<String>) {
    let stats = symbol_provider.stats();
    let name_for = |debug_id: &str| -> Option<String> {
        modules
            .iter()
            .find(|m| m.debug_identifier().as_deref() == Some(debug_id))
            .map(|m| m.name.clone())
    };
    let without_symbols = stats
        .modules_without_symbols
        .iter()
        .filter_map(|id| name_for(id))
        .collect();
    let with_corrupt_symbols = stats
        .modules_with_corrupt_symbols
        .iter()
        .filter_map(|id| name_for(id))
        .collect();
    (without_symbols, with_corrupt_symbols)
}
