//! Ties a [`SymbolSupplier`] and the CFI evaluator together behind an LRU
//! cache of parsed [`SymbolFile`]s, and implements [`SymbolProvider`] so a
//! stackwalker can drive both symbol lookup and CFI unwinding through one
//! object.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use minidump_common::traits::Module;

use crate::sym_file::{evaluate_cfi, evaluate_win_program, SymbolFile, SymbolFileError, WinFrameType};
use crate::supplier::{LookupResult, SymbolSupplier};
use crate::{FrameSymbolizer, FrameWalker, SymbolProvider};

/// The default size of the parsed-symbol-table cache. Parsed symbol files
/// for large modules with full CFI can be tens of megabytes; a handful
/// resident at once covers the common case of unwinding across a few hot
/// modules repeatedly without unbounded growth.
const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Hard cap on how many nested `INLINE` levels get expanded into frames.
const MAX_INLINE_DEPTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    #[error("no symbol supplier has symbols for this module")]
    NotFound,
    #[error("the symbol supplier was interrupted")]
    Interrupt,
    #[error("the symbol file is corrupt: {0}")]
    ParseError(#[from] SymbolFileError),
}

/// What happened the last time a module's symbols were looked up, kept
/// around so the Process State Assembler can populate
/// `modules_without_symbols`/`modules_with_corrupt_symbols`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleSymbolStatus {
    Found,
    NotFound,
    CorruptSymbols,
}

/// Aggregate bookkeeping exposed to callers that want to build a process
/// state's symbol statistics without re-deriving them from scratch.
#[derive(Debug, Default)]
pub struct SymbolStats {
    pub modules_without_symbols: Vec<String>,
    pub modules_with_corrupt_symbols: Vec<String>,
}

fn module_key(module: &dyn Module) -> Option<String> {
    module.debug_identifier().map(|id| id.into_owned())
}

/// A [`SymbolProvider`] backed by a [`SymbolSupplier`], caching parsed
/// symbol tables by debug identifier.
///
/// Single-threaded: this mirrors the core's concurrency model, where one
/// `ProcessState` is assembled at a time by one `Symbolizer`; running
/// several assemblies in parallel means giving each its own `Symbolizer`.
pub struct Symbolizer<S> {
    supplier: S,
    cache: RefCell<LruCache<String, Option<Arc<SymbolFile>>>>,
    status: RefCell<HashMap<String, ModuleSymbolStatus>>,
    interrupted: Cell<bool>,
}

impl<S: SymbolSupplier> Symbolizer<S> {
    pub fn new(supplier: S) -> Symbolizer<S> {
        Symbolizer {
            supplier,
            cache: RefCell::new(LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap())),
            status: RefCell::new(HashMap::new()),
            interrupted: Cell::new(false),
        }
    }

    pub fn with_capacity(supplier: S, capacity: usize) -> Symbolizer<S> {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Symbolizer {
            supplier,
            cache: RefCell::new(LruCache::new(capacity)),
            status: RefCell::new(HashMap::new()),
            interrupted: Cell::new(false),
        }
    }

    /// The outcome of the last lookup for a module, by debug identifier.
    pub fn module_status(&self, debug_id: &str) -> Option<ModuleSymbolStatus> {
        self.status.borrow().get(debug_id).copied()
    }

    fn get_symbols(&self, module: &dyn Module) -> Result<Arc<SymbolFile>, SymbolError> {
        let key = module_key(module).ok_or(SymbolError::NotFound)?;

        if let Some(cached) = self.cache.borrow_mut().get(&key) {
            return cached.clone().ok_or(SymbolError::NotFound);
        }

        let (result, status) = match self.supplier.locate(module) {
            LookupResult::NotFound => (Err(SymbolError::NotFound), ModuleSymbolStatus::NotFound),
            LookupResult::Interrupt | LookupResult::InterruptAndRetry => {
                self.interrupted.set(true);
                return Err(SymbolError::Interrupt);
            }
            LookupResult::Found(bytes) => match SymbolFile::parse(&bytes) {
                Ok(sym) => {
                    let sym = Arc::new(sym);
                    (Ok(sym), ModuleSymbolStatus::Found)
                }
                Err(e) => (Err(SymbolError::from(e)), ModuleSymbolStatus::CorruptSymbols),
            },
        };

        self.status.borrow_mut().insert(key.clone(), status);
        let cached_value = result.as_ref().ok().cloned();
        self.cache.borrow_mut().put(key, cached_value);
        result
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.get()
    }
}

impl<S: SymbolSupplier> SymbolProvider for Symbolizer<S> {
    fn fill_symbol(&self, module: &dyn Module, frame: &mut dyn FrameSymbolizer) {
        let Ok(symbols) = self.get_symbols(module) else {
            return;
        };
        let pc = frame.get_instruction();
        if let Some(func) = symbols.function_at_address(pc) {
            frame.set_function(&func.name, func.address, func.parameter_size);
        } else if let Some(public) = symbols.public_symbol_at_address(pc) {
            frame.set_function(&public.name, public.address, public.parameter_size);
        }
        if let Some((file, line, base)) = symbols.source_line_at_address(pc) {
            frame.set_source_file(file, line, base);
        }
        for (name, loc) in symbols.inline_chain_at_address(pc, MAX_INLINE_DEPTH) {
            frame.add_inline_frame(&name, loc.as_ref().map(|(f, l)| (f.as_str(), *l)));
        }
    }

    fn walk_frame(&self, module: &dyn Module, walker: &mut dyn FrameWalker) -> Option<()> {
        let symbols = self.get_symbols(module).ok()?;
        let pc = walker.get_instruction();

        let cfi_rules = symbols.cfi_rules_at_address(pc);
        let win_program = match symbols.win_frame_data_at_address(pc) {
            Some((_, WinFrameType::FrameData { program_string, .. })) => Some(program_string.clone()),
            None => None,
        };
        drop(symbols);

        let resolved = cfi_rules.and_then(|rules| {
            let lookup = |tok: &str| -> Option<i64> { walker.get_callee_register(tok).map(|v| v as i64) };
            let deref = |addr: u64| -> Option<i64> { walker.get_register_at_address(addr).map(|v| v as i64) };
            evaluate_cfi(&rules, &lookup, &deref).ok()
        });

        let resolved = resolved.or_else(|| {
            win_program.and_then(|program| {
                let lookup = |tok: &str| -> Option<i64> { walker.get_callee_register(tok).map(|v| v as i64) };
                let deref = |addr: u64| -> Option<i64> { walker.get_register_at_address(addr).map(|v| v as i64) };
                evaluate_win_program(&program, &lookup, &deref).ok()
            })
        });

        let values = resolved?;
        if apply_evaluated_registers(walker, &values) {
            Some(())
        } else {
            None
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.get()
    }

    /// Debug identifiers of every module looked up so far that came back
    /// `NotFound` or `CorruptSymbols`.
    fn stats(&self) -> SymbolStats {
        let mut stats = SymbolStats::default();
        for (debug_id, status) in self.status.borrow().iter() {
            match status {
                ModuleSymbolStatus::Found => {}
                ModuleSymbolStatus::NotFound => stats.modules_without_symbols.push(debug_id.clone()),
                ModuleSymbolStatus::CorruptSymbols => {
                    stats.modules_with_corrupt_symbols.push(debug_id.clone())
                }
            }
        }
        stats
    }
}

fn apply_evaluated_registers(walker: &mut dyn FrameWalker, values: &HashMap<String, i64>) -> bool {
    let Some(&cfa) = values.get(".cfa") else {
        return false;
    };
    let Some(&ra) = values.get(".ra").or_else(|| values.get("eip")).or_else(|| values.get("rip")) else {
        return false;
    };
    if walker.set_cfa(cfa as u64).is_none() {
        return false;
    }
    if walker.set_ra(ra as u64).is_none() {
        return false;
    }
    for (name, value) in values {
        if name == ".cfa" || name == ".ra" {
            continue;
        }
        walker.set_caller_register(name, *value as u64);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LookupResult;

    struct FixedSupplier(&'static [u8]);
    impl SymbolSupplier for FixedSupplier {
        fn locate(&self, _module: &dyn Module) -> LookupResult {
            LookupResult::Found(self.0.to_vec())
        }
    }

    struct FakeModule;
    impl Module for FakeModule {
        fn base_address(&self) -> u64 {
            0x1000
        }
        fn size(&self) -> u64 {
            0x1000
        }
        fn code_file(&self) -> std::borrow::Cow<'_, str> {
            std::borrow::Cow::Borrowed("libfoo.so")
        }
        fn code_identifier(&self) -> std::borrow::Cow<'_, str> {
            std::borrow::Cow::Borrowed("abc")
        }
        fn debug_file(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed("libfoo.so"))
        }
        fn debug_identifier(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed("ABCD1234"))
        }
        fn version(&self) -> Option<std::borrow::Cow<'_, str>> {
            None
        }
    }

    struct FakeFrame {
        instruction: u64,
        function_name: Option<String>,
    }
    impl FrameSymbolizer for FakeFrame {
        fn get_instruction(&self) -> u64 {
            self.instruction
        }
        fn set_function(&mut self, name: &str, _base: u64, _parameter_size: u32) {
            self.function_name = Some(name.to_string());
        }
        fn set_source_file(&mut self, _file: &str, _line: u32, _base: u64) {}
    }

    const SYMS: &str = "MODULE Linux x86_64 ABCD1234 libfoo.so
FUNC 1000 40 0 crash_fn
";

    #[test]
    fn fills_function_name_and_caches() {
        let symbolizer = Symbolizer::new(FixedSupplier(SYMS.as_bytes()));
        let mut frame = FakeFrame {
            instruction: 0x1010,
            function_name: None,
        };
        symbolizer.fill_symbol(&FakeModule, &mut frame);
        assert_eq!(frame.function_name.as_deref(), Some("crash_fn"));
        assert_eq!(
            symbolizer.module_status("ABCD1234"),
            Some(ModuleSymbolStatus::Found)
        );
    }

    struct InterruptingSupplier;
    impl SymbolSupplier for InterruptingSupplier {
        fn locate(&self, _module: &dyn Module) -> LookupResult {
            LookupResult::Interrupt
        }
    }

    #[test]
    fn interrupt_is_recorded() {
        let symbolizer = Symbolizer::new(InterruptingSupplier);
        let mut frame = FakeFrame {
            instruction: 0x1010,
            function_name: None,
        };
        symbolizer.fill_symbol(&FakeModule, &mut frame);
        assert!(symbolizer.is_interrupted());
    }
}
