//! Locating symbol file bytes for a module.

use std::fs;
use std::path::PathBuf;

use minidump_common::traits::Module;

/// The outcome of asking a [`SymbolSupplier`] to locate a module's symbols.
pub enum LookupResult {
    /// The supplier doesn't have symbols for this module.
    NotFound,
    /// The symbol bytes, ready to hand to [`crate::SymbolFile::parse`].
    Found(Vec<u8>),
    /// The caller asked the supplier to give up partway through a lookup.
    Interrupt,
    /// The supplier was interrupted but the caller should retry the
    /// lookup later (e.g. a network fetch that's still in flight).
    InterruptAndRetry,
}

/// A source of symbol file bytes for a module.
///
/// This crate ships exactly one implementation, [`SimpleSymbolSupplier`]:
/// scanning a list of local directories. Fetching symbols over a network
/// is deliberately out of scope for this core; a caller embedding a
/// network-backed supplier can implement this trait themselves.
pub trait SymbolSupplier {
    fn locate(&self, module: &dyn Module) -> LookupResult;
}

/// Looks for symbol files on disk, using the standard Breakpad symbol
/// store layout: `<search_path>/<debug_file>/<debug_id>/<debug_file>.sym`.
#[derive(Debug, Clone, Default)]
pub struct SimpleSymbolSupplier {
    paths: Vec<PathBuf>,
}

impl SimpleSymbolSupplier {
    pub fn new(paths: Vec<PathBuf>) -> SimpleSymbolSupplier {
        SimpleSymbolSupplier { paths }
    }
}

impl SymbolSupplier for SimpleSymbolSupplier {
    fn locate(&self, module: &dyn Module) -> LookupResult {
        let Some(debug_file) = module.debug_file() else {
            return LookupResult::NotFound;
        };
        let Some(debug_id) = module.debug_identifier() else {
            return LookupResult::NotFound;
        };
        // Windows debug files carry a `.pdb` extension that the symbol file
        // replaces; other platforms' debug files (e.g. a Linux `.so`) get
        // `.sym` appended as-is.
        let sym_file_name = match debug_file.strip_suffix(".pdb").or_else(|| debug_file.strip_suffix(".PDB")) {
            Some(stem) => format!("{stem}.sym"),
            None => format!("{debug_file}.sym"),
        };
        for path in &self.paths {
            let candidate = path.join(debug_file.as_ref()).join(debug_id.as_ref()).join(&sym_file_name);
            if let Ok(bytes) = fs::read(&candidate) {
                return LookupResult::Found(bytes);
            }
        }
        LookupResult::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FakeModule {
        debug_file: String,
        debug_id: String,
    }

    impl Module for FakeModule {
        fn base_address(&self) -> u64 {
            0
        }
        fn size(&self) -> u64 {
            0
        }
        fn code_file(&self) -> std::borrow::Cow<'_, str> {
            std::borrow::Cow::Borrowed("")
        }
        fn code_identifier(&self) -> std::borrow::Cow<'_, str> {
            std::borrow::Cow::Borrowed("")
        }
        fn debug_file(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(&self.debug_file))
        }
        fn debug_identifier(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(&self.debug_id))
        }
        fn version(&self) -> Option<std::borrow::Cow<'_, str>> {
            None
        }
    }

    #[test]
    fn finds_symbol_file_in_standard_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sym_dir = dir.path().join("libfoo.so").join("ABCD1234");
        fs::create_dir_all(&sym_dir).unwrap();
        let mut f = fs::File::create(sym_dir.join("libfoo.so.sym")).unwrap();
        writeln!(f, "MODULE Linux x86_64 ABCD1234 libfoo.so").unwrap();

        let supplier = SimpleSymbolSupplier::new(vec![dir.path().to_path_buf()]);
        let module = FakeModule {
            debug_file: "libfoo.so".to_string(),
            debug_id: "ABCD1234".to_string(),
        };
        match supplier.locate(&module) {
            LookupResult::Found(bytes) => assert!(bytes.starts_with(b"MODULE")),
            _ => panic!("expected symbols to be found"),
        }
    }

    #[test]
    fn missing_symbols_report_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let supplier = SimpleSymbolSupplier::new(vec![dir.path().to_path_buf()]);
        let module = FakeModule {
            debug_file: "libbar.so".to_string(),
            debug_id: "DEADBEEF".to_string(),
        };
        assert!(matches!(supplier.locate(&module), LookupResult::NotFound));
    }
}
