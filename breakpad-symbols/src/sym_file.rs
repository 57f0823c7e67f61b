//! Parsing and lookup for Google Breakpad's text-format `.sym` files.
//!
//! A symbol file is UTF-8 text, one record per line:
//!
//! ```text
//! MODULE os arch debug_id debug_file
//! INFO ...
//! FILE number name
//! FUNC [m] address size parameter_size name
//! address size line file
//! INLINE_ORIGIN id name
//! INLINE depth call_site_line call_site_file origin_id address size [address size ...]
//! PUBLIC [m] address parameter_size name
//! STACK WIN type rva code_size prologue_size epilogue_size parameter_size saved_register_size local_size max_stack_size has_program (program_string | allocates_base_pointer)
//! STACK CFI INIT address size register-rules...
//! STACK CFI address register-rules...
//! ```
//!
//! `FUNC` lines own the `LINE`/`INLINE`/`INLINE_ORIGIN` lines that follow
//! them until the next `FUNC`/`PUBLIC`/`STACK`/`MODULE` line.

use std::collections::HashMap;

use range_map::{Range, RangeMap};

use minidump_common::traits::IntoRangeMapSafe;

use crate::cfi::{self, CfiEvalError};

#[derive(Debug, thiserror::Error)]
pub enum SymbolFileError {
    #[error("symbol data is not valid UTF-8")]
    NotUtf8,
    #[error("missing MODULE record")]
    MissingModule,
}

/// One nesting level of an inlined call, as recorded by `INLINE_ORIGIN`.
#[derive(Debug, Clone)]
pub struct InlineOrigin {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InlineRecord {
    depth: u32,
    call_site_line: u32,
    call_site_file: u32,
    origin_id: u32,
    address: u64,
    size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub address: u64,
    pub size: u64,
    pub file: u32,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub parameter_size: u32,
    lines: Vec<SourceLine>,
    inlines: Vec<InlineRecord>,
}

impl Function {
    /// The source line containing `address`, if the table has one.
    fn line_at(&self, address: u64) -> Option<&SourceLine> {
        self.lines
            .iter()
            .find(|l| address >= l.address && address < l.address + l.size.max(1))
    }

    /// Resolve the chain of inlined calls containing `address`, from the
    /// outermost inlined call down to the innermost, capped at
    /// `max_depth` entries. Each entry is `(origin_id, file, line)` where
    /// `file`/`line` describe the call site *within that entry* that
    /// reaches the next (deeper) entry, or the physical source line for
    /// the innermost entry.
    fn resolve_inline_chain(&self, address: u64, max_depth: usize) -> Vec<(u32, Option<(u32, u32)>)> {
        let mut by_depth: HashMap<u32, &InlineRecord> = HashMap::new();
        for rec in &self.inlines {
            if address >= rec.address && address < rec.address + rec.size.max(1) {
                by_depth.insert(rec.depth, rec);
            }
        }
        if by_depth.is_empty() {
            return Vec::new();
        }
        let mut depths: Vec<u32> = by_depth.keys().copied().collect();
        depths.sort_unstable();

        let mut chain = Vec::new();
        for (i, &depth) in depths.iter().enumerate() {
            let rec = by_depth[&depth];
            let loc = if let Some(&next_depth) = depths.get(i + 1) {
                let next = by_depth[&next_depth];
                Some((next.call_site_file, next.call_site_line))
            } else {
                self.line_at(address).map(|l| (l.file, l.line))
            };
            chain.push((rec.origin_id, loc));
        }
        if chain.len() > max_depth {
            chain.truncate(max_depth);
        }
        chain
    }
}

#[derive(Debug, Clone)]
pub struct PublicSymbol {
    pub address: u64,
    pub parameter_size: u32,
    pub name: String,
}

/// Only `FrameData` (type 4, program-string) `STACK WIN` records are
/// supported; FPO records (type 0) need a different, much more involved
/// recovery algorithm that isn't exercised by the symbol files this
/// crate is expected to see and is out of scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinFrameType {
    FrameData {
        parameter_size: u32,
        program_string: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WinRecord {
    address: u64,
    size: u64,
    info: WinFrameType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CfiBlock {
    /// address -> rules valid from that address onward, within this block
    deltas: Vec<(u64, HashMap<String, String>)>,
}

impl CfiBlock {
    fn rules_at(&self, pc: u64) -> Vec<(String, String)> {
        let mut merged: HashMap<String, String> = HashMap::new();
        for (addr, rules) in &self.deltas {
            if *addr > pc {
                break;
            }
            for (k, v) in rules {
                merged.insert(k.clone(), v.clone());
            }
        }
        let mut ordered = Vec::with_capacity(merged.len());
        if let Some(cfa) = merged.remove(".cfa") {
            ordered.push((".cfa".to_string(), cfa));
        }
        if let Some(ra) = merged.remove(".ra") {
            ordered.push((".ra".to_string(), ra));
        }
        ordered.extend(merged);
        ordered
    }
}

/// A parsed Breakpad text symbol file: the functions, public symbols, and
/// unwind information (`STACK CFI`/`STACK WIN`) for one module.
#[derive(Debug)]
pub struct SymbolFile {
    functions: RangeMap<u64, Function>,
    public_symbols: Vec<PublicSymbol>,
    files: HashMap<u32, String>,
    inline_origins: HashMap<u32, InlineOrigin>,
    cfi_blocks: RangeMap<u64, CfiBlock>,
    win_records: RangeMap<u64, WinRecord>,
}

impl SymbolFile {
    /// Parse a symbol file's raw bytes.
    ///
    /// Any line this parser doesn't recognize (including a malformed
    /// `MODULE` header) is skipped rather than treated as a hard error,
    /// matching Breakpad's own tolerant parser: a symbol file with a few
    /// corrupt records is still worth using for the records that did
    /// parse. The one exception is a completely missing `MODULE` line,
    /// which signals the file isn't a symbol file at all.
    pub fn parse(data: &[u8]) -> Result<SymbolFile, SymbolFileError> {
        let text = std::str::from_utf8(data).map_err(|_| SymbolFileError::NotUtf8)?;

        let mut saw_module = false;
        let mut functions: Vec<(Range<u64>, Function)> = Vec::new();
        let mut public_symbols = Vec::new();
        let mut files = HashMap::new();
        let mut inline_origins = HashMap::new();
        let mut cfi_blocks: Vec<(Range<u64>, CfiBlock)> = Vec::new();
        let mut win_records: Vec<(Range<u64>, WinRecord)> = Vec::new();

        let mut current_function: Option<(Range<u64>, Function)> = None;
        let mut current_cfi: Option<(Range<u64>, CfiBlock)> = None;

        let flush_function = |cur: &mut Option<(Range<u64>, Function)>, out: &mut Vec<(Range<u64>, Function)>| {
            if let Some(f) = cur.take() {
                out.push(f);
            }
        };
        let flush_cfi = |cur: &mut Option<(Range<u64>, CfiBlock)>, out: &mut Vec<(Range<u64>, CfiBlock)>| {
            if let Some(b) = cur.take() {
                out.push(b);
            }
        };

        for line in text.lines() {
            let mut words = line.split_whitespace();
            match words.next() {
                Some("MODULE") => {
                    saw_module = true;
                }
                Some("FILE") => {
                    let parts: Vec<&str> = line.splitn(3, char::is_whitespace).collect();
                    if parts.len() == 3 {
                        if let Ok(num) = parts[1].parse::<u32>() {
                            files.insert(num, parts[2].trim().to_string());
                        }
                    }
                }
                Some("INLINE_ORIGIN") => {
                    if let Some(id) = words.next() {
                        if let Ok(id) = id.parse::<u32>() {
                            let name = rest_after(line, 2).unwrap_or_default();
                            inline_origins.insert(id, InlineOrigin { name });
                        }
                    }
                }
                Some("FUNC") => {
                    flush_function(&mut current_function, &mut functions);
                    let mut rest: Vec<&str> = words.collect();
                    if rest.first() == Some(&"m") {
                        rest.remove(0);
                    }
                    if rest.len() >= 3 {
                        if let (Ok(address), Ok(size), Ok(parameter_size)) = (
                            u64::from_str_radix(rest[0], 16),
                            u64::from_str_radix(rest[1], 16),
                            u32::from_str_radix(rest[2], 16),
                        ) {
                            let name = rest[3..].join(" ");
                            let range = Range::new(address, address + size.max(1) - 1);
                            current_function = Some((
                                range,
                                Function {
                                    name,
                                    address,
                                    size,
                                    parameter_size,
                                    lines: Vec::new(),
                                    inlines: Vec::new(),
                                },
                            ));
                        }
                    }
                }
                Some("INLINE") => {
                    if let Some((_, func)) = current_function.as_mut() {
                        let fields: Vec<&str> = words.collect();
                        if fields.len() >= 6 {
                            if let (Ok(depth), Ok(call_site_line), Ok(call_site_file), Ok(origin_id)) = (
                                fields[0].parse::<u32>(),
                                fields[1].parse::<u32>(),
                                fields[2].parse::<u32>(),
                                fields[3].parse::<u32>(),
                            ) {
                                // address/size pairs may repeat for discontiguous ranges;
                                // record one InlineRecord per pair.
                                let mut i = 4;
                                while i + 1 < fields.len() {
                                    if let (Ok(address), Ok(size)) = (
                                        u64::from_str_radix(fields[i], 16),
                                        u64::from_str_radix(fields[i + 1], 16),
                                    ) {
                                        func.inlines.push(InlineRecord {
                                            depth,
                                            call_site_line,
                                            call_site_file,
                                            origin_id,
                                            address,
                                            size,
                                        });
                                    }
                                    i += 2;
                                }
                            }
                        }
                    }
                }
                Some("PUBLIC") => {
                    let mut rest: Vec<&str> = words.collect();
                    if rest.first() == Some(&"m") {
                        rest.remove(0);
                    }
                    if rest.len() >= 2 {
                        if let (Ok(address), Ok(parameter_size)) = (
                            u64::from_str_radix(rest[0], 16),
                            u32::from_str_radix(rest[1], 16),
                        ) {
                            let name = rest[2..].join(" ");
                            public_symbols.push(PublicSymbol {
                                address,
                                parameter_size,
                                name,
                            });
                        }
                    }
                }
                Some("STACK") => match words.next() {
                    Some("CFI") => {
                        if words.clone().next() == Some("INIT") {
                            words.next();
                            let fields: Vec<&str> = words.collect();
                            if fields.len() >= 2 {
                                if let (Ok(address), Ok(size)) = (
                                    u64::from_str_radix(fields[0], 16),
                                    u64::from_str_radix(fields[1], 16),
                                ) {
                                    flush_cfi(&mut current_cfi, &mut cfi_blocks);
                                    let rules = parse_cfi_rules(&fields[2..]);
                                    let range = Range::new(address, address + size.max(1) - 1);
                                    current_cfi = Some((
                                        range,
                                        CfiBlock {
                                            deltas: vec![(address, rules)],
                                        },
                                    ));
                                }
                            }
                        } else {
                            let fields: Vec<&str> = words.collect();
                            if !fields.is_empty() {
                                if let Ok(address) = u64::from_str_radix(fields[0], 16) {
                                    if let Some((range, block)) = current_cfi.as_mut() {
                                        if address <= range.end {
                                            let rules = parse_cfi_rules(&fields[1..]);
                                            block.deltas.push((address, rules));
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Some("WIN") => {
                        let fields: Vec<&str> = words.collect();
                        // type rva code_size prologue epilogue param_size saved_reg_size local_size max_stack_size has_program [program...]
                        if fields.len() >= 10 {
                            let ty = fields[0];
                            if let (Ok(rva), Ok(code_size), Ok(parameter_size), Ok(has_program)) = (
                                u64::from_str_radix(fields[1], 16),
                                u64::from_str_radix(fields[2], 16),
                                u32::from_str_radix(fields[5], 16),
                                fields[9].parse::<u32>(),
                            ) {
                                if ty == "4" && has_program == 1 && fields.len() > 10 {
                                    let program_string = fields[10..].join(" ");
                                    let range = Range::new(rva, rva + code_size.max(1) - 1);
                                    win_records.push((
                                        range,
                                        WinRecord {
                                            address: rva,
                                            size: code_size,
                                            info: WinFrameType::FrameData {
                                                parameter_size,
                                                program_string,
                                            },
                                        },
                                    ));
                                }
                            }
                        }
                    }
                    _ => {}
                },
                Some(_) => {
                    // A LINE record: "address size line file", only valid inside a FUNC.
                    if let Some((_, func)) = current_function.as_mut() {
                        let fields: Vec<&str> = line.split_whitespace().collect();
                        if fields.len() == 4 {
                            if let (Ok(address), Ok(size), Ok(line_no), Ok(file)) = (
                                u64::from_str_radix(fields[0], 16),
                                u64::from_str_radix(fields[1], 16),
                                fields[2].parse::<u32>(),
                                fields[3].parse::<u32>(),
                            ) {
                                func.lines.push(SourceLine {
                                    address,
                                    size,
                                    file,
                                    line: line_no,
                                });
                            }
                        }
                    }
                }
                None => {}
            }
        }
        flush_function(&mut current_function, &mut functions);
        flush_cfi(&mut current_cfi, &mut cfi_blocks);

        if !saw_module {
            return Err(SymbolFileError::MissingModule);
        }

        public_symbols.sort_by_key(|p| p.address);

        Ok(SymbolFile {
            functions: functions.into_rangemap_safe(),
            public_symbols,
            files,
            inline_origins,
            cfi_blocks: cfi_blocks.into_rangemap_safe(),
            win_records: win_records.into_rangemap_safe(),
        })
    }

    pub fn file_name(&self, id: u32) -> Option<&str> {
        self.files.get(&id).map(|s| s.as_str())
    }

    pub fn inline_origin_name(&self, id: u32) -> Option<&str> {
        self.inline_origins.get(&id).map(|o| o.name.as_str())
    }

    pub fn function_at_address(&self, address: u64) -> Option<&Function> {
        self.functions.get(address)
    }

    /// The public symbol with the highest address not exceeding `address`,
    /// used as a fallback when no `FUNC` record covers the address.
    pub fn public_symbol_at_address(&self, address: u64) -> Option<&PublicSymbol> {
        match self.public_symbols.binary_search_by_key(&address, |p| p.address) {
            Ok(idx) => Some(&self.public_symbols[idx]),
            Err(0) => None,
            Err(idx) => Some(&self.public_symbols[idx - 1]),
        }
    }

    /// The source line covering `address`, if `address` falls inside a
    /// known function.
    pub fn source_line_at_address(&self, address: u64) -> Option<(&str, u32, u64)> {
        let func = self.function_at_address(address)?;
        let line = func.line_at(address)?;
        let file = self.file_name(line.file)?;
        Some((file, line.line, line.address))
    }

    /// The chain of inlined calls containing `address`, outermost first,
    /// resolved to `(name, file, line)` triples, capped at `max_depth`.
    pub fn inline_chain_at_address(
        &self,
        address: u64,
        max_depth: usize,
    ) -> Vec<(String, Option<(String, u32)>)> {
        let Some(func) = self.function_at_address(address) else {
            return Vec::new();
        };
        func.resolve_inline_chain(address, max_depth)
            .into_iter()
            .filter_map(|(origin_id, loc)| {
                let name = self.inline_origin_name(origin_id)?.to_string();
                let loc = loc.and_then(|(file, line)| {
                    self.file_name(file).map(|f| (f.to_string(), line))
                });
                Some((name, loc))
            })
            .collect()
    }

    pub fn cfi_rules_at_address(&self, address: u64) -> Option<Vec<(String, String)>> {
        let block = self.cfi_blocks.get(address)?;
        Some(block.rules_at(address))
    }

    pub fn win_frame_data_at_address(&self, address: u64) -> Option<(u64, &WinFrameType)> {
        let rec = self.win_records.get(address)?;
        Some((rec.address, &rec.info))
    }
}

fn parse_cfi_rules(fields: &[&str]) -> HashMap<String, String> {
    // Each rule is "name: expr" with the colon immediately after the name,
    // but expr itself is whitespace-separated tokens, so re-join and split
    // on ": " boundaries is unreliable; Breakpad instead writes each rule
    // as consecutive tokens "name: tok tok ... " where only the first
    // token of a rule ends in ':'.
    let mut rules = HashMap::new();
    let mut name: Option<String> = None;
    let mut expr_tokens: Vec<&str> = Vec::new();
    for field in fields {
        if let Some(stripped) = field.strip_suffix(':') {
            if let Some(n) = name.take() {
                rules.insert(n, expr_tokens.join(" "));
                expr_tokens.clear();
            }
            name = Some(stripped.to_string());
        } else {
            expr_tokens.push(field);
        }
    }
    if let Some(n) = name {
        rules.insert(n, expr_tokens.join(" "));
    }
    rules
}

fn rest_after(line: &str, skip_words: usize) -> Option<String> {
    let mut words = line.split_whitespace();
    for _ in 0..skip_words {
        words.next()?;
    }
    let rest: Vec<&str> = words.collect();
    if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    }
}

/// Evaluate a module's call frame information at `pc` against the current
/// register state, returning the recovered pseudo-registers (`.cfa`,
/// `.ra`) plus any caller registers the rules assigned.
pub fn evaluate_cfi(
    rules: &[(String, String)],
    lookup: &dyn Fn(&str) -> Option<i64>,
    deref: &dyn Fn(u64) -> Option<i64>,
) -> Result<HashMap<String, i64>, CfiEvalError> {
    cfi::eval_rules(rules, HashMap::new(), lookup, deref)
}

/// Evaluate a `STACK WIN` `FrameData` program string the same way.
pub fn evaluate_win_program(
    program: &str,
    lookup: &dyn Fn(&str) -> Option<i64>,
    deref: &dyn Fn(u64) -> Option<i64>,
) -> Result<HashMap<String, i64>, CfiEvalError> {
    let rules = cfi::parse_assignment_program(program);
    cfi::eval_rules(&rules, HashMap::new(), lookup, deref)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MODULE Linux x86_64 000000000000000000000000000000000 libfoo.so
FILE 0 foo.c
FUNC 1000 50 0 foo
1000 10 10 0
1010 10 11 0
PUBLIC 2000 0 bar
STACK CFI INIT 1000 50 .cfa: $rsp 8 + .ra: .cfa 8 - ^
STACK CFI 1010 $rbp: .cfa 16 - ^
";

    #[test]
    fn parses_function_and_line() {
        let sym = SymbolFile::parse(SAMPLE.as_bytes()).unwrap();
        let func = sym.function_at_address(0x1005).unwrap();
        assert_eq!(func.name, "foo");
        let (file, line, _) = sym.source_line_at_address(0x1005).unwrap();
        assert_eq!(file, "foo.c");
        assert_eq!(line, 10);
    }

    #[test]
    fn parses_public_symbol_fallback() {
        let sym = SymbolFile::parse(SAMPLE.as_bytes()).unwrap();
        assert!(sym.function_at_address(0x2000).is_none());
        let public = sym.public_symbol_at_address(0x2005).unwrap();
        assert_eq!(public.name, "bar");
    }

    #[test]
    fn cfi_rules_merge_deltas() {
        let sym = SymbolFile::parse(SAMPLE.as_bytes()).unwrap();
        let rules = sym.cfi_rules_at_address(0x1015).unwrap();
        let map: HashMap<_, _> = rules.into_iter().collect();
        assert_eq!(map[".cfa"], "$rsp 8 +");
        assert_eq!(map["$rbp"], ".cfa 16 - ^");
    }

    #[test]
    fn missing_module_line_errors() {
        let err = SymbolFile::parse(b"FUNC 1000 10 0 foo\n").unwrap_err();
        assert!(matches!(err, SymbolFileError::MissingModule));
    }

    #[test]
    fn inline_chain_resolves_call_sites() {
        let text = "MODULE Linux x86_64 0 libfoo.so
FILE 0 foo.c
FILE 1 bar.c
INLINE_ORIGIN 0 inlined_fn
FUNC 1000 100 0 outer
INLINE 1 5 0 0 1010 10
1000 10 1 0
1010 10 7 1
";
        let sym = SymbolFile::parse(text.as_bytes()).unwrap();
        let chain = sym.inline_chain_at_address(0x1015, 16);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].0, "inlined_fn");
        assert_eq!(chain[0].1.as_ref().unwrap().0, "bar.c");
        assert_eq!(chain[0].1.as_ref().unwrap().1, 7);
    }
}
