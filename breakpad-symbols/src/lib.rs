// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! A library for working with Google Breakpad's text-format symbol files.
//!
//! The entry point for most callers is [`Symbolizer`], which wraps a
//! [`SymbolSupplier`] with an LRU cache of parsed [`SymbolFile`]s and
//! implements [`SymbolProvider`] so a stackwalker can ask it to fill in
//! function names and unwind a frame via call frame information.

mod cfi;
mod sym_file;
mod supplier;
mod symbolizer;

pub use crate::sym_file::{
    Function, InlineOrigin, PublicSymbol, SourceLine, SymbolFile, SymbolFileError, WinFrameType,
};
pub use crate::supplier::{LookupResult, SimpleSymbolSupplier, SymbolSupplier};
pub use crate::symbolizer::{ModuleSymbolStatus, SymbolError, SymbolStats, Symbolizer};

use minidump_common::traits::Module;

/// A trait for things that can accept the results of a symbol lookup.
///
/// `minidump-processor`'s `StackFrame` implements this; this crate knows
/// nothing about stack frames, only about what a caller might want filled
/// in once a symbol for an address has been found.
pub trait FrameSymbolizer {
    /// The instruction address to look up a symbol for.
    fn get_instruction(&self) -> u64;
    /// Called with the name, base address and parameter size (in bytes,
    /// for `STACK WIN` unwinding) of the function containing the
    /// instruction address, if one was found.
    fn set_function(&mut self, name: &str, base: u64, parameter_size: u32);
    /// Called with the source file name, line number, and base address of
    /// the source line containing the instruction address, if found.
    fn set_source_file(&mut self, file: &str, line: u32, base: u64);
    /// Called once per level of an `INLINE` chain covering the instruction
    /// address, outermost first. `file`/`line` describe the call site that
    /// reaches the next (deeper) level, or the physical source location
    /// for the innermost level; absent when no line info applies.
    fn add_inline_frame(&mut self, _function_name: &str, _file_and_line: Option<(&str, u32)>) {}
}

/// A trait that a per-architecture stackwalker implements so a
/// [`SymbolProvider`] can drive CFI-based unwinding without knowing
/// anything about the concrete CPU context type.
pub trait FrameWalker {
    /// The instruction address of the frame being unwound.
    fn get_instruction(&self) -> u64;
    /// The number of bytes the caller popped from the stack on return,
    /// if already known from a previously-resolved callee's `STACK WIN`
    /// record; used to account for calling-convention cleanup.
    fn get_grand_callee_parameter_size(&self) -> Option<u32>;
    /// Read a word-sized value out of stack memory at `address`.
    fn get_register_at_address(&self, address: u64) -> Option<u64>;
    /// The value of register `name` in the callee (the frame closer to the
    /// crash) being unwound from.
    fn get_callee_register(&self, name: &str) -> Option<u64>;
    /// Set the value of register `name` in the caller frame being built.
    fn set_caller_register(&mut self, name: &str, value: u64) -> Option<()>;
    /// Record that register `name` could not be recovered in the caller.
    fn clear_caller_register(&mut self, name: &str);
    /// Record the canonical frame address computed for this frame.
    fn set_cfa(&mut self, value: u64) -> Option<()>;
    /// Record the return address computed for this frame.
    fn set_ra(&mut self, value: u64) -> Option<()>;
}

/// A trait that ties together symbol lookup and CFI-based unwinding for a
/// single module.
///
/// [`Symbolizer`] is the only implementation this crate ships, but the
/// stackwalker is generic over this trait so tests can substitute a fake.
pub trait SymbolProvider {
    /// Fill in whatever source-level information is available for the
    /// instruction address of `frame`'s module.
    fn fill_symbol(&self, module: &dyn Module, frame: &mut dyn FrameSymbolizer);
    /// Attempt to unwind the frame that `walker` describes using call
    /// frame information from `module`'s symbol file. Returns `Some(())`
    /// if a caller frame's register set was recovered.
    fn walk_frame(&self, module: &dyn Module, walker: &mut dyn FrameWalker) -> Option<()>;
    /// Whether the underlying `SymbolSupplier` asked the walk to stop.
    /// The supplier is the only suspension point in the core, so once
    /// this is true the caller should abandon the walk in progress
    /// rather than fall back to the next unwind strategy.
    fn is_interrupted(&self) -> bool {
        false
    }
    /// Which modules symbols were found, not found, or failed to parse for,
    /// across every lookup made so far. Used to populate a `ProcessState`'s
    /// `modules_without_symbols`/`modules_with_corrupt_symbols`.
    fn stats(&self) -> crate::symbolizer::SymbolStats {
        crate::symbolizer::SymbolStats::default()
    }
}
