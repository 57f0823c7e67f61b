// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Error types returned by the minidump reader.

use std::fmt;

/// A stream type that the reader knows how to parse but which a caller
/// explicitly asked for and which was absent from the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingStreamType(pub u32);

impl fmt::Display for MissingStreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream type {:#x}", self.0)
    }
}

/// Errors produced while parsing a minidump file or one of its streams.
///
/// Per the core's error-handling policy, these are the only fatal errors:
/// anything that would prevent even a module or thread list from being
/// read. Per-frame and per-symbol problems are represented elsewhere and
/// never abort an entire walk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("header signature did not match \"MDMP\"")]
    BadSignature,
    #[error("file is truncated (need {needed} bytes, have {available})")]
    Truncated { needed: usize, available: usize },
    #[error("stream at rva {rva:#x} size {size:#x} overruns the file")]
    StreamOverrun { rva: u32, size: u32 },
    #[error("stream version is unsupported: {0}")]
    BadStreamVersion(String),
    #[error("stream {0} is missing")]
    MissingStream(MissingStreamType),
    #[error("CPU architecture could not be determined")]
    UnknownArchitecture,
    #[error("a counted array in a stream overruns its containing stream")]
    ArrayOverrun,
    #[error("failed to decode fixed-layout record: {0}")]
    ScrollError(#[from] scroll::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
