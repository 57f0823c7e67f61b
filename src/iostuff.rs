// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Low-level byte-slice helpers shared by every stream parser.
//!
//! Nothing in this module reinterpret-casts bytes to host structs; all
//! multi-byte values are decoded explicitly via `scroll`, so the reader
//! behaves identically on big-endian and little-endian hosts.

use std::ops::Deref;

use crate::error::{Error, Result};

/// Anything the reader can treat as a minidump's backing bytes.
pub trait Readable: Deref<Target = [u8]> {}
impl<T: Deref<Target = [u8]>> Readable for T {}

/// Returns the sub-slice of `bytes` spanning `[rva, rva+size)`, checked to
/// lie entirely within `bytes`.
pub fn slice(bytes: &[u8], rva: u32, size: u32) -> Result<&[u8]> {
    let start = rva as usize;
    let end = start.checked_add(size as usize).ok_or(Error::StreamOverrun { rva, size })?;
    bytes
        .get(start..end)
        .ok_or(Error::StreamOverrun { rva, size })
}

/// Reads a length-prefixed `MINIDUMP_STRING` (`u32` byte length, followed by
/// that many bytes of UTF-16LE) at `rva`. Ill-formed surrogates are replaced
/// with U+FFFD rather than causing a decode failure, per spec.
pub fn read_utf16_string(bytes: &[u8], rva: u32) -> Result<String> {
    use scroll::Pread;
    let len_bytes: u32 = bytes.pread_with(rva as usize, scroll::LE)?;
    let data = slice(bytes, rva + 4, len_bytes)?;
    Ok(utf16_bytes_to_string(data))
}

/// Decodes a buffer of little-endian UTF-16 code units (packed as bytes, an
/// odd trailing byte is ignored) into a `String`, replacing unpaired
/// surrogates with U+FFFD.
pub fn utf16_bytes_to_string(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or('\u{FFFD}'))
        .collect()
}

/// Reads a fixed-size array of little-endian UTF-16 code units (as found in
/// e.g. `MINIDUMP_ASSERTION_INFO`), stopping at the first NUL.
pub fn utf16_fixed_to_string(units: &[u16]) -> String {
    let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
    char::decode_utf16(units[..end].iter().copied())
        .map(|r| r.unwrap_or('\u{FFFD}'))
        .collect()
}

/// Counted-array bounds check shared by every `ModuleList`/`ThreadList`-style
/// stream: rejects `count` if `header_size + count * entry_size` overruns
/// the containing stream slice.
pub fn check_array_bounds(
    stream_len: usize,
    header_size: usize,
    count: usize,
    entry_size: usize,
) -> Result<()> {
    let needed = header_size
        .checked_add(count.checked_mul(entry_size).ok_or(Error::ArrayOverrun)?)
        .ok_or(Error::ArrayOverrun)?;
    if needed > stream_len {
        return Err(Error::ArrayOverrun);
    }
    Ok(())
}
