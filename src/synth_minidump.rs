// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! A byte-level minidump builder, used only by this crate's own tests to
//! exercise the reader against real on-disk bytes instead of pre-built
//! Rust structs.

use scroll::Pwrite;
use test_assembler::{Endian as TaEndian, Section};

use minidump_common::format as md;

/// One stream's contents, to be laid out after the header and directory.
#[derive(Debug)]
pub struct SynthMinidump {
    streams: Vec<(u32, Vec<u8>)>,
}

impl SynthMinidump {
    pub fn new() -> SynthMinidump {
        SynthMinidump { streams: Vec::new() }
    }

    pub fn add_stream(mut self, stream_type: u32, bytes: Vec<u8>) -> SynthMinidump {
        self.streams.push((stream_type, bytes));
        self
    }

    /// Lay out header, directory, and stream bodies back-to-back, the way
    /// every real minidump writer does, and return the assembled bytes.
    pub fn finish(self) -> Vec<u8> {
        let header_size = std::mem::size_of::<md::MDRawHeader>();
        let dir_entry_size = std::mem::size_of::<md::MDRawDirectory>();
        let mut offset = header_size + dir_entry_size * self.streams.len();

        let mut directory = Section::with_endian(TaEndian::Little);
        let mut body = Vec::new();
        for (stream_type, bytes) in &self.streams {
            directory = directory
                .D32(*stream_type)
                .D32(bytes.len() as u32)
                .D32(offset as u32);
            body.extend_from_slice(bytes);
            offset += bytes.len();
        }

        let header = Section::with_endian(TaEndian::Little)
            .D32(md::MD_HEADER_SIGNATURE)
            .D32(md::MD_HEADER_VERSION)
            .D32(self.streams.len() as u32)
            .D32(header_size as u32)
            .D32(0u32)
            .D32(0u32)
            .D64(0u64);

        let mut out = header.get_contents().unwrap();
        out.extend(directory.get_contents().unwrap());
        out.extend(body);
        out
    }
}

/// Appends a length-prefixed UTF-16LE `MINIDUMP_STRING` to `bytes` and
/// returns its rva relative to the start of `bytes`.
pub fn append_utf16_string(bytes: &mut Vec<u8>, s: &str) -> u32 {
    let rva = bytes.len() as u32;
    let units: Vec<u16> = s.encode_utf16().collect();
    let len_bytes = (units.len() * 2) as u32;
    let mut offset = bytes.len();
    bytes.resize(offset + 4, 0);
    bytes.pwrite_with(len_bytes, offset, scroll::LE).unwrap();
    offset += 4;
    for unit in units {
        bytes.resize(offset + 2, 0);
        bytes.pwrite_with(unit, offset, scroll::LE).unwrap();
        offset += 2;
    }
    rva
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_lays_out_header_then_streams() {
        let dump = SynthMinidump::new().add_stream(md::MDStreamType::MiscInfo as u32, vec![1, 2, 3, 4]);
        let bytes = dump.finish();
        assert!(bytes.len() > std::mem::size_of::<md::MDRawHeader>());
    }
}
