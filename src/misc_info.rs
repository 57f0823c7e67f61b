// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The `MiscInfo` stream.
//!
//! `MINIDUMP_MISC_INFO` grew several times over the years (v1 through v5);
//! every version shares the same 24-byte v1 prefix, so a dumper from an
//! older Windows still produces something this reader can parse. Anything
//! past the prefix is read only if `data_size` says it's actually present.

use minidump_common::format as md;

/// A parsed `MiscInfo` stream. Only the v1 prefix fields are always valid;
/// `process_create_time` in particular requires the `PROCESS_TIMES` flag.
#[derive(Debug, Clone)]
pub struct MinidumpMiscInfo {
    pub raw: md::MDRawMiscInfo,
    pub flags: md::MiscInfoFlags1,
}

impl MinidumpMiscInfo {
    pub fn new(raw: md::MDRawMiscInfo) -> MinidumpMiscInfo {
        let flags = md::MiscInfoFlags1::from_bits_truncate(raw.flags1);
        MinidumpMiscInfo { raw, flags }
    }

    pub fn process_id(&self) -> Option<u32> {
        self.flags
            .contains(md::MiscInfoFlags1::PROCESS_ID)
            .then_some(self.raw.process_id)
    }

    pub fn process_create_time(&self) -> Option<u32> {
        self.flags
            .contains(md::MiscInfoFlags1::PROCESS_TIMES)
            .then_some(self.raw.process_create_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_requires_flag() {
        let raw = md::MDRawMiscInfo {
            size_of_info: 24,
            flags1: md::MiscInfoFlags1::PROCESS_ID.bits(),
            process_id: 4242,
            process_create_time: 0,
            process_user_time: 0,
            process_kernel_time: 0,
        };
        let info = MinidumpMiscInfo::new(raw);
        assert_eq!(info.process_id(), Some(4242));
        assert_eq!(info.process_create_time(), None);
    }
}
