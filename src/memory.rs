// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The `MemoryList` and `Memory64List` streams.

use range_map::{Range, RangeMap};
use scroll::Pread;

use minidump_common::traits::IntoRangeMapSafe;

/// A contiguous region of memory copied from the crashed process.
#[derive(Debug)]
pub struct MinidumpMemory<'a> {
    pub base_address: u64,
    pub size: u64,
    pub bytes: &'a [u8],
}

impl<'a> MinidumpMemory<'a> {
    /// Read a value of type `T` out of this region at `address`, or `None`
    /// if `address` doesn't fall (with room for a whole `T`) inside it.
    pub fn get_memory_at_address<T>(&self, address: u64) -> Option<T>
    where
        T: scroll::ctx::TryFromCtx<'a, scroll::Endian, Error = scroll::Error>,
    {
        let offset = address.checked_sub(self.base_address)?;
        self.bytes.pread_with::<T>(offset as usize, scroll::LE).ok()
    }

    pub fn contains_address(&self, address: u64) -> bool {
        address >= self.base_address
            && address
                .checked_sub(self.base_address)
                .is_some_and(|off| off < self.size)
    }
}

/// All the stack-and-adjacent memory regions captured in a `MemoryList` or
/// `Memory64List` stream, indexed for fast lookup by address.
#[derive(Debug)]
pub struct MinidumpMemoryList<'a> {
    regions: Vec<MinidumpMemory<'a>>,
    regions_by_addr: RangeMap<u64, usize>,
}

impl<'a> MinidumpMemoryList<'a> {
    pub fn new(regions: Vec<MinidumpMemory<'a>>) -> MinidumpMemoryList<'a> {
        let regions_by_addr = regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.size > 0)
            .map(|(i, r)| (Range::new(r.base_address, r.base_address + r.size - 1), i))
            .into_rangemap_safe();
        MinidumpMemoryList {
            regions,
            regions_by_addr,
        }
    }

    /// The memory region containing `address`, if any was captured.
    pub fn memory_at_address(&self, address: u64) -> Option<&MinidumpMemory<'a>> {
        self.regions_by_addr
            .get(address)
            .map(|&idx| &self.regions[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MinidumpMemory<'a>> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_value_within_region() {
        let bytes = [0x78u8, 0x56, 0x34, 0x12];
        let mem = MinidumpMemory {
            base_address: 0x1000,
            size: 4,
            bytes: &bytes,
        };
        let value: u32 = mem.get_memory_at_address(0x1000).unwrap();
        assert_eq!(value, 0x1234_5678);
        assert!(mem.get_memory_at_address::<u32>(0x2000).is_none());
    }

    #[test]
    fn memory_list_finds_containing_region() {
        let bytes = vec![0u8; 16];
        let region = MinidumpMemory {
            base_address: 0x2000,
            size: 16,
            bytes: &bytes,
        };
        let list = MinidumpMemoryList::new(vec![region]);
        assert!(list.memory_at_address(0x2008).is_some());
        assert!(list.memory_at_address(0x1000).is_none());
    }
}
