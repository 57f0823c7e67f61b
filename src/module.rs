// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The `ModuleList` and `UnloadedModuleList` streams.

use std::borrow::Cow;

use minidump_common::format as md;
use minidump_common::traits::{IntoRangeMapSafe, Module};
use range_map::{Range, RangeMap};

/// A code module that was loaded into the process at the time of the crash.
#[derive(Debug, Clone)]
pub struct MinidumpModule {
    pub raw: md::MDRawModule,
    pub name: String,
    pub codeview_info: Option<CodeViewRecord>,
}

/// The portion of a PDB70 CodeView record this reader understands: a debug
/// identifier (GUID + age) and the PDB's own file name.
#[derive(Debug, Clone)]
pub struct CodeViewRecord {
    pub guid: [u8; 16],
    pub age: u32,
    pub pdb_file_name: String,
}

impl MinidumpModule {
    pub fn new(raw: md::MDRawModule, name: String, codeview_info: Option<CodeViewRecord>) -> MinidumpModule {
        MinidumpModule {
            raw,
            name,
            codeview_info,
        }
    }
}

impl Module for MinidumpModule {
    fn base_address(&self) -> u64 {
        self.raw.base_of_image
    }

    fn size(&self) -> u64 {
        self.raw.size_of_image as u64
    }

    fn code_file(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn code_identifier(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "{:08X}{:x}",
            self.raw.time_date_stamp, self.raw.size_of_image
        ))
    }

    fn debug_file(&self) -> Option<Cow<'_, str>> {
        self.codeview_info
            .as_ref()
            .map(|cv| Cow::Borrowed(cv.pdb_file_name.as_str()))
    }

    fn debug_identifier(&self) -> Option<Cow<'_, str>> {
        self.codeview_info.as_ref().map(|cv| {
            let mut id = String::with_capacity(33);
            // Breakpad's GUID-as-hex ordering: swap the first three fields
            // of the GUID to big-endian the way the Windows PDB70 debug
            // directory stores them, then print the tail verbatim.
            id.push_str(&format!(
                "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
                cv.guid[3], cv.guid[2], cv.guid[1], cv.guid[0], cv.guid[5], cv.guid[4], cv.guid[7], cv.guid[6]
            ));
            for byte in &cv.guid[8..16] {
                id.push_str(&format!("{byte:02X}"));
            }
            id.push_str(&format!("{:x}", cv.age));
            Cow::Owned(id)
        })
    }

    fn version(&self) -> Option<Cow<'_, str>> {
        let info = &self.raw.version_info;
        if info.signature != 0xfeef_04bd {
            return None;
        }
        Some(Cow::Owned(format!(
            "{}.{}.{}.{}",
            info.file_version_hi >> 16,
            info.file_version_hi & 0xffff,
            info.file_version_lo >> 16,
            info.file_version_lo & 0xffff,
        )))
    }
}

/// A list of `MinidumpModule`s, indexed by the address range they occupy.
#[derive(Debug)]
pub struct MinidumpModuleList {
    modules: Vec<MinidumpModule>,
    modules_by_addr: RangeMap<u64, usize>,
    /// Diagnostics for modules whose address ranges overlapped another
    /// module's; the interval tree keeps the first-inserted module at each
    /// overlapping point, and the rest are recorded here instead of being
    /// silently dropped.
    overlaps: Vec<String>,
}

impl MinidumpModuleList {
    pub fn new(modules: Vec<MinidumpModule>) -> MinidumpModuleList {
        let mut overlaps = Vec::new();
        let modules_by_addr = modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.size() > 0)
            .map(|(i, m)| {
                (
                    Range::new(m.base_address(), m.base_address() + m.size() - 1),
                    i,
                )
            })
            .into_rangemap_safe_with_diagnostics(&mut overlaps);
        MinidumpModuleList {
            modules,
            modules_by_addr,
            overlaps,
        }
    }

    /// The module containing `address`, if any.
    pub fn module_at_address(&self, address: u64) -> Option<&MinidumpModule> {
        self.modules_by_addr
            .get(address)
            .map(|&idx| &self.modules[idx])
    }

    /// The module at the given position in load order, if any.
    pub fn module_at_sequence(&self, i: usize) -> Option<&MinidumpModule> {
        self.modules.get(i)
    }

    /// The number of modules in the list.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Human-readable diagnostics, one per pair of modules whose address
    /// ranges overlapped. The interval tree resolves each overlapping
    /// address to whichever of the two modules was inserted first; these
    /// strings let a caller surface the rest instead of losing them.
    pub fn overlapping_modules(&self) -> &[String] {
        &self.overlaps
    }

    /// The first loaded module, which by minidump convention is the
    /// executable that was running.
    pub fn main_module(&self) -> Option<&MinidumpModule> {
        self.modules.first()
    }

    /// All modules, in address order.
    pub fn by_addr(&self) -> impl Iterator<Item = &MinidumpModule> {
        let mut sorted: Vec<&MinidumpModule> = self.modules.iter().collect();
        sorted.sort_by_key(|m| m.base_address());
        sorted.into_iter()
    }

    /// All modules, in the order they appeared in the stream.
    pub fn iter(&self) -> impl Iterator<Item = &MinidumpModule> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// A module that was loaded and then unloaded before the crash.
#[derive(Debug, Clone)]
pub struct MinidumpUnloadedModule {
    pub raw: md::MDRawUnloadedModule,
    pub name: String,
}

impl Module for MinidumpUnloadedModule {
    fn base_address(&self) -> u64 {
        self.raw.base_of_image
    }

    fn size(&self) -> u64 {
        self.raw.size_of_image as u64
    }

    fn code_file(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn code_identifier(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "{:08X}{:x}",
            self.raw.time_date_stamp, self.raw.size_of_image
        ))
    }

    fn debug_file(&self) -> Option<Cow<'_, str>> {
        None
    }

    fn debug_identifier(&self) -> Option<Cow<'_, str>> {
        None
    }

    fn version(&self) -> Option<Cow<'_, str>> {
        None
    }
}

#[derive(Debug)]
pub struct MinidumpUnloadedModuleList {
    modules: Vec<MinidumpUnloadedModule>,
}

impl MinidumpUnloadedModuleList {
    pub fn new(modules: Vec<MinidumpUnloadedModule>) -> MinidumpUnloadedModuleList {
        MinidumpUnloadedModuleList { modules }
    }

    pub fn by_addr(&self) -> impl Iterator<Item = &MinidumpUnloadedModule> {
        let mut sorted: Vec<&MinidumpUnloadedModule> = self.modules.iter().collect();
        sorted.sort_by_key(|m| m.base_address());
        sorted.into_iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MinidumpUnloadedModule> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_module(base: u64, size: u32) -> MinidumpModule {
        let raw = md::MDRawModule {
            base_of_image: base,
            size_of_image: size,
            checksum: 0,
            time_date_stamp: 0x1234_5678,
            module_name_rva: 0,
            version_info: md::MDVSFixedFileInfo {
                signature: 0,
                struct_version: 0,
                file_version_hi: 0,
                file_version_lo: 0,
                product_version_hi: 0,
                product_version_lo: 0,
                file_flags_mask: 0,
                file_flags: 0,
                file_os: 0,
                file_type: 0,
                file_subtype: 0,
                file_date_hi: 0,
                file_date_lo: 0,
            },
            cv_record: md::MDLocationDescriptor {
                data_size: 0,
                rva: 0,
            },
            misc_record: md::MDLocationDescriptor {
                data_size: 0,
                rva: 0,
            },
            reserved0: [0; 2],
            reserved1: [0; 2],
        };
        MinidumpModule::new(raw, "libfoo.so".to_string(), None)
    }

    #[test]
    fn module_at_address_finds_containing_module() {
        let list = MinidumpModuleList::new(vec![fake_module(0x1000, 0x1000)]);
        assert!(list.module_at_address(0x1500).is_some());
        assert!(list.module_at_address(0x500).is_none());
        assert!(list.module_at_address(0x2000).is_none());
    }

    #[test]
    fn code_identifier_matches_pe_convention() {
        let module = fake_module(0x1000, 0x2000);
        assert_eq!(module.code_identifier(), "123456782000");
    }

    #[test]
    fn sequence_access_matches_load_order() {
        let list = MinidumpModuleList::new(vec![
            fake_module(0x1000, 0x1000),
            fake_module(0x3000, 0x1000),
        ]);
        assert_eq!(list.module_count(), 2);
        assert_eq!(list.module_at_sequence(0).unwrap().base_address(), 0x1000);
        assert_eq!(list.module_at_sequence(1).unwrap().base_address(), 0x3000);
        assert!(list.module_at_sequence(2).is_none());
    }

    #[test]
    fn overlapping_modules_are_diagnosed_not_dropped() {
        // Second module's range [0x1800, 0x2800) overlaps the first's
        // [0x1000, 0x2000); the tree keeps the first-inserted module at
        // every overlapping address, but the overlap itself is recorded.
        let list = MinidumpModuleList::new(vec![
            fake_module(0x1000, 0x1000),
            fake_module(0x1800, 0x1000),
        ]);
        assert_eq!(list.module_count(), 2);
        assert_eq!(list.overlapping_modules().len(), 1);
        assert_eq!(
            list.module_at_address(0x1900).unwrap().base_address(),
            0x1000
        );
    }
}
