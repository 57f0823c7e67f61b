// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Linux/Breakpad/Crashpad auxiliary streams.
//!
//! Most of the Linux-specific streams are just a verbatim copy of a file
//! from `/proc` at crash time (`/proc/cpuinfo`, `/proc/<pid>/status`,
//! `/proc/<pid>/maps`, `/proc/<pid>/cmdline`, `/proc/<pid>/environ`) or
//! `/etc/lsb-release`, glued into the dump as raw bytes by the writer.
//! They're exposed here as the text they were always meant to be; none of
//! them participate in stackwalking directly.

use minidump_common::format as md;

/// `/proc/cpuinfo` at crash time.
#[derive(Debug, Clone)]
pub struct LinuxCpuInfo(pub String);

/// `/proc/<pid>/status` at crash time.
#[derive(Debug, Clone)]
pub struct LinuxProcStatus(pub String);

/// `/etc/lsb-release` at crash time.
#[derive(Debug, Clone)]
pub struct LinuxLsbRelease(pub String);

/// `/proc/<pid>/cmdline`, NUL-separated arguments.
#[derive(Debug, Clone)]
pub struct LinuxCmdLine(pub Vec<String>);

impl LinuxCmdLine {
    pub fn from_bytes(bytes: &[u8]) -> LinuxCmdLine {
        let args = bytes
            .split(|&b| b == 0)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        LinuxCmdLine(args)
    }
}

/// `/proc/<pid>/environ`, NUL-separated `KEY=VALUE` pairs.
#[derive(Debug, Clone)]
pub struct LinuxEnviron(pub Vec<String>);

impl LinuxEnviron {
    pub fn from_bytes(bytes: &[u8]) -> LinuxEnviron {
        let vars = bytes
            .split(|&b| b == 0)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        LinuxEnviron(vars)
    }
}

/// The raw `/proc/<pid>/auxv` bytes; entries are native-word `(type, value)`
/// pairs whose width depends on the crashing process, not this host.
#[derive(Debug, Clone)]
pub struct LinuxAuxv(pub Vec<u8>);

/// `/proc/<pid>/maps` at crash time.
#[derive(Debug, Clone)]
pub struct LinuxMaps(pub String);

/// `link_map`/`r_debug` state copied from the crashing process, used to
/// cross-check the `ModuleList` against the dynamic linker's own view.
#[derive(Debug, Clone)]
pub struct LinuxDsoDebug(pub Vec<u8>);

/// The Breakpad-specific `BreakpadInfo` stream: which thread wrote the dump
/// and, if the crash was requested rather than a real fault, which thread
/// asked for it.
#[derive(Debug, Clone)]
pub struct MinidumpBreakpadInfo {
    pub raw: md::MDRawBreakpadInfo,
    pub valid: md::BreakpadInfoValid,
}

impl MinidumpBreakpadInfo {
    pub fn new(raw: md::MDRawBreakpadInfo) -> MinidumpBreakpadInfo {
        let valid = md::BreakpadInfoValid::from_bits_truncate(raw.validity);
        MinidumpBreakpadInfo { raw, valid }
    }

    pub fn dump_thread_id(&self) -> Option<u32> {
        self.valid
            .contains(md::BreakpadInfoValid::DUMP_THREAD_ID)
            .then_some(self.raw.dump_thread_id)
    }

    pub fn requesting_thread_id(&self) -> Option<u32> {
        self.valid
            .contains(md::BreakpadInfoValid::REQUESTING_THREAD_ID)
            .then_some(self.raw.requesting_thread_id)
    }
}

/// A `assert()`/`NOTREACHED()`-style assertion that triggered the dump.
#[derive(Debug, Clone)]
pub struct MinidumpAssertion {
    pub expression: String,
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl MinidumpAssertion {
    pub fn new(raw: &md::MDRawAssertionInfo) -> MinidumpAssertion {
        use crate::iostuff::utf16_fixed_to_string;
        MinidumpAssertion {
            expression: utf16_fixed_to_string(&raw.expression),
            function: utf16_fixed_to_string(&raw.function),
            file: utf16_fixed_to_string(&raw.file),
            line: raw.line,
        }
    }
}

/// The Crashpad-specific annotations stream: simple and module-scoped
/// key/value metadata the crash handler attached at dump time.
#[derive(Debug, Clone, Default)]
pub struct MinidumpCrashpadInfo {
    pub simple_annotations: std::collections::BTreeMap<String, String>,
    pub module_annotations: Vec<(usize, std::collections::BTreeMap<String, String>)>,
}

/// One descriptor out of the `HandleData` stream; the stream has three
/// on-disk layouts distinguished by `size_of_descriptor`, so only the
/// fields common to all of them are kept.
#[derive(Debug, Clone)]
pub struct MinidumpHandleDescriptor {
    pub handle: u64,
    pub type_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MinidumpHandleDataStream {
    pub handles: Vec<MinidumpHandleDescriptor>,
}

/// Thread names from the `ThreadNames` stream, keyed by thread id.
#[derive(Debug, Clone, Default)]
pub struct MinidumpThreadNames {
    pub names: std::collections::BTreeMap<u32, String>,
}

impl MinidumpThreadNames {
    pub fn get_name(&self, thread_id: u32) -> Option<&str> {
        self.names.get(&thread_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmdline_splits_on_nul() {
        let cmdline = LinuxCmdLine::from_bytes(b"/bin/foo\0--flag\0value\0");
        assert_eq!(cmdline.0, vec!["/bin/foo", "--flag", "value"]);
    }

    #[test]
    fn environ_splits_on_nul() {
        let environ = LinuxEnviron::from_bytes(b"PATH=/bin\0HOME=/root\0");
        assert_eq!(environ.0, vec!["PATH=/bin", "HOME=/root"]);
    }

    #[test]
    fn breakpad_info_requires_validity_bit() {
        let raw = md::MDRawBreakpadInfo {
            validity: md::BreakpadInfoValid::DUMP_THREAD_ID.bits(),
            dump_thread_id: 7,
            requesting_thread_id: 0,
        };
        let info = MinidumpBreakpadInfo::new(raw);
        assert_eq!(info.dump_thread_id(), Some(7));
        assert_eq!(info.requesting_thread_id(), None);
    }

    #[test]
    fn thread_names_lookup() {
        let mut names = MinidumpThreadNames::default();
        names.names.insert(42, "main".to_string());
        assert_eq!(names.get_name(42), Some("main"));
        assert_eq!(names.get_name(1), None);
    }
}
