// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The `Exception` stream and the crash-reason lookup table derived from it.

use std::fmt;

use minidump_common::format as md;

use crate::context::MinidumpContext;

/// A human-readable description of why a process crashed, derived from the
/// platform and the raw exception code/flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashReason {
    LinuxSignal { signal: u32, flags: u32 },
    LinuxGeneral { code: u32, flags: u32 },
    MacGeneral { code: u32 },
    WindowsGeneral { code: u32 },
    AndroidGeneral { code: u32, flags: u32 },
    Unknown { platform_id: u32, code: u32 },
}

impl CrashReason {
    /// Look up a `CrashReason` from the system's platform id and the raw
    /// exception code/flags in the `Exception` stream.
    pub fn from_exception(platform_id: u32, code: u32, flags: u32) -> CrashReason {
        match platform_id {
            // Linux
            0x8201 => CrashReason::LinuxSignal { signal: code, flags },
            // Android
            0x8203 => CrashReason::AndroidGeneral { code, flags },
            // macOS, iOS
            0x8101 | 0x8102 => CrashReason::MacGeneral { code },
            // Windows
            2 => CrashReason::WindowsGeneral { code },
            _ => CrashReason::Unknown { platform_id, code },
        }
    }
}

impl fmt::Display for CrashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CrashReason::LinuxSignal { signal, flags } => {
                let name = linux_signal_name(signal);
                let suffix = match (signal, flags) {
                    (11, 1) => " /MAPERR",
                    (11, 2) => " /ACCERR",
                    _ => "",
                };
                write!(f, "{name}{suffix}")
            }
            CrashReason::LinuxGeneral { code, flags } => {
                write!(f, "0x{code:x} / 0x{flags:x}")
            }
            CrashReason::MacGeneral { code } => write!(f, "{}", mac_exception_name(code)),
            CrashReason::WindowsGeneral { code } => write!(f, "0x{code:x}"),
            CrashReason::AndroidGeneral { code, flags: _ } => {
                write!(f, "{}", linux_signal_name(code))
            }
            CrashReason::Unknown { code, .. } => write!(f, "0x{code:x}"),
        }
    }
}

fn linux_signal_name(signal: u32) -> &'static str {
    match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        4 => "SIGILL",
        5 => "SIGTRAP",
        6 => "SIGABRT",
        7 => "SIGBUS",
        8 => "SIGFPE",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        15 => "SIGTERM",
        _ => "SIGNAL",
    }
}

fn mac_exception_name(code: u32) -> &'static str {
    match code {
        1 => "EXC_BAD_ACCESS",
        2 => "EXC_BAD_INSTRUCTION",
        3 => "EXC_ARITHMETIC",
        4 => "EXC_EMULATION",
        5 => "EXC_SOFTWARE",
        6 => "EXC_BREAKPOINT",
        _ => "EXC_UNKNOWN",
    }
}

/// A parsed `Exception` stream.
#[derive(Debug)]
pub struct MinidumpException {
    pub raw: md::MDRawExceptionStream,
    pub thread_id: u32,
    pub context: Option<MinidumpContext>,
}

impl MinidumpException {
    pub fn get_crash_address(&self, platform_id: u32) -> u64 {
        let _ = platform_id;
        self.raw.exception_record.exception_address
    }

    pub fn get_crash_reason(&self, platform_id: u32) -> CrashReason {
        CrashReason::from_exception(
            platform_id,
            self.raw.exception_record.exception_code,
            self.raw.exception_record.exception_flags,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_sigsegv_maperr() {
        let reason = CrashReason::from_exception(0x8201, 11, 1);
        assert_eq!(reason.to_string(), "SIGSEGV /MAPERR");
    }

    #[test]
    fn linux_sigsegv_accerr() {
        let reason = CrashReason::from_exception(0x8201, 11, 2);
        assert_eq!(reason.to_string(), "SIGSEGV /ACCERR");
    }

    #[test]
    fn mac_bad_access() {
        let reason = CrashReason::from_exception(0x8101, 1, 0);
        assert_eq!(reason.to_string(), "EXC_BAD_ACCESS");
    }

    #[test]
    fn unknown_platform_falls_back_to_hex() {
        let reason = CrashReason::from_exception(0xffff, 0xdead, 0);
        assert_eq!(reason.to_string(), "0xdead");
    }
}
