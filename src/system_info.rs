// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Operating system and CPU identification.

use std::fmt;

use minidump_common::format as md;

/// The operating system that produced a minidump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Windows,
    MacOs,
    Ios,
    Linux,
    Solaris,
    Android,
    Ps3,
    NaCl,
    Fuchsia,
    Unknown(u32),
}

impl Os {
    pub fn from_platform_id(platform_id: u32) -> Os {
        use num_traits::FromPrimitive;
        match md::PlatformId::from_u32(platform_id) {
            Some(md::PlatformId::Win32S)
            | Some(md::PlatformId::Win32Windows)
            | Some(md::PlatformId::Win32Nt)
            | Some(md::PlatformId::Win32CE) => Os::Windows,
            Some(md::PlatformId::MacOs) => Os::MacOs,
            Some(md::PlatformId::Ios) => Os::Ios,
            Some(md::PlatformId::Linux) | Some(md::PlatformId::Unix) => Os::Linux,
            Some(md::PlatformId::Solaris) => Os::Solaris,
            Some(md::PlatformId::Android) => Os::Android,
            Some(md::PlatformId::Ps3) => Os::Ps3,
            Some(md::PlatformId::NaCl) => Os::NaCl,
            Some(md::PlatformId::Fuchsia) => Os::Fuchsia,
            None => Os::Unknown(platform_id),
        }
    }

    /// A human-readable name, matching what crash-stats.mozilla.org expects.
    pub fn long_name(&self) -> String {
        match *self {
            Os::Windows => "Windows NT".to_string(),
            Os::MacOs => "Mac OS X".to_string(),
            Os::Ios => "iOS".to_string(),
            Os::Linux => "Linux".to_string(),
            Os::Solaris => "Solaris".to_string(),
            Os::Android => "Android".to_string(),
            Os::Ps3 => "PS3".to_string(),
            Os::NaCl => "NaCl".to_string(),
            Os::Fuchsia => "Fuchsia".to_string(),
            Os::Unknown(id) => format!("unknown ({id:#x})"),
        }
    }

    /// A representative `MDRawSystemInfo::platform_id` value for this OS,
    /// the inverse of [`Os::from_platform_id`]. Used to look up a
    /// [`CrashReason`][crate::CrashReason] after the original raw id has
    /// already been folded into an `Os`.
    pub fn platform_id(&self) -> u32 {
        match *self {
            Os::Windows => md::PlatformId::Win32Nt as u32,
            Os::MacOs => md::PlatformId::MacOs as u32,
            Os::Ios => md::PlatformId::Ios as u32,
            Os::Linux => md::PlatformId::Linux as u32,
            Os::Solaris => md::PlatformId::Solaris as u32,
            Os::Android => md::PlatformId::Android as u32,
            Os::Ps3 => md::PlatformId::Ps3 as u32,
            Os::NaCl => md::PlatformId::NaCl as u32,
            Os::Fuchsia => md::PlatformId::Fuchsia as u32,
            Os::Unknown(id) => id,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Os::Windows => "windows",
            Os::MacOs => "mac",
            Os::Ios => "ios",
            Os::Linux => "linux",
            Os::Solaris => "solaris",
            Os::Android => "android",
            Os::Ps3 => "ps3",
            Os::NaCl => "nacl",
            Os::Fuchsia => "fuchsia",
            Os::Unknown(_) => return write!(f, "{}", self.long_name()),
        };
        write!(f, "{s}")
    }
}

/// The CPU architecture that produced a minidump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cpu {
    X86,
    X86_64,
    Ppc,
    Ppc64,
    Arm,
    Arm64,
    Mips,
    Mips64,
    Sparc,
    Riscv,
    Riscv64,
    Unknown(u16),
}

impl Cpu {
    pub fn from_processor_architecture(arch: u16) -> Cpu {
        use num_traits::FromPrimitive;
        match md::ProcessorArchitecture::from_u16(arch) {
            Some(md::ProcessorArchitecture::X86) => Cpu::X86,
            Some(md::ProcessorArchitecture::Amd64) => Cpu::X86_64,
            Some(md::ProcessorArchitecture::Ppc) => Cpu::Ppc,
            Some(md::ProcessorArchitecture::Arm) => Cpu::Arm,
            Some(md::ProcessorArchitecture::Arm64) | Some(md::ProcessorArchitecture::Arm64Old) => {
                Cpu::Arm64
            }
            Some(md::ProcessorArchitecture::Mips) => Cpu::Mips,
            Some(md::ProcessorArchitecture::Sparc) => Cpu::Sparc,
            Some(md::ProcessorArchitecture::Riscv) => Cpu::Riscv,
            Some(md::ProcessorArchitecture::Riscv64) => Cpu::Riscv64,
            _ => Cpu::Unknown(arch),
        }
    }

    /// The pointer width of this architecture, in bytes.
    pub fn pointer_width(&self) -> u8 {
        match *self {
            Cpu::X86 | Cpu::Ppc | Cpu::Arm | Cpu::Mips | Cpu::Riscv => 4,
            Cpu::X86_64 | Cpu::Ppc64 | Cpu::Arm64 | Cpu::Mips64 | Cpu::Sparc | Cpu::Riscv64 => 8,
            Cpu::Unknown(_) => 8,
        }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Cpu::X86 => "x86",
            Cpu::X86_64 => "amd64",
            Cpu::Ppc => "ppc",
            Cpu::Ppc64 => "ppc64",
            Cpu::Arm => "arm",
            Cpu::Arm64 => "arm64",
            Cpu::Mips => "mips",
            Cpu::Mips64 => "mips64",
            Cpu::Sparc => "sparc",
            Cpu::Riscv => "riscv",
            Cpu::Riscv64 => "riscv64",
            Cpu::Unknown(id) => return write!(f, "unknown ({id:#x})"),
        };
        write!(f, "{s}")
    }
}

/// System information extracted from a minidump's `SystemInfo` stream.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: Os,
    pub os_version: Option<String>,
    pub cpu: Cpu,
    pub cpu_info: Option<String>,
    pub cpu_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_from_platform_id() {
        assert_eq!(Os::from_platform_id(0x8201), Os::Linux);
        assert_eq!(Os::from_platform_id(2), Os::Windows);
        assert_eq!(Os::from_platform_id(0xffff_ffff), Os::Unknown(0xffff_ffff));
    }

    #[test]
    fn cpu_pointer_width() {
        assert_eq!(Cpu::X86.pointer_width(), 4);
        assert_eq!(Cpu::X86_64.pointer_width(), 8);
    }
}
