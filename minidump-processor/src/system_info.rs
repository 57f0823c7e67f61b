//! System information as reported in a built `ProcessState`.
//!
//! The minidump crate already parses the `SystemInfo` stream into
//! [`minidump::system_info::SystemInfo`]; this module just re-exports that
//! type so the rest of the processor can refer to `crate::system_info`
//! without reaching into `minidump` directly.

pub use minidump::system_info::{Cpu, Os, SystemInfo};
