// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! CPU contexts.

use scroll::{self, Pread};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::io::prelude::*;
use std::mem;

use minidump_common::format as md;
use minidump_common::format::ContextFlagsCpu;

/// The CPU-specific context structure.
#[derive(Debug, Clone)]
pub enum MinidumpRawContext {
    X86(md::CONTEXT_X86),
    Ppc(md::CONTEXT_PPC),
    Ppc64(md::CONTEXT_PPC64),
    Amd64(md::CONTEXT_AMD64),
    Sparc(md::CONTEXT_SPARC),
    Arm(md::CONTEXT_ARM),
    Arm64(md::CONTEXT_ARM64),
    OldArm64(md::CONTEXT_ARM64_OLD),
    Mips(md::CONTEXT_MIPS),
    Riscv(md::CONTEXT_RISCV),
    Riscv64(md::CONTEXT_RISCV64),
}

/// Generic over the specifics of a CPU context.
pub trait CpuContext {
    /// The word size of general-purpose registers in the context.
    type Register: fmt::LowerHex;

    /// Get a register value if it is valid.
    ///
    /// Get the value of the register named `reg` from this CPU context
    /// if `valid` indicates that it has a valid value, otherwise return
    /// `None`.
    fn get_register(&self, reg: &str, valid: &MinidumpContextValidity) -> Option<Self::Register> {
        if let MinidumpContextValidity::Some(ref which) = *valid {
            if !which.contains(reg) {
                return None;
            }
        }
        Some(self.get_register_always(reg))
    }

    /// Get a register value regardless of whether it is valid.
    fn get_register_always(&self, reg: &str) -> Self::Register;

    /// Set a register value, if that register name it exists.
    ///
    /// Returns None if the register name isn't supported.
    fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()>;

    /// Gets a static version of the given register name, if possible.
    fn memoize_register(&self, reg: &str) -> Option<&'static str>;

    /// Return a String containing the value of `reg` formatted to its natural width.
    fn format_register(&self, reg: &str) -> String {
        format!(
            "0x{:01$x}",
            self.get_register_always(reg),
            mem::size_of::<Self::Register>() * 2
        )
    }

    /// Gets the name of the stack pointer register (for use with get_register/set_register).
    fn stack_pointer_register_name(&self) -> &'static str;
    /// Gets the name of the instruction pointer register (for use with get_register/set_register).
    fn instruction_pointer_register_name(&self) -> &'static str;
}

impl CpuContext for md::CONTEXT_X86 {
    type Register = u32;

    fn get_register_always(&self, reg: &str) -> u32 {
        match reg {
            "eip" => self.eip,
            "esp" => self.esp,
            "ebp" => self.ebp,
            "ebx" => self.ebx,
            "esi" => self.esi,
            "edi" => self.edi,
            "eax" => self.eax,
            "ecx" => self.ecx,
            "edx" => self.edx,
            "efl" => self.eflags,
            _ => unreachable!("Invalid x86 register!"),
        }
    }

    fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
        match reg {
            "eip" => self.eip = val,
            "esp" => self.esp = val,
            "ebp" => self.ebp = val,
            "ebx" => self.ebx = val,
            "esi" => self.esi = val,
            "edi" => self.edi = val,
            "eax" => self.eax = val,
            "ecx" => self.ecx = val,
            "edx" => self.edx = val,
            "efl" => self.eflags = val,
            _ => return None,
        }
        Some(())
    }

    fn memoize_register(&self, reg: &str) -> Option<&'static str> {
        let idx = X86_REGS.iter().position(|val| *val == reg)?;
        Some(X86_REGS[idx])
    }

    fn stack_pointer_register_name(&self) -> &'static str {
        "esp"
    }

    fn instruction_pointer_register_name(&self) -> &'static str {
        "eip"
    }
}

impl CpuContext for md::CONTEXT_AMD64 {
    type Register = u64;

    fn get_register_always(&self, reg: &str) -> u64 {
        match reg {
            "rax" => self.rax,
            "rdx" => self.rdx,
            "rcx" => self.rcx,
            "rbx" => self.rbx,
            "rsi" => self.rsi,
            "rdi" => self.rdi,
            "rbp" => self.rbp,
            "rsp" => self.rsp,
            "r8" => self.r8,
            "r9" => self.r9,
            "r10" => self.r10,
            "r11" => self.r11,
            "r12" => self.r12,
            "r13" => self.r13,
            "r14" => self.r14,
            "r15" => self.r15,
            "rip" => self.rip,
            _ => unreachable!("Invalid x86-64 register!"),
        }
    }

    fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
        match reg {
            "rax" => self.rax = val,
            "rdx" => self.rdx = val,
            "rcx" => self.rcx = val,
            "rbx" => self.rbx = val,
            "rsi" => self.rsi = val,
            "rdi" => self.rdi = val,
            "rbp" => self.rbp = val,
            "rsp" => self.rsp = val,
            "r8" => self.r8 = val,
            "r9" => self.r9 = val,
            "r10" => self.r10 = val,
            "r11" => self.r11 = val,
            "r12" => self.r12 = val,
            "r13" => self.r13 = val,
            "r14" => self.r14 = val,
            "r15" => self.r15 = val,
            "rip" => self.rip = val,
            _ => return None,
        }
        Some(())
    }

    fn memoize_register(&self, reg: &str) -> Option<&'static str> {
        let idx = X86_64_REGS.iter().position(|val| *val == reg)?;
        Some(X86_64_REGS[idx])
    }

    fn stack_pointer_register_name(&self) -> &'static str {
        "rsp"
    }

    fn instruction_pointer_register_name(&self) -> &'static str {
        "rip"
    }
}

macro_rules! impl_arm64_context {
    ($ty:ty) => {
        impl CpuContext for $ty {
            type Register = u64;

            fn get_register_always(&self, reg: &str) -> u64 {
                match reg {
                    "x0" => self.iregs[0],
                    "x1" => self.iregs[1],
                    "x2" => self.iregs[2],
                    "x3" => self.iregs[3],
                    "x4" => self.iregs[4],
                    "x5" => self.iregs[5],
                    "x6" => self.iregs[6],
                    "x7" => self.iregs[7],
                    "x8" => self.iregs[8],
                    "x9" => self.iregs[9],
                    "x10" => self.iregs[10],
                    "x11" => self.iregs[11],
                    "x12" => self.iregs[12],
                    "x13" => self.iregs[13],
                    "x14" => self.iregs[14],
                    "x15" => self.iregs[15],
                    "x16" => self.iregs[16],
                    "x17" => self.iregs[17],
                    "x18" => self.iregs[18],
                    "x19" => self.iregs[19],
                    "x20" => self.iregs[20],
                    "x21" => self.iregs[21],
                    "x22" => self.iregs[22],
                    "x23" => self.iregs[23],
                    "x24" => self.iregs[24],
                    "x25" => self.iregs[25],
                    "x26" => self.iregs[26],
                    "x27" => self.iregs[27],
                    "x28" => self.iregs[28],
                    "x29" => self.iregs[29],
                    "x30" => self.iregs[30],
                    "x31" => self.iregs[31],
                    "pc" => self.iregs[32],
                    "fp" => self.iregs[md::Arm64RegisterNumbers::FramePointer as usize],
                    "sp" => self.iregs[md::Arm64RegisterNumbers::StackPointer as usize],
                    "lr" => self.iregs[md::Arm64RegisterNumbers::LinkRegister as usize],
                    _ => unreachable!("Invalid aarch64 register!"),
                }
            }

            fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
                match reg {
                    "x0" => self.iregs[0] = val,
                    "x1" => self.iregs[1] = val,
                    "x2" => self.iregs[2] = val,
                    "x3" => self.iregs[3] = val,
                    "x4" => self.iregs[4] = val,
                    "x5" => self.iregs[5] = val,
                    "x6" => self.iregs[6] = val,
                    "x7" => self.iregs[7] = val,
                    "x8" => self.iregs[8] = val,
                    "x9" => self.iregs[9] = val,
                    "x10" => self.iregs[10] = val,
                    "x11" => self.iregs[11] = val,
                    "x12" => self.iregs[12] = val,
                    "x13" => self.iregs[13] = val,
                    "x14" => self.iregs[14] = val,
                    "x15" => self.iregs[15] = val,
                    "x16" => self.iregs[16] = val,
                    "x17" => self.iregs[17] = val,
                    "x18" => self.iregs[18] = val,
                    "x19" => self.iregs[19] = val,
                    "x20" => self.iregs[20] = val,
                    "x21" => self.iregs[21] = val,
                    "x22" => self.iregs[22] = val,
                    "x23" => self.iregs[23] = val,
                    "x24" => self.iregs[24] = val,
                    "x25" => self.iregs[25] = val,
                    "x26" => self.iregs[26] = val,
                    "x27" => self.iregs[27] = val,
                    "x28" => self.iregs[28] = val,
                    "x29" => self.iregs[29] = val,
                    "x30" => self.iregs[30] = val,
                    "x31" => self.iregs[31] = val,
                    "pc" => self.iregs[32] = val,
                    "fp" => self.iregs[md::Arm64RegisterNumbers::FramePointer as usize] = val,
                    "sp" => self.iregs[md::Arm64RegisterNumbers::StackPointer as usize] = val,
                    "lr" => self.iregs[md::Arm64RegisterNumbers::LinkRegister as usize] = val,
                    _ => return None,
                }
                Some(())
            }

            fn memoize_register(&self, reg: &str) -> Option<&'static str> {
                let idx = ARM64_REGS.iter().position(|val| *val == reg)?;
                Some(ARM64_REGS[idx])
            }

            fn stack_pointer_register_name(&self) -> &'static str {
                "sp"
            }

            fn instruction_pointer_register_name(&self) -> &'static str {
                "pc"
            }
        }
    };
}

impl_arm64_context!(md::CONTEXT_ARM64);
impl_arm64_context!(md::CONTEXT_ARM64_OLD);

impl CpuContext for md::CONTEXT_ARM {
    type Register = u32;

    fn get_register_always(&self, reg: &str) -> u32 {
        match reg {
            "r0" => self.iregs[0],
            "r1" => self.iregs[1],
            "r2" => self.iregs[2],
            "r3" => self.iregs[3],
            "r4" => self.iregs[4],
            "r5" => self.iregs[5],
            "r6" => self.iregs[6],
            "r7" => self.iregs[7],
            "r8" => self.iregs[8],
            "r9" => self.iregs[9],
            "r10" => self.iregs[10],
            "fp" => self.iregs[md::ArmRegisterNumbers::FramePointer as usize],
            "sp" => self.iregs[md::ArmRegisterNumbers::StackPointer as usize],
            "lr" => self.iregs[md::ArmRegisterNumbers::LinkRegister as usize],
            "pc" => self.iregs[md::ArmRegisterNumbers::ProgramCounter as usize],
            "cpsr" => self.cpsr,
            _ => unreachable!("Invalid arm register!"),
        }
    }

    fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
        match reg {
            "r0" => self.iregs[0] = val,
            "r1" => self.iregs[1] = val,
            "r2" => self.iregs[2] = val,
            "r3" => self.iregs[3] = val,
            "r4" => self.iregs[4] = val,
            "r5" => self.iregs[5] = val,
            "r6" => self.iregs[6] = val,
            "r7" => self.iregs[7] = val,
            "r8" => self.iregs[8] = val,
            "r9" => self.iregs[9] = val,
            "r10" => self.iregs[10] = val,
            "fp" => self.iregs[md::ArmRegisterNumbers::FramePointer as usize] = val,
            "sp" => self.iregs[md::ArmRegisterNumbers::StackPointer as usize] = val,
            "lr" => self.iregs[md::ArmRegisterNumbers::LinkRegister as usize] = val,
            "pc" => self.iregs[md::ArmRegisterNumbers::ProgramCounter as usize] = val,
            "cpsr" => self.cpsr = val,
            _ => return None,
        }
        Some(())
    }

    fn memoize_register(&self, reg: &str) -> Option<&'static str> {
        let idx = ARM_REGS.iter().position(|val| *val == reg)?;
        Some(ARM_REGS[idx])
    }

    fn stack_pointer_register_name(&self) -> &'static str {
        "sp"
    }

    fn instruction_pointer_register_name(&self) -> &'static str {
        "pc"
    }
}

macro_rules! impl_ppc_context {
    ($ty:ty, $reg:ty, $stack_idx:expr) => {
        impl CpuContext for $ty {
            type Register = $reg;

            fn get_register_always(&self, reg: &str) -> Self::Register {
                match reg {
                    "r0" => self.gpr[0],
                    "r1" => self.gpr[1],
                    "r2" => self.gpr[2],
                    "r3" => self.gpr[3],
                    "r4" => self.gpr[4],
                    "r5" => self.gpr[5],
                    "r6" => self.gpr[6],
                    "r7" => self.gpr[7],
                    "r8" => self.gpr[8],
                    "r9" => self.gpr[9],
                    "r10" => self.gpr[10],
                    "r11" => self.gpr[11],
                    "r12" => self.gpr[12],
                    "r13" => self.gpr[13],
                    "r14" => self.gpr[14],
                    "r15" => self.gpr[15],
                    "r16" => self.gpr[16],
                    "r17" => self.gpr[17],
                    "r18" => self.gpr[18],
                    "r19" => self.gpr[19],
                    "r20" => self.gpr[20],
                    "r21" => self.gpr[21],
                    "r22" => self.gpr[22],
                    "r23" => self.gpr[23],
                    "r24" => self.gpr[24],
                    "r25" => self.gpr[25],
                    "r26" => self.gpr[26],
                    "r27" => self.gpr[27],
                    "r28" => self.gpr[28],
                    "r29" => self.gpr[29],
                    "r30" => self.gpr[30],
                    "r31" => self.gpr[31],
                    "sp" => self.gpr[$stack_idx],
                    "lr" => self.lr,
                    "ctr" => self.ctr,
                    "srr0" => self.srr0,
                    _ => unreachable!("Invalid ppc register!"),
                }
            }

            fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
                match reg {
                    "r0" => self.gpr[0] = val,
                    "r1" => self.gpr[1] = val,
                    "sp" => self.gpr[$stack_idx] = val,
                    "lr" => self.lr = val,
                    "ctr" => self.ctr = val,
                    "srr0" => self.srr0 = val,
                    _ => return None,
                }
                Some(())
            }

            fn memoize_register(&self, reg: &str) -> Option<&'static str> {
                let idx = PPC_REGS.iter().position(|val| *val == reg)?;
                Some(PPC_REGS[idx])
            }

            fn stack_pointer_register_name(&self) -> &'static str {
                "sp"
            }

            fn instruction_pointer_register_name(&self) -> &'static str {
                "srr0"
            }
        }
    };
}

impl_ppc_context!(md::CONTEXT_PPC, u32, md::PpcRegisterNumbers::StackPointer as usize);
impl_ppc_context!(
    md::CONTEXT_PPC64,
    u64,
    md::Ppc64RegisterNumbers::StackPointer as usize
);

impl CpuContext for md::CONTEXT_SPARC {
    type Register = u64;

    fn get_register_always(&self, reg: &str) -> u64 {
        match reg {
            "g0" => self.g_r[0],
            "g1" => self.g_r[1],
            "g2" => self.g_r[2],
            "g3" => self.g_r[3],
            "g4" => self.g_r[4],
            "g5" => self.g_r[5],
            "g6" => self.g_r[6],
            "g7" => self.g_r[7],
            "o0" => self.g_r[8],
            "o1" => self.g_r[9],
            "o2" => self.g_r[10],
            "o3" => self.g_r[11],
            "o4" => self.g_r[12],
            "o5" => self.g_r[13],
            "sp" => self.g_r[md::SparcRegisterNumbers::StackPointer as usize],
            "o7" => self.g_r[15],
            "pc" => self.pc,
            "npc" => self.npc,
            "y" => self.y,
            _ => unreachable!("Invalid sparc register!"),
        }
    }

    fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
        match reg {
            "sp" => self.g_r[md::SparcRegisterNumbers::StackPointer as usize] = val,
            "pc" => self.pc = val,
            "npc" => self.npc = val,
            "y" => self.y = val,
            _ => return None,
        }
        Some(())
    }

    fn memoize_register(&self, reg: &str) -> Option<&'static str> {
        let idx = SPARC_REGS.iter().position(|val| *val == reg)?;
        Some(SPARC_REGS[idx])
    }

    fn stack_pointer_register_name(&self) -> &'static str {
        "sp"
    }

    fn instruction_pointer_register_name(&self) -> &'static str {
        "pc"
    }
}

impl CpuContext for md::CONTEXT_MIPS {
    type Register = u64;

    fn get_register_always(&self, reg: &str) -> u64 {
        match reg {
            "zero" => self.iregs[0],
            "at" => self.iregs[1],
            "v0" => self.iregs[2],
            "v1" => self.iregs[3],
            "a0" => self.iregs[4],
            "a1" => self.iregs[5],
            "a2" => self.iregs[6],
            "a3" => self.iregs[7],
            "t0" => self.iregs[8],
            "t1" => self.iregs[9],
            "t2" => self.iregs[10],
            "t3" => self.iregs[11],
            "t4" => self.iregs[12],
            "t5" => self.iregs[13],
            "t6" => self.iregs[14],
            "t7" => self.iregs[15],
            "s0" => self.iregs[16],
            "s1" => self.iregs[17],
            "s2" => self.iregs[18],
            "s3" => self.iregs[19],
            "s4" => self.iregs[20],
            "s5" => self.iregs[21],
            "s6" => self.iregs[22],
            "s7" => self.iregs[23],
            "t8" => self.iregs[24],
            "t9" => self.iregs[25],
            "k0" => self.iregs[26],
            "k1" => self.iregs[27],
            "gp" => self.iregs[28],
            "sp" => self.iregs[md::MipsRegisterNumbers::StackPointer as usize],
            "fp" => self.iregs[md::MipsRegisterNumbers::FramePointer as usize],
            "ra" => self.iregs[md::MipsRegisterNumbers::ReturnAddress as usize],
            "pc" => self.epc,
            _ => unreachable!("Invalid mips register!"),
        }
    }

    fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
        match reg {
            "sp" => self.iregs[md::MipsRegisterNumbers::StackPointer as usize] = val,
            "fp" => self.iregs[md::MipsRegisterNumbers::FramePointer as usize] = val,
            "ra" => self.iregs[md::MipsRegisterNumbers::ReturnAddress as usize] = val,
            "pc" => self.epc = val,
            _ => return None,
        }
        Some(())
    }

    fn memoize_register(&self, reg: &str) -> Option<&'static str> {
        let idx = MIPS_REGS.iter().position(|val| *val == reg)?;
        Some(MIPS_REGS[idx])
    }

    fn stack_pointer_register_name(&self) -> &'static str {
        "sp"
    }

    fn instruction_pointer_register_name(&self) -> &'static str {
        "pc"
    }
}

macro_rules! impl_riscv_context {
    ($ty:ty, $reg:ty) => {
        impl CpuContext for $ty {
            type Register = $reg;

            fn get_register_always(&self, reg: &str) -> Self::Register {
                match reg {
                    "pc" => self.pc,
                    "ra" => self.iregs[1],
                    "sp" => self.iregs[2],
                    "gp" => self.iregs[3],
                    "tp" => self.iregs[4],
                    "s0" => self.iregs[8],
                    "a0" => self.iregs[10],
                    _ => unreachable!("Invalid riscv register!"),
                }
            }

            fn set_register(&mut self, reg: &str, val: Self::Register) -> Option<()> {
                match reg {
                    "pc" => self.pc = val,
                    "ra" => self.iregs[1] = val,
                    "sp" => self.iregs[2] = val,
                    _ => return None,
                }
                Some(())
            }

            fn memoize_register(&self, reg: &str) -> Option<&'static str> {
                let idx = RISCV_REGS.iter().position(|val| *val == reg)?;
                Some(RISCV_REGS[idx])
            }

            fn stack_pointer_register_name(&self) -> &'static str {
                "sp"
            }

            fn instruction_pointer_register_name(&self) -> &'static str {
                "pc"
            }
        }
    };
}

impl_riscv_context!(md::CONTEXT_RISCV, u32);
impl_riscv_context!(md::CONTEXT_RISCV64, u64);

/// Information about which registers are valid in a `MinidumpContext`.
#[derive(Clone, Debug, PartialEq)]
pub enum MinidumpContextValidity {
    // All registers are valid.
    All,
    // The registers in this set are valid.
    Some(HashSet<&'static str>),
}

/// CPU context such as register states.
///
/// MinidumpContext carries a CPU-specific MDRawContext structure, which
/// contains CPU context such as register states.  Each thread has its
/// own context, and the exception record, if present, also has its own
/// context.  Note that if the exception record is present, the context it
/// refers to is probably what the user wants to use for the exception
/// thread, instead of that thread's own context.  The exception thread's
/// context (as opposed to the exception record's context) will contain
/// context for the exception handler (which performs minidump generation),
/// and not the context that caused the exception (which is probably what the
/// user wants).
#[derive(Debug, Clone)]
pub struct MinidumpContext {
    /// The raw CPU register state.
    pub raw: MinidumpRawContext,
    /// Which registers are valid in `raw`.
    pub valid: MinidumpContextValidity,
}

/// Errors encountered while reading a `MinidumpContext`.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Failed to read data.
    #[error("failed to read context data")]
    ReadFailure,
    /// Encountered an unknown CPU context.
    #[error("unknown CPU context")]
    UnknownCpuContext,
}

/// General-purpose registers for x86.
static X86_REGS: [&str; 10] = [
    "eip", "esp", "ebp", "ebx", "esi", "edi", "eax", "ecx", "edx", "efl",
];

/// General-purpose registers for x86-64.
static X86_64_REGS: [&str; 17] = [
    "rax", "rdx", "rcx", "rbx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15", "rip",
];

/// General-purpose registers for aarch64.
static ARM64_REGS: [&str; 33] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "x29", "x30", "x31", "pc",
];

/// General-purpose registers for arm.
static ARM_REGS: [&str; 17] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "fp", "sp", "lr", "pc",
    "cpsr", "r12",
];

/// General-purpose registers for ppc/ppc64.
static PPC_REGS: [&str; 36] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "r13", "r14",
    "r15", "r16", "r17", "r18", "r19", "r20", "r21", "r22", "r23", "r24", "r25", "r26", "r27",
    "r28", "r29", "r30", "r31", "sp", "lr", "ctr", "srr0",
];

/// General-purpose registers for sparc.
static SPARC_REGS: [&str; 16] = [
    "g0", "g1", "g2", "g3", "g4", "g5", "g6", "g7", "o0", "o1", "o2", "o3", "o4", "o5", "sp", "o7",
];

/// General-purpose registers for mips/mips64.
static MIPS_REGS: [&str; 35] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp",
    "ra", "pc", "mdhi", "mdlo",
];

/// General-purpose registers for riscv/riscv64.
static RISCV_REGS: [&str; 6] = ["pc", "ra", "sp", "gp", "tp", "s0"];

//======================================================
// Implementations

impl MinidumpContext {
    /// Return a MinidumpContext given a `MinidumpRawContext`.
    pub fn from_raw(raw: MinidumpRawContext) -> MinidumpContext {
        MinidumpContext {
            raw,
            valid: MinidumpContextValidity::All,
        }
    }

    /// Read a `MinidumpContext` from `bytes`.
    pub fn read(bytes: &[u8], endian: scroll::Endian) -> Result<MinidumpContext, ContextError> {
        // Some contexts are the same size as a different 32-bit context's
        // struct despite holding 64-bit registers, so special-case them by
        // size. CONTEXT_ARM64_OLD is deliberately excluded here: it's the
        // exact same size as CONTEXT_ARM64 and can only be told apart by
        // context_flags, which the generic path below already does.
        let mut offset = 0;
        if bytes.len() == mem::size_of::<md::CONTEXT_AMD64>() {
            let ctx: md::CONTEXT_AMD64 = bytes
                .gread_with(&mut offset, endian)
                .or(Err(ContextError::ReadFailure))?;
            if ContextFlagsCpu::from_flags(ctx.context_flags) != ContextFlagsCpu::CONTEXT_AMD64 {
                return Err(ContextError::ReadFailure);
            } else {
                return Ok(MinidumpContext::from_raw(MinidumpRawContext::Amd64(ctx)));
            }
        } else if bytes.len() == mem::size_of::<md::CONTEXT_PPC64>() {
            let ctx: md::CONTEXT_PPC64 = bytes
                .gread_with(&mut offset, endian)
                .or(Err(ContextError::ReadFailure))?;
            if ContextFlagsCpu::from_flags(ctx.context_flags as u32)
                != ContextFlagsCpu::CONTEXT_PPC64
            {
                return Err(ContextError::ReadFailure);
            } else {
                return Ok(MinidumpContext::from_raw(MinidumpRawContext::Ppc64(ctx)));
            }
        } else if bytes.len() == mem::size_of::<md::CONTEXT_RISCV64>() {
            let ctx: md::CONTEXT_RISCV64 = bytes
                .gread_with(&mut offset, endian)
                .or(Err(ContextError::ReadFailure))?;
            if ContextFlagsCpu::from_flags(ctx.context_flags as u32)
                != ContextFlagsCpu::CONTEXT_RISCV64
            {
                return Err(ContextError::ReadFailure);
            } else {
                return Ok(MinidumpContext::from_raw(MinidumpRawContext::Riscv64(ctx)));
            }
        }

        // For everything else, read the flags and determine context
        // type from that.
        let flags: u32 = bytes
            .gread_with(&mut offset, endian)
            .or(Err(ContextError::ReadFailure))?;
        // Seek back, the flags are also part of the RawContext structs.
        offset = 0;
        match ContextFlagsCpu::from_flags(flags) {
            ContextFlagsCpu::CONTEXT_X86 => {
                let ctx: md::CONTEXT_X86 = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::X86(ctx)))
            }
            ContextFlagsCpu::CONTEXT_PPC => {
                let ctx: md::CONTEXT_PPC = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::Ppc(ctx)))
            }
            ContextFlagsCpu::CONTEXT_SPARC => {
                let ctx: md::CONTEXT_SPARC = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::Sparc(ctx)))
            }
            ContextFlagsCpu::CONTEXT_ARM => {
                let ctx: md::CONTEXT_ARM = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::Arm(ctx)))
            }
            ContextFlagsCpu::CONTEXT_MIPS => {
                let ctx: md::CONTEXT_MIPS = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::Mips(ctx)))
            }
            ContextFlagsCpu::CONTEXT_ARM64 => {
                let ctx: md::CONTEXT_ARM64 = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::Arm64(ctx)))
            }
            ContextFlagsCpu::CONTEXT_ARM64_OLD => {
                let ctx: md::CONTEXT_ARM64_OLD = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::OldArm64(ctx)))
            }
            ContextFlagsCpu::CONTEXT_RISCV => {
                let ctx: md::CONTEXT_RISCV = bytes
                    .gread_with(&mut offset, endian)
                    .or(Err(ContextError::ReadFailure))?;
                Ok(MinidumpContext::from_raw(MinidumpRawContext::Riscv(ctx)))
            }
            _ => Err(ContextError::UnknownCpuContext),
        }
    }

    pub fn get_instruction_pointer(&self) -> u64 {
        match self.raw {
            MinidumpRawContext::Amd64(ref ctx) => ctx.rip,
            MinidumpRawContext::Arm(ref ctx) => {
                ctx.iregs[md::ArmRegisterNumbers::ProgramCounter as usize] as u64
            }
            MinidumpRawContext::Arm64(ref ctx) => ctx.iregs[32],
            MinidumpRawContext::OldArm64(ref ctx) => ctx.iregs[32],
            MinidumpRawContext::Ppc(ref ctx) => ctx.srr0 as u64,
            MinidumpRawContext::Ppc64(ref ctx) => ctx.srr0,
            MinidumpRawContext::Sparc(ref ctx) => ctx.pc,
            MinidumpRawContext::X86(ref ctx) => ctx.eip as u64,
            MinidumpRawContext::Mips(ref ctx) => ctx.epc,
            MinidumpRawContext::Riscv(ref ctx) => ctx.pc as u64,
            MinidumpRawContext::Riscv64(ref ctx) => ctx.pc,
        }
    }

    pub fn get_stack_pointer(&self) -> u64 {
        match self.raw {
            MinidumpRawContext::Amd64(ref ctx) => ctx.rsp,
            MinidumpRawContext::Arm(ref ctx) => {
                ctx.iregs[md::ArmRegisterNumbers::StackPointer as usize] as u64
            }
            MinidumpRawContext::Arm64(ref ctx) => {
                ctx.iregs[md::Arm64RegisterNumbers::StackPointer as usize]
            }
            MinidumpRawContext::OldArm64(ref ctx) => {
                ctx.iregs[md::Arm64RegisterNumbers::StackPointer as usize]
            }
            MinidumpRawContext::Ppc(ref ctx) => {
                ctx.gpr[md::PpcRegisterNumbers::StackPointer as usize] as u64
            }
            MinidumpRawContext::Ppc64(ref ctx) => {
                ctx.gpr[md::Ppc64RegisterNumbers::StackPointer as usize]
            }
            MinidumpRawContext::Sparc(ref ctx) => {
                ctx.g_r[md::SparcRegisterNumbers::StackPointer as usize]
            }
            MinidumpRawContext::X86(ref ctx) => ctx.esp as u64,
            MinidumpRawContext::Mips(ref ctx) => {
                ctx.iregs[md::MipsRegisterNumbers::StackPointer as usize]
            }
            MinidumpRawContext::Riscv(ref ctx) => ctx.iregs[2] as u64,
            MinidumpRawContext::Riscv64(ref ctx) => ctx.iregs[2],
        }
    }

    pub fn format_register(&self, reg: &str) -> String {
        match self.raw {
            MinidumpRawContext::Amd64(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Arm(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Arm64(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::OldArm64(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Ppc(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Ppc64(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Sparc(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::X86(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Mips(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Riscv(ref ctx) => ctx.format_register(reg),
            MinidumpRawContext::Riscv64(ref ctx) => ctx.format_register(reg),
        }
    }

    pub fn general_purpose_registers(&self) -> &'static [&'static str] {
        match self.raw {
            MinidumpRawContext::Amd64(_) => &X86_64_REGS[..],
            MinidumpRawContext::Arm(_) => &ARM_REGS[..],
            MinidumpRawContext::Arm64(_) => &ARM64_REGS[..],
            MinidumpRawContext::OldArm64(_) => &ARM64_REGS[..],
            MinidumpRawContext::Ppc(_) => &PPC_REGS[..],
            MinidumpRawContext::Ppc64(_) => &PPC_REGS[..],
            MinidumpRawContext::Sparc(_) => &SPARC_REGS[..],
            MinidumpRawContext::X86(_) => &X86_REGS[..],
            MinidumpRawContext::Mips(_) => &MIPS_REGS[..],
            MinidumpRawContext::Riscv(_) => &RISCV_REGS[..],
            MinidumpRawContext::Riscv64(_) => &RISCV_REGS[..],
        }
    }

    /// Write a human-readable description of this `MinidumpContext` to `f`.
    ///
    /// Unlike the original breakpad dumper this only prints the
    /// general-purpose registers and flags word for each architecture; the
    /// floating-point/vector save areas are opaque byte blobs in this reader
    /// (see `minidump_common::format`) and aren't broken out field-by-field.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "{}", self.context_name())?;
        for reg in self.general_purpose_registers() {
            writeln!(f, "  {:<8} = {}", reg, self.format_register(reg))?;
        }
        writeln!(f)
    }

    /// The name of the register that conventionally holds the frame
    /// pointer on this architecture, if the ABI has one.
    pub fn frame_pointer_register_name(&self) -> Option<&'static str> {
        match self.raw {
            MinidumpRawContext::X86(_) => Some("ebp"),
            MinidumpRawContext::Amd64(_) => Some("rbp"),
            MinidumpRawContext::Arm(_) => Some("fp"),
            MinidumpRawContext::Arm64(_) | MinidumpRawContext::OldArm64(_) => Some("fp"),
            MinidumpRawContext::Mips(_) => Some("fp"),
            MinidumpRawContext::Riscv(_) | MinidumpRawContext::Riscv64(_) => Some("s0"),
            // PowerPC and SPARC don't have a conventional dedicated frame
            // pointer register; their ABIs walk the stack via CFI only.
            MinidumpRawContext::Ppc(_)
            | MinidumpRawContext::Ppc64(_)
            | MinidumpRawContext::Sparc(_) => None,
        }
    }

    /// The name of the register holding the return address as saved by a
    /// `call`/`bl`-style instruction, for architectures where it's a
    /// dedicated link register rather than a stack slot.
    pub fn link_register_name(&self) -> Option<&'static str> {
        match self.raw {
            MinidumpRawContext::Arm(_) => Some("lr"),
            MinidumpRawContext::Arm64(_) | MinidumpRawContext::OldArm64(_) => Some("lr"),
            MinidumpRawContext::Ppc(_) | MinidumpRawContext::Ppc64(_) => Some("lr"),
            MinidumpRawContext::Mips(_) => Some("ra"),
            MinidumpRawContext::Riscv(_) | MinidumpRawContext::Riscv64(_) => Some("ra"),
            MinidumpRawContext::X86(_) | MinidumpRawContext::Amd64(_) | MinidumpRawContext::Sparc(_) => {
                None
            }
        }
    }

    /// Read a register by name regardless of this architecture's native
    /// width, widening to `u64`. Returns `None` if `reg` isn't a register
    /// of this context's architecture.
    pub fn get_register(&self, reg: &str) -> Option<u64> {
        match self.raw {
            MinidumpRawContext::X86(ref ctx) => ctx.get_register(reg, &self.valid).map(u64::from),
            MinidumpRawContext::Arm(ref ctx) => ctx.get_register(reg, &self.valid).map(u64::from),
            MinidumpRawContext::Ppc(ref ctx) => ctx.get_register(reg, &self.valid).map(u64::from),
            MinidumpRawContext::Riscv(ref ctx) => ctx.get_register(reg, &self.valid).map(u64::from),
            MinidumpRawContext::Amd64(ref ctx) => ctx.get_register(reg, &self.valid),
            MinidumpRawContext::Ppc64(ref ctx) => ctx.get_register(reg, &self.valid),
            MinidumpRawContext::Sparc(ref ctx) => ctx.get_register(reg, &self.valid),
            MinidumpRawContext::Mips(ref ctx) => ctx.get_register(reg, &self.valid),
            MinidumpRawContext::Arm64(ref ctx) => ctx.get_register(reg, &self.valid),
            MinidumpRawContext::OldArm64(ref ctx) => ctx.get_register(reg, &self.valid),
            MinidumpRawContext::Riscv64(ref ctx) => ctx.get_register(reg, &self.valid),
        }
    }

    /// Set a register by name, narrowing from `u64` to this architecture's
    /// native register width. Returns `None` if `reg` isn't a register of
    /// this context's architecture; marks the register valid on success.
    pub fn set_register(&mut self, reg: &str, val: u64) -> Option<()> {
        let result = match self.raw {
            MinidumpRawContext::X86(ref mut ctx) => ctx.set_register(reg, val as u32),
            MinidumpRawContext::Arm(ref mut ctx) => ctx.set_register(reg, val as u32),
            MinidumpRawContext::Ppc(ref mut ctx) => ctx.set_register(reg, val as u32),
            MinidumpRawContext::Riscv(ref mut ctx) => ctx.set_register(reg, val as u32),
            MinidumpRawContext::Amd64(ref mut ctx) => ctx.set_register(reg, val),
            MinidumpRawContext::Ppc64(ref mut ctx) => ctx.set_register(reg, val),
            MinidumpRawContext::Sparc(ref mut ctx) => ctx.set_register(reg, val),
            MinidumpRawContext::Mips(ref mut ctx) => ctx.set_register(reg, val),
            MinidumpRawContext::Arm64(ref mut ctx) => ctx.set_register(reg, val),
            MinidumpRawContext::OldArm64(ref mut ctx) => ctx.set_register(reg, val),
            MinidumpRawContext::Riscv64(ref mut ctx) => ctx.set_register(reg, val),
        };
        if result.is_some() {
            let memoized = self.raw_memoize_register(reg);
            if let (Some(memoized), MinidumpContextValidity::Some(ref mut which)) =
                (memoized, &mut self.valid)
            {
                which.insert(memoized);
            }
        }
        result
    }

    fn raw_memoize_register(&self, reg: &str) -> Option<&'static str> {
        match self.raw {
            MinidumpRawContext::X86(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Arm(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Ppc(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Riscv(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Amd64(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Ppc64(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Sparc(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Mips(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Arm64(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::OldArm64(ref ctx) => ctx.memoize_register(reg),
            MinidumpRawContext::Riscv64(ref ctx) => ctx.memoize_register(reg),
        }
    }

    /// An empty context of the same architecture as this one, with no
    /// registers marked valid yet; used to build up a caller's context one
    /// recovered register at a time during stack unwinding.
    pub fn empty_context_like(&self) -> MinidumpContext {
        MinidumpContext {
            raw: self.raw.clone(),
            valid: MinidumpContextValidity::Some(HashSet::new()),
        }
    }

    fn context_name(&self) -> &'static str {
        match self.raw {
            MinidumpRawContext::X86(_) => "CONTEXT_X86",
            MinidumpRawContext::Ppc(_) => "CONTEXT_PPC",
            MinidumpRawContext::Ppc64(_) => "CONTEXT_PPC64",
            MinidumpRawContext::Amd64(_) => "CONTEXT_AMD64",
            MinidumpRawContext::Sparc(_) => "CONTEXT_SPARC",
            MinidumpRawContext::Arm(_) => "CONTEXT_ARM",
            MinidumpRawContext::Arm64(_) => "CONTEXT_ARM64",
            MinidumpRawContext::OldArm64(_) => "CONTEXT_ARM64_OLD",
            MinidumpRawContext::Mips(_) => "CONTEXT_MIPS",
            MinidumpRawContext::Riscv(_) => "CONTEXT_RISCV",
            MinidumpRawContext::Riscv64(_) => "CONTEXT_RISCV64",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_register_roundtrip() {
        let mut ctx = md::CONTEXT_X86 {
            context_flags: 0,
            dr0: 0,
            dr1: 0,
            dr2: 0,
            dr3: 0,
            dr6: 0,
            dr7: 0,
            float_save: [0; 112],
            gs: 0,
            fs: 0,
            es: 0,
            ds: 0,
            edi: 0,
            esi: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            ebp: 0,
            eip: 0,
            cs: 0,
            eflags: 0,
            esp: 0,
            ss: 0,
            extended_registers: [0; 512],
        };
        ctx.set_register("eip", 0x1000).unwrap();
        assert_eq!(ctx.get_register_always("eip"), 0x1000);
        assert_eq!(ctx.stack_pointer_register_name(), "esp");
        assert_eq!(ctx.instruction_pointer_register_name(), "eip");
    }

    #[test]
    fn mips_stack_pointer_alias() {
        let mut ctx = md::CONTEXT_MIPS {
            context_flags: 0,
            __pad0: 0,
            iregs: [0; 32],
            mdhi: 0,
            mdlo: 0,
            hi: [0; 3],
            lo: [0; 3],
            epc: 0,
            badvaddr: 0,
            status: 0,
            cause: 0,
            fpregs: [0; 32],
            fpcsr: 0,
            fir: 0,
        };
        ctx.set_register("sp", 42).unwrap();
        assert_eq!(ctx.iregs[29], 42);
        assert_eq!(ctx.get_register_always("sp"), 42);
    }

    #[test]
    fn arm64_context_read_dispatches_by_flags() {
        use scroll::Pwrite;
        let ctx = md::CONTEXT_ARM64 {
            context_flags: md::ContextFlagsCpu::CONTEXT_ARM64.bits() as u64,
            iregs: [0; 33],
            cpsr: 0,
            float_save: [0; 512],
            fpcr: 0,
            fpsr: 0,
            bcr: [0; 8],
            bvr: [0; 8],
            wcr: [0; 2],
            wvr: [0; 2],
        };
        let mut bytes = vec![0u8; mem::size_of::<md::CONTEXT_ARM64>()];
        bytes.pwrite_with(ctx, 0, scroll::LE).unwrap();
        let parsed = MinidumpContext::read(&bytes, scroll::LE).unwrap();
        assert!(matches!(parsed.raw, MinidumpRawContext::Arm64(_)));
    }
}
