//! Fatal error taxonomy for the simulator core.
//!
//! Every variant here is a programmer/input error that halts the
//! simulator; there is no recoverable-error path. The CLI boundary wraps
//! these in `anyhow::Context` rather than printing a bare `Debug` dump.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// An assembly token is neither a known opcode nor a label reference.
    UnknownMnemonic { line: usize, token: String },
    /// A register token did not start with `R`/`r`/`F`/`f`.
    UnknownRegisterPrefix { line: usize, token: String },
    /// PC decoded to an instruction index outside the parsed program.
    InstructionOutOfRange { pc: u32, index: i64 },
    /// A memory word access address was not 4-byte aligned.
    MisalignedAccess { address: u32 },
    /// A memory access address fell outside the configured memory size.
    OutOfBoundsMemory { address: u32, mem_size: u32 },
    /// An opcode maps to a functional-unit class with zero lanes configured.
    NoFunctionalUnit { opcode: String, unit: &'static str },
    /// More than one functional-unit lane completed in the same cycle.
    MultipleCompletions { cycle: u64, count: usize },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::UnknownMnemonic { line, token } => {
                write!(f, "line {line}: unknown mnemonic or label `{token}`")
            }
            SimError::UnknownRegisterPrefix { line, token } => {
                write!(
                    f,
                    "line {line}: register `{token}` does not start with R/r/F/f"
                )
            }
            SimError::InstructionOutOfRange { pc, index } => {
                write!(f, "fetch at pc=0x{pc:08x} (index {index}) is out of range")
            }
            SimError::MisalignedAccess { address } => {
                write!(f, "memory access at address 0x{address:08x} is not 4-byte aligned")
            }
            SimError::OutOfBoundsMemory { address, mem_size } => {
                write!(
                    f,
                    "memory access at address 0x{address:08x} exceeds memory size {mem_size}"
                )
            }
            SimError::NoFunctionalUnit { opcode, unit } => {
                write!(f, "opcode {opcode} requires unit {unit}, which has no lanes configured")
            }
            SimError::MultipleCompletions { cycle, count } => {
                write!(
                    f,
                    "invariant violated at cycle {cycle}: {count} functional-unit lanes completed simultaneously"
                )
            }
        }
    }
}

impl std::error::Error for SimError {}

pub type SimResult<T> = Result<T, SimError>;
