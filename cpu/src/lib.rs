//! This crate emulates the processor: memory and its protection,
//! the control unit and its interrupt system, and the dispatch of
//! I/O instructions to device controllers.
#![crate_name = "cpu"]

mod context;
mod control;
mod diagnostics;
mod interrupt;
mod io;
mod machine;
mod memory;
mod protect;
mod stop;
mod types;

pub use context::{Context, Tick};
pub use control::{
    resolve_operand_address, AddressingLoop, ControlConfiguration, ControlRegisters, ControlUnit,
    ResolvedAddress, StepOutcome, MAX_INDIRECT_REFERENCES,
};
pub use diagnostics::CurrentInstructionDiagnostics;
pub use interrupt::{highest_priority, save_slot, vector, INTERNAL_INTERRUPT, INTERRUPT_LEVELS};
pub use io::*;
pub use machine::{Machine, MachineConfiguration, MachineStatus, RunOutcome};
pub use memory::{MemoryConfiguration, MemorySize, MemoryUnit, ProtectedWord, WordSource};
pub use protect::ProtectViolation;
pub use stop::{StopKind, StopReason, UnknownStopName};
pub use types::*;
