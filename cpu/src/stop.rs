//! Reasons for which the simulated processor stops.
//!
//! These are outcomes of instruction execution, not failures of the
//! emulator.  Protect faults are not among them; those are handled
//! by the interrupt system.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use super::diagnostics::CurrentInstructionDiagnostics;

/// The kinds of stop, without their details.
///
/// These upper-case names follow the names used on the console.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize)]
pub enum StopKind {
    ADDRLOOP,
    SELSTOP,
    BADEXI,
    BREAKPOINT,
    IOREJECT,
    UNIMPL,
}

impl Display for StopKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            StopKind::ADDRLOOP => "ADDRLOOP",
            StopKind::SELSTOP => "SELSTOP",
            StopKind::BADEXI => "BADEXI",
            StopKind::BREAKPOINT => "BREAKPOINT",
            StopKind::IOREJECT => "IOREJECT",
            StopKind::UNIMPL => "UNIMPL",
        })
    }
}

impl StopKind {
    #[must_use]
    pub const fn all_stop_kinds() -> [StopKind; 6] {
        [
            StopKind::ADDRLOOP,
            StopKind::SELSTOP,
            StopKind::BADEXI,
            StopKind::BREAKPOINT,
            StopKind::IOREJECT,
            StopKind::UNIMPL,
        ]
    }

    /// Errors indicate that the program went wrong; the other stops
    /// were requested by the program or by the operator.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StopKind::ADDRLOOP | StopKind::BADEXI | StopKind::UNIMPL
        )
    }
}

#[derive(Debug)]
pub struct UnknownStopName(String);

impl Display for UnknownStopName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "unknown stop name '{}'", self.0)
    }
}

impl Error for UnknownStopName {}

impl TryFrom<&str> for StopKind {
    type Error = UnknownStopName;
    fn try_from(s: &str) -> Result<StopKind, UnknownStopName> {
        match s {
            "ADDRLOOP" => Ok(StopKind::ADDRLOOP),
            "SELSTOP" => Ok(StopKind::SELSTOP),
            "BADEXI" => Ok(StopKind::BADEXI),
            "BREAKPOINT" => Ok(StopKind::BREAKPOINT),
            "IOREJECT" => Ok(StopKind::IOREJECT),
            "UNIMPL" => Ok(StopKind::UNIMPL),
            _ => Err(UnknownStopName(s.to_owned())),
        }
    }
}

/// A stop, with details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// An indirect address chain exceeded the permitted length.
    AddressingLoop {
        diagnostics: CurrentInstructionDiagnostics,
        dereferences: u32,
    },
    /// The program executed SLS with the selective stop switch set.
    SelectiveStop {
        diagnostics: CurrentInstructionDiagnostics,
    },
    /// The operand of EXI does not identify an interrupt save area.
    InvalidInterruptExit {
        diagnostics: CurrentInstructionDiagnostics,
        offset: u8,
    },
    /// Execution reached a breakpoint.
    Breakpoint { address: u16 },
    /// A device rejected an I/O request and stop-on-reject is set.
    IoReject {
        diagnostics: CurrentInstructionDiagnostics,
        q: u16,
    },
    /// The instruction is not implemented by the configured processor.
    UnimplementedInstruction {
        diagnostics: CurrentInstructionDiagnostics,
        message: String,
    },
}

impl StopReason {
    #[must_use]
    pub fn kind(&self) -> StopKind {
        match self {
            StopReason::AddressingLoop { .. } => StopKind::ADDRLOOP,
            StopReason::SelectiveStop { .. } => StopKind::SELSTOP,
            StopReason::InvalidInterruptExit { .. } => StopKind::BADEXI,
            StopReason::Breakpoint { .. } => StopKind::BREAKPOINT,
            StopReason::IoReject { .. } => StopKind::IOREJECT,
            StopReason::UnimplementedInstruction { .. } => StopKind::UNIMPL,
        }
    }
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            StopReason::AddressingLoop {
                diagnostics,
                dereferences,
            } => write!(
                f,
                "ADDRLOOP: {diagnostics} abandoned after {dereferences} indirect references"
            ),
            StopReason::SelectiveStop { diagnostics } => {
                write!(f, "SELSTOP: selective stop by {diagnostics}")
            }
            StopReason::InvalidInterruptExit {
                diagnostics,
                offset,
            } => write!(
                f,
                "BADEXI: {diagnostics} has operand {offset:#04X}, which is not an interrupt save area"
            ),
            StopReason::Breakpoint { address } => {
                write!(f, "BREAKPOINT: breakpoint at {address:#06X}")
            }
            StopReason::IoReject { diagnostics, q } => {
                write!(f, "IOREJECT: {diagnostics} rejected, Q={q:#06X}")
            }
            StopReason::UnimplementedInstruction {
                diagnostics,
                message,
            } => write!(f, "UNIMPL: {diagnostics}: {message}"),
        }
    }
}

impl Error for StopReason {}

#[test]
fn test_stop_kind_round_trip() {
    for orig_kind in StopKind::all_stop_kinds() {
        let name = orig_kind.to_string();
        match StopKind::try_from(name.as_str()) {
            Ok(k) => {
                assert_eq!(k, orig_kind);
            }
            Err(_) => {
                panic!("unable to round-trip stop kind {orig_kind:?}");
            }
        }
    }
    assert!(StopKind::try_from("HALT").is_err());
}

#[test]
fn test_breakpoint_display() {
    let stop = StopReason::Breakpoint { address: 0x0123 };
    assert_eq!(stop.kind(), StopKind::BREAKPOINT);
    assert!(!stop.kind().is_error());
    assert_eq!(stop.to_string(), "BREAKPOINT: breakpoint at 0x0123");
}
