/// Diagnostic information for log messages and stop reasons.
use std::fmt::{Display, Formatter};

use serde::Serialize;

use base::prelude::{DecodedInstruction, Instruction};

/// CurrentInstructionDiagnostics is only for generating debug
/// information.  It must not be used for control/execution purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentInstructionDiagnostics {
    #[serde(serialize_with = "serialize_instruction")]
    pub instruction: Instruction,
    #[serde(skip)]
    pub decoded: DecodedInstruction,
    pub address: u16,
}

fn serialize_instruction<S: serde::Serializer>(
    inst: &Instruction,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(inst.bits())
}

impl Display for CurrentInstructionDiagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "instruction {:#06X} ({}) at address {:#06X}",
            self.instruction.bits(),
            self.decoded,
            self.address
        )
    }
}
