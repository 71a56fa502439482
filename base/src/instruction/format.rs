/// Human-oriented formatting for instructions (or parts of instructions).
use std::fmt::{self, Display, Formatter};

use crate::instruction::{
    DecodedInstruction, InterRegister, InterRegisterOp, Opcode, OperandAddress, Shift,
    ShiftRegisters, SkipCondition,
};
use crate::onescomplement::{sign_extend_8, to_native};

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use Opcode::*;
        f.write_str(match self {
            Jmp => "JMP",
            Mui => "MUI",
            Dvi => "DVI",
            Stq => "STQ",
            Rtj => "RTJ",
            Sta => "STA",
            Spa => "SPA",
            Add => "ADD",
            Sub => "SUB",
            And => "AND",
            Eor => "EOR",
            Lda => "LDA",
            Rao => "RAO",
            Ldq => "LDQ",
            Adq => "ADQ",
        })
    }
}

impl Display for SkipCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use SkipCondition::*;
        f.write_str(match self {
            Saz => "SAZ",
            San => "SAN",
            Sap => "SAP",
            Sam => "SAM",
            Sqz => "SQZ",
            Sqn => "SQN",
            Sqp => "SQP",
            Sqm => "SQM",
            Sws => "SWS",
            Swn => "SWN",
            Sov => "SOV",
            Sno => "SNO",
            Spe => "SPE",
            Snp => "SNP",
            Spf => "SPF",
            Snf => "SNF",
        })
    }
}

/// Renders the operand field in the conventional form: `*` for
/// indirect, `(P+n)` for relative, `[next]` for the two-word form,
/// and `,Q` / `,I` for indexing.
impl Display for OperandAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        if self.indirect {
            f.write_str("*")?;
        }
        f.write_str(" ")?;
        match (self.delta, self.relative) {
            (0, false) => f.write_str("[next]")?,
            (0, true) => f.write_str("(P+[next])")?,
            (d, false) => write!(f, "${d:02X}")?,
            (d, true) => {
                let offset = to_native(sign_extend_8(d));
                if offset < 0 {
                    write!(f, "(P-{})", -offset)?;
                } else {
                    write!(f, "(P+{offset})")?;
                }
            }
        }
        if self.index_q {
            f.write_str(",Q")?;
        }
        if self.index_cell {
            f.write_str(",I")?;
        }
        Ok(())
    }
}

impl Display for Shift {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let reg = match self.registers {
            ShiftRegisters::Neither => "N",
            ShiftRegisters::A => "A",
            ShiftRegisters::Q => "Q",
            ShiftRegisters::Long => "L",
        };
        let dir = if self.left { "LS" } else { "RS" };
        write!(f, "{reg}{dir} {}", self.count)
    }
}

impl Display for InterRegisterOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            InterRegisterOp::Sum => "+",
            InterRegisterOp::ExclusiveOr => "^",
            InterRegisterOp::LogicalProduct => "&",
            InterRegisterOp::ComplementedProduct => "!&",
        })
    }
}

fn register_list(a: bool, q: bool, m: bool) -> String {
    let mut names = String::new();
    for (selected, name) in [(a, 'A'), (q, 'Q'), (m, 'M')] {
        if selected {
            names.push(name);
        }
    }
    if names.is_empty() {
        names.push('-');
    }
    names
}

/// Inter-register instructions are shown as `IRG A+QM>A`, meaning the
/// first operand, the operation, the registers forming the second
/// operand, and the destinations.
impl Display for InterRegister {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "IRG {}{}{}>{}",
            register_list(self.from_a(), false, false),
            self.op(),
            register_list(false, self.from_q(), self.from_m()),
            register_list(self.to_a(), self.to_q(), self.to_m()),
        )
    }
}

impl Display for DecodedInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use DecodedInstruction::*;
        match self {
            StorageReference { opcode, address } => write!(f, "{opcode}{address}"),
            SelectiveStop => f.write_str("SLS"),
            Enhanced { delta } => write!(f, "ENH ${delta:02X}"),
            Skip { condition, count } => write!(f, "{condition} {count}"),
            Input { reject_delta } => write!(f, "INP {}", to_native(sign_extend_8(*reject_delta))),
            Output { reject_delta } => {
                write!(f, "OUT {}", to_native(sign_extend_8(*reject_delta)))
            }
            EnableInterrupts => f.write_str("EIN"),
            InhibitInterrupts => f.write_str("IIN"),
            SetProtect => f.write_str("SPB"),
            ClearProtect => f.write_str("CPB"),
            InterRegister(ir) => write!(f, "{ir}"),
            IncreaseA(n) => write!(f, "INA {}", to_native(sign_extend_8(*n))),
            EnterA(n) => write!(f, "ENA {}", to_native(sign_extend_8(*n))),
            NoOperation => f.write_str("NOP"),
            EnterQ(n) => write!(f, "ENQ {}", to_native(sign_extend_8(*n))),
            IncreaseQ(n) => write!(f, "INQ {}", to_native(sign_extend_8(*n))),
            ExitInterrupt(n) => write!(f, "EXI ${n:02X}"),
            Shift(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::instruction::decode;
    use crate::types::InstructionSet;

    fn show(word: u16) -> String {
        decode(word, InstructionSet::Basic).to_string()
    }

    #[test]
    fn test_storage_reference_format() {
        assert_eq!(show(0xC012), "LDA $12");
        assert_eq!(show(0xC412), "LDA* $12");
        assert_eq!(show(0xC805), "LDA (P+5)");
        assert_eq!(show(0xC8FD), "LDA (P-2)");
        assert_eq!(show(0x6000), "STA [next]");
        assert_eq!(show(0x6312), "STA $12,Q,I");
    }

    #[test]
    fn test_special_format() {
        assert_eq!(show(0x0000), "SLS");
        assert_eq!(show(0x0B00), "NOP");
        assert_eq!(show(0x0AFE), "ENA -1");
        assert_eq!(show(0x01A1), "SOV 1");
        assert_eq!(show(0x0FA3), "ALS 3");
        assert_eq!(show(0x0F63), "LRS 3");
        assert_eq!(show(0x08A4), "IRG A&->A");
        assert_eq!(show(0x0E04), "EXI $04");
    }
}
