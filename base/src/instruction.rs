//! Binary and decoded representations of instructions.
//!
//! An instruction occupies one 16-bit word (two, for storage
//! reference instructions whose displacement is zero).  Bits are
//! numbered 0 (least significant) to 15.
//!
//! ## Storage reference instructions
//!
//! | Opcode F | r      | i      | q      | I      | Displacement Δ |
//! |----------|--------|--------|--------|--------|----------------|
//! | 15-12    | 11     | 10     | 9      | 8      | 7-0            |
//!
//! - `r` selects relative addressing (Δ is a signed displacement from P),
//! - `i` selects indirect addressing,
//! - `q` selects indexing by the Q register,
//! - `I` selects indexing by the contents of the index cell (address 0x00FF).
//!
//! When Δ is zero, the following word holds the address and the
//! instruction occupies two words.
//!
//! ## Special instructions
//!
//! Opcode 0 is an escape into a set of special instructions.  Bits
//! 11-8 (called F1 here) select the sub-family:
//!
//! | F1 | Family                     | Bits 7-0                               |
//! |----|----------------------------|----------------------------------------|
//! | 0  | Selective stop (SLS)       | ignored (basic) / enhanced escape      |
//! | 1  | Skip                       | 7-4 condition, 3-0 skip count          |
//! | 2  | Input (INP)                | reject jump displacement               |
//! | 3  | Output (OUT)               | reject jump displacement               |
//! | 4  | Enable interrupts (EIN)    | ignored                                |
//! | 5  | Inhibit interrupts (IIN)   | ignored                                |
//! | 6  | Set protect bit (SPB)      | ignored                                |
//! | 7  | Clear protect bit (CPB)    | ignored                                |
//! | 8  | Inter-register             | see [`InterRegister`]                  |
//! | 9  | Increase A (INA)           | signed operand                         |
//! | A  | Enter A (ENA)              | signed operand                         |
//! | B  | No operation (NOP)         | ignored                                |
//! | C  | Enter Q (ENQ)              | signed operand                         |
//! | D  | Increase Q (INQ)           | signed operand                         |
//! | E  | Exit interrupt (EXI)       | save-area offset                       |
//! | F  | Shift                      | see [`Shift`]                          |

use std::fmt::{self, Debug, Formatter};

#[cfg(test)]
use test_strategy::proptest;

use super::types::InstructionSet;

mod format;

/// Address of the memory cell used by the `I` index flag.
pub const INDEX_CELL: u16 = 0x00FF;

const OPCODE_SHIFT: u16 = 12;
const RELATIVE_BIT: u16 = 0x0800;
const INDIRECT_BIT: u16 = 0x0400;
const INDEX_Q_BIT: u16 = 0x0200;
const INDEX_CELL_BIT: u16 = 0x0100;
const DELTA_MASK: u16 = 0x00FF;

/// An instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u16);

impl Instruction {
    #[must_use]
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// The opcode field (bits 15-12).
    #[must_use]
    pub const fn opcode_number(&self) -> u8 {
        (self.0 >> OPCODE_SHIFT) as u8
    }

    /// The special-family selector (bits 11-8).
    #[must_use]
    pub const fn special_function(&self) -> u8 {
        ((self.0 >> 8) & 0xF) as u8
    }

    #[must_use]
    pub const fn is_relative(&self) -> bool {
        self.0 & RELATIVE_BIT != 0
    }

    #[must_use]
    pub const fn is_indirect(&self) -> bool {
        self.0 & INDIRECT_BIT != 0
    }

    #[must_use]
    pub const fn is_indexed_by_q(&self) -> bool {
        self.0 & INDEX_Q_BIT != 0
    }

    #[must_use]
    pub const fn is_indexed_by_cell(&self) -> bool {
        self.0 & INDEX_CELL_BIT != 0
    }

    /// The displacement field (bits 7-0).
    #[must_use]
    pub const fn delta(&self) -> u8 {
        (self.0 & DELTA_MASK) as u8
    }

    /// Storage reference instructions with a zero displacement take
    /// their address from the following word.
    #[must_use]
    pub const fn is_two_word(&self) -> bool {
        self.opcode_number() != 0 && self.delta() == 0
    }

    /// Number of words occupied by the instruction.
    #[must_use]
    pub const fn length(&self) -> u16 {
        if self.is_two_word() {
            2
        } else {
            1
        }
    }
}

impl From<u16> for Instruction {
    fn from(w: u16) -> Instruction {
        Instruction(w)
    }
}

impl From<Instruction> for u16 {
    fn from(inst: Instruction) -> u16 {
        inst.0
    }
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Instruction({:#06X})", self.0)
    }
}

/// Storage reference opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    /// Jump to the effective address.
    Jmp = 1,
    /// Multiply A by the operand, leaving the product in Q (upper) and A (lower).
    Mui = 2,
    /// Divide Q:A by the operand, leaving the quotient in A and the remainder in Q.
    Dvi = 3,
    /// Store Q.
    Stq = 4,
    /// Return jump: store the return address at the effective
    /// address and continue at the following word.
    Rtj = 5,
    /// Store A.
    Sta = 6,
    /// Store A, then replace A with the parity of the stored word.
    Spa = 7,
    /// Add the operand to A.
    Add = 8,
    /// Subtract the operand from A.
    Sub = 9,
    /// Logical product of A and the operand.
    And = 10,
    /// Exclusive-or of A and the operand.
    Eor = 11,
    /// Load A.
    Lda = 12,
    /// Replace the operand with the operand plus one.
    Rao = 13,
    /// Load Q.
    Ldq = 14,
    /// Add the operand to Q.
    Adq = 15,
}

impl Opcode {
    #[must_use]
    pub fn number(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;
    fn try_from(n: u8) -> Result<Opcode, u8> {
        use Opcode::*;
        Ok(match n {
            1 => Jmp,
            2 => Mui,
            3 => Dvi,
            4 => Stq,
            5 => Rtj,
            6 => Sta,
            7 => Spa,
            8 => Add,
            9 => Sub,
            10 => And,
            11 => Eor,
            12 => Lda,
            13 => Rao,
            14 => Ldq,
            15 => Adq,
            other => {
                return Err(other);
            }
        })
    }
}

/// The addressing fields of a storage reference instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandAddress {
    pub relative: bool,
    pub indirect: bool,
    pub index_q: bool,
    pub index_cell: bool,
    pub delta: u8,
}

impl OperandAddress {
    /// A direct (absolute, non-indexed) reference to an 8-bit address.
    #[must_use]
    pub fn direct(delta: u8) -> OperandAddress {
        OperandAddress {
            relative: false,
            indirect: false,
            index_q: false,
            index_cell: false,
            delta,
        }
    }

    /// A reference whose address is held in the following word.
    #[must_use]
    pub fn next_word() -> OperandAddress {
        OperandAddress::direct(0)
    }

    #[must_use]
    pub fn relative(delta: u8) -> OperandAddress {
        OperandAddress {
            relative: true,
            ..OperandAddress::direct(delta)
        }
    }

    #[must_use]
    pub fn indirect(self) -> OperandAddress {
        OperandAddress {
            indirect: true,
            ..self
        }
    }

    #[must_use]
    pub fn indexed_by_q(self) -> OperandAddress {
        OperandAddress {
            index_q: true,
            ..self
        }
    }

    #[must_use]
    pub fn indexed_by_cell(self) -> OperandAddress {
        OperandAddress {
            index_cell: true,
            ..self
        }
    }

    fn bits(&self) -> u16 {
        let mut w = u16::from(self.delta);
        if self.relative {
            w |= RELATIVE_BIT;
        }
        if self.indirect {
            w |= INDIRECT_BIT;
        }
        if self.index_q {
            w |= INDEX_Q_BIT;
        }
        if self.index_cell {
            w |= INDEX_CELL_BIT;
        }
        w
    }
}

impl From<Instruction> for OperandAddress {
    fn from(inst: Instruction) -> OperandAddress {
        OperandAddress {
            relative: inst.is_relative(),
            indirect: inst.is_indirect(),
            index_q: inst.is_indexed_by_q(),
            index_cell: inst.is_indexed_by_cell(),
            delta: inst.delta(),
        }
    }
}

/// Skip conditions (bits 7-4 of a skip instruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipCondition {
    /// A is +0.
    Saz = 0,
    /// A is not +0.
    San = 1,
    /// A is positive.
    Sap = 2,
    /// A is negative.
    Sam = 3,
    Sqz = 4,
    Sqn = 5,
    Sqp = 6,
    Sqm = 7,
    /// Selective skip switch set.
    Sws = 8,
    /// Selective skip switch not set.
    Swn = 9,
    /// Overflow set (the indicator is cleared by testing it).
    Sov = 10,
    /// No overflow (the indicator is cleared by testing it).
    Sno = 11,
    /// Memory parity error.
    Spe = 12,
    /// No memory parity error.
    Snp = 13,
    /// Protect fault (the fault indication is cleared by testing it).
    Spf = 14,
    /// No protect fault (the fault indication is cleared by testing it).
    Snf = 15,
}

impl SkipCondition {
    fn from_bits(n: u8) -> SkipCondition {
        use SkipCondition::*;
        match n & 0xF {
            0 => Saz,
            1 => San,
            2 => Sap,
            3 => Sam,
            4 => Sqz,
            5 => Sqn,
            6 => Sqp,
            7 => Sqm,
            8 => Sws,
            9 => Swn,
            10 => Sov,
            11 => Sno,
            12 => Spe,
            13 => Snp,
            14 => Spf,
            _ => Snf,
        }
    }
}

/// Fields of the inter-register instruction (F1 = 8).
///
/// | LP | XR | A (origin) | Q (origin) | M (origin) | A (dest) | Q (dest) | M (dest) |
/// |----|----|------------|------------|------------|----------|----------|----------|
/// | 7  | 6  | 5          | 4          | 3          | 2        | 1        | 0        |
///
/// The first operand is A (if selected); the second is the inclusive
/// or of the selected Q and M registers.  An operand none of whose
/// registers is selected is zero, or all ones when LP is set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterRegister(u8);

/// The operation performed by an inter-register instruction,
/// selected by the LP and XR bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterRegisterOp {
    /// LP=0, XR=0: one's-complement sum.
    Sum,
    /// LP=0, XR=1: exclusive or.
    ExclusiveOr,
    /// LP=1, XR=0: logical product.
    LogicalProduct,
    /// LP=1, XR=1: complement of the logical product.
    ComplementedProduct,
}

impl InterRegister {
    pub const LP: u8 = 0x80;
    pub const XR: u8 = 0x40;
    pub const FROM_A: u8 = 0x20;
    pub const FROM_Q: u8 = 0x10;
    pub const FROM_M: u8 = 0x08;
    pub const TO_A: u8 = 0x04;
    pub const TO_Q: u8 = 0x02;
    pub const TO_M: u8 = 0x01;

    #[must_use]
    pub const fn new(bits: u8) -> InterRegister {
        InterRegister(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    fn has(&self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    #[must_use]
    pub fn op(&self) -> InterRegisterOp {
        match (self.has(Self::LP), self.has(Self::XR)) {
            (false, false) => InterRegisterOp::Sum,
            (false, true) => InterRegisterOp::ExclusiveOr,
            (true, false) => InterRegisterOp::LogicalProduct,
            (true, true) => InterRegisterOp::ComplementedProduct,
        }
    }

    #[must_use]
    pub fn logical_product_selected(&self) -> bool {
        self.has(Self::LP)
    }

    #[must_use]
    pub fn from_a(&self) -> bool {
        self.has(Self::FROM_A)
    }

    #[must_use]
    pub fn from_q(&self) -> bool {
        self.has(Self::FROM_Q)
    }

    #[must_use]
    pub fn from_m(&self) -> bool {
        self.has(Self::FROM_M)
    }

    #[must_use]
    pub fn to_a(&self) -> bool {
        self.has(Self::TO_A)
    }

    #[must_use]
    pub fn to_q(&self) -> bool {
        self.has(Self::TO_Q)
    }

    #[must_use]
    pub fn to_m(&self) -> bool {
        self.has(Self::TO_M)
    }
}

impl Debug for InterRegister {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "InterRegister({:#04X})", self.0)
    }
}

/// Which registers a shift instruction operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftRegisters {
    /// Neither A nor Q is selected; the shift has no effect.
    Neither,
    A,
    Q,
    /// Q and A together as a 32-bit register (Q is the upper half).
    Long,
}

/// Fields of the shift instruction (F1 = F).
///
/// | Left | Q | A | Count |
/// |------|---|---|-------|
/// | 7    | 6 | 5 | 4-0   |
///
/// Right shifts are arithmetic (the sign propagates); left shifts
/// are end-around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shift {
    pub left: bool,
    pub registers: ShiftRegisters,
    pub count: u8,
}

impl Shift {
    fn from_bits(bits: u8) -> Shift {
        Shift {
            left: bits & 0x80 != 0,
            registers: match (bits & 0x40 != 0, bits & 0x20 != 0) {
                (false, false) => ShiftRegisters::Neither,
                (false, true) => ShiftRegisters::A,
                (true, false) => ShiftRegisters::Q,
                (true, true) => ShiftRegisters::Long,
            },
            count: bits & 0x1F,
        }
    }

    fn bits(&self) -> u8 {
        let regs = match self.registers {
            ShiftRegisters::Neither => 0x00,
            ShiftRegisters::A => 0x20,
            ShiftRegisters::Q => 0x40,
            ShiftRegisters::Long => 0x60,
        };
        (if self.left { 0x80 } else { 0x00 }) | regs | (self.count & 0x1F)
    }
}

/// A decoded instruction word.  The operands of the special
/// instructions are left undecoded where their interpretation needs
/// machine state (for example the 8-bit signed operand of ENA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodedInstruction {
    StorageReference {
        opcode: Opcode,
        address: OperandAddress,
    },
    SelectiveStop,
    /// An instruction of the enhanced instruction set.  These share
    /// the selective stop encoding but have a non-zero Δ field.
    Enhanced { delta: u8 },
    Skip { condition: SkipCondition, count: u8 },
    Input { reject_delta: u8 },
    Output { reject_delta: u8 },
    EnableInterrupts,
    InhibitInterrupts,
    SetProtect,
    ClearProtect,
    InterRegister(InterRegister),
    IncreaseA(u8),
    EnterA(u8),
    NoOperation,
    EnterQ(u8),
    IncreaseQ(u8),
    ExitInterrupt(u8),
    Shift(Shift),
}

/// Decode an instruction word.  Every 16-bit word decodes to
/// something; whether it can be executed depends on the machine.
#[must_use]
pub fn decode(word: u16, instruction_set: InstructionSet) -> DecodedInstruction {
    use DecodedInstruction::*;
    let inst = Instruction::from(word);
    if let Ok(opcode) = Opcode::try_from(inst.opcode_number()) {
        return StorageReference {
            opcode,
            address: OperandAddress::from(inst),
        };
    }
    let delta = inst.delta();
    match inst.special_function() {
        0x0 => match instruction_set {
            InstructionSet::Enhanced if delta != 0 => Enhanced { delta },
            _ => SelectiveStop,
        },
        0x1 => Skip {
            condition: SkipCondition::from_bits(delta >> 4),
            count: delta & 0xF,
        },
        0x2 => Input {
            reject_delta: delta,
        },
        0x3 => Output {
            reject_delta: delta,
        },
        0x4 => EnableInterrupts,
        0x5 => InhibitInterrupts,
        0x6 => SetProtect,
        0x7 => ClearProtect,
        0x8 => InterRegister(self::InterRegister(delta)),
        0x9 => IncreaseA(delta),
        0xA => EnterA(delta),
        0xB => NoOperation,
        0xC => EnterQ(delta),
        0xD => IncreaseQ(delta),
        0xE => ExitInterrupt(delta),
        _ => Shift(self::Shift::from_bits(delta)),
    }
}

fn special(function: u16, delta: u8) -> u16 {
    (function << 8) | u16::from(delta)
}

impl From<&DecodedInstruction> for Instruction {
    fn from(d: &DecodedInstruction) -> Instruction {
        use DecodedInstruction::*;
        Instruction(match d {
            StorageReference { opcode, address } => {
                (u16::from(opcode.number()) << OPCODE_SHIFT) | address.bits()
            }
            SelectiveStop => special(0x0, 0),
            Enhanced { delta } => special(0x0, *delta),
            Skip { condition, count } => special(0x1, ((*condition as u8) << 4) | (count & 0xF)),
            Input { reject_delta } => special(0x2, *reject_delta),
            Output { reject_delta } => special(0x3, *reject_delta),
            EnableInterrupts => special(0x4, 0),
            InhibitInterrupts => special(0x5, 0),
            SetProtect => special(0x6, 0),
            ClearProtect => special(0x7, 0),
            InterRegister(ir) => special(0x8, ir.bits()),
            IncreaseA(n) => special(0x9, *n),
            EnterA(n) => special(0xA, *n),
            NoOperation => special(0xB, 0),
            EnterQ(n) => special(0xC, *n),
            IncreaseQ(n) => special(0xD, *n),
            ExitInterrupt(n) => special(0xE, *n),
            Shift(s) => special(0xF, s.bits()),
        })
    }
}

#[test]
fn test_storage_reference_fields() {
    // LDA* with relative addressing, displacement 0x12.
    let inst = Instruction::from(0xCC12);
    assert_eq!(inst.opcode_number(), 0xC);
    assert!(inst.is_relative());
    assert!(inst.is_indirect());
    assert!(!inst.is_indexed_by_q());
    assert!(!inst.is_indexed_by_cell());
    assert_eq!(inst.delta(), 0x12);
    assert_eq!(inst.length(), 1);
    assert_eq!(Instruction::from(0xC000).length(), 2);
    // Special instructions are always one word.
    assert_eq!(Instruction::from(0x0000).length(), 1);
}

#[test]
fn test_decode_special_families() {
    use DecodedInstruction::*;
    assert_eq!(decode(0x0000, InstructionSet::Basic), SelectiveStop);
    assert_eq!(decode(0x0012, InstructionSet::Basic), SelectiveStop);
    assert_eq!(
        decode(0x0012, InstructionSet::Enhanced),
        Enhanced { delta: 0x12 }
    );
    assert_eq!(
        decode(0x0123, InstructionSet::Basic),
        Skip {
            condition: SkipCondition::Sap,
            count: 3
        }
    );
    assert_eq!(decode(0x0B00, InstructionSet::Basic), NoOperation);
    assert_eq!(decode(0x0AFF, InstructionSet::Basic), EnterA(0xFF));
    assert_eq!(decode(0x0E08, InstructionSet::Basic), ExitInterrupt(8));
    assert_eq!(
        decode(0x0FE4, InstructionSet::Basic),
        Shift(self::Shift {
            left: true,
            registers: ShiftRegisters::Long,
            count: 4
        })
    );
    match decode(0x0864, InstructionSet::Basic) {
        InterRegister(ir) => {
            assert_eq!(ir.op(), InterRegisterOp::ExclusiveOr);
            assert!(ir.from_a());
            assert!(!ir.from_q());
            assert!(ir.to_a());
            assert!(!ir.to_m());
        }
        other => panic!("expected an inter-register instruction, got {other:?}"),
    }
}

#[test]
fn test_decode_storage_reference() {
    assert_eq!(
        decode(0x6B05, InstructionSet::Basic),
        DecodedInstruction::StorageReference {
            opcode: Opcode::Sta,
            address: OperandAddress::relative(5).indexed_by_q().indexed_by_cell()
        }
    );
}

#[cfg(test)]
#[proptest]
fn decoding_is_stable_under_reencoding(word: u16) {
    // Some special instructions ignore their low bits, so the
    // re-encoded word may differ, but must mean the same thing.
    for set in [InstructionSet::Basic, InstructionSet::Enhanced] {
        let decoded = decode(word, set);
        let reencoded = Instruction::from(&decoded);
        assert_eq!(decode(reencoded.bits(), set), decoded);
        if let DecodedInstruction::StorageReference { .. } = decoded {
            assert_eq!(reencoded.bits(), word);
        }
    }
}
