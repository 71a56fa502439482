//! Machine-variant selectors which affect how instruction words are
//! interpreted.  These are needed both by the emulator and by tools
//! (such as a disassembler) which have to agree with it.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// The addressing mode selects the width of the program counter and
/// of addresses formed by indirection.
///
/// In 32K mode, addresses are 15 bits wide.  Bit 15 of an indirect
/// address word indicates that a further level of indirection
/// follows.  When an interrupt is taken, the overflow indicator is
/// saved in bit 15 of the saved program counter.
///
/// In 64K mode, addresses are 16 bits wide and only a single level
/// of indirection is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum AddressingMode {
    #[default]
    Addr32K,
    Addr64K,
}

impl AddressingMode {
    /// The mask applied to addresses formed in this mode.
    #[must_use]
    pub const fn mask(&self) -> u16 {
        match self {
            AddressingMode::Addr32K => 0x7FFF,
            AddressingMode::Addr64K => 0xFFFF,
        }
    }

    #[must_use]
    pub const fn multi_level_indirect(&self) -> bool {
        matches!(self, AddressingMode::Addr32K)
    }
}

impl Display for AddressingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            AddressingMode::Addr32K => "32K",
            AddressingMode::Addr64K => "64K",
        })
    }
}

/// Which instruction set the processor implements.  The enhanced
/// instruction set uses some encodings which the basic processor
/// treats as a selective stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum InstructionSet {
    #[default]
    Basic,
    Enhanced,
}

impl Display for InstructionSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            InstructionSet::Basic => "basic",
            InstructionSet::Enhanced => "enhanced",
        })
    }
}

#[test]
fn test_address_masks() {
    assert_eq!(AddressingMode::Addr32K.mask(), 0x7FFF);
    assert_eq!(AddressingMode::Addr64K.mask(), 0xFFFF);
    assert!(AddressingMode::Addr32K.multi_level_indirect());
    assert!(!AddressingMode::Addr64K.multi_level_indirect());
}
