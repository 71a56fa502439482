//! The protection monitor.
//!
//! When the protect switch is on, memory words and devices marked
//! as protected may only be modified (or, for devices, accessed) by
//! protected instructions, that is, instructions which are themselves
//! held in protected words.  A violation does not stop the machine;
//! it raises the internal interrupt (level 0) and sets the protect
//! fault indicator, which the SPF and SNF skips test.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::memory::MemoryUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtectViolation {
    /// An unprotected instruction tried to store into a protected word.
    Store { address: u16 },
    /// An unprotected instruction was followed by a protected one.
    Boundary { address: u16 },
    /// An unprotected instruction tried to use a protected device.
    Device { q: u16 },
    /// An unprotected instruction tried to change a protect bit.
    ProtectBit { address: u16 },
}

impl Display for ProtectViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ProtectViolation::Store { address } => {
                write!(f, "unprotected store into protected word {address:#06X}")
            }
            ProtectViolation::Boundary { address } => write!(
                f,
                "unprotected program ran into protected instruction at {address:#06X}"
            ),
            ProtectViolation::Device { q } => {
                write!(f, "unprotected access to protected device (Q={q:#06X})")
            }
            ProtectViolation::ProtectBit { address } => write!(
                f,
                "unprotected instruction tried to change protect bit of {address:#06X}"
            ),
        }
    }
}

/// Checked at the instruction fetch boundary: is the program moving
/// from an unprotected instruction into a protected one?
#[must_use]
pub fn crosses_into_protected(mem: &MemoryUnit, previous_protected: bool, address: u16) -> bool {
    mem.protect_switch() && !previous_protected && mem.is_protected(address)
}

/// Privileged operations (such as changing protect bits) are
/// restricted to protected instructions while the switch is on.
#[must_use]
pub fn privileged_operation_permitted(mem: &MemoryUnit, instruction_protected: bool) -> bool {
    !mem.protect_switch() || instruction_protected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConfiguration, MemorySize};

    #[test]
    fn test_boundary() {
        let mut mem = MemoryUnit::new(&MemoryConfiguration {
            size: MemorySize::K4,
        });
        mem.set_protect_bit(0x40, true);
        assert!(!crosses_into_protected(&mem, false, 0x40));
        mem.set_protect_switch(true);
        assert!(crosses_into_protected(&mem, false, 0x40));
        assert!(!crosses_into_protected(&mem, true, 0x40));
        assert!(!crosses_into_protected(&mem, false, 0x41));
    }

    #[test]
    fn test_privilege() {
        let mut mem = MemoryUnit::new(&MemoryConfiguration {
            size: MemorySize::K4,
        });
        assert!(privileged_operation_permitted(&mem, false));
        mem.set_protect_switch(true);
        assert!(!privileged_operation_permitted(&mem, false));
        assert!(privileged_operation_permitted(&mem, true));
    }
}
