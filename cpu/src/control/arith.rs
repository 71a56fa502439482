//! The arithmetic unit.  The adder primitives live in the base
//! crate; here they are connected to the overflow indicator.
use base::onescomplement;
use base::subword::{join_halves, split_halves};

use super::ControlRegisters;

/// The adder as used for address arithmetic and skip counts.  This
/// never affects the overflow indicator.
#[must_use]
pub(crate) fn add_internal(a: u16, b: u16) -> u16 {
    onescomplement::add(a, b).0
}

impl ControlRegisters {
    fn note_overflow(&mut self, overflow: bool) {
        // The indicator is only cleared by testing it.
        if overflow {
            self.overflow = true;
        }
    }

    pub(crate) fn add(&mut self, a: u16, b: u16) -> u16 {
        let (sum, overflow) = onescomplement::add(a, b);
        self.note_overflow(overflow);
        sum
    }

    pub(crate) fn subtract(&mut self, a: u16, b: u16) -> u16 {
        let (difference, overflow) = onescomplement::subtract(a, b);
        self.note_overflow(overflow);
        difference
    }

    /// Q:A <- A * operand.
    pub(crate) fn multiply(&mut self, operand: u16) {
        let (upper, lower) = split_halves(onescomplement::multiply(self.a, operand));
        self.q = upper;
        self.a = lower;
    }

    /// A <- Q:A / operand, Q <- remainder.
    pub(crate) fn divide(&mut self, operand: u16) {
        let result = onescomplement::divide(join_halves(self.q, self.a), operand);
        self.note_overflow(result.overflow);
        self.a = result.quotient;
        self.q = result.remainder;
    }
}
