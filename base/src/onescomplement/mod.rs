//! One's-complement arithmetic on 16-bit words, as performed by the
//! machine's adder, multiplier and divider.
//!
//! These functions are pure: they return the overflow indication
//! alongside the result and leave it to the caller to decide whether
//! the overflow indicator of the machine gets updated.  The address
//! arithmetic performed by the control unit uses the same adder but
//! ignores the overflow output.
//!
//! Values are 16 bits wide.  Bit 15 is the sign.  There are two
//! representations of zero, `0x0000` (+0) and `0xFFFF` (-0).


pub const PLUS_ZERO: u16 = 0x0000;
pub const MINUS_ZERO: u16 = 0xFFFF;

const SIGN_BIT: u16 = 0x8000;
const MAGNITUDE_MASK: u16 = 0x7FFF;

/// Width of the adder's working register, plus one carry position.
const EXTENDED_MASK: u32 = 0x1_FFFF;
const BORROW_OUT: u32 = 0x2_0000;

/// The sign of a value.  In a one's-complement system both zeroes
/// have a sign; `-0` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    #[must_use]
    pub fn of(w: u16) -> Sign {
        if w & SIGN_BIT == 0 {
            Sign::Plus
        } else {
            Sign::Minus
        }
    }

    fn of_pair(w: u32) -> Sign {
        if w & 0x8000_0000 == 0 {
            Sign::Plus
        } else {
            Sign::Minus
        }
    }

    fn combine(self, other: Sign) -> Sign {
        if self == other {
            Sign::Plus
        } else {
            Sign::Minus
        }
    }
}

#[must_use]
pub fn is_zero(w: u16) -> bool {
    w == PLUS_ZERO || w == MINUS_ZERO
}

#[must_use]
pub fn is_negative(w: u16) -> bool {
    w & SIGN_BIT != 0
}

/// Magnitude of a one's-complement value (15 bits).
#[must_use]
pub fn magnitude(w: u16) -> u16 {
    if is_negative(w) {
        !w & MAGNITUDE_MASK
    } else {
        w
    }
}

/// Sign-extend an 8-bit one's-complement displacement to 16 bits.
#[must_use]
pub fn sign_extend_8(delta: u8) -> u16 {
    let d = u16::from(delta);
    if d & 0x80 != 0 {
        0xFF00 | d
    } else {
        d
    }
}

/// Convert a one's-complement value into a native integer.  Both
/// zeroes map to 0.
#[must_use]
pub fn to_native(w: u16) -> i32 {
    let m = i32::from(magnitude(w));
    if is_negative(w) {
        -m
    } else {
        m
    }
}

fn extend_17(w: u16) -> u32 {
    let v = u32::from(w);
    if w & SIGN_BIT != 0 {
        v | 0x1_0000
    } else {
        v
    }
}

/// The subtractive adder.  Computes `minuend - subtrahend`.
///
/// Both operands are extended to 17 bits and the difference is
/// formed in an 18-bit intermediate whose top bit is the (inverted)
/// borrow.  A borrow is taken end-around.  Overflow is indicated when
/// the two high-order bits of the 17-bit result disagree.
///
/// The subtractive adder never produces -0 except for `(-0) - (+0)`.
#[must_use]
pub fn subtract(minuend: u16, subtrahend: u16) -> (u16, bool) {
    let intermediate: u32 = extend_17(minuend) + BORROW_OUT - extend_17(subtrahend);
    let result: u32 = if intermediate & BORROW_OUT != 0 {
        intermediate & EXTENDED_MASK
    } else {
        (intermediate - 1) & EXTENDED_MASK
    };
    let high_bits = (result >> 15) & 0b11;
    let overflow = high_bits == 0b01 || high_bits == 0b10;
    ((result & 0xFFFF) as u16, overflow)
}

/// Addition is subtraction of the complement.  As a consequence,
/// `(-0) + (-0)` is the only sum yielding -0.
#[must_use]
pub fn add(augend: u16, addend: u16) -> (u16, bool) {
    subtract(augend, !addend)
}

/// Negate a value (this is just the complement).
#[must_use]
pub fn negate(w: u16) -> u16 {
    !w
}

/// Multiply two 16-bit one's-complement values, producing a 32-bit
/// one's-complement product.
///
/// The magnitudes are multiplied by 15 steps of shift-and-add.  The
/// product is complemented when exactly one of the operands is
/// negative (this includes -0).
#[must_use]
pub fn multiply(multiplicand: u16, multiplier: u16) -> u32 {
    let sign = Sign::of(multiplicand).combine(Sign::of(multiplier));
    let mcand = u32::from(magnitude(multiplicand));
    let mut mplier = magnitude(multiplier);
    let mut product: u32 = 0;
    for step in 0..15 {
        if mplier & 1 != 0 {
            product += mcand << step;
        }
        mplier >>= 1;
    }
    match sign {
        Sign::Plus => product,
        Sign::Minus => !product,
    }
}

/// The result of a division.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotient {
    pub quotient: u16,
    pub remainder: u16,
    pub overflow: bool,
}

fn signed_zero(sign: Sign) -> u16 {
    match sign {
        Sign::Plus => PLUS_ZERO,
        Sign::Minus => MINUS_ZERO,
    }
}

fn apply_sign(magnitude: u16, sign: Sign) -> u16 {
    match sign {
        Sign::Plus => magnitude,
        Sign::Minus => !magnitude,
    }
}

/// Divide a 32-bit one's-complement dividend by a 16-bit
/// one's-complement divisor.
///
/// Special cases:
///
/// - Division by +0 sets overflow and yields quotient `0xFFFF`;
///   division by -0 sets overflow and yields quotient `0x0000`.  The
///   remainder is +0 in both cases.
/// - A zero dividend (either sign) yields a zero quotient whose sign
///   is the exclusive-or of the operand signs, and a zero remainder
///   carrying the sign of the dividend.
///
/// Otherwise the magnitudes are divided by restoring division.  The
/// quotient carries the exclusive-or of the signs and the remainder
/// carries the sign of the dividend.  A quotient whose magnitude
/// does not fit in 15 bits sets overflow; the low 15 bits of the
/// magnitude are retained.
#[must_use]
pub fn divide(dividend: u32, divisor: u16) -> Quotient {
    if is_zero(divisor) {
        return Quotient {
            quotient: if divisor == PLUS_ZERO {
                0xFFFF
            } else {
                0x0000
            },
            remainder: PLUS_ZERO,
            overflow: true,
        };
    }
    let dividend_sign = Sign::of_pair(dividend);
    let quotient_sign = dividend_sign.combine(Sign::of(divisor));
    let dividend_magnitude: u32 = match dividend_sign {
        Sign::Plus => dividend,
        Sign::Minus => !dividend,
    };
    if dividend_magnitude == 0 {
        return Quotient {
            quotient: signed_zero(quotient_sign),
            remainder: signed_zero(dividend_sign),
            overflow: false,
        };
    }

    let divisor_magnitude = u32::from(magnitude(divisor));
    let mut partial: u32 = 0;
    let mut quotient: u32 = 0;
    for bit in (0..31).rev() {
        partial = (partial << 1) | ((dividend_magnitude >> bit) & 1);
        quotient <<= 1;
        if partial >= divisor_magnitude {
            partial -= divisor_magnitude;
            quotient |= 1;
        }
    }
    let overflow = quotient > u32::from(MAGNITUDE_MASK);
    let q = (quotient & u32::from(MAGNITUDE_MASK)) as u16;
    let r = (partial & u32::from(MAGNITUDE_MASK)) as u16;
    Quotient {
        quotient: apply_sign(q, quotient_sign),
        remainder: apply_sign(r, dividend_sign),
        overflow,
    }
}

/// Compute the parity of a word: true when it has an odd number of
/// one bits.
#[must_use]
pub fn odd_parity(w: u16) -> bool {
    w.count_ones() % 2 == 1
}
