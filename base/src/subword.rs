//! Convenience utilities for treating the Q and A registers as a
//! single 32-bit register.  Q holds the more significant half.

/// Split a 32-bit value into its upper and lower halves.
#[must_use]
pub fn split_halves(w: u32) -> (u16, u16) {
    (upper_half(w), lower_half(w))
}

/// Join two 16-bit values into a 32-bit word.
#[must_use]
pub fn join_halves(upper: u16, lower: u16) -> u32 {
    (u32::from(upper) << 16) | u32::from(lower)
}

#[must_use]
pub fn upper_half(w: u32) -> u16 {
    (w >> 16) as u16
}

#[must_use]
pub fn lower_half(w: u32) -> u16 {
    (w & 0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_halves() {
        assert_eq!(join_halves(0x1234, 0xABCD), 0x1234_ABCD);
        assert_eq!(join_halves(0, 0xFFFF), 0x0000_FFFF);
    }

    #[test]
    fn test_split_halves() {
        assert_eq!(split_halves(0x1234_ABCD), (0x1234, 0xABCD));
        assert_eq!(split_halves(0xFFFF_0000), (0xFFFF, 0x0000));
    }
}
