//! The prelude exports the types which are useful in representing
//! instructions and machine words.  Providing this prelude is the
//! main purpose of the base crate.
pub use super::instruction::*;
pub use super::iorequest::{Direction, IoRequest, CHANNELS, STATIONS, STATION_EQUIPMENT};
pub use super::onescomplement::{MINUS_ZERO, PLUS_ZERO};
pub use super::subword::{join_halves, lower_half, split_halves, upper_half};
pub use super::types::*;
