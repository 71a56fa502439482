//! The `base` crate defines the things which are useful in both a
//! simulator and other associated tools.  The idea is that if you
//! want to write a disassembler or a cross-assembler, it would depend
//! on the base crate but would not need to depend on the simulator
//! library itself.

mod types;

pub mod collections;
pub mod instruction;
pub mod iorequest;
pub mod onescomplement;
pub mod prelude;
pub mod subword;
