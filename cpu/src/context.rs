//! This module manages the context in which the emulator is performing a single operation.
//!
//! In general, a function call into the emulator represents an
//! opportunity to execute an instruction or to emulate a state
//! change for a peripheral.  Simulated time is measured in ticks; one
//! tick is the time taken to execute one instruction.  Device
//! callbacks are scheduled in ticks.
pub type Tick = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub now: Tick,
}

impl Context {
    #[must_use]
    pub fn new(now: Tick) -> Context {
        Context { now }
    }
}
