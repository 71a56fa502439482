//! Collection types used by the simulator.
pub mod pq;
