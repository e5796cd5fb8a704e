//! Periodic presence sampling.

mod scheduler;

pub use scheduler::{HeartbeatScheduler, TickOutcome};
