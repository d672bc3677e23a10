//! Trigger pipeline
//!
//! Each mapped notification becomes a session that moves through:
//! - Idle -> EnablingFirst -> FiringFirst: first enable + color write
//! - Waiting: the fixed gap, timed from when the first pulse was dispatched
//! - EnablingSecond -> FiringSecond: second enable + color write
//! - Done: terminal, whether or not any write failed

mod engine;
mod session;

pub use engine::{clamp_pulse_gap, TriggerEngine, DEFAULT_PULSE_GAP};
#[cfg(test)]
pub use engine::{MAX_PULSE_GAP, MIN_PULSE_GAP};
pub use session::Phase;
