//! LED driver command surface
//!
//! Builds the exact shell writes the LED driver understands and pairs the
//! enable sequence with every color command.

mod channel;

pub use channel::{HardwareChannel, LedPaths};
