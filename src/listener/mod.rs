//! Event-source side of the daemon
//!
//! Validates delivered notifications before they reach the trigger engine
//! and answers the authorization queries used by the settings UI.

mod access;
mod delivery;

pub use access::ListenerAccess;
#[cfg(test)]
pub use access::ENABLED_LISTENERS_KEY;
pub use delivery::{deliver, DeliveryError};
