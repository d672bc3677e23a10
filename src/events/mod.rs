//! Events flowing into and out of the trigger pipeline
//!
//! `NotificationEvent` is what the event source delivers; `TriggerEvent`
//! is emitted by the engine as sessions progress.

use serde::{Deserialize, Serialize};

use crate::trigger::Phase;

/// A notification was posted by some application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Identifier of the app that posted the notification
    pub source_app_id: String,
}

impl NotificationEvent {
    pub fn new(source_app_id: impl Into<String>) -> Self {
        Self {
            source_app_id: source_app_id.into(),
        }
    }
}

/// Lifecycle events emitted by the trigger engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A mapped notification started a double-pulse session
    SessionStarted {
        session_id: u64,
        app_id: String,
    },

    /// One pulse finished its enable + fire pair
    PulseFinished {
        session_id: u64,
        phase: Phase,
        /// Result of the enable sequence
        engine_on: bool,
        /// Result of the color write
        fired: bool,
    },

    /// The session reached its terminal state
    SessionFinished {
        session_id: u64,
        /// The second pulse was cancelled before it ran
        cancelled: bool,
    },
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerEvent::SessionStarted { session_id, app_id } => {
                write!(f, "SESSION_STARTED #{} ({})", session_id, app_id)
            }
            TriggerEvent::PulseFinished {
                session_id,
                phase,
                engine_on,
                fired,
            } => write!(
                f,
                "PULSE_FINISHED #{} {} (engine={}, fired={})",
                session_id, phase, engine_on, fired
            ),
            TriggerEvent::SessionFinished {
                session_id,
                cancelled,
            } => {
                if *cancelled {
                    write!(f, "SESSION_CANCELLED #{}", session_id)
                } else {
                    write!(f, "SESSION_FINISHED #{}", session_id)
                }
            }
        }
    }
}
