//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::TriggerEvent;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from the event source or settings UI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// An application posted a notification
    NotificationPosted { source_app_id: String },

    /// Whether notification access is granted
    IsEnabled,

    /// Open the notification access settings
    OpenSettings,

    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Notification accepted; `session_id` is set when it started a session
    Accepted { session_id: Option<u64> },

    /// Notification access state
    Enabled { enabled: bool },

    /// Settings screen launched
    SettingsOpened,

    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl ToString) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Whether notification access is granted
    pub listener_enabled: bool,

    /// Configured gap between pulses
    pub pulse_gap_ms: u64,

    /// Sessions started since launch
    pub sessions_started: u64,

    /// Sessions whose second pulse was cancelled
    pub sessions_cancelled: u64,

    /// Sessions not yet finished
    pub active_sessions: u64,

    /// Color writes that succeeded
    pub pulses_fired: u64,

    /// Color writes that failed
    pub pulses_failed: u64,

    /// Privileged commands currently running
    pub workers_busy: u64,

    /// Worker pool size
    pub workers: u64,
}

impl DaemonStatus {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Self::default()
        }
    }

    /// Fold a trigger event into the counters
    pub fn record(&mut self, event: &TriggerEvent) {
        match event {
            TriggerEvent::SessionStarted { .. } => self.sessions_started += 1,
            TriggerEvent::PulseFinished { fired: true, .. } => self.pulses_fired += 1,
            TriggerEvent::PulseFinished { fired: false, .. } => self.pulses_failed += 1,
            TriggerEvent::SessionFinished { cancelled: true, .. } => self.sessions_cancelled += 1,
            TriggerEvent::SessionFinished { cancelled: false, .. } => {}
        }
    }
}
