//! Per-notification double-pulse session state

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::events::TriggerEvent;
use crate::hardware::HardwareChannel;

/// Which of the two pulses is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    First,
    Second,
}

impl Phase {
    /// Log label for the color write
    pub fn label(self) -> &'static str {
        match self {
            Phase::First => "FIRE #1",
            Phase::Second => "FIRE #2",
        }
    }

    fn enabling(self) -> SessionState {
        match self {
            Phase::First => SessionState::EnablingFirst,
            Phase::Second => SessionState::EnablingSecond,
        }
    }

    fn firing(self) -> SessionState {
        match self {
            Phase::First => SessionState::FiringFirst,
            Phase::Second => SessionState::FiringSecond,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress of a session, in the order the states are entered
///
/// States only move forward. When the first pulse is still running as the
/// second one starts, `Waiting` is skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    #[default]
    Idle,
    EnablingFirst,
    FiringFirst,
    Waiting,
    EnablingSecond,
    FiringSecond,
    Done,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::EnablingFirst => write!(f, "EnablingFirst"),
            SessionState::FiringFirst => write!(f, "FiringFirst"),
            SessionState::Waiting => write!(f, "Waiting"),
            SessionState::EnablingSecond => write!(f, "EnablingSecond"),
            SessionState::FiringSecond => write!(f, "FiringSecond"),
            SessionState::Done => write!(f, "Done"),
        }
    }
}

/// Result of one enable + fire pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseOutcome {
    pub phase: Phase,
    pub engine_on: bool,
    pub fired: bool,
}

/// One double-pulse trigger for a single notification
pub struct TriggerSession {
    id: u64,
    app_id: String,
    hex_code: String,
    state: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<TriggerEvent>,
}

impl TriggerSession {
    pub fn new(
        id: u64,
        app_id: String,
        hex_code: String,
        event_tx: broadcast::Sender<TriggerEvent>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            id,
            app_id,
            hex_code,
            state,
            event_tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `to` if it is later than the current state
    pub fn advance(&self, to: SessionState) -> bool {
        let id = self.id;
        self.state.send_if_modified(|current| {
            if to > *current {
                debug!(session_id = id, from = %current, to = %to, "session transition");
                *current = to;
                true
            } else {
                false
            }
        })
    }

    /// Run the enable sequence and its paired color write
    ///
    /// Blocks on privileged I/O; the color write is attempted even if the
    /// enable sequence reported failure. Returns `None` without touching the
    /// hardware when the session finished before the pulse got a worker.
    pub fn run_pulse(&self, channel: &HardwareChannel, phase: Phase) -> Option<PulseOutcome> {
        if self.state() == SessionState::Done {
            debug!(session_id = self.id, label = phase.label(), "session finished, pulse skipped");
            return None;
        }

        self.advance(phase.enabling());
        let engine_on = channel.ensure_engine_on();

        self.advance(phase.firing());
        let fired = channel.fire(&self.hex_code, phase.label());

        let _ = self.event_tx.send(TriggerEvent::PulseFinished {
            session_id: self.id,
            phase,
            engine_on,
            fired,
        });

        Some(PulseOutcome {
            phase,
            engine_on,
            fired,
        })
    }

    /// Enter `Done`; emits the finish event only on the first call
    pub fn finish(&self, cancelled: bool) -> bool {
        if !self.advance(SessionState::Done) {
            return false;
        }
        info!(session_id = self.id, app_id = %self.app_id, cancelled, "session done");
        let _ = self.event_tx.send(TriggerEvent::SessionFinished {
            session_id: self.id,
            cancelled,
        });
        true
    }

    #[cfg(test)]
    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

/// Caller-side handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<TriggerSession>,
    task: AbortHandle,
}

impl SessionHandle {
    pub fn new(session: Arc<TriggerSession>, task: AbortHandle) -> Self {
        Self { session, task }
    }

    pub fn id(&self) -> u64 {
        self.session.id()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_done(&self) -> bool {
        self.state() == SessionState::Done
    }

    /// Wait until the session reaches `Done`
    #[cfg(test)]
    pub async fn wait_done(&self) {
        let mut rx = self.session.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Done).await;
    }

    /// Drop every pulse that has not started yet
    ///
    /// A pulse still queued for a worker is skipped once it gets one; a pulse
    /// whose privileged calls have already started runs to completion.
    /// Returns false if the session had already finished.
    pub fn cancel(&self) -> bool {
        self.task.abort();
        self.session.finish(true)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("app_id", &self.session.app_id())
            .field("state", &self.state())
            .finish()
    }
}
