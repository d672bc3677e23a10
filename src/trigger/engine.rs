//! Notification to double-pulse orchestration
//!
//! For every mapped notification the engine dispatches the first pulse to
//! the worker pool and, from that same moment, starts a timer for the
//! second pulse. Nothing here blocks the caller on privileged I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::{NotificationEvent, TriggerEvent};
use crate::exec::{PoolError, WorkerPool};
use crate::hardware::HardwareChannel;
use crate::mapping::MappingStore;

use super::session::{Phase, PulseOutcome, SessionHandle, SessionState, TriggerSession};

/// Gap between the start of the first pulse and the second pulse
pub const DEFAULT_PULSE_GAP: Duration = Duration::from_millis(450);
/// Shortest accepted pulse gap
pub const MIN_PULSE_GAP: Duration = Duration::from_millis(250);
/// Longest accepted pulse gap
pub const MAX_PULSE_GAP: Duration = Duration::from_millis(700);

/// Clamp `gap` into the accepted pulse-gap range
pub fn clamp_pulse_gap(gap: Duration) -> Duration {
    gap.clamp(MIN_PULSE_GAP, MAX_PULSE_GAP)
}

/// Turns notification events into double-pulse sessions
pub struct TriggerEngine {
    mappings: MappingStore,
    channel: Arc<HardwareChannel>,
    pool: WorkerPool,
    pulse_gap: Duration,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, SessionHandle>>,
    event_tx: broadcast::Sender<TriggerEvent>,
}

impl TriggerEngine {
    /// Create an engine; `pulse_gap` is clamped into the accepted range
    pub fn new(
        mappings: MappingStore,
        channel: Arc<HardwareChannel>,
        pool: WorkerPool,
        pulse_gap: Duration,
        event_tx: broadcast::Sender<TriggerEvent>,
    ) -> Self {
        let clamped = clamp_pulse_gap(pulse_gap);
        if clamped != pulse_gap {
            warn!(
                requested_ms = pulse_gap.as_millis() as u64,
                using_ms = clamped.as_millis() as u64,
                "pulse gap out of range, clamped"
            );
        }

        Self {
            mappings,
            channel,
            pool,
            pulse_gap: clamped,
            next_id: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn pulse_gap(&self) -> Duration {
        self.pulse_gap
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.event_tx.subscribe()
    }

    /// Handle a posted notification
    ///
    /// Returns immediately. Unmapped apps cost one mapping lookup and
    /// produce no session.
    pub fn on_notification(&self, event: &NotificationEvent) -> Option<SessionHandle> {
        let hex_code = self.mappings.lookup(&event.source_app_id)?;
        Some(self.start_session(event.source_app_id.clone(), hex_code))
    }

    fn start_session(&self, app_id: String, hex_code: String) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(session_id = id, app_id = %app_id, hex = %hex_code, "trigger x2");

        let _ = self.event_tx.send(TriggerEvent::SessionStarted {
            session_id: id,
            app_id: app_id.clone(),
        });

        let session = Arc::new(TriggerSession::new(
            id,
            app_id,
            hex_code,
            self.event_tx.clone(),
        ));

        let first = self.dispatch_pulse(&session, Phase::First);

        let gap = self.pulse_gap;
        let pool = self.pool.clone();
        let channel = Arc::clone(&self.channel);
        let task_session = Arc::clone(&session);

        // The timer starts now, not when the first pulse completes.
        let task = self.pool.runtime().spawn(async move {
            let first_pulse = async {
                log_pulse(task_session.id(), Phase::First, first.await);
                task_session.advance(SessionState::Waiting);
            };

            let second_pulse = async {
                tokio::time::sleep(gap).await;
                let job_session = Arc::clone(&task_session);
                let second = pool.dispatch(move || job_session.run_pulse(&channel, Phase::Second));
                log_pulse(task_session.id(), Phase::Second, second.await);
            };

            tokio::join!(first_pulse, second_pulse);
            task_session.finish(false);
        });

        let handle = SessionHandle::new(session, task.abort_handle());
        self.track(handle.clone());
        handle
    }

    fn dispatch_pulse(
        &self,
        session: &Arc<TriggerSession>,
        phase: Phase,
    ) -> tokio::task::JoinHandle<Result<Option<PulseOutcome>, PoolError>> {
        let session = Arc::clone(session);
        let channel = Arc::clone(&self.channel);
        self.pool.dispatch(move || session.run_pulse(&channel, phase))
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<u64, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, handle: SessionHandle) {
        let mut sessions = self.sessions();
        sessions.retain(|_, h| !h.is_done());
        sessions.insert(handle.id(), handle);
    }

    /// Number of sessions that have not reached `Done`
    pub fn active_sessions(&self) -> usize {
        let mut sessions = self.sessions();
        sessions.retain(|_, h| !h.is_done());
        sessions.len()
    }

    /// Cancel every pending session, returning how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<SessionHandle> = self.sessions().drain().map(|(_, h)| h).collect();
        let cancelled = drained.iter().filter(|h| h.cancel()).count();
        if cancelled > 0 {
            info!(cancelled, "pending sessions cancelled");
        }
        cancelled
    }
}

fn log_pulse(
    session_id: u64,
    phase: Phase,
    result: Result<Result<Option<PulseOutcome>, PoolError>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(Some(outcome))) => info!(
            session_id,
            label = phase.label(),
            engine_on = outcome.engine_on,
            fired = outcome.fired,
            "pulse complete"
        ),
        Ok(Ok(None)) => debug!(session_id, label = phase.label(), "pulse skipped"),
        Ok(Err(e)) => warn!(session_id, label = phase.label(), error = %e, "pulse not run"),
        Err(e) => warn!(session_id, label = phase.label(), error = %e, "pulse task failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::runtime::Handle;
    use tokio::time::timeout;

    use super::*;
    use crate::exec::testing::RecordingExecutor;
    use crate::hardware::LedPaths;
    use crate::mapping::{MemorySource, DEFAULT_MAPPING_KEY};
    use crate::testing::LevelCounter;

    const CHAT: &str = "com.example.chat";

    fn engine_with(
        mapping: Option<&str>,
        executor: RecordingExecutor,
    ) -> (TriggerEngine, Arc<RecordingExecutor>) {
        engine_with_workers(mapping, executor, 4)
    }

    fn engine_with_workers(
        mapping: Option<&str>,
        executor: RecordingExecutor,
        workers: usize,
    ) -> (TriggerEngine, Arc<RecordingExecutor>) {
        let executor = Arc::new(executor);
        let source = MemorySource::new();
        if let Some(mapping) = mapping {
            source.set(DEFAULT_MAPPING_KEY, mapping);
        }
        let mappings = MappingStore::new(Arc::new(source), DEFAULT_MAPPING_KEY);
        let channel = Arc::new(HardwareChannel::new(executor.clone(), LedPaths::default()));
        let pool = WorkerPool::new(Handle::current(), workers);
        let (event_tx, _) = broadcast::channel(64);

        let engine = TriggerEngine::new(mappings, channel, pool, MIN_PULSE_GAP, event_tx);
        (engine, executor)
    }

    async fn finish(handle: &SessionHandle) {
        tokio_test::assert_ok!(timeout(Duration::from_secs(5), handle.wait_done()).await);
    }

    fn expected_pulse(hex: &str) -> Vec<String> {
        let paths = LedPaths::default();
        vec![
            paths.enable_command(),
            paths.brightness_command(),
            paths.color_command(hex),
        ]
    }

    #[test]
    fn test_pulse_gap_clamp() {
        assert_eq!(clamp_pulse_gap(Duration::from_millis(100)), MIN_PULSE_GAP);
        assert_eq!(clamp_pulse_gap(Duration::from_secs(2)), MAX_PULSE_GAP);
        assert_eq!(clamp_pulse_gap(DEFAULT_PULSE_GAP), DEFAULT_PULSE_GAP);
    }

    #[tokio::test]
    async fn test_unmapped_app_issues_no_calls() {
        let (engine, executor) = engine_with(Some(r#"{"com.example.chat": "FF0000"}"#), RecordingExecutor::new());

        assert!(engine.on_notification(&NotificationEvent::new("com.example.mail")).is_none());
        tokio::time::sleep(MIN_PULSE_GAP + Duration::from_millis(100)).await;
        assert!(executor.calls().is_empty());
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_empty_absent_and_malformed_mappings_issue_no_calls() {
        for mapping in [None, Some(""), Some("{}"), Some(r#"{"com.example.chat": "#)] {
            let (engine, executor) = engine_with(mapping, RecordingExecutor::new());
            assert!(engine.on_notification(&NotificationEvent::new(CHAT)).is_none());
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(executor.calls().is_empty(), "mapping {:?}", mapping);
        }
    }

    #[tokio::test]
    async fn test_empty_mapping_logs_one_debug_entry() {
        let (engine, executor) = engine_with(Some("{}"), RecordingExecutor::new());
        let counter = LevelCounter::new();

        let handle = tracing::subscriber::with_default(counter.subscriber(), || {
            engine.on_notification(&NotificationEvent::new(CHAT))
        });

        assert!(handle.is_none());
        assert!(executor.calls().is_empty());
        assert_eq!(counter.count(tracing::Level::DEBUG), 1);
        assert_eq!(counter.count(tracing::Level::ERROR), 0);
    }

    #[tokio::test]
    async fn test_malformed_mapping_logs_one_error_entry() {
        let (engine, executor) = engine_with(Some(r#"{"a": "FF"#), RecordingExecutor::new());
        let counter = LevelCounter::new();

        let handle = tracing::subscriber::with_default(counter.subscriber(), || {
            engine.on_notification(&NotificationEvent::new("a"))
        });

        assert!(handle.is_none());
        assert!(executor.calls().is_empty());
        assert_eq!(counter.count(tracing::Level::ERROR), 1);
    }

    #[tokio::test]
    async fn test_double_pulse_sequence() {
        let (engine, executor) = engine_with(Some(r#"{"com.example.chat": "FF0000"}"#), RecordingExecutor::new());

        let started = Instant::now();
        let handle = engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        finish(&handle).await;

        let mut expected = expected_pulse("FF0000");
        expected.extend(expected_pulse("FF0000"));
        assert_eq!(executor.commands(), expected);

        let calls = executor.calls();
        let second_start = calls[3].at.duration_since(started);
        assert!(second_start >= MIN_PULSE_GAP, "second pulse after {:?}", second_start);
        assert!(second_start < MIN_PULSE_GAP + Duration::from_millis(500));
        assert!(calls[2].at < calls[3].at);

        assert_eq!(handle.state(), SessionState::Done);
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_delivery_does_not_wait_for_privileged_calls() {
        let (engine, executor) = engine_with(
            Some(r#"{"com.example.chat": "FF0000"}"#),
            RecordingExecutor::new().with_latency(Duration::from_millis(300)),
        );

        let started = Instant::now();
        let handle = engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(!handle.is_done());

        finish(&handle).await;
        assert_eq!(executor.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_second_pulse_is_not_delayed_by_slow_first_pulse() {
        // First pulse takes three 200ms calls; the second must still start
        // one pulse gap after dispatch rather than after the first finishes.
        let (engine, executor) = engine_with(
            Some(r#"{"com.example.chat": "FF0000"}"#),
            RecordingExecutor::new().with_latency(Duration::from_millis(200)),
        );

        let started = Instant::now();
        let handle = engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        finish(&handle).await;

        let paths = LedPaths::default();
        let enables: Vec<_> = executor
            .calls()
            .into_iter()
            .filter(|c| c.command == paths.enable_command())
            .collect();
        assert_eq!(enables.len(), 2);
        assert!(enables[1].at.duration_since(started) < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_failed_first_pulse_still_runs_second() {
        let (engine, executor) = engine_with(
            Some(r#"{"com.example.chat": "FF0000"}"#),
            RecordingExecutor::new().failing(),
        );
        let mut events = engine.subscribe();

        let handle = engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        finish(&handle).await;
        assert_eq!(executor.calls().len(), 6);

        let mut pulses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let TriggerEvent::PulseFinished { phase, fired, engine_on, .. } = event {
                pulses.push((phase, engine_on, fired));
            }
        }
        assert_eq!(
            pulses,
            vec![(Phase::First, false, false), (Phase::Second, false, false)]
        );
    }

    #[tokio::test]
    async fn test_repeated_events_are_independent_sessions() {
        let (engine, executor) = engine_with(Some(r#"{"com.example.chat": "FF0000"}"#), RecordingExecutor::new());

        let event = NotificationEvent::new(CHAT);
        let a = engine.on_notification(&event).unwrap();
        let b = engine.on_notification(&event).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(engine.active_sessions(), 2);

        finish(&a).await;
        finish(&b).await;

        let color = LedPaths::default().color_command("FF0000");
        let commands = executor.commands();
        assert_eq!(commands.len(), 12);
        assert_eq!(commands.iter().filter(|c| **c == color).count(), 4);
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_second_pulse() {
        let (engine, executor) = engine_with(Some(r#"{"com.example.chat": "FF0000"}"#), RecordingExecutor::new());
        let mut events = engine.subscribe();

        let handle = engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(executor.commands(), expected_pulse("FF0000"));

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.state(), SessionState::Done);

        tokio::time::sleep(MIN_PULSE_GAP + Duration::from_millis(200)).await;
        assert_eq!(executor.commands(), expected_pulse("FF0000"));

        let cancelled = std::iter::from_fn(|| events.try_recv().ok()).any(|e| {
            matches!(e, TriggerEvent::SessionFinished { cancelled: true, .. })
        });
        assert!(cancelled);
    }

    #[tokio::test]
    async fn test_cancel_skips_second_pulse_waiting_for_a_worker() {
        // One worker busy with a 600ms first pulse: the second pulse is queued
        // behind it when the session is cancelled.
        let (engine, executor) = engine_with_workers(
            Some(r#"{"com.example.chat": "FF0000"}"#),
            RecordingExecutor::new().with_latency(Duration::from_millis(200)),
            1,
        );

        let handle = engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        tokio::time::sleep(MIN_PULSE_GAP + Duration::from_millis(150)).await;
        assert_eq!(engine.pool().busy(), 1);
        assert!(handle.cancel());

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(executor.commands(), expected_pulse("FF0000"));
        assert_eq!(engine.pool().busy(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (engine, _) = engine_with(Some(r#"{"com.example.chat": "FF0000"}"#), RecordingExecutor::new());

        engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        engine.on_notification(&NotificationEvent::new(CHAT)).unwrap();
        assert_eq!(engine.cancel_all(), 2);
        assert_eq!(engine.active_sessions(), 0);
        assert_eq!(engine.cancel_all(), 0);
    }
}
