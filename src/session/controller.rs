use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use uuid::Uuid;

use crate::alert::AlertScheduler;
use crate::classifier::classify;
use crate::events::{EngineEvent, EventBus};
use crate::labels::LabelResolver;
use crate::settings::ConfigHandle;
use crate::smoother::FocusState;
use crate::timeline::{
    SessionSummary, TimelineTransition, DEFAULT_DISTRACTION_LABEL,
};
use crate::vision::{LinkEvent, LinkStatus, VisionLink, VisionSample};

use super::state::{SessionSnapshot, SessionState, SessionStatus};

/// Orchestrates one session at a time: lifecycle, the per-sample telemetry
/// pipeline, the countdown ticker and the vision link.
///
/// Clones share all state, so a clone can be handed to spawned tasks. Every
/// mutation happens behind the session mutex on a message or timer callback,
/// so the pipeline is effectively single-writer.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    ingest: Arc<Mutex<Option<JoinHandle<()>>>>,
    link: Arc<Mutex<VisionLink>>,
    scheduler: AlertScheduler,
    labels: Arc<StdMutex<LabelResolver>>,
    config: ConfigHandle,
    events: EventBus,
    tracking_enabled: Arc<AtomicBool>,
    tick_interval: Duration,
}

impl SessionController {
    pub fn new(
        config: ConfigHandle,
        events: EventBus,
        scheduler: AlertScheduler,
        labels: Arc<StdMutex<LabelResolver>>,
        window_capacity: usize,
    ) -> Self {
        let link = VisionLink::new(config.detection());
        Self {
            state: Arc::new(Mutex::new(SessionState::new(window_capacity))),
            ticker: Arc::new(Mutex::new(None)),
            ingest: Arc::new(Mutex::new(None)),
            link: Arc::new(Mutex::new(link)),
            scheduler,
            labels,
            config,
            events,
            tracking_enabled: Arc::new(AtomicBool::new(true)),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub async fn get_snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        let now = Instant::now();
        SessionSnapshot {
            status: state.status,
            session_id: state.session_id.clone(),
            focus_level: state.focus_level,
            focus_state: state.focus_state,
            elapsed_seconds: state.elapsed_ms(now) / 1000,
            remaining_ms: state.remaining_ms(now),
            tracking_enabled: self.tracking_enabled.load(Ordering::SeqCst),
        }
    }

    /// Begin a countdown session. An already-running session is torn down
    /// first (its partial data is discarded, not summarized).
    pub async fn start_session(&self, duration_seconds: f64) -> Result<SessionSnapshot> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(anyhow!(
                "session duration must be a positive finite number of seconds"
            ));
        }
        let target_ms = (duration_seconds * 1000.0).round() as u64;

        {
            let state = self.state.lock().await;
            if state.status == SessionStatus::Running {
                warn!("start requested while a session is running; resetting");
            }
        }
        self.cancel_ticker().await;
        self.scheduler.reset();
        self.labels.lock().unwrap().reset();

        let session_id = Uuid::new_v4().to_string();
        info!("starting session {session_id} ({target_ms} ms)");

        {
            let mut state = self.state.lock().await;
            state.begin_session(session_id, target_ms, Utc::now(), Instant::now());
            if !self.tracking_enabled.load(Ordering::SeqCst) {
                state.focus_state = FocusState::Offline;
            }
            self.events.emit(EngineEvent::FocusUpdated {
                level: state.focus_level,
                state: state.focus_state,
            });
        }

        self.spawn_ticker().await;
        Ok(self.get_snapshot().await)
    }

    /// End the running session and return its summary. A no-op returning an
    /// empty summary when nothing runs.
    pub async fn end_session(&self) -> SessionSummary {
        let summary = self.finish_session(true).await;
        if let Some(summary) = summary {
            summary
        } else {
            SessionSummary::default()
        }
    }

    /// Flip tracking. Disabling mid-distraction closes the open episode the
    /// same way session end does; re-enabling rebuilds the state from the
    /// current focus level.
    pub async fn toggle_tracking(&self) -> bool {
        let enabled = !self.tracking_enabled.fetch_xor(true, Ordering::SeqCst);
        info!("tracking {}", if enabled { "enabled" } else { "disabled" });

        let mut state = self.state.lock().await;
        if state.status != SessionStatus::Running {
            return enabled;
        }

        let elapsed_ms = state.elapsed_ms(Instant::now());
        let next = if enabled {
            state.smoother.state()
        } else {
            FocusState::Offline
        };
        self.apply_transition(&mut state, next, elapsed_ms);
        self.events.emit(EngineEvent::FocusUpdated {
            level: state.focus_level,
            state: state.focus_state,
        });
        enabled
    }

    /// Feed one decoded sample through the pipeline. Public so shells that
    /// transport samples themselves can bypass the built-in link.
    pub async fn ingest_sample(&self, sample: VisionSample) {
        if sample.is_camera_error() {
            let error = sample.error.unwrap_or_else(|| "camera-error".to_string());
            warn!("vision process reported {error}");
            self.events.emit(EngineEvent::VisionError { error });
            return;
        }

        let mut state = self.state.lock().await;
        if state.status != SessionStatus::Running
            || !self.tracking_enabled.load(Ordering::SeqCst)
        {
            return;
        }

        if let Some(label) = sample.normalized_state() {
            self.labels.lock().unwrap().observe(&label);
        }

        let detection = self.config.detection();
        let include_talking = self.config.include_talking();
        let verdict = classify(&sample, &detection, include_talking);

        let (level, next) = state.smoother.push(verdict.focused);
        state.focus_level = level;

        let elapsed_ms = state.elapsed_ms(Instant::now());
        self.apply_transition(&mut state, next, elapsed_ms);

        self.events.emit(EngineEvent::FocusUpdated {
            level,
            state: state.focus_state,
        });
    }

    /// Handle one event from the link worker.
    pub async fn process_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Status(status) => {
                if status == LinkStatus::Disconnected {
                    // The echo authority dies with the connection.
                    self.config.clear_remote();
                }
                self.events.emit(EngineEvent::LinkStatus { status });
            }
            LinkEvent::ConfigEcho(config) => {
                info!("adopting remote config echo (include_talking={})", config.include_talking);
                self.config.set_remote(config);
            }
            LinkEvent::Preview(jpeg_base64) => {
                self.events.emit(EngineEvent::PreviewFrame { jpeg_base64 });
            }
            LinkEvent::Sample(sample) => self.ingest_sample(sample).await,
        }
    }

    /// Open the vision link and start consuming its events.
    pub async fn connect_vision(&self, url: &str) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.link.lock().await.connect(url, tx)?;

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                controller.process_link_event(event).await;
            }
        });

        let mut ingest_guard = self.ingest.lock().await;
        if let Some(stale) = ingest_guard.take() {
            stale.abort();
        }
        *ingest_guard = Some(handle);
        Ok(())
    }

    pub async fn disconnect_vision(&self) -> Result<()> {
        self.link.lock().await.disconnect().await
    }

    /// Push edited thresholds to the link for immediate re-send.
    pub async fn apply_config(&self, config: crate::settings::DetectionConfig) {
        self.link.lock().await.push_config(config);
    }

    pub async fn link_decode_errors(&self) -> u64 {
        self.link.lock().await.decode_errors()
    }

    /// Shared teardown for explicit end and countdown completion. Returns
    /// `None` when no session was running.
    async fn finish_session(&self, abort_ticker: bool) -> Option<SessionSummary> {
        let summary = {
            let mut state = self.state.lock().await;
            if state.status != SessionStatus::Running {
                return None;
            }
            let elapsed_ms = state.elapsed_ms(Instant::now());
            state.timeline.close_open_episode(elapsed_ms);
            let summary = state
                .timeline
                .summary(elapsed_ms, self.scheduler.alert_count());
            let session_id = state.session_id.clone().unwrap_or_default();
            info!(
                "session {session_id} finished: {}s total, {}s distracted, {} alerts",
                summary.total_seconds, summary.distracted_seconds, summary.alert_count
            );
            state.reset();
            summary
        };

        self.scheduler.cancel_all();
        if abort_ticker {
            self.cancel_ticker().await;
        }
        if let Err(err) = self.disconnect_vision().await {
            error!("failed to close vision link at session end: {err}");
        }
        self.config.clear_remote();

        self.events.emit(EngineEvent::SessionCompleted {
            summary: summary.clone(),
        });
        Some(summary)
    }

    /// Record a focus state change: timeline entries, episode debounce
    /// timers and their cancellation all hang off this one edge.
    fn apply_transition(&self, state: &mut SessionState, next: FocusState, elapsed_ms: u64) {
        let prev = state.focus_state;
        if prev == next {
            return;
        }

        let label = if next == FocusState::Distracted {
            self.labels
                .lock()
                .unwrap()
                .resolve(self.config.include_talking())
                .unwrap_or_else(|| DEFAULT_DISTRACTION_LABEL.to_string())
        } else {
            "focused".to_string()
        };

        let transition =
            state
                .timeline
                .on_focus_state_change(prev, next, elapsed_ms, &label, Utc::now());
        match transition {
            TimelineTransition::Opened { episode, entry } => {
                let already_elapsed =
                    Duration::from_millis(elapsed_ms.saturating_sub(episode.opened_at_ms));
                self.scheduler.watch_episode(&episode.id, already_elapsed);
                self.events.emit(EngineEvent::TimelineAppended { entry });
            }
            TimelineTransition::Closed { episode_id, entry } => {
                self.scheduler.cancel_episode(&episode_id);
                if let Some(entry) = entry {
                    self.events.emit(EngineEvent::TimelineAppended { entry });
                }
            }
            TimelineTransition::None => {}
        }
        state.focus_state = next;
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first tick completes immediately; skip it so ticks land on
            // whole-second boundaries after start.
            interval.tick().await;
            loop {
                interval.tick().await;

                let (elapsed_seconds, remaining_ms) = {
                    let state = controller.state.lock().await;
                    if state.status != SessionStatus::Running {
                        break;
                    }
                    let now = Instant::now();
                    (state.elapsed_ms(now) / 1000, state.remaining_ms(now))
                };

                controller.events.emit(EngineEvent::SessionTick {
                    elapsed_seconds,
                    remaining_ms,
                });

                if remaining_ms <= 0 {
                    // Countdown hit zero; finish without aborting ourselves.
                    controller.finish_session(false).await;
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertCategory, AssetCatalog, QueuedAlert};
    use crate::settings::SettingsStore;
    use std::path::PathBuf;
    use tokio::sync::broadcast;
    use tokio::time::advance;

    struct Harness {
        controller: SessionController,
        alerts: mpsc::UnboundedReceiver<QueuedAlert>,
        events: broadcast::Receiver<EngineEvent>,
    }

    /// Controller wired like the engine does it, with a tiny focus window so
    /// single samples flip the state, and a full shrek catalog.
    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let config = ConfigHandle::new(store);

        let mut catalog = AssetCatalog::new();
        for category in AlertCategory::ALL {
            catalog.insert(
                "shrek",
                category,
                PathBuf::from(format!("shrek_{}.mp3", category.suffix())),
            );
        }

        let labels = Arc::new(StdMutex::new(LabelResolver::default()));
        let (queue_tx, alerts) = mpsc::unbounded_channel();
        let scheduler = AlertScheduler::new(
            Arc::new(catalog),
            config.clone(),
            labels.clone(),
            queue_tx,
        );
        let events = EventBus::default();
        let event_rx = events.subscribe();
        let controller = SessionController::new(config, events, scheduler, labels, 1);

        Harness {
            controller,
            alerts,
            events: event_rx,
        }
    }

    fn distracted_sample(state: &str) -> VisionSample {
        VisionSample {
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    fn focused_sample() -> VisionSample {
        VisionSample {
            state: Some("Focused".to_string()),
            ..Default::default()
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_durations_are_rejected_without_state_change() {
        let h = harness();
        for duration in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(h.controller.start_session(duration).await.is_err());
        }
        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn end_without_start_returns_empty_summary() {
        let h = harness();
        let summary = h.controller.end_session().await;
        assert_eq!(summary, SessionSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn full_pipeline_records_episode_and_alert() {
        let mut h = harness();
        h.controller.start_session(600.0).await.unwrap();

        advance(Duration::from_millis(5_000)).await;
        settle().await;
        h.controller
            .ingest_sample(distracted_sample("Looking Left"))
            .await;
        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.focus_state, FocusState::Distracted);
        assert_eq!(snapshot.focus_level, 0.0);

        // Sustained past the debounce delay: exactly one alert.
        advance(Duration::from_millis(4_100)).await;
        settle().await;
        let alert = h.alerts.try_recv().unwrap();
        assert_eq!(alert.category, AlertCategory::Side);
        assert!(h.alerts.try_recv().is_err());

        advance(Duration::from_millis(3_000)).await;
        settle().await;
        h.controller.ingest_sample(focused_sample()).await;
        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.focus_state, FocusState::Focused);

        let summary = h.controller.end_session().await;
        assert_eq!(summary.alert_count, 1);
        // Distracted from 5.0s to 12.1s, rounded to 7s.
        assert_eq!(summary.distracted_seconds, 7);
        assert_eq!(
            summary.focused_seconds + summary.distracted_seconds,
            summary.total_seconds
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quick_recovery_cancels_the_pending_alert() {
        let mut h = harness();
        h.controller.start_session(600.0).await.unwrap();

        h.controller
            .ingest_sample(distracted_sample("Looking Right"))
            .await;
        advance(Duration::from_millis(2_000)).await;
        settle().await;
        h.controller.ingest_sample(focused_sample()).await;
        advance(Duration::from_millis(10_000)).await;
        settle().await;

        assert!(h.alerts.try_recv().is_err());
        let summary = h.controller.end_session().await;
        assert_eq!(summary.alert_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaching_zero_ends_the_session() {
        let mut h = harness();
        h.controller.start_session(3.0).await.unwrap();

        for _ in 0..4 {
            advance(Duration::from_millis(1_000)).await;
            settle().await;
        }

        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);

        let mut completed = None;
        while let Ok(event) = h.events.try_recv() {
            if let EngineEvent::SessionCompleted { summary } = event {
                completed = Some(summary);
            }
        }
        let summary = completed.expect("session should auto-complete");
        assert_eq!(summary.total_seconds, 3);
        assert_eq!(summary.focused_seconds, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_resets_the_running_session() {
        let h = harness();
        h.controller.start_session(600.0).await.unwrap();
        let first_id = h.controller.get_snapshot().await.session_id;

        advance(Duration::from_millis(5_000)).await;
        settle().await;
        h.controller.start_session(600.0).await.unwrap();
        let snapshot = h.controller.get_snapshot().await;

        assert_eq!(snapshot.status, SessionStatus::Running);
        assert_ne!(snapshot.session_id, first_id);
        assert_eq!(snapshot.elapsed_seconds, 0);
        assert_eq!(snapshot.focus_level, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_toggle_goes_offline_and_ignores_samples() {
        let mut h = harness();
        h.controller.start_session(600.0).await.unwrap();
        h.controller
            .ingest_sample(distracted_sample("Looking Left"))
            .await;
        assert_eq!(
            h.controller.get_snapshot().await.focus_state,
            FocusState::Distracted
        );

        advance(Duration::from_millis(1_000)).await;
        settle().await;
        let enabled = h.controller.toggle_tracking().await;
        assert!(!enabled);
        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.focus_state, FocusState::Offline);

        // The open episode was closed and its debounce cancelled.
        advance(Duration::from_millis(10_000)).await;
        settle().await;
        assert!(h.alerts.try_recv().is_err());

        // Samples are ignored while offline.
        h.controller.ingest_sample(focused_sample()).await;
        assert_eq!(
            h.controller.get_snapshot().await.focus_state,
            FocusState::Offline
        );

        let enabled = h.controller.toggle_tracking().await;
        assert!(enabled);
        // Window still holds the distracted verdict from before the toggle.
        assert_eq!(
            h.controller.get_snapshot().await.focus_state,
            FocusState::Distracted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn flicker_within_distracted_produces_single_episode() {
        let mut h = harness();
        h.controller.start_session(600.0).await.unwrap();

        h.controller
            .ingest_sample(distracted_sample("Looking Left"))
            .await;
        h.controller
            .ingest_sample(distracted_sample("Looking Down"))
            .await;
        h.controller
            .ingest_sample(distracted_sample("PHONE DETECTED"))
            .await;
        advance(Duration::from_millis(4_100)).await;
        settle().await;

        // One episode, one alert, despite three different labels.
        let _ = h.alerts.try_recv().unwrap();
        assert!(h.alerts.try_recv().is_err());

        h.controller.ingest_sample(focused_sample()).await;
        let summary = h.controller.end_session().await;
        assert_eq!(summary.alert_count, 1);
    }
}
