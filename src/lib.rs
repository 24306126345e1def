pub mod alert;
pub mod classifier;
pub mod events;
pub mod labels;
pub mod session;
pub mod settings;
pub mod smoother;
pub mod timeline;
pub mod vision;

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use log::info;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use alert::{AlertPlayer, AlertScheduler, AssetCatalog, QueuedAlert};
use events::{EngineEvent, EventBus};
use labels::LabelResolver;
use session::{SessionController, SessionSnapshot};
use settings::{ConfigHandle, DetectionConfig, SettingsStore};
use smoother::DEFAULT_WINDOW_CAPACITY;
use timeline::SessionSummary;

pub struct EngineOptions {
    /// Where detection thresholds and the selected character persist.
    pub settings_path: PathBuf,
    /// Root of the per-character reaction audio directories.
    pub assets_dir: PathBuf,
    /// Focus window capacity; defaults to [`DEFAULT_WINDOW_CAPACITY`].
    pub window_capacity: usize,
}

impl EngineOptions {
    pub fn new(settings_path: PathBuf, assets_dir: PathBuf) -> Self {
        Self {
            settings_path,
            assets_dir,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

/// The engine behind the attention dashboard: owns settings, the session
/// controller, the alert pipeline and the outbound event bus. The
/// presentation layer talks to this and nothing else.
pub struct FocusEngine {
    settings: Arc<SettingsStore>,
    controller: SessionController,
    player: Arc<AlertPlayer>,
    events: EventBus,
    _queue_pump: JoinHandle<()>,
}

impl FocusEngine {
    /// Wire up the engine. Must run inside a tokio runtime; background tasks
    /// are spawned immediately.
    pub fn new(options: EngineOptions) -> Result<Self> {
        let settings = Arc::new(
            SettingsStore::new(options.settings_path.clone())
                .context("failed to open settings store")?,
        );
        let config = ConfigHandle::new(settings.clone());

        let catalog = Arc::new(AssetCatalog::scan(&options.assets_dir)?);
        if catalog.is_empty() {
            info!(
                "no reaction assets found under {}",
                options.assets_dir.display()
            );
        }

        let labels = Arc::new(StdMutex::new(LabelResolver::default()));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let scheduler = AlertScheduler::new(catalog, config.clone(), labels.clone(), queue_tx);

        let events = EventBus::default();
        let player = Arc::new(AlertPlayer::new());
        let queue_pump = Self::spawn_queue_pump(queue_rx, player.clone(), events.clone());

        let controller = SessionController::new(
            config,
            events.clone(),
            scheduler,
            labels,
            options.window_capacity.max(1),
        );

        Ok(Self {
            settings,
            controller,
            player,
            events,
            _queue_pump: queue_pump,
        })
    }

    /// Single consumer of the alert queue: every queued alert is announced
    /// and handed to the player, in order, none dropped.
    fn spawn_queue_pump(
        mut queue_rx: mpsc::UnboundedReceiver<QueuedAlert>,
        player: Arc<AlertPlayer>,
        events: EventBus,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(alert) = queue_rx.recv().await {
                events.emit(EngineEvent::AlertQueued {
                    alert: alert.clone(),
                });
                if let Err(err) = player.enqueue(alert.asset.clone()) {
                    log::error!("alert playback unavailable: {err}");
                }
            }
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn connect_vision(&self, url: &str) -> Result<()> {
        self.controller.connect_vision(url).await
    }

    pub async fn disconnect_vision(&self) -> Result<()> {
        self.controller.disconnect_vision().await
    }

    pub async fn start_session(&self, duration_seconds: f64) -> Result<SessionSnapshot> {
        self.controller.start_session(duration_seconds).await
    }

    pub async fn end_session(&self) -> SessionSummary {
        self.controller.end_session().await
    }

    /// Cut reaction audio, discarding anything still unplayed. Left to the
    /// shell to decide; queued alerts otherwise play out even after the
    /// session ends.
    pub fn stop_alert_playback(&self) {
        self.player.stop();
    }

    pub async fn toggle_tracking(&self) -> bool {
        self.controller.toggle_tracking().await
    }

    pub async fn get_snapshot(&self) -> SessionSnapshot {
        self.controller.get_snapshot().await
    }

    /// Persist edited thresholds and mirror them to the remote process
    /// immediately.
    pub async fn update_detection(&self, config: DetectionConfig) -> Result<()> {
        self.settings.update_detection(config.clone())?;
        self.controller.apply_config(config).await;
        Ok(())
    }

    pub fn detection(&self) -> DetectionConfig {
        self.settings.detection()
    }

    pub fn set_character(&self, name: &str) -> Result<()> {
        self.settings.set_character(name)
    }

    pub fn character(&self) -> String {
        self.settings.character()
    }

    pub async fn link_decode_errors(&self) -> u64 {
        self.controller.link_decode_errors().await
    }
}

/// Initialize logging for embedding shells (reads RUST_LOG).
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
