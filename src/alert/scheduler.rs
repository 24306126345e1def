use serde::Serialize;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::alert::assets::{AlertCategory, AssetCatalog};
use crate::labels::LabelResolver;
use crate::settings::ConfigHandle;
use crate::timeline::DEFAULT_DISTRACTION_LABEL;

/// Minimum sustained distraction before an alert may fire.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(4000);

/// A reaction asset committed to the playback queue. Once emitted it is
/// never dropped; the player consumes the queue one asset at a time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAlert {
    pub episode_id: String,
    pub category: AlertCategory,
    pub character: String,
    pub asset: PathBuf,
}

/// Terminal-state bookkeeping for one watched episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpisodeState {
    Watching,
    Cancelled,
    Queued,
    Dropped,
}

struct EpisodeWatch {
    state: EpisodeState,
    cancel: CancellationToken,
}

/// Converts sustained distraction episodes into at most one queued reaction
/// asset each.
///
/// Every episode gets its own debounce timer and cancellation token, stored
/// in a map keyed by episode id so rapid overlapping episodes cannot clobber
/// each other's timers. Category and asset resolution happen at fire time,
/// from whatever the label window says by then.
#[derive(Clone)]
pub struct AlertScheduler {
    episodes: Arc<Mutex<HashMap<String, EpisodeWatch>>>,
    labels: Arc<Mutex<LabelResolver>>,
    catalog: Arc<AssetCatalog>,
    config: ConfigHandle,
    queue_tx: mpsc::UnboundedSender<QueuedAlert>,
    alert_count: Arc<AtomicU32>,
}

impl AlertScheduler {
    pub fn new(
        catalog: Arc<AssetCatalog>,
        config: ConfigHandle,
        labels: Arc<Mutex<LabelResolver>>,
        queue_tx: mpsc::UnboundedSender<QueuedAlert>,
    ) -> Self {
        Self {
            episodes: Arc::new(Mutex::new(HashMap::new())),
            labels,
            catalog,
            config,
            queue_tx,
            alert_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Arm the debounce timer for a new distraction episode.
    ///
    /// `already_elapsed` is how long the episode had been running when the
    /// scheduler observed it; the remaining wait is `DEBOUNCE_DELAY` minus
    /// that, clamped at zero, so an episode is never double-delayed.
    pub fn watch_episode(&self, episode_id: &str, already_elapsed: Duration) {
        let cancel = CancellationToken::new();
        {
            let mut episodes = self.episodes.lock().unwrap();
            episodes.insert(
                episode_id.to_string(),
                EpisodeWatch {
                    state: EpisodeState::Watching,
                    cancel: cancel.clone(),
                },
            );
        }

        let remaining = DEBOUNCE_DELAY.saturating_sub(already_elapsed);
        let scheduler = self.clone();
        let episode_id = episode_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(remaining) => scheduler.fire(&episode_id),
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Focus recovered before the timer fired; no alert for this episode.
    pub fn cancel_episode(&self, episode_id: &str) {
        let mut episodes = self.episodes.lock().unwrap();
        if let Some(watch) = episodes.get_mut(episode_id) {
            if watch.state == EpisodeState::Watching {
                watch.state = EpisodeState::Cancelled;
                watch.cancel.cancel();
            }
        }
    }

    /// Session teardown: cancel every pending timer and forget all episodes.
    pub fn cancel_all(&self) {
        let mut episodes = self.episodes.lock().unwrap();
        for watch in episodes.values() {
            watch.cancel.cancel();
        }
        episodes.clear();
    }

    pub fn alert_count(&self) -> u32 {
        self.alert_count.load(Ordering::SeqCst)
    }

    /// New session: clear terminal episode states and the alert counter.
    pub fn reset(&self) {
        self.cancel_all();
        self.alert_count.store(0, Ordering::SeqCst);
    }

    fn fire(&self, episode_id: &str) {
        let mut episodes = self.episodes.lock().unwrap();
        let Some(watch) = episodes.get_mut(episode_id) else {
            return;
        };
        // Idempotence: anything but Watching means this episode already
        // reached a terminal state.
        if watch.state != EpisodeState::Watching {
            return;
        }

        let include_talking = self.config.include_talking();
        let label = self
            .labels
            .lock()
            .unwrap()
            .resolve(include_talking)
            .unwrap_or_else(|| DEFAULT_DISTRACTION_LABEL.to_string());

        let Some(category) = AlertCategory::resolve(&label, include_talking) else {
            log::debug!("episode {episode_id}: no category for label {label:?}, dropping");
            watch.state = EpisodeState::Dropped;
            return;
        };

        let character = self.config.character();
        let Some(asset) = self.catalog.lookup(&character, category) else {
            log::debug!(
                "episode {episode_id}: {character} has no {:?} asset, dropping",
                category
            );
            watch.state = EpisodeState::Dropped;
            return;
        };

        watch.state = EpisodeState::Queued;
        self.alert_count.fetch_add(1, Ordering::SeqCst);
        let alert = QueuedAlert {
            episode_id: episode_id.to_string(),
            category,
            character,
            asset: asset.clone(),
        };
        log::info!(
            "queueing {:?} alert for episode {} ({})",
            category,
            episode_id,
            alert.asset.display()
        );
        let _ = self.queue_tx.send(alert);
    }
}
