use anyhow::{bail, Context, Result};
use log::info;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::settings::DetectionConfig;
use crate::vision::link_worker::link_loop;
use crate::vision::messages::LinkEvent;

/// Owns the lifecycle of the streaming connection to the vision process.
///
/// One worker task per connection; `disconnect` cancels it and joins, so no
/// late callback can outlive the link. Config pushes go through a watch
/// channel: the worker always sends the latest value, which is exactly the
/// at-least-once semantics the resync protocol wants.
pub struct VisionLink {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    config_tx: watch::Sender<DetectionConfig>,
    decode_errors: Arc<AtomicU64>,
}

impl VisionLink {
    pub fn new(initial_config: DetectionConfig) -> Self {
        let (config_tx, _) = watch::channel(initial_config);
        Self {
            handle: None,
            cancel_token: None,
            config_tx,
            decode_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the link worker. Fails if a worker is already running.
    pub fn connect(&mut self, url: &str, events: mpsc::UnboundedSender<LinkEvent>) -> Result<()> {
        if self.is_connected() {
            bail!("vision link already active");
        }

        info!("starting vision link to {url}");
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(link_loop(
            url.to_string(),
            self.config_tx.subscribe(),
            events,
            cancel_token.clone(),
            self.decode_errors.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Replace the config the worker mirrors to the remote side. Triggers an
    /// immediate re-send when connected; harmless when not.
    pub fn push_config(&self, config: DetectionConfig) {
        self.config_tx.send_replace(config);
    }

    /// Cancel the worker and wait for it to wind down.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("vision link task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }

    /// Malformed inbound payloads discarded since the link was created.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::messages::LinkStatus;

    #[tokio::test]
    async fn connect_refused_reports_disconnected_without_crashing() {
        let mut link = VisionLink::new(DetectionConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Nothing listens on this port; the worker must fail soft.
        link.connect("ws://127.0.0.1:9", tx).unwrap();

        let mut statuses = Vec::new();
        while let Some(event) = rx.recv().await {
            if let LinkEvent::Status(status) = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![LinkStatus::Connecting, LinkStatus::Disconnected]
        );

        link.disconnect().await.unwrap();
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn double_connect_is_rejected() {
        let mut link = VisionLink::new(DetectionConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        link.connect("ws://127.0.0.1:9", tx).unwrap();
        assert!(link.connect("ws://127.0.0.1:9", tx2).is_err());
        link.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_a_no_op() {
        let mut link = VisionLink::new(DetectionConfig::default());
        link.disconnect().await.unwrap();
        assert_eq!(link.decode_errors(), 0);
    }
}
