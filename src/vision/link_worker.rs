use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use futures_util::{Sink, SinkExt, StreamExt};
use log::{info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::settings::DetectionConfig;
use crate::vision::messages::{LinkEvent, LinkStatus, OutboundMessage, VisionSample};

/// How often the current detection config is pushed to the remote side even
/// without edits. Guards against lost updates on an unreliable channel.
pub const CONFIG_RESYNC_INTERVAL: Duration = Duration::from_millis(2000);

/// Connection loop for one vision link.
///
/// Sends the current config immediately on connect, then again on every
/// resync tick and whenever the watch channel reports an edit. Inbound text
/// frames decode as samples; anything malformed is counted and discarded
/// without touching the connection. Exits on cancellation, remote close, or
/// transport error, always emitting a final Disconnected status.
pub(crate) async fn link_loop(
    url: String,
    mut config_rx: watch::Receiver<DetectionConfig>,
    events: mpsc::UnboundedSender<LinkEvent>,
    cancel: CancellationToken,
    decode_errors: Arc<AtomicU64>,
) {
    let _ = events.send(LinkEvent::Status(LinkStatus::Connecting));

    let stream = tokio::select! {
        connected = connect_async(url.as_str()) => match connected {
            Ok((stream, _response)) => stream,
            Err(err) => {
                warn!("vision link connect failed ({url}): {err}");
                let _ = events.send(LinkEvent::Status(LinkStatus::Disconnected));
                return;
            }
        },
        _ = cancel.cancelled() => {
            let _ = events.send(LinkEvent::Status(LinkStatus::Disconnected));
            return;
        }
    };
    info!("vision link connected to {url}");

    let (mut sink, mut inbound) = stream.split();

    // Mark the current config as seen so the first changed() below really
    // means an edit, not the initial value.
    config_rx.mark_unchanged();
    let initial = config_rx.borrow().clone();
    if send_config(&mut sink, &initial).await.is_err() {
        let _ = events.send(LinkEvent::Status(LinkStatus::Disconnected));
        return;
    }
    let _ = events.send(LinkEvent::Status(LinkStatus::Connected));

    let mut resync = interval(CONFIG_RESYNC_INTERVAL);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval's first tick completes immediately; the config just went
    // out, so consume it up front.
    resync.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("vision link shutting down");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            _ = resync.tick() => {
                let config = config_rx.borrow().clone();
                if send_config(&mut sink, &config).await.is_err() {
                    break;
                }
            }
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let config = config_rx.borrow_and_update().clone();
                if send_config(&mut sink, &config).await.is_err() {
                    break;
                }
            }
            message = inbound.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    dispatch_payload(&text, &events, &decode_errors);
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("vision link closed by remote");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("vision link read error: {err}");
                    break;
                }
            }
        }
    }

    let _ = events.send(LinkEvent::Status(LinkStatus::Disconnected));
}

async fn send_config<S>(sink: &mut S, config: &DetectionConfig) -> anyhow::Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let message = OutboundMessage::config(config);
    let json = serde_json::to_string(&message)?;
    sink.send(Message::Text(json)).await.map_err(|err| {
        warn!("vision link config send failed: {err}");
        anyhow::anyhow!("config send failed: {err}")
    })
}

/// Decode one inbound payload and fan its parts out as events. Decode
/// failures bump the counter and drop the payload; the connection stays up.
fn dispatch_payload(
    text: &str,
    events: &mpsc::UnboundedSender<LinkEvent>,
    decode_errors: &Arc<AtomicU64>,
) {
    let sample: VisionSample = match serde_json::from_str(text) {
        Ok(sample) => sample,
        Err(err) => {
            decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!("discarding malformed vision payload: {err}");
            return;
        }
    };

    if let Some(config) = sample.config.clone() {
        let _ = events.send(LinkEvent::ConfigEcho(config));
    }
    if let Some(preview) = sample.preview_jpeg.clone() {
        let _ = events.send(LinkEvent::Preview(preview));
    }
    let _ = events.send(LinkEvent::Sample(sample));
}
