use serde::{Deserialize, Serialize};

use crate::settings::DetectionConfig;

/// One raw payload from the vision process.
///
/// Field names follow the producer's wire format. Every field is optional:
/// the producer emits whatever its enabled detectors computed for the frame,
/// and unknown extras are ignored by serde. Samples are transient; nothing
/// retains them past classification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisionSample {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub h_ratio: Option<f64>,
    #[serde(default)]
    pub v_ratio: Option<f64>,
    #[serde(default)]
    pub left_ear: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub objects: Vec<String>,
    /// Set on camera failures (`camera-init-failed`, `camera-read-failed`).
    #[serde(default)]
    pub error: Option<String>,
    /// Base64 JPEG preview frame, throttled by the producer.
    #[serde(default)]
    pub preview_jpeg: Option<String>,
    /// Authoritative config echo from the remote side.
    #[serde(default)]
    pub config: Option<DetectionConfig>,
    #[serde(default)]
    pub face_detected: Option<bool>,
    #[serde(default)]
    pub frame_index: Option<u64>,
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub camera_id: Option<i64>,
}

impl VisionSample {
    /// Lowercased state label, if any.
    pub fn normalized_state(&self) -> Option<String> {
        self.state
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }

    pub fn is_camera_error(&self) -> bool {
        self.error.is_some()
            || self
                .normalized_state()
                .is_some_and(|s| s.contains("camera-error"))
    }
}

/// Outbound messages to the vision process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Config {
        h_min: f64,
        h_max: f64,
        v_min: f64,
        v_max: f64,
        ear_threshold: f64,
        audio_threshold: f64,
        include_talking: bool,
        include_objects: bool,
    },
}

impl OutboundMessage {
    pub fn config(config: &DetectionConfig) -> Self {
        OutboundMessage::Config {
            h_min: config.h_min,
            h_max: config.h_max,
            v_min: config.v_min,
            v_max: config.v_max,
            ear_threshold: config.ear_threshold,
            audio_threshold: config.audio_threshold,
            include_talking: config.include_talking,
            include_objects: config.include_objects,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Events delivered from the link worker to the engine.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Status(LinkStatus),
    /// Remote-authoritative config echo, split out of the carrying sample.
    ConfigEcho(DetectionConfig),
    Preview(String),
    Sample(VisionSample),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_producer_payload() {
        let raw = r#"{
            "state": "Looking Left",
            "h_ratio": 0.12,
            "v_ratio": 0.5,
            "left_ear": 0.3,
            "volume": 0.01,
            "objects": ["phone"],
            "camera_id": 0,
            "timestamp_ms": 1712345678901,
            "frame_index": 42,
            "face_detected": true
        }"#;
        let sample: VisionSample = serde_json::from_str(raw).unwrap();
        assert_eq!(sample.normalized_state().as_deref(), Some("looking left"));
        assert_eq!(sample.h_ratio, Some(0.12));
        assert_eq!(sample.objects, vec!["phone"]);
        assert!(!sample.is_camera_error());
    }

    #[test]
    fn tolerates_missing_and_unknown_fields() {
        let sample: VisionSample =
            serde_json::from_str(r#"{"state": "Focused", "some_future_field": 7}"#).unwrap();
        assert_eq!(sample.normalized_state().as_deref(), Some("focused"));
        assert!(sample.h_ratio.is_none());
        assert!(sample.objects.is_empty());

        let empty: VisionSample = serde_json::from_str("{}").unwrap();
        assert!(empty.normalized_state().is_none());
    }

    #[test]
    fn camera_error_payloads_are_flagged() {
        let raw = r#"{"state": "camera-error", "error": "camera-read-failed"}"#;
        let sample: VisionSample = serde_json::from_str(raw).unwrap();
        assert!(sample.is_camera_error());
    }

    #[test]
    fn config_echo_rides_on_a_sample() {
        let raw = r#"{"state": "Focused", "config": {
            "h_min": 0.1, "h_max": 0.9, "v_min": 0.3, "v_max": 0.8,
            "ear_threshold": 0.2, "audio_threshold": 0.4,
            "include_talking": false, "include_objects": true
        }}"#;
        let sample: VisionSample = serde_json::from_str(raw).unwrap();
        let echo = sample.config.unwrap();
        assert!(!echo.include_talking);
        assert_eq!(echo.h_min, 0.1);
    }

    #[test]
    fn outbound_config_has_wire_shape() {
        let message = OutboundMessage::config(&DetectionConfig::default());
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&message).unwrap()).unwrap();
        assert_eq!(value["type"], "config");
        assert_eq!(value["h_min"], 0.20);
        assert_eq!(value["ear_threshold"], 0.25);
        assert_eq!(value["include_talking"], true);
    }
}
