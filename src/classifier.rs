use serde::Serialize;

use crate::settings::DetectionConfig;
use crate::vision::messages::VisionSample;

/// Detected objects that override every other signal toward "not focused".
/// The producer's object detector reports cell phones and books; the extra
/// spellings cover label drift across model versions.
pub const DISTRACTOR_OBJECTS: [&str; 5] = ["phone", "cell phone", "tablet", "ipad", "book"];

const FOCUSED_STATES: [&str; 2] = ["focused", "at screen"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictReason {
    State,
    Centered,
    Distractor,
    Audio,
    NoFace,
    EyesClosed,
    OffCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub focused: bool,
    pub reason: VerdictReason,
}

impl Verdict {
    fn focused(reason: VerdictReason) -> Self {
        Self {
            focused: true,
            reason,
        }
    }

    fn distracted(reason: VerdictReason) -> Self {
        Self {
            focused: false,
            reason,
        }
    }
}

/// Classify one raw vision sample.
///
/// Rule order is a contract: distractor objects beat everything, including an
/// explicit "focused" state, and the centered-ratio check is only a fallback
/// when the producer gave no usable state. Missing fields disqualify the rule
/// that needs them and fall through to the next one.
pub fn classify(
    sample: &VisionSample,
    config: &DetectionConfig,
    include_talking: bool,
) -> Verdict {
    let state = sample.normalized_state().unwrap_or_default();

    if sample.objects.iter().any(|object| {
        let object = object.trim().to_lowercase();
        DISTRACTOR_OBJECTS.contains(&object.as_str())
    }) {
        return Verdict::distracted(VerdictReason::Distractor);
    }

    if state.contains("phone") || state.contains("book") {
        return Verdict::distracted(VerdictReason::Distractor);
    }

    if include_talking && state.contains("talking") {
        return Verdict::distracted(VerdictReason::Audio);
    }

    if state.contains("no face") {
        return Verdict::distracted(VerdictReason::NoFace);
    }

    if let Some(left_ear) = sample.left_ear {
        if left_ear < config.ear_threshold {
            return Verdict::distracted(VerdictReason::EyesClosed);
        }
    }

    if FOCUSED_STATES.contains(&state.as_str()) {
        return Verdict::focused(VerdictReason::State);
    }

    if let (Some(h_ratio), Some(v_ratio)) = (sample.h_ratio, sample.v_ratio) {
        if h_ratio >= config.h_min
            && h_ratio <= config.h_max
            && v_ratio >= config.v_min
            && v_ratio <= config.v_max
        {
            return Verdict::focused(VerdictReason::Centered);
        }
    }

    Verdict::distracted(VerdictReason::OffCenter)
}
