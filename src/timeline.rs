use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::smoother::FocusState;

/// Label used when the majority resolver has nothing better to offer.
pub const DEFAULT_DISTRACTION_LABEL: &str = "distracted";

/// One focused↔distracted transition, stamped with session-relative time.
/// Entries are append-only and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub elapsed_seconds: u64,
    pub state: FocusState,
    pub label: String,
}

/// An in-flight span of distraction. Exists only while the focus state is
/// distracted; closing it folds its duration into the session accumulators.
#[derive(Debug, Clone)]
pub struct DistractionEpisode {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub opened_at_ms: u64,
    pub elapsed_seconds_at_start: u64,
    pub label: String,
}

/// What a state change did to the timeline.
#[derive(Debug, Clone)]
pub enum TimelineTransition {
    None,
    Opened {
        episode: DistractionEpisode,
        entry: TimelineEntry,
    },
    Closed {
        episode_id: String,
        entry: Option<TimelineEntry>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_seconds: u64,
    pub distracted_seconds: u64,
    pub focused_seconds: u64,
    pub alert_count: u32,
}

/// Transition recorder and accumulator store for one running session.
#[derive(Debug, Clone, Default)]
pub struct SessionTimeline {
    entries: Vec<TimelineEntry>,
    open_episode: Option<DistractionEpisode>,
    distracted_seconds: u64,
    episode_count: u32,
}

impl SessionTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a focus state change at `elapsed_ms` since session start.
    ///
    /// Only transitions that cross the focused/distracted boundary produce
    /// entries; flapping within the same category is a no-op. Leaving
    /// distracted for anything other than focused (tracking toggled off)
    /// closes the episode without appending a recovery entry, the same way
    /// session end does.
    pub fn on_focus_state_change(
        &mut self,
        prev: FocusState,
        next: FocusState,
        elapsed_ms: u64,
        label: &str,
        now: DateTime<Utc>,
    ) -> TimelineTransition {
        if prev == next {
            return TimelineTransition::None;
        }

        let entering = next == FocusState::Distracted && prev != FocusState::Distracted;
        let leaving = prev == FocusState::Distracted && next != FocusState::Distracted;

        if entering {
            let elapsed_seconds = elapsed_ms / 1000;
            let episode = DistractionEpisode {
                id: Uuid::new_v4().to_string(),
                started_at: now,
                opened_at_ms: elapsed_ms,
                elapsed_seconds_at_start: elapsed_seconds,
                label: label.to_string(),
            };
            let entry = TimelineEntry {
                elapsed_seconds,
                state: FocusState::Distracted,
                label: label.to_string(),
            };
            self.open_episode = Some(episode.clone());
            self.episode_count += 1;
            self.entries.push(entry.clone());
            return TimelineTransition::Opened { episode, entry };
        }

        if leaving {
            let Some(episode_id) = self.close_open_episode(elapsed_ms) else {
                return TimelineTransition::None;
            };
            let entry = if next == FocusState::Focused {
                let entry = TimelineEntry {
                    elapsed_seconds: elapsed_ms / 1000,
                    state: FocusState::Focused,
                    label: "focused".to_string(),
                };
                self.entries.push(entry.clone());
                Some(entry)
            } else {
                None
            };
            return TimelineTransition::Closed { episode_id, entry };
        }

        TimelineTransition::None
    }

    /// Close any open episode without appending an entry. Returns the closed
    /// episode id, used at session end and when tracking drops offline.
    pub fn close_open_episode(&mut self, elapsed_ms: u64) -> Option<String> {
        let episode = self.open_episode.take()?;
        let duration_ms = elapsed_ms.saturating_sub(episode.opened_at_ms);
        self.distracted_seconds += round_to_seconds(duration_ms);
        Some(episode.id)
    }

    pub fn open_episode(&self) -> Option<&DistractionEpisode> {
        self.open_episode.as_ref()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn episode_count(&self) -> u32 {
        self.episode_count
    }

    pub fn distracted_seconds(&self) -> u64 {
        self.distracted_seconds
    }

    /// Freeze the accumulators into a summary. Any open episode must already
    /// be closed via [`Self::close_open_episode`].
    pub fn summary(&self, session_elapsed_ms: u64, alert_count: u32) -> SessionSummary {
        // Total is never zero so downstream percentage math stays defined.
        let total_seconds = round_to_seconds(session_elapsed_ms).max(1);
        let distracted_seconds = self.distracted_seconds.min(total_seconds);
        SessionSummary {
            total_seconds,
            distracted_seconds,
            focused_seconds: total_seconds - distracted_seconds,
            alert_count,
        }
    }
}

fn round_to_seconds(ms: u64) -> u64 {
    (ms as f64 / 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn completed_episode_appends_two_entries() {
        let mut timeline = SessionTimeline::new();
        let opened = timeline.on_focus_state_change(
            FocusState::Focused,
            FocusState::Distracted,
            10_000,
            "looking left",
            now(),
        );
        assert!(matches!(opened, TimelineTransition::Opened { .. }));

        let closed = timeline.on_focus_state_change(
            FocusState::Distracted,
            FocusState::Focused,
            17_400,
            "focused",
            now(),
        );
        assert!(matches!(closed, TimelineTransition::Closed { .. }));

        assert_eq!(timeline.entries().len(), 2);
        assert_eq!(timeline.episode_count(), 1);
        // 7400 ms rounds to 7 s.
        assert_eq!(timeline.distracted_seconds(), 7);
        assert_eq!(
            timeline.entries()[0],
            TimelineEntry {
                elapsed_seconds: 10,
                state: FocusState::Distracted,
                label: "looking left".into(),
            }
        );
        assert_eq!(timeline.entries()[1].label, "focused");
    }

    #[test]
    fn flapping_within_a_category_is_silent() {
        let mut timeline = SessionTimeline::new();
        let t = timeline.on_focus_state_change(
            FocusState::Focused,
            FocusState::Focused,
            1_000,
            "focused",
            now(),
        );
        assert!(matches!(t, TimelineTransition::None));
        assert!(timeline.entries().is_empty());

        // Focused to offline does not cross the distracted boundary either.
        let t = timeline.on_focus_state_change(
            FocusState::Focused,
            FocusState::Offline,
            2_000,
            "focused",
            now(),
        );
        assert!(matches!(t, TimelineTransition::None));
        assert!(timeline.entries().is_empty());
    }

    #[test]
    fn entry_count_matches_episode_arithmetic() {
        let mut timeline = SessionTimeline::new();
        let mut elapsed = 0;
        for _ in 0..3 {
            elapsed += 5_000;
            timeline.on_focus_state_change(
                FocusState::Focused,
                FocusState::Distracted,
                elapsed,
                "looking down",
                now(),
            );
            elapsed += 5_000;
            timeline.on_focus_state_change(
                FocusState::Distracted,
                FocusState::Focused,
                elapsed,
                "focused",
                now(),
            );
        }
        // Three completed episodes, two entries each.
        assert_eq!(timeline.entries().len(), 6);

        // One more left open at session end adds a single entry.
        timeline.on_focus_state_change(
            FocusState::Focused,
            FocusState::Distracted,
            elapsed + 5_000,
            "looking up",
            now(),
        );
        timeline.close_open_episode(elapsed + 9_000);
        assert_eq!(timeline.entries().len(), 7);
        assert_eq!(timeline.episode_count(), 4);
    }

    #[test]
    fn offline_closure_accumulates_without_entry() {
        let mut timeline = SessionTimeline::new();
        timeline.on_focus_state_change(
            FocusState::Focused,
            FocusState::Distracted,
            1_000,
            "looking left",
            now(),
        );
        let t = timeline.on_focus_state_change(
            FocusState::Distracted,
            FocusState::Offline,
            4_000,
            "focused",
            now(),
        );
        match t {
            TimelineTransition::Closed { entry, .. } => assert!(entry.is_none()),
            other => panic!("expected Closed, got {other:?}"),
        }
        assert_eq!(timeline.entries().len(), 1);
        assert_eq!(timeline.distracted_seconds(), 3);
        assert!(timeline.open_episode().is_none());
    }

    #[test]
    fn summary_totals_balance_exactly() {
        let mut timeline = SessionTimeline::new();
        timeline.on_focus_state_change(
            FocusState::Focused,
            FocusState::Distracted,
            2_000,
            "looking right",
            now(),
        );
        timeline.on_focus_state_change(
            FocusState::Distracted,
            FocusState::Focused,
            6_500,
            "focused",
            now(),
        );

        let summary = timeline.summary(60_200, 1);
        assert_eq!(summary.total_seconds, 60);
        assert_eq!(summary.distracted_seconds, 5);
        assert_eq!(summary.focused_seconds, 55);
        assert_eq!(
            summary.focused_seconds + summary.distracted_seconds,
            summary.total_seconds
        );
        assert_eq!(summary.alert_count, 1);
    }

    #[test]
    fn summary_total_is_never_zero() {
        let timeline = SessionTimeline::new();
        let summary = timeline.summary(120, 0);
        assert_eq!(summary.total_seconds, 1);
        assert_eq!(summary.focused_seconds, 1);
    }

    #[test]
    fn distraction_never_exceeds_total() {
        let mut timeline = SessionTimeline::new();
        timeline.on_focus_state_change(
            FocusState::Focused,
            FocusState::Distracted,
            0,
            "looking left",
            now(),
        );
        // Per-episode rounding rounds 700 ms up to a full second while the
        // whole session rounds down to one.
        timeline.close_open_episode(700);
        let summary = timeline.summary(700, 0);
        assert_eq!(summary.total_seconds, 1);
        assert_eq!(summary.distracted_seconds, 1);
        assert_eq!(summary.focused_seconds, 0);
    }

    #[test]
    fn close_without_open_episode_is_a_no_op() {
        let mut timeline = SessionTimeline::new();
        assert!(timeline.close_open_episode(5_000).is_none());
        assert_eq!(timeline.distracted_seconds(), 0);
    }
}
