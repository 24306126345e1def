use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp;
use tokio::time::Instant;

use crate::smoother::{FocusSmoother, FocusState};
use crate::timeline::SessionTimeline;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Running,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

/// All mutable state for one session: countdown bookkeeping plus the focus
/// window, timeline and accumulators. Created on start, frozen into a
/// summary and discarded on end; nothing session-scoped lives outside it.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub target_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    /// Monotonic anchor for elapsed-time arithmetic; wall clocks only stamp
    /// reported values.
    pub started_anchor: Option<Instant>,
    pub focus_level: f64,
    pub focus_state: FocusState,
    pub smoother: FocusSmoother,
    pub timeline: SessionTimeline,
}

impl SessionState {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            status: SessionStatus::Idle,
            session_id: None,
            target_ms: 0,
            started_at: None,
            started_anchor: None,
            focus_level: 1.0,
            focus_state: FocusState::Focused,
            smoother: FocusSmoother::new(window_capacity),
            timeline: SessionTimeline::new(),
        }
    }

    pub fn begin_session(
        &mut self,
        session_id: String,
        target_ms: u64,
        started_at: DateTime<Utc>,
        anchor: Instant,
    ) {
        self.status = SessionStatus::Running;
        self.session_id = Some(session_id);
        self.target_ms = target_ms;
        self.started_at = Some(started_at);
        self.started_anchor = Some(anchor);
        self.focus_level = 1.0;
        self.focus_state = FocusState::Focused;
        self.smoother.reset();
        self.timeline = SessionTimeline::new();
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        match self.started_anchor {
            Some(anchor) => now.saturating_duration_since(anchor).as_millis() as u64,
            None => 0,
        }
    }

    pub fn remaining_ms(&self, now: Instant) -> i64 {
        if self.status != SessionStatus::Running {
            return 0;
        }
        let remaining = self.target_ms as i64 - self.elapsed_ms(now) as i64;
        cmp::max(remaining, 0)
    }

    /// Back to idle; the focus window empties and the timeline is dropped.
    /// The smoother keeps its configured capacity.
    pub fn reset(&mut self) {
        self.status = SessionStatus::Idle;
        self.session_id = None;
        self.target_ms = 0;
        self.started_at = None;
        self.started_anchor = None;
        self.focus_level = 1.0;
        self.focus_state = FocusState::Focused;
        self.smoother.reset();
        self.timeline = SessionTimeline::new();
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub focus_level: f64,
    pub focus_state: FocusState,
    pub elapsed_seconds: u64,
    pub remaining_ms: i64,
    pub tracking_enabled: bool,
}
