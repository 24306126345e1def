use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Focus level below which the user counts as distracted. Every downstream
/// consumer (timeline, alerts) goes through [`FocusSmoother::push`] instead of
/// re-deriving this.
pub const FOCUS_THRESHOLD: f64 = 0.7;

/// Default verdict window capacity. The window is a tunable, not a hardwired
/// constant; pass a different capacity to [`FocusSmoother::new`].
pub const DEFAULT_WINDOW_CAPACITY: usize = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FocusState {
    Focused,
    Distracted,
    Offline,
}

impl Default for FocusState {
    fn default() -> Self {
        FocusState::Focused
    }
}

/// Sliding window over recent classification verdicts.
///
/// Holds the last `capacity` verdicts as booleans and exposes their mean as
/// the current focus level. An empty window reads as fully focused so a
/// session never starts in a distracted state before any sample arrives.
#[derive(Debug, Clone)]
pub struct FocusSmoother {
    window: VecDeque<bool>,
    capacity: usize,
}

impl Default for FocusSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl FocusSmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Push one verdict and return the recomputed level and state.
    pub fn push(&mut self, focused: bool) -> (f64, FocusState) {
        self.window.push_back(focused);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        let level = self.level();
        (level, Self::state_for_level(level))
    }

    pub fn level(&self) -> f64 {
        if self.window.is_empty() {
            return 1.0;
        }
        let focused = self.window.iter().filter(|v| **v).count();
        focused as f64 / self.window.len() as f64
    }

    pub fn state(&self) -> FocusState {
        Self::state_for_level(self.level())
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    fn state_for_level(level: f64) -> FocusState {
        if level < FOCUS_THRESHOLD {
            FocusState::Distracted
        } else {
            FocusState::Focused
        }
    }
}
