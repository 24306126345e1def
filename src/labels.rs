use std::collections::VecDeque;

/// How many recent state labels the resolver remembers.
pub const LABEL_WINDOW_CAPACITY: usize = 60;

/// Labels that describe a focused user and never name a distraction.
const FOCUSED_LABELS: [&str; 2] = ["focused", "at screen"];

/// Majority vote over recently observed vision state labels.
///
/// The vision process emits free-text labels ("Looking Left", "PHONE
/// DETECTED", ...); the vocabulary is open, so matching stays lowercase and
/// substring-based. The winning non-focused label names distraction episodes
/// on the timeline and drives alert categorization.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    window: VecDeque<String>,
    capacity: usize,
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new(LABEL_WINDOW_CAPACITY)
    }
}

impl LabelResolver {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn observe(&mut self, label: &str) {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return;
        }
        self.window.push_back(label);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    /// Most frequent non-focused label in the window, ties broken by
    /// first-seen order. Talking labels are invisible while talking
    /// inclusion is off. `None` when nothing distracting was observed.
    pub fn resolve(&self, include_talking: bool) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;
        for label in &self.window {
            if FOCUSED_LABELS.contains(&label.as_str()) {
                continue;
            }
            if !include_talking && label.contains("talking") {
                continue;
            }
            let count = self.window.iter().filter(|other| *other == label).count();
            match best {
                // First-seen wins ties: scanning in insertion order, a later
                // label only replaces on a strictly higher count.
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((label.as_str(), count)),
            }
        }
        best.map(|(label, _)| label.to_string())
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
