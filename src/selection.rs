//! Which day and which photo are currently selected.
//!
//! Both the day list and the map write to the same `SelectionState`. Whenever
//! both indices are set, the active point lies inside the active day:
//! selecting a day moves the point to that day's first photo, and selecting a
//! point moves the day to the album containing it.

use serde::Serialize;

use crate::timeline::Timeline;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub active_day: Option<usize>,
    pub active_point: Option<usize>,
}

impl SelectionState {
    /// Selection after loading a timeline: first photo of the first day, or nothing
    pub fn initial(timeline: &Timeline) -> Self {
        if timeline.is_empty() {
            Self::default()
        } else {
            Self {
                active_day: Some(0),
                active_point: Some(0),
            }
        }
    }

    /// Selects album `index`. Out-of-range indices are ignored. Returns whether anything changed.
    pub fn select_day(&mut self, timeline: &Timeline, index: usize) -> bool {
        if index >= timeline.albums().len() {
            return false;
        }

        let before = *self;
        self.active_day = Some(index);
        self.active_point = timeline.first_point_of(index);
        *self != before
    }

    /// Selects point `index` and the album containing it. Returns whether anything changed.
    pub fn select_point(&mut self, timeline: &Timeline, index: usize) -> bool {
        let Some(day) = timeline.day_of(index) else {
            return false;
        };

        let before = *self;
        self.active_point = Some(index);
        self.active_day = Some(day);
        *self != before
    }

    /// Moves the active point by `delta`, clamped to the timeline
    pub fn step(&mut self, timeline: &Timeline, delta: isize) -> bool {
        if timeline.is_empty() {
            return false;
        }

        let last = timeline.len() - 1;
        let target = match self.active_point {
            Some(current) => current.saturating_add_signed(delta).min(last),
            None if delta < 0 => last,
            None => 0,
        };
        self.select_point(timeline, target)
    }

    /// Scrubber caption, e.g. "Point 3 of 12"
    pub fn scrub_label(&self, timeline: &Timeline) -> Option<String> {
        if timeline.is_empty() {
            return None;
        }
        let position = self.active_point.unwrap_or(0) + 1;
        Some(format!("Point {} of {}", position, timeline.len()))
    }
}
