//! Ordered, append-only event sequence

use crate::config::secs_saturating;
use crate::events::{check_time, Event};
use loopkey_core::ButtonAction;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A recorded macro. Serializes as a bare JSON array of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    events: Vec<Event>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from events already known to be ordered (tests, imports).
    /// Returns `None` if offsets decrease anywhere or any offset is negative
    /// or not finite.
    pub fn from_events(events: Vec<Event>) -> Option<Self> {
        let timeline = Self { events };
        timeline.is_valid().then_some(timeline)
    }

    /// Append, clamping the offset so the sequence never goes backwards
    pub(crate) fn push(&mut self, mut event: Event) {
        let last = self.last_offset();
        if event.time_offset() < last {
            set_offset(&mut event, last);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn last_offset(&self) -> f64 {
        self.events.last().map(Event::time_offset).unwrap_or(0.0)
    }

    /// Offset of the last event, i.e. the length of one pass at 1x speed
    pub fn duration(&self) -> Duration {
        secs_saturating(self.last_offset())
    }

    pub fn is_monotonic(&self) -> bool {
        self.events
            .windows(2)
            .all(|w| w[0].time_offset() <= w[1].time_offset())
    }

    /// Every offset finite and non-negative, and never decreasing
    pub fn is_valid(&self) -> bool {
        self.events.iter().all(|e| check_time(e.time_offset()).is_ok()) && self.is_monotonic()
    }

    pub fn summary(&self) -> TimelineSummary {
        let mut s = TimelineSummary {
            events: self.events.len(),
            duration_secs: self.last_offset(),
            ..Default::default()
        };
        for e in &self.events {
            match e {
                Event::Key { .. } => s.keys += 1,
                Event::PointerMove { .. } => s.moves += 1,
                Event::PointerButton { action, .. } => match action {
                    ButtonAction::Click | ButtonAction::DoubleClick => s.clicks += 1,
                    ButtonAction::Down | ButtonAction::Up => s.button_transitions += 1,
                },
                Event::Scroll { .. } => s.scrolls += 1,
            }
        }
        s
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

fn set_offset(event: &mut Event, offset: f64) {
    match event {
        Event::Key { time_offset, .. }
        | Event::PointerMove { time_offset, .. }
        | Event::PointerButton { time_offset, .. }
        | Event::Scroll { time_offset, .. } => *time_offset = offset,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineSummary {
    pub events: usize,
    pub duration_secs: f64,
    pub keys: usize,
    pub moves: usize,
    pub clicks: usize,
    pub button_transitions: usize,
    pub scrolls: usize,
}
