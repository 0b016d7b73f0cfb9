//! Builders for test timelines

use loopkey_core::{ButtonAction, KeyId, MouseButton};
use loopkey_recorder::{Event, Timeline};

/// Appends events at increasing offsets
#[derive(Default)]
pub struct TimelineBuilder {
    events: Vec<Event>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: &str, at: f64) -> Self {
        self.events.push(Event::Key {
            key: KeyId::new(key),
            time_offset: at,
        });
        self
    }

    pub fn move_to(mut self, x: i32, y: i32, at: f64) -> Self {
        self.events.push(Event::PointerMove {
            x,
            y,
            time_offset: at,
        });
        self
    }

    pub fn click(mut self, button: MouseButton, x: i32, y: i32, at: f64) -> Self {
        self.events.push(Event::PointerButton {
            button,
            action: ButtonAction::Click,
            x,
            y,
            time_offset: at,
        });
        self
    }

    pub fn scroll(mut self, delta: i32, at: f64) -> Self {
        self.events.push(Event::Scroll {
            delta,
            time_offset: at,
        });
        self
    }

    pub fn build(self) -> Timeline {
        Timeline::from_events(self.events)
            .expect("builder offsets must be ordered and non-negative")
    }
}

