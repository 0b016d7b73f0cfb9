//! Normalized event types
//!
//! In memory an [`Event`] is a closed enum. On disk each event is a flat JSON
//! record with a `type` discriminant (`keyboard` / `mouse`), a nested `event`
//! action name and a `time` in seconds since recording start:
//!
//! ```json
//! {"type": "keyboard", "event": "press", "key": "a", "time": 0.42}
//! {"type": "mouse", "event": "click", "button": "left", "position": [10, 20], "time": 1.5}
//! {"type": "mouse", "event": "scroll", "delta": -1, "time": 2.0}
//! ```

use loopkey_core::{ButtonAction, KeyId, MouseButton};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Record", into = "Record")]
pub enum Event {
    /// Press-and-release of a key, recorded at key down
    Key { key: KeyId, time_offset: f64 },

    PointerMove { x: i32, y: i32, time_offset: f64 },

    PointerButton {
        button: MouseButton,
        action: ButtonAction,
        x: i32,
        y: i32,
        time_offset: f64,
    },

    Scroll { delta: i32, time_offset: f64 },
}

impl Event {
    /// Seconds since recording start
    pub fn time_offset(&self) -> f64 {
        match self {
            Event::Key { time_offset, .. }
            | Event::PointerMove { time_offset, .. }
            | Event::PointerButton { time_offset, .. }
            | Event::Scroll { time_offset, .. } => *time_offset,
        }
    }

    pub fn is_keyboard(&self) -> bool {
        matches!(self, Event::Key { .. })
    }
}

// Wire format. Kept private so the rest of the crate only ever sees `Event`.

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Record {
    Keyboard(KeyRecord),
    Mouse(MouseRecord),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "event")]
enum KeyRecord {
    #[serde(rename = "press")]
    Press { key: KeyId, time: f64 },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "event")]
enum MouseRecord {
    #[serde(rename = "move")]
    Move { position: (i32, i32), time: f64 },
    #[serde(rename = "click")]
    Click {
        button: MouseButton,
        position: (i32, i32),
        time: f64,
    },
    #[serde(rename = "double click")]
    DoubleClick {
        button: MouseButton,
        position: (i32, i32),
        time: f64,
    },
    #[serde(rename = "down")]
    Down {
        button: MouseButton,
        position: (i32, i32),
        time: f64,
    },
    #[serde(rename = "up")]
    Up {
        button: MouseButton,
        position: (i32, i32),
        time: f64,
    },
    #[serde(rename = "scroll")]
    Scroll {
        #[serde(deserialize_with = "whole_delta")]
        delta: i32,
        time: f64,
    },
}

/// Wheel deltas written as floats (`-1.0`) load as long as they are whole
fn whole_delta<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let delta = f64::deserialize(deserializer)?;
    if delta.fract() != 0.0 || delta < f64::from(i32::MIN) || delta > f64::from(i32::MAX) {
        return Err(D::Error::custom(format!(
            "scroll delta must be a whole number, got {}",
            delta
        )));
    }
    Ok(delta as i32)
}

pub(crate) fn check_time(time: f64) -> Result<f64, String> {
    if !time.is_finite() {
        return Err(format!("time must be finite, got {}", time));
    }
    if time < 0.0 {
        return Err(format!("time must be non-negative, got {}", time));
    }
    Ok(time)
}

impl TryFrom<Record> for Event {
    type Error = String;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        let button_event = |button, action, (x, y): (i32, i32), time| -> Result<Event, String> {
            Ok(Event::PointerButton {
                button,
                action,
                x,
                y,
                time_offset: check_time(time)?,
            })
        };

        match record {
            Record::Keyboard(KeyRecord::Press { key, time }) => Ok(Event::Key {
                key,
                time_offset: check_time(time)?,
            }),
            Record::Mouse(MouseRecord::Move {
                position: (x, y),
                time,
            }) => Ok(Event::PointerMove {
                x,
                y,
                time_offset: check_time(time)?,
            }),
            Record::Mouse(MouseRecord::Click {
                button,
                position,
                time,
            }) => button_event(button, ButtonAction::Click, position, time),
            Record::Mouse(MouseRecord::DoubleClick {
                button,
                position,
                time,
            }) => button_event(button, ButtonAction::DoubleClick, position, time),
            Record::Mouse(MouseRecord::Down {
                button,
                position,
                time,
            }) => button_event(button, ButtonAction::Down, position, time),
            Record::Mouse(MouseRecord::Up {
                button,
                position,
                time,
            }) => button_event(button, ButtonAction::Up, position, time),
            Record::Mouse(MouseRecord::Scroll { delta, time }) => Ok(Event::Scroll {
                delta,
                time_offset: check_time(time)?,
            }),
        }
    }
}

impl From<Event> for Record {
    fn from(event: Event) -> Self {
        match event {
            Event::Key { key, time_offset } => Record::Keyboard(KeyRecord::Press {
                key,
                time: time_offset,
            }),
            Event::PointerMove { x, y, time_offset } => Record::Mouse(MouseRecord::Move {
                position: (x, y),
                time: time_offset,
            }),
            Event::PointerButton {
                button,
                action,
                x,
                y,
                time_offset,
            } => {
                let position = (x, y);
                let time = time_offset;
                Record::Mouse(match action {
                    ButtonAction::Click => MouseRecord::Click {
                        button,
                        position,
                        time,
                    },
                    ButtonAction::DoubleClick => MouseRecord::DoubleClick {
                        button,
                        position,
                        time,
                    },
                    ButtonAction::Down => MouseRecord::Down {
                        button,
                        position,
                        time,
                    },
                    ButtonAction::Up => MouseRecord::Up {
                        button,
                        position,
                        time,
                    },
                })
            }
            Event::Scroll { delta, time_offset } => Record::Mouse(MouseRecord::Scroll {
                delta,
                time: time_offset,
            }),
        }
    }
}
