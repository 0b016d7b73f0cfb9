//! Raw input vocabulary and the capabilities the recorder consumes
//!
//! The OS-facing side is split in two traits: [`InputSource`] delivers raw
//! notifications into a channel, [`InputSink`] synthesizes input. Backends
//! live in [`crate::platform`] and [`crate::mock`].

use crate::error::Result;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Lowercase key name, e.g. `"a"`, `"esc"`, `"f7"`, `"space"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    pub fn new(name: impl AsRef<str>) -> Self {
        let raw = name.as_ref();
        if raw == " " {
            return Self("space".to_string());
        }
        let name = raw.trim().to_lowercase();
        let name = match name.as_str() {
            "escape" => "esc".to_string(),
            "return" => "enter".to_string(),
            "page_up" => "page up".to_string(),
            "page_down" => "page down".to_string(),
            _ => name,
        };
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<KeyId> for String {
    fn from(key: KeyId) -> Self {
        key.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X,
    X2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonAction {
    Click,
    DoubleClick,
    Down,
    Up,
}

impl ButtonAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonAction::Click => "click",
            ButtonAction::DoubleClick => "double click",
            ButtonAction::Down => "down",
            ButtonAction::Up => "up",
        }
    }
}

/// A raw notification as delivered by an input hook
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    KeyDown(KeyId),
    KeyUp(KeyId),
    Button {
        button: MouseButton,
        action: ButtonAction,
        x: i32,
        y: i32,
    },
    Move {
        x: i32,
        y: i32,
    },
    Wheel {
        delta: i32,
    },
}

impl RawInput {
    pub fn is_keyboard(&self) -> bool {
        matches!(self, RawInput::KeyDown(_) | RawInput::KeyUp(_))
    }
}

/// Raw notification stamped with the monotonic instant the hook saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub at: Instant,
    pub input: RawInput,
}

impl RawEvent {
    pub fn now(input: RawInput) -> Self {
        Self {
            at: Instant::now(),
            input,
        }
    }
}

/// Which notification families a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub keyboard: bool,
    pub pointer: bool,
}

impl Interest {
    pub fn keyboard_only() -> Self {
        Self {
            keyboard: true,
            pointer: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.keyboard && !self.pointer
    }

    pub fn wants(&self, input: &RawInput) -> bool {
        if input.is_keyboard() {
            self.keyboard
        } else {
            self.pointer
        }
    }
}

/// Global raw input hooks. Subscribing twice without unsubscribing is undefined;
/// use [`InputSubscription`] rather than calling these directly.
pub trait InputSource: Send + Sync {
    fn subscribe(&self, interest: Interest, tx: Sender<RawEvent>) -> Result<()>;

    fn unsubscribe_all(&self);
}

/// Input synthesis
pub trait InputSink: Send + Sync {
    fn key_down(&self, key: &KeyId) -> Result<()>;

    fn key_up(&self, key: &KeyId) -> Result<()>;

    fn set_pointer_position(&self, x: i32, y: i32) -> Result<()>;

    fn click(&self, button: MouseButton) -> Result<()>;

    fn double_click(&self, button: MouseButton) -> Result<()>;

    fn scroll(&self, delta: i32) -> Result<()>;
}

/// Owned hook registration. Unsubscribes exactly once: on [`release`](Self::release)
/// or on drop, whichever comes first (drop also runs while unwinding).
pub struct InputSubscription {
    source: Arc<dyn InputSource>,
    released: bool,
}

impl InputSubscription {
    pub fn acquire(
        source: Arc<dyn InputSource>,
        interest: Interest,
        tx: Sender<RawEvent>,
    ) -> Result<Self> {
        if let Err(e) = source.subscribe(interest, tx) {
            // a half-registered hook set must not outlive the failed attempt
            source.unsubscribe_all();
            tracing::warn!("input subscription failed: {}", e);
            return Err(e);
        }
        tracing::debug!(?interest, "input hooks installed");
        Ok(Self {
            source,
            released: false,
        })
    }

    pub fn release(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if !self.released {
            self.released = true;
            self.source.unsubscribe_all();
            tracing::debug!("input hooks removed");
        }
    }
}

impl Drop for InputSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedSource;

    #[test]
    fn test_key_id_normalizes() {
        assert_eq!(KeyId::new(" Escape "), KeyId::new("esc"));
        assert_eq!(KeyId::new("F7").as_str(), "f7");
        assert_eq!(KeyId::new("Return").as_str(), "enter");
    }

    #[test]
    fn test_key_id_normalizes_when_deserialized() {
        let key: KeyId = serde_json::from_str("\"Escape\"").unwrap();
        assert_eq!(key.as_str(), "esc");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"esc\"");
    }

    #[test]
    fn test_interest_filters_families() {
        let kb = Interest::keyboard_only();
        assert!(kb.wants(&RawInput::KeyDown("a".into())));
        assert!(!kb.wants(&RawInput::Move { x: 1, y: 1 }));
        assert!(Interest::default().is_empty());
    }

    #[test]
    fn test_subscription_releases_once_on_drop() {
        let source = Arc::new(ScriptedSource::new());
        let (tx, _rx) = crossbeam_channel::bounded(4);
        let sub =
            InputSubscription::acquire(source.clone(), Interest::keyboard_only(), tx).unwrap();
        assert_eq!(source.active_subscriptions(), 1);
        drop(sub);
        assert_eq!(source.active_subscriptions(), 0);
        assert_eq!(source.unsubscribe_calls(), 1);
    }

    #[test]
    fn test_subscription_explicit_release_does_not_double_unsubscribe() {
        let source = Arc::new(ScriptedSource::new());
        let (tx, _rx) = crossbeam_channel::bounded(4);
        let sub =
            InputSubscription::acquire(source.clone(), Interest::keyboard_only(), tx).unwrap();
        sub.release();
        assert_eq!(source.unsubscribe_calls(), 1);
    }

    #[test]
    fn test_failed_subscribe_cleans_up() {
        let source = Arc::new(ScriptedSource::failing("hook refused"));
        let (tx, _rx) = crossbeam_channel::bounded(4);
        let result = InputSubscription::acquire(source.clone(), Interest::keyboard_only(), tx);
        assert!(result.is_err());
        assert_eq!(source.active_subscriptions(), 0);
        assert_eq!(source.unsubscribe_calls(), 1);
    }
}
