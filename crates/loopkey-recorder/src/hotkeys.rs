//! Global control keys

use crate::config::HotkeyConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use loopkey_core::{
    Error, InputSource, InputSubscription, Interest, KeyId, RawEvent, RawInput, Result,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyAction {
    StartRecording,
    StopRecording,
    PlayMacro,
}

#[derive(Debug, Clone)]
pub struct HotkeyMap {
    bindings: Vec<(KeyId, HotkeyAction)>,
}

impl HotkeyMap {
    pub fn new(config: &HotkeyConfig) -> Self {
        Self {
            bindings: vec![
                (config.start_recording.clone(), HotkeyAction::StartRecording),
                (config.stop_recording.clone(), HotkeyAction::StopRecording),
                (config.play_macro.clone(), HotkeyAction::PlayMacro),
            ],
        }
    }

    pub fn action_for(&self, key: &KeyId) -> Option<HotkeyAction> {
        self.bindings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, action)| *action)
    }

    pub fn key_for(&self, action: HotkeyAction) -> Option<&KeyId> {
        self.bindings
            .iter()
            .find(|(_, a)| *a == action)
            .map(|(k, _)| k)
    }
}

impl Default for HotkeyMap {
    fn default() -> Self {
        Self::new(&HotkeyConfig::default())
    }
}

/// Keyboard-only subscription that reports bound keys.
///
/// Holds the global hooks for as long as it lives, so it must be dropped
/// before a capture session subscribes.
pub struct HotkeyListener {
    map: HotkeyMap,
    rx: Receiver<RawEvent>,
    _subscription: InputSubscription,
}

impl HotkeyListener {
    pub fn start(source: Arc<dyn InputSource>, map: HotkeyMap) -> Result<Self> {
        let (tx, rx) = bounded(256);
        let subscription = InputSubscription::acquire(source, Interest::keyboard_only(), tx)?;
        tracing::debug!(?map, "hotkeys armed");
        Ok(Self {
            map,
            rx,
            _subscription: subscription,
        })
    }

    pub fn map(&self) -> &HotkeyMap {
        &self.map
    }

    /// Next bound key press, waiting up to `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<HotkeyAction>> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(raw) => {
                    if let Some(action) = self.translate(&raw) {
                        return Ok(Some(action));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Subscription("input source closed".to_string()))
                }
            }
        }
    }

    /// Next already-queued bound key press, if any
    pub fn try_recv(&self) -> Result<Option<HotkeyAction>> {
        loop {
            match self.rx.try_recv() {
                Ok(raw) => {
                    if let Some(action) = self.translate(&raw) {
                        return Ok(Some(action));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    return Err(Error::Subscription("input source closed".to_string()))
                }
            }
        }
    }

    fn translate(&self, raw: &RawEvent) -> Option<HotkeyAction> {
        match &raw.input {
            RawInput::KeyDown(key) => self.map.action_for(key),
            _ => None,
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        tracing::debug!("hotkeys disarmed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopkey_core::mock::ScriptedSource;

    #[test]
    fn test_default_bindings() {
        let map = HotkeyMap::default();
        assert_eq!(map.action_for(&KeyId::new("F7")), Some(HotkeyAction::StartRecording));
        assert_eq!(map.action_for(&KeyId::new("Escape")), Some(HotkeyAction::StopRecording));
        assert_eq!(map.action_for(&KeyId::new("f8")), Some(HotkeyAction::PlayMacro));
        assert_eq!(map.action_for(&KeyId::new("a")), None);
        assert_eq!(map.key_for(HotkeyAction::PlayMacro), Some(&KeyId::new("f8")));
    }

    #[test]
    fn test_listener_forwards_bound_keys_only() {
        let source = Arc::new(ScriptedSource::new());
        let listener = HotkeyListener::start(source.clone(), HotkeyMap::default()).unwrap();
        assert_eq!(source.subscribed_interest(), Some(Interest::keyboard_only()));

        source.emit(RawInput::KeyDown(KeyId::new("a")));
        source.emit(RawInput::KeyUp(KeyId::new("f8")));
        source.emit(RawInput::KeyDown(KeyId::new("f8")));

        assert_eq!(listener.try_recv().unwrap(), Some(HotkeyAction::PlayMacro));
        assert_eq!(listener.recv_timeout(Duration::from_millis(20)).unwrap(), None);
    }

    #[test]
    fn test_drop_releases_hooks() {
        let source = Arc::new(ScriptedSource::new());
        let listener = HotkeyListener::start(source.clone(), HotkeyMap::default()).unwrap();
        assert!(source.is_subscribed());
        drop(listener);
        assert!(!source.is_subscribed());
        assert_eq!(source.unsubscribe_calls(), 1);
    }
}
