//! In-memory input backend for tests and dry runs
//!
//! [`ScriptedSource`] lets a caller push raw notifications as if an OS hook
//! had delivered them; [`RecordingSink`] logs every synthesized action with
//! the instant it happened.

use crate::error::{Error, Result};
use crate::input::{InputSink, InputSource, Interest, KeyId, MouseButton, RawEvent, RawInput};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Default)]
pub struct ScriptedSource {
    hook: Mutex<Option<(Interest, Sender<RawEvent>)>>,
    fail_with: Option<String>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `subscribe` always fails, like a hook denied by the OS
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Deliver a notification now. Returns false if nobody is listening for it.
    pub fn emit(&self, input: RawInput) -> bool {
        self.emit_at(Instant::now(), input)
    }

    pub fn emit_at(&self, at: Instant, input: RawInput) -> bool {
        let tx = {
            let hook = self.hook.lock();
            match hook.as_ref() {
                Some((interest, tx)) if interest.wants(&input) => tx.clone(),
                _ => return false,
            }
        };
        tx.send(RawEvent { at, input }).is_ok()
    }

    pub fn is_subscribed(&self) -> bool {
        self.hook.lock().is_some()
    }

    pub fn active_subscriptions(&self) -> usize {
        usize::from(self.is_subscribed())
    }

    pub fn subscribed_interest(&self) -> Option<Interest> {
        self.hook.lock().as_ref().map(|(interest, _)| *interest)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

impl InputSource for ScriptedSource {
    fn subscribe(&self, interest: Interest, tx: Sender<RawEvent>) -> Result<()> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail_with {
            return Err(Error::Subscription(reason.clone()));
        }
        let mut hook = self.hook.lock();
        if hook.is_some() {
            return Err(Error::Subscription("hooks already installed".to_string()));
        }
        *hook = Some((interest, tx));
        Ok(())
    }

    fn unsubscribe_all(&self) {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.hook.lock().take();
    }
}

/// One synthesized action
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesized {
    KeyDown(KeyId),
    KeyUp(KeyId),
    MoveTo { x: i32, y: i32 },
    Click(MouseButton),
    DoubleClick(MouseButton),
    Scroll(i32),
}

#[derive(Default)]
pub struct RecordingSink {
    log: Mutex<Vec<(Instant, Synthesized)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Synthesized> {
        self.log.lock().iter().map(|(_, a)| a.clone()).collect()
    }

    pub fn timestamps(&self) -> Vec<Instant> {
        self.log.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn push(&self, action: Synthesized) -> Result<()> {
        self.log.lock().push((Instant::now(), action));
        Ok(())
    }
}

impl InputSink for RecordingSink {
    fn key_down(&self, key: &KeyId) -> Result<()> {
        self.push(Synthesized::KeyDown(key.clone()))
    }

    fn key_up(&self, key: &KeyId) -> Result<()> {
        self.push(Synthesized::KeyUp(key.clone()))
    }

    fn set_pointer_position(&self, x: i32, y: i32) -> Result<()> {
        self.push(Synthesized::MoveTo { x, y })
    }

    fn click(&self, button: MouseButton) -> Result<()> {
        self.push(Synthesized::Click(button))
    }

    fn double_click(&self, button: MouseButton) -> Result<()> {
        self.push(Synthesized::DoubleClick(button))
    }

    fn scroll(&self, delta: i32) -> Result<()> {
        self.push(Synthesized::Scroll(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscriber_is_dropped() {
        let source = ScriptedSource::new();
        assert!(!source.emit(RawInput::KeyDown("a".into())));
    }

    #[test]
    fn test_emit_respects_interest() {
        let source = ScriptedSource::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        source.subscribe(Interest::keyboard_only(), tx).unwrap();
        assert!(source.emit(RawInput::KeyDown("a".into())));
        assert!(!source.emit(RawInput::Wheel { delta: 1 }));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_double_subscribe_is_rejected() {
        let source = ScriptedSource::new();
        let (tx, _rx) = crossbeam_channel::unbounded();
        source.subscribe(Interest::keyboard_only(), tx.clone()).unwrap();
        assert!(source.subscribe(Interest::keyboard_only(), tx).is_err());
    }

    #[test]
    fn test_sink_logs_in_order() {
        let sink = RecordingSink::new();
        sink.set_pointer_position(3, 4).unwrap();
        sink.click(MouseButton::Left).unwrap();
        assert_eq!(
            sink.actions(),
            vec![
                Synthesized::MoveTo { x: 3, y: 4 },
                Synthesized::Click(MouseButton::Left)
            ]
        );
    }
}
