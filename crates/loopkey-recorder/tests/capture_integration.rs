//! Capture sessions driven through the scripted input source

mod common;

use common::wait_until;
use loopkey_core::mock::ScriptedSource;
use loopkey_core::{ButtonAction, ErrorCode, Interest, KeyId, MouseButton, RawInput};
use loopkey_recorder::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn source() -> Arc<ScriptedSource> {
    Arc::new(ScriptedSource::new())
}

fn key(k: &str) -> RawInput {
    RawInput::KeyDown(KeyId::new(k))
}

#[test]
fn test_stop_key_ends_session_and_is_not_recorded() {
    let source = source();
    let session = MacroRecorder::new(source.clone()).start().unwrap();

    source.emit(key("h"));
    source.emit(RawInput::KeyUp(KeyId::new("h")));
    source.emit(key("i"));
    source.emit(key("esc"));

    assert!(session.wait_timeout(Duration::from_secs(2)));
    assert!(!session.is_running());
    // hooks are gone, later input goes nowhere
    assert!(!source.emit(key("j")));

    let outcome = session.wait().unwrap();
    assert_eq!(outcome.reason, StopReason::StopKey);
    let keys: Vec<_> = outcome
        .timeline
        .iter()
        .map(|e| match e {
            Event::Key { key, .. } => key.as_str().to_string(),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(keys, vec!["h", "i"]);
}

#[test]
fn test_custom_stop_key() {
    let source = source();
    let session = MacroRecorder::new(source.clone())
        .stop_key(Some(KeyId::new("f9")))
        .start()
        .unwrap();

    source.emit(key("esc"));
    source.emit(key("f9"));

    let outcome = session.wait().unwrap();
    assert_eq!(outcome.timeline.len(), 1);
    assert_eq!(outcome.reason, StopReason::StopKey);
}

#[test]
fn test_offsets_are_monotonic() {
    let source = source();
    let session = MacroRecorder::new(source.clone()).start().unwrap();
    let t0 = Instant::now();

    source.emit_at(t0 + Duration::from_millis(200), key("a"));
    source.emit_at(t0 + Duration::from_millis(100), key("b"));
    source.emit_at(t0 + Duration::from_millis(300), key("c"));

    let timeline = session.stop().unwrap().timeline;
    assert_eq!(timeline.len(), 3);
    assert!(timeline.is_monotonic());
    let offsets: Vec<f64> = timeline.iter().map(Event::time_offset).collect();
    assert_eq!(offsets[0], offsets[1]);
    assert!(offsets[2] > offsets[1]);
}

#[test]
fn test_stop_drains_queued_input() {
    let source = source();
    let session = MacroRecorder::new(source.clone()).start().unwrap();
    for i in 0..100 {
        source.emit(RawInput::Move { x: i * 10, y: 0 });
    }
    let outcome = session.stop().unwrap();
    assert_eq!(outcome.reason, StopReason::Requested);
    assert_eq!(outcome.timeline.len(), 100);
}

#[test]
fn test_all_pointer_shapes() {
    let source = source();
    let session = MacroRecorder::new(source.clone()).start().unwrap();
    source.emit(RawInput::Move { x: 1, y: 2 });
    source.emit(RawInput::Button {
        button: MouseButton::Right,
        action: ButtonAction::DoubleClick,
        x: 1,
        y: 2,
    });
    source.emit(RawInput::Wheel { delta: -4 });

    wait_until(|| session.event_count() == 3);
    let summary = session.stop().unwrap().timeline.summary();
    assert_eq!((summary.moves, summary.clicks, summary.scrolls), (1, 1, 1));
}

#[test]
fn test_keyboard_hooked_for_stop_key_even_when_not_captured() {
    let source = source();
    let filter = RecordingFilterConfig {
        capture_keyboard: false,
        ..Default::default()
    };
    let session = MacroRecorder::new(source.clone())
        .filter(filter.clone())
        .start()
        .unwrap();
    assert_eq!(
        source.subscribed_interest(),
        Some(Interest {
            keyboard: true,
            pointer: true
        })
    );
    source.emit(key("a"));
    source.emit(RawInput::Wheel { delta: 1 });
    source.emit(key("esc"));
    let outcome = session.wait().unwrap();
    assert_eq!(outcome.timeline.len(), 1);
    assert!(!outcome.timeline.events()[0].is_keyboard());

    // without a stop key the keyboard is left alone
    let session = MacroRecorder::new(source.clone())
        .filter(filter)
        .stop_key(None)
        .start()
        .unwrap();
    assert_eq!(
        source.subscribed_interest(),
        Some(Interest {
            keyboard: false,
            pointer: true
        })
    );
    session.stop().unwrap();
}

#[test]
fn test_no_source_enabled_is_config_error() {
    let source = source();
    let filter = RecordingFilterConfig {
        capture_keyboard: false,
        capture_pointer: false,
        ..Default::default()
    };
    let err = MacroRecorder::new(source.clone())
        .filter(filter)
        .start()
        .err()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::Configuration);
    assert_eq!(source.subscribe_calls(), 0);
}

mod subscription_hygiene {
    use super::*;

    #[test]
    fn test_stop() {
        let source = source();
        let session = MacroRecorder::new(source.clone()).start().unwrap();
        assert!(source.is_subscribed());
        session.stop().unwrap();
        assert_eq!(source.subscribe_calls(), 1);
        assert_eq!(source.unsubscribe_calls(), 1);
        assert!(!source.is_subscribed());
    }

    #[test]
    fn test_stop_key() {
        let source = source();
        let session = MacroRecorder::new(source.clone()).start().unwrap();
        source.emit(key("esc"));
        assert!(session.wait_timeout(Duration::from_secs(2)));
        assert_eq!(source.unsubscribe_calls(), 1);
        session.stop().unwrap();
        assert_eq!(source.unsubscribe_calls(), 1);
    }

    #[test]
    fn test_dropped_handle() {
        let source = source();
        let session = MacroRecorder::new(source.clone()).start().unwrap();
        drop(session);
        assert_eq!(source.unsubscribe_calls(), 1);
        assert!(!source.is_subscribed());
    }

    #[test]
    fn test_failed_subscribe() {
        let source = Arc::new(ScriptedSource::failing("permission denied"));
        let err = MacroRecorder::new(source.clone()).start().err().unwrap();
        assert_eq!(err.code(), ErrorCode::Subscription);
        assert_eq!(source.unsubscribe_calls(), 1);
    }

    #[test]
    fn test_engine_stop_while_idle() {
        let source = source();
        let mut engine = CaptureEngine::new(MacroRecorder::new(source.clone()));
        assert!(engine.stop().unwrap().is_empty());
        assert_eq!(source.subscribe_calls(), 0);

        engine.start().unwrap();
        assert_eq!(engine.start().unwrap_err().code(), ErrorCode::Busy);
        assert_eq!(source.subscribe_calls(), 1);
        engine.stop().unwrap();
        assert_eq!(source.unsubscribe_calls(), 1);
    }
}
