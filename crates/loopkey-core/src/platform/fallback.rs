//! Platforms without a native hook implementation yet
//!
//! Linux needs an evdev/XInput2 reader and a uinput writer; Windows needs
//! `SetWindowsHookEx` + `SendInput`. Until then every operation reports
//! [`Error::Unsupported`] so the recorder stays Idle instead of hanging.

use crate::error::{Error, Result};
use crate::input::{InputSink, InputSource, Interest, KeyId, MouseButton, RawEvent};
use crossbeam_channel::Sender;
use std::sync::Arc;

pub struct NativeInput;

pub fn backend() -> Arc<NativeInput> {
    Arc::new(NativeInput)
}

/// Permission checks are a macOS concept
pub fn has_input_permissions() -> bool {
    true
}

pub fn request_input_permissions() -> bool {
    true
}

fn unsupported<T>(what: &str) -> Result<T> {
    Err(Error::Unsupported(format!(
        "{} is only implemented on macOS (target: {})",
        what,
        std::env::consts::OS
    )))
}

impl InputSource for NativeInput {
    fn subscribe(&self, _interest: Interest, _tx: Sender<RawEvent>) -> Result<()> {
        unsupported("input capture")
    }

    fn unsubscribe_all(&self) {}
}

impl InputSink for NativeInput {
    fn key_down(&self, _key: &KeyId) -> Result<()> {
        unsupported("key synthesis")
    }

    fn key_up(&self, _key: &KeyId) -> Result<()> {
        unsupported("key synthesis")
    }

    fn set_pointer_position(&self, _x: i32, _y: i32) -> Result<()> {
        unsupported("pointer synthesis")
    }

    fn click(&self, _button: MouseButton) -> Result<()> {
        unsupported("pointer synthesis")
    }

    fn double_click(&self, _button: MouseButton) -> Result<()> {
        unsupported("pointer synthesis")
    }

    fn scroll(&self, _delta: i32) -> Result<()> {
        unsupported("scroll synthesis")
    }
}
