//! loopkey-recorder - record keyboard/mouse macros and replay them
//!
//! Capture normalizes raw input into a [`Timeline`]; playback reproduces the
//! recorded inter-event delays, scaled by a speed multiplier, through any
//! [`InputSink`](loopkey_core::InputSink).
//!
//! ```no_run
//! use loopkey_recorder::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> loopkey_core::Result<()> {
//! let source = Arc::new(ScriptedSource::new());
//! let session = MacroRecorder::new(source).start()?;
//! // ... input arrives ...
//! let timeline = session.stop()?.timeline;
//!
//! let store = TimelineStore::new()?;
//! store.save(&timeline, &TimelineStore::default_name())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod events;
pub mod hotkeys;
pub mod recorder;
pub mod replay;
pub mod storage;
pub mod timeline;

pub use config::{HotkeyConfig, PlaybackConfig, RecordingFilterConfig, Settings};
pub use controller::{Controller, EngineState, Notice};
pub use events::Event;
pub use hotkeys::{HotkeyAction, HotkeyListener, HotkeyMap};
pub use recorder::{CaptureEngine, CaptureOutcome, MacroRecorder, RecordingHandle, StopReason};
pub use replay::{
    sleep_cancellable, spawn_playback, CancelToken, PlaybackHandle, PlaybackReport,
    PlaybackStatus, Player,
};
pub use storage::{PersistedHandle, TimelineStore};
pub use timeline::{Timeline, TimelineSummary};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::controller::{Controller, EngineState, Notice};
    pub use crate::events::Event;
    pub use crate::hotkeys::{HotkeyAction, HotkeyListener, HotkeyMap};
    pub use crate::recorder::{
        CaptureEngine, CaptureOutcome, MacroRecorder, RecordingHandle, StopReason,
    };
    pub use crate::replay::{
        spawn_playback, CancelToken, PlaybackHandle, PlaybackReport, PlaybackStatus, Player,
    };
    pub use crate::storage::{PersistedHandle, TimelineStore};
    pub use crate::timeline::{Timeline, TimelineSummary};

    pub use loopkey_core::prelude::*;
}
