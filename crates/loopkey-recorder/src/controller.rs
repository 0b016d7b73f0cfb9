//! Single entry point for a front end: one capture and one playback at a time

use crate::config::Settings;
use crate::hotkeys::{HotkeyAction, HotkeyListener, HotkeyMap};
use crate::recorder::{CaptureEngine, MacroRecorder};
use crate::replay::{spawn_playback, CancelToken, PlaybackHandle, PlaybackReport, Player};
use crate::storage::{PersistedHandle, TimelineStore};
use crate::timeline::Timeline;
use loopkey_core::{Error, InputSink, InputSource, Result};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Recording,
    Playing,
}

/// Something the hotkey loop did
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    RecordingStarted,
    Recorded(Timeline),
    PlaybackStarted,
    PlaybackFinished(PlaybackReport),
    /// A bound key was pressed but means nothing in the current state
    Ignored(HotkeyAction),
}

pub struct Controller {
    source: Arc<dyn InputSource>,
    player: Player,
    settings: Settings,
    store: TimelineStore,
    capture: CaptureEngine,
    playback: Option<PlaybackHandle>,
    current: Option<Timeline>,
    hotkeys: Option<HotkeyListener>,
    hotkeys_wanted: bool,
}

impl Controller {
    pub fn new(
        source: Arc<dyn InputSource>,
        sink: Arc<dyn InputSink>,
        settings: Settings,
        store: TimelineStore,
    ) -> Result<Self> {
        settings.validate()?;
        let capture = CaptureEngine::new(recorder_for(&source, &settings));
        Ok(Self {
            source,
            player: Player::new(sink),
            settings,
            store,
            capture,
            playback: None,
            current: None,
            hotkeys: None,
            hotkeys_wanted: false,
        })
    }

    pub fn state(&self) -> EngineState {
        if self.capture.is_recording() {
            EngineState::Recording
        } else if self.playback.as_ref().is_some_and(|p| !p.is_finished()) {
            EngineState::Playing
        } else {
            EngineState::Idle
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace settings. Rejected while recording or playing.
    pub fn set_settings(&mut self, settings: Settings) -> Result<()> {
        if self.state() != EngineState::Idle {
            return Err(Error::Busy("settings cannot change during a session".to_string()));
        }
        settings.validate()?;
        self.capture.set_recorder(recorder_for(&self.source, &settings))?;
        let rebind = self.hotkeys.is_some() && settings.hotkeys != self.settings.hotkeys;
        self.settings = settings;
        if rebind {
            self.hotkeys = None;
            self.arm_hotkeys()?;
        }
        Ok(())
    }

    pub fn store(&self) -> &TimelineStore {
        &self.store
    }

    /// The timeline `play_current` and the play hotkey use
    pub fn current(&self) -> Option<&Timeline> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, timeline: Timeline) {
        self.current = Some(timeline);
    }

    // Capture

    /// Cancels any playback, then starts recording
    pub fn start_capture(&mut self) -> Result<()> {
        if self.capture.is_recording() {
            return Err(Error::Busy("already recording".to_string()));
        }
        if let Some(playback) = self.playback.take() {
            playback.cancel();
            match playback.join() {
                Ok(report) => {
                    tracing::debug!(status = ?report.status, "playback ended for recording")
                }
                Err(e) => tracing::warn!("playback ended with error: {}", e),
            }
        }

        // hotkey hooks and capture hooks never overlap
        self.hotkeys = None;
        if let Err(e) = self.capture.start() {
            self.rearm_after_capture();
            return Err(e);
        }
        Ok(())
    }

    /// Stop recording and make the result current. Empty while idle.
    pub fn stop_capture(&mut self) -> Result<Timeline> {
        let was_recording = self.capture.is_recording();
        let timeline = self.capture.stop()?;
        if was_recording || !timeline.is_empty() {
            self.finish_capture(&timeline);
        }
        Ok(timeline)
    }

    /// Collect a session the stop key ended
    pub fn poll_capture(&mut self) -> Result<Option<Timeline>> {
        match self.capture.take_finished() {
            Some(outcome) => {
                let timeline = outcome?.timeline;
                self.finish_capture(&timeline);
                Ok(Some(timeline))
            }
            None => Ok(None),
        }
    }

    pub fn capture_event_count(&self) -> usize {
        self.capture.event_count()
    }

    fn finish_capture(&mut self, timeline: &Timeline) {
        if !timeline.is_empty() {
            self.current = Some(timeline.clone());
        }
        self.rearm_after_capture();
    }

    fn rearm_after_capture(&mut self) {
        if self.hotkeys_wanted {
            if let Err(e) = self.arm_hotkeys() {
                tracing::warn!("failed to re-arm hotkeys: {}", e);
            }
        }
    }

    // Playback

    /// Start playing on a background thread
    pub fn play(&mut self, timeline: Timeline) -> Result<CancelToken> {
        match self.state() {
            EngineState::Recording => return Err(Error::Busy("recording in progress".to_string())),
            EngineState::Playing => return Err(Error::Busy("playback in progress".to_string())),
            EngineState::Idle => {}
        }
        if let Some(done) = self.playback.take() {
            let _ = done.join();
        }
        let handle = spawn_playback(self.player.clone(), timeline, self.settings.playback.clone())?;
        let token = handle.token();
        self.playback = Some(handle);
        Ok(token)
    }

    pub fn play_current(&mut self) -> Result<CancelToken> {
        let timeline = self.current.clone().ok_or(Error::EmptyTimeline)?;
        self.play(timeline)
    }

    pub fn cancel(&self, token: &CancelToken) {
        token.cancel();
    }

    pub fn cancel_playback(&self) {
        if let Some(playback) = &self.playback {
            playback.cancel();
        }
    }

    /// Block until the active playback ends. `None` if nothing was playing.
    pub fn wait_playback(&mut self) -> Result<Option<PlaybackReport>> {
        match self.playback.take() {
            Some(handle) => handle.join().map(Some),
            None => Ok(None),
        }
    }

    fn take_finished_playback(&mut self) -> Option<Result<PlaybackReport>> {
        if self.playback.as_ref().is_some_and(PlaybackHandle::is_finished) {
            self.playback.take().map(PlaybackHandle::join)
        } else {
            None
        }
    }

    // Storage

    pub fn save(&self, timeline: &Timeline, name: &str) -> Result<PersistedHandle> {
        self.store.save(timeline, name)
    }

    /// Load a macro and make it current
    pub fn load(&mut self, name: &str) -> Result<Timeline> {
        let timeline = self.store.load(name)?;
        self.current = Some(timeline.clone());
        Ok(timeline)
    }

    pub fn list_artifacts(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<PersistedHandle> {
        self.store.rename(old, new)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.store.delete(name)
    }

    // Hotkeys

    /// Listen for the configured control keys until [`disarm_hotkeys`](Self::disarm_hotkeys)
    pub fn arm_hotkeys(&mut self) -> Result<()> {
        self.hotkeys_wanted = true;
        if self.hotkeys.is_none() && !self.capture.is_recording() {
            let map = HotkeyMap::new(&self.settings.hotkeys);
            self.hotkeys = Some(HotkeyListener::start(self.source.clone(), map)?);
        }
        Ok(())
    }

    pub fn disarm_hotkeys(&mut self) {
        self.hotkeys_wanted = false;
        self.hotkeys = None;
    }

    pub fn hotkeys_armed(&self) -> bool {
        self.hotkeys.is_some()
    }

    /// Apply a control key to the current state
    pub fn on_hotkey(&mut self, action: HotkeyAction) -> Result<Notice> {
        let state = self.state();
        tracing::debug!(?action, ?state, "hotkey");
        match (action, state) {
            (HotkeyAction::StartRecording, EngineState::Idle | EngineState::Playing) => {
                self.start_capture()?;
                Ok(Notice::RecordingStarted)
            }
            (HotkeyAction::StopRecording, EngineState::Recording) => {
                Ok(Notice::Recorded(self.stop_capture()?))
            }
            (HotkeyAction::StopRecording, EngineState::Playing) => {
                self.cancel_playback();
                let report = self.wait_playback()?;
                Ok(report.map_or(Notice::Ignored(action), Notice::PlaybackFinished))
            }
            (HotkeyAction::PlayMacro, EngineState::Idle) if self.current.is_some() => {
                self.play_current()?;
                Ok(Notice::PlaybackStarted)
            }
            _ => Ok(Notice::Ignored(action)),
        }
    }

    /// One step of the hotkey loop: collect finished sessions, then wait up
    /// to `timeout` for a control key.
    pub fn tick(&mut self, timeout: Duration) -> Result<Option<Notice>> {
        if let Some(timeline) = self.poll_capture()? {
            return Ok(Some(Notice::Recorded(timeline)));
        }
        if let Some(report) = self.take_finished_playback() {
            return Ok(Some(Notice::PlaybackFinished(report?)));
        }

        let action = match &self.hotkeys {
            Some(listener) => listener.recv_timeout(timeout)?,
            None => {
                std::thread::sleep(timeout);
                None
            }
        };
        match action {
            Some(action) => self.on_hotkey(action).map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.hotkeys = None;
        if let Some(playback) = self.playback.take() {
            playback.cancel();
        }
    }
}

fn recorder_for(source: &Arc<dyn InputSource>, settings: &Settings) -> MacroRecorder {
    MacroRecorder::new(source.clone())
        .filter(settings.recording.clone())
        .stop_key(Some(settings.hotkeys.stop_recording.clone()))
}
