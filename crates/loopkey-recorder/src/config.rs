//! Settings consumed by the capture and playback engines
//!
//! Settings live in a TOML file (`settings.toml` in the platform config
//! directory). Every field has a default, so a partial or missing file
//! still yields a usable configuration.
//!
//! ```toml
//! [hotkeys]
//! start_recording = "f7"
//! stop_recording = "esc"
//! play_macro = "f8"
//!
//! [recording]
//! capture_keyboard = true
//! capture_pointer = true
//! movement_threshold_px = 5.0
//!
//! [playback]
//! speed_multiplier = 1.0
//! repeat_count = 1
//! repeat_delay_seconds = 0.0
//! loop_indefinitely = false
//! ```

use loopkey_core::{Error, KeyId, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_ID: &str = "loopkey";
pub const SETTINGS_FILE: &str = "settings.toml";

/// Default minimum pointer travel between recorded move samples
pub const DEFAULT_MOVEMENT_THRESHOLD_PX: f64 = 5.0;

pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

/// Where macros are stored unless `macro_dir` overrides it
pub fn default_macro_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID).join("macros"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub start_recording: KeyId,
    pub stop_recording: KeyId,
    pub play_macro: KeyId,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            start_recording: KeyId::new("f7"),
            stop_recording: KeyId::new("esc"),
            play_macro: KeyId::new("f8"),
        }
    }
}

impl HotkeyConfig {
    pub fn validate(&self) -> Result<()> {
        let keys = [&self.start_recording, &self.stop_recording, &self.play_macro];
        if keys.iter().any(|k| k.as_str().is_empty()) {
            return Err(Error::config("hotkeys must not be empty"));
        }
        for (i, a) in keys.iter().enumerate() {
            if keys[i + 1..].contains(a) {
                return Err(Error::config(format!("hotkey '{}' is bound twice", a)));
            }
        }
        Ok(())
    }
}

/// Which raw notifications end up in the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingFilterConfig {
    pub capture_keyboard: bool,
    pub capture_pointer: bool,
    pub capture_pointer_movement: bool,
    pub capture_pointer_clicks: bool,
    pub capture_pointer_scroll: bool,
    /// Minimum distance from the last recorded move sample
    pub movement_threshold_px: f64,
}

impl Default for RecordingFilterConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_pointer: true,
            capture_pointer_movement: true,
            capture_pointer_clicks: true,
            capture_pointer_scroll: true,
            movement_threshold_px: DEFAULT_MOVEMENT_THRESHOLD_PX,
        }
    }
}

impl RecordingFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.capture_keyboard && !self.capture_pointer {
            return Err(Error::config(
                "enable at least one of capture_keyboard / capture_pointer",
            ));
        }
        if !self.movement_threshold_px.is_finite() || self.movement_threshold_px < 0.0 {
            return Err(Error::config(format!(
                "movement_threshold_px must be >= 0, got {}",
                self.movement_threshold_px
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 2.0 plays twice as fast
    pub speed_multiplier: f64,
    pub repeat_count: u32,
    /// Pause between passes, never after the last one
    pub repeat_delay_seconds: f64,
    /// Repeat until cancelled; `repeat_count` is ignored
    pub loop_indefinitely: bool,
    /// Countdown before the first pass
    pub start_delay_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            repeat_count: 1,
            repeat_delay_seconds: 0.0,
            loop_indefinitely: false,
            start_delay_seconds: 0.0,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.speed_multiplier.is_finite() || self.speed_multiplier <= 0.0 {
            return Err(Error::config(format!(
                "speed_multiplier must be > 0, got {}",
                self.speed_multiplier
            )));
        }
        for (name, value) in [
            ("repeat_delay_seconds", self.repeat_delay_seconds),
            ("start_delay_seconds", self.start_delay_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        Ok(())
    }

    /// `repeat_count` with 0 treated as 1
    pub fn effective_repeat_count(&self) -> u32 {
        self.repeat_count.max(1)
    }

    pub fn repeat_delay(&self) -> Duration {
        secs_saturating(self.repeat_delay_seconds)
    }

    pub fn start_delay(&self) -> Duration {
        secs_saturating(self.start_delay_seconds)
    }
}

/// Seconds to a `Duration`, clamped to `[0, Duration::MAX]`. NaN maps to zero.
pub(crate) fn secs_saturating(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hotkeys: HotkeyConfig,
    pub recording: RecordingFilterConfig,
    pub playback: PlaybackConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macro_dir: Option<PathBuf>,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.hotkeys.validate()?;
        self.recording.validate()?;
        self.playback.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read settings {:?}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::config(format!("failed to parse settings {:?}: {}", path, e)))
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("failed to serialize settings: {}", e)))?;
        std::fs::write(path, content)?;
        tracing::debug!(?path, "settings saved");
        Ok(())
    }

    /// `macro_dir` if set, else the platform data directory
    pub fn resolved_macro_dir(&self) -> Option<PathBuf> {
        self.macro_dir.clone().or_else(default_macro_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert_eq!(s.hotkeys.start_recording.as_str(), "f7");
        assert_eq!(s.hotkeys.stop_recording.as_str(), "esc");
        assert_eq!(s.recording.movement_threshold_px, 5.0);
        assert_eq!(s.playback.speed_multiplier, 1.0);
        assert_eq!(s.playback.repeat_count, 1);
        assert!(!s.playback.loop_indefinitely);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_recording_needs_a_source() {
        let cfg = RecordingFilterConfig {
            capture_keyboard: false,
            capture_pointer: false,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_speed_must_be_positive() {
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = PlaybackConfig {
                speed_multiplier: speed,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "speed {} accepted", speed);
        }
    }

    #[test]
    fn test_huge_delays_saturate() {
        let config = PlaybackConfig {
            repeat_delay_seconds: 1e300,
            start_delay_seconds: 1e20,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.repeat_delay(), Duration::MAX);
        assert_eq!(config.start_delay(), Duration::MAX);
        assert_eq!(secs_saturating(f64::NAN), Duration::ZERO);
        assert_eq!(secs_saturating(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn test_repeat_count_clamped() {
        let cfg = PlaybackConfig {
            repeat_count: 0,
            ..Default::default()
        };
        assert_eq!(cfg.effective_repeat_count(), 1);
    }

    #[test]
    fn test_duplicate_hotkeys_rejected() {
        let hk = HotkeyConfig {
            play_macro: KeyId::new("F7"),
            ..Default::default()
        };
        assert!(hk.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let s: Settings = toml::from_str("[playback]\nspeed_multiplier = 2.5\n").unwrap();
        assert_eq!(s.playback.speed_multiplier, 2.5);
        assert_eq!(s.playback.repeat_count, 1);
        assert!(s.recording.capture_keyboard);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let mut s = Settings::default();
        s.playback.repeat_count = 3;
        s.macro_dir = Some(dir.path().join("macros"));
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), s);
    }
}
