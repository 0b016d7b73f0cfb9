//! Named macro storage - one pretty-printed JSON file per timeline

use crate::config;
use crate::timeline::Timeline;
use loopkey_core::{Error, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Where a timeline was written
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PersistedHandle {
    pub name: String,
    pub path: PathBuf,
}

pub struct TimelineStore {
    dir: PathBuf,
}

impl TimelineStore {
    /// Store in the platform data directory
    pub fn new() -> Result<Self> {
        let dir = config::default_macro_dir()
            .ok_or_else(|| Error::config("could not determine data directory"))?;
        Self::with_dir(dir)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Timestamp name used when the user gives none
    pub fn default_name() -> String {
        chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    /// Save under `name`, replacing any macro with the same name
    pub fn save(&self, timeline: &Timeline, name: &str) -> Result<PersistedHandle> {
        let path = self.path_for(name)?;
        let tmp = path.with_extension("json.tmp");

        let write = || -> Result<()> {
            let mut w = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut w, timeline)?;
            writeln!(w)?;
            w.flush()?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path)?;

        tracing::info!(name, events = timeline.len(), "macro saved");
        Ok(PersistedHandle {
            name: name.to_string(),
            path,
        })
    }

    /// Load a whole timeline or fail; never returns a partial one
    pub fn load(&self, name: &str) -> Result<Timeline> {
        let path = self.existing_path(name)?;
        let reader = BufReader::new(File::open(&path)?);
        let timeline: Timeline =
            serde_json::from_reader(reader).map_err(|e| Error::corrupt(name, e))?;
        if !timeline.is_valid() {
            return Err(Error::corrupt(name, "event times are not in order"));
        }
        tracing::debug!(name, events = timeline.len(), "macro loaded");
        Ok(timeline)
    }

    /// Names of all stored macros, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            // skip files `load` would refuse by name (".hidden.json")
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<PersistedHandle> {
        let from = self.existing_path(old)?;
        let to = self.path_for(new)?;
        if to.exists() {
            return Err(Error::AlreadyExists {
                name: new.to_string(),
            });
        }
        fs::rename(&from, &to)?;
        tracing::info!(old, new, "macro renamed");
        Ok(PersistedHandle {
            name: new.to_string(),
            path: to,
        })
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.existing_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(name, "macro deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, EXTENSION)))
    }

    fn existing_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(Error::not_found(name));
        }
        Ok(path)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_name(name, "name is empty"));
    }
    if name.starts_with('.') {
        return Err(Error::invalid_name(name, "name must not start with '.'"));
    }
    if name.chars().any(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(Error::invalid_name(name, "name must not contain path separators"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use loopkey_core::{ErrorCode, KeyId};

    fn store() -> (tempfile::TempDir, TimelineStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::with_dir(dir.path()).unwrap();
        (dir, store)
    }

    fn sample() -> Timeline {
        Timeline::from_events(vec![
            Event::Key {
                key: KeyId::new("h"),
                time_offset: 0.1,
            },
            Event::Scroll {
                delta: -2,
                time_offset: 0.75,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_dir, store) = store();
        let t = sample();
        let handle = store.save(&t, "greeting").unwrap();
        assert!(handle.path.ends_with("greeting.json"));
        assert_eq!(store.load("greeting").unwrap(), t);
    }

    #[test]
    fn test_save_overwrites() {
        let (_dir, store) = store();
        store.save(&sample(), "m").unwrap();
        store.save(&Timeline::new(), "m").unwrap();
        assert!(store.load("m").unwrap().is_empty());
        assert_eq!(store.list().unwrap(), vec!["m".to_string()]);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.load("nope").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let (dir, store) = store();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert_eq!(store.load("bad").unwrap_err().code(), ErrorCode::CorruptData);

        fs::write(
            dir.path().join("tag.json"),
            r#"[{"type": "gamepad", "event": "press", "time": 0.1}]"#,
        )
        .unwrap();
        assert_eq!(store.load("tag").unwrap_err().code(), ErrorCode::CorruptData);
    }

    #[test]
    fn test_load_out_of_order_is_corrupt() {
        let (dir, store) = store();
        fs::write(
            dir.path().join("order.json"),
            r#"[{"type": "keyboard", "event": "press", "key": "a", "time": 2.0},
                {"type": "keyboard", "event": "press", "key": "b", "time": 1.0}]"#,
        )
        .unwrap();
        let err = store.load("order").unwrap_err();
        assert!(matches!(err, Error::CorruptData { ref name, .. } if name == "order"));
    }

    #[test]
    fn test_list_only_json_sorted() {
        let (dir, store) = store();
        store.save(&sample(), "b").unwrap();
        store.save(&sample(), "a").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join(".hidden.json"), "[]").unwrap();
        let names = store.list().unwrap();
        assert_eq!(names, vec!["a", "b"]);
        for name in names {
            assert!(store.load(&name).is_ok());
        }
    }

    #[test]
    fn test_load_float_scroll_deltas() {
        let (dir, store) = store();
        fs::write(
            dir.path().join("legacy.json"),
            r#"[{"type": "mouse", "event": "scroll", "delta": -1.0, "time": 0.1},
                {"type": "mouse", "event": "scroll", "delta": 1.0, "time": 0.2}]"#,
        )
        .unwrap();
        let t = store.load("legacy").unwrap();
        let deltas: Vec<i32> = t
            .iter()
            .filter_map(|e| match e {
                Event::Scroll { delta, .. } => Some(*delta),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec![-1, 1]);

        fs::write(
            dir.path().join("half.json"),
            r#"[{"type": "mouse", "event": "scroll", "delta": 0.5, "time": 0.1}]"#,
        )
        .unwrap();
        assert_eq!(store.load("half").unwrap_err().code(), ErrorCode::CorruptData);
    }

    #[test]
    fn test_rename_and_delete() {
        let (_dir, store) = store();
        store.save(&sample(), "old").unwrap();
        store.save(&sample(), "taken").unwrap();

        assert_eq!(
            store.rename("old", "taken").unwrap_err().code(),
            ErrorCode::AlreadyExists
        );
        store.rename("old", "new").unwrap();
        assert!(!store.exists("old"));
        assert!(store.exists("new"));

        store.delete("new").unwrap();
        assert_eq!(store.delete("new").unwrap_err().code(), ErrorCode::NotFound);
        assert_eq!(
            store.rename("ghost", "x").unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn test_rejects_path_names() {
        let (_dir, store) = store();
        for name in ["", "../escape", "a/b", ".hidden"] {
            assert_eq!(
                store.save(&sample(), name).unwrap_err().code(),
                ErrorCode::InvalidName,
                "{:?}",
                name
            );
        }
    }

    #[test]
    fn test_default_name_is_timestamp() {
        let name = TimelineStore::default_name();
        assert_eq!(name.len(), "20240101_120000".len());
        assert!(validate_name(&name).is_ok());
    }
}
