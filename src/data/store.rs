//! Timeline persistence in the recordings directory

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::{FormatError, Timeline};

const RECORDING_EXTENSION: &str = "json";

/// Timeline store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("recording not found: {0:?}")]
    NotFound(PathBuf),

    #[error("recording {path:?} is corrupt: {source}")]
    CorruptFormat {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("I/O failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A recording file found in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEntry {
    /// File name including extension
    pub name: String,
    pub path: PathBuf,
}

/// Reads and writes timelines as JSON files under one directory
#[derive(Debug, Clone)]
pub struct TimelineStore {
    dir: PathBuf,
}

impl TimelineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a user-supplied path: relative paths live in the recordings directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }

    /// Save a timeline, generating a timestamped file name when `path` is None.
    /// Returns the path written.
    pub fn save(&self, timeline: &Timeline, path: Option<&Path>) -> Result<PathBuf, StoreError> {
        let path = match path {
            Some(path) => self.resolve(path),
            None => self.dir.join(timestamped_name("recording")),
        };

        let contents = timeline.to_json().map_err(|e| StoreError::Io {
            path: path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        write_file(&path, &contents)?;

        info!("Saved {} events to {:?}", timeline.len(), path);
        Ok(path)
    }

    /// Load a timeline from disk
    pub fn load(&self, path: &Path) -> Result<Timeline, StoreError> {
        let path = self.resolve(path);

        let contents = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.clone()),
            _ => StoreError::Io {
                path: path.clone(),
                source: e,
            },
        })?;

        let timeline = Timeline::from_json(&contents).map_err(|source| StoreError::CorruptFormat {
            path: path.clone(),
            source,
        })?;

        info!("Loaded {} events from {:?}", timeline.len(), path);
        Ok(timeline)
    }

    /// List recordings, sorted by name, optionally filtered by a
    /// case-insensitive substring of the file name
    pub fn list(&self, filter: Option<&str>) -> Result<Vec<RecordingEntry>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let needle = filter.map(str::to_lowercase);
        let mut recordings = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORDING_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some(needle) = needle.as_deref() {
                if !name.to_lowercase().contains(needle) {
                    continue;
                }
            }
            recordings.push(RecordingEntry {
                name: name.to_string(),
                path: path.clone(),
            });
        }

        recordings.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(recordings)
    }

    /// Delete a recording file
    pub fn delete(&self, path: &Path) -> Result<(), StoreError> {
        let path = self.resolve(path);
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.clone()),
            _ => StoreError::Io {
                path: path.clone(),
                source: e,
            },
        })?;
        info!("Deleted recording {:?}", path);
        Ok(())
    }

    /// Write an empty recording file
    pub fn create_blank(&self, name: Option<&str>) -> Result<PathBuf, StoreError> {
        let path = match name {
            Some(name) => self.resolve(Path::new(name)),
            None => self.dir.join(timestamped_name("blank_recording")),
        };
        self.save(&Timeline::new(), Some(&path))
    }
}

fn timestamped_name(prefix: &str) -> String {
    format!(
        "{}_{}.{}",
        prefix,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"),
        RECORDING_EXTENSION
    )
}

fn write_file(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::write(path, contents).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Wrote {} bytes to {:?}", contents.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Action, Event};

    fn sample() -> Timeline {
        Timeline::from_events(vec![
            Event::pointer_move(0.0, 640, 360),
            Event::key(0.1, "Space", Action::Press),
            Event::key(0.3, "Space", Action::Release),
        ])
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::new(dir.path());
        let timeline = sample();

        let path = store.save(&timeline, None).unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("recording_"));

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded.events(), timeline.events());
        assert_eq!(loaded.len(), timeline.len());
    }

    #[test]
    fn test_relative_path_resolves_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::new(dir.path().join("nested"));

        let path = store.save(&sample(), Some(Path::new("run.json"))).unwrap();
        assert_eq!(path, dir.path().join("nested").join("run.json"));
        assert_eq!(store.load(Path::new("run.json")).unwrap().len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::new(dir.path());
        assert!(matches!(
            store.load(Path::new("missing.json")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::new(dir.path());
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        assert!(matches!(
            store.load(Path::new("bad.json")),
            Err(StoreError::CorruptFormat { .. })
        ));
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::new(dir.path());
        store.save(&sample(), Some(Path::new("b_strafe.json"))).unwrap();
        store.save(&sample(), Some(Path::new("a_jump.json"))).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let all: Vec<_> = store.list(None).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(all, vec!["a_jump.json", "b_strafe.json"]);

        let filtered = store.list(Some("STRAFE")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "b_strafe.json");
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::new(dir.path().join("does-not-exist"));
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_blank() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimelineStore::new(dir.path());

        let blank = store.create_blank(None).unwrap();
        assert!(store.load(&blank).unwrap().is_empty());

        store.delete(&blank).unwrap();
        assert!(matches!(store.delete(&blank), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_save_failure_reports_io() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let store = TimelineStore::new(&blocker);

        assert!(matches!(
            store.save(&sample(), Some(Path::new("out.json"))),
            Err(StoreError::Io { .. })
        ));
    }
}
