use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::discovery::is_zip_path;
use crate::error::Result;

/// Name of the progress record kept in the download directory
pub const STATE_FILE: &str = "downloads_state.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    completed_keys: BTreeSet<String>,
    #[serde(default)]
    completed_files: BTreeSet<String>,
}

/// Which archive parts have finished downloading, persisted for resume
#[derive(Debug)]
pub struct DownloadState {
    path: PathBuf,
    completed_keys: BTreeSet<String>,
    completed_files: BTreeSet<String>,
}

impl DownloadState {
    /// Load the record at `path`; a missing or corrupt file starts empty
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<StateFile>(&text).unwrap_or_else(|e| {
                warn!("Ignoring unreadable progress record {}: {}", path.display(), e);
                StateFile::default()
            }),
            Err(_) => StateFile::default(),
        };

        Self {
            path,
            completed_keys: file.completed_keys,
            completed_files: file.completed_files,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count every `*.zip` already in `dir` as a completed file
    pub fn seed_from_disk(&mut self, dir: &Path) -> Result<usize> {
        let mut added = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && is_zip_path(&path) {
                if let Some(name) = path.file_name() {
                    if self.completed_files.insert(name.to_string_lossy().into_owned()) {
                        added += 1;
                    }
                }
            }
        }
        debug!("Seeded {} archives from {}", added, dir.display());
        Ok(added)
    }

    /// Write the record via a temporary file so a crash never leaves it half written
    pub fn save(&self) -> Result<()> {
        let data = StateFile {
            completed_keys: self.completed_keys.clone(),
            completed_files: self.completed_files.clone(),
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&data)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Record a finished part and persist immediately
    pub fn mark_completed(&mut self, key: Option<&str>, filename: Option<&str>) -> Result<()> {
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            self.completed_keys.insert(key.to_string());
        }
        if let Some(filename) = filename.filter(|f| !f.is_empty()) {
            self.completed_files.insert(filename.to_string());
        }
        self.save()
    }

    pub fn is_key_completed(&self, key: &str) -> bool {
        self.completed_keys.contains(key)
    }

    pub fn is_file_completed(&self, filename: &str) -> bool {
        self.completed_files.contains(filename)
    }

    pub fn completed_keys(&self) -> impl Iterator<Item = &str> {
        self.completed_keys.iter().map(String::as_str)
    }

    pub fn completed_files(&self) -> impl Iterator<Item = &str> {
        self.completed_files.iter().map(String::as_str)
    }

    /// Total size of the completed files still present in `dir`
    pub fn completed_bytes(&self, dir: &Path) -> u64 {
        self.completed_files
            .iter()
            .filter_map(|f| fs::metadata(dir.join(f)).ok())
            .map(|m| m.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let state = DownloadState::load(dir.path().join(STATE_FILE));
        assert_eq!(state.completed_keys().count(), 0);
        assert_eq!(state.completed_files().count(), 0);
    }

    #[test]
    fn test_mark_completed_persists_sorted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);

        let mut state = DownloadState::load(&path);
        state.mark_completed(Some("k2"), Some("b.zip")).unwrap();
        state.mark_completed(Some("k1"), Some("a.zip")).unwrap();
        state.mark_completed(None, Some("")).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["completed_keys"], serde_json::json!(["k1", "k2"]));
        assert_eq!(json["completed_files"], serde_json::json!(["a.zip", "b.zip"]));

        let reloaded = DownloadState::load(&path);
        assert!(reloaded.is_key_completed("k1"));
        assert!(reloaded.is_file_completed("b.zip"));
        assert!(!dir.path().join("downloads_state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        fs::write(&path, "{ not json").unwrap();

        let state = DownloadState::load(&path);
        assert_eq!(state.completed_keys().count(), 0);
    }

    #[test]
    fn test_seed_from_disk_and_completed_bytes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("takeout-001.zip"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("takeout-002.ZIP"), vec![0u8; 5]).unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let mut state = DownloadState::load(dir.path().join(STATE_FILE));
        assert_eq!(state.seed_from_disk(dir.path()).unwrap(), 2);
        assert_eq!(state.seed_from_disk(dir.path()).unwrap(), 0);
        assert!(state.is_file_completed("takeout-001.zip"));
        assert_eq!(state.completed_bytes(dir.path()), 15);
    }
}
