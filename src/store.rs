//! The entry definitions file.
//!
//! A single JSON array of [`ScreenshotEntry`] records, rewritten wholesale
//! on every change. One process is assumed to own the file at a time; the
//! format itself is the contract other tooling reads.

use std::path::{Path, PathBuf};

use pagesnap_core_types::ScreenshotEntry;
use tracing::warn;

use crate::errors::AppError;

pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file as an empty array when missing.
    pub fn ensure(&self) -> Result<(), AppError> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|source| AppError::StoreIo {
                        path: self.path.clone(),
                        source,
                    })?;
                }
            }
            self.write(&[])?;
        }
        Ok(())
    }

    /// Load every entry. A corrupt file is logged and treated as empty
    /// rather than aborting the run.
    pub fn load(&self) -> Result<Vec<ScreenshotEntry>, AppError> {
        self.ensure()?;
        let raw = std::fs::read_to_string(&self.path).map_err(|source| AppError::StoreIo {
            path: self.path.clone(),
            source,
        })?;
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!(
                    target: "pagesnap",
                    path = %self.path.display(),
                    %err,
                    "entry file is unreadable; starting from an empty list"
                );
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, entries: &[ScreenshotEntry]) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json).map_err(|source| AppError::StoreIo {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, entries: &[ScreenshotEntry]) -> Result<(), AppError> {
        self.write(entries)
    }

    /// Insert or replace the entry with the same `png_name`.
    pub fn upsert(&self, entry: ScreenshotEntry) -> Result<(), AppError> {
        let mut entries = self.load()?;
        match entries.iter_mut().find(|e| e.png_name == entry.png_name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.write(&entries)
    }

    /// Upsert a batch in one read/write cycle.
    pub fn bulk_add(&self, batch: Vec<ScreenshotEntry>) -> Result<(), AppError> {
        let mut entries = self.load()?;
        for entry in batch {
            match entries.iter_mut().find(|e| e.png_name == entry.png_name) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        self.write(&entries)
    }

    pub fn find(&self, png_name: &str) -> Result<ScreenshotEntry, AppError> {
        self.load()?
            .into_iter()
            .find(|e| e.png_name == png_name)
            .ok_or_else(|| AppError::UnknownEntry(png_name.to_string()))
    }

    /// Remove by name; returns whether an entry was dropped.
    pub fn remove(&self, png_name: &str) -> Result<bool, AppError> {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|e| e.png_name != png_name);
        let removed = entries.len() != before;
        if removed {
            self.write(&entries)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.write(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesnap_core_types::{Action, Clip};

    fn entry(name: &str) -> ScreenshotEntry {
        ScreenshotEntry {
            url: "https://example.com".to_string(),
            png_name: name.to_string(),
            clip: Clip::new(0, 0, 100, 80),
            actions: vec![Action::Wait { ms: 50 }],
        }
    }

    #[test]
    fn ensure_creates_an_empty_array() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EntryStore::new(tmp.path().join("screenshots.json"));
        assert!(store.load().unwrap().is_empty());
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.trim(), "[]");
    }

    #[test]
    fn upsert_replaces_by_png_name() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EntryStore::new(tmp.path().join("screenshots.json"));

        store.upsert(entry("a")).unwrap();
        store.upsert(entry("b")).unwrap();

        let mut changed = entry("a");
        changed.url = "https://example.org".to_string();
        store.upsert(changed).unwrap();

        let entries = store.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://example.org");
    }

    #[test]
    fn corrupt_file_loads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("screenshots.json");
        std::fs::write(&path, "{ not json ]").unwrap();

        let store = EntryStore::new(&path);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn remove_reports_whether_anything_was_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EntryStore::new(tmp.path().join("screenshots.json"));
        store.upsert(entry("a")).unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }
}
