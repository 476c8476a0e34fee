//! Artifact files on disk.
//!
//! Final artifacts live in one directory, named after their entry's
//! `png_name`; candidate captures and diff renders go to a staging
//! directory and are promoted by rename only after a replace decision.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::SnapshotError;
use crate::hash::file_sha256_hex;

/// Normalize an entry name into a safe `.png` filename: anything outside
/// `[A-Za-z0-9._-]` becomes `_`, and the extension is appended when missing.
pub fn sanitize_png_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    if !out.to_ascii_lowercase().ends_with(".png") {
        out.push_str(".png");
    }
    out
}

pub struct ArtifactStore {
    dir: PathBuf,
    staging: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            staging: staging.into(),
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), SnapshotError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::create_dir_all(&self.staging)?;
        Ok(())
    }

    /// Drop every staged candidate and diff render.
    pub fn clear_staging(&self) -> Result<(), SnapshotError> {
        if self.staging.exists() {
            std::fs::remove_dir_all(&self.staging)?;
        }
        std::fs::create_dir_all(&self.staging)?;
        Ok(())
    }

    pub fn final_path(&self, name: &str) -> PathBuf {
        self.dir.join(sanitize_png_name(name))
    }

    pub fn staging_path(&self, name: &str) -> PathBuf {
        self.staging.join(sanitize_png_name(name))
    }

    pub fn diff_path(&self, name: &str) -> PathBuf {
        let mut file = sanitize_png_name(name);
        file.truncate(file.len() - ".png".len());
        file.push_str(".diff.png");
        self.staging.join(file)
    }

    pub fn write_staging(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, SnapshotError> {
        self.ensure_dirs()?;
        let path = self.staging_path(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn write_diff(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, SnapshotError> {
        self.ensure_dirs()?;
        let path = self.diff_path(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Move the staged candidate over the final artifact.
    pub fn promote(&self, name: &str) -> Result<PathBuf, SnapshotError> {
        let from = self.staging_path(name);
        let to = self.final_path(name);
        std::fs::rename(&from, &to)?;
        debug!(target: "snapshot", path = %to.display(), "artifact promoted");
        Ok(to)
    }

    /// Drop the staged candidate, leaving the final artifact untouched.
    pub fn discard(&self, name: &str) -> Result<(), SnapshotError> {
        let path = self.staging_path(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn remove_final(&self, name: &str) -> Result<(), SnapshotError> {
        let path = self.final_path(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Hash of the accepted artifact, or `None` when nothing was captured
    /// yet.
    pub fn final_hash(&self, name: &str) -> Option<String> {
        file_sha256_hex(&self.final_path(name))
    }

    pub fn final_bytes(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.final_path(name)).ok()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_png_name("dashboard"), "dashboard.png");
        assert_eq!(sanitize_png_name("front page/v2"), "front_page_v2.png");
        assert_eq!(sanitize_png_name("hero.PNG"), "hero.PNG");
        assert_eq!(sanitize_png_name(""), "_.png");
    }

    #[test]
    fn promote_replaces_the_final_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("shots"), tmp.path().join("staging"));
        store.ensure_dirs().unwrap();

        std::fs::write(store.final_path("a"), b"old").unwrap();
        store.write_staging("a", b"new").unwrap();
        store.promote("a").unwrap();

        assert_eq!(std::fs::read(store.final_path("a")).unwrap(), b"new");
        assert!(!store.staging_path("a").exists());
    }

    #[test]
    fn discard_keeps_the_final_artifact_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("shots"), tmp.path().join("staging"));
        store.ensure_dirs().unwrap();

        std::fs::write(store.final_path("a"), b"accepted").unwrap();
        let before = store.final_hash("a").unwrap();

        store.write_staging("a", b"candidate").unwrap();
        store.discard("a").unwrap();

        assert_eq!(store.final_hash("a").unwrap(), before);
        assert!(!store.staging_path("a").exists());
    }

    #[test]
    fn clear_staging_removes_candidates_and_diffs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("shots"), tmp.path().join("staging"));
        store.write_staging("a", b"x").unwrap();
        store.write_diff("a", b"y").unwrap();

        store.clear_staging().unwrap();
        assert!(!store.staging_path("a").exists());
        assert!(!store.diff_path("a").exists());
    }
}
