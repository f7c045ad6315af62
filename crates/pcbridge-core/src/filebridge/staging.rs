//! Place-staged state machine (spec.md §4.4):
//!
//! ```text
//! queued -> running -> verifying -> bridged   [auto_place=false]
//!                                 -> placed    [auto_place=true]
//!        -> failed (any step)
//! ```
//!
//! `StagingArea` only tracks the on-disk side of this — the transition
//! itself is recorded by the caller's response to the client, since the
//! server holds no long-lived per-item bookkeeping beyond the staged
//! bytes.

use std::path::{Path, PathBuf};

use super::paths::{expand_tilde, sanitize_basename, validate_within};
use super::transfer::sha256_file;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Queued,
    Running,
    Verifying,
    Bridged,
    Placed,
    Failed,
}

pub struct StagingArea {
    home: PathBuf,
}

impl StagingArea {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.home.join("BridgeStaging").join(session_id)
    }

    /// Resolves and validates the on-disk path for `filename` inside a
    /// session's staging directory, creating the directory if needed.
    pub fn stage_path(&self, session_id: &str, filename: &str) -> Result<PathBuf> {
        let basename = sanitize_basename(filename)?;
        let dir = self.session_dir(session_id);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(basename);
        validate_within(&dir, &path)?;
        Ok(path)
    }

    /// Echoes the SHA-256 of a file already staged for `session_id`,
    /// backing `get_staging_sha256`.
    pub fn staging_sha256(&self, session_id: &str, filename: &str) -> Result<String> {
        let path = self.stage_path(session_id, filename)?;
        if !path.is_file() {
            return Err(BridgeError::operation(format!(
                "no staged file named {filename} for session {session_id}"
            )));
        }
        sha256_file(&path)
    }

    /// Moves a staged file to its final destination. Rejects filenames
    /// with path separators (the source is always flat inside the
    /// session's staging directory); the destination may use a leading
    /// `~` for the server user's home.
    pub fn place_staged(&self, session_id: &str, filename: &str, destination: &str) -> Result<PathBuf> {
        let source = self.stage_path(session_id, filename)?;
        if !source.is_file() {
            return Err(BridgeError::operation(format!(
                "no staged file named {filename} for session {session_id}"
            )));
        }

        let dest = expand_tilde(&self.home, destination);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&source, &dest).or_else(|_| {
            std::fs::copy(&source, &dest)?;
            std::fs::remove_file(&source)
        })?;
        Ok(dest)
    }

    /// Removes a session's entire staging directory (`cleanup_staging`).
    pub fn cleanup(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging_area() -> (tempfile::TempDir, StagingArea) {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().to_path_buf();
        (tmp, StagingArea::new(home))
    }

    #[test]
    fn stage_path_creates_the_session_directory() {
        let (_tmp, area) = staging_area();
        let path = area.stage_path("abc123", "report.pdf").unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert_eq!(path.file_name().unwrap(), "report.pdf");
    }

    #[test]
    fn stage_path_rejects_nested_filenames() {
        let (_tmp, area) = staging_area();
        assert!(area.stage_path("abc123", "nested/report.pdf").is_err());
    }

    #[test]
    fn place_staged_moves_the_file_and_honors_tilde_destination() {
        let (_tmp, area) = staging_area();
        let staged = area.stage_path("abc123", "x.bin").unwrap();
        std::fs::write(&staged, b"hello").unwrap();

        let dest = area.place_staged("abc123", "x.bin", "~/Desktop/x.bin").unwrap();
        assert_eq!(dest, area.home().join("Desktop/x.bin"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        assert!(!staged.exists());
    }

    #[test]
    fn place_staged_fails_when_nothing_is_staged() {
        let (_tmp, area) = staging_area();
        assert!(area.place_staged("abc123", "missing.bin", "~/x.bin").is_err());
    }

    #[test]
    fn cleanup_removes_the_whole_session_directory() {
        let (_tmp, area) = staging_area();
        let staged = area.stage_path("abc123", "x.bin").unwrap();
        std::fs::write(&staged, b"hello").unwrap();
        area.cleanup("abc123").unwrap();
        assert!(!area.session_dir("abc123").exists());
    }
}
