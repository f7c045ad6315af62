//! The file bridge: transfer-folder listing/deletion, upload/download
//! staging, SHA-256 integrity, and the place-staged workflow (spec.md
//! §4.4).

mod paths;
mod staging;
mod transfer;

pub use paths::{sanitize_basename, LEGACY_FOLDERS};
pub use staging::{StagingArea, TransferState};
pub use transfer::{receive_exact, send_exact, sha256_file, verify_declared};

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

pub struct FileBridge {
    home: PathBuf,
    staging: StagingArea,
}

impl FileBridge {
    pub fn new(home: PathBuf) -> Self {
        let staging = StagingArea::new(home.clone());
        Self { home, staging }
    }

    /// Reads `$HOME` from the environment, matching the original
    /// service's `Path.home()` convention.
    pub fn from_env() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| BridgeError::operation("HOME is not set"))?;
        Ok(Self::new(home))
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    fn resolve_for_io(&self, folder: &str, session_id: &str) -> Result<PathBuf> {
        paths::resolve_folder(&self.home, folder, session_id)
    }

    /// Validated destination path for an incoming `file_send`.
    pub fn upload_target(&self, folder: &str, filename: &str, session_id: &str) -> Result<PathBuf> {
        let basename = paths::sanitize_basename(filename)?;
        let dir = self.resolve_for_io(folder, session_id)?;
        std::fs::create_dir_all(&dir)?;
        let target = dir.join(basename);
        paths::validate_within(&dir, &target)?;
        Ok(target)
    }

    /// Validated source path plus size for an outgoing `file_get`.
    pub fn download_source(&self, folder: &str, filename: &str, session_id: &str) -> Result<(PathBuf, u64)> {
        let target = self.upload_target(folder, filename, session_id)?;
        let meta = std::fs::metadata(&target)
            .map_err(|_| BridgeError::operation(format!("file not found: {filename}")))?;
        Ok((target, meta.len()))
    }

    pub fn list_files(&self, folder: &str, session_id: &str) -> Result<Vec<FileEntry>> {
        let dir = self.resolve_for_io(folder, session_id)?;
        std::fs::create_dir_all(&dir)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                entries.push(FileEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: entry.metadata()?.len(),
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn delete_file(&self, folder: &str, filename: &str, session_id: &str) -> Result<()> {
        let target = self.upload_target(folder, filename, session_id)?;
        if !target.is_file() {
            return Err(BridgeError::operation(format!("file not found: {filename}")));
        }
        std::fs::remove_file(&target)?;
        Ok(())
    }

    /// Returns `(matches, computed_sha256)`.
    pub fn verify_file(&self, folder: &str, filename: &str, expected: &str, session_id: &str) -> Result<(bool, String)> {
        let target = self.upload_target(folder, filename, session_id)?;
        if !target.is_file() {
            return Err(BridgeError::operation(format!("file not found: {filename}")));
        }
        let computed = sha256_file(&target)?;
        Ok((computed.eq_ignore_ascii_case(expected), computed))
    }

    fn shared_dir(&self) -> PathBuf {
        self.home.join("SharedDrive")
    }

    pub fn list_shared(&self) -> Result<Vec<FileEntry>> {
        let dir = self.shared_dir();
        std::fs::create_dir_all(&dir)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                entries.push(FileEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: entry.metadata()?.len(),
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn delete_shared(&self, filename: &str) -> Result<()> {
        let basename = paths::sanitize_basename(filename)?;
        let dir = self.shared_dir();
        let target = dir.join(basename);
        paths::validate_within(&dir, &target)?;
        if !target.is_file() {
            return Err(BridgeError::operation(format!("file not found: {filename}")));
        }
        std::fs::remove_file(&target)?;
        Ok(())
    }

    /// Opens a directory or path in the server's default file manager.
    /// Fire-and-forget, like the input injector's subprocess fallback:
    /// a hung file manager must not stall the control dispatcher.
    fn open_in_file_manager(&self, path: &std::path::Path) -> Result<()> {
        std::fs::create_dir_all(path).ok();
        Command::new("xdg-open")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BridgeError::operation(format!("failed to launch file manager: {e}")))?;
        Ok(())
    }

    pub fn open_shared_drive(&self) -> Result<()> {
        self.open_in_file_manager(&self.shared_dir())
    }

    pub fn open_bridge_folder(&self, session_id: &str) -> Result<()> {
        self.open_in_file_manager(&self.staging.session_dir(session_id))
    }

    pub fn open_path(&self, raw: &str) -> Result<()> {
        let resolved = paths::expand_tilde(&self.home, raw);
        self.open_in_file_manager(&resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, FileBridge) {
        let tmp = tempfile::tempdir().unwrap();
        let bridge = FileBridge::new(tmp.path().to_path_buf());
        (tmp, bridge)
    }

    #[test]
    fn upload_then_list_then_delete_round_trips() {
        let (_tmp, bridge) = setup();
        let target = bridge.upload_target("inbox", "a.txt", "sid").unwrap();
        std::fs::write(&target, b"hi").unwrap();

        let files = bridge.list_files("inbox", "sid").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.txt");
        assert_eq!(files[0].size, 2);

        bridge.delete_file("inbox", "a.txt", "sid").unwrap();
        assert!(bridge.list_files("inbox", "sid").unwrap().is_empty());
    }

    #[test]
    fn verify_file_reports_mismatch_without_erroring() {
        let (_tmp, bridge) = setup();
        let target = bridge.upload_target("staging", "b.bin", "sid").unwrap();
        std::fs::write(&target, b"payload").unwrap();

        let (matches, computed) = bridge.verify_file("staging", "b.bin", "deadbeef", "sid").unwrap();
        assert!(!matches);
        assert_eq!(computed.len(), 64);
    }

    #[test]
    fn shared_drive_listing_is_independent_of_transfer_folders() {
        let (_tmp, bridge) = setup();
        let shared_file = bridge.shared_dir().join("shared.txt");
        std::fs::create_dir_all(shared_file.parent().unwrap()).unwrap();
        std::fs::write(&shared_file, b"shared").unwrap();

        let entries = bridge.list_shared().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "shared.txt");
    }
}
