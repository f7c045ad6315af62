//! Path resolution and sanitization for the file bridge.
//!
//! The basename-only sanitizer and the canonicalize-then-prefix-check
//! escape guard are narrowed from "any safe relative path" to "basename
//! only" since every bridge folder is a flat directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{BridgeError, Result};

/// Legacy closed-set transfer folders, kept for compatibility. Per the
/// file bridge's staging model, `BridgeStaging/<session_id>` is the
/// primary path; these are deprecated but still served.
pub const LEGACY_FOLDERS: &[&str] = &["inbox", "outbox", "staging", "archive"];

/// Rejects anything but a single plain path component: no separators,
/// no `.`/`..`, not empty.
pub fn sanitize_basename(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::operation("empty filename"));
    }
    let mut components = Path::new(trimmed).components();
    let only = components.next();
    if components.next().is_some() {
        return Err(BridgeError::operation(format!(
            "filename must not contain path separators: {name}"
        )));
    }
    match only {
        Some(Component::Normal(part)) => Ok(part.to_string_lossy().into_owned()),
        _ => Err(BridgeError::operation(format!("invalid filename: {name}"))),
    }
}

/// Resolves a client-supplied `folder` string to a directory on disk:
/// either the dynamic per-session staging area or one of the legacy
/// closed-set folders. Any other value is rejected.
pub fn resolve_folder(home: &Path, folder: &str, session_id: &str) -> Result<PathBuf> {
    let staging_folder = format!("BridgeStaging/{session_id}");
    if folder == staging_folder {
        return Ok(home.join("BridgeStaging").join(session_id));
    }
    if LEGACY_FOLDERS.contains(&folder) {
        return Ok(home.join("Desktop").join("PC-Transfer").join(folder));
    }
    Err(BridgeError::operation(format!(
        "unknown transfer folder: {folder}"
    )))
}

/// Expands a leading `~` to `home`; otherwise returns the path unchanged.
pub fn expand_tilde(home: &Path, raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else if raw == "~" {
        home.to_path_buf()
    } else {
        PathBuf::from(raw)
    }
}

/// Confirms `candidate`'s parent directory canonicalizes to somewhere
/// under `root` (guards against a symlinked intermediate directory
/// escaping the sandbox) and that `candidate` itself is not a symlink.
pub fn validate_within(root: &Path, candidate: &Path) -> Result<()> {
    let parent = candidate
        .parent()
        .ok_or_else(|| BridgeError::operation("path has no parent directory"))?;
    std::fs::create_dir_all(parent)?;

    let root_canon = std::fs::canonicalize(root)?;
    let parent_canon = std::fs::canonicalize(parent)?;
    if !parent_canon.starts_with(&root_canon) {
        return Err(BridgeError::operation(format!(
            "path escape attempt: {candidate:?} is outside {root:?}"
        )));
    }

    if let Ok(meta) = std::fs::symlink_metadata(candidate) {
        if meta.file_type().is_symlink() {
            return Err(BridgeError::operation(format!(
                "refusing to follow symlink target {candidate:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_basename_accepts_a_plain_name() {
        assert_eq!(sanitize_basename("report.pdf").unwrap(), "report.pdf");
    }

    #[test]
    fn sanitize_basename_rejects_traversal() {
        assert!(sanitize_basename("../etc/passwd").is_err());
        assert!(sanitize_basename("a/b").is_err());
        assert!(sanitize_basename("..").is_err());
        assert!(sanitize_basename("").is_err());
    }

    #[test]
    fn resolve_folder_recognizes_dynamic_staging_and_legacy_set() {
        let home = Path::new("/home/pc");
        let staged = resolve_folder(home, "BridgeStaging/abc123", "abc123").unwrap();
        assert_eq!(staged, home.join("BridgeStaging/abc123"));

        let legacy = resolve_folder(home, "inbox", "abc123").unwrap();
        assert_eq!(legacy, home.join("Desktop/PC-Transfer/inbox"));

        assert!(resolve_folder(home, "not-a-folder", "abc123").is_err());
    }

    #[test]
    fn expand_tilde_joins_onto_home() {
        let home = Path::new("/home/pc");
        assert_eq!(expand_tilde(home, "~/Desktop/x.bin"), home.join("Desktop/x.bin"));
        assert_eq!(expand_tilde(home, "/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn validate_within_rejects_escape_via_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        let outside = tmp.path().join("outside/evil.bin");
        std::fs::create_dir_all(outside.parent().unwrap()).unwrap();
        assert!(validate_within(&root, &outside).is_err());
    }

    #[test]
    fn validate_within_accepts_a_path_inside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        let inside = root.join("nested/file.bin");
        assert!(validate_within(&root, &inside).is_ok());
    }
}
