//! Write-to-temp + atomic-rename discipline shared by the approval and
//! break-glass stores. Grounded on the teacher's blob store: a temp file in
//! the same directory, `fsync`, `fs::rename`, then `fsync` the parent
//! directory so the rename itself survives a crash.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chainwatch_core::ids::next_monotonic_id;

use crate::error::ApprovalError;

/// A key or token id is valid as a file name component: non-empty, contains
/// no `..`, and uses only `[A-Za-z0-9-]`.
pub fn validate_key(key: &str) -> Result<(), ApprovalError> {
    let valid = !key.is_empty()
        && !key.contains("..")
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ApprovalError::InvalidKey(key.to_string()))
    }
}

/// Ensure `dir` exists with owner-only permissions (mode `0700` on unix).
pub fn ensure_owner_only_dir(dir: &Path) -> Result<(), ApprovalError> {
    fs::create_dir_all(dir)?;
    set_owner_only(dir)?;
    Ok(())
}

/// Write `bytes` to `path` via a same-directory temp file, `fsync`, then an
/// atomic rename over any existing file at `path`. Used for both first writes
/// (`Request`, `Create`) and subsequent mutations (`Approve`, `Deny`,
/// `Consume`) — the rename is atomic either way.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ApprovalError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(".{}.tmp-{:x}", file_name(path), next_monotonic_id()));

    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

/// List every regular file directly under `dir` whose name ends in `.json`,
/// ignoring temp files left by a crashed writer (`.`-prefixed).
pub fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>, ApprovalError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
        let is_temp = path.file_name().map(|n| n.to_string_lossy().starts_with('.')).unwrap_or(true);
        if is_json && !is_temp {
            out.push(path);
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn set_owner_only(dir: &Path) -> Result<(), ApprovalError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(dir)?.permissions();
    perms.set_mode(0o700);
    fs::set_permissions(dir, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_dir: &Path) -> Result<(), ApprovalError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys_accepted() {
        assert!(validate_key("abc-123").is_ok());
        assert!(validate_key("DenyKey-9").is_ok());
    }

    #[test]
    fn empty_key_rejected() {
        assert!(validate_key("").is_err());
    }

    #[test]
    fn traversal_rejected() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a..b").is_err());
    }

    #[test]
    fn disallowed_characters_rejected() {
        assert!(validate_key("has space").is_err());
        assert!(validate_key("slash/here").is_err());
        assert!(validate_key("semi;colon").is_err());
    }

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key1.json");
        atomic_write(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn atomic_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key1.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn list_json_files_ignores_temp_and_non_json() {
        let dir = tempfile::tempdir().unwrap();
        atomic_write(&dir.path().join("a.json"), b"{}").unwrap();
        atomic_write(&dir.path().join("b.json"), b"{}").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hi").unwrap();
        let files = list_json_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }
}
