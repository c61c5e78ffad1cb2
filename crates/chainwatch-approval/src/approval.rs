//! On-disk approval store. Spec §4.6: file-per-key under an owner-only
//! directory, coordinated across processes by write-to-temp + atomic rename.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chainwatch_core::ids::now_ms;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApprovalError;
use crate::fs_util::{atomic_write, ensure_owner_only_dir, list_json_files, validate_key};

/// Lifecycle status of one approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// One persisted approval record. Spec §3 `Approval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub key: String,
    pub status: ApprovalStatus,
    pub reason: String,
    pub policy_id: String,
    pub resource: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// `true` for an approval whose `Approve(duration=0)` made it single-use:
    /// the next positive `Check` consumes it.
    #[serde(default)]
    pub single_use: bool,
}

/// File-per-key on-disk coordination of pending/approved/denied requests. A
/// process-wide mutex serializes this process's own mutations; concurrent
/// processes rely on the atomic rename and on re-reading the file for truth.
pub struct ApprovalStore {
    dir: PathBuf,
    guard: Mutex<()>,
}

impl ApprovalStore {
    /// Open (creating if absent) the approval directory at `dir`, owner-only.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ApprovalError> {
        let dir = dir.as_ref().to_path_buf();
        ensure_owner_only_dir(&dir)?;
        Ok(Self { dir, guard: Mutex::new(()) })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Create a pending approval for `key` if it doesn't already exist in any
    /// status. Idempotent: a second `Request` for the same key is a no-op.
    pub fn request(&self, key: &str, reason: &str, policy_id: &str, resource: &str) -> Result<(), ApprovalError> {
        validate_key(key)?;
        let _guard = self.guard.lock().expect("approval store mutex poisoned");

        if self.read(key)?.is_some() {
            return Ok(());
        }

        let approval = Approval {
            key: key.to_string(),
            status: ApprovalStatus::Pending,
            reason: reason.to_string(),
            policy_id: policy_id.to_string(),
            resource: resource.to_string(),
            created_at: now_ms(),
            expires_at: None,
            single_use: false,
        };
        self.write(&approval)?;
        info!(key, policy_id, "approval requested");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Approval>, ApprovalError> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, approval: &Approval) -> Result<(), ApprovalError> {
        let bytes = serde_json::to_vec(approval)?;
        atomic_write(&self.path_for(&approval.key), &bytes)
    }

    /// Current status of `key`, materializing an `Expired` transition if
    /// `expires_at` has passed or a single-use approval was just consumed.
    pub fn check(&self, key: &str) -> Result<ApprovalStatus, ApprovalError> {
        validate_key(key)?;
        let _guard = self.guard.lock().expect("approval store mutex poisoned");
        let Some(approval) = self.read(key)? else {
            return Err(ApprovalError::NotFound(key.to_string()));
        };

        if approval.status == ApprovalStatus::Approved {
            if let Some(expires_at) = approval.expires_at {
                if expires_at <= now_ms() {
                    let mut expired = approval;
                    expired.status = ApprovalStatus::Expired;
                    self.write(&expired)?;
                    return Ok(ApprovalStatus::Expired);
                }
            }
            if approval.single_use {
                let mut consumed = approval.clone();
                consumed.status = ApprovalStatus::Expired;
                self.write(&consumed)?;
                info!(key, "single-use approval consumed on check");
                return Ok(ApprovalStatus::Approved);
            }
        }
        Ok(approval.status)
    }

    /// Approve `key`. `duration` of `None` or `Some(0)` makes the approval
    /// single-use (consumed on the next positive `check`); otherwise it
    /// expires `duration` seconds from now.
    pub fn approve(&self, key: &str, duration_secs: Option<u64>) -> Result<(), ApprovalError> {
        validate_key(key)?;
        let _guard = self.guard.lock().expect("approval store mutex poisoned");
        let Some(mut approval) = self.read(key)? else {
            return Err(ApprovalError::NotFound(key.to_string()));
        };
        approval.status = ApprovalStatus::Approved;
        match duration_secs {
            None | Some(0) => {
                approval.single_use = true;
                approval.expires_at = None;
            }
            Some(secs) => {
                approval.single_use = false;
                approval.expires_at = Some(now_ms() + secs * 1000);
            }
        }
        self.write(&approval)?;
        info!(key, "approval granted");
        Ok(())
    }

    /// Deny `key`.
    pub fn deny(&self, key: &str) -> Result<(), ApprovalError> {
        validate_key(key)?;
        let _guard = self.guard.lock().expect("approval store mutex poisoned");
        let Some(mut approval) = self.read(key)? else {
            return Err(ApprovalError::NotFound(key.to_string()));
        };
        approval.status = ApprovalStatus::Denied;
        self.write(&approval)?;
        info!(key, "approval denied");
        Ok(())
    }

    /// Explicitly consume a single-use approval, transitioning
    /// `Approved -> Expired`. A no-op if the approval isn't single-use-approved.
    pub fn consume(&self, key: &str) -> Result<(), ApprovalError> {
        validate_key(key)?;
        let _guard = self.guard.lock().expect("approval store mutex poisoned");
        let Some(mut approval) = self.read(key)? else {
            return Err(ApprovalError::NotFound(key.to_string()));
        };
        if approval.status == ApprovalStatus::Approved && approval.single_use {
            approval.status = ApprovalStatus::Expired;
            self.write(&approval)?;
        }
        Ok(())
    }

    /// Every approval record that is not `Expired`.
    pub fn list(&self) -> Result<Vec<Approval>, ApprovalError> {
        let _guard = self.guard.lock().expect("approval store mutex poisoned");
        let mut out = Vec::new();
        for path in list_json_files(&self.dir)? {
            let bytes = std::fs::read(&path)?;
            let approval: Approval = serde_json::from_slice(&bytes)?;
            if approval.status != ApprovalStatus::Expired {
                out.push(approval);
            }
        }
        Ok(out)
    }

    /// Remove `Expired` or `Denied` records whose `created_at` is older than
    /// `retention_secs`. Returns the number of files removed.
    pub fn cleanup(&self, retention_secs: u64) -> Result<u64, ApprovalError> {
        let _guard = self.guard.lock().expect("approval store mutex poisoned");
        let cutoff = now_ms().saturating_sub(retention_secs * 1000);
        let mut removed = 0;
        for path in list_json_files(&self.dir)? {
            let bytes = std::fs::read(&path)?;
            let approval: Approval = serde_json::from_slice(&bytes)?;
            let stale = matches!(approval.status, ApprovalStatus::Expired | ApprovalStatus::Denied)
                && approval.created_at < cutoff;
            if stale {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
