//! One-shot, time-bounded override tokens. Spec §4.7. Same atomic-rename
//! discipline as the approval store; a separate directory and file set.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chainwatch_core::ids::{new_token_id, now_ms};
use chainwatch_core::Action;
use chainwatch_policy::is_self_targeting;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::BreakGlassError;
use crate::fs_util::{atomic_write, ensure_owner_only_dir, list_json_files, validate_key};

const DEFAULT_DURATION_SECS: u64 = 10 * 60;
const MAX_DURATION_SECS: u64 = 60 * 60;

/// Minimum severity tier at which a break-glass override may be consulted at
/// all. Tiers below this never reach break-glass; the caller should have
/// already allowed the action outright.
pub const MIN_TIER_FOR_BREAK_GLASS: u8 = 2;

/// One persisted break-glass token. Spec §3 `Token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub reason: String,
    pub created_at: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<u64>,
}

impl Token {
    /// Active iff not expired, not used, and not revoked.
    pub fn is_active(&self) -> bool {
        self.expires_at > now_ms() && self.used_at.is_none() && self.revoked_at.is_none()
    }
}

/// File-per-token on-disk store for break-glass overrides.
pub struct BreakGlassStore {
    dir: PathBuf,
    guard: Mutex<()>,
}

impl BreakGlassStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, BreakGlassError> {
        let dir = dir.as_ref().to_path_buf();
        ensure_owner_only_dir(&dir).map_err(to_break_glass_error)?;
        Ok(Self { dir, guard: Mutex::new(()) })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Mint a new token. `reason` must be non-empty. `duration_secs` is
    /// clamped into `[10 min, 1 h]`; `None` defaults to 10 minutes.
    pub fn create(&self, reason: &str, duration_secs: Option<u64>) -> Result<Token, BreakGlassError> {
        if reason.trim().is_empty() {
            return Err(BreakGlassError::EmptyReason);
        }
        let clamped = duration_secs.unwrap_or(DEFAULT_DURATION_SECS).clamp(DEFAULT_DURATION_SECS, MAX_DURATION_SECS);
        let _guard = self.guard.lock().expect("break-glass store mutex poisoned");

        let now = now_ms();
        let token = Token {
            id: new_token_id(),
            reason: reason.to_string(),
            created_at: now,
            expires_at: now + clamped * 1000,
            used_at: None,
            revoked_at: None,
        };
        self.write(&token)?;
        info!(id = %token.id, "break-glass token created");
        Ok(token)
    }

    fn read(&self, id: &str) -> Result<Option<Token>, BreakGlassError> {
        let path = self.path_for(id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, token: &Token) -> Result<(), BreakGlassError> {
        let bytes = serde_json::to_vec(token)?;
        atomic_write(&self.path_for(&token.id), &bytes).map_err(to_break_glass_error)
    }

    /// The first active token found, if any.
    pub fn find_active(&self) -> Result<Option<Token>, BreakGlassError> {
        let _guard = self.guard.lock().expect("break-glass store mutex poisoned");
        for path in list_json_files(&self.dir).map_err(to_break_glass_error)? {
            let bytes = std::fs::read(&path)?;
            let token: Token = serde_json::from_slice(&bytes)?;
            if token.is_active() {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    /// Mark `id` used. Fails (returns `Expired` or `NotFound`) rather than
    /// double-consuming an already-used, revoked, or expired token.
    pub fn consume(&self, id: &str) -> Result<Token, BreakGlassError> {
        validate_key(id).map_err(|_| BreakGlassError::InvalidId(id.to_string()))?;
        let _guard = self.guard.lock().expect("break-glass store mutex poisoned");
        let Some(mut token) = self.read(id)? else {
            return Err(BreakGlassError::NotFound(id.to_string()));
        };
        if !token.is_active() {
            return Err(BreakGlassError::Expired(id.to_string()));
        }
        token.used_at = Some(now_ms());
        self.write(&token)?;
        info!(id = %token.id, "break-glass token consumed");
        Ok(token)
    }

    /// Find-and-consume an active token for an override attempt, subject to
    /// the Law of Self-Preservation and a minimum tier. Fail-closed: any
    /// refusal or consume failure returns `None`, never an error.
    pub fn check_and_consume(&self, tier: u8, action: &Action) -> Option<Token> {
        if tier < MIN_TIER_FOR_BREAK_GLASS {
            return None;
        }
        if is_self_targeting(action) {
            warn!(tool = %action.tool, resource = %action.resource, "break-glass refused: action is self-targeting");
            return None;
        }
        let active = self.find_active().ok().flatten()?;
        self.consume(&active.id).ok()
    }
}

/// `fs_util` helpers are shared with the approval store and return
/// [`crate::error::ApprovalError`]; this store re-homes that error onto its
/// own error type rather than exposing the approval store's error in its API.
fn to_break_glass_error(e: crate::error::ApprovalError) -> BreakGlassError {
    match e {
        crate::error::ApprovalError::Io(io) => BreakGlassError::Io(io),
        crate::error::ApprovalError::Serde(serde) => BreakGlassError::Serde(serde),
        crate::error::ApprovalError::InvalidKey(key) => BreakGlassError::InvalidId(key),
        crate::error::ApprovalError::NotFound(key) => BreakGlassError::NotFound(key),
    }
}
