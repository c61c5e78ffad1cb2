//! `PolicyConfig` and `Denylist` as they arrive from the YAML-owning collaborator,
//! plus the policy hash that threads provenance through every audit entry.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::denylist::Denylist;

/// Errors raised loading or validating a [`PolicyConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open policy file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("malformed policy YAML in {path}: {source}")]
    Yaml { path: String, #[source] source: serde_yaml::Error },
    #[error("rules[{index}].resource_pattern is not a valid glob: {source}")]
    InvalidGlob { index: usize, #[source] source: globset::Error },
}

/// Operator-selected enforcement posture. See spec §4.4 step 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    Locked,
    Guarded,
    Relaxed,
}

impl Default for EnforcementMode {
    fn default() -> Self {
        EnforcementMode::Guarded
    }
}

/// The decision taxonomy a [`Rule`] or the evaluator as a whole can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    RequireApproval,
    AllowWithRedaction,
}

/// One operator-declared rule. Rules are evaluated in declaration order; first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// `"*"` matches any purpose.
    pub purpose: String,
    /// Case-insensitive glob (`*` wildcard) matched against the action's resource string.
    pub resource_pattern: String,
    pub decision: Decision,
    pub reason: String,
    #[serde(default)]
    pub approval_key: Option<String>,
    pub tier: u8,
}

/// An external alert destination; the core only carries the configuration through —
/// delivery is a collaborator's responsibility (spec §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTarget {
    pub name: String,
    pub webhook_url: String,
}

/// Operator rules, consumed as a pre-parsed struct per spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub enforcement_mode: EnforcementMode,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub alerts: Option<Vec<AlertTarget>>,
    /// Minimum zone tier (0..=3) that escalates an otherwise-allowed action to
    /// `RequireApproval`. Defaults to 2 (`Guarded`/`Sensitive`) per spec §4.4 step 5.
    #[serde(default)]
    pub approval_threshold: Option<u8>,
}

impl PolicyConfig {
    /// Load and validate a policy configuration from a YAML file.
    pub fn load_from_yaml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .map_err(|source| ConfigError::Io { path: path_ref.display().to_string(), source })?;
        let config: PolicyConfig = serde_yaml::from_reader(BufReader::new(file))
            .map_err(|source| ConfigError::Yaml { path: path_ref.display().to_string(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every rule's `resource_pattern` compiles as a glob.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, rule) in self.rules.iter().enumerate() {
            globset::GlobBuilder::new(&rule.resource_pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::InvalidGlob { index, source })?;
        }
        Ok(())
    }

    /// `sha256` of this config's canonical-JSON serialization, prefixed `"sha256:"`.
    /// Carried through every [`crate::PolicyResult`] and, downstream, every audit entry.
    pub fn policy_hash(&self) -> String {
        let canonical =
            serde_json::to_vec(self).expect("PolicyConfig serialization cannot fail");
        let digest = Sha256::digest(&canonical);
        format!("sha256:{}", hex::encode(digest))
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enforcement_mode: EnforcementMode::default(),
            rules: Vec::new(),
            alerts: None,
            approval_threshold: None,
        }
    }
}

/// Both operator rules and the denylist they're evaluated alongside, as loaded
/// from the YAML-owning collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedPolicy {
    pub config: PolicyConfig,
    pub denylist: Denylist,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_hash_is_deterministic() {
        let config = PolicyConfig::default();
        assert_eq!(config.policy_hash(), config.policy_hash());
        assert!(config.policy_hash().starts_with("sha256:"));
    }

    #[test]
    fn policy_hash_changes_with_content() {
        let a = PolicyConfig::default();
        let mut b = PolicyConfig::default();
        b.rules.push(Rule {
            purpose: "*".into(),
            resource_pattern: "*".into(),
            decision: Decision::Deny,
            reason: "test".into(),
            approval_key: None,
            tier: 3,
        });
        assert_ne!(a.policy_hash(), b.policy_hash());
    }

    #[test]
    fn invalid_glob_rejected() {
        let mut config = PolicyConfig::default();
        config.rules.push(Rule {
            purpose: "*".into(),
            resource_pattern: "[".into(),
            decision: Decision::Deny,
            reason: "test".into(),
            approval_key: None,
            tier: 3,
        });
        assert!(config.validate().is_err());
    }
}
