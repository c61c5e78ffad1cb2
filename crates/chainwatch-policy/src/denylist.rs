//! The three-pattern-set denylist matcher described in spec §4.4 step 2.

use std::fmt;

use chainwatch_core::{Action, ToolCategory};
use serde::{Deserialize, Serialize};

/// Which pattern set a [`DenylistHit`] matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenylistKind {
    Command,
    Url,
    Path,
}

impl fmt::Display for DenylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenylistKind::Command => "command",
            DenylistKind::Url => "url",
            DenylistKind::Path => "path",
        };
        write!(f, "{s}")
    }
}

/// A denylist match: which set fired and the exact pattern that fired it.
#[derive(Debug, Clone, PartialEq)]
pub struct DenylistHit {
    pub kind: DenylistKind,
    pub pattern: String,
}

/// Three pattern sets: commands, URLs, paths. Deserialized directly from the
/// operator's YAML configuration (see `chainwatch_policy::config`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Denylist {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Denylist {
    /// Check `action` against the pattern set appropriate to its tool category.
    ///
    /// Command matching is substring against the lower-cased full command line;
    /// URL matching is hostname-or-substring; path matching is prefix.
    pub fn matches(&self, action: &Action) -> Option<DenylistHit> {
        let lower = action.resource_lower();
        match action.tool {
            ToolCategory::Command | ToolCategory::Syscall => self
                .commands
                .iter()
                .find(|pattern| lower.contains(pattern.to_lowercase().as_str()))
                .map(|pattern| DenylistHit { kind: DenylistKind::Command, pattern: pattern.clone() }),
            ToolCategory::Http | ToolCategory::HttpProxy | ToolCategory::Browser => {
                let host = action.raw_meta.destination.as_deref().map(str::to_lowercase);
                self.urls
                    .iter()
                    .find(|pattern| {
                        let pattern_lower = pattern.to_lowercase();
                        host.as_deref().is_some_and(|h| h == pattern_lower || h.ends_with(&format!(".{pattern_lower}")))
                            || lower.contains(&pattern_lower)
                    })
                    .map(|pattern| DenylistHit { kind: DenylistKind::Url, pattern: pattern.clone() })
            }
            ToolCategory::FileRead | ToolCategory::FileWrite | ToolCategory::FileDelete => self
                .paths
                .iter()
                .find(|pattern| lower.starts_with(pattern.to_lowercase().as_str()))
                .map(|pattern| DenylistHit { kind: DenylistKind::Path, pattern: pattern.clone() }),
            ToolCategory::Custom(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::build_from_command;

    #[test]
    fn command_substring_match() {
        let denylist = Denylist { commands: vec!["mkfs".into()], ..Default::default() };
        let action = build_from_command("mkfs", &["-t".into(), "ext4".into(), "/dev/sdb1".into()]);
        let hit = denylist.matches(&action).expect("should match");
        assert_eq!(hit.kind, DenylistKind::Command);
    }

    #[test]
    fn no_match_returns_none() {
        let denylist = Denylist { commands: vec!["mkfs".into()], ..Default::default() };
        let action = build_from_command("ls", &["-la".into()]);
        assert!(denylist.matches(&action).is_none());
    }

    #[test]
    fn url_hostname_match() {
        let denylist = Denylist { urls: vec!["evil.example.com".into()], ..Default::default() };
        let action = crate::classify::build_from_tool_call(
            "fetch_url",
            &serde_json::json!({"url": "https://evil.example.com/steal"})
                .as_object()
                .unwrap()
                .clone(),
        );
        let hit = denylist.matches(&action).expect("should match");
        assert_eq!(hit.kind, DenylistKind::Url);
    }

    #[test]
    fn path_prefix_match() {
        let denylist = Denylist { paths: vec!["/etc/".into()], ..Default::default() };
        let action = crate::classify::build_from_tool_call(
            "read_file",
            &serde_json::json!({"path": "/etc/shadow"}).as_object().unwrap().clone(),
        );
        let hit = denylist.matches(&action).expect("should match");
        assert_eq!(hit.kind, DenylistKind::Path);
    }
}
