//! Built-in and operator-supplied process match rules. Spec §4.10: "match
//! against the active rule set (built-in rules + profile rules)".

use globset::GlobBuilder;
use serde::{Deserialize, Serialize};

/// One glob pattern a watched process's full command line is matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorRule {
    pub pattern: String,
    pub reason: String,
}

impl MonitorRule {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), reason: reason.into() }
    }

    fn matches(&self, command: &str) -> bool {
        GlobBuilder::new(&self.pattern)
            .case_insensitive(true)
            .build()
            .map(|glob| glob.compile_matcher().is_match(command))
            .unwrap_or(false)
    }
}

/// Rules chainwatch ships regardless of operator configuration: processes
/// that would tear down the host or destroy data outright if let through.
pub fn builtin_rules() -> Vec<MonitorRule> {
    vec![
        MonitorRule::new("*mkfs*", "filesystem format utility spawned"),
        MonitorRule::new("*dd if=* of=/dev/*", "raw write to a block device via dd"),
        MonitorRule::new("shutdown*", "host shutdown requested"),
        MonitorRule::new("reboot*", "host reboot requested"),
        MonitorRule::new("*rm -rf /*", "recursive delete rooted at the filesystem root"),
        MonitorRule::new("kill -9 1", "attempt to kill the init process"),
    ]
}

/// The first rule — built-in rules checked before profile rules, in list
/// order within each — whose pattern matches `command`.
pub fn first_match<'a>(builtin: &'a [MonitorRule], profile: &'a [MonitorRule], command: &str) -> Option<&'a MonitorRule> {
    builtin.iter().chain(profile.iter()).find(|rule| rule.matches(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rule_matches_mkfs_invocation() {
        let builtin = builtin_rules();
        let matched = first_match(&builtin, &[], "mkfs.ext4 /dev/sdb1");
        assert!(matched.is_some());
    }

    #[test]
    fn unmatched_command_returns_none() {
        let builtin = builtin_rules();
        assert!(first_match(&builtin, &[], "ls -la /tmp").is_none());
    }

    #[test]
    fn profile_rule_extends_builtin_set() {
        let builtin = builtin_rules();
        let profile = vec![MonitorRule::new("*curl*evil*", "operator-flagged exfiltration pattern")];
        assert!(first_match(&builtin, &profile, "curl https://evil.example.com").is_some());
        assert!(first_match(&builtin, &profile, "curl https://example.com").is_none());
    }

    #[test]
    fn builtin_rules_are_checked_before_profile_rules() {
        let builtin = builtin_rules();
        let profile = vec![MonitorRule::new("shutdown*", "operator variant, should be unreachable")];
        let matched = first_match(&builtin, &profile, "shutdown -h now").unwrap();
        assert_eq!(matched.reason, "host shutdown requested");
    }
}
