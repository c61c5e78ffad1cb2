//! The poll loop itself: walks descendants of a target PID and enforces
//! policy on first sight of each one. Spec §4.10.
//!
//! Grounded on `orchestrator`'s bounded `retry` helper — a sleep-backed loop
//! that keeps going across individual failures — generalized from "retry one
//! fallible operation a fixed number of times" into "poll indefinitely until
//! cancelled, treating every iteration's failures as independent."

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chainwatch_accumulator::TraceRegistry;
use chainwatch_approval::{ApprovalStatus, ApprovalStore, BreakGlassStore};
use chainwatch_audit::{AuditEntry, AuditLog};
use chainwatch_core::ids::new_trace_id;
use chainwatch_policy::classify::build_from_command;
use chainwatch_policy::{approval_key_for, PolicyHandle};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::rule::{builtin_rules, first_match, MonitorRule};
use crate::watcher::{ProcessInfo, Watcher};

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// Every decision this monitor makes is tier 3: a matched child process is
/// already inside the most irreversible category the policy model has.
const MONITOR_TIER: u8 = 3;
const MONITOR_PURPOSE: &str = "process_monitor";
const MONITOR_ACTOR: &str = "process_monitor";

/// Everything the poll loop needs: where to look, what to match against, and
/// where to record what it finds.
pub struct ProcessMonitor {
    watcher: Arc<dyn Watcher>,
    profile_rules: Vec<MonitorRule>,
    target_pid: u32,
    poll_interval: Duration,
    policy: Arc<PolicyHandle>,
    traces: Arc<TraceRegistry>,
    audit: Arc<AuditLog>,
    approvals: Arc<ApprovalStore>,
    break_glass: Arc<BreakGlassStore>,
    seen: AsyncMutex<HashSet<u32>>,
    trace_id: String,
}

impl ProcessMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        watcher: Arc<dyn Watcher>,
        target_pid: u32,
        profile_rules: Vec<MonitorRule>,
        policy: Arc<PolicyHandle>,
        traces: Arc<TraceRegistry>,
        audit: Arc<AuditLog>,
        approvals: Arc<ApprovalStore>,
        break_glass: Arc<BreakGlassStore>,
    ) -> Self {
        Self {
            watcher,
            profile_rules,
            target_pid,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            policy,
            traces,
            audit,
            approvals,
            break_glass,
            seen: AsyncMutex::new(HashSet::new()),
            trace_id: new_trace_id(),
        }
    }

    /// Override the default 100ms poll interval. Spec §4.10.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the poll loop until `cancel` fires. Each iteration is independent:
    /// a failure evaluating one process is logged and does not stop the next
    /// poll from happening.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = sleep(self.poll_interval) => {}
            }
            self.poll_once().await;
        }
    }

    /// One pass: enumerate children of the target PID, act on every one not
    /// already seen. Exposed separately from [`Self::run`] so tests can drive
    /// it deterministically without waiting on real sleeps.
    pub async fn poll_once(&self) {
        let children = self.watcher.children(self.target_pid);
        let mut unseen = Vec::new();
        {
            let mut seen = self.seen.lock().await;
            for child in children {
                if seen.insert(child.pid) {
                    unseen.push(child);
                }
            }
        }
        for child in unseen {
            self.evaluate_child(&child).await;
        }
    }

    async fn evaluate_child(&self, child: &ProcessInfo) {
        let builtin = builtin_rules();
        let Some(rule) = first_match(&builtin, &self.profile_rules, &child.command) else {
            return;
        };

        let mut tokens = child.command.split_whitespace();
        let name = tokens.next().unwrap_or_default();
        let args: Vec<String> = tokens.map(str::to_string).collect();
        let action = build_from_command(name, &args);
        let key = approval_key_for(&action, MONITOR_PURPOSE);

        let (decision, break_glass_token_id) = match self.approvals.check(&key) {
            Ok(ApprovalStatus::Approved) => {
                let _ = self.approvals.consume(&key);
                ("allow", None)
            }
            _ => match self.break_glass.check_and_consume(MONITOR_TIER, &action) {
                Some(token) => ("allow", Some(token.id)),
                None => {
                    if let Err(e) = self.watcher.kill(child.pid) {
                        warn!(pid = child.pid, error = %e, "failed to kill process matched by monitor rule");
                    }
                    if let Err(e) = self.approvals.request(&key, &rule.reason, "process_monitor", &action.resource) {
                        warn!(key, error = %e, "failed to persist approval request for killed process");
                    }
                    ("deny", None)
                }
            },
        };

        let accumulator = self.traces.get_or_create(&self.trace_id);
        let _event =
            accumulator.record_action(MONITOR_ACTOR, MONITOR_PURPOSE, action.clone(), None).with_decision(decision);

        let policy_hash = self.policy.load().config.policy_hash();
        let mut entry = AuditEntry::new(
            self.trace_id.clone(),
            action.tool.to_string(),
            action.resource.clone(),
            decision,
            rule.reason.clone(),
            MONITOR_TIER,
            policy_hash,
        )
        .with_type("process_monitor");
        if let Some(token_id) = break_glass_token_id {
            entry = entry.with_override("deny", "allow").with_token_id(token_id);
        }
        if let Err(e) = self.audit.record(entry) {
            error!(pid = child.pid, error = %e, "audit log write failed for process monitor decision");
        }

        info!(pid = child.pid, command = %child.command, decision, reason = %rule.reason, "process monitor decision");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chainwatch_policy::config::PolicyConfig;
    use chainwatch_policy::LoadedPolicy;

    use super::*;
    use crate::error::MonitorError;

    struct StubWatcher {
        children: Vec<ProcessInfo>,
        killed: StdMutex<Vec<u32>>,
    }

    impl Watcher for StubWatcher {
        fn children(&self, _pid: u32) -> Vec<ProcessInfo> {
            self.children.clone()
        }

        fn kill(&self, pid: u32) -> Result<(), MonitorError> {
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }
    }

    fn test_monitor(watcher: Arc<StubWatcher>, profile_rules: Vec<MonitorRule>) -> (ProcessMonitor, Arc<ApprovalStore>, Arc<BreakGlassStore>, Arc<AuditLog>) {
        let policy = Arc::new(PolicyHandle::new(LoadedPolicy { config: PolicyConfig::default(), denylist: Default::default() }));
        let traces = Arc::new(TraceRegistry::new());
        let audit_dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(audit_dir.path().join("audit.jsonl")).unwrap());
        let approvals_dir = tempfile::tempdir().unwrap();
        let approvals = Arc::new(ApprovalStore::open(approvals_dir.path()).unwrap());
        let bg_dir = tempfile::tempdir().unwrap();
        let break_glass = Arc::new(BreakGlassStore::open(bg_dir.path()).unwrap());
        std::mem::forget(audit_dir);
        std::mem::forget(approvals_dir);
        std::mem::forget(bg_dir);
        let monitor = ProcessMonitor::new(watcher, 1, profile_rules, policy, traces, audit.clone(), approvals.clone(), break_glass.clone());
        (monitor, approvals, break_glass, audit)
    }

    #[tokio::test]
    async fn unmatched_process_is_left_running_and_not_recorded() {
        let watcher = Arc::new(StubWatcher {
            children: vec![ProcessInfo { pid: 100, ppid: 1, command: "ls -la /tmp".into() }],
            killed: StdMutex::new(Vec::new()),
        });
        let (monitor, _approvals, _bg, audit) = test_monitor(watcher.clone(), vec![]);
        monitor.poll_once().await;
        assert!(watcher.killed.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(audit.path()).unwrap().lines().count(), 0);
    }

    #[tokio::test]
    async fn matched_process_with_no_approval_is_killed_and_approval_requested() {
        let watcher = Arc::new(StubWatcher {
            children: vec![ProcessInfo { pid: 101, ppid: 1, command: "shutdown -h now".into() }],
            killed: StdMutex::new(Vec::new()),
        });
        let (monitor, approvals, _bg, audit) = test_monitor(watcher.clone(), vec![]);
        monitor.poll_once().await;
        assert_eq!(watcher.killed.lock().unwrap().as_slice(), &[101]);
        assert_eq!(approvals.list().unwrap().len(), 1);
        assert_eq!(std::fs::read_to_string(audit.path()).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn each_pid_is_evaluated_only_once() {
        let watcher = Arc::new(StubWatcher {
            children: vec![ProcessInfo { pid: 102, ppid: 1, command: "reboot".into() }],
            killed: StdMutex::new(Vec::new()),
        });
        let (monitor, _approvals, _bg, _audit) = test_monitor(watcher.clone(), vec![]);
        monitor.poll_once().await;
        monitor.poll_once().await;
        assert_eq!(watcher.killed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn an_existing_approval_allows_the_process_without_killing_it() {
        let watcher = Arc::new(StubWatcher {
            children: vec![ProcessInfo { pid: 103, ppid: 1, command: "mkfs.ext4 /dev/sdb1".into() }],
            killed: StdMutex::new(Vec::new()),
        });
        let (monitor, approvals, _bg, _audit) = test_monitor(watcher.clone(), vec![]);
        let action = build_from_command("mkfs.ext4", &["/dev/sdb1".to_string()]);
        let key = approval_key_for(&action, MONITOR_PURPOSE);
        approvals.request(&key, "pre-approved maintenance", "process_monitor", &action.resource).unwrap();
        approvals.approve(&key, Some(60)).unwrap();

        monitor.poll_once().await;
        assert!(watcher.killed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn an_active_break_glass_token_allows_the_process_without_killing_it() {
        let watcher = Arc::new(StubWatcher {
            children: vec![ProcessInfo { pid: 104, ppid: 1, command: "reboot".into() }],
            killed: StdMutex::new(Vec::new()),
        });
        let (monitor, _approvals, break_glass, _audit) = test_monitor(watcher.clone(), vec![]);
        break_glass.create("planned maintenance window", None).unwrap();

        monitor.poll_once().await;
        assert!(watcher.killed.lock().unwrap().is_empty());
    }
}
