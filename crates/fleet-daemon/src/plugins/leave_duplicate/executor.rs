//! Sequential plan execution with randomized pacing

use super::planner::{GuildPartitionPlan, PlanEntry};
use crate::adapter::ErasedPlatformAdapter;
use futures_util::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters for one executed plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub entries_executed: usize,
    pub leaves_succeeded: usize,
    pub leaves_failed: usize,
    pub notices_sent: usize,
    /// Stopped early because the run was superseded or shut down
    pub aborted: bool,
}

/// Executes plan entries one after another.
///
/// Between entries it waits a random delay in `[min_delay, max_delay]`. For
/// each entry the staying account posts the notice to the first target that
/// accepts it, then all leaving accounts leave concurrently. Failures are
/// logged and never stop the run.
#[derive(Debug, Clone)]
pub struct LeaveExecutor {
    adapter: Arc<dyn ErasedPlatformAdapter>,
    notice: String,
    min_delay: Duration,
    max_delay: Duration,
}

impl LeaveExecutor {
    pub fn new(
        adapter: Arc<dyn ErasedPlatformAdapter>,
        notice: impl Into<String>,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            adapter,
            notice: notice.into(),
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    fn next_delay(&self) -> Duration {
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    /// Run every entry unless `cancel` fires first. Cancellation is checked
    /// before each entry and during the pause between entries.
    pub async fn execute(&self, plan: GuildPartitionPlan, cancel: &CancellationToken) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for (index, entry) in plan.into_iter().enumerate() {
            if index > 0 {
                let delay = self.next_delay();
                debug!("Waiting {delay:?} before next entry");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                info!("Run aborted before {}", entry.group);
                report.aborted = true;
                break;
            }

            self.execute_entry(&entry, &mut report).await;
            report.entries_executed += 1;
        }

        report
    }

    async fn execute_entry(&self, entry: &PlanEntry, report: &mut ExecutionReport) {
        let names: Vec<String> = entry.leaving.iter().map(|a| a.id.clone()).collect();
        info!(
            "Quitting {} from {} ({} stays)",
            names.join(" & "),
            entry.group,
            entry.staying.id
        );

        for target in &entry.notify_targets {
            match self
                .adapter
                .send_notification(&entry.staying, target, &self.notice)
                .await
            {
                Ok(()) => {
                    report.notices_sent += 1;
                    break;
                }
                Err(e) => warn!("Failed to notify {target} as {}: {e}", entry.staying),
            }
        }

        let leaves = entry.leaving.iter().map(|account| async move {
            (account, self.adapter.leave_group(account, &entry.group).await)
        });
        for (account, result) in join_all(leaves).await {
            match result {
                Ok(()) => report.leaves_succeeded += 1,
                Err(e) => {
                    warn!("Failed to make {account} leave {}: {e}", entry.group);
                    report.leaves_failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MockAdapter, MockCall};
    use fleet_core::{Account, GroupRef, NotifyTarget};

    fn acct(id: &str) -> Account {
        Account::new(id, "onebot11")
    }

    fn entry(group: &str, staying: &str, leaving: &[&str]) -> PlanEntry {
        PlanEntry {
            group: GroupRef::group(group),
            staying: acct(staying),
            leaving: leaving.iter().map(|id| acct(id)).collect(),
            notify_targets: vec![NotifyTarget::Group {
                group_id: group.to_string(),
            }],
        }
    }

    fn executor(mock: &MockAdapter) -> LeaveExecutor {
        LeaveExecutor::new(
            Arc::new(mock.clone()),
            "bye",
            Duration::from_secs(5),
            Duration::from_secs(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_notifies_then_leaves() {
        let mock = MockAdapter::new("onebot11");
        let plan = GuildPartitionPlan::new(vec![entry("2", "A", &["B"]), entry("3", "A", &["B", "C"])]);

        let report = executor(&mock).execute(plan, &CancellationToken::new()).await;

        assert_eq!(report.entries_executed, 2);
        assert_eq!(report.leaves_succeeded, 3);
        assert_eq!(report.notices_sent, 2);
        assert!(!report.aborted);

        let calls = mock.calls();
        assert!(matches!(&calls[0], MockCall::SendNotification(a, _, text) if a.id == "A" && text == "bye"));
        assert!(matches!(&calls[1], MockCall::LeaveGroup(a, g) if a.id == "B" && g.id == "2"));
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn test_entry_is_logged() {
        let mock = MockAdapter::new("onebot11");
        let plan = GuildPartitionPlan::new(vec![entry("3", "A", &["B", "C"])]);
        executor(&mock).execute(plan, &CancellationToken::new()).await;
        assert!(logs_contain("Quitting B & C from"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_entries_is_bounded() {
        let mock = MockAdapter::new("onebot11");
        let plan = GuildPartitionPlan::new(vec![
            entry("1", "A", &["B"]),
            entry("2", "A", &["B"]),
            entry("3", "A", &["B"]),
        ]);

        let start = tokio::time::Instant::now();
        executor(&mock).execute(plan, &CancellationToken::new()).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(20), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_failure_is_isolated() {
        let mock = MockAdapter::new("onebot11");
        mock.fail_leave_for("B");
        let plan = GuildPartitionPlan::new(vec![entry("3", "A", &["B", "C"]), entry("4", "A", &["C"])]);

        let report = executor(&mock).execute(plan, &CancellationToken::new()).await;

        assert_eq!(report.entries_executed, 2);
        assert_eq!(report.leaves_failed, 1);
        assert_eq!(report.leaves_succeeded, 2);
        let leaves = mock.leave_calls();
        assert!(leaves.contains(&("C".to_string(), GroupRef::group("3"))));
        assert!(leaves.contains(&("C".to_string(), GroupRef::group("4"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_stops_at_first_success_and_failure_does_not_block_leave() {
        let mock = MockAdapter::new("qqguild");
        let t1 = NotifyTarget::Channel {
            guild_id: "g".into(),
            channel_id: "c1".into(),
        };
        let t2 = NotifyTarget::Channel {
            guild_id: "g".into(),
            channel_id: "c2".into(),
        };
        let t3 = NotifyTarget::Channel {
            guild_id: "g".into(),
            channel_id: "c3".into(),
        };
        mock.fail_notify_to(t1.clone());

        let mut e = entry("g", "A", &["B"]);
        e.group = GroupRef::guild("g");
        e.notify_targets = vec![t1.clone(), t2.clone(), t3];
        let report = executor(&mock)
            .execute(GuildPartitionPlan::new(vec![e.clone()]), &CancellationToken::new())
            .await;
        assert_eq!(report.notices_sent, 1);
        let notified: Vec<NotifyTarget> = mock.notify_calls().into_iter().map(|(_, t, _)| t).collect();
        assert_eq!(notified, vec![t1.clone(), t2.clone()]);

        // Every target failing still leaves
        mock.clear_calls();
        mock.fail_notify_to(t2.clone());
        e.notify_targets = vec![t1, t2];
        let report = executor(&mock)
            .execute(GuildPartitionPlan::new(vec![e]), &CancellationToken::new())
            .await;
        assert_eq!(report.notices_sent, 0);
        assert_eq!(report.leaves_succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay_aborts_remaining_entries() {
        let mock = MockAdapter::new("onebot11");
        let plan = GuildPartitionPlan::new(vec![entry("1", "A", &["B"]), entry("2", "A", &["B"])]);
        let cancel = CancellationToken::new();

        let exec = executor(&mock);
        let trigger = cancel.clone();
        let handle = tokio::spawn(async move { exec.execute(plan, &cancel).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();

        let report = handle.await.unwrap();
        assert!(report.aborted);
        assert_eq!(report.entries_executed, 1);
        assert_eq!(mock.leave_calls(), vec![("B".to_string(), GroupRef::group("1"))]);
    }

    #[tokio::test]
    async fn test_pre_cancelled_executes_nothing() {
        let mock = MockAdapter::new("onebot11");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = executor(&mock)
            .execute(GuildPartitionPlan::new(vec![entry("1", "A", &["B"])]), &cancel)
            .await;
        assert!(report.aborted);
        assert_eq!(report.entries_executed, 0);
        assert!(mock.calls().is_empty());
    }
}
