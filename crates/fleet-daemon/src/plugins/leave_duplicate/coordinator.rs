//! Trigger coalescing and per-family serialization of arbitration runs
//!
//! Each trigger key (a family for connect/disconnect, a family+group pair
//! for joins) has at most one pending run. A new trigger on the same key
//! cancels the previous one: a run still in its debounce window is dropped,
//! a run already executing stops at its next await point. Runs of the same
//! family never overlap: they take the family run lock after the debounce.
//!
//! A join also interrupts a family run in progress and reschedules it. The
//! group being joined belongs to the join run: family runs leave it out of
//! their plan while that join is pending.

use super::config::LeaveDuplicateConfig;
use super::executor::{ExecutionReport, LeaveExecutor};
use super::fetcher::MembershipFetcher;
use super::notify::resolve_notify_targets;
use super::planner::{self, GuildPartitionPlan};
use crate::adapter::{AccountDirectory, AdapterRegistry, ErasedPlatformAdapter};
use fleet_core::{Account, GroupRef};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What caused a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Connected(Account),
    Disconnected(Account),
    Joined { account: Account, group: GroupRef },
    /// Operator-requested run for a whole family
    Manual { platform: String },
}

impl Trigger {
    pub fn platform(&self) -> &str {
        match self {
            Trigger::Connected(account) | Trigger::Disconnected(account) => &account.platform,
            Trigger::Joined { account, .. } => &account.platform,
            Trigger::Manual { platform } => platform,
        }
    }

    fn key(&self) -> TriggerKey {
        match self {
            Trigger::Joined { account, group } => TriggerKey::Join {
                platform: account.platform.clone(),
                group: group.clone(),
            },
            other => TriggerKey::Family(other.platform().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TriggerKey {
    Family(String),
    Join { platform: String, group: GroupRef },
}

/// Observable state of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    /// A newer trigger cancelled the executing run; it has not unwound yet
    AbortRequested,
}

/// Why a run did nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No adapter for the platform, or it cannot leave groups
    Unsupported,
    /// Fewer than two accounts to compare
    NotEnoughAccounts,
    /// The joining account is no longer connected
    JoinerGone,
    /// Nobody else of the family is in the joined group, or the joiner
    /// already left it
    NothingToDo,
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub platform: String,
    pub accounts_considered: usize,
    pub accounts_fetched: usize,
    pub entries_planned: usize,
    pub execution: ExecutionReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    Skipped(SkipReason),
    /// Replaced by a newer trigger, or cancelled by shutdown
    Superseded,
    /// The run panicked
    Failed(String),
}

/// Handle to a scheduled run
#[derive(Debug)]
pub struct RunHandle {
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Wait for the run to finish
    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Arbitration run task failed: {e}");
                RunOutcome::Failed(e.to_string())
            }
        }
    }
}

/// The run currently holding a family's run lock
#[derive(Debug)]
struct ActiveRun {
    trigger: Trigger,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct FamilyState {
    run_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveRun>>,
}

impl FamilyState {
    fn active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the family's active run when the run ends, even on panic
struct ActiveGuard<'a> {
    family: &'a FamilyState,
}

impl<'a> ActiveGuard<'a> {
    fn enter(family: &'a FamilyState, trigger: &Trigger, token: CancellationToken) -> Self {
        *family.active() = Some(ActiveRun {
            trigger: trigger.clone(),
            token,
        });
        Self { family }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *self.family.active() = None;
    }
}

struct Pending {
    token: CancellationToken,
    generation: u64,
}

struct Inner {
    adapters: Arc<AdapterRegistry>,
    accounts: Arc<AccountDirectory>,
    config: LeaveDuplicateConfig,
    families: Mutex<HashMap<String, Arc<FamilyState>>>,
    pending: Mutex<HashMap<TriggerKey, Pending>>,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

/// Schedules and serializes arbitration runs
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        accounts: Arc<AccountDirectory>,
        config: LeaveDuplicateConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapters,
                accounts,
                config,
                families: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Schedule a debounced run for `trigger`, superseding any run pending
    /// or executing under the same key.
    pub fn trigger(&self, trigger: Trigger) -> RunHandle {
        let debounce = self.inner.config.debounce;
        self.schedule(trigger, debounce)
    }

    /// Run arbitration for a whole family right away (no debounce). Still
    /// waits for the family run lock.
    pub async fn arbitrate_now(&self, platform: &str) -> RunOutcome {
        self.schedule(
            Trigger::Manual {
                platform: platform.to_string(),
            },
            Duration::ZERO,
        )
        .wait()
        .await
    }

    pub fn phase(&self, platform: &str) -> RunPhase {
        let family = self.inner.families().get(platform).cloned();
        let Some(family) = family else {
            return RunPhase::Idle;
        };
        let active = family.active();
        match active.as_ref() {
            None => RunPhase::Idle,
            Some(run) if run.token.is_cancelled() => RunPhase::AbortRequested,
            Some(_) => RunPhase::Running,
        }
    }

    /// Cancel every pending and executing run. Later triggers are ignored.
    pub fn shutdown(&self) {
        info!("Cancelling pending arbitration runs");
        self.inner.shutdown.cancel();
    }

    fn schedule(&self, trigger: Trigger, debounce: Duration) -> RunHandle {
        let interrupted = match &trigger {
            Trigger::Joined { .. } => self.inner.interrupt_family_run(trigger.platform()),
            _ => None,
        };

        let key = trigger.key();
        let token = self.inner.shutdown.child_token();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = self.inner.pending().insert(
            key.clone(),
            Pending {
                token: token.clone(),
                generation,
            },
        ) {
            debug!("Superseding earlier run for {key:?}");
            previous.token.cancel();
        }

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let platform = trigger.platform().to_string();
            let outcome = AssertUnwindSafe(inner.debounced_run(trigger, token, debounce))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(&*panic);
                    error!("Arbitration run for {platform} failed: {message}");
                    RunOutcome::Failed(message)
                });
            inner.clear_pending(&key, generation);
            outcome
        });

        if let Some(resumed) = interrupted {
            debug!("Rescheduling interrupted run {resumed:?}");
            drop(self.schedule(resumed, debounce));
        }
        RunHandle { task }
    }
}

impl Inner {
    fn families(&self) -> MutexGuard<'_, HashMap<String, Arc<FamilyState>>> {
        self.families.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<TriggerKey, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn family(&self, platform: &str) -> Arc<FamilyState> {
        self.families()
            .entry(platform.to_string())
            .or_default()
            .clone()
    }

    /// Cancel the family run holding the lock of `platform`, if any, and
    /// return its trigger when no newer family trigger is already waiting.
    fn interrupt_family_run(&self, platform: &str) -> Option<Trigger> {
        let family = self.families().get(platform).cloned()?;
        let trigger = {
            let active = family.active();
            let run = active.as_ref()?;
            if matches!(run.trigger, Trigger::Joined { .. }) || run.token.is_cancelled() {
                return None;
            }
            info!("Join on {platform} interrupts the running family arbitration");
            run.token.cancel();
            run.trigger.clone()
        };

        let newer_waiting = self
            .pending()
            .get(&trigger.key())
            .is_some_and(|p| !p.token.is_cancelled());
        (!newer_waiting).then_some(trigger)
    }

    /// Groups with a join pending or running on `platform`
    fn joins_in_flight(&self, platform: &str) -> HashSet<GroupRef> {
        self.pending()
            .keys()
            .filter_map(|key| match key {
                TriggerKey::Join { platform: p, group } if p == platform => Some(group.clone()),
                _ => None,
            })
            .collect()
    }

    fn clear_pending(&self, key: &TriggerKey, generation: u64) {
        let mut pending = self.pending();
        if pending.get(key).is_some_and(|p| p.generation == generation) {
            pending.remove(key);
        }
    }

    async fn debounced_run(
        &self,
        trigger: Trigger,
        token: CancellationToken,
        debounce: Duration,
    ) -> RunOutcome {
        if !debounce.is_zero() {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Trigger {trigger:?} coalesced");
                    return RunOutcome::Superseded;
                }
                _ = tokio::time::sleep(debounce) => {}
            }
        }

        let family = self.family(trigger.platform());
        let _lock = tokio::select! {
            biased;
            _ = token.cancelled() => return RunOutcome::Superseded,
            guard = family.run_lock.lock() => guard,
        };
        let _active = ActiveGuard::enter(&family, &trigger, token.clone());

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Arbitration run for {} superseded", trigger.platform());
                RunOutcome::Superseded
            }
            outcome = self.run_pipeline(&trigger, &token) => outcome,
        }
    }

    async fn run_pipeline(&self, trigger: &Trigger, token: &CancellationToken) -> RunOutcome {
        let platform = trigger.platform();
        let Some(adapter) = self.adapters.leave_capable(platform) else {
            debug!("Platform {platform} cannot leave groups, skipping arbitration");
            return RunOutcome::Skipped(SkipReason::Unsupported);
        };

        match trigger {
            Trigger::Joined { account, group } => {
                self.run_join(adapter, account, group, token).await
            }
            _ => self.run_family(adapter, platform, token).await,
        }
    }

    async fn run_family(
        &self,
        adapter: Arc<dyn ErasedPlatformAdapter>,
        platform: &str,
        token: &CancellationToken,
    ) -> RunOutcome {
        let accounts = self.accounts.list_platform(platform);
        if accounts.len() < 2 {
            return RunOutcome::Skipped(SkipReason::NotEnoughAccounts);
        }

        let fetcher = MembershipFetcher::new(adapter.clone(), self.config.fetch_timeout);
        let snapshot = fetcher.fetch_all(&accounts).await;
        if snapshot.len() < 2 {
            debug!(
                "Only {} of {} {platform} accounts reported memberships",
                snapshot.len(),
                accounts.len()
            );
            return RunOutcome::Skipped(SkipReason::NotEnoughAccounts);
        }

        let mut plan = planner::plan(&snapshot, self.config.stay_policy);
        let joins = self.joins_in_flight(platform);
        if !joins.is_empty() {
            plan.retain(|entry| {
                let deferred = joins.contains(&entry.group);
                if deferred {
                    debug!("Leaving {} to its pending join run", entry.group);
                }
                !deferred
            });
        }
        info!("Collected {} actions for {platform}", plan.len());
        self.attach_notify_targets(adapter.as_ref(), &mut plan).await;

        let execution = self.executor(adapter).execute(plan.clone(), token).await;
        RunOutcome::Completed(RunReport {
            platform: platform.to_string(),
            accounts_considered: accounts.len(),
            accounts_fetched: snapshot.len(),
            entries_planned: plan.len(),
            execution,
        })
    }

    async fn run_join(
        &self,
        adapter: Arc<dyn ErasedPlatformAdapter>,
        joiner: &Account,
        group: &GroupRef,
        token: &CancellationToken,
    ) -> RunOutcome {
        if group.is_private {
            return RunOutcome::Skipped(SkipReason::NothingToDo);
        }
        if !self.accounts.contains(joiner) {
            return RunOutcome::Skipped(SkipReason::JoinerGone);
        }

        let family = self.accounts.list_same_platform(joiner);
        if family.len() < 2 {
            return RunOutcome::Skipped(SkipReason::NotEnoughAccounts);
        }

        let fetcher = MembershipFetcher::new(adapter.clone(), self.config.fetch_timeout);
        let snapshot = fetcher.fetch_all(&family).await;
        // An earlier run may already have made the joiner leave
        if snapshot
            .groups_of(joiner)
            .is_some_and(|groups| !groups.contains(group))
        {
            debug!("{joiner} is no longer in {group}");
            return RunOutcome::Skipped(SkipReason::NothingToDo);
        }
        let Some(entry) = planner::plan_join(joiner, group, &snapshot) else {
            return RunOutcome::Skipped(SkipReason::NothingToDo);
        };

        let mut plan = GuildPartitionPlan::new(vec![entry]);
        info!("Collected {} actions for {joiner} joining {group}", plan.len());
        self.attach_notify_targets(adapter.as_ref(), &mut plan).await;

        let execution = self.executor(adapter).execute(plan, token).await;
        RunOutcome::Completed(RunReport {
            platform: joiner.platform.clone(),
            accounts_considered: family.len(),
            accounts_fetched: snapshot.len(),
            entries_planned: 1,
            execution,
        })
    }

    async fn attach_notify_targets(
        &self,
        adapter: &dyn ErasedPlatformAdapter,
        plan: &mut GuildPartitionPlan,
    ) {
        for entry in plan.entries_mut() {
            entry.notify_targets = resolve_notify_targets(adapter, &entry.staying, &entry.group).await;
        }
    }

    fn executor(&self, adapter: Arc<dyn ErasedPlatformAdapter>) -> LeaveExecutor {
        LeaveExecutor::new(
            adapter,
            self.config.notice.clone(),
            self.config.min_delay,
            self.config.max_delay,
        )
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
