//! Duplicate-membership arbitration
//!
//! When several accounts of the same platform sit in one group, all but one
//! of them leave it. Runs are triggered by account connect/disconnect and
//! group-join events, debounced per trigger key, and serialized per account
//! family.

mod config;
mod coordinator;
mod executor;
mod fetcher;
mod notify;
mod planner;
mod plugin;

pub use config::LeaveDuplicateConfig;
pub use coordinator::{Coordinator, RunHandle, RunOutcome, RunPhase, RunReport, SkipReason, Trigger};
pub use executor::{ExecutionReport, LeaveExecutor};
pub use fetcher::MembershipFetcher;
pub use notify::resolve_notify_targets;
pub use planner::{GuildPartitionPlan, MembershipSnapshot, PlanEntry, StayPolicy, plan, plan_join};
pub use plugin::LeaveDuplicatePlugin;
