//! Pure planning: who stays in each shared group

use crate::plugin::PluginError;
use fleet_core::{Account, GroupRef, NotifyTarget};
use indexmap::{IndexMap, IndexSet};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::str::FromStr;

/// Which account keeps a shared group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StayPolicy {
    /// The account in the most distinct groups stays
    #[default]
    MostGroups,
    /// The account in the fewest distinct groups stays
    FewestGroups,
}

impl FromStr for StayPolicy {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "most_groups" => Ok(StayPolicy::MostGroups),
            "fewest_groups" => Ok(StayPolicy::FewestGroups),
            other => Err(PluginError::Config {
                message: format!("unknown stay_policy {other:?} (expected most_groups or fewest_groups)"),
            }),
        }
    }
}

/// Memberships of one account family, captured at the start of a run.
///
/// Only accounts whose fetch succeeded are present. Private scenes are
/// dropped on insert and duplicate groups collapse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipSnapshot {
    entries: IndexMap<Account, IndexSet<GroupRef>>,
}

impl MembershipSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, account: Account, groups: impl IntoIterator<Item = GroupRef>) {
        let groups = groups.into_iter().filter(|g| !g.is_private).collect();
        self.entries.insert(account, groups);
    }

    pub fn with(mut self, account: Account, groups: impl IntoIterator<Item = GroupRef>) -> Self {
        self.insert(account, groups);
        self
    }

    pub fn groups_of(&self, account: &Account) -> Option<&IndexSet<GroupRef>> {
        self.entries.get(account)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Account, &IndexSet<GroupRef>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot as it would look after every leave in `plan` succeeded
    pub fn after(&self, plan: &GuildPartitionPlan) -> Self {
        let mut next = self.clone();
        for entry in plan.iter() {
            for account in &entry.leaving {
                if let Some(groups) = next.entries.get_mut(account) {
                    groups.shift_remove(&entry.group);
                }
            }
        }
        next
    }
}

/// One group with more than one account of the family in it
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub group: GroupRef,
    pub staying: Account,
    pub leaving: Vec<Account>,
    /// Where the staying account should post the courtesy notice
    pub notify_targets: Vec<NotifyTarget>,
}

/// Ordered list of plan entries for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuildPartitionPlan {
    entries: Vec<PlanEntry>,
}

impl GuildPartitionPlan {
    pub fn new(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> std::slice::IterMut<'_, PlanEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the entries `keep` rejects, preserving order
    pub fn retain(&mut self, keep: impl FnMut(&PlanEntry) -> bool) {
        self.entries.retain(keep);
    }
}

impl IntoIterator for GuildPartitionPlan {
    type Item = PlanEntry;
    type IntoIter = std::vec::IntoIter<PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Plan a full family run.
///
/// Groups are visited in first-seen order. Within a group, candidates are
/// ranked by their distinct-group count according to `policy`; the sort is
/// stable, so on a tie the account listed first in the snapshot stays.
pub fn plan(snapshot: &MembershipSnapshot, policy: StayPolicy) -> GuildPartitionPlan {
    let counts: HashMap<&Account, usize> = snapshot
        .iter()
        .map(|(account, groups)| (account, groups.len()))
        .collect();

    let mut members: IndexMap<&GroupRef, Vec<&Account>> = IndexMap::new();
    for (account, groups) in snapshot.iter() {
        for group in groups {
            members.entry(group).or_default().push(account);
        }
    }

    let mut entries = Vec::new();
    for (group, mut candidates) in members {
        if candidates.len() < 2 {
            continue;
        }
        match policy {
            StayPolicy::MostGroups => candidates.sort_by_key(|a| Reverse(counts[a])),
            StayPolicy::FewestGroups => candidates.sort_by_key(|a| counts[a]),
        }
        let staying = candidates.remove(0).clone();
        entries.push(PlanEntry {
            group: group.clone(),
            staying,
            leaving: candidates.into_iter().cloned().collect(),
            notify_targets: Vec::new(),
        });
    }

    GuildPartitionPlan::new(entries)
}

/// Plan for a single join: the joiner stays, every other account of its
/// family already in `group` leaves.
///
/// Returns None when nobody else is in the group or the group is private.
pub fn plan_join(joiner: &Account, group: &GroupRef, others: &MembershipSnapshot) -> Option<PlanEntry> {
    if group.is_private {
        return None;
    }

    let leaving: Vec<Account> = others
        .iter()
        .filter(|(account, groups)| {
            *account != joiner && account.same_family(joiner) && groups.contains(group)
        })
        .map(|(account, _)| account.clone())
        .collect();

    if leaving.is_empty() {
        return None;
    }

    Some(PlanEntry {
        group: group.clone(),
        staying: joiner.clone(),
        leaving,
        notify_targets: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(id: &str) -> Account {
        Account::new(id, "onebot11")
    }

    fn groups(ids: &[&str]) -> Vec<GroupRef> {
        ids.iter().map(|id| GroupRef::group(*id)).collect()
    }

    fn scenario() -> MembershipSnapshot {
        MembershipSnapshot::new()
            .with(acct("A"), groups(&["1", "2", "3"]))
            .with(acct("B"), groups(&["2", "3"]))
            .with(acct("C"), groups(&["3"]))
    }

    #[test]
    fn test_plan_most_groups_stays() {
        let plan = plan(&scenario(), StayPolicy::MostGroups);
        assert_eq!(plan.len(), 2);

        let entries: Vec<&PlanEntry> = plan.iter().collect();
        assert_eq!(entries[0].group, GroupRef::group("2"));
        assert_eq!(entries[0].staying, acct("A"));
        assert_eq!(entries[0].leaving, vec![acct("B")]);

        assert_eq!(entries[1].group, GroupRef::group("3"));
        assert_eq!(entries[1].staying, acct("A"));
        assert_eq!(entries[1].leaving, vec![acct("B"), acct("C")]);
    }

    #[test]
    fn test_plan_fewest_groups_stays() {
        let plan = plan(&scenario(), StayPolicy::FewestGroups);
        let entries: Vec<&PlanEntry> = plan.iter().collect();
        assert_eq!(entries[0].staying, acct("B"));
        assert_eq!(entries[0].leaving, vec![acct("A")]);
        assert_eq!(entries[1].staying, acct("C"));
        assert_eq!(entries[1].leaving, vec![acct("B"), acct("A")]);
    }

    #[test]
    fn test_plan_tie_keeps_first_in_input_order() {
        let snapshot = MembershipSnapshot::new()
            .with(acct("Y"), groups(&["1", "2"]))
            .with(acct("X"), groups(&["1", "3"]));
        let plan = plan(&snapshot, StayPolicy::MostGroups);
        assert_eq!(plan.len(), 1);
        let entry = plan.iter().next().unwrap();
        assert_eq!(entry.staying, acct("Y"));
        assert_eq!(entry.leaving, vec![acct("X")]);
    }

    #[test]
    fn test_plan_single_account_groups_are_skipped() {
        let snapshot = MembershipSnapshot::new()
            .with(acct("A"), groups(&["1"]))
            .with(acct("B"), groups(&["2"]));
        assert!(plan(&snapshot, StayPolicy::MostGroups).is_empty());
        assert!(plan(&MembershipSnapshot::new(), StayPolicy::MostGroups).is_empty());
    }

    #[test]
    fn test_plan_each_shared_group_has_exactly_one_stayer() {
        let plan = plan(&scenario(), StayPolicy::MostGroups);
        for entry in plan.iter() {
            assert!(!entry.leaving.contains(&entry.staying));
            let mut all = entry.leaving.clone();
            all.push(entry.staying.clone());
            let distinct: IndexSet<&Account> = all.iter().collect();
            assert_eq!(distinct.len(), all.len());
        }
    }

    #[test]
    fn test_plan_is_idempotent_after_execution() {
        let snapshot = scenario();
        let first = plan(&snapshot, StayPolicy::MostGroups);
        let after = snapshot.after(&first);
        assert!(plan(&after, StayPolicy::MostGroups).is_empty());
        assert_eq!(after.groups_of(&acct("A")).unwrap().len(), 3);
        assert!(after.groups_of(&acct("C")).unwrap().is_empty());
    }

    #[test]
    fn test_private_scenes_never_arbitrated() {
        let snapshot = MembershipSnapshot::new()
            .with(acct("A"), vec![GroupRef::private("9"), GroupRef::group("1")])
            .with(acct("B"), vec![GroupRef::private("9")]);
        assert!(plan(&snapshot, StayPolicy::MostGroups).is_empty());
        assert_eq!(snapshot.groups_of(&acct("B")).unwrap().len(), 0);
    }

    #[test]
    fn test_channels_in_different_guilds_are_distinct() {
        let snapshot = MembershipSnapshot::new()
            .with(acct("A"), vec![GroupRef::channel("g1", "c")])
            .with(acct("B"), vec![GroupRef::channel("g2", "c")]);
        assert!(plan(&snapshot, StayPolicy::MostGroups).is_empty());

        let snapshot = MembershipSnapshot::new()
            .with(acct("A"), vec![GroupRef::channel("g1", "c")])
            .with(acct("B"), vec![GroupRef::channel("g1", "c")]);
        assert_eq!(plan(&snapshot, StayPolicy::MostGroups).len(), 1);
    }

    #[test]
    fn test_duplicate_groups_in_one_fetch_collapse() {
        let snapshot = MembershipSnapshot::new()
            .with(acct("A"), groups(&["1", "1", "2"]))
            .with(acct("B"), groups(&["1", "3", "4"]));
        // A has 2 distinct groups, B has 3
        let plan = plan(&snapshot, StayPolicy::MostGroups);
        assert_eq!(plan.iter().next().unwrap().staying, acct("B"));
    }

    #[test]
    fn test_plan_join_newcomer_stays() {
        let others = MembershipSnapshot::new()
            .with(acct("A"), groups(&["5", "6", "7"]))
            .with(acct("B"), groups(&["6"]));
        let entry = plan_join(&acct("D"), &GroupRef::group("5"), &others).unwrap();
        assert_eq!(entry.staying, acct("D"));
        assert_eq!(entry.leaving, vec![acct("A")]);
    }

    #[test]
    fn test_plan_join_nobody_else_present() {
        let others = MembershipSnapshot::new().with(acct("A"), groups(&["6"]));
        assert!(plan_join(&acct("D"), &GroupRef::group("5"), &others).is_none());
        assert!(plan_join(&acct("D"), &GroupRef::private("5"), &others).is_none());
    }

    #[test]
    fn test_plan_join_ignores_joiner_and_other_families() {
        let others = MembershipSnapshot::new()
            .with(acct("D"), groups(&["5"]))
            .with(Account::new("Q", "qqguild"), groups(&["5"]));
        assert!(plan_join(&acct("D"), &GroupRef::group("5"), &others).is_none());
    }

    #[test]
    fn test_stay_policy_parse() {
        assert_eq!("most_groups".parse::<StayPolicy>().unwrap(), StayPolicy::MostGroups);
        assert_eq!("fewest_groups".parse::<StayPolicy>().unwrap(), StayPolicy::FewestGroups);
        assert!("other".parse::<StayPolicy>().is_err());
    }
}
