//! Hierarchical access resolution.
//!
//! Rules are granted to a group on a task and cover the subtree below it.
//! To decide an operation on a task, walk from the task towards the root and
//! stop at the first task that carries any rule for one of the caller's
//! groups. The flags of all such rules at that level are OR'ed together;
//! rules further up are not consulted. No applicable rule means denied.
//! Administrators bypass the walk.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AccessError, Error, Result};
use crate::store::NodeStore;
use crate::task::{GroupId, TaskId, UserId};

/// Permission kinds checked against access rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Operation::Select),
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(Error::InvalidArgument(format!(
                "unknown operation '{other}' (expected select, insert, update or delete)"
            ))),
        }
    }
}

/// Which scope a mutation's access check is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSide {
    /// The parent a task is moved away from.
    OldParent,
    /// The parent a task is moved into.
    NewParent,
    /// The task itself (rename, removal).
    OwnScope,
    /// The parent a new task is inserted under.
    Parent,
}

impl AccessSide {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessSide::OldParent => "old-parent",
            AccessSide::NewParent => "new-parent",
            AccessSide::OwnScope => "own",
            AccessSide::Parent => "parent",
        }
    }
}

impl fmt::Display for AccessSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_recursive() -> bool {
    true
}

/// Permissions of one group on the subtree rooted at `task_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub group_id: GroupId,
    pub task_id: TaskId,
    #[serde(default)]
    pub select: bool,
    #[serde(default)]
    pub insert: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
    /// When false the rule applies to `task_id` only, not its descendants.
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

impl AccessRule {
    /// A rule granting nothing; combine with [`AccessRule::allow`].
    pub fn new(group_id: GroupId, task_id: TaskId) -> Self {
        Self {
            group_id,
            task_id,
            select: false,
            insert: false,
            update: false,
            delete: false,
            recursive: true,
        }
    }

    pub fn full(group_id: GroupId, task_id: TaskId) -> Self {
        Self {
            select: true,
            insert: true,
            update: true,
            delete: true,
            ..Self::new(group_id, task_id)
        }
    }

    pub fn allow(mut self, operation: Operation) -> Self {
        match operation {
            Operation::Select => self.select = true,
            Operation::Insert => self.insert = true,
            Operation::Update => self.update = true,
            Operation::Delete => self.delete = true,
        }
        self
    }

    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Select => self.select,
            Operation::Insert => self.insert,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Granted,
    Denied,
}

impl AccessDecision {
    pub fn is_granted(self) -> bool {
        self == AccessDecision::Granted
    }
}

/// Combined flags in force for a caller on one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EffectiveAccess {
    /// Task whose rules decided; `None` when no rule applied anywhere.
    pub defined_at: Option<TaskId>,
    pub select: bool,
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EffectiveAccess {
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Select => self.select,
            Operation::Insert => self.insert,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    fn merge(&mut self, rule: &AccessRule) {
        self.select |= rule.select;
        self.insert |= rule.insert;
        self.update |= rule.update;
        self.delete |= rule.delete;
    }
}

/// Supplies the access rules defined directly on a task.
pub trait AccessRuleSource: Send + Sync {
    fn rules_for_task(&self, task: TaskId) -> Vec<AccessRule>;
}

/// Resolves callers to their groups and the administrator predicate.
pub trait UserDirectory: Send + Sync {
    fn groups_of(&self, user: &UserId) -> HashSet<GroupId>;

    fn is_admin(&self, user: &UserId) -> bool;
}

/// Rule table kept in memory, editable while shared.
#[derive(Debug, Default)]
pub struct InMemoryAccessRules {
    by_task: RwLock<HashMap<TaskId, Vec<AccessRule>>>,
}

impl InMemoryAccessRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = AccessRule>) -> Self {
        let table = Self::new();
        for rule in rules {
            table.grant(rule);
        }
        table
    }

    /// Add a rule, replacing any existing rule for the same group and task.
    pub fn grant(&self, rule: AccessRule) {
        let mut by_task = self
            .by_task
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let rules = by_task.entry(rule.task_id).or_default();
        rules.retain(|existing| existing.group_id != rule.group_id);
        rules.push(rule);
    }

    pub fn revoke(&self, group: &GroupId, task: TaskId) {
        let mut by_task = self
            .by_task
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(rules) = by_task.get_mut(&task) {
            rules.retain(|existing| &existing.group_id != group);
        }
    }

    pub fn all_rules(&self) -> Vec<AccessRule> {
        let by_task = self
            .by_task
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut rules: Vec<AccessRule> = by_task.values().flatten().cloned().collect();
        rules.sort_by(|a, b| {
            a.task_id
                .cmp(&b.task_id)
                .then_with(|| a.group_id.cmp(&b.group_id))
        });
        rules
    }
}

impl AccessRuleSource for InMemoryAccessRules {
    fn rules_for_task(&self, task: TaskId) -> Vec<AccessRule> {
        self.by_task
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&task)
            .cloned()
            .unwrap_or_default()
    }
}

/// Fixed user → group memberships with admin users and admin groups.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    memberships: HashMap<UserId, HashSet<GroupId>>,
    admins: HashSet<UserId>,
    admin_groups: HashSet<GroupId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, user: UserId, group: GroupId) -> Self {
        self.memberships.entry(user).or_default().insert(group);
        self
    }

    pub fn with_admin(mut self, user: UserId) -> Self {
        self.admins.insert(user);
        self
    }

    pub fn with_admin_group(mut self, group: GroupId) -> Self {
        self.admin_groups.insert(group);
        self
    }
}

impl UserDirectory for StaticDirectory {
    fn groups_of(&self, user: &UserId) -> HashSet<GroupId> {
        self.memberships.get(user).cloned().unwrap_or_default()
    }

    fn is_admin(&self, user: &UserId) -> bool {
        if self.admins.contains(user) {
            return true;
        }
        self.memberships
            .get(user)
            .is_some_and(|groups| groups.iter().any(|g| self.admin_groups.contains(g)))
    }
}

/// Walks the ancestor chain to decide operations.
#[derive(Clone)]
pub struct AccessResolver {
    rules: Arc<dyn AccessRuleSource>,
    directory: Arc<dyn UserDirectory>,
}

impl AccessResolver {
    pub fn new(rules: Arc<dyn AccessRuleSource>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { rules, directory }
    }

    pub fn directory(&self) -> &dyn UserDirectory {
        self.directory.as_ref()
    }

    /// Nearest-definition-wins flags for `groups` on `task`.
    pub fn effective(
        &self,
        store: &NodeStore,
        groups: &HashSet<GroupId>,
        task: TaskId,
    ) -> Result<EffectiveAccess> {
        let mut access = EffectiveAccess::default();
        if groups.is_empty() {
            store.node(task)?;
            return Ok(access);
        }
        for (level, scope) in store.path_to_root(task)?.into_iter().enumerate() {
            let applicable: Vec<AccessRule> = self
                .rules
                .rules_for_task(scope)
                .into_iter()
                .filter(|rule| groups.contains(&rule.group_id))
                .filter(|rule| level == 0 || rule.recursive)
                .collect();
            if applicable.is_empty() {
                continue;
            }
            access.defined_at = Some(scope);
            for rule in &applicable {
                access.merge(rule);
            }
            break;
        }
        Ok(access)
    }

    /// Group-based decision without the administrator bypass.
    pub fn resolve(
        &self,
        store: &NodeStore,
        groups: &HashSet<GroupId>,
        task: TaskId,
        operation: Operation,
    ) -> Result<AccessDecision> {
        let access = self.effective(store, groups, task)?;
        Ok(if access.allows(operation) {
            AccessDecision::Granted
        } else {
            AccessDecision::Denied
        })
    }

    /// Decision for `user`, honouring the administrator bypass.
    pub fn authorize(
        &self,
        store: &NodeStore,
        user: &UserId,
        task: TaskId,
        operation: Operation,
    ) -> Result<AccessDecision> {
        if self.directory.is_admin(user) {
            store.node(task)?;
            return Ok(AccessDecision::Granted);
        }
        let groups = self.directory.groups_of(user);
        self.resolve(store, &groups, task, operation)
    }

    /// Like [`AccessResolver::authorize`] but turns a denial into an
    /// [`AccessError`] naming the side that failed.
    pub fn require(
        &self,
        store: &NodeStore,
        user: &UserId,
        target: TaskId,
        scope: TaskId,
        operation: Operation,
        side: AccessSide,
    ) -> Result<()> {
        if self.authorize(store, user, scope, operation)?.is_granted() {
            return Ok(());
        }
        debug!(user = %user, task = %target, scope = %scope, %operation, %side, "access denied");
        Err(AccessError {
            task: target,
            operation,
            side,
            scope,
        }
        .into())
    }
}

impl fmt::Debug for AccessResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::store::DEFAULT_MAX_DEPTH;
    use crate::task::TaskRecord;

    fn group(name: &str) -> GroupId {
        GroupId::new(name)
    }

    fn groups(names: &[&str]) -> HashSet<GroupId> {
        names.iter().map(|name| group(name)).collect()
    }

    // root(1) -> project(2) -> phase(3) -> work(4)
    fn store() -> NodeStore {
        build(
            vec![
                TaskRecord::root(1, "root"),
                TaskRecord::child(2, 1, "project"),
                TaskRecord::child(3, 2, "phase"),
                TaskRecord::child(4, 3, "work"),
            ],
            DEFAULT_MAX_DEPTH,
        )
        .expect("build")
    }

    fn resolver(rules: Vec<AccessRule>) -> AccessResolver {
        AccessResolver::new(
            Arc::new(InMemoryAccessRules::from_rules(rules)),
            Arc::new(StaticDirectory::new()),
        )
    }

    #[test]
    fn no_rules_denies() {
        let resolver = resolver(Vec::new());
        let decision = resolver
            .resolve(&store(), &groups(&["dev"]), TaskId(4), Operation::Select)
            .expect("resolve");
        assert_eq!(decision, AccessDecision::Denied);
    }

    #[test]
    fn ancestor_rule_covers_subtree() {
        let resolver = resolver(vec![
            AccessRule::new(group("dev"), TaskId(2)).allow(Operation::Select)
        ]);
        let access = resolver
            .effective(&store(), &groups(&["dev"]), TaskId(4))
            .expect("effective");
        assert_eq!(access.defined_at, Some(TaskId(2)));
        assert!(access.select);
        assert!(!access.update);
    }

    #[test]
    fn nearest_definition_wins_over_broader_ancestor() {
        let resolver = resolver(vec![
            AccessRule::full(group("dev"), TaskId(1)),
            AccessRule::new(group("dev"), TaskId(3)).allow(Operation::Select),
        ]);
        let store = store();
        let dev = groups(&["dev"]);
        assert_eq!(
            resolver
                .resolve(&store, &dev, TaskId(4), Operation::Delete)
                .expect("resolve"),
            AccessDecision::Denied
        );
        assert_eq!(
            resolver
                .resolve(&store, &dev, TaskId(2), Operation::Delete)
                .expect("resolve"),
            AccessDecision::Granted
        );
    }

    #[test]
    fn rules_of_other_groups_do_not_stop_the_walk() {
        let resolver = resolver(vec![
            AccessRule::full(group("dev"), TaskId(1)),
            AccessRule::new(group("ops"), TaskId(3)),
        ]);
        let decision = resolver
            .resolve(&store(), &groups(&["dev"]), TaskId(4), Operation::Update)
            .expect("resolve");
        assert_eq!(decision, AccessDecision::Granted);
    }

    #[test]
    fn groups_at_same_level_are_combined() {
        let resolver = resolver(vec![
            AccessRule::new(group("dev"), TaskId(2)).allow(Operation::Select),
            AccessRule::new(group("lead"), TaskId(2)).allow(Operation::Delete),
        ]);
        let access = resolver
            .effective(&store(), &groups(&["dev", "lead"]), TaskId(3))
            .expect("effective");
        assert!(access.select);
        assert!(access.delete);
        assert!(!access.insert);
    }

    #[test]
    fn non_recursive_rule_applies_to_own_task_only() {
        let resolver = resolver(vec![
            AccessRule::full(group("dev"), TaskId(2)).non_recursive(),
            AccessRule::new(group("dev"), TaskId(1)).allow(Operation::Select),
        ]);
        let store = store();
        let dev = groups(&["dev"]);
        let own = resolver.effective(&store, &dev, TaskId(2)).expect("own");
        assert!(own.delete);
        let below = resolver.effective(&store, &dev, TaskId(3)).expect("below");
        assert_eq!(below.defined_at, Some(TaskId(1)));
        assert!(!below.delete);
        assert!(below.select);
    }

    #[test]
    fn admin_bypasses_rules() {
        let resolver = AccessResolver::new(
            Arc::new(InMemoryAccessRules::new()),
            Arc::new(
                StaticDirectory::new()
                    .with_member(UserId::new("root"), group("admins"))
                    .with_admin_group(group("admins")),
            ),
        );
        let decision = resolver
            .authorize(&store(), &UserId::new("root"), TaskId(4), Operation::Delete)
            .expect("authorize");
        assert!(decision.is_granted());
    }

    #[test]
    fn require_names_the_denied_side() {
        let resolver = resolver(Vec::new());
        let err = resolver
            .require(
                &store(),
                &UserId::new("alice"),
                TaskId(4),
                TaskId(3),
                Operation::Delete,
                AccessSide::OldParent,
            )
            .expect_err("denied");
        match err {
            crate::error::Error::Access(access) => {
                assert_eq!(access.task, TaskId(4));
                assert_eq!(access.scope, TaskId(3));
                assert_eq!(access.operation, Operation::Delete);
                assert_eq!(access.side, AccessSide::OldParent);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn grant_replaces_rule_for_same_group() {
        let table = InMemoryAccessRules::new();
        table.grant(AccessRule::new(group("dev"), TaskId(2)).allow(Operation::Select));
        table.grant(AccessRule::new(group("dev"), TaskId(2)).allow(Operation::Delete));
        let rules = table.rules_for_task(TaskId(2));
        assert_eq!(rules.len(), 1);
        assert!(rules[0].delete);
        assert!(!rules[0].select);

        table.revoke(&group("dev"), TaskId(2));
        assert!(table.rules_for_task(TaskId(2)).is_empty());
    }

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("Delete".parse::<Operation>().expect("parse"), Operation::Delete);
        assert_eq!(" select ".parse::<Operation>().expect("parse"), Operation::Select);
        assert!("drop".parse::<Operation>().is_err());
    }
}
