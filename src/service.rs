//! The task tree facade.
//!
//! [`TaskTree`] owns the node arena behind a single reader/writer lock.
//! Reads take the shared side for the whole traversal. Every mutation takes
//! the exclusive side once and runs authorize → validate → commit →
//! invalidate inside that one hold, so two concurrent moves can never both
//! validate against a stale shape. A rejected mutation returns before the
//! commit step and leaves the store exactly as it was.

use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access::{
    AccessDecision, AccessResolver, AccessRuleSource, AccessSide, Operation, UserDirectory,
};
use crate::builder;
use crate::config::Config;
use crate::duration;
use crate::error::{Error, Result, ValidationError};
use crate::store::{NodeStore, TaskNode};
use crate::task::{TaskId, TaskRecord, UserId};
use crate::validate;

/// Authoritative source of task records for build and refresh.
pub trait TaskRecordSource: Send + Sync {
    fn load_tasks(&self) -> Result<Vec<TaskRecord>>;
}

/// Records held in memory; `replace` swaps the batch seen by the next load.
#[derive(Debug, Default)]
pub struct StaticTaskSource {
    records: RwLock<Vec<TaskRecord>>,
}

impl StaticTaskSource {
    pub fn new(records: Vec<TaskRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn replace(&self, records: Vec<TaskRecord>) {
        *self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = records;
    }
}

impl TaskRecordSource for StaticTaskSource {
    fn load_tasks(&self) -> Result<Vec<TaskRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }
}

/// What to do with the children of a removed task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalMode {
    /// Refuse if the task has children.
    #[default]
    Reject,
    /// Remove the whole subtree.
    Cascade,
    /// Move the children up to the removed task's parent.
    RelinkChildren,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub root: TaskId,
    pub tasks: usize,
    pub total_secs: u64,
}

/// Shared-lock view for several reads against one consistent tree.
pub struct TreeReader<'a> {
    guard: RwLockReadGuard<'a, NodeStore>,
}

impl TreeReader<'_> {
    pub fn duration(&self, id: TaskId, recursive: bool) -> Result<u64> {
        duration::duration(&self.guard, id, recursive)
    }
}

impl Deref for TreeReader<'_> {
    type Target = NodeStore;

    fn deref(&self) -> &NodeStore {
        &self.guard
    }
}

pub struct TaskTree {
    /// Single-writer/multi-reader guard over the arena.
    store: RwLock<NodeStore>,
    /// Held across a whole refresh so a slower rebuild of older records
    /// cannot land after a newer one.
    refresh_gate: Mutex<()>,
    resolver: AccessResolver,
    source: Arc<dyn TaskRecordSource>,
    max_depth: usize,
}

impl TaskTree {
    /// Build the initial tree from `source`.
    pub fn load(
        source: Arc<dyn TaskRecordSource>,
        rules: Arc<dyn AccessRuleSource>,
        directory: Arc<dyn UserDirectory>,
        config: &Config,
    ) -> Result<Self> {
        let max_depth = config.tree.max_depth;
        let store = build_store(source.as_ref(), max_depth)?;
        info!(tasks = store.len(), root = %store.root(), "task tree loaded");
        Ok(Self {
            store: RwLock::new(store),
            refresh_gate: Mutex::new(()),
            resolver: AccessResolver::new(rules, directory),
            source,
            max_depth,
        })
    }

    pub fn resolver(&self) -> &AccessResolver {
        &self.resolver
    }

    pub fn read(&self) -> Result<TreeReader<'_>> {
        let guard = self.store.read().map_err(|_| Error::LockPoisoned)?;
        Ok(TreeReader { guard })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, NodeStore>> {
        self.store.write().map_err(|_| Error::LockPoisoned)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn root(&self) -> Result<TaskNode> {
        Ok(self.read()?.root_node().to_view())
    }

    pub fn node(&self, id: TaskId) -> Result<TaskNode> {
        Ok(self.read()?.node(id)?.to_view())
    }

    pub fn parent(&self, id: TaskId) -> Result<Option<TaskNode>> {
        let reader = self.read()?;
        match reader.parent_of(id)? {
            Some(parent) => Ok(Some(reader.node(parent)?.to_view())),
            None => Ok(None),
        }
    }

    pub fn children(&self, id: TaskId) -> Result<Vec<TaskNode>> {
        let reader = self.read()?;
        reader
            .children_of(id)?
            .iter()
            .map(|child| Ok(reader.node(*child)?.to_view()))
            .collect()
    }

    pub fn path_to_root(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.read()?.path_to_root(id)
    }

    pub fn descendant_ids(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.read()?.descendant_ids(id)
    }

    pub fn duration(&self, id: TaskId, recursive: bool) -> Result<u64> {
        self.read()?.duration(id, recursive)
    }

    /// Current records sorted by id.
    pub fn records(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.read()?.records())
    }

    pub fn authorize(&self, user: &UserId, task: TaskId, operation: Operation) -> Result<AccessDecision> {
        let store = self.read()?;
        self.resolver.authorize(&store, user, task, operation)
    }

    /// Move `id` under `new_parent`.
    ///
    /// Needs delete on the current parent's scope and insert on the new
    /// parent's scope.
    pub fn set_parent(&self, user: &UserId, id: TaskId, new_parent: TaskId) -> Result<()> {
        let mut store = self.write()?;
        let node = store.node(id)?;
        store.node(new_parent)?;
        let Some(old_parent) = node.parent_id() else {
            return Err(ValidationError::RootImmovable { task: id }.into());
        };
        let title = node.title().to_string();

        self.resolver
            .require(&store, user, id, old_parent, Operation::Delete, AccessSide::OldParent)?;
        self.resolver
            .require(&store, user, id, new_parent, Operation::Insert, AccessSide::NewParent)?;

        if old_parent == new_parent {
            debug!(task = %id, parent = %new_parent, "task already under requested parent");
            return Ok(());
        }

        validate::check_reparent(&store, id, new_parent)?;
        validate::check_rename(&store, new_parent, &title, Some(id))?;
        let height = validate::subtree_height(&store, id)?;
        validate::check_depth(&store, id, new_parent, height)?;

        store.move_node(id, new_parent)?;
        duration::invalidate(&store, old_parent);
        duration::invalidate(&store, id);
        debug!(user = %user, task = %id, from = %old_parent, to = %new_parent, "moved task");
        Ok(())
    }

    /// Change the title of `id`; needs update on the task's own scope.
    pub fn rename(&self, user: &UserId, id: TaskId, title: &str) -> Result<()> {
        let mut store = self.write()?;
        let parent = store.parent_of(id)?;

        self.resolver
            .require(&store, user, id, id, Operation::Update, AccessSide::OwnScope)?;

        validate::check_title(title)?;
        if let Some(parent) = parent {
            validate::check_rename(&store, parent, title, Some(id))?;
        }

        store.set_title(id, title.to_string())?;
        debug!(user = %user, task = %id, title, "renamed task");
        Ok(())
    }

    /// Add a new task below an existing parent; needs insert on that parent.
    pub fn insert_task(&self, user: &UserId, record: TaskRecord) -> Result<()> {
        let mut store = self.write()?;
        let id = record.id;
        let Some(parent) = record.parent_id else {
            return Err(ValidationError::MissingParent { task: id }.into());
        };
        store.node(parent)?;

        self.resolver
            .require(&store, user, id, parent, Operation::Insert, AccessSide::Parent)?;

        if store.contains(id) {
            return Err(ValidationError::TaskExists { task: id }.into());
        }
        validate::check_title(&record.title)?;
        validate::check_rename(&store, parent, &record.title, None)?;
        validate::check_depth(&store, id, parent, 0)?;

        store.insert(record)?;
        duration::invalidate(&store, id);
        debug!(user = %user, task = %id, parent = %parent, "inserted task");
        Ok(())
    }

    /// Remove `id`; needs delete on the task's own scope.
    ///
    /// Cascade also needs delete on every descendant. Relinking needs insert
    /// on the parent the children move to.
    ///
    /// Returns the ids that left the tree.
    pub fn remove_task(&self, user: &UserId, id: TaskId, mode: RemovalMode) -> Result<Vec<TaskId>> {
        let mut store = self.write()?;
        let node = store.node(id)?;
        let Some(parent) = node.parent_id() else {
            return Err(ValidationError::RootImmovable { task: id }.into());
        };
        let children = node.children().to_vec();

        self.resolver
            .require(&store, user, id, id, Operation::Delete, AccessSide::OwnScope)?;

        let mut removed = Vec::new();
        match mode {
            RemovalMode::Reject => {
                if !children.is_empty() {
                    return Err(ValidationError::HasChildren {
                        task: id,
                        children: children.len(),
                    }
                    .into());
                }
            }
            RemovalMode::Cascade => {
                let mut subtree = store.descendant_ids(id)?;
                for descendant in &subtree {
                    self.resolver.require(
                        &store,
                        user,
                        *descendant,
                        *descendant,
                        Operation::Delete,
                        AccessSide::OwnScope,
                    )?;
                }
                // Leaves first so no remaining node points at a removed parent.
                subtree.reverse();
                for descendant in subtree {
                    store.remove(descendant)?;
                    removed.push(descendant);
                }
            }
            RemovalMode::RelinkChildren => {
                for child in &children {
                    self.resolver.require(
                        &store,
                        user,
                        *child,
                        parent,
                        Operation::Insert,
                        AccessSide::NewParent,
                    )?;
                }
                for child in &children {
                    let title = store.node(*child)?.title().to_string();
                    validate::check_rename(&store, parent, &title, Some(id))?;
                }
                for child in &children {
                    store.move_node(*child, parent)?;
                }
            }
        }

        store.remove(id)?;
        removed.push(id);
        duration::invalidate(&store, parent);
        debug!(user = %user, task = %id, removed = removed.len(), ?mode, "removed task");
        Ok(removed)
    }

    /// Record a new booked total for `id` and invalidate its rollups.
    pub fn set_own_duration(&self, id: TaskId, seconds: u64) -> Result<()> {
        let mut store = self.write()?;
        store.set_own_duration(id, seconds)?;
        duration::invalidate(&store, id);
        Ok(())
    }

    /// Rebuild from the record source and swap the new tree in.
    ///
    /// All-or-nothing: if the new records do not form a valid tree the
    /// current one stays installed and the build error is returned.
    /// Refreshes run one at a time; readers and writers are only blocked
    /// for the final swap.
    pub fn refresh(&self) -> Result<RefreshReport> {
        let _gate = self.refresh_gate.lock().map_err(|_| Error::LockPoisoned)?;
        let store = match build_store(self.source.as_ref(), self.max_depth) {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "refresh rejected; keeping current tree");
                return Err(err);
            }
        };
        let report = RefreshReport {
            root: store.root(),
            tasks: store.len(),
            total_secs: store.root_node().cached_total_secs().unwrap_or(0),
        };
        *self.write()? = store;
        info!(tasks = report.tasks, root = %report.root, "task tree refreshed");
        Ok(report)
    }
}

fn build_store(source: &dyn TaskRecordSource, max_depth: usize) -> Result<NodeStore> {
    let records = source.load_tasks()?;
    let store = builder::build(records, max_depth)?;
    duration::refresh_all(&store)?;
    Ok(store)
}

impl std::fmt::Debug for TaskTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTree")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}
