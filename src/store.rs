//! Flat node arena for the task tree.
//!
//! Nodes are keyed by [`TaskId`] and reference their parent and children by
//! id only. The store itself does not enforce tree invariants on its
//! `pub(crate)` mutators; [`crate::builder`] and [`crate::service`] validate
//! before calling them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use crate::error::{Error, Result, StructuralError};
use crate::task::{TaskId, TaskRecord};

/// Default bound on parent-link hops from any node to the root.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// A task inside the tree.
#[derive(Debug)]
pub struct Node {
    record: TaskRecord,
    children: Vec<TaskId>,
    /// Recursive duration; only meaningful while `dirty` is false.
    total_secs: AtomicU64,
    dirty: AtomicBool,
}

impl Node {
    pub(crate) fn new(record: TaskRecord) -> Self {
        Self {
            record,
            children: Vec::new(),
            total_secs: AtomicU64::new(0),
            dirty: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> TaskId {
        self.record.id
    }

    pub fn parent_id(&self) -> Option<TaskId> {
        self.record.parent_id
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }

    pub fn own_duration_secs(&self) -> u64 {
        self.record.own_duration_secs
    }

    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Cached recursive duration, or `None` while the cache is dirty.
    pub fn cached_total_secs(&self) -> Option<u64> {
        if self.is_dirty() {
            None
        } else {
            Some(self.total_secs.load(Ordering::Acquire))
        }
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn store_total(&self, secs: u64) {
        self.total_secs.store(secs, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    fn attach_child(&mut self, child: TaskId) {
        if let Err(pos) = self.children.binary_search(&child) {
            self.children.insert(pos, child);
        }
    }

    fn detach_child(&mut self, child: TaskId) {
        if let Ok(pos) = self.children.binary_search(&child) {
            self.children.remove(pos);
        }
    }

    pub fn to_view(&self) -> TaskNode {
        TaskNode {
            record: self.record.clone(),
            children: self.children.clone(),
        }
    }
}

/// Owned copy of a node handed out across the tree lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    #[serde(flatten)]
    pub record: TaskRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskId>,
}

impl TaskNode {
    pub fn id(&self) -> TaskId {
        self.record.id
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }
}

#[derive(Debug)]
pub struct NodeStore {
    nodes: HashMap<TaskId, Node>,
    root: TaskId,
    max_depth: usize,
}

impl NodeStore {
    /// Assemble a store from already-linked nodes. Only the builder calls this.
    pub(crate) fn from_parts(nodes: HashMap<TaskId, Node>, root: TaskId, max_depth: usize) -> Self {
        Self {
            nodes,
            root,
            max_depth,
        }
    }

    pub fn root(&self) -> TaskId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        // The builder only produces stores whose root is present, and the
        // root can never be removed.
        &self.nodes[&self.root]
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: TaskId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(Error::TaskNotFound(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn parent_of(&self, id: TaskId) -> Result<Option<TaskId>> {
        Ok(self.node(id)?.parent_id())
    }

    pub fn children_of(&self, id: TaskId) -> Result<&[TaskId]> {
        Ok(self.node(id)?.children())
    }

    /// Ids from `id` up to and including the root.
    ///
    /// The walk is capped at `max_depth` hops so a corrupted store cannot
    /// spin forever.
    pub fn path_to_root(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let mut path = vec![id];
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent_id() {
            if path.len() > self.max_depth {
                return Err(StructuralError::DepthExceeded {
                    task: id,
                    max_depth: self.max_depth,
                }
                .into());
            }
            path.push(parent);
            current = self.node(parent)?;
        }
        Ok(path)
    }

    /// All ids below `id` in depth-first pre-order, excluding `id` itself.
    pub fn descendant_ids(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let mut out = Vec::new();
        let mut stack: Vec<TaskId> = self.node(id)?.children().iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.node(next)?.children().iter().rev().copied());
        }
        Ok(out)
    }

    /// True when `candidate` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, candidate: TaskId, id: TaskId) -> Result<bool> {
        Ok(self.path_to_root(id)?.contains(&candidate))
    }

    /// Records sorted by id, suitable for writing back to the repository.
    pub fn records(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.nodes.values().map(|n| n.record.clone()).collect();
        records.sort_by_key(|record| record.id);
        records
    }

    pub(crate) fn node_mut(&mut self, id: TaskId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(Error::TaskNotFound(id))
    }

    pub(crate) fn link_child(&mut self, parent: TaskId, child: TaskId) -> Result<()> {
        self.node_mut(parent)?.attach_child(child);
        Ok(())
    }

    /// Rewire `id` under `new_parent`, fixing both children lists.
    pub(crate) fn move_node(&mut self, id: TaskId, new_parent: TaskId) -> Result<()> {
        let old_parent = self.parent_of(id)?;
        if !self.contains(new_parent) {
            return Err(Error::TaskNotFound(new_parent));
        }
        if let Some(old) = old_parent {
            self.node_mut(old)?.detach_child(id);
        }
        self.node_mut(id)?.record.parent_id = Some(new_parent);
        self.link_child(new_parent, id)
    }

    pub(crate) fn set_title(&mut self, id: TaskId, title: String) -> Result<()> {
        self.node_mut(id)?.record.title = title;
        Ok(())
    }

    pub(crate) fn set_own_duration(&mut self, id: TaskId, secs: u64) -> Result<()> {
        self.node_mut(id)?.record.own_duration_secs = secs;
        Ok(())
    }

    pub(crate) fn insert(&mut self, record: TaskRecord) -> Result<()> {
        let id = record.id;
        let parent = record.parent_id;
        self.nodes.insert(id, Node::new(record));
        if let Some(parent) = parent {
            self.link_child(parent, id)?;
        }
        Ok(())
    }

    /// Drop a single node and unlink it from its parent. Children are left
    /// pointing at the removed id; callers relink or remove them first.
    pub(crate) fn remove(&mut self, id: TaskId) -> Result<Node> {
        let node = self.nodes.remove(&id).ok_or(Error::TaskNotFound(id))?;
        if let Some(parent) = node.parent_id() {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.detach_child(id);
            }
        }
        Ok(node)
    }
}
