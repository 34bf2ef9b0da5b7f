//! Build a [`NodeStore`] from a flat batch of task records.
//!
//! Used at startup and by [`crate::service::TaskTree::refresh`]. Building is
//! pure: a failed build never touches a live tree.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::StructuralError;
use crate::store::{Node, NodeStore};
use crate::task::{TaskId, TaskRecord};

/// Index, link and verify `records`.
///
/// On success exactly one record has no parent and every other record
/// reaches it within `max_depth` hops.
pub fn build(records: Vec<TaskRecord>, max_depth: usize) -> Result<NodeStore, StructuralError> {
    let mut nodes: HashMap<TaskId, Node> = HashMap::with_capacity(records.len());
    let mut roots = Vec::new();
    for record in records {
        let id = record.id;
        if record.parent_id.is_none() {
            roots.push(id);
        }
        if nodes.insert(id, Node::new(record)).is_some() {
            return Err(StructuralError::DuplicateId { task: id });
        }
    }

    let root = match roots.as_slice() {
        [] => return Err(StructuralError::NoRoot),
        [root] => *root,
        _ => {
            roots.sort();
            return Err(StructuralError::MultipleRoots { roots });
        }
    };

    let mut ids: Vec<TaskId> = nodes.keys().copied().collect();
    ids.sort();

    let mut links = Vec::with_capacity(ids.len().saturating_sub(1));
    for &id in &ids {
        if let Some(parent) = nodes[&id].parent_id() {
            if !nodes.contains_key(&parent) {
                return Err(StructuralError::DanglingParent { task: id, parent });
            }
            links.push((parent, id));
        }
    }

    verify_depths(&nodes, &ids, root, max_depth)?;

    let mut store = NodeStore::from_parts(nodes, root, max_depth);
    for (parent, child) in links {
        // Parents were checked above, so linking cannot miss.
        let _ = store.link_child(parent, child);
    }

    debug!(tasks = store.len(), root = %root, "built task tree");
    Ok(store)
}

/// Bounded ancestor walk from every node, memoizing depths so each node is
/// walked once.
fn verify_depths(
    nodes: &HashMap<TaskId, Node>,
    ids: &[TaskId],
    root: TaskId,
    max_depth: usize,
) -> Result<(), StructuralError> {
    let mut depth: HashMap<TaskId, usize> = HashMap::with_capacity(nodes.len());
    depth.insert(root, 0);

    for &start in ids {
        let mut chain = Vec::new();
        let mut on_chain = HashSet::new();
        let mut current = start;
        let base = loop {
            if let Some(&known) = depth.get(&current) {
                break known;
            }
            if !on_chain.insert(current) {
                return Err(StructuralError::CyclicParentChain { task: start });
            }
            chain.push(current);
            if chain.len() > max_depth {
                return Err(StructuralError::DepthExceeded {
                    task: start,
                    max_depth,
                });
            }
            // Every non-root node has a parent that exists (checked by caller).
            match nodes.get(&current).and_then(Node::parent_id) {
                Some(parent) => current = parent,
                None => return Err(StructuralError::CyclicParentChain { task: start }),
            }
        };

        for (offset, id) in chain.iter().rev().enumerate() {
            let level = base + offset + 1;
            if level > max_depth {
                return Err(StructuralError::DepthExceeded {
                    task: start,
                    max_depth,
                });
            }
            depth.insert(*id, level);
        }
    }

    Ok(())
}
