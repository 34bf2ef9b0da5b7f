//! Shape checks for proposed tree changes.
//!
//! These never mutate the store. Callers run them under the same exclusive
//! lock hold as the commit that follows.

use crate::error::{Result, ValidationError};
use crate::store::NodeStore;
use crate::task::TaskId;

/// Reject moving `node` under `new_parent` if that would close a cycle.
pub fn check_reparent(store: &NodeStore, node: TaskId, new_parent: TaskId) -> Result<()> {
    if node == new_parent {
        return Err(ValidationError::SelfParent { task: node }.into());
    }
    store.node(node)?;
    if store.is_ancestor_or_self(node, new_parent)? {
        return Err(ValidationError::CyclicReference {
            task: node,
            new_parent,
        }
        .into());
    }
    Ok(())
}

/// Reject `title` under `parent` if another child already uses it.
///
/// Titles are compared for exact equality, without trimming or case folding.
pub fn check_rename(
    store: &NodeStore,
    parent: TaskId,
    title: &str,
    exclude: Option<TaskId>,
) -> Result<()> {
    for &child in store.children_of(parent)? {
        if Some(child) == exclude {
            continue;
        }
        if store.node(child)?.title() == title {
            return Err(ValidationError::DuplicateSibling {
                parent,
                title: title.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

pub fn check_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle.into());
    }
    Ok(())
}

/// Reject placing `task` (with a subtree `height` levels tall) under
/// `new_parent` if its deepest node would exceed the store's hop bound.
pub fn check_depth(store: &NodeStore, task: TaskId, new_parent: TaskId, height: usize) -> Result<()> {
    let depth = store.path_to_root(new_parent)?.len();
    if depth + height > store.max_depth() {
        return Err(ValidationError::TooDeep {
            task,
            max_depth: store.max_depth(),
        }
        .into());
    }
    Ok(())
}

/// Number of levels below `id`; zero for a leaf.
pub fn subtree_height(store: &NodeStore, id: TaskId) -> Result<usize> {
    let mut height = 0;
    let mut level = store.children_of(id)?.to_vec();
    while !level.is_empty() {
        height += 1;
        let mut next = Vec::new();
        for child in level {
            next.extend_from_slice(store.children_of(child)?);
        }
        level = next;
    }
    Ok(height)
}
