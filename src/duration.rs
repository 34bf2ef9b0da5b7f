//! Recursive duration rollups with ancestor-only invalidation.
//!
//! Each node memoizes the sum of its own booked seconds and the rollups of
//! its children. A change at a node can only affect that node and its
//! ancestors, so [`invalidate`] marks exactly that chain dirty and leaves
//! every other cache alone. Dirty caches are rebuilt lazily on read.
//!
//! The caches are atomics so that readers holding only the shared tree lock
//! can memoize. Writers are excluded while readers run, so two readers that
//! race on the same dirty node store the same value.

use tracing::trace;

use crate::error::Result;
use crate::store::NodeStore;
use crate::task::TaskId;

/// Seconds booked on `id`, optionally including every descendant.
pub fn duration(store: &NodeStore, id: TaskId, recursive: bool) -> Result<u64> {
    let node = store.node(id)?;
    if !recursive {
        return Ok(node.own_duration_secs());
    }
    if let Some(total) = node.cached_total_secs() {
        return Ok(total);
    }
    recompute(store, id)
}

/// Mark `id` and all of its ancestors dirty.
pub fn invalidate(store: &NodeStore, id: TaskId) {
    let mut current = Some(id);
    let mut hops = 0;
    while let Some(next) = current {
        let Some(node) = store.get(next) else {
            break;
        };
        node.mark_dirty();
        if hops >= store.max_depth() {
            break;
        }
        hops += 1;
        current = node.parent_id();
    }
}

/// Recompute every cache in one post-order pass and clear all dirty flags.
pub fn refresh_all(store: &NodeStore) -> Result<u64> {
    for node in store.iter() {
        node.mark_dirty();
    }
    recompute(store, store.root())
}

/// Post-order rebuild of the dirty part of the subtree under `id`.
///
/// Iterative so deep trees cannot overflow the stack. Clean children are
/// reused as-is.
fn recompute(store: &NodeStore, id: TaskId) -> Result<u64> {
    let mut stack = vec![(id, false)];
    while let Some((current, expanded)) = stack.pop() {
        let node = store.node(current)?;
        if !node.is_dirty() {
            continue;
        }
        if expanded {
            let mut total = node.own_duration_secs();
            for child in node.children() {
                let child_total = store.node(*child)?.cached_total_secs().unwrap_or(0);
                total = total.saturating_add(child_total);
            }
            node.store_total(total);
            trace!(task = %current, total, "recomputed duration rollup");
        } else {
            stack.push((current, true));
            for child in node.children() {
                if store.node(*child)?.is_dirty() {
                    stack.push((*child, false));
                }
            }
        }
    }
    Ok(store.node(id)?.cached_total_secs().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::store::DEFAULT_MAX_DEPTH;
    use crate::task::TaskRecord;

    const HOUR: u64 = 3600;

    fn sample() -> NodeStore {
        build(
            vec![
                TaskRecord::root(1, "root"),
                TaskRecord::child(2, 1, "a").with_duration(HOUR),
                TaskRecord::child(3, 2, "a.1").with_duration(2 * HOUR),
                TaskRecord::child(4, 1, "b").with_duration(4 * HOUR),
                TaskRecord::child(5, 4, "b.1").with_duration(HOUR),
            ],
            DEFAULT_MAX_DEPTH,
        )
        .expect("build")
    }

    #[test]
    fn recursive_duration_sums_subtree() {
        let store = sample();
        assert_eq!(duration(&store, TaskId(1), true).expect("root"), 8 * HOUR);
        assert_eq!(duration(&store, TaskId(2), true).expect("a"), 3 * HOUR);
        assert_eq!(duration(&store, TaskId(2), false).expect("a own"), HOUR);
        assert_eq!(duration(&store, TaskId(1), false).expect("root own"), 0);
    }

    #[test]
    fn reading_memoizes_and_clears_dirty() {
        let store = sample();
        assert!(store.node(TaskId(2)).expect("node").is_dirty());
        duration(&store, TaskId(2), true).expect("a");
        assert_eq!(
            store.node(TaskId(2)).expect("node").cached_total_secs(),
            Some(3 * HOUR)
        );
        assert!(store.node(TaskId(3)).expect("node").cached_total_secs().is_some());
        // Unrelated subtree was not touched by a read of `a`.
        assert!(store.node(TaskId(4)).expect("node").is_dirty());
    }

    #[test]
    fn invalidate_marks_only_ancestor_chain() {
        let store = sample();
        refresh_all(&store).expect("refresh");
        invalidate(&store, TaskId(3));

        assert!(store.node(TaskId(3)).expect("node").is_dirty());
        assert!(store.node(TaskId(2)).expect("node").is_dirty());
        assert!(store.node(TaskId(1)).expect("node").is_dirty());
        assert_eq!(
            store.node(TaskId(4)).expect("node").cached_total_secs(),
            Some(5 * HOUR)
        );
        assert_eq!(
            store.node(TaskId(5)).expect("node").cached_total_secs(),
            Some(HOUR)
        );
    }

    #[test]
    fn own_duration_change_is_picked_up_after_invalidate() {
        let mut store = sample();
        refresh_all(&store).expect("refresh");
        store.set_own_duration(TaskId(3), 5 * HOUR).expect("set");
        invalidate(&store, TaskId(3));
        assert_eq!(duration(&store, TaskId(1), true).expect("root"), 11 * HOUR);
        assert_eq!(duration(&store, TaskId(2), true).expect("a"), 6 * HOUR);
    }

    #[test]
    fn refresh_all_returns_root_total() {
        let store = sample();
        assert_eq!(refresh_all(&store).expect("refresh"), 8 * HOUR);
        assert!(store.iter().all(|node| !node.is_dirty()));
    }
}
