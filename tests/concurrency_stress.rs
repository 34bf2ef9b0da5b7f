mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tasktree::access::{InMemoryAccessRules, StaticDirectory};
use tasktree::builder;
use tasktree::config::Config;
use tasktree::error::{Error, ValidationError};
use tasktree::service::{TaskRecordSource, TaskTree};
use tasktree::store::DEFAULT_MAX_DEPTH;
use tasktree::task::{TaskId, TaskRecord};

use support::{admin_tree, user, ADMIN};

const TASKS: u64 = 30;
const WRITERS: u64 = 8;
const READERS: u64 = 4;
const OPS_PER_WRITER: u64 = 300;

fn flat_tree() -> Vec<TaskRecord> {
    let mut records = vec![TaskRecord::root(1, "root")];
    for id in 2..=TASKS + 1 {
        records.push(TaskRecord::child(id, 1, format!("t{id}")).with_duration(id));
    }
    records
}

fn expected_total() -> u64 {
    (2..=TASKS + 1).sum()
}

/// Small deterministic generator so every run exercises the same moves.
fn next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 33
}

#[test]
fn concurrent_reparents_never_break_the_tree() {
    let tree = Arc::new(admin_tree(flat_tree()));
    let mut handles = Vec::new();

    for writer in 0..WRITERS {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            let admin = user(ADMIN);
            let mut state = writer + 1;
            let mut moved = 0;
            for _ in 0..OPS_PER_WRITER {
                let node = TaskId(2 + next(&mut state) % TASKS);
                let parent = TaskId(1 + next(&mut state) % (TASKS + 1));
                match tree.set_parent(&admin, node, parent) {
                    Ok(()) => moved += 1,
                    Err(Error::Validation(
                        ValidationError::SelfParent { .. }
                        | ValidationError::CyclicReference { .. }
                        | ValidationError::TooDeep { .. },
                    )) => {}
                    Err(other) => panic!("unexpected error moving {node} under {parent}: {other}"),
                }
            }
            moved
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..READERS {
        let tree = Arc::clone(&tree);
        readers.push(thread::spawn(move || {
            for _ in 0..OPS_PER_WRITER {
                let reader = tree.read().expect("read");
                assert_eq!(
                    reader.duration(reader.root(), true).expect("root total"),
                    expected_total()
                );
                let path = reader.path_to_root(TaskId(2)).expect("path");
                assert_eq!(path.last(), Some(&TaskId(1)));
            }
        }));
    }

    let moved: u64 = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread"))
        .sum();
    for reader in readers {
        reader.join().expect("reader thread");
    }
    assert!(moved > 0);

    // The committed records must still form exactly one acyclic tree.
    let records = tree.records().expect("records");
    assert_eq!(records.len() as u64, TASKS + 1);
    let rebuilt = builder::build(records, DEFAULT_MAX_DEPTH).expect("rebuild");
    assert_eq!(rebuilt.root(), TaskId(1));
    for node in rebuilt.iter() {
        let path = rebuilt.path_to_root(node.id()).expect("path");
        assert_eq!(path.last(), Some(&TaskId(1)));
    }
    assert_eq!(tree.duration(TaskId(1), true).expect("total"), expected_total());
}

#[test]
fn refresh_races_with_moves() {
    let tree = Arc::new(admin_tree(flat_tree()));
    let mover = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            let admin = user(ADMIN);
            for step in 0..200u64 {
                let node = TaskId(2 + step % TASKS);
                let _ = tree.set_parent(&admin, node, TaskId(1 + (step * 7) % (TASKS + 1)));
            }
        })
    };
    let refresher = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for _ in 0..50 {
                let report = tree.refresh().expect("refresh");
                assert_eq!(report.total_secs, expected_total());
            }
        })
    };

    mover.join().expect("mover");
    refresher.join().expect("refresher");
    builder::build(tree.records().expect("records"), DEFAULT_MAX_DEPTH).expect("rebuild");
}

/// Source that records how many loads overlap.
struct SlowSource {
    records: Vec<TaskRecord>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl TaskRecordSource for SlowSource {
    fn load_tasks(&self) -> tasktree::Result<Vec<TaskRecord>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

#[test]
fn refreshes_run_one_at_a_time() {
    let source = Arc::new(SlowSource {
        records: flat_tree(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let tree = Arc::new(
        TaskTree::load(
            source.clone(),
            Arc::new(InMemoryAccessRules::new()),
            Arc::new(StaticDirectory::new()),
            &Config::default(),
        )
        .expect("load tree"),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for _ in 0..10 {
                    tree.refresh().expect("refresh");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("refresh thread");
    }

    assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    assert_eq!(tree.duration(TaskId(1), true).expect("total"), expected_total());
}
