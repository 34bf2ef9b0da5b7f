#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tasktree::access::{AccessRule, InMemoryAccessRules, StaticDirectory};
use tasktree::config::Config;
use tasktree::service::{StaticTaskSource, TaskTree};
use tasktree::snapshot::{Snapshot, SnapshotFile};
use tasktree::task::{GroupId, TaskId, TaskRecord, UserId};
use tempfile::TempDir;

pub const ADMIN: &str = "admin";

/// Ids of the `d` hierarchy used across tests.
pub mod ids {
    use tasktree::task::TaskId;

    pub const ROOT: TaskId = TaskId(1);
    pub const D: TaskId = TaskId(10);
    pub const D1: TaskId = TaskId(11);
    pub const D11: TaskId = TaskId(111);
    pub const D12: TaskId = TaskId(112);
    pub const D121: TaskId = TaskId(1121);
    pub const D2: TaskId = TaskId(12);
    pub const E: TaskId = TaskId(20);
    pub const E1: TaskId = TaskId(21);
}

/// root → d → d.1 → {d.1.1, d.1.2 → d.1.2.1}, d → d.2, root → e → e.1
pub fn hierarchy() -> Vec<TaskRecord> {
    vec![
        TaskRecord::root(1, "root"),
        TaskRecord::child(10, 1, "d").with_duration(100),
        TaskRecord::child(11, 10, "d.1").with_duration(10),
        TaskRecord::child(111, 11, "d.1.1").with_duration(1),
        TaskRecord::child(112, 11, "d.1.2").with_duration(2),
        TaskRecord::child(1121, 112, "d.1.2.1").with_duration(3),
        TaskRecord::child(12, 10, "d.2").with_duration(20),
        TaskRecord::child(20, 1, "e").with_duration(200),
        TaskRecord::child(21, 20, "e.1").with_duration(300),
    ]
}

pub fn user(name: &str) -> UserId {
    UserId::new(name)
}

pub fn group(name: &str) -> GroupId {
    GroupId::new(name)
}

/// Tree where only [`ADMIN`] can change anything.
pub fn admin_tree(records: Vec<TaskRecord>) -> TaskTree {
    TaskTree::load(
        Arc::new(StaticTaskSource::new(records)),
        Arc::new(InMemoryAccessRules::new()),
        Arc::new(StaticDirectory::new().with_admin(user(ADMIN))),
        &Config::default(),
    )
    .expect("load tree")
}

pub struct Fixture {
    pub tree: TaskTree,
    pub source: Arc<StaticTaskSource>,
    pub rules: Arc<InMemoryAccessRules>,
}

/// Tree with shared handles to its source and rule table.
pub fn fixture(records: Vec<TaskRecord>, directory: StaticDirectory) -> Fixture {
    let source = Arc::new(StaticTaskSource::new(records));
    let rules = Arc::new(InMemoryAccessRules::new());
    let tree = TaskTree::load(
        source.clone(),
        rules.clone(),
        Arc::new(directory),
        &Config::default(),
    )
    .expect("load tree");
    Fixture {
        tree,
        source,
        rules,
    }
}

pub struct TestSnapshot {
    dir: TempDir,
}

impl TestSnapshot {
    /// Snapshot of [`hierarchy`] where `alice` (group `pm`) has full rights
    /// on `d` and read-only rights on `e`, and [`ADMIN`] is an administrator.
    pub fn new() -> Self {
        let mut snapshot = Snapshot::new(hierarchy());
        snapshot
            .access_rules
            .push(AccessRule::full(group("pm"), ids::D));
        snapshot.access_rules.push(
            AccessRule::new(group("pm"), ids::E).allow(tasktree::access::Operation::Select),
        );
        snapshot
            .memberships
            .insert(user("alice"), vec![group("pm")]);
        snapshot.admins.push(user(ADMIN));
        Self::with(snapshot)
    }

    pub fn with(snapshot: Snapshot) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let file = SnapshotFile::new(dir.path().join("tasktree.json"), 1000);
        file.save(&snapshot).expect("save snapshot");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("tasktree.json")
    }

    pub fn load(&self) -> Snapshot {
        SnapshotFile::new(self.path(), 1000)
            .load()
            .expect("load snapshot")
    }

    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.load().tasks.into_iter().find(|task| task.id == id)
    }

    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.dir.path().join(".tasktree.toml");
        fs::write(&path, contents).expect("write config");
        path
    }
}
