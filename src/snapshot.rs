//! JSON snapshot files standing in for the external repositories.
//!
//! A snapshot carries task records, access rules, group memberships and
//! administrator ids in one document. [`SnapshotFile`] reads and writes it
//! under a sibling lock file so concurrent `tasktree` processes never see a
//! torn write, and implements [`TaskRecordSource`] so a tree can be
//! refreshed straight from disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access::{AccessRule, InMemoryAccessRules, StaticDirectory};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::{lock_path_for, read_locked_str, write_atomic, write_atomic_locked, FileLock};
use crate::service::TaskRecordSource;
use crate::task::{GroupId, TaskRecord, UserId};

pub const SNAPSHOT_SCHEMA_VERSION: &str = "tasktree.snapshot.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_rules: Vec<AccessRule>,
    /// User → groups the user belongs to.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub memberships: BTreeMap<UserId, Vec<GroupId>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admins: Vec<UserId>,
}

impl Snapshot {
    pub fn new(tasks: Vec<TaskRecord>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            tasks,
            access_rules: Vec::new(),
            memberships: BTreeMap::new(),
            admins: Vec::new(),
        }
    }

    pub fn access_rules(&self) -> InMemoryAccessRules {
        InMemoryAccessRules::from_rules(self.access_rules.iter().cloned())
    }

    /// Directory built from memberships, admins and the configured admin
    /// groups.
    pub fn directory(&self, config: &Config) -> StaticDirectory {
        let mut directory = StaticDirectory::new();
        for (user, groups) in &self.memberships {
            for group in groups {
                directory = directory.with_member(user.clone(), group.clone());
            }
        }
        for admin in &self.admins {
            directory = directory.with_admin(admin.clone());
        }
        for group in &config.access.admin_groups {
            directory = directory.with_admin_group(GroupId::new(group.trim()));
        }
        directory
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    lock_timeout_ms: u64,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        Self {
            path: path.into(),
            lock_timeout_ms,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Snapshot> {
        self.ensure_exists()?;
        let content = read_locked_str(&self.path, self.lock_timeout_ms)?;
        self.parse(&content)
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let content = Self::render(snapshot)?;
        write_atomic_locked(&self.path, content.as_bytes(), self.lock_timeout_ms)?;
        debug!(path = %self.path.display(), tasks = snapshot.tasks.len(), "saved snapshot");
        Ok(())
    }

    /// Read-modify-write under one lock hold.
    ///
    /// The snapshot is only written back when `apply` succeeds.
    pub fn update<T>(&self, apply: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        self.ensure_exists()?;
        let _lock = FileLock::acquire(lock_path_for(&self.path), self.lock_timeout_ms)?;
        let content = std::fs::read_to_string(&self.path)?;
        let mut snapshot = self.parse(&content)?;
        let out = apply(&mut snapshot)?;
        write_atomic(&self.path, Self::render(&snapshot)?.as_bytes())?;
        debug!(path = %self.path.display(), tasks = snapshot.tasks.len(), "updated snapshot");
        Ok(out)
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        Err(Error::InvalidArgument(format!(
            "snapshot not found: {}",
            self.path.display()
        )))
    }

    fn render(snapshot: &Snapshot) -> Result<String> {
        let mut snapshot = snapshot.clone();
        snapshot.generated_at = Utc::now();
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    fn parse(&self, content: &str) -> Result<Snapshot> {
        let snapshot: Snapshot = serde_json::from_str(content)?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(Error::InvalidArgument(format!(
                "unsupported snapshot schema '{}'",
                snapshot.schema_version
            )));
        }
        debug!(path = %self.path.display(), tasks = snapshot.tasks.len(), "loaded snapshot");
        Ok(snapshot)
    }
}

impl TaskRecordSource for SnapshotFile {
    fn load_tasks(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.load()?.tasks)
    }
}
