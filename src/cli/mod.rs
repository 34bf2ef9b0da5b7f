//! Command-line interface for tasktree
//!
//! This module defines the CLI structure using clap derive macros.
//! Read-only commands live in `query`, tree changes in `edit`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::access::Operation;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::OutputOptions;
use crate::service::{StaticTaskSource, TaskTree};
use crate::snapshot::{Snapshot, SnapshotFile};
use crate::task::{TaskId, UserId};

mod edit;
mod query;

/// Snapshot used when neither `--snapshot` nor `TASKTREE_SNAPSHOT` is set.
const DEFAULT_SNAPSHOT: &str = "tasktree.json";

/// tasktree - hierarchical task breakdown with access control
///
/// Inspects and edits a task tree stored in a JSON snapshot. Every change is
/// checked for access rights and tree shape before it is written back.
#[derive(Parser, Debug)]
#[command(name = "tasktree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the snapshot file (defaults to ./tasktree.json)
    #[arg(short, long, global = true, env = "TASKTREE_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Path to the config file (defaults to ./.tasktree.toml)
    #[arg(long, global = true, env = "TASKTREE_CONFIG")]
    pub config: Option<PathBuf>,

    /// User the change is made on behalf of
    #[arg(short, long, global = true, env = "TASKTREE_USER")]
    pub user: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new snapshot holding only a root task
    Init {
        /// Title of the root task
        title: String,

        /// Id of the root task
        #[arg(long, default_value_t = 1)]
        id: u64,
    },

    /// Build the tree and report whether the snapshot is well formed
    Check,

    /// Show one task
    Show {
        /// Task id
        id: TaskId,
    },

    /// List the ids from a task up to the root
    Path {
        /// Task id
        id: TaskId,
    },

    /// List the direct children of a task
    Children {
        /// Task id
        id: TaskId,
    },

    /// List every task below a task
    Descendants {
        /// Task id
        id: TaskId,
    },

    /// Booked time of a task
    Duration {
        /// Task id
        id: TaskId,

        /// Include every descendant
        #[arg(short, long)]
        recursive: bool,
    },

    /// Check whether --user may perform an operation on a task
    Access {
        /// Task id
        id: TaskId,

        /// select, insert, update or delete
        operation: Operation,
    },

    /// Move a task under a new parent
    Move {
        /// Task to move
        id: TaskId,

        /// New parent task
        #[arg(long)]
        to: TaskId,
    },

    /// Change the title of a task
    Rename {
        /// Task id
        id: TaskId,

        /// New title
        title: String,
    },

    /// Add a task below an existing parent
    Add {
        /// Id of the new task
        id: TaskId,

        /// Parent task
        #[arg(long)]
        parent: TaskId,

        /// Title of the new task
        title: String,

        /// Seconds already booked on the task
        #[arg(long, default_value_t = 0)]
        seconds: u64,
    },

    /// Remove a task
    Remove {
        /// Task id
        id: TaskId,

        /// Remove the whole subtree
        #[arg(long, conflicts_with = "relink")]
        cascade: bool,

        /// Move the children up to the removed task's parent
        #[arg(long)]
        relink: bool,
    },

    /// Set the booked seconds of a task
    Book {
        /// Task id
        id: TaskId,

        /// Total seconds booked on the task itself
        seconds: u64,
    },
}

/// Flags every command shares.
#[derive(Debug, Clone)]
pub struct Common {
    pub snapshot: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub user: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

impl Common {
    pub fn output(&self) -> OutputOptions {
        OutputOptions {
            json: self.json,
            quiet: self.quiet,
        }
    }

    /// Explicit `--config` must load cleanly; the implicit one falls back
    /// to defaults.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load(path),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                Ok(Config::load_from_dir(&cwd))
            }
        }
    }

    pub fn snapshot_file(&self, config: &Config) -> SnapshotFile {
        let path = self
            .snapshot
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT));
        SnapshotFile::new(path, config.snapshot.lock_timeout_ms)
    }

    pub fn require_user(&self) -> Result<UserId> {
        match self.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => Ok(UserId::new(user)),
            _ => Err(Error::InvalidArgument(
                "no user given; pass --user or set TASKTREE_USER".to_string(),
            )),
        }
    }
}

/// Tree over the records, rules and directory held by one snapshot.
pub fn tree_from(snapshot: &Snapshot, config: &Config) -> Result<TaskTree> {
    TaskTree::load(
        Arc::new(StaticTaskSource::new(snapshot.tasks.clone())),
        Arc::new(snapshot.access_rules()),
        Arc::new(snapshot.directory(config)),
        config,
    )
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let common = Common {
            snapshot: self.snapshot,
            config: self.config,
            user: self.user,
            json: self.json,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Init { title, id } => edit::run_init(edit::InitOptions {
                title,
                id: TaskId(id),
                common,
            }),
            Commands::Check => query::run_check(&common),
            Commands::Show { id } => query::run_show(&common, id),
            Commands::Path { id } => query::run_path(&common, id),
            Commands::Children { id } => query::run_children(&common, id),
            Commands::Descendants { id } => query::run_descendants(&common, id),
            Commands::Duration { id, recursive } => query::run_duration(&common, id, recursive),
            Commands::Access { id, operation } => query::run_access(&common, id, operation),
            Commands::Move { id, to } => edit::run_move(edit::MoveOptions { id, to, common }),
            Commands::Rename { id, title } => {
                edit::run_rename(edit::RenameOptions { id, title, common })
            }
            Commands::Add {
                id,
                parent,
                title,
                seconds,
            } => edit::run_add(edit::AddOptions {
                id,
                parent,
                title,
                seconds,
                common,
            }),
            Commands::Remove {
                id,
                cascade,
                relink,
            } => edit::run_remove(edit::RemoveOptions {
                id,
                cascade,
                relink,
                common,
            }),
            Commands::Book { id, seconds } => {
                edit::run_book(edit::BookOptions { id, seconds, common })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_move_with_globals() {
        let cli = Cli::try_parse_from([
            "tasktree", "--user", "alice", "move", "3", "--to", "4", "--json",
        ])
        .expect("parse");
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Move {
                id: TaskId(3),
                to: TaskId(4)
            }
        ));
    }

    #[test]
    fn cascade_and_relink_conflict() {
        let err = Cli::try_parse_from(["tasktree", "remove", "3", "--cascade", "--relink"])
            .expect_err("conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn blank_user_is_rejected() {
        let common = Common {
            snapshot: None,
            config: None,
            user: Some("  ".to_string()),
            json: false,
            quiet: false,
        };
        assert!(matches!(
            common.require_user(),
            Err(Error::InvalidArgument(_))
        ));
    }
}
