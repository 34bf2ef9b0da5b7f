//! tasktree - hierarchical task breakdown library
//!
//! This library keeps a work-breakdown tree of tasks in memory, guards
//! every change with group-based access rules and structural checks, and
//! rolls booked time up the tree.
//!
//! # Core Concepts
//!
//! - **Node store**: an id-keyed arena of tasks with parent and child links
//! - **Access rules**: per-group flags on a task, inherited by the subtree
//!   until a nearer task defines its own
//! - **Durations**: booked seconds per task, summed over subtrees and cached
//!   until something below changes
//!
//! # Module Organization
//!
//! - `task`: Task records and identifiers
//! - `store`: The node arena and its traversals
//! - `builder`: Assembling a store from a batch of records
//! - `validate`: Shape checks for proposed changes
//! - `access`: Rule lookup and the nearest-definition-wins resolver
//! - `duration`: Cached subtree duration rollups
//! - `service`: The locked tree facade that ties the above together
//! - `snapshot`: JSON snapshot files as record and rule source
//! - `config`: Configuration loading from `.tasktree.toml`
//! - `lock`: File locking and atomic writes
//! - `cli`: Command-line interface using clap
//! - `output`: Human and JSON output for CLI commands
//! - `error`: Error types and result aliases

pub mod access;
pub mod builder;
pub mod cli;
pub mod config;
pub mod duration;
pub mod error;
pub mod lock;
pub mod output;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod task;
pub mod validate;

pub use error::{Error, Result};
