//! Error types for tasktree
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown task, rejected tree shape)
//! - 3: Blocked by policy (access denied)
//! - 4: Operation failed (tree build, I/O, lock contention)

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::access::{AccessSide, Operation};
use crate::task::TaskId;

/// Exit codes for the tasktree CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const POLICY_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Rejection of a proposed rename/reparent/insert/remove.
///
/// Raised before anything is committed; the tree is unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task {task} cannot be its own parent")]
    SelfParent { task: TaskId },

    #[error("moving task {task} under {new_parent} would create a cycle")]
    CyclicReference { task: TaskId, new_parent: TaskId },

    #[error("task {parent} already has a child titled '{title}'")]
    DuplicateSibling { parent: TaskId, title: String },

    #[error("task title cannot be empty")]
    EmptyTitle,

    #[error("root task {task} cannot be moved or removed")]
    RootImmovable { task: TaskId },

    #[error("task {task} has {children} children; cascade or relink them first")]
    HasChildren { task: TaskId, children: usize },

    #[error("task {task} needs a parent; the tree already has a root")]
    MissingParent { task: TaskId },

    #[error("task {task} already exists")]
    TaskExists { task: TaskId },

    #[error("task {task} would end up more than {max_depth} levels below the root")]
    TooDeep { task: TaskId, max_depth: usize },
}

/// Access check that came back denied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("access denied: {operation} on {side} scope of task {task} (checked at {scope})")]
pub struct AccessError {
    /// Task the caller tried to change.
    pub task: TaskId,
    pub operation: Operation,
    pub side: AccessSide,
    /// Task whose effective scope was evaluated.
    pub scope: TaskId,
}

/// Failure to assemble a tree from a batch of task records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("no root task (every record has a parent)")]
    NoRoot,

    #[error("multiple root tasks: {}", format_ids(.roots))]
    MultipleRoots { roots: Vec<TaskId> },

    #[error("task {task} references missing parent {parent}")]
    DanglingParent { task: TaskId, parent: TaskId },

    #[error("duplicate task id {task}")]
    DuplicateId { task: TaskId },

    #[error("parent chain of task {task} is cyclic")]
    CyclicParentChain { task: TaskId },

    #[error("task {task} is more than {max_depth} levels below the root")]
    DepthExceeded { task: TaskId, max_depth: usize },
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Main error type for tasktree operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Rejected: {0}")]
    Validation(#[from] ValidationError),

    // Policy blocks (exit code 3)
    #[error("{0}")]
    Access(#[from] AccessError),

    // Operation failures (exit code 4)
    #[error("Tree build failed: {0}")]
    Structural(#[from] StructuralError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Task tree lock poisoned")]
    LockPoisoned,

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::Validation(_) => exit_codes::USER_ERROR,

            // Policy blocks
            Error::Access(_) => exit_codes::POLICY_BLOCKED,

            // Operation failures
            Error::Structural(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::LockPoisoned
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Stable category name used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self.exit_code() {
            exit_codes::USER_ERROR => "user_error",
            exit_codes::POLICY_BLOCKED => "policy_blocked",
            _ => "operation_failed",
        }
    }

    /// Structured details for JSON output, when the error carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::TaskNotFound(task) => Some(serde_json::json!({ "task": task })),
            Error::Access(err) => Some(serde_json::json!({
                "task": err.task,
                "operation": err.operation,
                "side": err.side,
                "scope": err.scope,
            })),
            Error::Structural(StructuralError::MultipleRoots { roots }) => {
                Some(serde_json::json!({ "roots": roots }))
            }
            _ => None,
        }
    }
}

/// Result type alias for tasktree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(Serialize)]
pub struct JsonError {
    pub message: String,
    pub code: i32,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            message: err.to_string(),
            code: err.exit_code(),
            kind: err.kind(),
            details: err.details(),
        }
    }
}
