//! Task records as handed to the tree by the external repository.
//!
//! The tree never interprets [`TaskPolicy`]; it only carries it along so a
//! record read into the tree can be written back out unchanged.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stable identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| Error::InvalidArgument(format!("invalid task id '{s}'")))
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        TaskId(value)
    }
}

/// Identifier of a user group that access rules are granted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(value: impl Into<String>) -> Self {
        GroupId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the caller performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        UserId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether time may be booked on a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimesheetBookingStatus {
    /// Use the nearest ancestor's setting.
    #[default]
    Inherit,
    Open,
    /// Bookings only on leaf tasks of this subtree.
    OnlyLeafs,
    NoBooking,
    Disabled,
}

/// Task-level policy flags carried through the tree untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protect_timesheets_until: Option<NaiveDate>,
    #[serde(default)]
    pub privacy_protected: bool,
    /// Cost-center (kost2) black or white list, as stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kost2_list: Option<String>,
    #[serde(default)]
    pub kost2_is_black_list: bool,
    #[serde(default)]
    pub timesheet_booking_status: TimesheetBookingStatus,
}

/// A task as stored by the external repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    /// `None` only for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub title: String,
    /// Seconds booked directly on this task, excluding descendants.
    #[serde(default)]
    pub own_duration_secs: u64,
    #[serde(default)]
    pub policy: TaskPolicy,
}

impl TaskRecord {
    pub fn new(id: impl Into<TaskId>, parent_id: Option<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id,
            title: title.into(),
            own_duration_secs: 0,
            policy: TaskPolicy::default(),
        }
    }

    pub fn root(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self::new(id, None, title)
    }

    pub fn child(id: impl Into<TaskId>, parent: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self::new(id, Some(parent.into()), title)
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.own_duration_secs = seconds;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
