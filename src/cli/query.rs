//! Read-only tasktree commands
//!
//! `check`, `show`, `path`, `children`, `descendants`, `duration` and
//! `access` load the snapshot, build the tree and report on it without
//! writing anything back.

use std::collections::HashSet;

use serde::Serialize;

use crate::access::{EffectiveAccess, Operation};
use crate::error::Result;
use crate::output::{emit_success, format_seconds, HumanOutput};
use crate::service::TaskTree;
use crate::snapshot::Snapshot;
use crate::store::TaskNode;
use crate::task::TaskId;

use super::{tree_from, Common};

#[derive(Serialize)]
struct CheckReport {
    root: TaskId,
    tasks: usize,
    total_secs: u64,
    access_rules: usize,
    max_depth: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    orphan_rules: Vec<TaskId>,
}

#[derive(Serialize)]
struct ShowReport {
    task: TaskNode,
    path: Vec<TaskId>,
    own_secs: u64,
    total_secs: u64,
}

#[derive(Serialize)]
struct IdsReport {
    task: TaskId,
    ids: Vec<TaskId>,
}

#[derive(Serialize)]
struct ChildrenReport {
    task: TaskId,
    children: Vec<TaskNode>,
}

#[derive(Serialize)]
struct DurationReport {
    task: TaskId,
    recursive: bool,
    seconds: u64,
}

#[derive(Serialize)]
struct AccessReport {
    task: TaskId,
    user: String,
    operation: Operation,
    granted: bool,
    admin: bool,
    effective: EffectiveAccess,
}

fn open(common: &Common) -> Result<(Snapshot, TaskTree)> {
    let config = common.load_config()?;
    let snapshot = common.snapshot_file(&config).load()?;
    let tree = tree_from(&snapshot, &config)?;
    Ok((snapshot, tree))
}

/// One line per task: `<id> <title>`.
fn describe(tree: &TaskTree, ids: &[TaskId]) -> Result<Vec<String>> {
    let reader = tree.read()?;
    ids.iter()
        .map(|id| Ok(format!("{id} {}", reader.node(*id)?.title())))
        .collect()
}

pub fn run_check(common: &Common) -> Result<()> {
    let (snapshot, tree) = open(common)?;
    let reader = tree.read()?;

    let mut orphan_rules: Vec<TaskId> = snapshot
        .access_rules
        .iter()
        .map(|rule| rule.task_id)
        .filter(|task| !reader.contains(*task))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    orphan_rules.sort();

    let report = CheckReport {
        root: reader.root(),
        tasks: reader.len(),
        total_secs: reader.duration(reader.root(), true)?,
        access_rules: snapshot.access_rules.len(),
        max_depth: reader.max_depth(),
        orphan_rules,
    };
    drop(reader);

    let mut human = HumanOutput::new("tasktree check: ok");
    human.push_summary("root", report.root.to_string());
    human.push_summary("tasks", report.tasks.to_string());
    human.push_summary("booked", format_seconds(report.total_secs));
    human.push_summary("access rules", report.access_rules.to_string());
    for task in &report.orphan_rules {
        human.push_warning(format!("access rule on unknown task {task}"));
    }
    human.push_next_step(format!("tasktree descendants {}", report.root));

    emit_success(common.output(), "check", &report, Some(&human))
}

pub fn run_show(common: &Common, id: TaskId) -> Result<()> {
    let (_, tree) = open(common)?;
    let report = {
        let reader = tree.read()?;
        let node = reader.node(id)?;
        ShowReport {
            task: node.to_view(),
            path: reader.path_to_root(id)?,
            own_secs: node.own_duration_secs(),
            total_secs: reader.duration(id, true)?,
        }
    };

    let mut human = HumanOutput::new(format!("tasktree show: {} {}", id, report.task.title()));
    match report.task.record.parent_id {
        Some(parent) => human.push_summary("parent", parent.to_string()),
        None => human.push_summary("parent", "none (root)"),
    }
    human.push_summary("children", report.task.children.len().to_string());
    human.push_summary("booked", format_seconds(report.own_secs));
    human.push_summary("booked incl. subtasks", format_seconds(report.total_secs));
    let policy = &report.task.record.policy;
    if policy.privacy_protected {
        human.push_detail("privacy protected");
    }
    if let Some(until) = policy.protect_timesheets_until {
        human.push_detail(format!("timesheets protected until {until}"));
    }

    emit_success(common.output(), "show", &report, Some(&human))
}

pub fn run_path(common: &Common, id: TaskId) -> Result<()> {
    let (_, tree) = open(common)?;
    let ids = tree.path_to_root(id)?;

    let mut human = HumanOutput::new(format!("tasktree path: {id}"));
    human.push_summary("depth", ids.len().saturating_sub(1).to_string());
    for line in describe(&tree, &ids)? {
        human.push_detail(line);
    }

    emit_success(common.output(), "path", &IdsReport { task: id, ids }, Some(&human))
}

pub fn run_children(common: &Common, id: TaskId) -> Result<()> {
    let (_, tree) = open(common)?;
    let children = tree.children(id)?;

    let mut human = HumanOutput::new(format!("tasktree children: {id}"));
    human.push_summary("count", children.len().to_string());
    for child in &children {
        human.push_detail(format!("{} {}", child.id(), child.title()));
    }

    emit_success(
        common.output(),
        "children",
        &ChildrenReport { task: id, children },
        Some(&human),
    )
}

pub fn run_descendants(common: &Common, id: TaskId) -> Result<()> {
    let (_, tree) = open(common)?;
    let ids = tree.descendant_ids(id)?;

    let mut human = HumanOutput::new(format!("tasktree descendants: {id}"));
    human.push_summary("count", ids.len().to_string());
    for line in describe(&tree, &ids)? {
        human.push_detail(line);
    }

    emit_success(
        common.output(),
        "descendants",
        &IdsReport { task: id, ids },
        Some(&human),
    )
}

pub fn run_duration(common: &Common, id: TaskId, recursive: bool) -> Result<()> {
    let (_, tree) = open(common)?;
    let seconds = tree.duration(id, recursive)?;

    let mut human = HumanOutput::new(format!("tasktree duration: {id}"));
    human.push_summary("seconds", seconds.to_string());
    human.push_summary("booked", format_seconds(seconds));
    if !recursive {
        human.push_next_step(format!("tasktree duration {id} --recursive"));
    }

    emit_success(
        common.output(),
        "duration",
        &DurationReport {
            task: id,
            recursive,
            seconds,
        },
        Some(&human),
    )
}

pub fn run_access(common: &Common, id: TaskId, operation: Operation) -> Result<()> {
    let user = common.require_user()?;
    let (_, tree) = open(common)?;
    let report = {
        let reader = tree.read()?;
        let resolver = tree.resolver();
        let groups = resolver.directory().groups_of(&user);
        AccessReport {
            task: id,
            user: user.to_string(),
            operation,
            granted: resolver.authorize(&reader, &user, id, operation)?.is_granted(),
            admin: resolver.directory().is_admin(&user),
            effective: resolver.effective(&reader, &groups, id)?,
        }
    };

    let verdict = if report.granted { "granted" } else { "denied" };
    let mut human = HumanOutput::new(format!(
        "tasktree access: {operation} on {id} for {user}: {verdict}"
    ));
    if report.admin {
        human.push_summary("admin", "yes");
    }
    match report.effective.defined_at {
        Some(scope) => human.push_summary("decided at", scope.to_string()),
        None => human.push_summary("decided at", "no applicable rule"),
    }

    emit_success(common.output(), "access", &report, Some(&human))
}
