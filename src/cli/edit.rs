//! tasktree commands that change the snapshot
//!
//! Each change loads the snapshot under its lock, applies the change through
//! [`TaskTree`] and writes the resulting records
//! back before the lock is released. A rejected change leaves the file
//! untouched.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::output::{emit_success, format_seconds, HumanOutput};
use crate::service::{RemovalMode, TaskTree};
use crate::snapshot::Snapshot;
use crate::task::{TaskId, TaskRecord};
use crate::validate;

use super::{tree_from, Common};

/// Options for `tasktree init`
pub struct InitOptions {
    pub title: String,
    pub id: TaskId,
    pub common: Common,
}

/// Options for `tasktree move`
pub struct MoveOptions {
    pub id: TaskId,
    pub to: TaskId,
    pub common: Common,
}

/// Options for `tasktree rename`
pub struct RenameOptions {
    pub id: TaskId,
    pub title: String,
    pub common: Common,
}

/// Options for `tasktree add`
pub struct AddOptions {
    pub id: TaskId,
    pub parent: TaskId,
    pub title: String,
    pub seconds: u64,
    pub common: Common,
}

/// Options for `tasktree remove`
pub struct RemoveOptions {
    pub id: TaskId,
    pub cascade: bool,
    pub relink: bool,
    pub common: Common,
}

/// Options for `tasktree book`
pub struct BookOptions {
    pub id: TaskId,
    pub seconds: u64,
    pub common: Common,
}

#[derive(Serialize)]
struct InitReport {
    path: String,
    root: TaskId,
}

#[derive(Serialize)]
struct MoveReport {
    task: TaskId,
    from: TaskId,
    to: TaskId,
    changed: bool,
}

#[derive(Serialize)]
struct RenameReport {
    task: TaskId,
    previous: String,
    title: String,
}

#[derive(Serialize)]
struct AddReport {
    task: TaskId,
    parent: TaskId,
    title: String,
}

#[derive(Serialize)]
struct RemoveReport {
    task: TaskId,
    mode: &'static str,
    removed: Vec<TaskId>,
}

#[derive(Serialize)]
struct BookReport {
    task: TaskId,
    seconds: u64,
    root_total_secs: u64,
}

/// Run `change` against a tree built from the snapshot and store the
/// resulting records, all under one snapshot lock.
fn apply<T>(
    common: &Common,
    change: impl FnOnce(&TaskTree) -> Result<T>,
) -> Result<T> {
    let config = common.load_config()?;
    common.snapshot_file(&config).update(|snapshot: &mut Snapshot| {
        let tree = tree_from(snapshot, &config)?;
        let out = change(&tree)?;
        snapshot.tasks = tree.records()?;
        Ok(out)
    })
}

pub fn run_init(options: InitOptions) -> Result<()> {
    validate::check_title(&options.title)?;
    let config = options.common.load_config()?;
    let file = options.common.snapshot_file(&config);
    if file.path().exists() {
        return Err(Error::InvalidArgument(format!(
            "snapshot already exists: {}",
            file.path().display()
        )));
    }

    let snapshot = Snapshot::new(vec![TaskRecord::root(options.id, options.title.clone())]);
    file.save(&snapshot)?;

    let report = InitReport {
        path: file.path().display().to_string(),
        root: options.id,
    };

    let mut human = HumanOutput::new(format!("tasktree init: {}", options.title));
    human.push_summary("snapshot", report.path.clone());
    human.push_summary("root", options.id.to_string());
    human.push_next_step(format!(
        "tasktree add <id> --parent {} <title> --user <user>",
        options.id
    ));

    emit_success(options.common.output(), "init", &report, Some(&human))
}

pub fn run_move(options: MoveOptions) -> Result<()> {
    let user = options.common.require_user()?;
    let report = apply(&options.common, |tree| {
        let from = tree
            .parent(options.id)?
            .map(|parent| parent.id())
            .unwrap_or(options.id);
        tree.set_parent(&user, options.id, options.to)?;
        Ok(MoveReport {
            task: options.id,
            from,
            to: options.to,
            changed: from != options.to,
        })
    })?;

    let header = if report.changed {
        format!("tasktree move: {} from {} to {}", report.task, report.from, report.to)
    } else {
        format!("tasktree move: {} already under {}", report.task, report.to)
    };
    let mut human = HumanOutput::new(header);
    human.push_next_step(format!("tasktree path {}", report.task));

    emit_success(options.common.output(), "move", &report, Some(&human))
}

pub fn run_rename(options: RenameOptions) -> Result<()> {
    let user = options.common.require_user()?;
    let report = apply(&options.common, |tree| {
        let previous = tree.node(options.id)?.title().to_string();
        tree.rename(&user, options.id, &options.title)?;
        Ok(RenameReport {
            task: options.id,
            previous,
            title: options.title.clone(),
        })
    })?;

    let mut human = HumanOutput::new(format!("tasktree rename: {}", report.task));
    human.push_summary("from", report.previous.clone());
    human.push_summary("to", report.title.clone());

    emit_success(options.common.output(), "rename", &report, Some(&human))
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let user = options.common.require_user()?;
    let record = TaskRecord::child(options.id, options.parent, options.title.clone())
        .with_duration(options.seconds);
    apply(&options.common, |tree| tree.insert_task(&user, record))?;

    let report = AddReport {
        task: options.id,
        parent: options.parent,
        title: options.title,
    };

    let mut human = HumanOutput::new(format!("tasktree add: {} {}", report.task, report.title));
    human.push_summary("parent", report.parent.to_string());
    if options.seconds > 0 {
        human.push_summary("booked", format_seconds(options.seconds));
    }

    emit_success(options.common.output(), "add", &report, Some(&human))
}

pub fn run_remove(options: RemoveOptions) -> Result<()> {
    let user = options.common.require_user()?;
    let (mode, label) = match (options.cascade, options.relink) {
        (true, _) => (RemovalMode::Cascade, "cascade"),
        (false, true) => (RemovalMode::RelinkChildren, "relink"),
        (false, false) => (RemovalMode::Reject, "single"),
    };
    let removed = apply(&options.common, |tree| tree.remove_task(&user, options.id, mode))?;

    let report = RemoveReport {
        task: options.id,
        mode: label,
        removed,
    };

    let mut human = HumanOutput::new(format!("tasktree remove: {}", report.task));
    human.push_summary("mode", label);
    human.push_summary("removed", report.removed.len().to_string());
    if report.removed.len() > 1 {
        for id in &report.removed {
            human.push_detail(id.to_string());
        }
    }

    emit_success(options.common.output(), "remove", &report, Some(&human))
}

pub fn run_book(options: BookOptions) -> Result<()> {
    let report = apply(&options.common, |tree| {
        tree.set_own_duration(options.id, options.seconds)?;
        let root = tree.read()?.root();
        Ok(BookReport {
            task: options.id,
            seconds: options.seconds,
            root_total_secs: tree.duration(root, true)?,
        })
    })?;

    let mut human = HumanOutput::new(format!("tasktree book: {}", report.task));
    human.push_summary("booked", format_seconds(report.seconds));
    human.push_summary("root total", format_seconds(report.root_total_secs));

    emit_success(options.common.output(), "book", &report, Some(&human))
}
