//! High-level store API: one transactional verb per public method.
//!
//! Every verb opens a single transaction, takes all guard reads inside it,
//! and commits or rolls back as a unit, so no check can race its own write
//! and no failure leaves a partial edge, status, or order behind.

use crate::error::{Error, Result};
use crate::graph;
use crate::order;
use crate::state::{self, Action};
use crate::storage::{self, Storage, TARGET_KEY};
use crate::types::{
    Artifact, Dependency, NextTask, OrderConflict, Status, Task, TaskDetail,
};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

/// The waypoint store.
pub struct Store {
    storage: Storage,
}

impl Store {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let storage = Storage::init(root)?;
        Ok(Self { storage })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let storage = Storage::open(root)?;
        Ok(Self { storage })
    }

    /// Create a task, placing it by the optional position hints.
    pub fn create(
        &mut self,
        title: &str,
        description: Option<&str>,
        criterion: Option<&str>,
        after: Option<i64>,
        before: Option<i64>,
    ) -> Result<Task> {
        let tx = self.storage.transaction()?;
        let manual_order = match position(&tx, after, before)? {
            Some(value) => value,
            None => order::initial(storage::max_manual_order(&tx)?),
        };
        let task = storage::insert_task(&tx, title, description, criterion, manual_order)?;
        tx.commit()?;
        Ok(task)
    }

    /// Get a task with its graph context.
    pub fn get(&mut self, id: i64) -> Result<TaskDetail> {
        let tx = self.storage.transaction()?;
        let task = storage::require_task(&tx, id)?;
        detail(&tx, task)
    }

    /// Patch a task's text fields. Inner `None` clears the field.
    pub fn edit(
        &mut self,
        id: i64,
        title: Option<&str>,
        description: Option<Option<&str>>,
        criterion: Option<Option<&str>>,
    ) -> Result<TaskDetail> {
        let tx = self.storage.transaction()?;
        let task = storage::update_task(&tx, id, title, description, criterion)?;
        let loaded = detail(&tx, task)?;
        tx.commit()?;
        Ok(loaded)
    }

    /// Topologically sorted view of the target subgraph, or of every task
    /// with `all`. Order conflicts ride alongside as non-fatal warnings.
    pub fn list(
        &mut self,
        all: bool,
        status: Option<Status>,
    ) -> Result<(Vec<TaskDetail>, Vec<OrderConflict>)> {
        let tx = self.storage.transaction()?;
        let tasks = storage::list_tasks(&tx)?;
        let edges = storage::all_dependencies(&tx)?;

        let subset: Vec<&Task> = if all {
            tasks.iter().collect()
        } else {
            let target_id = target_id(&tx)?.ok_or(Error::NoTarget)?;
            storage::require_task(&tx, target_id)?;
            let reached = graph::closure(&edges, target_id);
            tasks.iter().filter(|t| reached.contains(&t.id)).collect()
        };

        let orders: HashMap<i64, f64> = subset.iter().map(|t| (t.id, t.manual_order)).collect();
        let sorted = graph::topo_sort(&orders, &edges)?;
        let conflicts = graph::order_conflicts(&orders, &edges);

        let by_id: HashMap<i64, &Task> = subset.iter().map(|t| (t.id, *t)).collect();
        let mut details = Vec::with_capacity(sorted.len());
        for id in sorted {
            let task = by_id[&id].clone();
            if status.is_none_or(|s| task.status == s) {
                details.push(detail(&tx, task)?);
            }
        }

        Ok((details, conflicts))
    }

    /// Set the target task.
    pub fn set_target(&mut self, id: i64) -> Result<Task> {
        let tx = self.storage.transaction()?;
        let task = storage::require_task(&tx, id)?;
        storage::set_config(&tx, TARGET_KEY, &id.to_string())?;
        tx.commit()?;
        Ok(task)
    }

    /// The configured target task id, if any.
    pub fn target(&mut self) -> Result<Option<i64>> {
        let tx = self.storage.transaction()?;
        target_id(&tx)
    }

    /// Clear the target.
    pub fn clear_target(&mut self) -> Result<()> {
        let tx = self.storage.transaction()?;
        storage::delete_config(&tx, TARGET_KEY)?;
        tx.commit()?;
        Ok(())
    }

    /// Decide what should be executed next.
    ///
    /// Sorts the active subgraph (target closure minus completed tasks, or
    /// every non-completed task with `all`) and returns the first pending
    /// task whose direct dependencies are all completed. An empty subgraph
    /// means the target is reached; no qualifying task while work remains
    /// reports every remaining task id as blocked.
    pub fn next(&mut self, all: bool) -> Result<NextTask> {
        let tx = self.storage.transaction()?;
        let tasks = storage::list_tasks(&tx)?;
        let edges = storage::all_dependencies(&tx)?;
        let by_id: HashMap<i64, &Task> = tasks.iter().map(|t| (t.id, t)).collect();

        let (subset, target) = if all {
            let subset: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.status != Status::Completed)
                .collect();
            (subset, None)
        } else {
            let target_id = target_id(&tx)?.ok_or(Error::NoTarget)?;
            let target = storage::require_task(&tx, target_id)?;
            if target.status == Status::Completed {
                return Ok(NextTask::TargetReached {
                    target_id: Some(target_id),
                });
            }
            let reached = graph::closure(&edges, target_id);
            let subset: Vec<&Task> = tasks
                .iter()
                .filter(|t| reached.contains(&t.id) && t.status != Status::Completed)
                .collect();
            (subset, Some(target_id))
        };

        if subset.is_empty() {
            return Ok(NextTask::TargetReached { target_id: target });
        }

        let orders: HashMap<i64, f64> = subset.iter().map(|t| (t.id, t.manual_order)).collect();
        let sorted = graph::topo_sort(&orders, &edges)?;

        for c in graph::order_conflicts(&orders, &edges) {
            log::warn!(
                "task #{} (order {}) sorts below its dependency #{} (order {})",
                c.task_id,
                c.task_order,
                c.dep_id,
                c.dep_order
            );
        }

        for id in &sorted {
            let task = by_id[id];
            if task.status != Status::Pending {
                continue;
            }
            if unmet_dependencies(&edges, &by_id, *id).is_empty() {
                return Ok(NextTask::Task {
                    task: detail(&tx, task.clone())?,
                });
            }
        }

        Err(Error::AllBlocked(sorted))
    }

    /// Start a task. Idempotent when the task is already in progress.
    pub fn start(&mut self, id: i64) -> Result<TaskDetail> {
        let tx = self.storage.transaction()?;
        let task = storage::require_task(&tx, id)?;

        // The idempotent row of the transition table: no write, so the
        // started timestamp is untouched.
        if task.status == Status::InProgress {
            return detail(&tx, task);
        }

        let edges = storage::all_dependencies(&tx)?;
        let tasks = storage::list_tasks(&tx)?;
        let by_id: HashMap<i64, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
        let ctx = state::Context {
            active: storage::active_task(&tx)?.map(|t| t.id),
            unmet: unmet_dependencies(&edges, &by_id, id),
            has_criterion: has_criterion(&task),
        };

        let next_status = state::transition(id, task.status, Action::Start, &ctx)?;
        let task = storage::set_status(&tx, id, next_status)?;
        let loaded = detail(&tx, task)?;
        tx.commit()?;
        Ok(loaded)
    }

    /// Return the active task to pending.
    pub fn stop(&mut self) -> Result<TaskDetail> {
        self.transition_active(Action::Stop)
    }

    /// Complete the active task. Requires a non-empty completion criterion.
    pub fn done(&mut self) -> Result<TaskDetail> {
        self.transition_active(Action::Done)
    }

    fn transition_active(&mut self, action: Action) -> Result<TaskDetail> {
        let tx = self.storage.transaction()?;
        let active = storage::active_task(&tx)?.ok_or(Error::NoActive)?;
        let ctx = state::Context {
            active: Some(active.id),
            has_criterion: has_criterion(&active),
            ..Default::default()
        };

        let next_status = state::transition(active.id, active.status, action, &ctx)?;
        let task = storage::set_status(&tx, active.id, next_status)?;
        let loaded = detail(&tx, task)?;
        tx.commit()?;
        Ok(loaded)
    }

    /// Mark a task blocked. Blocking the active task frees the active slot.
    pub fn block(&mut self, id: i64) -> Result<TaskDetail> {
        self.transition_task(id, Action::Block)
    }

    /// Return a blocked task to pending.
    pub fn unblock(&mut self, id: i64) -> Result<TaskDetail> {
        self.transition_task(id, Action::Unblock)
    }

    fn transition_task(&mut self, id: i64, action: Action) -> Result<TaskDetail> {
        let tx = self.storage.transaction()?;
        let task = storage::require_task(&tx, id)?;
        let ctx = state::Context::default();

        let next_status = state::transition(id, task.status, action, &ctx)?;
        let task = storage::set_status(&tx, id, next_status)?;
        let loaded = detail(&tx, task)?;
        tx.commit()?;
        Ok(loaded)
    }

    /// The task currently in progress.
    pub fn current(&mut self) -> Result<TaskDetail> {
        let tx = self.storage.transaction()?;
        let active = storage::active_task(&tx)?.ok_or(Error::NoActive)?;
        detail(&tx, active)
    }

    /// Add a dependency edge. The cycle check and the edge write share one
    /// transaction, so no interleaving write can slip a cycle in between.
    pub fn add_dependency(&mut self, task_id: i64, depends_on: i64) -> Result<()> {
        let tx = self.storage.transaction()?;
        storage::require_task(&tx, task_id)?;
        storage::require_task(&tx, depends_on)?;

        let edges = storage::all_dependencies(&tx)?;
        if let Some(path) = graph::find_cycle(&edges, task_id, depends_on) {
            return Err(Error::CycleDetected { path });
        }

        storage::insert_dependency(&tx, task_id, depends_on)?;
        tx.commit()?;
        Ok(())
    }

    /// Remove a dependency edge.
    pub fn remove_dependency(&mut self, task_id: i64, depends_on: i64) -> Result<()> {
        let tx = self.storage.transaction()?;
        storage::require_task(&tx, task_id)?;
        storage::require_task(&tx, depends_on)?;
        storage::delete_dependency(&tx, task_id, depends_on)?;
        tx.commit()?;
        Ok(())
    }

    /// Record an artifact path against a task, defaulting to the active one.
    pub fn log_artifact(
        &mut self,
        task: Option<i64>,
        name: &str,
        file_path: &str,
    ) -> Result<Artifact> {
        let tx = self.storage.transaction()?;
        let task_id = resolve_task(&tx, task)?;
        let artifact = storage::insert_artifact(&tx, task_id, name, file_path)?;
        tx.commit()?;
        Ok(artifact)
    }

    /// Artifacts for a task, defaulting to the active one.
    pub fn artifacts(&mut self, task: Option<i64>) -> Result<Vec<Artifact>> {
        let tx = self.storage.transaction()?;
        let task_id = resolve_task(&tx, task)?;
        storage::artifacts_for(&tx, task_id)
    }

    /// Move a task by position hints. At least one hint is required.
    pub fn reorder(&mut self, id: i64, after: Option<i64>, before: Option<i64>) -> Result<Task> {
        let tx = self.storage.transaction()?;
        storage::require_task(&tx, id)?;
        let manual_order = position(&tx, after, before)?.ok_or(Error::MissingPosition)?;
        let task = storage::set_manual_order(&tx, id, manual_order)?;
        tx.commit()?;
        Ok(task)
    }

    /// Rewrite every manual_order to 10, 20, 30, … following the current
    /// total order (topological, then manual), in one transaction.
    pub fn reindex(&mut self) -> Result<Vec<Task>> {
        let tx = self.storage.transaction()?;
        let tasks = storage::list_tasks(&tx)?;
        let edges = storage::all_dependencies(&tx)?;

        let orders: HashMap<i64, f64> = tasks.iter().map(|t| (t.id, t.manual_order)).collect();
        let sorted = graph::topo_sort(&orders, &edges)?;

        for (id, new_order) in order::reindex(&sorted) {
            storage::set_manual_order(&tx, id, new_order)?;
        }

        let tasks = storage::list_tasks(&tx)?;
        tx.commit()?;
        Ok(tasks)
    }
}

/// manual_order for the given hints, or None when no hint was supplied.
fn position(conn: &Connection, after: Option<i64>, before: Option<i64>) -> Result<Option<f64>> {
    let value = match (after, before) {
        (Some(a), Some(b)) => {
            let a = storage::require_task(conn, a)?;
            let b = storage::require_task(conn, b)?;
            Some(order::midpoint(a.manual_order, b.manual_order)?)
        }
        (Some(a), None) => Some(order::after(storage::require_task(conn, a)?.manual_order)),
        (None, Some(b)) => Some(order::before(storage::require_task(conn, b)?.manual_order)),
        (None, None) => None,
    };
    Ok(value)
}

/// Direct dependencies of `id` that are not completed.
fn unmet_dependencies(
    edges: &[Dependency],
    by_id: &HashMap<i64, &Task>,
    id: i64,
) -> Vec<i64> {
    edges
        .iter()
        .filter(|e| e.task_id == id)
        .filter(|e| {
            by_id
                .get(&e.depends_on)
                .is_some_and(|t| t.status != Status::Completed)
        })
        .map(|e| e.depends_on)
        .collect()
}

fn has_criterion(task: &Task) -> bool {
    task.criterion
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty())
}

fn target_id(conn: &Connection) -> Result<Option<i64>> {
    Ok(storage::get_config(conn, TARGET_KEY)?.and_then(|v| v.parse().ok()))
}

fn resolve_task(conn: &Connection, task: Option<i64>) -> Result<i64> {
    match task {
        Some(id) => Ok(storage::require_task(conn, id)?.id),
        None => Ok(storage::active_task(conn)?.ok_or(Error::NoActive)?.id),
    }
}

fn detail(conn: &Connection, task: Task) -> Result<TaskDetail> {
    let dependencies = storage::dependency_info(conn, task.id)?;
    let dependents = storage::dependents_of(conn, task.id)?;
    let artifacts = storage::artifacts_for(conn, task.id)?;
    Ok(TaskDetail {
        task,
        dependencies,
        dependents,
        artifacts,
    })
}
