//! Core data types for the waypoint task graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The unit of work: a node in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier, assigned by the store, monotonically increasing.
    pub id: i64,

    /// Short description of the work.
    pub title: String,

    /// Optional longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Completion criterion: what "done" means for this task.
    /// Must be non-empty before the task can be completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criterion: Option<String>,

    /// Current state.
    pub status: Status,

    /// Secondary sort key for tasks with no dependency relation.
    pub manual_order: f64,

    /// When created.
    pub created_at: DateTime<Utc>,

    /// When last moved to in_progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When completed (if status == Completed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Last mutation of any kind, including edges and artifacts.
    pub last_touched_at: DateTime<Utc>,
}

/// Task status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl Status {
    /// Stable string form, matching the database CHECK domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Blocked => "blocked",
        }
    }

    /// Single-character indicator for text rendering.
    pub fn glyph(&self) -> &'static str {
        match self {
            Status::Pending => "○",
            Status::InProgress => "●",
            Status::Completed => "✓",
            Status::Blocked => "✗",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "blocked" => Ok(Status::Blocked),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// A dependency edge: `task_id` cannot complete before `depends_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The task that has the dependency.
    pub task_id: i64,

    /// The task being depended on.
    pub depends_on: i64,
}

/// A reference to an externally-authored file attached to a task.
/// The path is opaque: the store never opens or validates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: i64,
    pub task_id: i64,
    pub name: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

/// A dependency of a task together with its current status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyInfo {
    pub id: i64,
    pub title: String,
    pub status: Status,
}

/// A task with its graph context loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,

    /// Direct dependencies with their statuses.
    pub dependencies: Vec<DependencyInfo>,

    /// Tasks that depend on this one.
    pub dependents: Vec<i64>,

    /// Artifacts logged against this task.
    pub artifacts: Vec<Artifact>,
}

/// Outcome of asking for the next unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextTask {
    /// A task is ready: pending, dependencies completed, first in sort order.
    Task { task: TaskDetail },

    /// Nothing remains in the active subgraph. `target_id` is None when the
    /// query ran over the full task set instead of a target subgraph.
    TargetReached { target_id: Option<i64> },
}

/// Non-fatal disagreement between manual order and the dependency graph:
/// a task sorts by hand below one of its own prerequisites.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderConflict {
    pub task_id: i64,
    pub task_order: f64,
    pub dep_id: i64,
    pub dep_order: f64,
}
