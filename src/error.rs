//! Typed errors for every guard the store enforces.

use crate::types::Status;
use std::fmt;

/// Errors that can occur during store operations.
///
/// Every variant maps to a stable string code via [`Error::code`] so
/// automated callers can branch without parsing messages.
#[derive(Debug)]
pub enum Error {
    /// No task with this id.
    NotFound(i64),
    /// Start requested on a task that is not pending.
    NotPending(i64),
    /// Start requested while a different task is in progress.
    AnotherActive(i64),
    /// Stop/done/log requested with no task in progress.
    NoActive,
    /// Start requested with incomplete prerequisites.
    UnmetDependencies { id: i64, deps: Vec<i64> },
    /// The proposed edge would close a cycle. The path runs from the
    /// dependent task, through the cycle, back to the dependent task.
    CycleDetected { path: Vec<i64> },
    /// next/list requested in target mode without a configured target.
    NoTarget,
    /// Done requested on a task with no completion criterion.
    MissingCriterion(i64),
    /// The requested status change is not in the transition table.
    InvalidTransition {
        id: i64,
        from: Status,
        to: Status,
    },
    /// No representable manual_order exists between the two bounds.
    OrderExhausted,
    /// Reorder requested without --after or --before.
    MissingPosition,
    /// Malformed status string from an external caller.
    InvalidStatus(String),
    /// No pending task in the subset has all dependencies completed.
    /// Carries every remaining non-completed task id in sort order.
    AllBlocked(Vec<i64>),
    /// Init requested where a store already exists.
    AlreadyInitialized,
    /// Any other verb requested before init.
    NotInitialized,
    /// Passthrough database failure.
    Storage(rusqlite::Error),
    /// Passthrough filesystem failure.
    Io(std::io::Error),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable code for the structured surface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::NotPending(_) => "not_pending",
            Error::AnotherActive(_) => "another_active",
            Error::NoActive => "no_active",
            Error::UnmetDependencies { .. } => "unmet_dependencies",
            Error::CycleDetected { .. } => "cycle_detected",
            Error::NoTarget => "no_target",
            Error::MissingCriterion(_) => "missing_criterion",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::OrderExhausted => "order_exhausted",
            Error::MissingPosition => "missing_position",
            Error::InvalidStatus(_) => "invalid_status",
            Error::AllBlocked(_) => "all_blocked",
            Error::AlreadyInitialized => "already_initialized",
            Error::NotInitialized => "not_initialized",
            Error::Storage(_) => "storage",
            Error::Io(_) => "io",
        }
    }
}

fn format_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_path(path: &[i64]) -> String {
    path.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(" → ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(id) => write!(f, "task #{id} not found"),
            Error::NotPending(id) => {
                write!(f, "task #{id} is not pending and cannot be started")
            }
            Error::AnotherActive(id) => {
                write!(f, "task #{id} is already in progress; finish or stop it first")
            }
            Error::NoActive => write!(f, "no task is currently in progress"),
            Error::UnmetDependencies { id, deps } => write!(
                f,
                "cannot start #{id}: dependencies not completed: {}",
                format_ids(deps)
            ),
            Error::CycleDetected { path } => write!(
                f,
                "adding this dependency would create a cycle: {}",
                format_path(path)
            ),
            Error::NoTarget => write!(f, "no target set; use `wp target <id>` first"),
            Error::MissingCriterion(id) => write!(
                f,
                "task #{id} has no completion criterion; set one with `wp edit {id} --criterion`"
            ),
            Error::InvalidTransition { id, from, to } => {
                write!(f, "task #{id} cannot go from {from} to {to}")
            }
            Error::OrderExhausted => {
                write!(f, "no room between orders; run `wp reindex` first")
            }
            Error::MissingPosition => {
                write!(f, "reorder needs at least one of --after or --before")
            }
            Error::InvalidStatus(s) => write!(f, "invalid status: {s}"),
            Error::AllBlocked(ids) => write!(
                f,
                "all remaining tasks are blocked: {}",
                format_ids(ids)
            ),
            Error::AlreadyInitialized => write!(f, "store already initialized"),
            Error::NotInitialized => {
                write!(f, "no .waypoint store found; run `wp init` first")
            }
            Error::Storage(e) => write!(f, "database error: {e}"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::NotFound(1).code(), "not_found");
        assert_eq!(Error::NoTarget.code(), "no_target");
        assert_eq!(
            Error::CycleDetected { path: vec![1, 2, 1] }.code(),
            "cycle_detected"
        );
        assert_eq!(Error::AllBlocked(vec![3]).code(), "all_blocked");
    }

    #[test]
    fn test_cycle_display_shows_path() {
        let err = Error::CycleDetected {
            path: vec![1, 2, 3, 1],
        };
        assert_eq!(
            err.to_string(),
            "adding this dependency would create a cycle: #1 → #2 → #3 → #1"
        );
    }

    #[test]
    fn test_unmet_dependencies_display() {
        let err = Error::UnmetDependencies {
            id: 4,
            deps: vec![1, 2],
        };
        assert_eq!(
            err.to_string(),
            "cannot start #4: dependencies not completed: #1, #2"
        );
    }
}
