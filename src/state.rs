//! The task status state machine.
//!
//! [`transition`] is a pure function of (current status, requested action,
//! guard context) to either the next status or a typed rejection. The store
//! gathers the context inside the verb's transaction and applies timestamp
//! side effects itself, so the table here can be tested as plain data.

use crate::error::{Error, Result};
use crate::types::Status;

/// The verbs that request a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Done,
    Block,
    Unblock,
}

/// Guard inputs read from durable state inside the verb's transaction.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Id of the task currently in progress, if any.
    pub active: Option<i64>,

    /// Direct dependencies of the subject task that are not completed.
    pub unmet: Vec<i64>,

    /// Whether the subject task has a non-empty completion criterion.
    pub has_criterion: bool,
}

/// Validate one requested transition.
///
/// Returns the status the task should move to. A `Start` on a task that is
/// already in progress is the idempotent no-op row of the table: it returns
/// `InProgress` and the store skips the write so timestamps stay untouched.
pub fn transition(id: i64, current: Status, action: Action, ctx: &Context) -> Result<Status> {
    match (current, action) {
        // Already active; succeeds without effect.
        (Status::InProgress, Action::Start) => Ok(Status::InProgress),

        (Status::Pending, Action::Start) => {
            if let Some(active) = ctx.active {
                if active != id {
                    return Err(Error::AnotherActive(active));
                }
            }
            if !ctx.unmet.is_empty() {
                return Err(Error::UnmetDependencies {
                    id,
                    deps: ctx.unmet.clone(),
                });
            }
            Ok(Status::InProgress)
        }

        (Status::Blocked | Status::Completed, Action::Start) => Err(Error::NotPending(id)),

        (Status::InProgress, Action::Stop) => Ok(Status::Pending),
        (_, Action::Stop) => Err(Error::NoActive),

        (Status::InProgress, Action::Done) => {
            if !ctx.has_criterion {
                return Err(Error::MissingCriterion(id));
            }
            Ok(Status::Completed)
        }
        (_, Action::Done) => Err(Error::NoActive),

        (Status::Pending | Status::InProgress, Action::Block) => Ok(Status::Blocked),
        (from, Action::Block) => Err(Error::InvalidTransition {
            id,
            from,
            to: Status::Blocked,
        }),

        (Status::Blocked, Action::Unblock) => Ok(Status::Pending),
        (from, Action::Unblock) => Err(Error::InvalidTransition {
            id,
            from,
            to: Status::Pending,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> Context {
        Context {
            active: None,
            unmet: vec![],
            has_criterion: true,
        }
    }

    #[test]
    fn test_start_pending_with_clear_guards() {
        let next = transition(1, Status::Pending, Action::Start, &ready()).unwrap();
        assert_eq!(next, Status::InProgress);
    }

    #[test]
    fn test_start_is_idempotent_when_active() {
        let ctx = Context {
            active: Some(1),
            ..ready()
        };
        let next = transition(1, Status::InProgress, Action::Start, &ctx).unwrap();
        assert_eq!(next, Status::InProgress);
    }

    #[test]
    fn test_start_rejected_while_another_active() {
        let ctx = Context {
            active: Some(2),
            ..ready()
        };
        let err = transition(1, Status::Pending, Action::Start, &ctx).unwrap_err();
        assert!(matches!(err, Error::AnotherActive(2)));
    }

    #[test]
    fn test_start_rejected_with_unmet_dependencies() {
        let ctx = Context {
            unmet: vec![5, 7],
            ..ready()
        };
        let err = transition(1, Status::Pending, Action::Start, &ctx).unwrap_err();
        assert!(matches!(err, Error::UnmetDependencies { id: 1, deps } if deps == vec![5, 7]));
    }

    #[test]
    fn test_start_rejected_on_blocked_and_completed() {
        for status in [Status::Blocked, Status::Completed] {
            let err = transition(1, status, Action::Start, &ready()).unwrap_err();
            assert!(matches!(err, Error::NotPending(1)));
        }
    }

    #[test]
    fn test_stop_returns_to_pending() {
        let next = transition(1, Status::InProgress, Action::Stop, &ready()).unwrap();
        assert_eq!(next, Status::Pending);
    }

    #[test]
    fn test_stop_without_active_rejected() {
        let err = transition(1, Status::Pending, Action::Stop, &ready()).unwrap_err();
        assert!(matches!(err, Error::NoActive));
    }

    #[test]
    fn test_done_requires_criterion() {
        let ctx = Context {
            has_criterion: false,
            ..ready()
        };
        let err = transition(1, Status::InProgress, Action::Done, &ctx).unwrap_err();
        assert!(matches!(err, Error::MissingCriterion(1)));

        let next = transition(1, Status::InProgress, Action::Done, &ready()).unwrap();
        assert_eq!(next, Status::Completed);
    }

    #[test]
    fn test_done_on_pending_rejected() {
        let err = transition(1, Status::Pending, Action::Done, &ready()).unwrap_err();
        assert!(matches!(err, Error::NoActive));
    }

    #[test]
    fn test_block_from_pending_and_in_progress() {
        for status in [Status::Pending, Status::InProgress] {
            let next = transition(1, status, Action::Block, &ready()).unwrap();
            assert_eq!(next, Status::Blocked);
        }
    }

    #[test]
    fn test_block_completed_rejected() {
        let err = transition(1, Status::Completed, Action::Block, &ready()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Status::Completed,
                to: Status::Blocked,
                ..
            }
        ));
    }

    #[test]
    fn test_unblock_only_from_blocked() {
        let next = transition(1, Status::Blocked, Action::Unblock, &ready()).unwrap();
        assert_eq!(next, Status::Pending);

        let err = transition(1, Status::Pending, Action::Unblock, &ready()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Status::Pending,
                to: Status::Pending,
                ..
            }
        ));
    }

    #[test]
    fn test_completed_is_terminal() {
        for action in [Action::Start, Action::Block, Action::Unblock] {
            assert!(transition(1, Status::Completed, action, &ready()).is_err());
        }
    }
}
