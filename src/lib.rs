//! waypoint: a target-driven task graph library.
//!
//! Waypoint persists units of work as nodes of a dependency DAG in SQLite
//! and decides which task should be executed next. A human sets a coarse
//! milestone (the target); an executor asks "what next" and reports
//! completion, under three global invariants: at most one task in progress,
//! no task starts before its dependencies complete, and no task completes
//! without a completion criterion.
//!
//! # Example
//!
//! ```no_run
//! use waypoint::{NextTask, Store};
//! use std::path::Path;
//!
//! // Initialize a new store
//! let mut store = Store::init(Path::new(".")).unwrap();
//!
//! // Create tasks and wire the graph
//! let schema = store.create("Design schema", None, Some("reviewed"), None, None).unwrap();
//! let api = store.create("Build API", None, Some("tests pass"), None, None).unwrap();
//! store.add_dependency(api.id, schema.id).unwrap();
//!
//! // Work toward the API task
//! store.set_target(api.id).unwrap();
//! if let NextTask::Task { task } = store.next(false).unwrap() {
//!     assert_eq!(task.task.id, schema.id);
//!     store.start(task.task.id).unwrap();
//!     store.done().unwrap();
//! }
//! ```

mod error;
mod graph;
mod order;
mod state;
mod storage;
mod store;
mod types;

pub mod protocol;

// Re-export public API
pub use error::{Error, Result};
pub use protocol::{Request, Response};
pub use store::Store;
pub use types::{
    Artifact, Dependency, DependencyInfo, NextTask, OrderConflict, Status, Task, TaskDetail,
};
