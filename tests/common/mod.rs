//! Shared test infrastructure for waypoint integration tests.

#![allow(dead_code)]

use tempfile::TempDir;
use waypoint::{Store, Task};

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::init(temp_dir.path()).expect("Failed to init store");
        Self { temp_dir, store }
    }

    /// Create a task with a completion criterion already set.
    pub fn task(&mut self, title: &str) -> Task {
        self.store
            .create(title, None, Some("done when verified"), None, None)
            .expect("Failed to create task")
    }

    /// Create a task with no completion criterion.
    pub fn bare_task(&mut self, title: &str) -> Task {
        self.store
            .create(title, None, None, None, None)
            .expect("Failed to create task")
    }

    /// Make `task_id` depend on `depends_on`.
    pub fn dep(&mut self, task_id: i64, depends_on: i64) {
        self.store
            .add_dependency(task_id, depends_on)
            .expect("Failed to add dependency");
    }

    /// Start and complete a task in one go.
    pub fn finish(&mut self, id: i64) {
        self.store.start(id).expect("Failed to start task");
        self.store.done().expect("Failed to complete task");
    }

    /// Ids of the sorted subgraph as `list` reports it.
    pub fn listed_ids(&mut self, all: bool) -> Vec<i64> {
        self.store
            .list(all, None)
            .expect("Failed to list tasks")
            .0
            .into_iter()
            .map(|d| d.task.id)
            .collect()
    }
}
