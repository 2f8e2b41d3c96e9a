//! SQLite storage layer for waypoint.
//!
//! Owns the schema and all row-level reads and writes. Structural
//! constraints (status domain, non-self-dependency, edge uniqueness,
//! foreign keys) live in the schema so no caller path can bypass them.
//! Row helpers take a borrowed connection, so the store can run a whole
//! verb against one open [`rusqlite::Transaction`].

use crate::error::{Error, Result};
use crate::types::{Artifact, Dependency, DependencyInfo, Status, Task};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Storage directory name.
pub const STORE_DIR: &str = ".waypoint";

/// SQLite database file.
const DB_FILE: &str = "waypoint.db";

/// Directory for externally-authored artifact files. The store only ever
/// records path strings; nothing here reads the files themselves.
const ARTIFACTS_DIR: &str = "artifacts";

/// Config key holding the target task id.
pub const TARGET_KEY: &str = "target";

/// Handle on the durable store.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        let db_path = store_dir.join(DB_FILE);
        if db_path.exists() {
            return Err(Error::AlreadyInitialized);
        }

        fs::create_dir_all(store_dir.join(ARTIFACTS_DIR))?;

        let conn = Connection::open(&db_path)?;
        configure(&conn)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { conn })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let db_path = root.join(STORE_DIR).join(DB_FILE);
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }

        let conn = Connection::open(&db_path)?;
        configure(&conn)?;

        Ok(Self { conn })
    }

    /// Begin the single transaction a verb runs inside.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

/// Session pragmas: WAL keeps readers unblocked while one writer commits.
fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT,
        criterion TEXT,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'in_progress', 'completed', 'blocked')),
        manual_order REAL NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        last_touched_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS dependencies (
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        depends_on INTEGER NOT NULL REFERENCES tasks(id),
        PRIMARY KEY (task_id, depends_on),
        CHECK (task_id != depends_on)
    );
    CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on ON dependencies(depends_on);

    CREATE TABLE IF NOT EXISTS artifacts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_artifacts_task_id ON artifacts(task_id);

    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
"#;

fn parse_ts(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let status_str: String = row.get(4)?;
    let status = Status::from_str(&status_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            status_str.clone().into(),
        )
    })?;

    let created_at: String = row.get(6)?;
    let started_at: Option<String> = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;
    let last_touched_at: String = row.get(9)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        criterion: row.get(3)?,
        status,
        manual_order: row.get(5)?,
        created_at: parse_ts(&created_at)?,
        started_at: started_at.as_deref().map(parse_ts).transpose()?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        last_touched_at: parse_ts(&last_touched_at)?,
    })
}

const TASK_COLUMNS: &str = "id, title, description, criterion, status, manual_order, \
     created_at, started_at, completed_at, last_touched_at";

/// Insert a new task with status pending.
pub(crate) fn insert_task(
    conn: &Connection,
    title: &str,
    description: Option<&str>,
    criterion: Option<&str>,
    manual_order: f64,
) -> Result<Task> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO tasks (title, description, criterion, status, manual_order, created_at, last_touched_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?5)",
        params![title, description, criterion, manual_order, now],
    )?;
    require_task(conn, conn.last_insert_rowid())
}

/// Get a task by id.
pub(crate) fn get_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;
    Ok(stmt.query_row(params![id], row_to_task).optional()?)
}

/// Get a task by id, or fail with not-found.
pub(crate) fn require_task(conn: &Connection, id: i64) -> Result<Task> {
    get_task(conn, id)?.ok_or(Error::NotFound(id))
}

/// All tasks, ordered by (manual_order, id).
pub(crate) fn list_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks ORDER BY manual_order ASC, id ASC"
    ))?;
    let tasks = stmt
        .query_map([], row_to_task)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// The single in-progress task, if one exists.
pub(crate) fn active_task(conn: &Connection) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'in_progress' LIMIT 1"
    ))?;
    Ok(stmt.query_row([], row_to_task).optional()?)
}

/// Patch a task's text fields. Inner `None` clears the field.
pub(crate) fn update_task(
    conn: &Connection,
    id: i64,
    title: Option<&str>,
    description: Option<Option<&str>>,
    criterion: Option<Option<&str>>,
) -> Result<Task> {
    let existing = require_task(conn, id)?;
    let title = title.unwrap_or(&existing.title);
    let description = match description {
        Some(d) => d.map(str::to_string),
        None => existing.description.clone(),
    };
    let criterion = match criterion {
        Some(c) => c.map(str::to_string),
        None => existing.criterion.clone(),
    };

    conn.execute(
        "UPDATE tasks SET title = ?2, description = ?3, criterion = ?4, last_touched_at = ?5
         WHERE id = ?1",
        params![id, title, description, criterion, Utc::now().to_rfc3339()],
    )?;
    require_task(conn, id)
}

/// Write a task's status with its timestamp side effects.
///
/// Entering in_progress stamps started_at; entering completed stamps
/// completed_at. Leaving in_progress never clears started_at.
pub(crate) fn set_status(conn: &Connection, id: i64, status: Status) -> Result<Task> {
    conn.execute(
        "UPDATE tasks SET status = ?2,
             started_at = CASE WHEN ?2 = 'in_progress' THEN ?3 ELSE started_at END,
             completed_at = CASE WHEN ?2 = 'completed' THEN ?3 ELSE completed_at END,
             last_touched_at = ?3
         WHERE id = ?1",
        params![id, status.as_str(), Utc::now().to_rfc3339()],
    )?;
    require_task(conn, id)
}

/// Highest manual_order in use, if any task exists.
pub(crate) fn max_manual_order(conn: &Connection) -> Result<Option<f64>> {
    Ok(conn.query_row("SELECT MAX(manual_order) FROM tasks", [], |row| row.get(0))?)
}

/// Rewrite a task's manual_order.
pub(crate) fn set_manual_order(conn: &Connection, id: i64, manual_order: f64) -> Result<Task> {
    let changed = conn.execute(
        "UPDATE tasks SET manual_order = ?2, last_touched_at = ?3 WHERE id = ?1",
        params![id, manual_order, Utc::now().to_rfc3339()],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(id));
    }
    require_task(conn, id)
}

/// Insert a dependency edge. Idempotent for an existing pair; the schema
/// rejects self-edges. Touches the dependent task.
pub(crate) fn insert_dependency(conn: &Connection, task_id: i64, depends_on: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO dependencies (task_id, depends_on) VALUES (?1, ?2)",
        params![task_id, depends_on],
    )?;
    touch(conn, task_id)
}

/// Delete a dependency edge. Idempotent for a missing pair.
pub(crate) fn delete_dependency(conn: &Connection, task_id: i64, depends_on: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM dependencies WHERE task_id = ?1 AND depends_on = ?2",
        params![task_id, depends_on],
    )?;
    touch(conn, task_id)
}

/// Every dependency edge in the store.
pub(crate) fn all_dependencies(conn: &Connection) -> Result<Vec<Dependency>> {
    let mut stmt =
        conn.prepare("SELECT task_id, depends_on FROM dependencies ORDER BY task_id, depends_on")?;
    let deps = stmt
        .query_map([], |row| {
            Ok(Dependency {
                task_id: row.get(0)?,
                depends_on: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(deps)
}

/// Direct dependencies of a task with their titles and statuses.
pub(crate) fn dependency_info(conn: &Connection, id: i64) -> Result<Vec<DependencyInfo>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.title, t.status FROM dependencies d
         JOIN tasks t ON t.id = d.depends_on
         WHERE d.task_id = ?1 ORDER BY t.id",
    )?;
    let deps = stmt
        .query_map(params![id], |row| {
            let status_str: String = row.get(2)?;
            let status = Status::from_str(&status_str).map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    status_str.clone().into(),
                )
            })?;
            Ok(DependencyInfo {
                id: row.get(0)?,
                title: row.get(1)?,
                status,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(deps)
}

/// Ids of tasks that depend on this one.
pub(crate) fn dependents_of(conn: &Connection, id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT task_id FROM dependencies WHERE depends_on = ?1 ORDER BY task_id")?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Append an artifact row. The file path is stored as-is, never opened.
pub(crate) fn insert_artifact(
    conn: &Connection,
    task_id: i64,
    name: &str,
    file_path: &str,
) -> Result<Artifact> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO artifacts (task_id, name, file_path, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![task_id, name, file_path, now],
    )?;
    touch(conn, task_id)?;

    let id = conn.last_insert_rowid();
    let mut stmt = conn.prepare(
        "SELECT id, task_id, name, file_path, created_at FROM artifacts WHERE id = ?1",
    )?;
    Ok(stmt.query_row(params![id], row_to_artifact)?)
}

/// Artifacts logged against a task, oldest first.
pub(crate) fn artifacts_for(conn: &Connection, task_id: i64) -> Result<Vec<Artifact>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, name, file_path, created_at FROM artifacts
         WHERE task_id = ?1 ORDER BY id",
    )?;
    let artifacts = stmt
        .query_map(params![task_id], row_to_artifact)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(artifacts)
}

fn row_to_artifact(row: &Row) -> rusqlite::Result<Artifact> {
    let created_at: String = row.get(4)?;
    Ok(Artifact {
        id: row.get(0)?,
        task_id: row.get(1)?,
        name: row.get(2)?,
        file_path: row.get(3)?,
        created_at: parse_ts(&created_at)?,
    })
}

/// Read a config value.
pub(crate) fn get_config(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM config WHERE key = ?1")?;
    Ok(stmt
        .query_row(params![key], |row| row.get(0))
        .optional()?)
}

/// Overwrite a config value wholesale.
pub(crate) fn set_config(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// Remove a config value.
pub(crate) fn delete_config(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM config WHERE key = ?1", params![key])?;
    Ok(())
}

fn touch(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET last_touched_at = ?2 WHERE id = ?1",
        params![id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Storage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::init(temp_dir.path()).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_init_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let _storage = Storage::init(temp_dir.path()).unwrap();

        let store_dir = temp_dir.path().join(STORE_DIR);
        assert!(store_dir.join(DB_FILE).exists());
        assert!(store_dir.join(ARTIFACTS_DIR).is_dir());
    }

    #[test]
    fn test_init_twice_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let _storage = Storage::init(temp_dir.path()).unwrap();
        assert!(matches!(
            Storage::init(temp_dir.path()),
            Err(Error::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_open_uninitialized_rejected() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            Storage::open(temp_dir.path()),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn test_insert_and_get_task() {
        let (_temp_dir, storage) = setup();

        let task = insert_task(
            &storage.conn,
            "First task",
            Some("details"),
            Some("tests pass"),
            10.0,
        )
        .unwrap();

        assert_eq!(task.id, 1);
        assert_eq!(task.status, Status::Pending);
        assert_eq!(task.criterion.as_deref(), Some("tests pass"));
        assert!(task.started_at.is_none());

        let fetched = get_task(&storage.conn, task.id).unwrap().unwrap();
        assert_eq!(fetched, task);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let (_temp_dir, storage) = setup();
        let a = insert_task(&storage.conn, "a", None, None, 10.0).unwrap();
        let b = insert_task(&storage.conn, "b", None, None, 20.0).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_set_status_timestamps() {
        let (_temp_dir, storage) = setup();
        let task = insert_task(&storage.conn, "t", None, None, 10.0).unwrap();

        let started = set_status(&storage.conn, task.id, Status::InProgress).unwrap();
        assert!(started.started_at.is_some());
        assert!(started.completed_at.is_none());

        // Dropping back to pending keeps started_at.
        let stopped = set_status(&storage.conn, task.id, Status::Pending).unwrap();
        assert_eq!(stopped.started_at, started.started_at);

        set_status(&storage.conn, task.id, Status::InProgress).unwrap();
        let completed = set_status(&storage.conn, task.id, Status::Completed).unwrap();
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn test_self_dependency_rejected_by_schema() {
        let (_temp_dir, storage) = setup();
        let task = insert_task(&storage.conn, "t", None, None, 10.0).unwrap();

        let result = storage.conn.execute(
            "INSERT INTO dependencies (task_id, depends_on) VALUES (?1, ?1)",
            params![task.id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_status_rejected_by_schema() {
        let (_temp_dir, storage) = setup();
        let result = storage.conn.execute(
            "INSERT INTO tasks (title, status, manual_order, created_at, last_touched_at)
             VALUES ('t', 'done', 10.0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_dependency_insert_is_idempotent() {
        let (_temp_dir, storage) = setup();
        let a = insert_task(&storage.conn, "a", None, None, 10.0).unwrap();
        let b = insert_task(&storage.conn, "b", None, None, 20.0).unwrap();

        insert_dependency(&storage.conn, b.id, a.id).unwrap();
        insert_dependency(&storage.conn, b.id, a.id).unwrap();

        assert_eq!(all_dependencies(&storage.conn).unwrap().len(), 1);
    }

    #[test]
    fn test_mutations_touch_last_touched_at() {
        let (_temp_dir, storage) = setup();
        let a = insert_task(&storage.conn, "a", None, None, 10.0).unwrap();
        let b = insert_task(&storage.conn, "b", None, None, 20.0).unwrap();

        insert_dependency(&storage.conn, b.id, a.id).unwrap();
        let touched = require_task(&storage.conn, b.id).unwrap();
        assert!(touched.last_touched_at >= b.last_touched_at);

        insert_artifact(&storage.conn, a.id, "notes", "docs/notes.md").unwrap();
        let touched = require_task(&storage.conn, a.id).unwrap();
        assert!(touched.last_touched_at >= a.last_touched_at);
    }

    #[test]
    fn test_artifact_roundtrip() {
        let (_temp_dir, storage) = setup();
        let task = insert_task(&storage.conn, "t", None, None, 10.0).unwrap();

        let artifact =
            insert_artifact(&storage.conn, task.id, "design", "docs/design.md").unwrap();
        assert_eq!(artifact.task_id, task.id);
        assert_eq!(artifact.file_path, "docs/design.md");

        let listed = artifacts_for(&storage.conn, task.id).unwrap();
        assert_eq!(listed, vec![artifact]);
    }

    #[test]
    fn test_config_overwrite() {
        let (_temp_dir, storage) = setup();
        assert!(get_config(&storage.conn, TARGET_KEY).unwrap().is_none());

        set_config(&storage.conn, TARGET_KEY, "3").unwrap();
        set_config(&storage.conn, TARGET_KEY, "7").unwrap();
        assert_eq!(
            get_config(&storage.conn, TARGET_KEY).unwrap().as_deref(),
            Some("7")
        );

        delete_config(&storage.conn, TARGET_KEY).unwrap();
        assert!(get_config(&storage.conn, TARGET_KEY).unwrap().is_none());
    }

    #[test]
    fn test_active_task_query() {
        let (_temp_dir, storage) = setup();
        assert!(active_task(&storage.conn).unwrap().is_none());

        let task = insert_task(&storage.conn, "t", None, None, 10.0).unwrap();
        set_status(&storage.conn, task.id, Status::InProgress).unwrap();

        let active = active_task(&storage.conn).unwrap().unwrap();
        assert_eq!(active.id, task.id);
    }
}
