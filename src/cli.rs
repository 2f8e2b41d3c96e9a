//! CLI argument parsing for waypoint.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wp",
    about = "A target-driven task graph for autonomous executors",
    version,
    after_help = "Logs are written to: ~/.local/share/waypoint/logs/waypoint.log"
)]
pub struct Cli {
    /// Path to the waypoint store directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new waypoint store in the current directory
    Init,

    /// Create a new task
    Add {
        /// Task title
        title: String,

        /// Longer description
        #[arg(short = 'D', long)]
        description: Option<String>,

        /// Completion criterion (required before the task can be done)
        #[arg(short, long)]
        criterion: Option<String>,

        /// Place directly after this task
        #[arg(long)]
        after: Option<i64>,

        /// Place directly before this task
        #[arg(long)]
        before: Option<i64>,
    },

    /// Edit a task's fields
    Edit {
        /// Task ID
        id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(short = 'D', long)]
        description: Option<String>,

        /// Clear the description
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,

        /// New completion criterion
        #[arg(short, long)]
        criterion: Option<String>,

        /// Clear the completion criterion
        #[arg(long, conflicts_with = "criterion")]
        clear_criterion: bool,
    },

    /// Show a task with its dependencies, dependents, and artifacts
    Show {
        /// Task ID
        id: i64,
    },

    /// List the target subgraph in execution order
    List {
        /// List every task instead of the target subgraph
        #[arg(long)]
        all: bool,

        /// Filter by status (pending, in_progress, completed, blocked)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Set, show, or clear the target task
    Target {
        /// Task ID (omit to print the current target)
        id: Option<i64>,

        /// Clear the target
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },

    /// Decide which task should be executed next
    Next {
        /// Consider every task instead of the target subgraph
        #[arg(long)]
        all: bool,
    },

    /// Start working on a task
    Start {
        /// Task ID
        id: i64,
    },

    /// Return the active task to pending
    Stop,

    /// Complete the active task
    Done,

    /// Show the active task
    Current,

    /// Mark a task blocked
    Block {
        /// Task ID
        id: i64,
    },

    /// Return a blocked task to pending
    Unblock {
        /// Task ID
        id: i64,
    },

    /// Manage dependency edges
    Dep {
        #[command(subcommand)]
        command: DepCommand,
    },

    /// Record an artifact path against a task
    Log {
        /// Artifact label
        name: String,

        /// Path to the file (stored as-is, never opened)
        path: String,

        /// Task ID (default: the active task)
        #[arg(short, long)]
        task: Option<i64>,
    },

    /// List artifacts for a task
    Artifacts {
        /// Task ID (default: the active task)
        #[arg(short, long)]
        task: Option<i64>,
    },

    /// Move a task in manual order
    Reorder {
        /// Task ID
        id: i64,

        /// Place directly after this task
        #[arg(long)]
        after: Option<i64>,

        /// Place directly before this task
        #[arg(long)]
        before: Option<i64>,
    },

    /// Rewrite all manual orders to 10, 20, 30, …
    Reindex,

    /// Serve JSON requests over stdio, one per line
    Serve,
}

#[derive(Subcommand)]
pub enum DepCommand {
    /// Make a task depend on another
    Add {
        /// The dependent task
        task_id: i64,

        /// The task it depends on
        depends_on: i64,
    },

    /// Remove a dependency edge
    Rm {
        /// The dependent task
        task_id: i64,

        /// The task it depended on
        depends_on: i64,
    },
}
