//! waypoint CLI - a target-driven task graph for autonomous executors.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use waypoint::{NextTask, OrderConflict, Status, Store, TaskDetail, protocol};

mod cli;

use cli::{Cli, Command, DepCommand};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waypoint")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("waypoint.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn format_status(status: Status) -> ColoredString {
    match status {
        Status::Pending => status.glyph().normal(),
        Status::InProgress => status.glyph().yellow(),
        Status::Completed => status.glyph().green(),
        Status::Blocked => status.glyph().red(),
    }
}

fn print_task_line(detail: &TaskDetail) {
    let deps = if detail.dependencies.is_empty() {
        String::new()
    } else {
        let parts: Vec<String> = detail
            .dependencies
            .iter()
            .map(|d| format!("{} {}", d.id, d.status.glyph()))
            .collect();
        format!(" (deps: {})", parts.join(", "))
    };
    println!(
        "[{}] {} {}{}",
        detail.task.id.to_string().cyan(),
        format_status(detail.task.status),
        detail.task.title,
        deps.dimmed()
    );
}

fn print_legend() {
    println!();
    println!(
        "{}",
        "Legend: ✓ completed  ● in_progress  ○ pending  ✗ blocked".dimmed()
    );
}

fn print_conflicts(conflicts: &[OrderConflict]) {
    for c in conflicts {
        eprintln!(
            "{} task #{} (order {}) sorts below its dependency #{} (order {})",
            "warning:".yellow(),
            c.task_id,
            c.task_order,
            c.dep_id,
            c.dep_order
        );
    }
}

fn print_detail(detail: &TaskDetail) {
    let task = &detail.task;
    println!("{}: {}", "ID".bold(), task.id.to_string().cyan());
    println!("{}: {}", "Title".bold(), task.title);
    println!(
        "{}: {} {}",
        "Status".bold(),
        format_status(task.status),
        task.status
    );
    println!("{}: {}", "Order".bold(), task.manual_order);
    if let Some(desc) = &task.description {
        println!("{}: {}", "Description".bold(), desc);
    }
    if let Some(criterion) = &task.criterion {
        println!("{}: {}", "Criterion".bold(), criterion);
    }
    if !detail.dependencies.is_empty() {
        let parts: Vec<String> = detail
            .dependencies
            .iter()
            .map(|d| format!("#{} {} {}", d.id, d.status.glyph(), d.title))
            .collect();
        println!("{}: {}", "Depends on".bold(), parts.join(", "));
    }
    if !detail.dependents.is_empty() {
        let parts: Vec<String> = detail.dependents.iter().map(|id| format!("#{id}")).collect();
        println!("{}: {}", "Needed by".bold(), parts.join(", "));
    }
    for artifact in &detail.artifacts {
        println!(
            "{}: {} {}",
            "Artifact".bold(),
            artifact.name,
            artifact.file_path.dimmed()
        );
    }
    println!("{}: {}", "Created".bold(), task.created_at);
    if let Some(started) = &task.started_at {
        println!("{}: {}", "Started".bold(), started);
    }
    if let Some(completed) = &task.completed_at {
        println!("{}: {}", "Completed".bold(), completed);
    }
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);

    match cli.command {
        Command::Init => {
            Store::init(&store_dir).context("Failed to initialize waypoint store")?;
            println!(
                "{} Initialized waypoint store in {}",
                "✓".green(),
                store_dir.display()
            );
        }

        Command::Add {
            title,
            description,
            criterion,
            after,
            before,
        } => {
            let mut store = Store::open(&store_dir)?;
            let task = store.create(
                &title,
                description.as_deref(),
                criterion.as_deref(),
                after,
                before,
            )?;
            println!(
                "{} Created: [{}] {}",
                "✓".green(),
                task.id.to_string().cyan(),
                task.title
            );
        }

        Command::Edit {
            id,
            title,
            description,
            clear_description,
            criterion,
            clear_criterion,
        } => {
            let mut store = Store::open(&store_dir)?;
            let description = if clear_description {
                Some(None)
            } else {
                description.as_deref().map(Some)
            };
            let criterion = if clear_criterion {
                Some(None)
            } else {
                criterion.as_deref().map(Some)
            };
            let detail = store.edit(id, title.as_deref(), description, criterion)?;
            println!(
                "{} Updated: [{}] {}",
                "✓".green(),
                detail.task.id.to_string().cyan(),
                detail.task.title
            );
        }

        Command::Show { id } => {
            let mut store = Store::open(&store_dir)?;
            let detail = store.get(id)?;
            print_detail(&detail);
        }

        Command::List { all, status } => {
            let mut store = Store::open(&store_dir)?;
            let filter = status.as_deref().map(Status::from_str).transpose()?;
            let (details, conflicts) = store.list(all, filter)?;

            if !all {
                if let Some(target_id) = store.target()? {
                    if let Some(target) = details.iter().find(|d| d.task.id == target_id) {
                        println!(
                            "Target: [{}] {} {}",
                            target_id.to_string().cyan(),
                            format_status(target.task.status),
                            target.task.title
                        );
                        println!();
                    }
                }
            }

            if details.is_empty() {
                println!("{}", "No tasks found".dimmed());
            } else {
                for detail in &details {
                    print_task_line(detail);
                }
                print_legend();
            }
            print_conflicts(&conflicts);
        }

        Command::Target { id, clear } => {
            let mut store = Store::open(&store_dir)?;
            if clear {
                store.clear_target()?;
                println!("{} Target cleared", "✓".green());
            } else if let Some(id) = id {
                let task = store.set_target(id)?;
                println!(
                    "{} Target set: [{}] {}",
                    "✓".green(),
                    task.id.to_string().cyan(),
                    task.title
                );
            } else {
                match store.target()? {
                    Some(target_id) => {
                        let detail = store.get(target_id)?;
                        println!(
                            "Target: [{}] {} {}",
                            target_id.to_string().cyan(),
                            format_status(detail.task.status),
                            detail.task.title
                        );
                    }
                    None => println!("{}", "No target set".dimmed()),
                }
            }
        }

        Command::Next { all } => {
            let mut store = Store::open(&store_dir)?;
            match store.next(all)? {
                NextTask::Task { task } => {
                    println!(
                        "{} Next: [{}] {}",
                        "→".blue(),
                        task.task.id.to_string().cyan(),
                        task.task.title
                    );
                    if let Some(criterion) = &task.task.criterion {
                        println!("  {}: {}", "Criterion".bold(), criterion);
                    }
                }
                NextTask::TargetReached { target_id } => match target_id {
                    Some(id) => println!(
                        "{} Target reached: all tasks for [{}] are completed",
                        "✓".green(),
                        id.to_string().cyan()
                    ),
                    None => println!("{} All tasks completed", "✓".green()),
                },
            }
        }

        Command::Start { id } => {
            let mut store = Store::open(&store_dir)?;
            let detail = store.start(id)?;
            println!(
                "{} Started: [{}] {}",
                "→".blue(),
                detail.task.id.to_string().cyan(),
                detail.task.title
            );
        }

        Command::Stop => {
            let mut store = Store::open(&store_dir)?;
            let detail = store.stop()?;
            println!(
                "{} Stopped: [{}] {}",
                "○".normal(),
                detail.task.id.to_string().cyan(),
                detail.task.title
            );
        }

        Command::Done => {
            let mut store = Store::open(&store_dir)?;
            let detail = store.done()?;
            println!(
                "{} Completed: [{}] {}",
                "✓".green(),
                detail.task.id.to_string().cyan(),
                detail.task.title
            );
        }

        Command::Current => {
            let mut store = Store::open(&store_dir)?;
            let detail = store.current()?;
            print_detail(&detail);
        }

        Command::Block { id } => {
            let mut store = Store::open(&store_dir)?;
            let detail = store.block(id)?;
            println!(
                "{} Blocked: [{}] {}",
                "✗".red(),
                detail.task.id.to_string().cyan(),
                detail.task.title
            );
        }

        Command::Unblock { id } => {
            let mut store = Store::open(&store_dir)?;
            let detail = store.unblock(id)?;
            println!(
                "{} Unblocked: [{}] {}",
                "○".normal(),
                detail.task.id.to_string().cyan(),
                detail.task.title
            );
        }

        Command::Dep { command } => {
            let mut store = Store::open(&store_dir)?;
            match command {
                DepCommand::Add {
                    task_id,
                    depends_on,
                } => {
                    store.add_dependency(task_id, depends_on)?;
                    println!(
                        "{} [{}] now depends on [{}]",
                        "✓".green(),
                        task_id.to_string().cyan(),
                        depends_on.to_string().cyan()
                    );
                }
                DepCommand::Rm {
                    task_id,
                    depends_on,
                } => {
                    store.remove_dependency(task_id, depends_on)?;
                    println!(
                        "{} [{}] no longer depends on [{}]",
                        "✓".green(),
                        task_id.to_string().cyan(),
                        depends_on.to_string().cyan()
                    );
                }
            }
        }

        Command::Log { name, path, task } => {
            let mut store = Store::open(&store_dir)?;
            let artifact = store.log_artifact(task, &name, &path)?;
            println!(
                "{} Logged {} for [{}]: {}",
                "✓".green(),
                artifact.name,
                artifact.task_id.to_string().cyan(),
                artifact.file_path
            );
        }

        Command::Artifacts { task } => {
            let mut store = Store::open(&store_dir)?;
            let artifacts = store.artifacts(task)?;
            if artifacts.is_empty() {
                println!("{}", "No artifacts".dimmed());
            } else {
                for artifact in artifacts {
                    println!(
                        "[{}] {} {}",
                        artifact.task_id.to_string().cyan(),
                        artifact.name,
                        artifact.file_path.dimmed()
                    );
                }
            }
        }

        Command::Reorder { id, after, before } => {
            let mut store = Store::open(&store_dir)?;
            let task = store.reorder(id, after, before)?;
            println!(
                "{} Moved [{}] to order {}",
                "✓".green(),
                task.id.to_string().cyan(),
                task.manual_order
            );
        }

        Command::Reindex => {
            let mut store = Store::open(&store_dir)?;
            let tasks = store.reindex()?;
            println!("{} Reindexed {} task(s)", "✓".green(), tasks.len());
        }

        Command::Serve => {
            let mut store = Store::open(&store_dir)?;
            let stdin = io::stdin();
            let stdout = io::stdout();
            protocol::serve(&mut store, stdin.lock(), stdout.lock())?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
