use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::PathBuf;
use tasklist::nav::{LIST_TITLE, WELCOME_ACTION, WELCOME_TITLE};
use tasklist::{AddOutcome, Backend, Config, Navigator, Screen, TaskId, TaskStore, open_backend};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tasklist")]
#[command(about = "tasklist - a to-do list that remembers")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Directory holding the .tasklist store (overrides config)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage backend (overrides config)
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the welcome screen
    Welcome,

    /// Show the task list
    List,

    /// Add a task, or save the task being edited
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Start editing task N; the next `add` saves into it
    Edit { position: usize },

    /// Toggle completion of task N
    Toggle { position: usize },

    /// Delete task N
    Delete { position: usize },

    /// Remove all completed tasks
    ClearCompleted,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.store_path {
        config.store_path = path;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    // Setup tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?config, "Using config");
    if config.backend == Backend::Memory {
        tracing::warn!("Memory backend selected, tasks will not survive this run");
    }

    let mut nav = Navigator::new();
    let command = match cli.command {
        None | Some(Commands::Welcome) => {
            render(&nav, None);
            return Ok(());
        }
        Some(command) => command,
    };

    let kv = open_backend(config.backend, &config.store_path)?;
    let mut store = TaskStore::open(kv)?;
    nav.navigate_to_task_list();

    match command {
        Commands::Welcome | Commands::List => {}
        Commands::Add { text } => match store.add(&text.join(" ")) {
            AddOutcome::Appended(_) => println!("Added"),
            AddOutcome::Saved(_) => println!("Saved"),
            AddOutcome::Rejected => println!("{}", "Nothing to add: task text is blank".yellow()),
        },
        Commands::Edit { position } => {
            let id = resolve(&store, position)?;
            store.begin_edit(id)?;
            if let Some(task) = store.get(id) {
                println!("Editing task {}: {}", position, task.text);
                println!("Run `tasklist add <TEXT>` to save the new text");
            }
        }
        Commands::Toggle { position } => {
            let id = resolve(&store, position)?;
            let completed = store.toggle_complete(id)?;
            println!("Task {} marked {}", position, if completed { "done" } else { "not done" });
        }
        Commands::Delete { position } => {
            let id = resolve(&store, position)?;
            let task = store.delete(id)?;
            println!("Deleted: {}", task.text);
        }
        Commands::ClearCompleted => {
            let removed = store.clear_completed();
            println!("Cleared {} completed task(s)", removed);
        }
    }

    render(&nav, Some(&store));

    store.flush();
    if store.failed_saves() > 0 {
        tracing::warn!(failed = store.failed_saves(), "Some changes were not saved");
    }

    Ok(())
}

/// Map a 1-based list position to the task's id
fn resolve(store: &TaskStore, position: usize) -> Result<TaskId> {
    position
        .checked_sub(1)
        .and_then(|index| store.id_at(index))
        .ok_or_else(|| eyre!("No task at position {} (list has {})", position, store.len()))
}

fn render(nav: &Navigator, store: Option<&TaskStore>) {
    match (nav.current(), store) {
        (Screen::TaskList, Some(store)) => render_list(store),
        _ => {
            println!("{}", WELCOME_TITLE.bold());
            println!();
            println!("{} (run `tasklist list`)", WELCOME_ACTION.cyan());
        }
    }
}

fn render_list(store: &TaskStore) {
    println!();
    println!("{}  {}", LIST_TITLE.bold(), store.len().to_string().bold());

    if store.is_empty() {
        println!("  {}", "Nothing here yet. Write a task with `tasklist add`.".dimmed());
        return;
    }

    for (index, task) in store.tasks().iter().enumerate() {
        let marker = if task.completed { "[x]" } else { "[ ]" };
        let text = if task.completed {
            task.text.strikethrough().dimmed()
        } else {
            task.text.normal()
        };

        if store.editing() == Some(task.id) {
            println!("{:>3}. {} {} {}", index + 1, marker, text, "(editing)".yellow());
        } else {
            println!("{:>3}. {} {}", index + 1, marker, text);
        }
    }
}
