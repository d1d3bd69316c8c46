use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tracing::Level;

use tsk_core::config::{ConfigStore, StatusMode, SystemMode};
use tsk_core::paths::{expand_home, AppPaths, DATA_DIRNAME};
use tsk_core::repository::TaskRepository;
use tsk_core::task::{normalize_tags, Color, Task, TaskDraft};

#[derive(Parser)]
#[command(name = "tsk", version, about = "Personal task tracker")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Config file to use instead of ~/.tskrc
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information
    Version,
    /// View or edit the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// View/Edit the system mode
    Mode {
        #[arg(long)]
        edit: Option<SystemMode>,
    },
    /// View/Edit the data directory
    File {
        #[arg(long)]
        edit: Option<String>,
    },
    /// View/Edit/Delete preferences of a category
    Preference {
        #[arg(short, long)]
        category: Option<String>,
        /// Delete the key, or every preference when no key is given
        #[arg(short, long)]
        delete: bool,
        key: Option<String>,
        /// New value (parsed as JSON, falling back to a plain string)
        value: Option<String>,
    },
    /// View/Edit the default category
    DefaultCategory {
        #[arg(long)]
        edit: Option<String>,
    },
    /// Print the value at a dotted path
    Get { path: String },
    /// Set the value at a dotted path
    Set { path: String, value: String },
    /// Remove the value at a dotted path
    Unset { path: String },
}

#[derive(Subcommand)]
enum CategoryCommand {
    List,
    Add { name: String },
    Remove { name: String },
    /// View/Edit the status mode of a category
    Mode {
        name: String,
        #[arg(long)]
        set: Option<StatusMode>,
    },
    /// View/Edit the allowed states of an enum category
    States {
        name: String,
        #[arg(long, value_delimiter = ',')]
        set: Option<Vec<String>>,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    Add {
        title: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, default_value = "")]
        priority: String,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        #[arg(long, default_value_t = Color::White)]
        color: Color,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    List {
        #[arg(short, long)]
        category: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Show { key: String },
    Done { key: String },
    Undone { key: String },
    Delete { key: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Command::Version = command {
        println!("tsk {}", tsk_core::version());
        return Ok(());
    }

    let paths = resolve_paths(cli.config.as_deref())?;
    let mut config = ConfigStore::open(&paths)
        .with_context(|| format!("open config {}", paths.config_file.display()))?;

    match command {
        Command::Version => unreachable!("handled above"),
        Command::Config(cmd) => run_config(&mut config, cmd),
        Command::Category(cmd) => run_category(TaskRepository::open(config)?, cmd),
        Command::Task(cmd) => run_task(TaskRepository::open(config)?, cmd),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_paths(config: Option<&Path>) -> Result<AppPaths> {
    match config {
        Some(file) => {
            let file = absolutize(file)?;
            let data_dir = file
                .parent()
                .map(|dir| dir.join(DATA_DIRNAME))
                .ok_or_else(|| anyhow!("config path {} has no parent", file.display()))?;
            Ok(AppPaths::new(file, data_dir))
        }
        None => Ok(AppPaths::resolve()?),
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolve current directory")?;
    Ok(cwd.join(path))
}

fn run_config(config: &mut ConfigStore, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Mode { edit: Some(mode) } => config.set_mode(mode)?,
        ConfigCommand::Mode { edit: None } => println!("System Mode: {}", config.get_mode()?),
        ConfigCommand::File { edit: Some(dir) } => {
            let dir = absolutize(&expand_home(&dir))?;
            config.set_data_dir(&dir)?;
        }
        ConfigCommand::File { edit: None } => {
            println!("Data Directory: {}", config.get_data_dir()?.display())
        }
        ConfigCommand::Preference {
            category,
            delete,
            key,
            value,
        } => {
            let category = match category {
                Some(category) => category,
                None => config.get_default_category()?,
            };
            match (delete, key, value) {
                (true, None, _) => config.clean_preferences()?,
                (true, Some(key), _) => {
                    config.remove_preference(&category, &key)?;
                }
                (false, Some(key), Some(value)) => {
                    config.set_preference(&category, &key, parse_value(&value))?
                }
                (false, Some(key), None) => {
                    let value = config.get_preference(&category, Some(&key));
                    println!(
                        "{}.preferences.{}: {}",
                        category,
                        key,
                        value.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
                    );
                }
                (false, None, Some(_)) => bail!("a value needs a key"),
                (false, None, None) => {
                    let prefs = config.get_preference(&category, None).unwrap_or(Value::Null);
                    println!("{}", serde_json::to_string_pretty(&prefs)?);
                }
            }
        }
        ConfigCommand::DefaultCategory { edit: Some(name) } => config.set_default_category(&name)?,
        ConfigCommand::DefaultCategory { edit: None } => {
            println!("Default Category: {}", config.get_default_category()?)
        }
        ConfigCommand::Get { path } => {
            println!("{}", serde_json::to_string_pretty(config.get(&path)?)?)
        }
        ConfigCommand::Set { path, value } => config.set(&path, parse_value(&value))?,
        ConfigCommand::Unset { path } => {
            config.remove(&path)?;
        }
    }
    Ok(())
}

fn run_category(mut repo: TaskRepository, cmd: CategoryCommand) -> Result<()> {
    match cmd {
        CategoryCommand::List => {
            let default = repo.config().get_default_category()?;
            for name in repo.config().get_categories()? {
                let marker = if name == default { "*" } else { " " };
                let mode = repo.config().get_status_mode(&name)?;
                println!("{} {} ({})", marker, name, mode);
            }
        }
        CategoryCommand::Add { name } => {
            if !repo.config_mut().add_category(&name)? {
                println!("Category {} already exists", name);
            }
        }
        CategoryCommand::Remove { name } => repo.remove_category(&name)?,
        CategoryCommand::Mode { name, set: Some(mode) } => {
            repo.config_mut().set_status_mode(&name, mode)?
        }
        CategoryCommand::Mode { name, set: None } => {
            println!("{}", repo.config().get_status_mode(&name)?)
        }
        CategoryCommand::States { name, set: Some(states) } => {
            repo.config_mut().set_statuses(&name, &states)?
        }
        CategoryCommand::States { name, set: None } => {
            println!("{}", repo.config().get_statuses(&name)?.join(", "))
        }
    }
    Ok(())
}

fn run_task(repo: TaskRepository, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Add {
            title,
            key,
            category,
            description,
            priority,
            due,
            color,
            tags,
        } => {
            let draft = TaskDraft {
                key: key.unwrap_or_default(),
                title,
                description,
                priority,
                due_date: due.as_deref().map(parse_due).transpose()?,
                color,
                tags: normalize_tags(&tags),
                category: category.unwrap_or_default(),
                ..TaskDraft::default()
            };
            let task = repo.create(draft)?;
            println!("{}", task.key);
        }
        TaskCommand::List { category, json } => {
            let tasks = match category {
                Some(category) => repo.list_category(&category)?,
                None => repo.list()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    println!("{}", render_task_line(&repo, task)?);
                }
            }
        }
        TaskCommand::Show { key } => {
            println!("{}", serde_json::to_string_pretty(&repo.get(&key)?)?);
        }
        TaskCommand::Done { key } => {
            repo.set_done(&key, true)?;
        }
        TaskCommand::Undone { key } => {
            repo.set_done(&key, false)?;
        }
        TaskCommand::Delete { key } => {
            let task = repo.delete(&key)?;
            println!("Deleted {}", task);
        }
    }
    Ok(())
}

fn render_task_line(repo: &TaskRepository, task: &Task) -> Result<String> {
    let mark = if repo.is_done(task)? { "x" } else { " " };
    let due = task
        .due_date
        .map(|due| due.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    Ok(format!(
        "[{}] {} | {} | {} | {} | {}",
        mark, task.key, task.category, task.status, due, task.title
    ))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_due(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid due date `{}` (expected RFC 3339 or YYYY-MM-DD)", raw))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid due date `{}`", raw))?;
    Ok(Utc.from_utc_datetime(&midnight))
}
