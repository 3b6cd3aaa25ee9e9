use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::PriorityFilter;
use crate::sort::SortStrategy;
use crate::task::Priority;
use crate::view::ViewName;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskview",
    version,
    about = "Task lists grouped into live views: today, upcoming, completed and per category",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show a view: all-active, today, upcoming, completed or category:<id>.
    List(ListArgs),
    /// Add a task, optionally pre-filled for the view it is added from.
    Add(AddArgs),
    /// Change fields of an existing task.
    Edit(EditArgs),
    /// Flip a task between active and completed.
    Toggle { id: u64 },
    Delete { id: u64 },
    /// Delete every completed task.
    ClearCompleted,
    /// Task counts per built-in view.
    Counts {
        #[arg(long)]
        json: bool,
    },
    /// Categories with their active-task counts.
    Categories,
    CategoryAdd(CategoryAddArgs),
    CategoryDelete { id: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(value_parser = parse_view)]
    pub view: Option<ViewName>,

    #[arg(short = 's', long)]
    pub search: Option<String>,

    #[arg(short = 'p', long, value_parser = parse_priority_filter)]
    pub priority: Option<PriorityFilter>,

    #[arg(long, value_parser = parse_sort)]
    pub sort: Option<SortStrategy>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    #[arg(short = 'p', long, value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// today, tomorrow, a weekday, +3d, 2026-03-01 or RFC 3339.
    #[arg(long)]
    pub due: Option<String>,

    /// Apply this view's quick-add defaults.
    #[arg(long, value_parser = parse_view)]
    pub view: Option<ViewName>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: u64,

    #[arg(short = 't', long)]
    pub title: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    #[arg(short = 'p', long, value_parser = parse_priority)]
    pub priority: Option<Priority>,

    #[arg(long, conflicts_with = "no_due")]
    pub due: Option<String>,

    /// Clear the due date.
    #[arg(long)]
    pub no_due: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryAddArgs {
    #[arg(required = true, num_args = 1..)]
    pub name: Vec<String>,

    #[arg(long)]
    pub color: Option<String>,

    #[arg(long)]
    pub icon: Option<String>,
}

fn parse_view(raw: &str) -> Result<ViewName, String> {
    raw.parse().map_err(|err: crate::error::Error| err.to_string())
}

fn parse_sort(raw: &str) -> Result<SortStrategy, String> {
    raw.parse().map_err(|err: crate::error::Error| err.to_string())
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    raw.parse().map_err(|err: crate::error::Error| err.to_string())
}

fn parse_priority_filter(raw: &str) -> Result<PriorityFilter, String> {
    raw.parse().map_err(|err: crate::error::Error| err.to_string())
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
