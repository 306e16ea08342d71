mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rift_core::{Config, ConflictPolicy, LogLevel};

/// rift - row-level changesets for SQLite databases
#[derive(Parser)]
#[command(name = "rift")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: rift.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// No diagnostics at all
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Their value wins, the local edit is dropped
    Theirs,
    /// The local edit is re-applied on top of their value
    Local,
}

impl From<Policy> for ConflictPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Theirs => ConflictPolicy::Theirs,
            Policy::Local => ConflictPolicy::Local,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write the changes turning BASE into MODIFIED to a changeset file
    Diff {
        base: PathBuf,
        modified: PathBuf,
        /// Output changeset
        output: PathBuf,
    },

    /// Apply a changeset to a database in place
    Apply {
        database: PathBuf,
        changeset: PathBuf,
        /// Conflict report; written only when there are conflicts, and
        /// nothing is applied if it cannot be written
        #[arg(long)]
        conflicts: Option<PathBuf>,
    },

    /// Write the inverse of a changeset
    Invert { changeset: PathBuf, output: PathBuf },

    /// Rebase LOCAL onto THEIR; both derive from BASE. LOCAL is modified in place
    Rebase {
        base: PathBuf,
        their: PathBuf,
        local: PathBuf,
        /// Conflict report, written only when there are conflicts
        #[arg(long, default_value = "conflicts.json")]
        conflicts: PathBuf,
        /// Override the configured conflict policy
        #[arg(long, value_enum)]
        policy: Option<Policy>,
    },

    /// Rebase the changes between BASE and LOCAL onto an existing changeset
    RebaseChangeset {
        base: PathBuf,
        local: PathBuf,
        their_changeset: PathBuf,
        /// Output changeset
        output: PathBuf,
        #[arg(long, default_value = "conflicts.json")]
        conflicts: PathBuf,
        #[arg(long, value_enum)]
        policy: Option<Policy>,
    },

    /// Combine sequential changesets into one
    Concat {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the changes of a changeset as JSON
    List {
        changeset: PathBuf,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-table insert/update/delete counts as JSON
    Summary {
        changeset: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Number of operations in a changeset
    Count { changeset: PathBuf },

    /// Print whether a changeset has any operation (exit status 0 either way)
    HasChanges { changeset: PathBuf },

    /// Write every row of a database as inserts to a changeset
    Dump { database: PathBuf, output: PathBuf },

    /// Print the tables and columns rift would diff
    Schema {
        database: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Consistent copy of a database file
    Copy { src: PathBuf, dst: PathBuf },

    /// Print the library version
    Version,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None if Path::new("rift.toml").exists() => Config::from_file(Path::new("rift.toml"))?,
        None => Config::from_env()?,
    };
    Ok(config)
}

fn log_level(cli: &Cli, config: &Config) -> LogLevel {
    if cli.quiet {
        return LogLevel::Silent;
    }
    match cli.verbose {
        0 => config.log_level,
        1 => config.log_level.max(LogLevel::Info),
        _ => LogLevel::Debug,
    }
}

fn init_logging(level: LogLevel) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.to_level_filter().into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    config.log_level = log_level(&cli, &config);
    init_logging(config.log_level);
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Diff {
            base,
            modified,
            output,
        } => commands::changeset::diff(&config, &base, &modified, &output),
        Commands::Apply {
            database,
            changeset,
            conflicts,
        } => commands::changeset::apply(&config, &database, &changeset, conflicts.as_deref()),
        Commands::Invert { changeset, output } => {
            commands::changeset::invert(&config, &changeset, &output)
        }
        Commands::Rebase {
            base,
            their,
            local,
            conflicts,
            policy,
        } => {
            if let Some(policy) = policy {
                config.conflict_policy = policy.into();
            }
            commands::changeset::rebase(&config, &base, &their, &local, &conflicts)
        }
        Commands::RebaseChangeset {
            base,
            local,
            their_changeset,
            output,
            conflicts,
            policy,
        } => {
            if let Some(policy) = policy {
                config.conflict_policy = policy.into();
            }
            commands::changeset::rebase_changeset(
                &config,
                &base,
                &local,
                &their_changeset,
                &output,
                &conflicts,
            )
        }
        Commands::Concat { inputs, output } => {
            commands::changeset::concat(&config, &inputs, &output)
        }
        Commands::List { changeset, output } => {
            commands::inspect::list(&config, &changeset, output.as_deref())
        }
        Commands::Summary { changeset, output } => {
            commands::inspect::summary(&config, &changeset, output.as_deref())
        }
        Commands::Count { changeset } => commands::inspect::count(&config, &changeset),
        Commands::HasChanges { changeset } => commands::inspect::has_changes(&config, &changeset),
        Commands::Dump { database, output } => {
            commands::database::dump(&config, &database, &output)
        }
        Commands::Schema { database, output } => {
            commands::database::schema(&config, &database, output.as_deref())
        }
        Commands::Copy { src, dst } => commands::database::copy(&config, &src, &dst),
        Commands::Version => {
            println!("{}", rift_merge::version());
            Ok(())
        }
    }
}
