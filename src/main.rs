//! kvmirror: command-line access to a synchronized key/value store.
//!
//! Every command opens the ledger through [`Services`], loads the mirror and
//! goes through the same read-through/write-through paths a host process
//! would use.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use kvmirror::config::Config;
use kvmirror::services::{Services, ServicesOptions};
use kvmirror::{DeletePolicy, SyncedStore};

#[derive(Parser, Debug)]
#[command(name = "kvmirror")]
#[command(version, about = "SQLite key/value ledger with a write-through memory mirror")]
struct Cli {
    /// Ledger database file (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "kvmirror.toml")]
    config: PathBuf,

    /// Tombstone deleted rows instead of removing them
    #[arg(long, global = true)]
    soft_delete: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get { key: String },
    /// Store a value under a key
    Set { key: String, value: String },
    /// Delete a key
    Delete { key: String },
    /// List all live entries
    List {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Physically remove tombstoned rows
    Purge,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = Config::load_or_default(&cli.config)?;
    let validation = config.validate()?;
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }

    let mut options = ServicesOptions::from(&config);
    if let Some(db) = cli.db {
        options.db_path = Some(db);
    }
    if cli.soft_delete {
        options.delete_policy = DeletePolicy::Soft;
    }
    // The CLI always goes through the mirror.
    options.enable_db_cache = true;

    let services = Services::new(options).context("Failed to open store")?;
    let store = services
        .cache
        .context("Store was opened without the memory mirror")?;

    run(&store, cli.command)
}

fn run(store: &SyncedStore, command: Command) -> Result<()> {
    match command {
        Command::Get { key } => match store.get(&key)? {
            Some(value) => println!("{value}"),
            None => anyhow::bail!("Key not found: {key}"),
        },
        Command::Set { key, value } => {
            let entry = store.set(&key, &value)?;
            debug!(id = entry.id, "Stored");
        },
        Command::Delete { key } => {
            if !store.delete(&key)? {
                eprintln!("Key not found: {key}");
            }
        },
        Command::List { json } => {
            let mut entries = store.list();
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            if json {
                let out = serde_json::to_string_pretty(&entries)
                    .context("Failed to serialize entries")?;
                println!("{out}");
            } else {
                for entry in entries {
                    println!("{}\t{}", entry.key, entry.value);
                }
            }
        },
        Command::Purge => {
            let removed = store.purge_tombstones()?;
            println!("Purged {removed} tombstone(s)");
        },
    }
    Ok(())
}

fn init_logging(format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kvmirror=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
