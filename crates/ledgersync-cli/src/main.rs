//! ledgersync - keep a personal ledger in sync with a JSON blob in a Git
//! repository, working offline when the repository is unreachable.

mod commands;
mod context;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledgersync_core::models::EntryKind;

use commands::{BalanceCommands, BudgetCommands, EntryArgs, ListKind, RemoveKind};
use context::Context;

/// Log file prefix for `watch` mode, rotated daily
const LOG_FILE_PREFIX: &str = "ledgersync.log";

#[derive(Parser)]
#[command(
    name = "ledgersync",
    version,
    about = "Offline-first ledger synced through a Git repository",
    long_about = "ledgersync keeps incomes, expenses, budgets and quick entries in a \
                  local cache and synchronizes them with a single JSON file in a Git \
                  repository. Without a write token every change is kept locally."
)]
struct Cli {
    /// Override the local cache directory
    #[arg(long, global = true, env = "LEDGERSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Never write to the remote, even when a token is available
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the repository configuration
    Init {
        /// Repository owner
        #[arg(long)]
        owner: String,
        /// Repository name
        #[arg(long)]
        repo: String,
        /// Branch holding the ledger
        #[arg(long)]
        branch: Option<String>,
        /// Path of the ledger file inside the repository
        #[arg(long)]
        data_file: Option<String>,
    },

    /// Store a write token in the OS keychain
    Login,

    /// Remove the stored write token
    Logout,

    #[command(flatten)]
    Ledger(LedgerCommands),
}

/// Commands that operate on the synced ledger.
#[derive(Subcommand)]
enum LedgerCommands {
    /// Show sync status, connectivity and cache contents
    Status,

    /// Fetch the remote ledger and merge it into the local cache
    Pull,

    /// Add an income
    AddIncome(EntryArgs),

    /// Add an expense
    AddExpense(EntryArgs),

    /// Log a quick expense (also recorded as a paid expense)
    Quick {
        #[arg(short, long)]
        description: String,
        #[arg(short, long)]
        amount: f64,
        #[arg(short, long)]
        category: String,
        /// Expense date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },

    /// Change fields of an existing entry
    Update {
        kind: ListKind,
        id: i64,
        /// Field assignment using the stored field name, e.g. `pago=true`
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },

    /// Remove an entry
    Remove { kind: RemoveKind, id: i64 },

    /// Budget limits
    #[command(subcommand)]
    Budget(BudgetCommands),

    /// Carry-over balances
    #[command(subcommand)]
    Balance(BalanceCommands),

    /// Write a backup of the whole ledger
    Export {
        /// Output file, defaults to a dated name in the current directory
        path: Option<PathBuf>,
    },

    /// Replace the ledger with a backup and push it
    Import { path: PathBuf },

    /// Keep syncing in the background until Ctrl-C
    Watch,
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; `log_dir` adds a daily-rolling file. The returned
/// guard must live until exit so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_dir = match cli.command {
        Commands::Ledger(LedgerCommands::Watch) => {
            Some(context::resolve_cache_dir(cli.data_dir.as_deref())?)
        }
        _ => None,
    };
    let _log_guard = init_tracing(log_dir.as_deref());
    info!("ledgersync starting");

    match cli.command {
        Commands::Init {
            owner,
            repo,
            branch,
            data_file,
        } => commands::init(owner, repo, branch, data_file),
        Commands::Login => commands::login(),
        Commands::Logout => commands::logout(),
        Commands::Ledger(command) => {
            let ctx = Context::build(cli.data_dir.as_deref(), cli.offline)?;
            run_ledger_command(&ctx, command).await
        }
    }
}

async fn run_ledger_command(ctx: &Context, command: LedgerCommands) -> Result<()> {
    match command {
        LedgerCommands::Status => commands::status(ctx).await,
        LedgerCommands::Pull => commands::pull(ctx).await,
        LedgerCommands::AddIncome(args) => commands::add_entry(ctx, EntryKind::Incomes, args).await,
        LedgerCommands::AddExpense(args) => commands::add_entry(ctx, EntryKind::Expenses, args).await,
        LedgerCommands::Quick {
            description,
            amount,
            category,
            date,
        } => commands::quick(ctx, description, amount, category, date).await,
        LedgerCommands::Update { kind, id, set } => commands::update(ctx, kind, id, &set).await,
        LedgerCommands::Remove { kind, id } => commands::remove(ctx, kind, id).await,
        LedgerCommands::Budget(cmd) => commands::budget(ctx, cmd).await,
        LedgerCommands::Balance(cmd) => commands::balance(ctx, cmd).await,
        LedgerCommands::Export { path } => commands::export(ctx, path),
        LedgerCommands::Import { path } => commands::import(ctx, &path).await,
        LedgerCommands::Watch => commands::watch(ctx).await,
    }
}
