use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use chrono::Local;
use clap::{Args, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tracing::info;

use ledgersync_core::auth::{CredentialStore, TokenSource};
use ledgersync_core::cache::StoreKey;
use ledgersync_core::models::{DatasetKind, EntryKind, LedgerEntry, QuickEntry};
use ledgersync_core::utils::{format_amount, local_timestamp};
use ledgersync_core::{Config, PushOutcome, Scheduler, SyncError};

use crate::context::{load_config, Context};

#[derive(Args)]
pub struct EntryArgs {
    #[arg(short, long)]
    pub description: String,
    #[arg(short, long)]
    pub amount: f64,
    #[arg(short, long)]
    pub category: String,
    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub date: String,
    /// Mark as already paid on the due date
    #[arg(long)]
    pub paid: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ListKind {
    Incomes,
    Expenses,
}

impl From<ListKind> for EntryKind {
    fn from(kind: ListKind) -> Self {
        match kind {
            ListKind::Incomes => EntryKind::Incomes,
            ListKind::Expenses => EntryKind::Expenses,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RemoveKind {
    Incomes,
    Expenses,
    Quick,
}

#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Set the budget for a key; the value is JSON or a plain number
    Set { key: String, value: String },
    /// Remove a budget
    Remove { key: String },
}

#[derive(Subcommand)]
pub enum BalanceCommands {
    /// Set the carry-over balance for a period
    Set { period: String, amount: f64 },
    /// Remove a carry-over balance
    Remove { period: String },
}

// ============================================================================
// Local-only commands
// ============================================================================

pub fn init(
    owner: String,
    repo: String,
    branch: Option<String>,
    data_file: Option<String>,
) -> Result<()> {
    let mut config = Config::load()?;
    config.owner = owner;
    config.repo = repo;
    if let Some(branch) = branch {
        config.branch = branch;
    }
    if let Some(data_file) = data_file {
        config.data_file = data_file;
    }
    config.validate()?;
    config.save()?;

    println!("Configuration written to {}", Config::config_path()?.display());
    println!(
        "Ledger: {}/{}@{} {}",
        config.owner, config.repo, config.branch, config.data_file
    );
    Ok(())
}

pub fn login() -> Result<()> {
    let config = load_config()?;
    config.validate()?;

    let token = rpassword::prompt_password(format!(
        "Token with write access to {}/{}: ",
        config.owner, config.repo
    ))
    .context("Failed to read token")?;
    let token = token.trim();
    if token.is_empty() {
        bail!("No token entered");
    }

    CredentialStore::store(&config, token)?;
    info!(owner = %config.owner, repo = %config.repo, "Write token stored");
    println!("Token stored in the system keychain.");
    Ok(())
}

pub fn logout() -> Result<()> {
    let config = load_config()?;
    config.validate()?;
    CredentialStore::delete(&config)?;
    println!("Token removed. Changes will be saved locally only.");
    Ok(())
}

// ============================================================================
// Ledger commands
// ============================================================================

pub async fn status(ctx: &Context) -> Result<()> {
    let manager = &ctx.manager;
    let cache = manager.snapshot();
    let ages = ctx.store.ages();
    let reachable = manager.check_connectivity().await;

    println!(
        "Repository:  {}/{}@{} ({})",
        ctx.config.owner, ctx.config.repo, ctx.config.branch, ctx.config.data_file
    );
    println!("Status:      {}", manager.status());
    println!("Remote:      {}", if reachable { "reachable" } else { "unreachable" });
    println!(
        "Write token: {}",
        match ctx.token_source {
            Some(TokenSource::Environment) => "from environment",
            Some(TokenSource::Keychain) => "from keychain",
            None => "none (local only)",
        }
    );
    println!(
        "Last sync:   {}",
        cache
            .last_sync
            .map(local_timestamp)
            .unwrap_or_else(|| "never".to_string())
    );
    println!("Cache dir:   {}", ctx.store.cache_dir().display());
    println!();

    for kind in DatasetKind::ALL {
        println!(
            "  {:<16} {:>5}   updated {}",
            kind.display_name(),
            cache.len(kind),
            ages.get(StoreKey::Dataset(kind)).unwrap_or("never")
        );
    }

    let total = |entries: &[LedgerEntry]| entries.iter().map(|e| e.amount).sum::<f64>();
    println!();
    println!("  Total incomes:  {}", format_amount(total(&cache.incomes)));
    println!("  Total expenses: {}", format_amount(total(&cache.expenses)));
    Ok(())
}

pub async fn pull(ctx: &Context) -> Result<()> {
    let cache = ctx.manager.reconcile_from_remote().await;
    println!(
        "{} incomes, {} expenses, {} quick entries",
        cache.incomes.len(),
        cache.expenses.len(),
        cache.quick_entries.len()
    );
    Ok(())
}

pub async fn add_entry(ctx: &Context, kind: EntryKind, args: EntryArgs) -> Result<()> {
    let mut entry =
        LedgerEntry::new(args.description, args.amount, args.category).with_due_date(&args.date);
    if args.paid {
        entry = entry.paid_on(args.date);
    }

    match ctx.manager.add_entry(kind, entry).await {
        Ok(entry) => {
            println!("Added {} entry {}", kind, entry.id);
            Ok(())
        }
        Err(e) => report_kept_locally(e),
    }
}

pub async fn quick(
    ctx: &Context,
    description: String,
    amount: f64,
    category: String,
    date: Option<String>,
) -> Result<()> {
    let date = date.unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());
    let quick = QuickEntry::new(description, amount, category, date);

    match ctx.manager.add_quick_entry(quick).await {
        Ok(quick) => {
            println!("Logged quick entry {} ({})", quick.id, format_amount(quick.amount));
            Ok(())
        }
        Err(e) => report_kept_locally(e),
    }
}

pub async fn update(ctx: &Context, kind: ListKind, id: i64, assignments: &[String]) -> Result<()> {
    let mut fields = Map::new();
    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        fields.insert(key, value);
    }

    match ctx.manager.update_entry(kind.into(), id, fields).await {
        Ok(entry) => {
            println!("Updated {} entry {}", EntryKind::from(kind), entry.id);
            Ok(())
        }
        Err(e) => report_kept_locally(e),
    }
}

pub async fn remove(ctx: &Context, kind: RemoveKind, id: i64) -> Result<()> {
    let result = match kind {
        RemoveKind::Incomes => ctx.manager.remove_entry(EntryKind::Incomes, id).await,
        RemoveKind::Expenses => ctx.manager.remove_entry(EntryKind::Expenses, id).await,
        RemoveKind::Quick => ctx.manager.remove_quick_entry(id).await,
    };
    report_outcome(result)
}

pub async fn budget(ctx: &Context, command: BudgetCommands) -> Result<()> {
    let result = match command {
        BudgetCommands::Set { key, value } => {
            ctx.manager.set_budget(key, parse_value(&value)).await
        }
        BudgetCommands::Remove { key } => ctx.manager.remove_budget(&key).await,
    };
    report_outcome(result)
}

pub async fn balance(ctx: &Context, command: BalanceCommands) -> Result<()> {
    let result = match command {
        BalanceCommands::Set { period, amount } => {
            ctx.manager.set_prior_balance(period, amount).await
        }
        BalanceCommands::Remove { period } => ctx.manager.remove_prior_balance(&period).await,
    };
    report_outcome(result)
}

pub fn export(ctx: &Context, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(ctx.manager.suggested_backup_file_name()));
    let bytes = ctx.manager.export_backup()?;
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;
    println!("Backup written to {}", path.display());
    Ok(())
}

pub async fn import(ctx: &Context, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read backup {}", path.display()))?;
    let summary = ctx.manager.import_backup(&bytes).await?;

    println!(
        "Restored {} incomes, {} expenses, {} budgets, {} balances, {} quick entries",
        summary.incomes,
        summary.expenses,
        summary.budgets,
        summary.prior_balances,
        summary.quick_entries
    );
    if !summary.pushed {
        println!("The backup was restored locally but not pushed to the repository.");
    }
    Ok(())
}

pub async fn watch(ctx: &Context) -> Result<()> {
    ctx.manager.reconcile_from_remote().await;

    let interval = ctx.config.sync_interval();
    let handle = Scheduler::start(ctx.manager.clone(), interval);
    println!("Syncing every {}s. Press Ctrl-C to stop.", interval.as_secs());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.stop().await;
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse `key=value`. Values that are valid JSON keep their type; anything
/// else is taken as a string.
fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let Some((key, value)) = assignment.split_once('=') else {
        bail!("Expected KEY=VALUE, got `{}`", assignment);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty field name in `{}`", assignment);
    }
    Ok((key.to_string(), parse_value(value)))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn report_outcome(result: Result<PushOutcome, SyncError>) -> Result<()> {
    match result {
        Ok(PushOutcome::Synced(token)) => {
            println!("Saved and synced (version {})", token);
            Ok(())
        }
        Ok(PushOutcome::LocalOnly) => {
            println!("Saved locally (no write token)");
            Ok(())
        }
        Err(e) => report_kept_locally(e),
    }
}

/// Sync failures after a local save are reported, not treated as errors.
fn report_kept_locally(error: SyncError) -> Result<()> {
    if error.kept_locally() {
        eprintln!("Saved locally, but sync failed: {}", error);
        return Ok(());
    }
    Err(error.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assignment_types() {
        assert_eq!(parse_assignment("pago=true").unwrap(), ("pago".to_string(), json!(true)));
        assert_eq!(parse_assignment("valor=12.5").unwrap(), ("valor".to_string(), json!(12.5)));
        assert_eq!(
            parse_assignment("descricao=Conta de luz").unwrap(),
            ("descricao".to_string(), json!("Conta de luz"))
        );
        assert_eq!(
            parse_assignment("nota=a=b").unwrap(),
            ("nota".to_string(), json!("a=b"))
        );
    }

    #[test]
    fn test_parse_assignment_rejects_malformed() {
        assert!(parse_assignment("pago").is_err());
        assert!(parse_assignment("=true").is_err());
    }

    #[test]
    fn test_kept_locally_is_not_an_error() {
        assert!(report_kept_locally(SyncError::Conflict("data/gastos.json".into())).is_ok());
        assert!(report_kept_locally(SyncError::Validation("bad".into())).is_err());
    }
}
