//! PriceVault CLI: fill, update, and inspect a price vault.
//!
//! Commands:
//! - `fill`: fetch every ticker in the list that is not stored yet
//! - `update`: refetch and overwrite every stored symbol
//! - `keys`: list stored symbols
//! - `show`: print one stored record, optionally exporting it as CSV
//! - `verify`: validate every group in the container

mod export;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pricevault_core::config::{Backend, VaultConfig};
use pricevault_core::data::{CircuitBreaker, TickerList, YahooProvider};
use pricevault_core::logging::{init_tracing, Log, TracingLog};
use pricevault_core::store::{open_repository, ContainerStore, NullRepository, Repository};
use pricevault_core::sync::{StdoutProgress, SyncEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "config/pricevault.toml";

#[derive(Parser)]
#[command(
    name = "pricevault",
    about = "PriceVault CLI: keyed daily price storage synced from Yahoo Finance"
)]
struct Cli {
    /// Path to the TOML config. Defaults to config/pricevault.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the null repository: fetches run, nothing is persisted.
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and insert every listed ticker that is not stored yet.
    Fill,
    /// Refetch and overwrite every stored symbol.
    Update,
    /// List stored symbols.
    Keys,
    /// Print a stored record.
    Show {
        symbol: String,

        /// Only print the last N rows.
        #[arg(long)]
        tail: Option<usize>,

        /// Also write the full record to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Validate every group in the container. Exits 1 if any is corrupt.
    Verify,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(config.level());

    let log: Arc<dyn Log> = Arc::new(TracingLog);
    let open = || build_repository(&config, cli.dry_run, log.clone());

    match cli.command {
        Commands::Fill => run_fill(&config, open()?.as_ref(), log.clone()),
        Commands::Update => run_update(open()?.as_ref(), log.clone()),
        Commands::Keys => run_keys(open()?.as_ref()),
        Commands::Show { symbol, tail, csv } => run_show(open()?.as_ref(), &symbol, tail, csv),
        Commands::Verify => {
            if cli.dry_run {
                bail!("verify reads the stored container; --dry-run has nothing to check");
            }
            if run_verify(&config, log.clone())? > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
        None => return Ok(VaultConfig::default()),
    };
    let config = VaultConfig::from_file(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config.resolve_paths(base))
}

fn build_repository(
    config: &VaultConfig,
    dry_run: bool,
    log: Arc<dyn Log>,
) -> Result<Box<dyn Repository>> {
    if dry_run {
        return Ok(Box::new(NullRepository::new(log)));
    }
    open_repository(&config.repository, log).with_context(|| {
        format!(
            "failed to open repository at {}",
            config.repository.path.display()
        )
    })
}

fn build_provider() -> Result<YahooProvider> {
    let circuit_breaker = Arc::new(CircuitBreaker::for_remote_provider());
    Ok(YahooProvider::new(circuit_breaker)?)
}

fn run_fill(config: &VaultConfig, repo: &dyn Repository, log: Arc<dyn Log>) -> Result<()> {
    let tickers = TickerList::from_file(&config.tickers.path).with_context(|| {
        format!(
            "failed to read ticker list {}",
            config.tickers.path.display()
        )
    })?;
    if tickers.is_empty() {
        println!("Ticker list is empty: {}", config.tickers.path.display());
        return Ok(());
    }

    let provider = build_provider()?;
    let progress = StdoutProgress;
    let engine = SyncEngine::new(repo, &provider, log).with_progress(&progress);

    let summary = engine.fill(tickers.symbols())?;
    if summary.total == 0 {
        println!("Nothing to fill: all {} tickers are stored.", tickers.len());
    }
    Ok(())
}

fn run_update(repo: &dyn Repository, log: Arc<dyn Log>) -> Result<()> {
    let provider = build_provider()?;
    let progress = StdoutProgress;
    let summary = SyncEngine::new(repo, &provider, log)
        .with_progress(&progress)
        .update();

    if !summary.all_succeeded() {
        for err in &summary.errors {
            eprintln!("Error for {}: {err}", err.symbol());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_keys(repo: &dyn Repository) -> Result<()> {
    let keys = repo.get_keys();
    if keys.is_empty() {
        println!("No symbols stored.");
        return Ok(());
    }
    for key in &keys {
        println!("{key}");
    }
    Ok(())
}

fn run_show(
    repo: &dyn Repository,
    symbol: &str,
    tail: Option<usize>,
    csv_path: Option<PathBuf>,
) -> Result<()> {
    let Some(record) = repo.get_by_key(symbol) else {
        bail!("no stored data for {symbol}");
    };

    if let Some((first, last)) = record.date_range() {
        println!("{symbol}: {} rows, {first} to {last}", record.len());
    }
    let df = record.to_dataframe()?;
    let df = match tail {
        Some(n) => df.tail(Some(n)),
        None => df,
    };
    println!("{df}");

    if let Some(path) = csv_path {
        std::fs::write(&path, export::record_csv(&record)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("CSV saved to: {}", path.display());
    }
    Ok(())
}

/// Check the configured container without creating or modifying it.
/// Returns the number of corrupt groups.
fn run_verify(config: &VaultConfig, log: Arc<dyn Log>) -> Result<usize> {
    if config.repository.backend != Backend::Container {
        bail!("verify needs the container backend");
    }
    let path = &config.repository.path;
    let store = ContainerStore::open_read_only(path, log)
        .with_context(|| format!("cannot verify {}", path.display()))?;
    let corrupt = store.verify()?;

    if corrupt.is_empty() {
        println!("OK: {}", store.path().display());
        return Ok(0);
    }
    println!("Corrupt groups in {}:", store.path().display());
    for group in &corrupt {
        println!("  {}: {}", group.symbol, group.reason);
    }
    Ok(corrupt.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricevault_core::logging::MemoryLog;

    fn config_at(path: PathBuf) -> VaultConfig {
        let mut config = VaultConfig::default();
        config.repository.backend = Backend::Container;
        config.repository.path = path;
        config
    }

    #[test]
    fn verify_on_missing_container_fails_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.pvc");

        let err = run_verify(&config_at(path.clone()), Arc::new(MemoryLog::new())).unwrap_err();

        assert!(err.to_string().contains("cannot verify"));
        assert!(!path.exists());
    }

    #[test]
    fn verify_counts_corrupt_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.pvc");
        let log: Arc<dyn Log> = Arc::new(MemoryLog::new());
        ContainerStore::open(&path, log.clone()).unwrap();

        assert_eq!(run_verify(&config_at(path), log).unwrap(), 0);
    }

    #[test]
    fn verify_rejects_the_null_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_at(dir.path().join("prices.pvc"));
        config.repository.backend = Backend::Null;

        assert!(run_verify(&config, Arc::new(MemoryLog::new())).is_err());
    }
}
