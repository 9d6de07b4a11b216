//! Fill/update orchestration between a provider and a repository.
//!
//! - `fill` inserts every desired symbol the repository does not have yet.
//!   The first failure stops the run and is returned.
//! - `update` refreshes every symbol the repository already has. Failures are
//!   logged per symbol and the loop carries on.
//!
//! Both loops are sequential and blocking.

use crate::data::provider::{DataError, MarketDataProvider};
use crate::data::record::Symbol;
use crate::logging::Log;
use crate::store::{Repository, StoreError};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

const COMPONENT: &str = "sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch {symbol}: {source}")]
    Fetch {
        symbol: Symbol,
        #[source]
        source: DataError,
    },

    #[error("store {symbol}: {source}")]
    Store {
        symbol: Symbol,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub fn symbol(&self) -> &str {
        match self {
            SyncError::Fetch { symbol, .. } | SyncError::Store { symbol, .. } => symbol,
        }
    }
}

/// Progress callback for multi-symbol runs.
pub trait SyncProgress: Send + Sync {
    /// Called before fetching a symbol.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol is done, successfully or not.
    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<(), SyncError>);

    /// Called once when the loop ends, including when `fill` stops early.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl SyncProgress for NoProgress {
    fn on_start(&self, _symbol: &str, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _symbol: &str,
        _index: usize,
        _total: usize,
        _result: &Result<(), SyncError>,
    ) {
    }

    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

/// Prints one line per symbol to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutProgress;

impl SyncProgress for StdoutProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {symbol}...", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<(), SyncError>,
    ) {
        match result {
            Ok(()) => println!("  OK: {symbol}"),
            Err(e) => println!("  FAIL: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nSync complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

static NO_PROGRESS: NoProgress = NoProgress;

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<SyncError>,
}

impl SyncSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

pub struct SyncEngine<'a> {
    repo: &'a dyn Repository,
    provider: &'a dyn MarketDataProvider,
    progress: &'a dyn SyncProgress,
    log: Arc<dyn Log>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        repo: &'a dyn Repository,
        provider: &'a dyn MarketDataProvider,
        log: Arc<dyn Log>,
    ) -> Self {
        Self {
            repo,
            provider,
            progress: &NO_PROGRESS,
            log,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn SyncProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Desired symbols the repository does not hold yet.
    pub fn backlog(&self, desired: &BTreeSet<Symbol>) -> BTreeSet<Symbol> {
        let persisted: BTreeSet<Symbol> = self.repo.get_keys().into_iter().collect();
        desired.difference(&persisted).cloned().collect()
    }

    /// Fetch and insert every symbol in the backlog.
    ///
    /// Not resilient: the first fetch or insert failure aborts the remaining
    /// backlog. Symbols inserted before the failure stay inserted.
    pub fn fill(&self, desired: &BTreeSet<Symbol>) -> Result<SyncSummary, SyncError> {
        let backlog = self.backlog(desired);
        let total = backlog.len();
        self.log.info(
            COMPONENT,
            &format!(
                "Fill: {} desired, {total} missing from {} repository",
                desired.len(),
                self.repo.name()
            ),
        );

        let mut summary = SyncSummary {
            total,
            ..SyncSummary::default()
        };

        for (i, symbol) in backlog.iter().enumerate() {
            self.progress.on_start(symbol, i, total);
            let result = self.fill_one(symbol);
            self.progress.on_complete(symbol, i, total, &result);

            if let Err(e) = result {
                self.log.error(
                    COMPONENT,
                    &format!("Fill aborted at {symbol} ({}/{total}): {e}", i + 1),
                );
                self.progress
                    .on_batch_complete(summary.succeeded, summary.failed + 1, total);
                return Err(e);
            }
            summary.succeeded += 1;
        }

        self.progress.on_batch_complete(summary.succeeded, 0, total);
        Ok(summary)
    }

    fn fill_one(&self, symbol: &str) -> Result<(), SyncError> {
        let record = self
            .provider
            .fetch(symbol)
            .map_err(|source| SyncError::Fetch {
                symbol: symbol.to_string(),
                source,
            })?;
        self.repo
            .insert_data(&record)
            .map_err(|source| SyncError::Store {
                symbol: symbol.to_string(),
                source,
            })
    }

    /// Refetch and overwrite every symbol already in the repository.
    ///
    /// A failing symbol is logged and skipped; the loop always runs to the end.
    pub fn update(&self) -> SyncSummary {
        let keys = self.repo.get_keys();
        let total = keys.len();
        self.log.info(
            COMPONENT,
            &format!("Update: {total} symbols in {} repository", self.repo.name()),
        );

        let mut summary = SyncSummary {
            total,
            ..SyncSummary::default()
        };

        for (i, symbol) in keys.iter().enumerate() {
            self.progress.on_start(symbol, i, total);
            let result = self.update_one(symbol);
            self.progress.on_complete(symbol, i, total, &result);

            match result {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    self.log
                        .error(COMPONENT, &format!("Update failed for {symbol}: {e}"));
                    summary.failed += 1;
                    summary.errors.push(e);
                }
            }
        }

        self.progress
            .on_batch_complete(summary.succeeded, summary.failed, total);
        summary
    }

    fn update_one(&self, symbol: &str) -> Result<(), SyncError> {
        let record = self
            .provider
            .fetch(symbol)
            .map_err(|source| SyncError::Fetch {
                symbol: symbol.to_string(),
                source,
            })?;
        self.repo
            .update(symbol, &record)
            .map_err(|source| SyncError::Store {
                symbol: symbol.to_string(),
                source,
            })
    }
}
