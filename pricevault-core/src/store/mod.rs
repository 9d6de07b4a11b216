//! Keyed time series storage.
//!
//! [`Repository`] is the contract every backend implements. Each backend
//! implements the typed `try_*` operations; the boundary operations
//! (`get_by_key`, `get_all`, `get_keys`, `update`) are provided on top of them
//! and apply the masking policy:
//!
//! - read failures are logged and become `None` / empty,
//! - `insert_data` failures propagate,
//! - `update` on a missing symbol is a logged no-op.

pub mod container;
pub mod container_store;
pub mod null;

pub use container::{ContainerFile, ContainerHandle, ContainerStats, Dataset, Group, OpenMode};
pub use container_store::{ContainerStore, CorruptGroup, InsertPolicy};
pub use null::NullRepository;

use crate::config::{Backend, RepositoryConfig};
use crate::data::record::{RecordError, Symbol, TimeSeriesRecord};
use crate::logging::Log;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Typed storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("symbol '{symbol}' not found")]
    NotFound { symbol: Symbol },

    #[error("symbol '{symbol}' already exists; insert does not overwrite")]
    AlreadyExists { symbol: Symbol },

    #[error("container I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("container codec error: {0}")]
    Codec(String),

    #[error("container opened read-only")]
    ReadOnly,

    #[error("container changed since it was opened; nothing was written")]
    Conflict,

    #[error("validation error: {0}")]
    Validation(#[from] RecordError),

    #[error("group '{symbol}' is corrupt: {reason}")]
    Corrupt { symbol: Symbol, reason: String },
}

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Io,
    Validation,
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound { .. } => ErrorClass::NotFound,
            StoreError::Io(_)
            | StoreError::Codec(_)
            | StoreError::ReadOnly
            | StoreError::Conflict => ErrorClass::Io,
            StoreError::AlreadyExists { .. }
            | StoreError::Validation(_)
            | StoreError::Corrupt { .. } => ErrorClass::Validation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

/// What a typed update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// No group under the symbol; nothing was written.
    Missing,
}

/// Storage backend contract.
pub trait Repository: Send + Sync {
    /// Short backend name used as the log component.
    fn name(&self) -> &str;

    /// Sink for boundary log lines.
    fn log(&self) -> &dyn Log;

    /// Create a new group for `record.symbol`. Fails if it already exists.
    fn insert_data(&self, record: &TimeSeriesRecord) -> Result<(), StoreError>;

    fn try_get_by_key(&self, symbol: &str) -> Result<TimeSeriesRecord, StoreError>;

    /// Every stored record, or the first error encountered.
    fn try_get_all(&self) -> Result<BTreeMap<Symbol, TimeSeriesRecord>, StoreError>;

    fn try_get_keys(&self) -> Result<Vec<Symbol>, StoreError>;

    /// Shape-preserving overwrite of an existing group.
    fn try_update(
        &self,
        symbol: &str,
        record: &TimeSeriesRecord,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Stored record, or `None` when absent or unreadable.
    fn get_by_key(&self, symbol: &str) -> Option<TimeSeriesRecord> {
        match self.try_get_by_key(symbol) {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() => {
                self.log()
                    .warn(self.name(), &format!("Ticker {symbol} not found."));
                None
            }
            Err(e) => {
                self.log().error(
                    self.name(),
                    &format!("Error retrieving data by key {symbol}: {e}"),
                );
                None
            }
        }
    }

    /// Every stored record; empty on any error, never partial.
    fn get_all(&self) -> BTreeMap<Symbol, TimeSeriesRecord> {
        self.try_get_all().unwrap_or_else(|e| {
            self.log()
                .error(self.name(), &format!("Error retrieving all data: {e}"));
            BTreeMap::new()
        })
    }

    /// Persisted symbols; empty on error.
    fn get_keys(&self) -> Vec<Symbol> {
        self.try_get_keys().unwrap_or_else(|e| {
            self.log()
                .error(self.name(), &format!("Error retrieving keys: {e}"));
            Vec::new()
        })
    }

    /// Overwrite an existing group. Never fails: a missing symbol is a
    /// warning, any other failure is logged.
    fn update(&self, symbol: &str, record: &TimeSeriesRecord) -> Result<(), StoreError> {
        match self.try_update(symbol, record) {
            Ok(UpdateOutcome::Updated) => {}
            Ok(UpdateOutcome::Missing) => self
                .log()
                .warn(self.name(), &format!("Ticker {symbol} not found to update.")),
            Err(e) => self.log().error(
                self.name(),
                &format!("Error updating data for {symbol}: {e}"),
            ),
        }
        Ok(())
    }
}

/// Build the backend named by `config`.
pub fn open_repository(
    config: &RepositoryConfig,
    log: Arc<dyn Log>,
) -> Result<Box<dyn Repository>, StoreError> {
    match config.backend {
        Backend::Container => Ok(Box::new(
            ContainerStore::open(&config.path, log)?.with_insert_policy(config.insert_policy),
        )),
        Backend::Null => Ok(Box::new(NullRepository::new(log))),
    }
}
