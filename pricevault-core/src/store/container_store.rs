//! Container-backed repository.
//!
//! One top-level group per symbol, holding exactly four datasets:
//! `date` (int32, days since 1970-01-01), `open` (float64), `close` (float64)
//! and `volume` (uint64). Every operation opens the container for its own
//! duration and releases it before returning. Key listing reads only the
//! container directory; single-key reads decode one group.

use super::container::{
    ContainerFile, ContainerHandle, ContainerStats, Dataset, DatasetError, Group, OpenMode,
};
use super::{Repository, StoreError, UpdateOutcome};
use crate::data::record::{
    date_from_days, days_since_epoch, RecordError, Symbol, TimeSeriesRecord, COLUMNS,
};
use crate::logging::Log;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const COMPONENT: &str = "container";

/// What `insert_data` does when the symbol already has a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPolicy {
    /// Fail with `AlreadyExists`; the stored group is left as it was.
    #[default]
    Reject,
    /// Overwrite through the same shape-checked path as `update`.
    Overwrite,
}

/// A group that failed validation, as reported by [`ContainerStore::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptGroup {
    pub symbol: Symbol,
    pub reason: String,
}

/// Durable repository over a single container file.
pub struct ContainerStore {
    file: ContainerFile,
    mode: OpenMode,
    insert_policy: InsertPolicy,
    log: Arc<dyn Log>,
}

impl ContainerStore {
    /// Open the store at `path`, writing an empty container if none exists.
    pub fn open(path: impl Into<PathBuf>, log: Arc<dyn Log>) -> Result<Self, StoreError> {
        let file = ContainerFile::new(path);
        if file.create_if_missing()? {
            log.info(
                COMPONENT,
                &format!("Created empty container at {}", file.path().display()),
            );
        }
        Ok(Self {
            file,
            mode: OpenMode::ReadWrite,
            insert_policy: InsertPolicy::default(),
            log,
        })
    }

    /// Open an existing container for reading only. A missing file is an
    /// error and is never created; writes fail with `ReadOnly`.
    pub fn open_read_only(
        path: impl Into<PathBuf>,
        log: Arc<dyn Log>,
    ) -> Result<Self, StoreError> {
        let file = ContainerFile::new(path);
        file.open(OpenMode::ReadOnly)?;
        Ok(Self {
            file,
            mode: OpenMode::ReadOnly,
            insert_policy: InsertPolicy::default(),
            log,
        })
    }

    pub fn with_insert_policy(mut self, policy: InsertPolicy) -> Self {
        self.insert_policy = policy;
        self
    }

    pub fn insert_policy(&self) -> InsertPolicy {
        self.insert_policy
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn stats(&self) -> Result<ContainerStats, StoreError> {
        Ok(self.file.open(OpenMode::ReadOnly)?.stats())
    }

    /// Drop dead space left by overwrites. Returns the bytes reclaimed.
    pub fn compact(&self) -> Result<u64, StoreError> {
        if self.mode == OpenMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }
        let reclaimed = self.file.compact()?;
        self.log.info(
            COMPONENT,
            &format!("Compacted {}: {reclaimed} bytes reclaimed", self.path().display()),
        );
        Ok(reclaimed)
    }

    /// Validate every group and report the ones that are not well formed.
    ///
    /// Corrupt groups are only reported; nothing is repaired or moved.
    pub fn verify(&self) -> Result<Vec<CorruptGroup>, StoreError> {
        let handle = self.file.open(OpenMode::ReadOnly)?;
        let mut corrupt = Vec::new();
        for symbol in handle.group_names() {
            if let Err(e) = load(&handle, symbol) {
                let reason = match e {
                    StoreError::Corrupt { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.log
                    .warn(COMPONENT, &format!("Group {symbol} is corrupt: {reason}"));
                corrupt.push(CorruptGroup {
                    symbol: symbol.to_string(),
                    reason,
                });
            }
        }
        Ok(corrupt)
    }
}

impl Repository for ContainerStore {
    fn name(&self) -> &str {
        COMPONENT
    }

    fn log(&self) -> &dyn Log {
        self.log.as_ref()
    }

    fn insert_data(&self, record: &TimeSeriesRecord) -> Result<(), StoreError> {
        record.validate()?;
        let symbol = record.symbol.as_str();
        let mut handle = self.file.open(self.mode)?;

        let exists = handle.contains(symbol);
        if exists && self.insert_policy == InsertPolicy::Reject {
            return Err(StoreError::AlreadyExists {
                symbol: symbol.to_string(),
            });
        }
        let overwrite = exists;
        let group = handle.require_group(symbol)?;
        if overwrite {
            overwrite_datasets(symbol, group, record)?;
        } else {
            create_datasets(symbol, group, record)?;
        }
        handle.commit()?;

        if overwrite {
            self.log
                .info(COMPONENT, &format!("Overwrote data for ticker: {symbol}"));
        } else {
            self.log
                .info(COMPONENT, &format!("Inserted data for ticker: {symbol}"));
        }
        Ok(())
    }

    fn try_get_by_key(&self, symbol: &str) -> Result<TimeSeriesRecord, StoreError> {
        let handle = self.file.open(OpenMode::ReadOnly)?;
        load(&handle, symbol)
    }

    fn try_get_all(&self) -> Result<BTreeMap<Symbol, TimeSeriesRecord>, StoreError> {
        let handle = self.file.open(OpenMode::ReadOnly)?;
        handle
            .group_names()
            .map(|symbol| load(&handle, symbol).map(|r| (symbol.to_string(), r)))
            .collect()
    }

    fn try_get_keys(&self) -> Result<Vec<Symbol>, StoreError> {
        let handle = self.file.open(OpenMode::ReadOnly)?;
        Ok(handle.group_names().map(str::to_string).collect())
    }

    fn try_update(
        &self,
        symbol: &str,
        record: &TimeSeriesRecord,
    ) -> Result<UpdateOutcome, StoreError> {
        if record.symbol != symbol {
            self.log.debug(
                COMPONENT,
                &format!(
                    "Updating {symbol} with a record labelled {}",
                    record.symbol
                ),
            );
        }

        let mut handle = self.file.open(self.mode)?;
        match handle.group_mut(symbol)? {
            Some(group) => overwrite_datasets(symbol, group, record)?,
            None => return Ok(UpdateOutcome::Missing),
        }
        handle.commit()?;

        self.log
            .info(COMPONENT, &format!("Updated data for ticker: {symbol}"));
        Ok(UpdateOutcome::Updated)
    }
}

// ── Record <-> group conversion ─────────────────────────────────────

fn record_datasets(record: &TimeSeriesRecord) -> [(&'static str, Dataset); 4] {
    [
        (
            COLUMNS[0],
            Dataset::Int32(record.date.iter().map(|d| days_since_epoch(*d)).collect()),
        ),
        (COLUMNS[1], Dataset::Float64(record.open.clone())),
        (COLUMNS[2], Dataset::Float64(record.close.clone())),
        (COLUMNS[3], Dataset::UInt64(record.volume.clone())),
    ]
}

/// Create all four datasets. Fails on the first one that already exists.
fn create_datasets(
    symbol: &str,
    group: &mut Group,
    record: &TimeSeriesRecord,
) -> Result<(), StoreError> {
    for (name, data) in record_datasets(record) {
        group
            .create_dataset(name, data)
            .map_err(|e| dataset_error(symbol, e))?;
    }
    group.seal()
}

/// Shape-checked overwrite of all four datasets.
fn overwrite_datasets(
    symbol: &str,
    group: &mut Group,
    record: &TimeSeriesRecord,
) -> Result<(), StoreError> {
    let datasets = record_datasets(record);
    // Every column is checked before any is assigned.
    for (name, data) in &datasets {
        group
            .check_assign(name, data)
            .map_err(|e| dataset_error(symbol, e))?;
    }
    for (name, data) in datasets {
        group
            .assign(name, data)
            .map_err(|e| dataset_error(symbol, e))?;
    }
    group.seal()
}

fn dataset_error(symbol: &str, err: DatasetError) -> StoreError {
    match err {
        DatasetError::Exists { .. } => StoreError::AlreadyExists {
            symbol: symbol.to_string(),
        },
        DatasetError::Length {
            name,
            stored,
            incoming,
        } => RecordError::ShapeMismatch {
            column: name,
            stored,
            incoming,
        }
        .into(),
        other => StoreError::Corrupt {
            symbol: symbol.to_string(),
            reason: other.to_string(),
        },
    }
}

fn column<'g, T>(
    group: &'g Group,
    name: &str,
    expected: &'static str,
    pick: impl Fn(&'g Dataset) -> Option<&'g Vec<T>>,
) -> Result<&'g Vec<T>, String> {
    let data = group
        .dataset(name)
        .ok_or_else(|| format!("dataset '{name}' is missing"))?;
    pick(data).ok_or_else(|| {
        format!(
            "dataset '{name}' has dtype {}, expected {expected}",
            data.dtype()
        )
    })
}

/// Decode and assemble the record stored under `symbol`.
fn load(handle: &ContainerHandle, symbol: &str) -> Result<TimeSeriesRecord, StoreError> {
    let group = handle
        .read_group(symbol)?
        .ok_or_else(|| StoreError::NotFound {
            symbol: symbol.to_string(),
        })?;
    record_from_group(symbol, &group)
}

/// Assemble a record from a group, rejecting anything that is not a
/// well-formed four-dataset group.
fn record_from_group(symbol: &str, group: &Group) -> Result<TimeSeriesRecord, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        symbol: symbol.to_string(),
        reason,
    };

    if !group.checksum_matches()? {
        return Err(corrupt("checksum mismatch".into()));
    }
    if group.dataset_count() != COLUMNS.len() {
        let names: Vec<&str> = group.dataset_names().collect();
        return Err(corrupt(format!(
            "expected datasets {COLUMNS:?}, found {names:?}"
        )));
    }

    let days = column(group, "date", "int32", |d| match d {
        Dataset::Int32(v) => Some(v),
        _ => None,
    })
    .map_err(corrupt)?;
    let open = column(group, "open", "float64", |d| match d {
        Dataset::Float64(v) => Some(v),
        _ => None,
    })
    .map_err(corrupt)?;
    let close = column(group, "close", "float64", |d| match d {
        Dataset::Float64(v) => Some(v),
        _ => None,
    })
    .map_err(corrupt)?;
    let volume = column(group, "volume", "uint64", |d| match d {
        Dataset::UInt64(v) => Some(v),
        _ => None,
    })
    .map_err(corrupt)?;

    let lengths = [days.len(), open.len(), close.len(), volume.len()];
    if lengths.iter().any(|&n| n != lengths[0]) {
        return Err(corrupt(format!("mismatched dataset lengths {lengths:?}")));
    }

    let date = days
        .iter()
        .map(|&d| date_from_days(d).ok_or_else(|| corrupt(format!("date {d} out of range"))))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TimeSeriesRecord {
        symbol: symbol.to_string(),
        date,
        open: open.clone(),
        close: close.clone(),
        volume: volume.clone(),
    })
}
