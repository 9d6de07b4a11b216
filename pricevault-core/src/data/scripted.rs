//! Offline provider and deterministic sample records.
//!
//! `ScriptedProvider` serves canned history per symbol and records every
//! fetch, which lets sync workflows run without a network.

use super::provider::{DataError, MarketDataProvider};
use super::record::{Symbol, TimeSeriesRecord};
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::sync::Mutex;

/// Deterministic daily history for `symbol`: `rows` weekdays starting
/// 2020-01-02, prices offset by `base`.
pub fn sample_record(symbol: &str, rows: usize, base: f64) -> TimeSeriesRecord {
    let mut record = TimeSeriesRecord::new(symbol);
    let mut date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or_default();
    while record.len() < rows {
        if date.weekday().number_from_monday() <= 5 {
            let i = record.len() as f64;
            let open = base + i * 0.5;
            record.push(date, open, open + 0.25, 1_000 + record.len() as u64 * 10);
        }
        date = date.succ_opt().unwrap_or(date);
    }
    record
}

/// Provider backed by an in-memory table of records.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    records: HashMap<Symbol, TimeSeriesRecord>,
    failures: HashMap<Symbol, DataError>,
    calls: Mutex<Vec<Symbol>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `record` for its symbol.
    pub fn with_record(mut self, record: TimeSeriesRecord) -> Self {
        self.records.insert(record.symbol.clone(), record);
        self
    }

    /// Fail every fetch of `symbol` with `error`.
    pub fn with_failure(mut self, symbol: &str, error: DataError) -> Self {
        self.failures.insert(symbol.to_string(), error);
        self
    }

    /// Symbols fetched so far, in call order.
    pub fn calls(&self) -> Vec<Symbol> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl MarketDataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self, symbol: &str) -> Result<TimeSeriesRecord, DataError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(symbol.to_string());

        if let Some(err) = self.failures.get(symbol) {
            return Err(err.clone());
        }
        self.records
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }
}
