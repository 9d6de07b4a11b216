//! Per-symbol time series record.
//!
//! A record is four parallel columns (`date`, `open`, `close`, `volume`) that
//! are indexed positionally: row `i` of every column belongs together.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instrument key. Case-sensitive, never normalized.
pub type Symbol = String;

/// Names of the four columns, in storage order.
pub const COLUMNS: [&str; 4] = ["date", "open", "close", "volume"];

/// Validation failures for a record, or for a record against a stored shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("record has an empty symbol")]
    EmptySymbol,

    #[error("record for '{symbol}' has no rows")]
    Empty { symbol: Symbol },

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("column '{column}' has {incoming} rows but the stored column has {stored}")]
    ShapeMismatch {
        column: String,
        stored: usize,
        incoming: usize,
    },
}

/// Full price history for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub symbol: Symbol,
    pub date: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<u64>,
}

impl TimeSeriesRecord {
    /// Empty record for `symbol`.
    pub fn new(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            date: Vec::new(),
            open: Vec::new(),
            close: Vec::new(),
            volume: Vec::new(),
        }
    }

    /// Append one row to all four columns.
    pub fn push(&mut self, date: NaiveDate, open: f64, close: f64, volume: u64) {
        self.date.push(date);
        self.open.push(open);
        self.close.push(close);
        self.volume.push(volume);
    }

    /// Number of rows, measured on the `date` column.
    pub fn len(&self) -> usize {
        self.date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
    }

    /// Row lengths of the four columns, in [`COLUMNS`] order.
    pub fn column_lengths(&self) -> [usize; 4] {
        [
            self.date.len(),
            self.open.len(),
            self.close.len(),
            self.volume.len(),
        ]
    }

    /// Check that all four columns have the same length.
    pub fn check_columns(&self) -> Result<(), RecordError> {
        let lengths = self.column_lengths();
        let expected = lengths[0];
        for (&column, actual) in COLUMNS.iter().zip(lengths) {
            if actual != expected {
                return Err(RecordError::LengthMismatch {
                    column,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Full validation for insertion: non-empty symbol, at least one row,
    /// equal-length columns.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.symbol.is_empty() {
            return Err(RecordError::EmptySymbol);
        }
        self.check_columns()?;
        if self.is_empty() {
            return Err(RecordError::Empty {
                symbol: self.symbol.clone(),
            });
        }
        Ok(())
    }

    /// First and last date, if any.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.date.first()?, *self.date.last()?))
    }

    /// Convert to a Polars DataFrame with a `Date` typed date column.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let days: Vec<i32> = self.date.iter().map(|d| days_since_epoch(*d)).collect();
        DataFrame::new(vec![
            Column::new("date".into(), days).cast(&DataType::Date)?,
            Column::new("open".into(), self.open.clone()),
            Column::new("close".into(), self.close.clone()),
            Column::new("volume".into(), self.volume.clone()),
        ])
    }
}

/// Days since 1970-01-01, the on-disk date encoding.
pub fn days_since_epoch(date: NaiveDate) -> i32 {
    // NaiveDate::default() is 1970-01-01
    (date - NaiveDate::default()).num_days() as i32
}

/// Inverse of [`days_since_epoch`]. `None` when out of chrono's range.
pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::default().checked_add_signed(chrono::Duration::days(days as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn push_keeps_columns_aligned() {
        let mut rec = TimeSeriesRecord::new("SPY");
        rec.push(d(2024, 1, 2), 100.0, 101.0, 1000);
        rec.push(d(2024, 1, 3), 101.0, 102.0, 1100);

        assert_eq!(rec.len(), 2);
        assert_eq!(rec.column_lengths(), [2, 2, 2, 2]);
        assert!(rec.validate().is_ok());
        assert_eq!(rec.date_range(), Some((d(2024, 1, 2), d(2024, 1, 3))));
    }

    #[test]
    fn validate_rejects_ragged_columns() {
        let mut rec = TimeSeriesRecord::new("SPY");
        rec.push(d(2024, 1, 2), 100.0, 101.0, 1000);
        rec.volume.push(5);

        assert_eq!(
            rec.validate(),
            Err(RecordError::LengthMismatch {
                column: "volume",
                expected: 1,
                actual: 2,
            })
        );
    }

    #[test]
    fn validate_rejects_empty_symbol_and_empty_record() {
        let mut rec = TimeSeriesRecord::new("");
        rec.push(d(2024, 1, 2), 1.0, 1.0, 1);
        assert_eq!(rec.validate(), Err(RecordError::EmptySymbol));

        let empty = TimeSeriesRecord::new("QQQ");
        assert!(matches!(empty.validate(), Err(RecordError::Empty { .. })));
    }

    #[test]
    fn epoch_day_conversion() {
        assert_eq!(days_since_epoch(d(1970, 1, 1)), 0);
        assert_eq!(days_since_epoch(d(1970, 1, 11)), 10);
        assert_eq!(days_since_epoch(d(1969, 12, 31)), -1);
        assert_eq!(date_from_days(19724), Some(d(2024, 1, 2)));
        assert_eq!(date_from_days(days_since_epoch(d(1999, 6, 30))), Some(d(1999, 6, 30)));
    }

    #[test]
    fn dataframe_has_four_columns() {
        let mut rec = TimeSeriesRecord::new("SPY");
        rec.push(d(2024, 1, 2), 100.0, 101.0, 1000);
        rec.push(d(2024, 1, 3), 101.0, 102.0, 1100);

        let df = rec.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 4);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("volume").unwrap().dtype(), &DataType::UInt64);
    }
}
