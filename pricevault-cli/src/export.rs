//! CSV export of a stored record.

use anyhow::{Context, Result};
use pricevault_core::data::{TimeSeriesRecord, COLUMNS};

/// Render a record as CSV with a `symbol` column followed by the stored columns.
/// Fails on a record whose columns differ in length.
pub fn record_csv(record: &TimeSeriesRecord) -> Result<String> {
    record.check_columns()?;
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["symbol"];
    header.extend(COLUMNS);
    wtr.write_record(&header)?;

    let rows = record
        .date
        .iter()
        .zip(&record.open)
        .zip(&record.close)
        .zip(&record.volume);
    for (((date, open), close), volume) in rows {
        wtr.write_record([
            &record.symbol,
            &date.to_string(),
            &format!("{open:.6}"),
            &format!("{close:.6}"),
            &volume.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricevault_core::data::sample_record;

    #[test]
    fn header_and_rows() {
        let csv = record_csv(&sample_record("SPY", 2, 100.0)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "symbol,date,open,close,volume");
        assert!(lines[1].starts_with("SPY,2020-01-02,"));
        assert!(lines[2].starts_with("SPY,2020-01-03,"));
    }

    #[test]
    fn ragged_record_is_an_error() {
        let mut record = sample_record("SPY", 3, 100.0);
        record.close.pop();

        let err = record_csv(&record).unwrap_err();
        assert!(err.to_string().contains("close"), "{err}");
    }

    #[test]
    fn empty_record_is_header_only() {
        let csv = record_csv(&TimeSeriesRecord::new("SPY")).unwrap();
        assert_eq!(csv.trim_end(), "symbol,date,open,close,volume");
    }
}
