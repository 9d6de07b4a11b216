//! Fill/update runs against a real container and a scripted provider.

use pricevault_core::data::{
    sample_record, DataError, MarketDataProvider, ScriptedProvider, TickerList, TimeSeriesRecord,
};
use pricevault_core::logging::{Level, MemoryLog};
use pricevault_core::store::{ContainerStore, InsertPolicy, NullRepository, Repository};
use pricevault_core::sync::{SyncEngine, SyncError};
use std::sync::Arc;

fn store_in(dir: &tempfile::TempDir, log: &Arc<MemoryLog>) -> ContainerStore {
    ContainerStore::open(dir.path().join("prices.pvc"), log.clone()).unwrap()
}

#[test]
fn duplicate_tickers_fill_once_and_refill_fetches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(MemoryLog::new());
    let store = store_in(&dir, &log);
    let provider = ScriptedProvider::new()
        .with_record(sample_record("AAPL", 20, 150.0))
        .with_record(sample_record("MSFT", 20, 300.0));
    let tickers = TickerList::parse("AAPL\nMSFT\nAAPL\n");

    let engine = SyncEngine::new(&store, &provider, log.clone());
    let first = engine.fill(tickers.symbols()).unwrap();

    assert_eq!(first.total, 2);
    assert_eq!(first.succeeded, 2);
    assert_eq!(provider.calls(), vec!["AAPL", "MSFT"]);
    assert_eq!(store.get_keys(), vec!["AAPL", "MSFT"]);

    provider.reset_calls();
    let second = engine.fill(tickers.symbols()).unwrap();

    assert_eq!(second.total, 0);
    assert_eq!(provider.call_count(), 0);
    assert_eq!(store.get_keys(), vec!["AAPL", "MSFT"]);
}

#[test]
fn fill_only_fetches_the_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(MemoryLog::new());
    let store = store_in(&dir, &log);
    store.insert_data(&sample_record("SPY", 5, 400.0)).unwrap();
    let provider = ScriptedProvider::new()
        .with_record(sample_record("SPY", 5, 999.0))
        .with_record(sample_record("QQQ", 5, 350.0));

    SyncEngine::new(&store, &provider, log)
        .fill(TickerList::parse("SPY\nQQQ").symbols())
        .unwrap();

    assert_eq!(provider.calls(), vec!["QQQ"]);
    assert_eq!(store.get_by_key("SPY"), Some(sample_record("SPY", 5, 400.0)));
}

#[test]
fn update_continues_past_a_failing_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(MemoryLog::new());
    let store = store_in(&dir, &log);
    for (symbol, base) in [("AAA", 1.0), ("BBB", 2.0), ("CCC", 3.0)] {
        store.insert_data(&sample_record(symbol, 6, base)).unwrap();
    }
    let provider = ScriptedProvider::new()
        .with_record(sample_record("AAA", 6, 10.0))
        .with_failure("BBB", DataError::RateLimited { retry_after_secs: 60 })
        .with_record(sample_record("CCC", 6, 30.0));

    let summary = SyncEngine::new(&store, &provider, log.clone()).update();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors[0].symbol(), "BBB");
    assert_eq!(provider.calls(), vec!["AAA", "BBB", "CCC"]);

    assert_eq!(store.get_by_key("AAA"), Some(sample_record("AAA", 6, 10.0)));
    assert_eq!(store.get_by_key("BBB"), Some(sample_record("BBB", 6, 2.0)));
    assert_eq!(store.get_by_key("CCC"), Some(sample_record("CCC", 6, 30.0)));
    assert!(log.contains(Level::ERROR, "Update failed for BBB"));
}

/// Inserts MSFT through a second handle on the same file while MSFT is being
/// fetched, so the insert that follows collides.
struct Racing<'a> {
    inner: ScriptedProvider,
    other: &'a ContainerStore,
}

impl MarketDataProvider for Racing<'_> {
    fn name(&self) -> &str {
        "racing"
    }

    fn fetch(&self, symbol: &str) -> Result<TimeSeriesRecord, DataError> {
        if symbol == "MSFT" {
            self.other
                .insert_data(&sample_record("MSFT", 3, 1.0))
                .unwrap();
        }
        self.inner.fetch(symbol)
    }
}

fn racing_provider(other: &ContainerStore) -> Racing<'_> {
    Racing {
        inner: ScriptedProvider::new()
            .with_record(sample_record("AAPL", 3, 2.0))
            .with_record(sample_record("MSFT", 3, 3.0))
            .with_record(sample_record("SPY", 3, 4.0)),
        other,
    }
}

#[test]
fn fill_aborts_on_insert_collision() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(MemoryLog::new());
    let store = store_in(&dir, &log);
    let other = store_in(&dir, &log);
    let provider = racing_provider(&other);

    let err = SyncEngine::new(&store, &provider, log)
        .fill(TickerList::parse("AAPL\nMSFT\nSPY").symbols())
        .unwrap_err();

    assert!(matches!(err, SyncError::Store { ref symbol, .. } if symbol == "MSFT"));
    assert_eq!(store.get_keys(), vec!["AAPL", "MSFT"]);
    assert_eq!(store.get_by_key("MSFT"), Some(sample_record("MSFT", 3, 1.0)));
}

#[test]
fn overwrite_policy_lets_a_colliding_fill_finish() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(MemoryLog::new());
    let store = store_in(&dir, &log).with_insert_policy(InsertPolicy::Overwrite);
    let other = store_in(&dir, &log);
    let provider = racing_provider(&other);

    let summary = SyncEngine::new(&store, &provider, log)
        .fill(TickerList::parse("AAPL\nMSFT\nSPY").symbols())
        .unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(store.get_keys(), vec!["AAPL", "MSFT", "SPY"]);
    assert_eq!(store.get_by_key("MSFT"), Some(sample_record("MSFT", 3, 3.0)));
}

#[test]
fn dry_run_fetches_but_persists_nothing() {
    let log = Arc::new(MemoryLog::new());
    let repo = NullRepository::new(log.clone());
    let provider = ScriptedProvider::new().with_record(sample_record("SPY", 4, 4.0));
    let engine = SyncEngine::new(&repo, &provider, log.clone());

    let tickers = TickerList::parse("SPY");
    engine.fill(tickers.symbols()).unwrap();
    engine.fill(tickers.symbols()).unwrap();

    assert_eq!(provider.call_count(), 2);
    assert!(repo.get_keys().is_empty());
    assert!(log.count(Level::WARN) > 0);
}
