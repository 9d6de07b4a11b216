//! Market data: records, providers, and ticker lists.

pub mod circuit_breaker;
pub mod provider;
pub mod record;
pub mod scripted;
pub mod tickers;
pub mod yahoo;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use provider::{DataError, MarketDataProvider};
pub use record::{RecordError, Symbol, TimeSeriesRecord, COLUMNS};
pub use scripted::{sample_record, ScriptedProvider};
pub use tickers::TickerList;
pub use yahoo::YahooProvider;
