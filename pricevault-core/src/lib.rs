//! PriceVault core: a keyed store of per-symbol daily price series and the
//! sync engine that fills and refreshes it from a market data provider.
//!
//! - `store` holds the [`store::Repository`] contract, the file-backed
//!   container store, and the null repository
//! - `sync` reconciles a desired ticker list against what is persisted
//! - `data` has the record type, providers, and ticker lists
//! - `config` and `logging` are the ambient layers the CLI wires together

pub mod config;
pub mod data;
pub mod logging;
pub mod store;
pub mod sync;
