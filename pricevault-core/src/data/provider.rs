//! Market data provider trait and structured error types.
//!
//! The MarketDataProvider trait abstracts over price sources (Yahoo Finance,
//! scripted fixtures) so the sync engine can be driven without a network.

use super::record::TimeSeriesRecord;
use thiserror::Error;

/// Structured error types for provider fetches.
///
/// These are displayable as-is in CLI output and log lines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("data error: {0}")]
    Other(String),
}

/// Source of full price history.
///
/// Calls are blocking. The sync engine adds no timeout or retry of its own;
/// implementations decide how hard to try.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the full available daily history for `symbol`.
    fn fetch(&self, symbol: &str) -> Result<TimeSeriesRecord, DataError>;
}
