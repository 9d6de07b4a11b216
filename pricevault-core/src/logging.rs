//! Logging seam for store and sync components.
//!
//! Components receive an `Arc<dyn Log>` at construction instead of reaching for
//! a global logger. [`TracingLog`] forwards to `tracing`; [`MemoryLog`] records
//! entries so tests can assert on what was reported.

use std::sync::Mutex;

pub use tracing::Level;

/// Sink for component log lines.
pub trait Log: Send + Sync {
    /// Emit one event at `level` on behalf of `component`.
    fn event(&self, level: Level, component: &str, message: &str);

    fn debug(&self, component: &str, message: &str) {
        self.event(Level::DEBUG, component, message);
    }

    fn info(&self, component: &str, message: &str) {
        self.event(Level::INFO, component, message);
    }

    fn warn(&self, component: &str, message: &str) {
        self.event(Level::WARN, component, message);
    }

    fn error(&self, component: &str, message: &str) {
        self.event(Level::ERROR, component, message);
    }
}

/// Forwards every event to the `tracing` subscriber installed by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl Log for TracingLog {
    fn event(&self, level: Level, component: &str, message: &str) {
        match level {
            Level::ERROR => tracing::error!(component = component, "{message}"),
            Level::WARN => tracing::warn!(component = component, "{message}"),
            Level::INFO => tracing::info!(component = component, "{message}"),
            Level::DEBUG => tracing::debug!(component = component, "{message}"),
            _ => tracing::trace!(component = component, "{message}"),
        }
    }
}

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub component: String,
    pub message: String,
}

/// In-memory sink, used by tests and dry runs that want to inspect output.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry recorded so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Number of entries at exactly `level`.
    pub fn count(&self, level: Level) -> usize {
        self.lock().iter().filter(|e| e.level == level).count()
    }

    /// True if some entry at `level` contains `needle` in its message.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        // A poisoned log is still readable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Log for MemoryLog {
    fn event(&self, level: Level, component: &str, message: &str) {
        self.lock().push(LogEntry {
            level,
            component: component.to_string(),
            message: message.to_string(),
        });
    }
}

/// Parse a configured verbosity.
///
/// Accepts `DEBUG|INFO|WARNING|ERROR|CRITICAL` in any case, plus the numeric
/// aliases `0..=4`. `WARN` is accepted as a spelling of `WARNING`. `CRITICAL`
/// has no tracing counterpart and maps to `ERROR`. Anything else is `INFO`.
pub fn parse_level(raw: &str) -> Level {
    match raw.trim().to_ascii_uppercase().as_str() {
        "DEBUG" | "0" => Level::DEBUG,
        "INFO" | "1" => Level::INFO,
        "WARNING" | "WARN" | "2" => Level::WARN,
        "ERROR" | "3" => Level::ERROR,
        "CRITICAL" | "4" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install a `tracing_subscriber` fmt subscriber capped at `level`.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("Info"), Level::INFO);
        assert_eq!(parse_level("WARNING"), Level::WARN);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("CRITICAL"), Level::ERROR);
    }

    #[test]
    fn numeric_aliases() {
        assert_eq!(parse_level("0"), Level::DEBUG);
        assert_eq!(parse_level("2"), Level::WARN);
        assert_eq!(parse_level("4"), Level::ERROR);
    }

    #[test]
    fn unknown_level_defaults_to_info() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
        assert_eq!(parse_level("5"), Level::INFO);
    }

    #[test]
    fn memory_log_records_entries() {
        let log = MemoryLog::new();
        log.warn("null", "Using null repository");
        log.error("container", "read failed");
        log.info("container", "inserted SPY");

        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.count(Level::WARN), 1);
        assert!(log.contains(Level::ERROR, "read failed"));
        assert!(!log.contains(Level::WARN, "read failed"));

        log.clear();
        assert!(log.entries().is_empty());
    }
}
