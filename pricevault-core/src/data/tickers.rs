//! Ticker list: the desired symbol set for a fill run.
//!
//! Plain text, one symbol per line. Lines are trimmed and blank lines are
//! dropped; duplicates collapse because the list is a set. Symbols are kept
//! case-sensitive.

use super::record::Symbol;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerList {
    symbols: BTreeSet<Symbol>,
}

impl TickerList {
    /// Load a ticker list from a file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse line-delimited symbols.
    pub fn parse(content: &str) -> Self {
        content.lines().collect()
    }

    pub fn symbols(&self) -> &BTreeSet<Symbol> {
        &self.symbols
    }

    pub fn into_symbols(self) -> BTreeSet<Symbol> {
        self.symbols
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for TickerList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let symbols = iter
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { symbols }
    }
}
