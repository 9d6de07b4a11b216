//! No-op repository for dry runs.

use super::{Repository, StoreError, UpdateOutcome};
use crate::data::record::{Symbol, TimeSeriesRecord};
use crate::logging::Log;
use std::collections::BTreeMap;
use std::sync::Arc;

const COMPONENT: &str = "null";

/// Accepts everything, stores nothing, and warns on every call.
pub struct NullRepository {
    log: Arc<dyn Log>,
}

impl NullRepository {
    pub fn new(log: Arc<dyn Log>) -> Self {
        log.warn(COMPONENT, "Using null repository; nothing will be persisted");
        Self { log }
    }

    fn notice(&self, action: &str) {
        self.log
            .warn(COMPONENT, &format!("{action} null repository"));
    }
}

impl Repository for NullRepository {
    fn name(&self) -> &str {
        COMPONENT
    }

    fn log(&self) -> &dyn Log {
        self.log.as_ref()
    }

    fn insert_data(&self, _record: &TimeSeriesRecord) -> Result<(), StoreError> {
        self.notice("Inserting data into");
        Ok(())
    }

    fn try_get_by_key(&self, symbol: &str) -> Result<TimeSeriesRecord, StoreError> {
        self.notice("Getting data from");
        Err(StoreError::NotFound {
            symbol: symbol.to_string(),
        })
    }

    fn try_get_all(&self) -> Result<BTreeMap<Symbol, TimeSeriesRecord>, StoreError> {
        self.notice("Getting all data from");
        Ok(BTreeMap::new())
    }

    fn try_get_keys(&self) -> Result<Vec<Symbol>, StoreError> {
        self.notice("Getting keys from");
        Ok(Vec::new())
    }

    fn try_update(
        &self,
        _symbol: &str,
        _record: &TimeSeriesRecord,
    ) -> Result<UpdateOutcome, StoreError> {
        self.notice("Updating data in");
        Ok(UpdateOutcome::Missing)
    }

    // The boundary operations are overridden so each call logs exactly one
    // notice and never a not-found line.

    fn get_by_key(&self, _symbol: &str) -> Option<TimeSeriesRecord> {
        self.notice("Getting data from");
        None
    }

    fn get_all(&self) -> BTreeMap<Symbol, TimeSeriesRecord> {
        self.notice("Getting all data from");
        BTreeMap::new()
    }

    fn get_keys(&self) -> Vec<Symbol> {
        self.notice("Getting keys from");
        Vec::new()
    }

    fn update(&self, _symbol: &str, _record: &TimeSeriesRecord) -> Result<(), StoreError> {
        self.notice("Updating data in");
        Ok(())
    }
}
