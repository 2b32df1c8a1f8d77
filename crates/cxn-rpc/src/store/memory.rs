use std::collections::HashMap;

use parking_lot::Mutex;

use super::{CxnStore, StoreError};
use crate::types::ConnectionRecord;

/// In-memory [`CxnStore`]. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryCxnStore {
    /// cxnId → record
    records: Mutex<HashMap<String, ConnectionRecord>>,
}

impl MemoryCxnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl CxnStore for MemoryCxnStore {
    fn add(&self, cxn: &ConnectionRecord) -> Result<(), StoreError> {
        self.records.lock().insert(cxn.cxn_id.clone(), cxn.clone());
        Ok(())
    }

    fn remove(&self, cxn_id: &str) -> Result<(), StoreError> {
        self.records.lock().remove(cxn_id);
        Ok(())
    }

    fn get_by_cxn_id(&self, cxn_id: &str) -> Result<Option<ConnectionRecord>, StoreError> {
        Ok(self.records.lock().get(cxn_id).cloned())
    }

    fn get_by_app_id(&self, app_id: &str) -> Result<Option<ConnectionRecord>, StoreError> {
        let records = self.records.lock();
        // Lowest cxnId wins so repeated lookups agree when several match.
        Ok(records
            .values()
            .filter(|r| r.app_id == app_id)
            .min_by(|a, b| a.cxn_id.cmp(&b.cxn_id))
            .cloned())
    }

    fn get_all(&self) -> Result<Vec<ConnectionRecord>, StoreError> {
        let mut all: Vec<_> = self.records.lock().values().cloned().collect();
        all.sort_by(|a, b| a.cxn_id.cmp(&b.cxn_id));
        Ok(all)
    }
}
