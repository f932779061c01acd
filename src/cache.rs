use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::model::{Record, RecordId, Resolution};

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Append-only memo of resolved records.
///
/// Only `Found` resolutions are stored. Once an identifier is present it is
/// never fetched or overwritten again. Concurrent lookups of the same missing
/// identifier are coalesced so that at most one fetch is in flight per id.
#[derive(Default)]
pub struct RecordCache {
    records: RwLock<HashMap<RecordId, Record>>,
    in_flight: Mutex<HashMap<RecordId, Gate>>,
}

impl fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCache")
        .field("records", &self.len())
        .finish()
    }
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(&id).cloned()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `record` unless its id is already cached. Returns whether it was stored.
    pub fn insert(&self, record: Record) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record.id) {
            return false;
        }
        records.insert(record.id, record);
        true
    }

    /// Serves `id` from the cache, or runs `fetch` while holding the id's gate.
    ///
    /// Callers waiting on the same gate re-check the cache once they get in,
    /// so a record fetched by one of them is never fetched again.
    pub async fn get_or_fetch<F, Fut>(&self, id: RecordId, fetch: F) -> Resolution
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Resolution>,
    {
        if let Some(record) = self.get(id) {
            debug!(id, "cache hit");
            return Resolution::Found(record);
        }

        let gate = self.acquire_gate(id);
        let resolution = {
            let _held = gate.lock().await;
            match self.get(id) {
                Some(record) => {
                    debug!(id, "cache hit after waiting on in-flight fetch");
                    Resolution::Found(record)
                }
                None => {
                    let resolution = fetch().await;
                    if let Resolution::Found(record) = &resolution {
                        self.insert(record.clone());
                    }
                    resolution
                }
            }
        };
        self.release_gate(id, gate);
        resolution
    }

    fn acquire_gate(&self, id: RecordId) -> Gate {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(id).or_default().clone()
    }

    fn release_gate(&self, id: RecordId, gate: Gate) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // map + ours: nobody else is waiting
        if Arc::strong_count(&gate) == 2 {
            in_flight.remove(&id);
        }
        drop(gate);
    }

    #[cfg(test)]
    fn gates_outstanding(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
