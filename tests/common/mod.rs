#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use chronos_seek::{FetchError, Record, RecordFetcher, RecordId, Resolution, Timestamp};

pub fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2017, 9, 6, 17, 0, 0).unwrap()
}

/// `t(i) = base + i minutes`
pub fn t(id: RecordId) -> Timestamp {
    base_time() + Duration::minutes(id)
}

/// Deterministic record service: records at `1..=newest` one minute apart,
/// minus any gaps, with scripted transient failures.
pub struct Timeline {
    newest: RecordId,
    gaps: HashSet<RecordId>,
    failures: Mutex<HashMap<RecordId, u32>>,
    calls: Mutex<HashMap<RecordId, u32>>,
}

impl Timeline {
    pub fn new(newest: RecordId) -> Self {
        Self {
            newest,
            gaps: HashSet::new(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_gap(mut self, ids: impl IntoIterator<Item = RecordId>) -> Self {
        self.gaps.extend(ids);
        self
    }

    pub fn failing(self, id: RecordId, times: u32) -> Self {
        self.failures.lock().unwrap().insert(id, times);
        self
    }

    pub fn record(id: RecordId) -> Record {
        Record::new(id, t(id), format!("instance-{}", id))
    }

    pub fn calls_for(&self, id: RecordId) -> u32 {
        self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_calls_per_id(&self) -> u32 {
        self.calls.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    pub fn probed_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<_> = self.calls.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl RecordFetcher for Timeline {
    async fn fetch(&self, id: RecordId) -> Resolution {
        *self.calls.lock().unwrap().entry(id).or_insert(0) += 1;

        if let Some(left) = self.failures.lock().unwrap().get_mut(&id) {
            if *left > 0 {
                *left -= 1;
                return Resolution::Error(FetchError::Unavailable(format!("id {} flaked", id)));
            }
        }

        if id < 1 || id > self.newest || self.gaps.contains(&id) {
            Resolution::Absent
        } else {
            Resolution::Found(Self::record(id))
        }
    }
}
