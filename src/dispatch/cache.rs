//! Bounded history of recent events
//!
//! Records are keyed by sequence, so the oldest entry is always the first key.

use std::collections::BTreeMap;

use crate::error::{Result, SherpaError};
use crate::models::{EventRecord, FinalizationPayload};

/// Keeps the last `capacity` events, evicting the oldest on insert
#[derive(Debug)]
pub struct HistoryCache {
    capacity: usize,
    records: BTreeMap<u64, EventRecord>,
    next_sequence: u64,
}

impl HistoryCache {
    /// Create an empty cache. A zero capacity is rejected.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SherpaError::InvalidConfig(
                "history capacity must be positive".into(),
            ));
        }

        Ok(Self {
            capacity,
            records: BTreeMap::new(),
            next_sequence: 1,
        })
    }

    /// Store a payload under the next sequence number and return the record
    pub fn insert(&mut self, payload: FinalizationPayload) -> EventRecord {
        let record = EventRecord::new(self.next_sequence, payload);
        self.next_sequence += 1;

        self.records.insert(record.sequence(), record.clone());
        while self.records.len() > self.capacity {
            self.records.pop_first();
        }

        record
    }

    /// All held records, oldest first
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
