//! Local "already read" beliefs layered over server-reported status.
//!
//! After a successful mark-read the backend may keep serving the old status
//! for a while. An override masks that staleness for a fixed number of
//! aggregation passes, or until the backend itself reports the record as read.

use std::collections::HashMap;

use log::debug;

use crate::models::{MessageRecord, MessageStatus};

#[derive(Debug, Clone)]
pub struct ReadOverrides {
    cycles: u32,
    // record id -> passes left
    entries: HashMap<String, u32>,
}

impl ReadOverrides {
    /// `cycles` is the number of aggregation passes an override survives without
    /// backend confirmation. Zero disables overrides entirely.
    pub fn new(cycles: u32) -> Self {
        ReadOverrides {
            cycles,
            entries: HashMap::new(),
        }
    }

    /// Records that a mark-read for `id` succeeded.
    pub fn confirm(&mut self, id: &str) {
        if self.cycles == 0 {
            return;
        }
        self.entries.insert(id.to_string(), self.cycles);
    }

    pub fn is_overridden(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Overlays local read state on `records` without counting a pass.
    pub fn apply(&self, records: &[MessageRecord]) -> Vec<MessageRecord> {
        records.iter().map(|record| self.overlay(record)).collect()
    }

    /// Overlays local read state for one aggregation pass, then ages every override.
    ///
    /// Overrides the backend already agrees with are released first.
    pub fn apply_pass(&mut self, records: &[MessageRecord]) -> Vec<MessageRecord> {
        for record in records {
            if record.status == MessageStatus::Read && self.entries.remove(&record.id).is_some() {
                debug!("Backend confirmed read for {}", record.id);
            }
        }

        let merged = self.apply(records);

        self.entries.retain(|id, left| {
            *left -= 1;
            if *left == 0 {
                debug!("Read override for {} expired", id);
            }
            *left > 0
        });
        merged
    }

    fn overlay(&self, record: &MessageRecord) -> MessageRecord {
        let mut record = record.clone();
        if self.entries.contains_key(&record.id) {
            record.status = record.status.advance_to(MessageStatus::Read);
        }
        record
    }
}
