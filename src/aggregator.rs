//! Folds a flat bag of message records into per-conversation summaries.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::error::{PanelError, Result};
use crate::models::{ConversationKey, MessageRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSummary {
    pub key: ConversationKey,
    /// Most recent record; on equal timestamps the one seen first in the input.
    pub last_message: MessageRecord,
    pub unread_count: usize,
    /// Records in input order, not timestamp order.
    pub member_messages: Vec<MessageRecord>,
}

impl ConversationSummary {
    fn new(key: ConversationKey, first: &MessageRecord) -> Self {
        ConversationSummary {
            key,
            last_message: first.clone(),
            unread_count: 0,
            member_messages: Vec::new(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.key.is_group()
    }
}

/// Builds the conversation list for `user_id` out of `records`.
///
/// Records repeated across overlapping queries are kept once (first occurrence
/// wins). Records carrying both or neither of `receiverId` / `groupId` are
/// dropped and logged; they never abort the pass. The result is ordered most
/// recent conversation first, ties broken by conversation id.
///
/// The function is pure: the same input in the same order always yields the
/// same output.
pub fn aggregate(user_id: &str, records: &[MessageRecord]) -> Result<Vec<ConversationSummary>> {
    if user_id.is_empty() {
        return Err(PanelError::NotAuthenticated);
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
    let mut positions: HashMap<ConversationKey, usize> = HashMap::new();
    let mut summaries: Vec<ConversationSummary> = Vec::new();
    let mut dropped = 0usize;

    for record in records {
        if !seen.insert(record.id.as_str()) {
            continue;
        }

        let key = match record.conversation_key(user_id) {
            Ok(key) => key,
            Err(e) => {
                warn!("Dropping record during aggregation: {}", e);
                dropped += 1;
                continue;
            }
        };

        let position = *positions.entry(key.clone()).or_insert_with(|| {
            summaries.push(ConversationSummary::new(key, record));
            summaries.len() - 1
        });
        let summary = &mut summaries[position];

        if record.is_unread_for(user_id) {
            summary.unread_count += 1;
        }
        if record.timestamp > summary.last_message.timestamp {
            summary.last_message = record.clone();
        }
        summary.member_messages.push(record.clone());
    }

    summaries.sort_by(compare_recent_first);
    debug!(
        "Aggregated {} records into {} conversations ({} dropped)",
        records.len(),
        summaries.len(),
        dropped
    );
    Ok(summaries)
}

fn compare_recent_first(a: &ConversationSummary, b: &ConversationSummary) -> Ordering {
    b.last_message
        .timestamp
        .cmp(&a.last_message.timestamp)
        .then_with(|| a.key.id().cmp(b.key.id()))
        .then_with(|| a.is_group().cmp(&b.is_group()))
}
