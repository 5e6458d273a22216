//! Render-ready view models for the discussion list and the message thread.

use chrono::{Local, NaiveDate, TimeZone};

use crate::models::{ConversationKey, MessageRecord, MessageStatus};
use crate::panel::{Discussion, PanelSnapshot};

pub const PREVIEW_CHARS: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscussionRow {
    pub key: ConversationKey,
    pub name: String,
    pub avatar: String,
    pub phone: Option<String>,
    pub preview: String,
    pub time: String,
    pub badge: Option<String>,
    /// Delivery state of the last message when the user sent it.
    pub own_status: Option<MessageStatus>,
    pub is_favorite: bool,
    pub highlighted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bubble {
    pub id: String,
    pub own: bool,
    pub content: String,
    pub time: String,
    pub status: MessageStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaySection {
    pub label: String,
    pub bubbles: Vec<Bubble>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyState {
    NoConversations,
    LoadFailed,
}

/// What the discussion list shows when it has no rows.
pub fn empty_state(snapshot: &PanelSnapshot) -> Option<EmptyState> {
    if !snapshot.discussions.is_empty() {
        None
    } else if snapshot.load_failed {
        Some(EmptyState::LoadFailed)
    } else {
        Some(EmptyState::NoConversations)
    }
}

pub fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

pub fn unread_badge(count: usize) -> Option<String> {
    match count {
        0 => None,
        1..=9 => Some(count.to_string()),
        _ => Some("9+".to_string()),
    }
}

pub fn discussion_row_in<Tz: TimeZone>(discussion: &Discussion, user_id: &str, tz: &Tz) -> DiscussionRow
where
    Tz::Offset: std::fmt::Display,
{
    let last = &discussion.summary.last_message;
    let own = last.sender_id == user_id;
    DiscussionRow {
        key: discussion.key().clone(),
        name: discussion.name.clone(),
        avatar: discussion.avatar.clone(),
        phone: discussion.phone.clone(),
        preview: preview(&last.content),
        time: last.timestamp.with_timezone(tz).format("%H:%M").to_string(),
        badge: unread_badge(discussion.unread_count()),
        own_status: own.then_some(last.status),
        is_favorite: discussion.is_favorite,
        highlighted: discussion.unread_count() > 0,
    }
}

pub fn discussion_rows(snapshot: &PanelSnapshot, user_id: &str) -> Vec<DiscussionRow> {
    snapshot
        .discussions
        .iter()
        .map(|d| discussion_row_in(d, user_id, &Local))
        .collect()
}

/// "Today", "Yesterday" or `dd/mm/yyyy`.
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(day) {
        "Yesterday".to_string()
    } else {
        day.format("%d/%m/%Y").to_string()
    }
}

/// Splits `records` into consecutive calendar-day sections in `tz`, keeping record order.
pub fn thread_sections_in<Tz: TimeZone>(
    records: &[MessageRecord],
    user_id: &str,
    tz: &Tz,
    today: NaiveDate,
) -> Vec<DaySection>
where
    Tz::Offset: std::fmt::Display,
{
    let mut sections: Vec<(NaiveDate, DaySection)> = Vec::new();
    for record in records {
        let local = record.timestamp.with_timezone(tz);
        let day = local.date_naive();
        let bubble = Bubble {
            id: record.id.clone(),
            own: record.sender_id == user_id,
            content: record.content.clone(),
            time: local.format("%H:%M").to_string(),
            status: record.status,
        };
        match sections.iter_mut().find(|(d, _)| *d == day) {
            Some((_, section)) => section.bubbles.push(bubble),
            None => sections.push((
                day,
                DaySection {
                    label: day_label(day, today),
                    bubbles: vec![bubble],
                },
            )),
        }
    }
    sections.into_iter().map(|(_, section)| section).collect()
}

pub fn thread_sections(records: &[MessageRecord], user_id: &str) -> Vec<DaySection> {
    thread_sections_in(records, user_id, &Local, Local::now().date_naive())
}
