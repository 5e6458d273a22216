//! The messaging panel controller.
//!
//! [`Panel`] owns every piece of mutable view state: the conversation list,
//! the selected conversation and its thread, the read-override overlay and the
//! active list filter. Pollers and the front end share one `Arc<Panel>`; the
//! state lock is never held across a network call.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join_all;
use log::{debug, info, warn};

use crate::aggregator::{aggregate, ConversationSummary};
use crate::directory::Directory;
use crate::error::{PanelError, Result};
use crate::models::{ConversationKey, MessageRecord, NewMessage, User};
use crate::read_overrides::ReadOverrides;
use crate::service::MessageService;
use crate::storage::SessionStore;

/// A conversation summary with the display details the list needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discussion {
    pub summary: ConversationSummary,
    pub name: String,
    pub avatar: String,
    pub phone: Option<String>,
    pub is_favorite: bool,
}

impl Discussion {
    pub fn key(&self) -> &ConversationKey {
        &self.summary.key
    }

    pub fn unread_count(&self) -> usize {
        self.summary.unread_count
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiscussionFilter {
    #[default]
    All,
    Unread,
    Favorites,
    Groups,
}

impl DiscussionFilter {
    pub fn matches(&self, discussion: &Discussion) -> bool {
        match self {
            DiscussionFilter::All => true,
            DiscussionFilter::Unread => discussion.unread_count() > 0,
            DiscussionFilter::Favorites => discussion.is_favorite,
            DiscussionFilter::Groups => discussion.summary.is_group(),
        }
    }
}

impl FromStr for DiscussionFilter {
    type Err = PanelError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "all" => Ok(DiscussionFilter::All),
            "unread" => Ok(DiscussionFilter::Unread),
            "favorites" | "favourites" => Ok(DiscussionFilter::Favorites),
            "groups" => Ok(DiscussionFilter::Groups),
            other => Err(PanelError::Config(format!("unknown filter '{}'", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveConversation {
    pub key: ConversationKey,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Completed { conversations: usize },
    /// Another pass was still running.
    Skipped,
    /// The backend could not be reached; the previous list is kept.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadOutcome {
    Loaded { messages: usize },
    NoConversation,
    /// The selection changed while the request was in flight.
    Discarded,
    Failed,
}

/// Copy of the view state for rendering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PanelSnapshot {
    /// Discussions passing the active filter.
    pub discussions: Vec<Discussion>,
    pub load_failed: bool,
    pub filter: DiscussionFilter,
    pub active: Option<ActiveConversation>,
    /// Thread of the active conversation with local read state applied.
    pub thread: Vec<MessageRecord>,
    pub thread_failed: bool,
}

struct PanelState {
    discussions: Vec<Discussion>,
    load_failed: bool,
    filter: DiscussionFilter,
    active: Option<ActiveConversation>,
    thread: Vec<MessageRecord>,
    thread_failed: bool,
    // Monotonic ids for thread loads; an older load never overwrites a newer one.
    thread_issued: u64,
    thread_applied: u64,
    // Bumped by `reset`; work started under an older generation is dropped.
    generation: u64,
    overrides: ReadOverrides,
}

impl PanelState {
    fn is_current(&self, key: &ConversationKey, load: u64, generation: u64) -> bool {
        self.generation == generation
            && self.active.as_ref().map(|a| &a.key) == Some(key)
            && load > self.thread_applied
    }

    fn unread_count(&self, records: &[MessageRecord], user_id: &str) -> usize {
        self.overrides
            .apply(records)
            .iter()
            .filter(|m| m.is_unread_for(user_id))
            .count()
    }

    fn recount_unread(&mut self, key: &ConversationKey, user_id: &str) {
        if let Some(i) = self.discussions.iter().position(|d| &d.summary.key == key) {
            let count = self.unread_count(&self.discussions[i].summary.member_messages, user_id);
            self.discussions[i].summary.unread_count = count;
        }
    }
}

/// At-most-one token for a kind of pass.
struct InFlight(AtomicBool);

struct InFlightGuard<'a>(&'a AtomicBool);

impl InFlight {
    fn new() -> Self {
        InFlight(AtomicBool::new(false))
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Panel {
    service: Arc<dyn MessageService>,
    directory: Arc<dyn Directory>,
    session: Arc<dyn SessionStore>,
    state: Mutex<PanelState>,
    conversation_pass: InFlight,
}

impl Panel {
    pub fn new(
        service: Arc<dyn MessageService>,
        directory: Arc<dyn Directory>,
        session: Arc<dyn SessionStore>,
        read_override_cycles: u32,
    ) -> Self {
        Panel {
            service,
            directory,
            session,
            state: Mutex::new(PanelState {
                discussions: Vec::new(),
                load_failed: false,
                filter: DiscussionFilter::All,
                active: None,
                thread: Vec::new(),
                thread_failed: false,
                thread_issued: 0,
                thread_applied: 0,
                generation: 0,
                overrides: ReadOverrides::new(read_override_cycles),
            }),
            conversation_pass: InFlight::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current_user(&self) -> Result<User> {
        self.session
            .current_user()?
            .ok_or(PanelError::NotAuthenticated)
    }

    /// One aggregation pass over everything the backend has for the user.
    ///
    /// Returns `Skipped` when a pass is already running. Transport failures are
    /// absorbed: the previous list stays, `load_failed` is raised and the next
    /// poll is the retry. A pass overtaken by [`Panel::reset`] publishes nothing
    /// and runs again for whoever is logged in now.
    pub async fn refresh_conversations(&self) -> Result<PassOutcome> {
        let Some(_pass) = self.conversation_pass.try_begin() else {
            debug!("Conversation pass already in flight, skipping");
            return Ok(PassOutcome::Skipped);
        };
        loop {
            match self.run_pass().await? {
                Some(outcome) => return Ok(outcome),
                None => debug!("Panel was reset during the pass, starting over"),
            }
        }
    }

    async fn run_pass(&self) -> Result<Option<PassOutcome>> {
        let generation = self.state().generation;
        let user = self.current_user()?;

        let records = match self.service.user_records(&user).await {
            Ok(records) => records,
            Err(e) if e.is_transport() => {
                warn!("Failed to load conversations for {}: {}", user.id, e);
                let mut state = self.state();
                if state.generation != generation {
                    return Ok(None);
                }
                state.load_failed = true;
                return Ok(Some(PassOutcome::Failed));
            }
            Err(e) => return Err(e),
        };

        let summaries = {
            let mut state = self.state();
            if state.generation != generation {
                return Ok(None);
            }
            let merged = state.overrides.apply_pass(&records);
            aggregate(&user.id, &merged)?
        };

        let favorites = self.session.favorites().unwrap_or_else(|e| {
            warn!("Could not read favorites: {}", e);
            HashSet::new()
        });
        let mut discussions = self.enrich(summaries, &favorites).await;
        let count = discussions.len();

        // Reads confirmed while the directory lookups ran must not be undone.
        let retry = {
            let mut state = self.state();
            if state.generation != generation {
                return Ok(None);
            }
            for discussion in &mut discussions {
                discussion.summary.unread_count =
                    state.unread_count(&discussion.summary.member_messages, &user.id);
            }
            state.discussions = discussions;
            state.load_failed = false;
            let active = state.active.as_ref().map(|a| a.key.clone());
            let retry = active.and_then(|key| {
                let discussion = state.discussions.iter().find(|d| d.key() == &key)?;
                let ids = unread_ids(&state.overrides.apply(&discussion.summary.member_messages), &user.id);
                Some((key, ids))
            });
            retry
        };
        info!("Loaded {} conversations for {}", count, user.id);

        if let Some((key, ids)) = retry {
            if !ids.is_empty() {
                self.mark_read_all(&key, &user.id, ids, generation).await;
            }
        }
        Ok(Some(PassOutcome::Completed {
            conversations: count,
        }))
    }

    /// Makes `key` the active conversation and loads its thread.
    pub async fn select_conversation(&self, key: ConversationKey, name: Option<String>) -> Result<ThreadOutcome> {
        {
            let mut state = self.state();
            let name = name
                .or_else(|| {
                    state
                        .discussions
                        .iter()
                        .find(|d| d.key() == &key)
                        .map(|d| d.name.clone())
                })
                .unwrap_or_else(|| key.id().to_string());
            info!("Selected conversation {}", key.id());
            state.active = Some(ActiveConversation { key, name });
            state.thread.clear();
            state.thread_failed = false;
        }
        self.load_messages().await
    }

    /// Drops all view state, e.g. after the user changed.
    pub fn reset(&self) {
        let mut state = self.state();
        state.discussions.clear();
        state.load_failed = false;
        state.active = None;
        state.thread.clear();
        state.thread_failed = false;
        state.overrides.clear();
        state.generation += 1;
    }

    pub fn clear_conversation(&self) {
        let mut state = self.state();
        state.active = None;
        state.thread.clear();
        state.thread_failed = false;
    }

    /// Reloads the active conversation's thread and marks inbound messages read.
    ///
    /// The result is dropped if the selection changed before it arrived.
    /// Mark-read calls run after the thread is published; each failure is
    /// only logged and retried by a later poll.
    pub async fn load_messages(&self) -> Result<ThreadOutcome> {
        let user = self.current_user()?;
        let (active, load, generation) = {
            let mut state = self.state();
            let Some(active) = state.active.clone() else {
                return Ok(ThreadOutcome::NoConversation);
            };
            state.thread_issued += 1;
            (active, state.thread_issued, state.generation)
        };

        let fetched = match &active.key {
            ConversationKey::Direct(peer) => self.service.messages_between(&user.id, peer).await,
            ConversationKey::Group(group) => self.service.group_messages(group).await,
        };

        let records = match fetched {
            Ok(records) => records,
            Err(e) if e.is_transport() => {
                warn!("Failed to load messages for {}: {}", active.key.id(), e);
                let mut state = self.state();
                if !state.is_current(&active.key, load, generation) {
                    return Ok(ThreadOutcome::Discarded);
                }
                state.thread_applied = load;
                state.thread.clear();
                state.thread_failed = true;
                return Ok(ThreadOutcome::Failed);
            }
            Err(e) => return Err(e),
        };

        let (count, unread) = {
            let mut state = self.state();
            if !state.is_current(&active.key, load, generation) {
                debug!("Discarding stale messages for {}", active.key.id());
                return Ok(ThreadOutcome::Discarded);
            }
            state.thread_applied = load;
            state.thread = records;
            state.thread_failed = false;
            let unread = unread_ids(&state.overrides.apply(&state.thread), &user.id);
            (state.thread.len(), unread)
        };

        if !unread.is_empty() {
            self.mark_read_all(&active.key, &user.id, unread, generation).await;
        }
        Ok(ThreadOutcome::Loaded { messages: count })
    }

    /// Sends `content` to the active conversation.
    ///
    /// The stored record is not inserted locally; it shows up through the
    /// thread reload and the next aggregation pass, which deduplicate by id.
    pub async fn send_message(&self, content: &str) -> Result<MessageRecord> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PanelError::EmptyMessage);
        }
        let user = self.current_user()?;
        let active = self
            .state()
            .active
            .clone()
            .ok_or(PanelError::NoActiveConversation)?;

        let message = NewMessage {
            content: content.to_string(),
            recipient: active.key.recipient(),
        };
        let stored = self.service.send_message(&user.id, message).await?;

        if let Err(e) = self.load_messages().await {
            warn!("Reload after send failed: {}", e);
        }
        match self.refresh_conversations().await {
            Ok(PassOutcome::Skipped) => debug!("Sent message {} will appear in the running pass or the next one", stored.id),
            Ok(_) => {}
            Err(e) => warn!("Refresh after send failed: {}", e),
        }
        Ok(stored)
    }

    pub fn set_filter(&self, filter: DiscussionFilter) {
        self.state().filter = filter;
    }

    /// Flips the favorite flag of `key`, returning the new value.
    pub fn toggle_favorite(&self, key: &ConversationKey) -> Result<bool> {
        let favorite = !self.session.favorites()?.contains(key);
        self.session.set_favorite(key, favorite)?;
        let mut state = self.state();
        if let Some(discussion) = state.discussions.iter_mut().find(|d| d.key() == key) {
            discussion.is_favorite = favorite;
        }
        Ok(favorite)
    }

    /// Finds a known conversation by its peer or group id.
    pub fn find_conversation(&self, id: &str) -> Option<ConversationKey> {
        self.state()
            .discussions
            .iter()
            .find(|d| d.key().id() == id)
            .map(|d| d.key().clone())
    }

    pub fn visible_discussions(&self) -> Vec<Discussion> {
        let state = self.state();
        state
            .discussions
            .iter()
            .filter(|d| state.filter.matches(d))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let state = self.state();
        PanelSnapshot {
            discussions: state
                .discussions
                .iter()
                .filter(|d| state.filter.matches(d))
                .cloned()
                .collect(),
            load_failed: state.load_failed,
            filter: state.filter,
            active: state.active.clone(),
            thread: state.overrides.apply(&state.thread),
            thread_failed: state.thread_failed,
        }
    }

    async fn mark_read_all(&self, key: &ConversationKey, user_id: &str, ids: Vec<String>, generation: u64) {
        let results = join_all(ids.iter().map(|id| self.service.mark_read(id))).await;
        let mut state = self.state();
        if state.generation != generation {
            debug!("Dropping mark-read results for {} after reset", key.id());
            return;
        }
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(()) => state.overrides.confirm(id),
                Err(e) => warn!("Mark-read for {} failed, will retry on next poll: {}", id, e),
            }
        }
        state.recount_unread(key, user_id);
    }

    async fn enrich(&self, summaries: Vec<ConversationSummary>, favorites: &HashSet<ConversationKey>) -> Vec<Discussion> {
        let lookups = summaries.into_iter().map(|summary| async move {
            let (name, avatar, phone) = match &summary.key {
                ConversationKey::Group(id) => match self.directory.group(id).await {
                    Ok(Some(group)) => (group.name, "G".to_string(), None),
                    Ok(None) => ("Unknown group".to_string(), "G".to_string(), None),
                    Err(e) => {
                        warn!("Group lookup for {} failed: {}", id, e);
                        ("Unknown".to_string(), "U".to_string(), None)
                    }
                },
                ConversationKey::Direct(id) => match self.directory.contact(id).await {
                    Ok(Some(contact)) => {
                        let avatar: String = contact
                            .first_name
                            .chars()
                            .take(1)
                            .chain(contact.last_name.chars().take(1))
                            .collect();
                        (
                            format!("{} {}", contact.first_name, contact.last_name),
                            avatar.to_uppercase(),
                            contact.phone,
                        )
                    }
                    Ok(None) => ("Unknown contact".to_string(), "C".to_string(), None),
                    Err(e) => {
                        warn!("Contact lookup for {} failed: {}", id, e);
                        ("Unknown".to_string(), "U".to_string(), None)
                    }
                },
            };
            let is_favorite = favorites.contains(&summary.key);
            Discussion {
                summary,
                name,
                avatar,
                phone,
                is_favorite,
            }
        });
        join_all(lookups).await
    }
}

fn unread_ids(records: &[MessageRecord], user_id: &str) -> Vec<String> {
    records
        .iter()
        .filter(|m| m.is_unread_for(user_id))
        .map(|m| m.id.clone())
        .collect()
}
