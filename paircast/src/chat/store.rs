//! In-memory conversation logs with content-based deduplication.
//!
//! The [`MessageStore`] maps each [`ConversationKey`] to the messages of that
//! conversation in local arrival order. A message whose text, sender and
//! recipient already appear in the target log is treated as a redelivery
//! and dropped; this is what makes the relay echoing a sender's own message
//! (or an optimistic local insert followed by that echo) converge to a
//! single stored copy.

use std::collections::BTreeMap;

use paircast_proto::message::ChatMessage;
use serde::{Deserialize, Serialize};

use super::key::{ConversationKey, derive_key};

/// Outcome of [`MessageStore::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// The message was appended to its conversation log.
    Inserted,
    /// An equal-content message was already present; nothing changed.
    Duplicate,
}

/// Conversation key → ordered message log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageStore {
    logs: BTreeMap<ConversationKey, Vec<ChatMessage>>,
}

impl MessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `msg` into the log for its participant pair unless an entry
    /// with the same text, sender and recipient already exists there.
    pub fn ingest(&mut self, msg: ChatMessage) -> InsertResult {
        let key = derive_key(&msg.from, &msg.to);
        let log = self.logs.entry(key).or_default();

        if log.iter().any(|existing| existing.same_content(&msg)) {
            return InsertResult::Duplicate;
        }

        log.push(msg);
        InsertResult::Inserted
    }

    /// Empty the log at `key`, keeping the key itself.
    ///
    /// Returns `false` if the key is unknown (nothing to do).
    pub fn delete_all(&mut self, key: &ConversationKey) -> bool {
        match self.logs.get_mut(key) {
            Some(log) => {
                log.clear();
                true
            }
            None => false,
        }
    }

    /// Remove the entry at `index` in the log at `key`, shifting later
    /// entries down. Returns the removed message, or `None` if the key is
    /// unknown or the index out of range.
    pub fn delete_at(&mut self, key: &ConversationKey, index: usize) -> Option<ChatMessage> {
        let log = self.logs.get_mut(key)?;
        (index < log.len()).then(|| log.remove(index))
    }

    /// The log for `key`, or an empty slice if the conversation is unknown.
    #[must_use]
    pub fn log(&self, key: &ConversationKey) -> &[ChatMessage] {
        self.logs.get(key).map_or(&[], Vec::as_slice)
    }

    /// All known conversation keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &ConversationKey> {
        self.logs.keys()
    }

    /// Iterate over every stored message across all conversations.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.logs.values().flatten()
    }

    /// Number of conversations (including emptied ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// `true` if no conversation has ever been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
