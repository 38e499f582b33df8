//! Chat application layer for Paircast.
//!
//! Contains the [`ChatSession`], which owns the reconciled client state
//! (message store, unread counters, roster) for one active identity and
//! persists it through a [`KeyValueStore`] after every mutation.
//!
//! The session is synchronous: network tasks and the presentation loop
//! share it behind a `parking_lot::Mutex` and hold the lock only for the
//! duration of a single call.

pub mod history;
pub mod key;
pub mod roster;
pub mod store;
pub mod unread;
pub mod view;

use chrono::{NaiveDate, TimeZone, Utc};
use paircast_proto::message::{ChatMessage, Identity, ValidationError};

use history::{KeyValueStore, MESSAGES_KEY, Persistence, roster_key, unread_key};
use key::{ConversationKey, derive_key};
use roster::{DEFAULT_DIRECTORY, Roster};
use store::{InsertResult, MessageStore};
use unread::UnreadCounters;
use view::{HistoryEntry, PeerSummary};

/// Errors returned when composing an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    /// The text was empty.
    #[error("nothing to send")]
    EmptyText,

    /// No conversation is focused.
    #[error("no conversation selected")]
    NoPeer,

    /// The message failed validation (too large).
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),
}

/// Behavioural switches for a [`ChatSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Insert outgoing messages locally before the relay echoes them.
    pub optimistic_send: bool,
    /// List only added peers in [`ChatSession::peers`].
    pub curated_roster: bool,
    /// Identities known before any message is seen.
    pub directory: Vec<Identity>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            optimistic_send: false,
            curated_roster: false,
            directory: DEFAULT_DIRECTORY.iter().map(|&s| s.to_owned()).collect(),
        }
    }
}

/// Reconciled chat state for the locally active identity.
pub struct ChatSession<S: KeyValueStore> {
    persistence: Persistence<S>,
    messages: MessageStore,
    identity: Identity,
    focused: Option<Identity>,
    unread: UnreadCounters,
    roster: Roster,
    options: SessionOptions,
}

impl<S: KeyValueStore> ChatSession<S> {
    /// Load persisted state from `store` and activate `identity`.
    ///
    /// Absent or malformed persisted values start empty.
    pub fn open(store: S, identity: impl Into<Identity>, options: SessionOptions) -> Self {
        let persistence = Persistence::new(store);
        let messages: MessageStore = persistence.load(MESSAGES_KEY);

        let mut roster = Roster::new(options.directory.iter().cloned());
        for msg in messages.messages() {
            roster.learn(&msg.from);
            roster.learn(&msg.to);
        }

        let mut session = Self {
            persistence,
            messages,
            identity: String::new(),
            focused: None,
            unread: UnreadCounters::new(),
            roster,
            options,
        };
        session.activate(identity.into());
        tracing::info!(
            identity = %session.identity,
            conversations = session.messages.len(),
            "chat session opened"
        );
        session
    }

    fn activate(&mut self, identity: Identity) {
        self.unread = self.persistence.load(&unread_key(&identity));
        let added: Vec<Identity> = self.persistence.load(&roster_key(&identity));
        self.roster.restore_added(added);
        self.roster.learn(&identity);
        self.focused = None;
        self.identity = identity;
    }

    /// The active identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The focused peer, if any.
    #[must_use]
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Session options in effect.
    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Switch the active identity, reloading its unread counters and roster
    /// and dropping focus. Returns `false` for an empty or unchanged
    /// identity.
    pub fn select_identity(&mut self, identity: &str) -> bool {
        if identity.is_empty() || identity == self.identity {
            return false;
        }
        tracing::info!(from = %self.identity, to = identity, "switching identity");
        self.activate(identity.to_owned());
        true
    }

    /// Focus the conversation with `peer` (or none) and clear its unread
    /// counter.
    pub fn focus(&mut self, peer: Option<&str>) {
        self.focused = peer.filter(|p| !p.is_empty()).map(str::to_owned);
        if let Some(peer) = self.focused.clone() {
            self.roster.learn(&peer);
            if self.unread.clear(&peer) {
                self.save_unread();
            }
        }
    }

    /// Build an outgoing message to the focused peer.
    ///
    /// The caller submits the returned message to the relay. With
    /// `optimistic_send` the message is also ingested immediately; the
    /// relay echo then deduplicates against it.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError`] for empty text, no focused peer, or a
    /// message that fails validation. Nothing is stored in that case.
    pub fn compose(&mut self, text: &str) -> Result<ChatMessage, ComposeError> {
        if text.is_empty() {
            return Err(ComposeError::EmptyText);
        }
        let to = self.focused.clone().ok_or(ComposeError::NoPeer)?;
        let msg = ChatMessage::new(text, self.identity.clone(), to);
        msg.validate()?;

        if self.options.optimistic_send {
            self.ingest(msg.clone());
        }
        Ok(msg)
    }

    /// Merge a validated message into the store.
    ///
    /// On insertion, updates the unread counter and saves the changed
    /// state. Duplicates change nothing.
    pub fn ingest(&mut self, msg: ChatMessage) -> InsertResult {
        self.roster.learn(&msg.from);
        self.roster.learn(&msg.to);

        let result = self.messages.ingest(msg.clone());
        match result {
            InsertResult::Inserted => {
                self.save_messages();
                if self
                    .unread
                    .on_inserted(&msg, &self.identity, self.focused.as_deref())
                {
                    self.save_unread();
                }
            }
            InsertResult::Duplicate => {
                tracing::debug!("duplicate message dropped");
            }
        }
        result
    }

    /// Validate an untrusted relay payload and ingest it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the payload is malformed; the store is
    /// left unchanged.
    pub fn ingest_event(&mut self, payload: &serde_json::Value) -> Result<InsertResult, ValidationError> {
        self.receive_event(payload).map(|inserted| {
            if inserted.is_some() {
                InsertResult::Inserted
            } else {
                InsertResult::Duplicate
            }
        })
    }

    /// Validate and ingest a relay payload, returning the message when it
    /// was new.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the payload is malformed; the store is
    /// left unchanged.
    pub fn receive_event(
        &mut self,
        payload: &serde_json::Value,
    ) -> Result<Option<ChatMessage>, ValidationError> {
        let msg = ChatMessage::from_event(payload, Utc::now()).inspect_err(|err| {
            tracing::warn!(error = %err, "dropping malformed message event");
        })?;
        Ok(match self.ingest(msg.clone()) {
            InsertResult::Inserted => Some(msg),
            InsertResult::Duplicate => None,
        })
    }

    /// Delete the message at `index` in the conversation with `peer`.
    pub fn delete_message(&mut self, peer: &str, index: usize) -> Option<ChatMessage> {
        let key = derive_key(&self.identity, peer);
        self.delete_at(&key, index)
    }

    /// Delete every message in the conversation with `peer`.
    pub fn delete_conversation(&mut self, peer: &str) -> bool {
        let key = derive_key(&self.identity, peer);
        self.delete_all(&key)
    }

    /// Remove one entry from the log at `key`. Out-of-range indices and
    /// unknown keys are ignored.
    pub fn delete_at(&mut self, key: &ConversationKey, index: usize) -> Option<ChatMessage> {
        let removed = self.messages.delete_at(key, index)?;
        self.save_messages();
        Some(removed)
    }

    /// Empty the log at `key`. Unknown keys are ignored.
    pub fn delete_all(&mut self, key: &ConversationKey) -> bool {
        if !self.messages.delete_all(key) {
            return false;
        }
        self.save_messages();
        true
    }

    /// Dismiss the unread notification for `peer`.
    pub fn dismiss(&mut self, peer: &str) -> bool {
        let changed = self.unread.clear(peer);
        if changed {
            self.save_unread();
        }
        changed
    }

    /// Add `peer` to the active identity's roster.
    pub fn add_peer(&mut self, peer: &str) -> bool {
        let changed = self.roster.add(peer, &self.identity);
        if changed {
            self.save_roster();
        }
        changed
    }

    /// Remove `peer` from the active identity's roster.
    pub fn remove_peer(&mut self, peer: &str) -> bool {
        let changed = self.roster.remove(peer);
        if changed {
            self.save_roster();
        }
        changed
    }

    /// Known and added peers.
    #[must_use]
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Unread counters of the active identity.
    #[must_use]
    pub const fn unread(&self) -> &UnreadCounters {
        &self.unread
    }

    /// The full message store.
    #[must_use]
    pub const fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Sidebar rows in sorted order.
    ///
    /// In curated mode only added peers are listed; otherwise every known
    /// peer except the active identity.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerSummary> {
        let names: Vec<&str> = if self.options.curated_roster {
            self.roster.added(&self.identity).collect()
        } else {
            self.roster.known(&self.identity).collect()
        };
        names
            .into_iter()
            .map(|name| PeerSummary {
                name: name.to_owned(),
                unread: self.unread.get(name),
                focused: self.focused.as_deref() == Some(name),
                added: self.roster.is_added(name),
            })
            .collect()
    }

    /// Known peers the active identity has not added yet, sorted.
    #[must_use]
    pub fn available_peers(&self) -> Vec<&str> {
        self.roster.available(&self.identity).collect()
    }

    /// The conversation log with `peer`, in arrival order.
    #[must_use]
    pub fn conversation(&self, peer: &str) -> &[ChatMessage] {
        self.messages.log(&derive_key(&self.identity, peer))
    }

    /// Day-grouped view of the conversation with `peer`.
    pub fn history<Tz: TimeZone>(&self, peer: &str, tz: &Tz, today: NaiveDate) -> Vec<HistoryEntry>
    where
        Tz::Offset: std::fmt::Display,
    {
        view::group_by_day(self.conversation(peer), &self.identity, tz, today)
    }

    /// Retry persistence writes that previously failed. Returns how many
    /// succeeded.
    pub fn flush(&mut self) -> usize {
        self.persistence.flush_pending()
    }

    /// Number of keys whose latest state is not yet persisted.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.persistence.pending_count()
    }

    /// Access the underlying key-value store.
    pub const fn store(&self) -> &S {
        self.persistence.store()
    }

    /// Close the session, handing back the key-value store.
    pub fn into_store(self) -> S {
        self.persistence.into_store()
    }

    fn save_messages(&mut self) {
        self.persistence.save(MESSAGES_KEY, &self.messages);
    }

    fn save_unread(&mut self) {
        self.persistence.save(&unread_key(&self.identity), &self.unread);
    }

    fn save_roster(&mut self) {
        self.persistence
            .save(&roster_key(&self.identity), &self.roster.added_list());
    }
}
