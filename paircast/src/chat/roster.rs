//! Known identities and the per-identity list of added peers.
//!
//! Every identity the client has heard of is *known*: the configured
//! directory plus anyone learned from ingested messages. Of those, the
//! active identity curates an *added* subset; the rest are *available*.
//! Only the added list is persisted, under the active identity's scope.

use std::collections::BTreeSet;

use paircast_proto::message::Identity;

/// Default directory of identities offered to every client.
pub const DEFAULT_DIRECTORY: [&str; 4] = ["Alice", "Bob", "Charlie", "David"];

/// Known and added peers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    known: BTreeSet<Identity>,
    added: BTreeSet<Identity>,
}

impl Roster {
    /// Create a roster seeded with `directory`.
    pub fn new<I, T>(directory: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identity>,
    {
        let known = directory
            .into_iter()
            .map(Into::into)
            .filter(|id: &Identity| !id.is_empty())
            .collect();
        Self {
            known,
            added: BTreeSet::new(),
        }
    }

    /// Record `id` as known. Returns `true` if it was new.
    pub fn learn(&mut self, id: &str) -> bool {
        if id.is_empty() || self.known.contains(id) {
            return false;
        }
        self.known.insert(id.to_owned())
    }

    /// Replace the added set with a persisted list, learning each entry.
    pub fn restore_added(&mut self, added: Vec<Identity>) {
        self.added.clear();
        for peer in added {
            if peer.is_empty() {
                continue;
            }
            self.known.insert(peer.clone());
            self.added.insert(peer);
        }
    }

    /// Move `peer` from available to added on behalf of `active`.
    ///
    /// Unknown peers are learned first. Returns `false` if nothing changed
    /// (already added, empty, or `peer == active`).
    pub fn add(&mut self, peer: &str, active: &str) -> bool {
        if peer.is_empty() || peer == active {
            return false;
        }
        self.learn(peer);
        self.added.insert(peer.to_owned())
    }

    /// Move `peer` from added back to available. Returns `true` if it was
    /// added.
    pub fn remove(&mut self, peer: &str) -> bool {
        self.added.remove(peer)
    }

    /// Whether `peer` is in the added set.
    #[must_use]
    pub fn is_added(&self, peer: &str) -> bool {
        self.added.contains(peer)
    }

    /// Added peers visible to `active`, sorted.
    pub fn added<'a>(&'a self, active: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.added
            .iter()
            .map(String::as_str)
            .filter(move |id| *id != active)
    }

    /// Known peers not yet added, excluding `active`, sorted.
    pub fn available<'a>(&'a self, active: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.known
            .iter()
            .map(String::as_str)
            .filter(move |id| *id != active && !self.added.contains(*id))
    }

    /// Every known peer except `active`, sorted.
    pub fn known<'a>(&'a self, active: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.known
            .iter()
            .map(String::as_str)
            .filter(move |id| *id != active)
    }

    /// Snapshot of the added set for persistence.
    #[must_use]
    pub fn added_list(&self) -> Vec<Identity> {
        self.added.iter().cloned().collect()
    }
}
