//! Per-peer unread counters for the active identity.

use std::collections::BTreeMap;

use paircast_proto::message::ChatMessage;
use serde::{Deserialize, Serialize};

/// Peer identity → number of messages received from that peer while it was
/// not the focused conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnreadCounters {
    counts: BTreeMap<String, u32>,
}

impl UnreadCounters {
    /// Create an empty set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a freshly inserted message.
    ///
    /// Increments the sender's counter iff the message is addressed to
    /// `active`, was not sent by `active` itself, and its sender is not the
    /// `focused` peer. Returns `true` if a counter changed.
    pub fn on_inserted(&mut self, msg: &ChatMessage, active: &str, focused: Option<&str>) -> bool {
        if msg.to != active || msg.from == active || focused == Some(msg.from.as_str()) {
            return false;
        }
        let count = self.counts.entry(msg.from.clone()).or_insert(0);
        *count = count.saturating_add(1);
        true
    }

    /// Reset the counter for `peer` to zero.
    ///
    /// Returns `false` when the counter was already zero, in which case the
    /// caller has nothing to persist.
    pub fn clear(&mut self, peer: &str) -> bool {
        match self.counts.get_mut(peer) {
            Some(count) if *count > 0 => {
                *count = 0;
                true
            }
            _ => false,
        }
    }

    /// Current unread count for `peer`.
    #[must_use]
    pub fn get(&self, peer: &str) -> u32 {
        self.counts.get(peer).copied().unwrap_or(0)
    }

    /// Sum over all peers.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }

    /// Peers with a non-zero count.
    pub fn pending(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts
            .iter()
            .filter(|&(_, &c)| c > 0)
            .map(|(peer, &c)| (peer.as_str(), c))
    }
}
