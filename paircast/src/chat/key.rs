//! Canonical conversation identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator placed between the two sorted identities.
pub const KEY_SEPARATOR: char = '-';

/// Order-independent identifier of the conversation between two identities.
///
/// Built by [`derive_key`]; serializes as a plain string so it can be used
/// directly as a JSON object key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Return the string representation of this key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the conversation key for the unordered pair `{a, b}`.
///
/// The identities are sorted lexicographically and joined with
/// [`KEY_SEPARATOR`], so `derive_key(a, b) == derive_key(b, a)`. `a == b`
/// yields a self-conversation key and is not rejected. Identities that
/// contain the separator can map two different pairs to one key.
#[must_use]
pub fn derive_key(a: &str, b: &str) -> ConversationKey {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut key = String::with_capacity(first.len() + second.len() + 1);
    key.push_str(first);
    key.push(KEY_SEPARATOR);
    key.push_str(second);
    ConversationKey(key)
}
