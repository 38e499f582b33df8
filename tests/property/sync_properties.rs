//! Property-based tests for client-side reconciliation.
//!
//! Uses proptest to verify:
//! 1. Conversation keys are symmetric, and distinct on pairs of
//!    separator-free identities.
//! 2. Ingesting the same deliveries in any order yields the same content.
//! 3. Redelivery (with or without a fresh timestamp) never changes state.
//! 4. Unread counts equal the distinct messages from unfocused peers.
//! 5. Session state survives a save/reopen cycle.

use std::collections::BTreeSet;

use chrono::{TimeZone, Utc};
use paircast::chat::history::InMemoryStore;
use paircast::chat::key::derive_key;
use paircast::chat::store::{InsertResult, MessageStore};
use paircast::chat::{ChatSession, SessionOptions};
use paircast_proto::message::ChatMessage;
use proptest::prelude::*;

static PEOPLE: [&str; 4] = ["Alice", "Bob", "Charlie", "David"];

fn arb_person() -> impl Strategy<Value = &'static str> {
    prop::sample::select(PEOPLE.as_slice())
}

/// Messages drawn from a small alphabet so duplicates are common.
fn arb_message() -> impl Strategy<Value = ChatMessage> {
    (
        prop::sample::select(vec!["hi", "ok", "lunch?", "bye"]),
        arb_person(),
        arb_person(),
        0_i64..1_000_000,
    )
        .prop_map(|(text, from, to, millis)| {
            let ts = Utc.timestamp_millis_opt(1_714_000_000_000 + millis).unwrap();
            ChatMessage::with_timestamp(text, from, to, ts)
        })
}

fn arb_deliveries() -> impl Strategy<Value = (Vec<ChatMessage>, Vec<ChatMessage>)> {
    prop::collection::vec(arb_message(), 0..24).prop_flat_map(|msgs| {
        let shuffled = Just(msgs.clone()).prop_shuffle();
        (Just(msgs), shuffled)
    })
}

fn content_set(store: &MessageStore) -> BTreeSet<(String, String, String)> {
    store
        .messages()
        .map(|m| (m.text.clone(), m.from.clone(), m.to.clone()))
        .collect()
}

fn session(identity: &str) -> ChatSession<InMemoryStore> {
    ChatSession::open(InMemoryStore::new(), identity, SessionOptions::default())
}

proptest! {
    #[test]
    fn derive_key_is_symmetric(a in "[A-Za-z]{1,8}", b in "[A-Za-z]{1,8}") {
        prop_assert_eq!(derive_key(&a, &b), derive_key(&b, &a));
    }

    /// Holds only for identities without the `-` separator; see
    /// `separator_in_identity_can_share_a_key` in `chat::key`.
    #[test]
    fn distinct_separator_free_pairs_get_distinct_keys(
        a in "[A-Za-z]{1,8}", b in "[A-Za-z]{1,8}",
        c in "[A-Za-z]{1,8}", d in "[A-Za-z]{1,8}",
    ) {
        let same_pair = (a == c && b == d) || (a == d && b == c);
        prop_assert_eq!(derive_key(&a, &b) == derive_key(&c, &d), same_pair);
    }

    #[test]
    fn arrival_order_does_not_change_content((msgs, shuffled) in arb_deliveries()) {
        let mut first = MessageStore::new();
        let mut second = MessageStore::new();
        for m in msgs {
            first.ingest(m);
        }
        for m in shuffled {
            second.ingest(m);
        }
        prop_assert_eq!(content_set(&first), content_set(&second));
        prop_assert_eq!(first.messages().count(), second.messages().count());
    }

    #[test]
    fn every_log_is_free_of_content_duplicates(msgs in prop::collection::vec(arb_message(), 0..32)) {
        let mut store = MessageStore::new();
        for m in msgs {
            store.ingest(m);
        }
        for key in store.keys() {
            let log = store.log(key);
            for (i, a) in log.iter().enumerate() {
                prop_assert!(log[i + 1..].iter().all(|b| !a.same_content(b)));
                prop_assert_eq!(&derive_key(&a.from, &a.to), key);
            }
        }
    }

    #[test]
    fn redelivery_is_idempotent(
        msgs in prop::collection::vec(arb_message(), 0..16),
        shift in 1_i64..100_000,
    ) {
        let mut s = session("Bob");
        for m in &msgs {
            s.ingest(m.clone());
        }
        let before = s.messages().clone();
        let unread_before = s.unread().clone();

        for m in &msgs {
            let restamped = ChatMessage::with_timestamp(
                m.text.clone(),
                m.from.clone(),
                m.to.clone(),
                m.timestamp + chrono::Duration::milliseconds(shift),
            );
            prop_assert_eq!(s.ingest(restamped), InsertResult::Duplicate);
        }
        prop_assert_eq!(s.messages(), &before);
        prop_assert_eq!(s.unread(), &unread_before);
    }

    #[test]
    fn unread_counts_distinct_messages_from_unfocused_peers(
        msgs in prop::collection::vec(arb_message(), 0..32),
        focused in prop::option::of(arb_person()),
    ) {
        let mut s = session("Bob");
        s.focus(focused);

        let mut expected = std::collections::BTreeMap::<String, u32>::new();
        for m in msgs {
            let counts = m.to == "Bob" && m.from != "Bob" && Some(m.from.as_str()) != focused;
            let from = m.from.clone();
            if s.ingest(m) == InsertResult::Inserted && counts {
                *expected.entry(from).or_default() += 1;
            }
        }

        for peer in PEOPLE {
            prop_assert_eq!(s.unread().get(peer), expected.get(peer).copied().unwrap_or(0));
        }
        if let Some(peer) = focused {
            prop_assert_eq!(s.unread().get(peer), 0);
        }
    }

    #[test]
    fn state_survives_reopen(
        msgs in prop::collection::vec(arb_message(), 0..16),
        added in prop::collection::btree_set(arb_person(), 0..4),
    ) {
        let mut s = session("Bob");
        for m in msgs {
            s.ingest(m);
        }
        for peer in &added {
            s.add_peer(peer);
        }
        let messages = s.messages().clone();
        let unread = s.unread().clone();
        let roster = s.roster().added_list();

        let reopened = ChatSession::open(s.into_store(), "Bob", SessionOptions::default());
        prop_assert_eq!(reopened.messages(), &messages);
        prop_assert_eq!(reopened.unread(), &unread);
        prop_assert_eq!(reopened.roster().added_list(), roster);
    }
}
