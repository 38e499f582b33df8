//! Integration tests for state surviving a client restart.
//!
//! Each test writes through a `FileStore` in a temporary directory, drops
//! the session, and reopens a fresh one over the same directory.

use paircast::chat::history::{FileStore, KeyValueStore, MESSAGES_KEY, unread_key};
use paircast::chat::key::derive_key;
use paircast::chat::{ChatSession, SessionOptions};
use paircast_proto::message::ChatMessage;

fn open(dir: &std::path::Path, identity: &str) -> ChatSession<FileStore> {
    let store = FileStore::open(dir).expect("open store");
    ChatSession::open(store, identity, SessionOptions::default())
}

#[test]
fn messages_unread_and_roster_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut bob = open(dir.path(), "Bob");
        bob.ingest(ChatMessage::new("hello", "Alice", "Bob"));
        bob.ingest(ChatMessage::new("again", "Alice", "Bob"));
        bob.add_peer("Charlie");
    }

    let bob = open(dir.path(), "Bob");
    let texts: Vec<_> = bob.conversation("Alice").iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["hello", "again"]);
    assert_eq!(bob.unread().get("Alice"), 2);
    assert!(bob.roster().is_added("Charlie"));
}

#[test]
fn unread_and_roster_are_scoped_per_identity() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut bob = open(dir.path(), "Bob");
        bob.ingest(ChatMessage::new("hi", "Alice", "Bob"));
        bob.add_peer("David");
    }

    let charlie = open(dir.path(), "Charlie");
    assert_eq!(charlie.unread().total(), 0);
    assert!(!charlie.roster().is_added("David"));
    // The message store itself is shared by every identity on this client.
    assert_eq!(charlie.messages().log(&derive_key("Alice", "Bob")).len(), 1);
}

#[test]
fn cleared_unread_stays_cleared() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut bob = open(dir.path(), "Bob");
        bob.ingest(ChatMessage::new("hi", "Alice", "Bob"));
        bob.focus(Some("Alice"));
    }

    let bob = open(dir.path(), "Bob");
    assert_eq!(bob.unread().get("Alice"), 0);
    assert_eq!(bob.focused(), None);
}

#[test]
fn deletions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut alice = open(dir.path(), "Alice");
        alice.ingest(ChatMessage::new("one", "Alice", "Bob"));
        alice.ingest(ChatMessage::new("two", "Bob", "Alice"));
        alice.ingest(ChatMessage::new("keep", "Alice", "Charlie"));
        assert_eq!(alice.delete_message("Bob", 0).unwrap().text, "one");
        assert!(alice.delete_conversation("Charlie"));
    }

    let alice = open(dir.path(), "Alice");
    let bob_log: Vec<_> = alice.conversation("Bob").iter().map(|m| m.text.as_str()).collect();
    assert_eq!(bob_log, ["two"]);
    assert!(alice.conversation("Charlie").is_empty());
}

#[test]
fn malformed_files_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    store.set(MESSAGES_KEY, "{not json").unwrap();
    store.set(&unread_key("Bob"), r#"{"Alice":"many"}"#).unwrap();

    let mut bob = ChatSession::open(store, "Bob", SessionOptions::default());
    assert!(bob.messages().is_empty());
    assert_eq!(bob.unread().total(), 0);

    // The next mutation overwrites the bad file.
    bob.ingest(ChatMessage::new("fresh", "Alice", "Bob"));
    drop(bob);
    let bob = open(dir.path(), "Bob");
    assert_eq!(bob.conversation("Alice").len(), 1);
}

#[test]
fn persisted_layout_is_plain_json() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut alice = open(dir.path(), "Alice");
        alice.ingest(ChatMessage::new("hi", "Alice", "Bob"));
    }

    let store = FileStore::open(dir.path()).unwrap();
    let raw = store.get(MESSAGES_KEY).unwrap().expect("messages persisted");
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["Alice-Bob"][0]["text"], "hi");
    assert_eq!(value["Alice-Bob"][0]["from"], "Alice");
    assert!(value["Alice-Bob"][0]["timestamp"].is_string());
}
