//! End-to-end reconciliation scenarios over the in-process loopback hub.
//!
//! Each client owns a `ChatSession` and a hub endpoint. Deliveries are
//! pumped from the endpoint into the session by hand, which keeps the
//! arrival order under the test's control.

use std::time::Duration;

use paircast::chat::history::InMemoryStore;
use paircast::chat::key::derive_key;
use paircast::chat::store::InsertResult;
use paircast::chat::{ChatSession, SessionOptions};
use paircast::transport::loopback::{LoopbackHub, LoopbackTransport};
use paircast::transport::Transport;
use paircast_proto::message::ValidationError;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Client {
    session: ChatSession<InMemoryStore>,
    endpoint: LoopbackTransport,
}

impl Client {
    fn join(hub: &LoopbackHub, identity: &str) -> Self {
        Self {
            session: ChatSession::open(InMemoryStore::new(), identity, SessionOptions::default()),
            endpoint: hub.connect(),
        }
    }

    /// Compose on the session and submit through the endpoint.
    async fn send(&mut self, text: &str) {
        let msg = self.session.compose(text).unwrap();
        self.endpoint.submit(&msg).await.unwrap();
    }

    /// Ingest the next delivery.
    async fn pump(&mut self) -> Result<InsertResult, ValidationError> {
        let payload = tokio::time::timeout(Duration::from_secs(2), self.endpoint.recv())
            .await
            .expect("delivery timed out")
            .unwrap();
        self.session.ingest_event(&payload)
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn message_reaches_both_participants_once() {
    let hub = LoopbackHub::new();
    let mut alice = Client::join(&hub, "Alice");
    let mut bob = Client::join(&hub, "Bob");

    alice.session.focus(Some("Bob"));
    alice.send("hi").await;

    assert_eq!(alice.pump().await, Ok(InsertResult::Inserted));
    assert_eq!(bob.pump().await, Ok(InsertResult::Inserted));

    let key = derive_key("Alice", "Bob");
    assert_eq!(key.as_str(), "Alice-Bob");
    for client in [&alice, &bob] {
        let log = client.session.messages().log(&key);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "hi");
    }
}

#[tokio::test]
async fn redelivered_event_is_stored_once() {
    let hub = LoopbackHub::new();
    let mut bob = Client::join(&hub, "Bob");

    let event = json!({"text": "hi", "from": "Alice", "to": "Bob", "timestamp": 1_714_557_600_000_i64});
    hub.inject(&event);
    hub.inject(&event);

    assert_eq!(bob.pump().await, Ok(InsertResult::Inserted));
    assert_eq!(bob.pump().await, Ok(InsertResult::Duplicate));
    assert_eq!(bob.session.conversation("Alice").len(), 1);
    assert_eq!(bob.session.unread().get("Alice"), 1);
}

#[tokio::test]
async fn unread_accrues_while_unfocused_and_clears_on_focus() {
    let hub = LoopbackHub::new();
    let mut alice = Client::join(&hub, "Alice");
    let mut bob = Client::join(&hub, "Bob");

    bob.session.focus(Some("Charlie"));
    alice.session.focus(Some("Bob"));
    alice.send("are you there?").await;
    bob.pump().await.unwrap();

    assert_eq!(bob.session.unread().get("Alice"), 1);
    // The sender never counts its own message.
    alice.pump().await.unwrap();
    assert_eq!(alice.session.unread().total(), 0);

    bob.session.focus(Some("Alice"));
    assert_eq!(bob.session.unread().get("Alice"), 0);
}

#[tokio::test]
async fn focused_conversation_does_not_accrue_unread() {
    let hub = LoopbackHub::new();
    let mut alice = Client::join(&hub, "Alice");
    let mut bob = Client::join(&hub, "Bob");

    bob.session.focus(Some("Alice"));
    alice.session.focus(Some("Bob"));
    alice.send("one").await;
    alice.send("two").await;
    bob.pump().await.unwrap();
    bob.pump().await.unwrap();

    assert_eq!(bob.session.conversation("Alice").len(), 2);
    assert_eq!(bob.session.unread().get("Alice"), 0);
}

#[tokio::test]
async fn delete_all_empties_only_that_conversation() {
    let hub = LoopbackHub::new();
    let mut alice = Client::join(&hub, "Alice");

    for (peer, text) in [("Bob", "to bob"), ("Charlie", "to charlie")] {
        alice.session.focus(Some(peer));
        alice.send(text).await;
        alice.pump().await.unwrap();
    }

    assert!(alice.session.delete_all(&derive_key("Alice", "Bob")));
    assert!(alice.session.conversation("Bob").is_empty());
    assert_eq!(alice.session.conversation("Charlie").len(), 1);
}

#[tokio::test]
async fn event_without_recipient_is_dropped() {
    let hub = LoopbackHub::new();
    let mut bob = Client::join(&hub, "Bob");

    hub.inject(&json!({"text": "x", "from": "Alice"}));
    assert_eq!(bob.pump().await, Err(ValidationError::MissingField("to")));
    assert!(bob.session.messages().is_empty());
    assert_eq!(bob.session.unread().total(), 0);
}

#[tokio::test]
async fn clients_may_disagree_on_order_but_not_content() {
    let hub = LoopbackHub::new();
    let mut bob = Client::join(&hub, "Bob");
    let mut carol = Client::join(&hub, "Carol");

    let first = json!({"text": "first", "from": "Alice", "to": "Bob"});
    let second = json!({"text": "second", "from": "Bob", "to": "Alice"});

    // Bob sees them in one order, Carol in the other.
    bob.session.ingest_event(&first).unwrap();
    bob.session.ingest_event(&second).unwrap();
    carol.session.ingest_event(&second).unwrap();
    carol.session.ingest_event(&first).unwrap();

    let key = derive_key("Alice", "Bob");
    let texts = |c: &Client| -> Vec<String> {
        let mut t: Vec<_> = c.session.messages().log(&key).iter().map(|m| m.text.clone()).collect();
        t.sort();
        t
    };
    assert_eq!(texts(&bob), texts(&carol));
    assert_ne!(
        bob.session.messages().log(&key)[0].text,
        carol.session.messages().log(&key)[0].text
    );
    drop(hub);
}

#[tokio::test]
async fn optimistic_send_converges_with_echo() {
    let hub = LoopbackHub::new();
    let options = SessionOptions {
        optimistic_send: true,
        ..SessionOptions::default()
    };
    let mut alice = Client {
        session: ChatSession::open(InMemoryStore::new(), "Alice", options),
        endpoint: hub.connect(),
    };

    alice.session.focus(Some("Bob"));
    alice.send("hi").await;
    assert_eq!(alice.session.conversation("Bob").len(), 1);
    assert_eq!(alice.pump().await, Ok(InsertResult::Duplicate));
    assert_eq!(alice.session.conversation("Bob").len(), 1);
}
