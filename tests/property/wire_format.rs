//! Property-based tests for the message event format and relay frames.
//!
//! Uses proptest to verify:
//! 1. Any valid `ChatMessage` survives `to_event` → `from_event`.
//! 2. Arbitrary JSON text never panics `relay::decode`.
//! 3. Arbitrary JSON objects never panic `from_event`, and accepted ones
//!    are always valid.
//! 4. Relay frames carrying an event round-trip through encode → decode.

use chrono::{DateTime, TimeZone, Utc};
use paircast_proto::message::{ChatMessage, MAX_MESSAGE_SIZE, ValidationError};
use paircast_proto::relay::{self, RelayFrame};
use proptest::prelude::*;
use serde_json::{Value, json};

fn received_at() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

/// Strategy for identities as typed by users.
fn arb_identity() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ._-]{0,15}"
}

/// Timestamps between 1970 and 2100 at millisecond precision.
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0_i64..4_102_444_800_000).prop_map(|millis| Utc.timestamp_millis_opt(millis).unwrap())
}

fn arb_message() -> impl Strategy<Value = ChatMessage> {
    (
        "[^\x00]{1,256}",
        arb_identity(),
        arb_identity(),
        arb_timestamp(),
    )
        .prop_map(|(text, from, to, ts)| ChatMessage::with_timestamp(text, from, to, ts))
}

/// Loosely shaped event objects: each field may be missing or mistyped.
fn arb_event() -> impl Strategy<Value = Value> {
    let field = prop_oneof![
        Just(Value::Null),
        ".{0,8}".prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ];
    prop::collection::vec(
        (
            prop_oneof![
                Just("text".to_owned()),
                Just("from".to_owned()),
                Just("to".to_owned()),
                Just("timestamp".to_owned()),
                "[a-z]{1,6}",
            ],
            field,
        ),
        0..6,
    )
    .prop_map(|fields| Value::Object(fields.into_iter().collect()))
}

proptest! {
    #[test]
    fn event_round_trip(msg in arb_message()) {
        let decoded = ChatMessage::from_event(&msg.to_event(), received_at()).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_arbitrary_text_never_panics(text in ".{0,256}") {
        let _ = relay::decode(&text);
    }

    #[test]
    fn from_event_accepts_only_valid_messages(event in arb_event()) {
        if let Ok(msg) = ChatMessage::from_event(&event, received_at()) {
            prop_assert!(msg.validate().is_ok());
            prop_assert_eq!(event["text"].as_str(), Some(msg.text.as_str()));
            prop_assert_eq!(event["from"].as_str(), Some(msg.from.as_str()));
            prop_assert_eq!(event["to"].as_str(), Some(msg.to.as_str()));
        }
    }

    #[test]
    fn unreadable_timestamp_falls_back_to_receive_time(
        msg in arb_message(),
        junk in prop_oneof![Just(Value::Null), "[a-z]{0,10}".prop_map(Value::from)],
    ) {
        let mut event = msg.to_event();
        event["timestamp"] = junk;
        let decoded = ChatMessage::from_event(&event, received_at()).unwrap();
        prop_assert_eq!(decoded.timestamp, received_at());
        prop_assert!(decoded.same_content(&msg));
    }

    #[test]
    fn deliver_frame_round_trip(msg in arb_message()) {
        let frame = RelayFrame::Deliver { message: msg.to_event() };
        let text = relay::encode(&frame).unwrap();
        prop_assert_eq!(relay::decode(&text).unwrap(), frame);
    }
}

#[test]
fn oversized_event_is_rejected() {
    let event = json!({
        "text": "x".repeat(MAX_MESSAGE_SIZE + 1),
        "from": "Alice",
        "to": "Bob",
    });
    assert!(matches!(
        ChatMessage::from_event(&event, received_at()),
        Err(ValidationError::TooLarge { .. })
    ));
}

#[test]
fn epoch_millis_timestamp_is_accepted() {
    let event = json!({"text": "hi", "from": "Alice", "to": "Bob", "timestamp": 1_000});
    let msg = ChatMessage::from_event(&event, received_at()).unwrap();
    assert_eq!(msg.timestamp, Utc.timestamp_millis_opt(1_000).unwrap());
}
