//! `json`: events as JSON objects.
//!
//! A top-level array decodes to one event per element. Text that is not JSON
//! is kept as the `message` of a single event tagged [`JSON_PARSE_FAILURE_TAG`].

use common::protocol::MESSAGE_FIELD;
use common::{CodecError, Event};
use serde_json::Value;
use tracing::debug;

use super::{DecodedEvents, EventCodec};

/// Tag added to events whose payload could not be parsed as JSON.
pub const JSON_PARSE_FAILURE_TAG: &str = "_jsonparsefailure";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EventCodec for JsonCodec {
    fn encode(&self, event: &Event) -> Result<String, CodecError> {
        Ok(serde_json::to_string(event)?)
    }

    fn decode(&self, text: String) -> DecodedEvents {
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => DecodedEvents::new(items.into_iter().map(event_from_value)),
            Ok(value) => DecodedEvents::new(std::iter::once(event_from_value(value))),
            Err(e) => {
                debug!(error = %e, "payload is not JSON; keeping it as message");
                let mut event = Event::from_message(text);
                event.add_tag(JSON_PARSE_FAILURE_TAG);
                DecodedEvents::new(std::iter::once(event))
            }
        }
    }
}

fn event_from_value(value: Value) -> Event {
    match value {
        Value::Object(fields) => Event::from_fields(fields),
        other => {
            let mut event = Event::new();
            event.set(MESSAGE_FIELD, other);
            event
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_writes_all_fields() {
        let event: Event =
            serde_json::from_value(json!({"message": "m", "user": {"id": 7}})).unwrap();
        let out: Value = serde_json::from_str(&JsonCodec.encode(&event).unwrap()).unwrap();
        assert_eq!(out, json!({"message": "m", "user": {"id": 7}}));
    }

    #[test]
    fn decode_object() {
        let events: Vec<Event> = JsonCodec.decode(r#"{"a":1,"b":"x"}"#.into()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("a"), Some(&json!(1)));
    }

    #[test]
    fn decode_array_yields_one_event_per_element() {
        let events: Vec<Event> = JsonCodec.decode(r#"[{"n":1},{"n":2},"three"]"#.into()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].get("n"), Some(&json!(2)));
        assert_eq!(events[2].message(), Some("three"));
    }

    #[test]
    fn decode_scalar_becomes_message() {
        let events: Vec<Event> = JsonCodec.decode("12".into()).collect();
        assert_eq!(events[0].get("message"), Some(&json!(12)));
    }

    #[test]
    fn decode_invalid_json_is_tagged() {
        let events: Vec<Event> = JsonCodec.decode("some_data".into()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message(), Some("some_data"));
        assert!(events[0].has_tag(JSON_PARSE_FAILURE_TAG));
    }
}
