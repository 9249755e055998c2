//! Inner codecs: serialisation of events to and from plaintext payloads.
//!
//! The set is closed; [`InnerCodec`] is resolved once from
//! [`InnerCodecKind`] at setup and dispatches through [`EventCodec`].

pub mod charset;
pub mod json;
pub mod line;
pub mod plain;

pub use charset::Charset;
pub use json::JsonCodec;
pub use line::LineCodec;
pub use plain::PlainCodec;

use common::{CodecError, Event};
use serde::Deserialize;

/// Capability shared by every inner codec.
pub trait EventCodec: Send + Sync {
    /// Serialise one event to text; the envelope applies the charset.
    fn encode(&self, event: &Event) -> Result<String, CodecError>;

    /// Turn one decoded plaintext into zero or more events.
    fn decode(&self, text: String) -> DecodedEvents;
}

/// Selector for the inner codec, as it appears in settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InnerCodecKind {
    #[default]
    Plain,
    Line,
    Json,
}

impl std::fmt::Display for InnerCodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InnerCodecKind::Plain => "plain",
            InnerCodecKind::Line => "line",
            InnerCodecKind::Json => "json",
        })
    }
}

/// The resolved inner codec owned by an envelope codec.
#[derive(Debug, Clone)]
pub enum InnerCodec {
    Plain(PlainCodec),
    Line(LineCodec),
    Json(JsonCodec),
}

impl InnerCodec {
    pub fn from_kind(kind: InnerCodecKind) -> Self {
        match kind {
            InnerCodecKind::Plain => InnerCodec::Plain(PlainCodec),
            InnerCodecKind::Line => InnerCodec::Line(LineCodec::default()),
            InnerCodecKind::Json => InnerCodec::Json(JsonCodec),
        }
    }

    pub fn kind(&self) -> InnerCodecKind {
        match self {
            InnerCodec::Plain(_) => InnerCodecKind::Plain,
            InnerCodec::Line(_) => InnerCodecKind::Line,
            InnerCodec::Json(_) => InnerCodecKind::Json,
        }
    }
}

impl EventCodec for InnerCodec {
    fn encode(&self, event: &Event) -> Result<String, CodecError> {
        match self {
            InnerCodec::Plain(c) => c.encode(event),
            InnerCodec::Line(c) => c.encode(event),
            InnerCodec::Json(c) => c.encode(event),
        }
    }

    fn decode(&self, text: String) -> DecodedEvents {
        match self {
            InnerCodec::Plain(c) => c.decode(text),
            InnerCodec::Line(c) => c.decode(text),
            InnerCodec::Json(c) => c.decode(text),
        }
    }
}

/// Lazy, one-shot sequence of decoded events.
pub struct DecodedEvents {
    inner: Box<dyn Iterator<Item = Event> + Send>,
}

impl DecodedEvents {
    pub fn new<I>(events: I) -> Self
    where
        I: Iterator<Item = Event> + Send + 'static,
    {
        Self {
            inner: Box::new(events),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Iterator for DecodedEvents {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.inner.next()
    }
}

impl std::fmt::Debug for DecodedEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DecodedEvents")
    }
}

/// Text rendering of the `message` field: strings verbatim, other values as
/// JSON, absent as empty.
pub(crate) fn message_text(event: &Event) -> String {
    match event.get(common::protocol::MESSAGE_FIELD) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_deserialises_lowercase() {
        let kind: InnerCodecKind = serde_json::from_str("\"line\"").unwrap();
        assert_eq!(kind, InnerCodecKind::Line);
        assert!(serde_json::from_str::<InnerCodecKind>("\"avro\"").is_err());
    }

    #[test]
    fn from_kind_round_trips() {
        for kind in [InnerCodecKind::Plain, InnerCodecKind::Line, InnerCodecKind::Json] {
            assert_eq!(InnerCodec::from_kind(kind).kind(), kind);
        }
    }

    #[test]
    fn message_text_renders_values() {
        assert_eq!(message_text(&Event::from_message("hi")), "hi");
        let mut e = Event::new();
        e.set("message", serde_json::json!(42));
        assert_eq!(message_text(&e), "42");
        assert_eq!(message_text(&Event::new()), "");
    }

    #[test]
    fn decoded_events_is_one_shot() {
        let mut events = DecodedEvents::new(vec![Event::from_message("a")].into_iter());
        assert!(events.next().is_some());
        assert!(events.next().is_none());
        assert!(DecodedEvents::empty().next().is_none());
    }
}
