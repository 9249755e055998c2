//! `plain`: the whole payload is one event's `message`.

use common::{CodecError, Event};

use super::{message_text, DecodedEvents, EventCodec};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl EventCodec for PlainCodec {
    fn encode(&self, event: &Event) -> Result<String, CodecError> {
        Ok(message_text(event))
    }

    fn decode(&self, text: String) -> DecodedEvents {
        DecodedEvents::new(std::iter::once(Event::from_message(text)))
    }
}
