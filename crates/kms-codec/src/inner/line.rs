//! `line`: one event per delimited line.

use common::{CodecError, Event};

use super::{message_text, DecodedEvents, EventCodec};

const DEFAULT_DELIMITER: &str = "\n";

#[derive(Debug, Clone)]
pub struct LineCodec {
    delimiter: String,
}

impl LineCodec {
    /// An empty `delimiter` falls back to `"\n"`.
    pub fn new(delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        Self {
            delimiter: if delimiter.is_empty() {
                DEFAULT_DELIMITER.to_owned()
            } else {
                delimiter
            },
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl EventCodec for LineCodec {
    fn encode(&self, event: &Event) -> Result<String, CodecError> {
        let mut out = message_text(event);
        out.push_str(&self.delimiter);
        Ok(out)
    }

    fn decode(&self, text: String) -> DecodedEvents {
        DecodedEvents::new(Lines {
            text,
            pos: 0,
            delimiter: self.delimiter.clone(),
        })
    }
}

/// Splits lazily; a trailing partial line is emitted as the last event.
struct Lines {
    text: String,
    pos: usize,
    delimiter: String,
}

impl Iterator for Lines {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.pos >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.pos..];
        let line = match rest.find(self.delimiter.as_str()) {
            Some(end) => {
                self.pos += end + self.delimiter.len();
                &rest[..end]
            }
            None => {
                self.pos = self.text.len();
                rest
            }
        };
        Some(Event::from_message(line))
    }
}
