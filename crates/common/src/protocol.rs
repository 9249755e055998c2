//! Data types exchanged between the host pipeline and the codec.
//!
//! [`Event`] is the structured message the inner codecs serialise;
//! [`EncryptionContext`] is the authenticated metadata bound to every blob.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;

/// Field that carries the raw text of line-oriented events.
pub const MESSAGE_FIELD: &str = "message";

/// Field holding the list of tags attached to an event.
pub const TAGS_FIELD: &str = "tags";

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single pipeline event: a JSON object of named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Create an empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event whose only field is `message`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let mut event = Self::new();
        event.set(MESSAGE_FIELD, Value::String(message.into()));
        event
    }

    /// Wrap an existing JSON object.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The `message` field, if present and a string.
    pub fn message(&self) -> Option<&str> {
        self.fields.get(MESSAGE_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set `field`, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Append `tag` to the `tags` array, creating it if needed.
    ///
    /// A non-array `tags` value is replaced by an array holding the old value.
    pub fn add_tag(&mut self, tag: &str) {
        let tag = Value::String(tag.to_owned());
        match self.fields.remove(TAGS_FIELD) {
            Some(Value::Array(mut tags)) => {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
                self.fields.insert(TAGS_FIELD.into(), Value::Array(tags));
            }
            Some(other) => {
                self.fields
                    .insert(TAGS_FIELD.into(), Value::Array(vec![other, tag]));
            }
            None => {
                self.fields.insert(TAGS_FIELD.into(), Value::Array(vec![tag]));
            }
        }
    }

    /// Returns `true` if `tag` is present in the `tags` array.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.fields
            .get(TAGS_FIELD)
            .and_then(Value::as_array)
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(tag)))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

// ---------------------------------------------------------------------------
// Encryption context
// ---------------------------------------------------------------------------

/// Authenticated string-to-string metadata bound to an encrypted payload.
///
/// Backed by a [`BTreeMap`] so iteration is always in key order, which gives
/// the wire encoding and the cache key a canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionContext(BTreeMap<String, String>);

impl EncryptionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object, rejecting non-string values.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] naming the first offending key.
    pub fn from_json(map: &Map<String, Value>) -> Result<Self, CodecError> {
        let mut pairs = BTreeMap::new();
        for (key, value) in map {
            match value {
                Value::String(s) => {
                    pairs.insert(key.clone(), s.clone());
                }
                other => {
                    return Err(CodecError::Configuration(format!(
                        "encryption_context value for `{key}` must be a string, got {}",
                        json_type_name(other)
                    )));
                }
            }
        }
        Ok(Self(pairs))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for EncryptionContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
