//! Codec settings: loading, defaults, and setup-time validation.
//!
//! Hosts either build [`CodecSettings`] directly (see [`CodecSettings::new`])
//! or read them from `KMS_CODEC_*` environment variables. Every problem is
//! reported as [`CodecError::Configuration`] before any key material exists.

use std::time::Duration;

use common::{CodecError, EncryptionContext};
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::inner::{Charset, InnerCodecKind};
use crate::materials::CacheLimits;

/// Environment variable prefix used by [`CodecSettings::from_env`].
pub const ENV_PREFIX: &str = "KMS_CODEC";

/// Longest string the blob header can frame (u16 length prefix).
const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Validated-on-demand codec configuration.
#[derive(Clone, Deserialize)]
pub struct CodecSettings {
    /// Master key identifiers (ARNs, aliases, or key IDs). The first is primary. **Required.**
    pub key_ids: Vec<String>,

    /// AWS region hosting the master keys. **Required.**
    pub region: String,

    /// Static access key ID. Used only together with `secret_key`.
    #[serde(default)]
    pub access_key: Option<String>,

    /// Static secret access key. Used only together with `access_key`.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Named profile from the shared AWS config files.
    #[serde(default)]
    pub aws_profile: Option<String>,

    /// Context bound to every blob and required on decode. Values must be strings.
    #[serde(default, deserialize_with = "deserialize_context")]
    pub encryption_context: Map<String, Value>,

    /// Decode undecryptable payloads as plaintext instead of failing.
    #[serde(default)]
    pub fallback_if_invalid_format: bool,

    /// Character set of decrypted plaintext.
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Maximum age of a cached data key, in milliseconds.
    #[serde(default = "default_max_entry_age_ms")]
    pub max_entry_age_ms: u64,

    /// Maximum number of messages encrypted under one cached data key.
    #[serde(default = "default_max_entry_uses")]
    pub max_entry_uses: u64,

    /// Maximum number of distinct cached data keys.
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    /// Codec used for the plaintext payload.
    #[serde(default)]
    pub inner_codec: InnerCodecKind,

    /// KMS endpoint override (e.g. a LocalStack URL).
    #[serde(default)]
    pub kms_endpoint: Option<String>,
}

fn default_charset() -> String {
    "UTF-8".into()
}
fn default_max_entry_age_ms() -> u64 {
    300_000
}
fn default_max_entry_uses() -> u64 {
    1000
}
fn default_max_cache_entries() -> usize {
    1000
}

/// Accept the context either as a JSON object or as a string holding one
/// (the only shape an environment variable can carry).
fn deserialize_context<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::String(raw) if raw.trim().is_empty() => Ok(Map::new()),
        Value::String(raw) => serde_json::from_str(&raw).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!(
            "encryption_context must be a JSON object, got {other}"
        ))),
    }
}

impl CodecSettings {
    /// Settings with the required fields set and every option at its default.
    pub fn new<I, S>(key_ids: I, region: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_ids: key_ids.into_iter().map(Into::into).collect(),
            region: region.into(),
            access_key: None,
            secret_key: None,
            aws_profile: None,
            encryption_context: Map::new(),
            fallback_if_invalid_format: false,
            charset: default_charset(),
            max_entry_age_ms: default_max_entry_age_ms(),
            max_entry_uses: default_max_entry_uses(),
            max_cache_entries: default_max_cache_entries(),
            inner_codec: InnerCodecKind::default(),
            kms_endpoint: None,
        }
    }

    /// Load settings from `KMS_CODEC_*` environment variables and validate them.
    ///
    /// `KMS_CODEC_KEY_IDS` is comma-separated; `KMS_CODEC_ENCRYPTION_CONTEXT`
    /// is a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if a required variable is absent
    /// or any value is invalid.
    pub fn from_env() -> Result<Self, CodecError> {
        let cfg = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("key_ids"),
            )
            .build()
            .map_err(|e| {
                CodecError::Configuration(format!("failed to read codec environment: {e}"))
            })?;

        let settings: CodecSettings = cfg.try_deserialize().map_err(|e| {
            CodecError::Configuration(format!("failed to deserialise codec settings: {e}"))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every field, returning a descriptive error on the first failure.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.key_ids.is_empty() {
            return Err(CodecError::Configuration(
                "key_ids must contain at least one key identifier".into(),
            ));
        }
        for key_id in &self.key_ids {
            ensure_field("key_ids entry", key_id)?;
        }
        ensure_non_empty(&self.region, "region")?;

        let context = self.context()?;
        for (key, value) in context.iter() {
            ensure_field("encryption_context key", key)?;
            if value.len() > MAX_FIELD_LEN {
                return Err(CodecError::Configuration(format!(
                    "encryption_context value for `{key}` exceeds {MAX_FIELD_LEN} bytes"
                )));
            }
        }

        self.parsed_charset()?;
        self.cache_limits()?;
        Ok(())
    }

    /// The configured context, with every value checked to be a string.
    pub fn context(&self) -> Result<EncryptionContext, CodecError> {
        EncryptionContext::from_json(&self.encryption_context)
    }

    pub fn parsed_charset(&self) -> Result<Charset, CodecError> {
        self.charset.parse()
    }

    /// Cache bounds derived from the `max_*` settings.
    pub fn cache_limits(&self) -> Result<CacheLimits, CodecError> {
        if self.max_entry_age_ms == 0 {
            return Err(CodecError::Configuration("max_entry_age_ms must be > 0".into()));
        }
        CacheLimits::new(
            self.max_cache_entries,
            Duration::from_millis(self.max_entry_age_ms),
            self.max_entry_uses,
        )
    }
}

impl std::fmt::Debug for CodecSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the static secret key.
        f.debug_struct("CodecSettings")
            .field("key_ids", &self.key_ids)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("aws_profile", &self.aws_profile)
            .field("encryption_context", &self.encryption_context)
            .field("fallback_if_invalid_format", &self.fallback_if_invalid_format)
            .field("charset", &self.charset)
            .field("max_entry_age_ms", &self.max_entry_age_ms)
            .field("max_entry_uses", &self.max_entry_uses)
            .field("max_cache_entries", &self.max_cache_entries)
            .field("inner_codec", &self.inner_codec)
            .field("kms_endpoint", &self.kms_endpoint)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<(), CodecError> {
    if value.trim().is_empty() {
        return Err(CodecError::Configuration(format!(
            "{name} is required and must not be empty"
        )));
    }
    Ok(())
}

fn ensure_field(name: &str, value: &str) -> Result<(), CodecError> {
    ensure_non_empty(value, name)?;
    if value.len() > MAX_FIELD_LEN {
        return Err(CodecError::Configuration(format!(
            "{name} exceeds {MAX_FIELD_LEN} bytes"
        )));
    }
    Ok(())
}
