//! Configuration loading and validation for the envelope-pipe binary.
//!
//! Codec settings come from `KMS_CODEC_*` (see `kms_codec::CodecSettings`);
//! this covers only the pipe itself.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Direction the pipe runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeMode {
    /// stdin records -> base64 envelope blobs.
    Encode,
    /// base64 envelope blobs -> JSON events.
    Decode,
}

/// Validated envelope-pipe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipeConfig {
    /// `PIPE_MODE`. **Required.**
    pub pipe_mode: PipeMode,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl PipeConfig {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build envelope-pipe configuration")?;

        let c: PipeConfig = cfg
            .try_deserialize()
            .context("failed to deserialise envelope-pipe configuration (is PIPE_MODE set?)")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        Ok(())
    }
}
