//! Logging for the envelope-pipe binary.
//!
//! stdout carries encoded or decoded records, so every log line goes to
//! stderr as JSON. The AWS SDK's request chatter is held at `warn` unless
//! `RUST_LOG` asks for it explicitly.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// SDK targets that log every KMS round trip at `info`.
const SDK_TARGETS: &[&str] = &["aws_config", "aws_smithy_runtime", "aws_sdk_kms"];

/// Initialise the stderr JSON subscriber. `RUST_LOG` overrides `log_level`.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter or the subscriber
/// has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => level_filter(log_level)?,
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("envelope-pipe logging already initialised: {e}"))
}

/// `log_level` for everything, capped at `warn` for the SDK targets.
fn level_filter(log_level: &str) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level {log_level:?}"))?;
    for target in SDK_TARGETS {
        filter = filter.add_directive(format!("{target}=warn").parse()?);
    }
    Ok(filter)
}
