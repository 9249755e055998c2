//! `envelope-pipe` — line-oriented host for the envelope codec.
//!
//! Startup sequence:
//! 1. Load and validate [`config::PipeConfig`] and the codec settings from
//!    environment variables.
//! 2. Initialise structured JSON logging on stderr.
//! 3. Register the codec and stream stdin to stdout.

mod config;
mod pipe;
mod telemetry;

use anyhow::{Context, Result};
use kms_codec::{CodecSettings, EnvelopeCodec};
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = config::PipeConfig::from_env().map_err(|e| {
        eprintln!("ERROR: envelope-pipe configuration invalid: {e}");
        e
    })?;
    let settings = CodecSettings::from_env().context("codec settings invalid")?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Codec + pipe
    // -----------------------------------------------------------------------
    let codec = EnvelopeCodec::register(&settings)
        .await
        .context("codec registration failed")?;

    let summary = pipe::run(
        &codec,
        cfg.pipe_mode,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    info!(
        records = summary.records,
        failed = summary.failed,
        cache_hits = codec.cache_stats().hits,
        "input exhausted"
    );

    if summary.failed > 0 {
        anyhow::bail!("{} of {} records failed", summary.failed, summary.records);
    }
    Ok(())
}
