//! Record loop: one input line in, zero or more output lines out.
//!
//! - **encode**: each line becomes one event (a JSON object line for the
//!   `json` inner codec, otherwise the `message`), written as one base64 blob.
//! - **decode**: a line that base64-decodes to an envelope is decoded as
//!   that blob; any other line is handed to the codec as its raw bytes.
//!   Every decoded event is written as one JSON line.
//!
//! A failing record is logged and counted; the loop keeps going.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{CodecError, Event};
use kms_codec::crypto::blob::MAGIC;
use kms_codec::keys::KeyTransport;
use kms_codec::{EnvelopeCodec, InnerCodecKind};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::PipeMode;

/// Outcome counters of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub records: u64,
    pub failed: u64,
}

/// Stream `input` through `codec` into `output` until EOF. Blank lines are skipped.
///
/// # Errors
///
/// Returns an error only on I/O failure; codec failures are per record.
pub async fn run<T, R, W>(
    codec: &EnvelopeCodec<T>,
    mode: PipeMode,
    input: R,
    mut output: W,
) -> Result<Summary>
where
    T: KeyTransport,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut summary = Summary::default();

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        if line.trim().is_empty() {
            continue;
        }
        summary.records += 1;

        let result = match mode {
            PipeMode::Encode => encode_record(codec, &line).await,
            PipeMode::Decode => decode_record(codec, &line).await,
        };
        match result {
            Ok(out) => output
                .write_all(out.as_bytes())
                .await
                .context("failed to write output")?,
            Err(e) => {
                summary.failed += 1;
                warn!(record = summary.records, kind = e.kind(), error = %e, "record skipped");
            }
        }
    }

    output.flush().await.context("failed to flush output")?;
    Ok(summary)
}

async fn encode_record<T: KeyTransport>(
    codec: &EnvelopeCodec<T>,
    line: &str,
) -> Result<String, CodecError> {
    let event = event_from_line(codec.inner_codec(), line);
    let blob = codec.encode(&event).await?;
    let mut out = STANDARD.encode(blob);
    out.push('\n');
    Ok(out)
}

async fn decode_record<T: KeyTransport>(
    codec: &EnvelopeCodec<T>,
    line: &str,
) -> Result<String, CodecError> {
    let payload = envelope_payload(line);

    let mut out = String::new();
    for event in codec.decode(&payload).await? {
        out.push_str(&serde_json::to_string(&event)?);
        out.push('\n');
    }
    Ok(out)
}

/// The blob carried by `line`, or the line's own bytes if it does not
/// base64-decode to something starting with the envelope magic.
fn envelope_payload(line: &str) -> Vec<u8> {
    match STANDARD.decode(line.trim()) {
        Ok(bytes) if bytes.starts_with(MAGIC) => bytes,
        Ok(_) => {
            debug!("line decodes as base64 but not to an envelope; passing raw bytes");
            line.as_bytes().to_vec()
        }
        Err(e) => {
            debug!(error = %e, "line is not base64; passing raw bytes");
            line.as_bytes().to_vec()
        }
    }
}

/// Build the event to encode from one input line.
///
/// With the `json` inner codec a line holding a JSON object becomes that
/// object; anything else is carried as the `message`.
pub fn event_from_line(kind: InnerCodecKind, line: &str) -> Event {
    if kind == InnerCodecKind::Json {
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(line) {
            return Event::from_fields(fields);
        }
    }
    Event::from_message(line)
}
