//! Public contract of `EnvelopeCodec`, exercised through a host-supplied
//! key transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kms_codec::keys::KeyTransport;
use kms_codec::{
    CodecError, CodecSettings, EncryptionContext, EnvelopeCodec, Event, InnerCodecKind,
};
use parking_lot::Mutex;
use serde_json::json;

/// Stores raw keys in a table and hands out opaque handles; only key IDs in
/// `allowed` may wrap or unwrap.
#[derive(Default)]
struct VaultTransport {
    allowed: Vec<String>,
    table: Mutex<HashMap<Vec<u8>, (String, Vec<u8>, EncryptionContext)>>,
    calls: AtomicUsize,
}

impl VaultTransport {
    fn allowing(keys: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            allowed: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        })
    }

    fn check(&self, key_id: &str) -> Result<(), CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.allowed.iter().any(|k| k == key_id) {
            Ok(())
        } else {
            Err(CodecError::key_access(key_id, "AccessDeniedException"))
        }
    }
}

#[async_trait]
impl KeyTransport for VaultTransport {
    async fn wrap_key(
        &self,
        key_id: &str,
        raw_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError> {
        self.check(key_id)?;
        let mut table = self.table.lock();
        let handle = format!("{key_id}#{}", table.len()).into_bytes();
        table.insert(
            handle.clone(),
            (key_id.to_owned(), raw_key.to_vec(), context.clone()),
        );
        Ok(handle)
    }

    async fn unwrap_key(
        &self,
        key_id: &str,
        wrapped: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError> {
        self.check(key_id)?;
        match self.table.lock().get(wrapped) {
            Some((owner, raw, bound)) if owner == key_id && bound == context => Ok(raw.clone()),
            _ => Err(CodecError::key_access(key_id, "InvalidCiphertextException")),
        }
    }
}

fn settings(keys: &[&str], context: serde_json::Value) -> CodecSettings {
    let mut s = CodecSettings::new(keys.iter().copied(), "eu-central-1");
    s.encryption_context = context.as_object().cloned().unwrap_or_default();
    s
}

async fn round_trip(codec: &EnvelopeCodec<Arc<VaultTransport>>, event: &Event) -> Vec<Event> {
    let blob = codec.encode(event).await.expect("encode");
    codec.decode(&blob).await.expect("decode").collect()
}

#[tokio::test]
async fn round_trip_for_every_inner_codec() {
    let vault = VaultTransport::allowing(&["k1"]);
    let event = Event::from_message("user logged in");

    for kind in [InnerCodecKind::Plain, InnerCodecKind::Line, InnerCodecKind::Json] {
        let mut s = settings(&["k1"], json!({"app": "auth"}));
        s.inner_codec = kind;
        let codec = EnvelopeCodec::with_transport(&s, Arc::clone(&vault)).unwrap();
        assert_eq!(codec.inner_codec(), kind);
        assert_eq!(round_trip(&codec, &event).await, vec![event.clone()], "{kind}");
    }
}

#[tokio::test]
async fn any_configured_key_can_decrypt() {
    let both = VaultTransport::allowing(&["k1", "k2"]);
    let writer =
        EnvelopeCodec::with_transport(&settings(&["k1", "k2"], json!({})), Arc::clone(&both))
            .unwrap();
    let blob = writer.encode(&Event::from_message("m")).await.unwrap();

    // A reader that can only reach the second key still opens the blob.
    let only_k2 = Arc::new(VaultTransport {
        allowed: vec!["k2".into()],
        table: Mutex::new(both.table.lock().clone()),
        calls: AtomicUsize::new(0),
    });
    let reader =
        EnvelopeCodec::with_transport(&settings(&["k2"], json!({})), Arc::clone(&only_k2))
            .unwrap();
    let events: Vec<Event> = reader.decode(&blob).await.unwrap().collect();
    assert_eq!(events, vec![Event::from_message("m")]);
    assert_eq!(
        only_k2.calls.load(Ordering::SeqCst),
        1,
        "k1 is not configured on the reader and is never sent to the transport"
    );
}

#[tokio::test]
async fn blob_wrapped_only_under_foreign_key_is_rejected() {
    let foreign = VaultTransport::allowing(&["arn:aws:kms:us-east-1:1:key/other"]);
    let writer = EnvelopeCodec::with_transport(
        &settings(&["arn:aws:kms:us-east-1:1:key/other"], json!({})),
        Arc::clone(&foreign),
    )
    .unwrap();
    let blob = writer.encode(&Event::from_message("m")).await.unwrap();

    let mut reader_settings = settings(&["alias/events"], json!({}));
    reader_settings.fallback_if_invalid_format = true;
    let reader_transport = Arc::new(VaultTransport {
        allowed: vec!["alias/events".into(), "arn:aws:kms:us-east-1:1:key/other".into()],
        table: Mutex::new(foreign.table.lock().clone()),
        calls: AtomicUsize::new(0),
    });
    let reader =
        EnvelopeCodec::with_transport(&reader_settings, Arc::clone(&reader_transport)).unwrap();

    let err = reader.decode(&blob).await.unwrap_err();
    assert!(matches!(err, CodecError::KeyAccess { ref key_id, .. } if key_id == "alias/events"));
    assert_eq!(reader_transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn encode_fails_atomically_when_a_key_is_denied() {
    let vault = VaultTransport::allowing(&["k1"]);
    let codec =
        EnvelopeCodec::with_transport(&settings(&["k1", "k2"], json!({})), vault).unwrap();
    let err = codec.encode(&Event::from_message("m")).await.unwrap_err();
    assert!(matches!(err, CodecError::KeyAccess { ref key_id, .. } if key_id == "k2"));
    assert_eq!(codec.cache_stats().misses, 1);
}

#[tokio::test]
async fn context_contract() {
    let vault = VaultTransport::allowing(&["k1"]);
    let writer = EnvelopeCodec::with_transport(
        &settings(&["k1"], json!({"a": "1", "b": "2"})),
        Arc::clone(&vault),
    )
    .unwrap();
    let blob = writer.encode(&Event::from_message("m")).await.unwrap();

    let subset =
        EnvelopeCodec::with_transport(&settings(&["k1"], json!({"b": "2"})), Arc::clone(&vault))
            .unwrap();
    assert_eq!(subset.decode(&blob).await.unwrap().count(), 1);

    let mut strict = settings(&["k1"], json!({"c": "3"}));
    strict.fallback_if_invalid_format = true;
    let strict = EnvelopeCodec::with_transport(&strict, Arc::clone(&vault)).unwrap();
    let err = strict.decode(&blob).await.unwrap_err();
    assert!(matches!(err, CodecError::ContextMismatch { ref key, .. } if key == "c"));
}

#[tokio::test]
async fn fallback_contract() {
    let vault = VaultTransport::allowing(&["k1"]);

    let mut lenient = settings(&["k1"], json!({}));
    lenient.fallback_if_invalid_format = true;
    let lenient = EnvelopeCodec::with_transport(&lenient, Arc::clone(&vault)).unwrap();
    let events: Vec<Event> = lenient.decode(b"some_data").await.unwrap().collect();
    assert_eq!(events, vec![Event::from_message("some_data")]);

    let strict = EnvelopeCodec::with_transport(&settings(&["k1"], json!({})), vault).unwrap();
    assert!(matches!(
        strict.decode(b"some_data").await,
        Err(CodecError::CryptoFormat(_))
    ));
}

#[tokio::test]
async fn invalid_settings_are_rejected_at_setup() {
    let vault = VaultTransport::allowing(&["k1"]);

    let empty_keys = settings(&[], json!({}));
    assert!(matches!(
        EnvelopeCodec::with_transport(&empty_keys, Arc::clone(&vault)),
        Err(CodecError::Configuration(_))
    ));

    let mut bad_charset = settings(&["k1"], json!({}));
    bad_charset.charset = "EBCDIC".into();
    assert!(matches!(
        EnvelopeCodec::with_transport(&bad_charset, vault),
        Err(CodecError::Configuration(_))
    ));
}
