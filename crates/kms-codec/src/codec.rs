//! [`EnvelopeCodec`]: the public encode/decode entry point.

use std::sync::Arc;

use common::{CodecError, EncryptionContext, Event};
use tracing::{debug, info};

use crate::aws::{CredentialHandle, KmsTransport};
use crate::config::CodecSettings;
use crate::crypto::EnvelopeBlob;
use crate::inner::{Charset, DecodedEvents, EventCodec, InnerCodec, InnerCodecKind};
use crate::keys::{KeyTransport, MasterKeyProvider};
use crate::materials::{CacheStats, CryptoMaterialsManager, MaterialsCache};

/// Envelope-encrypting codec around an inner event codec.
///
/// Safe to share across tasks: the data-key cache is the only mutable state
/// and is internally synchronised.
#[derive(Debug)]
pub struct EnvelopeCodec<T = KmsTransport> {
    manager: CryptoMaterialsManager<T>,
    context: EncryptionContext,
    inner: InnerCodec,
    charset: Charset,
    fallback: bool,
}

impl EnvelopeCodec<KmsTransport> {
    /// Validate `settings` and build a codec backed by AWS KMS.
    ///
    /// Calling this repeatedly with the same settings is fine; each call
    /// returns an independent codec with its own cache.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if the settings are invalid.
    pub async fn register(settings: &CodecSettings) -> Result<Self, CodecError> {
        settings.validate()?;
        let credentials = CredentialHandle::resolve(
            settings.access_key.as_deref(),
            settings.secret_key.as_deref(),
            settings.aws_profile.as_deref(),
        );
        let transport = KmsTransport::connect(
            &credentials,
            &settings.region,
            settings.kms_endpoint.as_deref(),
        )
        .await;
        Self::with_transport(settings, transport)
    }
}

impl<T: KeyTransport> EnvelopeCodec<T> {
    /// Validate `settings` and build a codec over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if the settings are invalid.
    pub fn with_transport(settings: &CodecSettings, transport: T) -> Result<Self, CodecError> {
        settings.validate()?;
        let context = settings.context()?;
        let charset = settings.parsed_charset()?;
        let cache = MaterialsCache::new(settings.cache_limits()?);
        let provider =
            MasterKeyProvider::new(transport, settings.region.clone(), settings.key_ids.clone())?;

        info!(
            keys = settings.key_ids.len(),
            region = %settings.region,
            inner_codec = %settings.inner_codec,
            charset = charset.name(),
            context_keys = context.len(),
            fallback = settings.fallback_if_invalid_format,
            "envelope codec registered"
        );

        Ok(Self {
            manager: CryptoMaterialsManager::new(provider, cache),
            context,
            inner: InnerCodec::from_kind(settings.inner_codec),
            charset,
            fallback: settings.fallback_if_invalid_format,
        })
    }

    /// Serialise `event` with the inner codec and seal it into an envelope blob.
    ///
    /// # Errors
    ///
    /// [`CodecError::Serialization`] if the inner codec fails,
    /// [`CodecError::KeyAccess`] if no data key can be negotiated. Nothing is
    /// returned on failure.
    pub async fn encode(&self, event: &Event) -> Result<Vec<u8>, CodecError> {
        let plaintext = self.charset.encode(&self.inner.encode(event)?);
        let material = self.manager.materials_for_encrypt(&self.context).await?;
        let blob = EnvelopeBlob::seal(
            &material.data_key,
            &material.context,
            &material.wrapped_keys,
            &plaintext,
        )?;
        Ok(blob.to_bytes())
    }

    /// Open an envelope blob and decode its plaintext with the inner codec.
    ///
    /// With fallback enabled, a payload that is not a valid envelope is
    /// decoded as if it were plaintext.
    ///
    /// # Errors
    ///
    /// - [`CodecError::CryptoFormat`] if the payload is malformed or fails
    ///   authentication and fallback is disabled.
    /// - [`CodecError::ContextMismatch`] if the blob lacks a configured
    ///   context pair. Never recovered by fallback.
    /// - [`CodecError::KeyAccess`] if no wrapped key can be unwrapped. Never
    ///   recovered by fallback.
    pub async fn decode(&self, payload: &[u8]) -> Result<DecodedEvents, CodecError> {
        match self.open(payload).await {
            Ok(plaintext) => Ok(self.inner.decode(self.charset.decode(plaintext))),
            Err(e) if self.fallback && e.is_fallback_eligible() => {
                debug!(error = %e, "payload is not a valid envelope; decoding as plaintext");
                Ok(self.inner.decode(self.charset.decode(payload.to_vec())))
            }
            Err(e) => Err(e),
        }
    }

    async fn open(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let blob = EnvelopeBlob::parse(payload)?;
        let material = self
            .manager
            .materials_for_decrypt(blob.wrapped_keys(), blob.context())
            .await?;
        self.verify_context(&material.context)?;
        Ok(blob.open(&material.data_key)?)
    }

    /// Every configured pair must appear in `declared` with an equal value.
    fn verify_context(&self, declared: &EncryptionContext) -> Result<(), CodecError> {
        for (key, expected) in self.context.iter() {
            match declared.get(key) {
                Some(actual) if actual == expected => {}
                actual => {
                    return Err(CodecError::ContextMismatch {
                        key: key.to_owned(),
                        expected: expected.to_owned(),
                        actual: actual.map(str::to_owned),
                    })
                }
            }
        }
        Ok(())
    }

    pub fn context(&self) -> &EncryptionContext {
        &self.context
    }

    pub fn inner_codec(&self) -> InnerCodecKind {
        self.inner.kind()
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback
    }

    pub fn key_ids(&self) -> &[String] {
        self.manager.provider().key_ids()
    }

    /// Hit/miss/eviction counters of the data-key cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.manager.cache_stats()
    }
}

/// Shared handle, for hosts that fan one codec out to many workers.
pub type SharedCodec<T = KmsTransport> = Arc<EnvelopeCodec<T>>;
