//! [`KmsTransport`]: the [`KeyTransport`] backed by AWS KMS `Encrypt`/`Decrypt`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use common::{CodecError, EncryptionContext};
use tracing::debug;

use super::CredentialHandle;
use crate::keys::KeyTransport;

/// KMS client bound to one region and credential source.
#[derive(Debug, Clone)]
pub struct KmsTransport {
    client: aws_sdk_kms::Client,
}

impl KmsTransport {
    /// Build the SDK client. No request is made until the first wrap/unwrap.
    ///
    /// `endpoint` overrides the service URL (e.g. a LocalStack instance).
    pub async fn connect(
        credentials: &CredentialHandle,
        region: &str,
        endpoint: Option<&str>,
    ) -> Self {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_owned()));
        let shared = credentials.configure(loader).load().await;

        let mut builder = aws_sdk_kms::config::Builder::from(&shared);
        if let Some(url) = endpoint {
            builder = builder.endpoint_url(url);
        }
        debug!(region, strategy = ?credentials.strategy(), "kms client configured");
        Self::from_client(aws_sdk_kms::Client::from_conf(builder.build()))
    }

    pub fn from_client(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

/// KMS rejects an empty context map, so none is sent instead.
fn sdk_context(context: &EncryptionContext) -> Option<HashMap<String, String>> {
    if context.is_empty() {
        None
    } else {
        Some(
            context
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        )
    }
}

#[async_trait]
impl KeyTransport for KmsTransport {
    async fn wrap_key(
        &self,
        key_id: &str,
        raw_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError> {
        let resp = self
            .client
            .encrypt()
            .key_id(key_id)
            .plaintext(Blob::new(raw_key.to_vec()))
            .set_encryption_context(sdk_context(context))
            .send()
            .await
            .map_err(|e| CodecError::key_access(key_id, DisplayErrorContext(&e)))?;

        resp.ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| {
                CodecError::key_access(key_id, "KMS encrypt response contained no ciphertext")
            })
    }

    async fn unwrap_key(
        &self,
        key_id: &str,
        wrapped: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError> {
        let resp = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(wrapped.to_vec()))
            .set_encryption_context(sdk_context(context))
            .send()
            .await
            .map_err(|e| CodecError::key_access(key_id, DisplayErrorContext(&e)))?;

        resp.plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| {
                CodecError::key_access(key_id, "KMS decrypt response contained no plaintext")
            })
    }
}
