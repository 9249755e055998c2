//! [`EnvelopeBlob`]: framing of context, wrapped keys and sealed payload.

use bytes::{Buf, BufMut, BytesMut};
use common::EncryptionContext;

use super::cipher::{self, CipherError, MESSAGE_ID_LEN, NONCE_LEN, TAG_LEN};
use super::DataKey;
use crate::keys::WrappedKey;

/// Leading bytes of every blob.
pub const MAGIC: &[u8; 2] = b"KE";

/// Current format version.
pub const FORMAT_VERSION: u8 = 0x01;

/// AES-256-GCM-SIV with an HMAC-SHA256 derived per-message key.
pub const ALG_AES256_GCM_SIV_HMAC_SHA256: u8 = 0x01;

/// A parsed or freshly sealed envelope.
///
/// Immutable once built; [`EnvelopeBlob::to_bytes`] reproduces the exact wire
/// bytes it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeBlob {
    message_id: [u8; MESSAGE_ID_LEN],
    context: EncryptionContext,
    wrapped_keys: Vec<WrappedKey>,
    /// Serialised header; the AEAD associated data.
    header: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EnvelopeBlob {
    /// Seal `plaintext` under `data_key`, embedding `context` and `wrapped_keys`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] if `wrapped_keys` is empty and
    /// [`CipherError::FieldTooLong`] if a header field exceeds its u16 prefix.
    pub fn seal(
        data_key: &DataKey,
        context: &EncryptionContext,
        wrapped_keys: &[WrappedKey],
        plaintext: &[u8],
    ) -> Result<Self, CipherError> {
        if wrapped_keys.is_empty() {
            return Err(CipherError::InvalidFormat("no wrapped data keys"));
        }
        let message_id = *uuid::Uuid::new_v4().as_bytes();
        let header = encode_header(&message_id, context, wrapped_keys)?;
        let (nonce, ciphertext) = cipher::seal(data_key, &message_id, plaintext, &header)?;
        Ok(Self {
            message_id,
            context: context.clone(),
            wrapped_keys: wrapped_keys.to_vec(),
            header,
            nonce,
            ciphertext,
        })
    }

    /// Parse wire bytes. Does not authenticate; see [`EnvelopeBlob::open`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] on any structural defect.
    pub fn parse(bytes: &[u8]) -> Result<Self, CipherError> {
        let mut buf = bytes;

        if buf.remaining() < MAGIC.len() || &buf[..MAGIC.len()] != MAGIC {
            return Err(CipherError::InvalidFormat("missing magic"));
        }
        buf.advance(MAGIC.len());

        if take_u8(&mut buf)? != FORMAT_VERSION {
            return Err(CipherError::InvalidFormat("unsupported version"));
        }
        if take_u8(&mut buf)? != ALG_AES256_GCM_SIV_HMAC_SHA256 {
            return Err(CipherError::InvalidFormat("unsupported algorithm"));
        }

        let mut message_id = [0u8; MESSAGE_ID_LEN];
        take_exact(&mut buf, &mut message_id)?;

        let pair_count = take_u16(&mut buf)?;
        let mut context = EncryptionContext::new();
        for _ in 0..pair_count {
            let key = take_string(&mut buf)?;
            let value = take_string(&mut buf)?;
            if context.insert(key, value).is_some() {
                return Err(CipherError::InvalidFormat("duplicate context key"));
            }
        }

        let key_count = take_u16(&mut buf)?;
        if key_count == 0 {
            return Err(CipherError::InvalidFormat("no wrapped data keys"));
        }
        let mut wrapped_keys = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            let key_id = take_string(&mut buf)?;
            let ciphertext = take_bytes(&mut buf)?;
            wrapped_keys.push(WrappedKey::new(key_id, ciphertext));
        }

        let header_len = bytes.len() - buf.remaining();
        let header = bytes[..header_len].to_vec();

        let mut nonce = [0u8; NONCE_LEN];
        take_exact(&mut buf, &mut nonce)?;

        if buf.remaining() < TAG_LEN {
            return Err(CipherError::InvalidFormat("truncated ciphertext"));
        }
        let ciphertext = buf.to_vec();

        Ok(Self {
            message_id,
            context,
            wrapped_keys,
            header,
            nonce,
            ciphertext,
        })
    }

    /// Authenticate and decrypt the payload with the unwrapped `data_key`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AeadFailure`] on tampering or a wrong key.
    pub fn open(&self, data_key: &DataKey) -> Result<Vec<u8>, CipherError> {
        cipher::open(
            data_key,
            &self.message_id,
            &self.nonce,
            &self.ciphertext,
            &self.header,
        )
    }

    /// Wire representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn message_id(&self) -> &[u8; MESSAGE_ID_LEN] {
        &self.message_id
    }

    /// The context the blob declares. Unverified until [`EnvelopeBlob::open`] succeeds.
    pub fn context(&self) -> &EncryptionContext {
        &self.context
    }

    pub fn wrapped_keys(&self) -> &[WrappedKey] {
        &self.wrapped_keys
    }
}

fn encode_header(
    message_id: &[u8; MESSAGE_ID_LEN],
    context: &EncryptionContext,
    wrapped_keys: &[WrappedKey],
) -> Result<Vec<u8>, CipherError> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(MAGIC);
    buf.put_u8(FORMAT_VERSION);
    buf.put_u8(ALG_AES256_GCM_SIV_HMAC_SHA256);
    buf.put_slice(message_id);

    buf.put_u16(len_u16(context.len(), "encryption context")?);
    for (key, value) in context.iter() {
        put_framed(&mut buf, key.as_bytes(), "context key")?;
        put_framed(&mut buf, value.as_bytes(), "context value")?;
    }

    buf.put_u16(len_u16(wrapped_keys.len(), "wrapped key list")?);
    for wrapped in wrapped_keys {
        put_framed(&mut buf, wrapped.key_id.as_bytes(), "key id")?;
        put_framed(&mut buf, &wrapped.ciphertext, "wrapped key")?;
    }
    Ok(buf.to_vec())
}

fn len_u16(len: usize, field: &'static str) -> Result<u16, CipherError> {
    u16::try_from(len).map_err(|_| CipherError::FieldTooLong(field))
}

fn put_framed(buf: &mut BytesMut, bytes: &[u8], field: &'static str) -> Result<(), CipherError> {
    buf.put_u16(len_u16(bytes.len(), field)?);
    buf.put_slice(bytes);
    Ok(())
}

fn take_u8(buf: &mut &[u8]) -> Result<u8, CipherError> {
    if buf.remaining() < 1 {
        return Err(CipherError::InvalidFormat("truncated header"));
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8]) -> Result<u16, CipherError> {
    if buf.remaining() < 2 {
        return Err(CipherError::InvalidFormat("truncated header"));
    }
    Ok(buf.get_u16())
}

fn take_exact(buf: &mut &[u8], out: &mut [u8]) -> Result<(), CipherError> {
    if buf.remaining() < out.len() {
        return Err(CipherError::InvalidFormat("truncated header"));
    }
    buf.copy_to_slice(out);
    Ok(())
}

fn take_bytes(buf: &mut &[u8]) -> Result<Vec<u8>, CipherError> {
    let len = take_u16(buf)? as usize;
    let mut out = vec![0u8; len];
    take_exact(buf, &mut out)?;
    Ok(out)
}

fn take_string(buf: &mut &[u8]) -> Result<String, CipherError> {
    String::from_utf8(take_bytes(buf)?)
        .map_err(|_| CipherError::InvalidFormat("header string is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(context: &EncryptionContext) -> (DataKey, EnvelopeBlob) {
        let dk = DataKey::generate();
        let wrapped = vec![
            WrappedKey::new("alias/a", vec![1, 2, 3]),
            WrappedKey::new("alias/b", vec![4, 5]),
        ];
        let blob = EnvelopeBlob::seal(&dk, context, &wrapped, b"payload").unwrap();
        (dk, blob)
    }

    fn ctx() -> EncryptionContext {
        [("tenant", "acme"), ("env", "prod")].into_iter().collect()
    }

    #[test]
    fn seal_parse_open() {
        let (dk, blob) = sample(&ctx());
        let bytes = blob.to_bytes();
        assert_eq!(&bytes[..2], MAGIC);

        let parsed = EnvelopeBlob::parse(&bytes).unwrap();
        assert_eq!(parsed, blob);
        assert_eq!(parsed.context().get("tenant"), Some("acme"));
        assert_eq!(parsed.wrapped_keys().len(), 2);
        assert_eq!(parsed.open(&dk).unwrap(), b"payload");
    }

    #[test]
    fn message_ids_are_unique() {
        let (_, a) = sample(&ctx());
        let (_, b) = sample(&ctx());
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn plain_text_is_rejected() {
        assert!(matches!(
            EnvelopeBlob::parse(b"some_data"),
            Err(CipherError::InvalidFormat(_))
        ));
        assert!(EnvelopeBlob::parse(b"").is_err());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let (_, blob) = sample(&ctx());
        let mut bytes = blob.to_bytes();
        bytes[2] = 0x7F;
        assert!(matches!(
            EnvelopeBlob::parse(&bytes),
            Err(CipherError::InvalidFormat("unsupported version"))
        ));
    }

    #[test]
    fn every_truncation_is_rejected() {
        let (_, blob) = sample(&ctx());
        let bytes = blob.to_bytes();
        for len in 0..bytes.len() - TAG_LEN {
            assert!(EnvelopeBlob::parse(&bytes[..len]).is_err(), "len {len}");
        }
    }

    #[test]
    fn tampered_context_fails_authentication() {
        let (dk, blob) = sample(&ctx());
        let mut bytes = blob.to_bytes();
        // "acme" → "acmf": still parses, but the AAD no longer matches.
        let pos = bytes.windows(4).position(|w| w == b"acme").unwrap();
        bytes[pos + 3] = b'f';
        let parsed = EnvelopeBlob::parse(&bytes).unwrap();
        assert_eq!(parsed.context().get("tenant"), Some("acmf"));
        assert!(matches!(parsed.open(&dk), Err(CipherError::AeadFailure)));
    }

    #[test]
    fn empty_context_is_allowed() {
        let (dk, blob) = sample(&EncryptionContext::new());
        let parsed = EnvelopeBlob::parse(&blob.to_bytes()).unwrap();
        assert!(parsed.context().is_empty());
        assert_eq!(parsed.open(&dk).unwrap(), b"payload");
    }

    #[test]
    fn seal_requires_a_wrapped_key() {
        let err = EnvelopeBlob::seal(&DataKey::generate(), &ctx(), &[], b"x").unwrap_err();
        assert!(matches!(err, CipherError::InvalidFormat(_)));
    }
}
