//! AES-256-GCM-SIV sealing of envelope payloads.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant.
//! A cached data key may seal up to `max_entry_uses` payloads, so each payload
//! is sealed under its own message key, `HMAC-SHA256(data key, label ||
//! message id)`, with a fresh random nonce.
//!
//! **Do NOT substitute plain AES-256-GCM with a fixed nonce.** GCM nonce reuse
//! is catastrophic: it breaks both confidentiality and authentication.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use super::DataKey;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the AEAD authentication tag.
pub const TAG_LEN: usize = 16;

/// Byte length of a message identifier.
pub const MESSAGE_ID_LEN: usize = 16;

const MESSAGE_KEY_LABEL: &[u8] = b"kms-codec/v1 message key";

/// Errors produced by the cipher and blob layers.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key material has the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid data key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// AES-GCM-SIV authentication failed (wrong key or tampered data).
    #[error("aead operation failed")]
    AeadFailure,

    /// The payload is not a well-formed envelope blob.
    #[error("invalid envelope format: {0}")]
    InvalidFormat(&'static str),

    /// A header field does not fit its u16 length prefix.
    #[error("{0} too long for envelope header")]
    FieldTooLong(&'static str),
}

impl From<CipherError> for common::CodecError {
    fn from(e: CipherError) -> Self {
        common::CodecError::CryptoFormat(e.to_string())
    }
}

/// Seal `plaintext` under the message key for `message_id`, authenticating `aad`.
///
/// Returns the random nonce and the ciphertext with its appended tag.
pub fn seal(
    data_key: &DataKey,
    message_id: &[u8; MESSAGE_ID_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CipherError> {
    let cipher = message_cipher(data_key, message_id)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CipherError::AeadFailure)?;

    Ok((nonce_bytes, ciphertext))
}

/// Open a payload produced by [`seal`].
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] if authentication fails.
pub fn open(
    data_key: &DataKey,
    message_id: &[u8; MESSAGE_ID_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = message_cipher(data_key, message_id)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CipherError::AeadFailure)
}

fn message_cipher(
    data_key: &DataKey,
    message_id: &[u8; MESSAGE_ID_LEN],
) -> Result<Aes256GcmSiv, CipherError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(data_key.as_bytes())
        .map_err(|_| CipherError::InvalidKeyLength(data_key.as_bytes().len()))?;
    mac.update(MESSAGE_KEY_LABEL);
    mac.update(message_id);
    let mut okm = mac.finalize().into_bytes();
    let cipher = Aes256GcmSiv::new_from_slice(&okm)
        .map_err(|_| CipherError::InvalidKeyLength(okm.len()));
    okm.as_mut_slice().zeroize();
    cipher
}
