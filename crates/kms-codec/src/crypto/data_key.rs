//! [`DataKey`]: the raw per-envelope symmetric key.

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::cipher::{CipherError, KEY_LEN};

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which plaintext key material lives in RAM.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey(Box<[u8; KEY_LEN]>);

impl DataKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut buf = Box::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut buf[..]);
        Self(buf)
    }

    /// Copy `bytes` into a new key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] unless `bytes` is [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Zeroize for DataKey {
    fn zeroize(&mut self) {
        self.0.as_mut_slice().zeroize();
    }
}

impl Drop for DataKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for DataKey {}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("DataKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(DataKey::generate(), DataKey::generate());
    }

    #[test]
    fn from_slice_round_trips() {
        let raw = [0x42u8; KEY_LEN];
        assert_eq!(DataKey::from_slice(&raw).unwrap().as_bytes(), &raw[..]);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            DataKey::from_slice(&[0u8; 16]),
            Err(CipherError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn zeroize_clears_key_material() {
        fn zeroed_on_drop<T: ZeroizeOnDrop>() {}
        zeroed_on_drop::<DataKey>();

        let mut dk = DataKey::generate();
        dk.zeroize();
        assert_eq!(dk.as_bytes(), &[0u8; KEY_LEN][..]);
    }

    #[test]
    fn redacted_in_debug() {
        let dk = DataKey::from_slice(&[0xFF; KEY_LEN]).unwrap();
        let out = format!("{dk:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("255"));
    }
}
