//! Reversible encryption for sensitive text columns.
//!
//! The key is SHA-256 of the configured secret and the IV is the first 16
//! bytes of that same digest. The IV is therefore fixed for a given key, so
//! equal plaintexts always produce equal ciphertexts. This matches the format
//! of ciphertext already persisted by earlier deployments and must not change
//! without a versioned migration of stored values.

use std::fmt;

use aes::Aes256;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("ciphertext is not valid base64")]
    Encoding,
    #[error("ciphertext padding is invalid")]
    Padding,
    #[error("decrypted bytes are not valid utf-8")]
    Utf8,
}

#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; 32],
    iv: [u8; 16],
}

impl FieldCipher {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&digest[..16]);
        Self { key, iv }
    }

    /// Encrypt to standard base64. Empty input yields empty output.
    pub fn encrypt(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }
        let encryptor = Aes256CbcEnc::new(&self.key.into(), &self.iv.into());
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        STANDARD.encode(ciphertext)
    }

    /// Decrypt, reporting why a ciphertext was rejected.
    pub fn try_decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CipherError::Encoding)?;
        let decryptor = Aes256CbcDec::new(&self.key.into(), &self.iv.into());
        let plain = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
            .map_err(|_| CipherError::Padding)?;
        String::from_utf8(plain).map_err(|_| CipherError::Utf8)
    }

    /// Decrypt, mapping every failure to an empty string.
    ///
    /// Callers cannot tell corrupt input apart from an empty field; use
    /// [`FieldCipher::try_decrypt`] where that distinction matters.
    pub fn decrypt(&self, ciphertext: &str) -> String {
        match self.try_decrypt(ciphertext) {
            Ok(plain) => plain,
            Err(err) => {
                tracing::debug!(error = %err, "field decrypt failed");
                String::new()
            }
        }
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_non_empty_text() {
        let cipher = FieldCipher::new("unit-test-key");
        for value in ["a", "+1 555 0100", "ünïcødé ✓", &"x".repeat(100)] {
            let encrypted = cipher.encrypt(value);
            assert_ne!(encrypted, value);
            assert_eq!(cipher.decrypt(&encrypted), value);
        }
    }

    #[test]
    fn empty_values_pass_through() {
        let cipher = FieldCipher::new("unit-test-key");
        assert_eq!(cipher.encrypt(""), "");
        assert_eq!(cipher.decrypt(""), "");
    }

    #[test]
    fn fixed_iv_makes_encryption_deterministic() {
        let cipher = FieldCipher::new("unit-test-key");
        assert_eq!(cipher.encrypt("same"), cipher.encrypt("same"));
    }

    #[test]
    fn corrupt_ciphertext_collapses_to_empty() {
        let cipher = FieldCipher::new("unit-test-key");
        assert_eq!(cipher.try_decrypt("%%%"), Err(CipherError::Encoding));
        assert_eq!(cipher.decrypt("%%%"), "");
        // Valid base64, but not a whole number of AES blocks.
        assert_eq!(cipher.try_decrypt("AAAA"), Err(CipherError::Padding));
    }

    #[test]
    fn wrong_key_never_yields_the_plaintext() {
        let encrypted = FieldCipher::new("key-one").encrypt("patient record 42");
        let other = FieldCipher::new("key-two");
        assert_ne!(other.decrypt(&encrypted), "patient record 42");
    }
}
