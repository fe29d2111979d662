//! Authenticated encryption of stored connection strings.
//!
//! The key is the SHA-256 digest of the configured secret. Ciphertexts are
//! stored as `base64(nonce):base64(ciphertext)`; AES-256-GCM appends the tag to
//! the ciphertext, so any modification makes [`SecretBox::decrypt`] fail.

use crate::error::{DbError, DbResult};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Encrypts and decrypts connection strings with one process-wide key.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl SecretBox {
    pub fn new(secret: &str) -> DbResult<Self> {
        if secret.is_empty() {
            return Err(DbError::encryption("encryption secret must not be empty"));
        }
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| DbError::encryption(format!("invalid key: {}", e)))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> DbResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| DbError::encryption("encryption failed"))?;
        Ok(format!(
            "{}:{}",
            STANDARD.encode(nonce),
            STANDARD.encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, sealed: &str) -> DbResult<String> {
        let (nonce_b64, ciphertext_b64) = sealed
            .split_once(':')
            .ok_or_else(|| DbError::encryption("malformed ciphertext"))?;

        let nonce_bytes = STANDARD
            .decode(nonce_b64)
            .map_err(|_| DbError::encryption("malformed nonce"))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(DbError::encryption("malformed nonce"));
        }
        let ciphertext = STANDARD
            .decode(ciphertext_b64)
            .map_err(|_| DbError::encryption("malformed ciphertext"))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| {
                DbError::encryption("decryption failed: ciphertext was modified or the key changed")
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| DbError::encryption("decrypted value is not valid UTF-8"))
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}
