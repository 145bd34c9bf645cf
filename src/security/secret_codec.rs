//! AES-256-GCM codec for user API keys at rest

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Ciphertext plus tag and the nonce it was sealed with, both base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub encrypted: String,
    pub iv: String,
}

/// Process-wide codec holding the 32-byte key
#[derive(Clone)]
pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// Build from a 64-character hex key
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let hex_key = hex_key.trim();
        if hex_key.len() != KEY_LEN * 2 {
            return Err(AppError::ConfigurationFatal(
                "Encryption key must be 64 hex characters (32 bytes)".to_string(),
            ));
        }
        let key = hex::decode(hex_key)
            .map_err(|e| AppError::ConfigurationFatal(format!("Invalid encryption key: {}", e)))?;
        Self::from_key_bytes(&key)
    }

    pub fn from_key_bytes(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(AppError::ConfigurationFatal(format!(
                "Encryption key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AppError::ConfigurationFatal(format!("Invalid encryption key: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Seal `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal("Failed to encrypt secret".to_string()))?;

        Ok(EncryptedSecret {
            encrypted: STANDARD.encode(sealed),
            iv: STANDARD.encode(nonce),
        })
    }

    /// Open a stored secret.
    ///
    /// Returns `Ok(None)` when either half is missing or empty. Anything that
    /// fails to authenticate is `TamperOrCorruption`.
    pub fn decrypt(&self, encrypted: Option<&str>, iv: Option<&str>) -> Result<Option<String>> {
        let (Some(encrypted), Some(iv)) = (
            encrypted.filter(|s| !s.is_empty()),
            iv.filter(|s| !s.is_empty()),
        ) else {
            return Ok(None);
        };

        let sealed = STANDARD
            .decode(encrypted)
            .map_err(|e| AppError::TamperOrCorruption(format!("ciphertext is not base64: {}", e)))?;
        let nonce = STANDARD
            .decode(iv)
            .map_err(|e| AppError::TamperOrCorruption(format!("iv is not base64: {}", e)))?;
        if nonce.len() != NONCE_LEN {
            return Err(AppError::TamperOrCorruption(format!(
                "iv must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            )));
        }

        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map_err(|_| AppError::TamperOrCorruption("authentication tag mismatch".to_string()))?;

        String::from_utf8(plain)
            .map(Some)
            .map_err(|_| AppError::TamperOrCorruption("plaintext is not UTF-8".to_string()))
    }

    pub fn decrypt_secret(&self, secret: &EncryptedSecret) -> Result<Option<String>> {
        self.decrypt(Some(&secret.encrypted), Some(&secret.iv))
    }
}
