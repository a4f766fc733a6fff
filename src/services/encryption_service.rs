//! AES-256-GCM Encryption Service
//!
//! Authenticated encryption for connection credentials at rest. Integration
//! configurations store their connection parameters as an opaque encrypted
//! blob; this service is the only component that opens it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore as _;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key")]
    InvalidKey,

    #[error("Invalid ciphertext format")]
    InvalidFormat,

    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Thread-safe, can be cloned and shared across tasks.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Create from a base64-encoded key; must decode to exactly 32 bytes.
    pub fn new(base64_key: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(base64_key)
            .map_err(|_| EncryptionError::InvalidKey)?;

        if key_bytes.len() != 32 {
            return Err(EncryptionError::InvalidKey);
        }

        let cipher =
            Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| EncryptionError::InvalidKey)?;

        Ok(Self { cipher })
    }

    /// Encrypt plaintext; returns base64(nonce || ciphertext || tag).
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        // 96-bit nonce, unique per encryption
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    /// Decrypt base64(nonce || ciphertext || tag) back to plaintext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let combined = BASE64
            .decode(ciphertext)
            .map_err(|_| EncryptionError::InvalidFormat)?;

        // nonce (12) + tag (16) minimum
        if combined.len() < 28 {
            return Err(EncryptionError::InvalidFormat);
        }

        let (nonce_bytes, encrypted_data) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, encrypted_data)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::InvalidFormat)
    }

    /// Serialize a value to JSON and encrypt it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_string(value)?;
        self.encrypt(&json)
    }

    /// Decrypt and deserialize a JSON blob.
    pub fn decrypt_json<T: DeserializeOwned>(&self, ciphertext: &str) -> Result<T> {
        let json = self.decrypt(ciphertext)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> EncryptionService {
        let key = BASE64.encode([7u8; 32]);
        EncryptionService::new(&key).unwrap()
    }

    #[test]
    fn round_trip() {
        let service = test_service();
        let ciphertext = service.encrypt("secret credentials").unwrap();
        assert_ne!(ciphertext, "secret credentials");
        assert_eq!(service.decrypt(&ciphertext).unwrap(), "secret credentials");
    }

    #[test]
    fn unique_nonce_per_encryption() {
        let service = test_service();
        let a = service.encrypt("same input").unwrap();
        let b = service.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_key() {
        let key = BASE64.encode([1u8; 16]);
        assert!(EncryptionService::new(&key).is_err());
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let service = test_service();
        let ciphertext = service.encrypt("payload").unwrap();
        let mut bytes = BASE64.decode(&ciphertext).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(service.decrypt(&BASE64.encode(&bytes)).is_err());
    }

    #[test]
    fn json_round_trip() {
        let service = test_service();
        let value = serde_json::json!({"username": "svc", "password": "pw"});
        let blob = service.encrypt_json(&value).unwrap();
        let back: serde_json::Value = service.decrypt_json(&blob).unwrap();
        assert_eq!(back, value);
    }
}
