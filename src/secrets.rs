//! At-rest encryption for webhook authorization headers.
//!
//! Stored form is base64 of `nonce (12) || ciphertext || tag` under
//! AES-256-GCM with the process master key. An empty header is stored as
//! the empty string.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

pub type MasterKey = [u8; 32];

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("stored secret is not valid base64")]
    Encoding(#[from] base64::DecodeError),

    #[error("stored secret is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("cipher failure (wrong master key or corrupted value)")]
    Cipher,

    #[error("decrypted secret is not utf-8")]
    NotUtf8(#[from] std::string::FromUtf8Error),
}

/// 64 hex chars.
pub fn parse_master_key(hex_str: &str) -> anyhow::Result<MasterKey> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| anyhow::anyhow!("FORGE_MASTER_KEY is not hex: {e}"))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("FORGE_MASTER_KEY must decode to 32 bytes, got {len}"))
}

/// Fixed key for local runs and tests.
pub fn dev_master_key() -> MasterKey {
    let mut key = [0u8; 32];
    key.copy_from_slice(&Sha256::digest(b"forge-webhooks-dev-master-key"));
    key
}

pub fn resolve_master_key(configured: Option<&str>) -> anyhow::Result<MasterKey> {
    match configured {
        Some(hex_str) => parse_master_key(hex_str),
        None => {
            tracing::warn!("FORGE_MASTER_KEY not set, using development key");
            Ok(dev_master_key())
        }
    }
}

pub fn encrypt_to_string(plaintext: &str, key: &MasterKey) -> Result<String, SecretError> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let mut nonce = [0u8; NONCE_LEN];
    rand::fill(&mut nonce);
    let sealed = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| SecretError::Cipher)?;

    let mut raw = nonce.to_vec();
    raw.extend_from_slice(&sealed);
    Ok(BASE64.encode(raw))
}

pub fn decrypt_from_string(stored: &str, key: &MasterKey) -> Result<String, SecretError> {
    if stored.is_empty() {
        return Ok(String::new());
    }

    let raw = BASE64.decode(stored)?;
    if raw.len() < NONCE_LEN {
        return Err(SecretError::Truncated(raw.len()));
    }
    let (nonce, sealed) = raw.split_at(NONCE_LEN);
    let plain = cipher(key)?
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| SecretError::Cipher)?;
    Ok(String::from_utf8(plain)?)
}

fn cipher(key: &MasterKey) -> Result<Aes256Gcm, SecretError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| SecretError::Cipher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_and_hides_plaintext() {
        let key = dev_master_key();
        let stored = encrypt_to_string("Bearer abc", &key).unwrap();
        assert!(!stored.contains("Bearer"));
        assert_eq!(decrypt_from_string(&stored, &key).unwrap(), "Bearer abc");
    }

    #[test]
    fn fresh_nonce_per_value() {
        let key = dev_master_key();
        assert_ne!(
            encrypt_to_string("same", &key).unwrap(),
            encrypt_to_string("same", &key).unwrap()
        );
    }

    #[test]
    fn empty_stays_empty() {
        let key = dev_master_key();
        assert_eq!(encrypt_to_string("", &key).unwrap(), "");
        assert_eq!(decrypt_from_string("", &key).unwrap(), "");
    }

    #[test]
    fn wrong_key_is_cipher_error() {
        let stored = encrypt_to_string("secret", &dev_master_key()).unwrap();
        assert!(matches!(
            decrypt_from_string(&stored, &[7u8; 32]),
            Err(SecretError::Cipher)
        ));
    }

    #[test]
    fn corrupt_values_rejected() {
        let key = dev_master_key();
        assert!(matches!(
            decrypt_from_string("%%%not-base64", &key),
            Err(SecretError::Encoding(_))
        ));
        assert!(matches!(
            decrypt_from_string(&BASE64.encode([1, 2, 3]), &key),
            Err(SecretError::Truncated(3))
        ));
    }

    #[test]
    fn master_key_parsing() {
        assert_eq!(parse_master_key(&"ab".repeat(32)).unwrap(), [0xab; 32]);
        assert!(parse_master_key("abcd").is_err());
        assert!(parse_master_key("zz").is_err());
    }
}
