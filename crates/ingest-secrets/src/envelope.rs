use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine as _;
use rand::RngCore;

use crate::error::SecretsError;

/// Marks a string as ciphertext produced by [`Encryptor::encrypt`]. Anything
/// without this prefix is treated as plaintext — `encrypt_map`/`decrypt_map`
/// both no-op on it rather than double-encrypting or failing.
const MARKER: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

/// Process-wide AES-256-GCM encryptor. The key is loaded once at startup and
/// never logged.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        Self { cipher }
    }

    /// Decode a base64-encoded 32-byte key, e.g. from `ENCRYPTION_KEY`.
    pub fn from_base64(encoded: &str) -> Result<Self, SecretsError> {
        let bytes = b64
            .decode(encoded.trim())
            .map_err(|e| SecretsError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SecretsError::InvalidKey("key must decode to exactly 32 bytes".into()))?;
        Ok(Self::new(key))
    }

    /// Generate a fresh random key and return it base64-encoded, suitable for
    /// `ENCRYPTION_KEY`. Used by the `generate-encryption-key` CLI subcommand.
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        b64.encode(key)
    }

    /// True if `value` already carries the ciphertext marker.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(MARKER)
    }

    /// Encrypt a plaintext string. No-op (returns the input unchanged) if it
    /// already carries the ciphertext marker.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretsError> {
        if Self::is_encrypted(plaintext) {
            return Ok(plaintext.to_string());
        }
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SecretsError::CiphertextInvalid)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{MARKER}{}", b64.encode(payload)))
    }

    /// Decrypt a value produced by [`Self::encrypt`]. No-op (returns the
    /// input unchanged) if it does not carry the ciphertext marker.
    pub fn decrypt(&self, value: &str) -> Result<String, SecretsError> {
        let Some(encoded) = value.strip_prefix(MARKER) else {
            return Ok(value.to_string());
        };
        let payload = b64
            .decode(encoded)
            .map_err(|_| SecretsError::CiphertextInvalid)?;
        if payload.len() < NONCE_LEN {
            return Err(SecretsError::CiphertextInvalid);
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SecretsError::CiphertextInvalid)?;
        String::from_utf8(plaintext).map_err(|_| SecretsError::CiphertextInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_encryptor() -> Encryptor {
        Encryptor::new([7u8; 32])
    }

    #[test]
    fn round_trips() {
        let enc = test_encryptor();
        let ct = enc.encrypt("s3cr3t").unwrap();
        assert!(Encryptor::is_encrypted(&ct));
        assert_eq!(enc.decrypt(&ct).unwrap(), "s3cr3t");
    }

    #[test]
    fn encrypt_is_noop_on_already_encrypted() {
        let enc = test_encryptor();
        let ct = enc.encrypt("s3cr3t").unwrap();
        let ct2 = enc.encrypt(&ct).unwrap();
        assert_eq!(ct, ct2);
    }

    #[test]
    fn decrypt_is_noop_on_plaintext() {
        let enc = test_encryptor();
        assert_eq!(enc.decrypt("plain").unwrap(), "plain");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let enc = test_encryptor();
        let mut ct = enc.encrypt("s3cr3t").unwrap();
        ct.push('x');
        assert!(matches!(enc.decrypt(&ct), Err(SecretsError::CiphertextInvalid)));
    }

    #[test]
    fn wrong_key_fails_auth() {
        let a = Encryptor::new([1u8; 32]);
        let b = Encryptor::new([2u8; 32]);
        let ct = a.encrypt("s3cr3t").unwrap();
        assert!(matches!(b.decrypt(&ct), Err(SecretsError::CiphertextInvalid)));
    }

    #[test]
    fn generated_key_round_trips() {
        let key = Encryptor::generate_key();
        let enc = Encryptor::from_base64(&key).unwrap();
        let ct = enc.encrypt("hunter2").unwrap();
        assert_eq!(enc.decrypt(&ct).unwrap(), "hunter2");
    }
}
