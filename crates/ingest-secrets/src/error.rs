use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("encryption is not configured: no ENCRYPTION_KEY was supplied")]
    EncryptionNotConfigured,

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("ciphertext is invalid or has been tampered with")]
    CiphertextInvalid,
}
