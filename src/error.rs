use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Container has no owner key block")]
    MissingOwnerBlock,

    #[error("No key block matches the caller's public key")]
    NoRecipientBlock,

    #[error("Grant signature verification failed")]
    SignatureVerificationFailed,

    #[error("Recipient grant timestamp outside the accepted window")]
    ReplayAttackDetected,

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Contact is not verified")]
    ContactNotVerified,

    #[error("No identity has been provisioned on this device")]
    IdentityNotFound,

    #[error("Identity initialization failed: {0}")]
    IdentityInit(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Key store item not found: {0}")]
    KeyStoreNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
