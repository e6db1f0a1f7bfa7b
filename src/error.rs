//! Error types for attrvault.
//!
//! Every variant is a distinct failure mode of the vault. Messages are kept
//! minimal: they signal *what* failed without revealing key material or the
//! text of an underlying decryption failure.

use thiserror::Error;

use crate::record::FileId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// The single error type for all attrvault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The upload payload or an argument was malformed (empty bytes, too
    /// large, blank filename).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No file record exists for the given id.
    #[error("file not found: {0}")]
    NotFound(FileId),

    /// The requester's attributes do not satisfy the file's policy, or the
    /// actor is not allowed to perform a mutation.
    #[error("forbidden")]
    Forbidden,

    /// The custodian holds no key for the file. Treated as data loss and
    /// never retried.
    #[error("key not found for file: {0}")]
    KeyNotFound(FileId),

    /// AEAD authentication failed: wrong key, tampered or truncated envelope.
    #[error("integrity check failed")]
    IntegrityError,

    /// Key material was rejected by the cipher.
    #[error("invalid key")]
    InvalidKey,

    /// Encryption failed inside `ring`.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The system random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// HKDF wrapping-key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailure,

    /// A storage backend rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    /// The principal directory has no entry for the given id.
    #[error("principal not found: {0}")]
    PrincipalNotFound(String),
}

/// What a caller outside the core is allowed to learn about a failure.
///
/// `Forbidden` and `IntegrityError` collapse into `Denied` so a requester
/// cannot tell a policy rejection from a tampered blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicErrorKind {
    BadRequest,
    NotFound,
    Denied,
    Unavailable,
}

impl VaultError {
    /// Map this error to the outcome presented to an external caller.
    pub fn public_kind(&self) -> PublicErrorKind {
        match self {
            Self::InvalidInput(_) => PublicErrorKind::BadRequest,
            Self::NotFound(_) | Self::PrincipalNotFound(_) => PublicErrorKind::NotFound,
            Self::Forbidden | Self::IntegrityError => PublicErrorKind::Denied,
            _ => PublicErrorKind::Unavailable,
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Config(err.to_string())
    }
}
