//! # attrvault
//!
//! Attribute-policy gated envelope encryption for stored files.
//!
//! Every uploaded file is sealed under its own 256-bit data key with
//! AES-256-GCM. Data keys are held by a custodian that wraps them under a
//! master key. A download only reaches the custodian after the requester's
//! attribute set satisfies the file's access policy.
//!
//! ## Public API
//!
//! `FileVault` is the entry point. The crypto engine, policy evaluator and
//! storage traits are public so callers can plug in their own backends and
//! evaluate policies without a vault. Raw key bytes never leave the crate.

pub mod audit;
pub mod config;
pub mod crypto;
pub mod custodian;
pub mod error;
pub mod keys;
pub mod policy;
pub mod principal;
pub mod record;
pub mod store;
pub mod vault;

pub use error::{PublicErrorKind, Result, VaultError};
pub use keys::MasterKey;
pub use policy::{satisfies, AccessPolicy, AttributeSet};
pub use principal::{Principal, PrincipalDirectory, PrincipalRole};
pub use record::{ChallengeDescriptor, DownloadedFile, FileId, FileRecord};
pub use vault::{FileVault, FileVaultBuilder};

/// Generate a cryptographically secure master key for the key custodian.
///
/// In production, source master keys from a KMS or sealed keystore instead.
pub fn generate_master_key() -> Result<MasterKey> {
    let bytes = crypto::generate_random_key()?;
    Ok(MasterKey::from_bytes(bytes))
}
