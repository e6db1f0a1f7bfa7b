//! Key material and wrapping-key derivation.
//!
//! This module owns two responsibilities:
//! 1. Holding key material in types that are opaque, non-cloneable and
//!    zeroised on drop.
//! 2. Deriving the per-file wrapping key the custodian uses to keep data keys
//!    encrypted at rest.
//!
//! ## Derivation structure
//!
//! ```text
//! HKDF-SHA256(
//!     ikm  = master_key,
//!     salt = None,
//!     info = "attrvault:dek-wrap:{file_id}"
//! )
//! ```
//!
//! A wrapped data key is bound to its file id: unwrapping it under any other
//! id derives a different key and fails authentication.

use ring::hkdf;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;
use crate::error::{Result, VaultError};

const WRAP_INFO_PREFIX: &str = "attrvault:dek-wrap";

// ---------------------------------------------------------------------------
// Master key
// ---------------------------------------------------------------------------

/// The custodian's root secret. Every wrapping key is derived from it.
///
/// - Not `Clone`.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Construct a `MasterKey` from raw bytes.
    ///
    /// In production these bytes should come from a KMS or sealed keystore;
    /// `crate::generate_master_key()` draws them from the system RNG.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Data key
// ---------------------------------------------------------------------------

/// A per-file data encryption key.
///
/// Only the custodian hands these out, and only on the vault's decrypt path.
/// Raw bytes are `pub(crate)`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; KEY_LEN],
}

impl DataKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Rebuild a key from an unwrapped buffer. A length mismatch means the
    /// stored blob was not a data key.
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::IntegrityError)?;
        Ok(Self { bytes })
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// A wrapping key scoped to one file id. Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct WrappingKey {
    bytes: [u8; KEY_LEN],
}

impl WrappingKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// Derive the wrapping key for `file_id`.
pub(crate) fn derive_wrapping_key(master: &MasterKey, file_id: &str) -> Result<WrappingKey> {
    let info = format!("{}:{}", WRAP_INFO_PREFIX, file_id);

    // Empty salt: HKDF treats it as a zero-filled salt of the hash length.
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(master.as_bytes());

    let info_slices = [info.as_bytes()];
    let okm = prk
        .expand(&info_slices, hkdf::HKDF_SHA256)
        .map_err(|_| VaultError::KeyDerivationFailure)?;

    let mut derived = [0u8; KEY_LEN];
    okm.fill(&mut derived)
        .map_err(|_| VaultError::KeyDerivationFailure)?;

    Ok(WrappingKey { bytes: derived })
}
