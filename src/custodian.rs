//! Key custody.
//!
//! The custodian is the trust boundary for data keys. Keys never rest in
//! plaintext: each one is sealed under a wrapping key derived from the
//! custodian's master key and the file id, and only the wrapped envelope
//! reaches the injected `KeyStore`.

use std::sync::Arc;

use crate::crypto::{self, Envelope};
use crate::error::{Result, VaultError};
use crate::keys::{self, DataKey, MasterKey};
use crate::store::KeyStore;

pub struct KeyCustodian {
    master: MasterKey,
    store: Arc<dyn KeyStore>,
}

impl std::fmt::Debug for KeyCustodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCustodian")
            .field("master", &self.master)
            .finish_non_exhaustive()
    }
}

impl KeyCustodian {
    pub fn new(master: MasterKey, store: Arc<dyn KeyStore>) -> Self {
        Self { master, store }
    }

    /// Wrap and persist the data key for `file_id`.
    pub fn store(&self, file_id: &str, key: &DataKey) -> Result<()> {
        let wrapping = keys::derive_wrapping_key(&self.master, file_id)?;
        let wrapped = crypto::encrypt_raw(wrapping.as_bytes(), key.as_bytes())?;
        self.store.put(file_id, wrapped.to_bytes())
    }

    /// Fetch and unwrap the data key for `file_id`.
    ///
    /// A missing entry is `KeyNotFound`; a wrapped key that fails to
    /// authenticate (tampered, or copied from another file id) is
    /// `IntegrityError`.
    pub fn fetch(&self, file_id: &str) -> Result<DataKey> {
        let wrapped = self
            .store
            .get(file_id)?
            .ok_or_else(|| VaultError::KeyNotFound(file_id.to_string()))?;

        let envelope = Envelope::from_bytes(&wrapped)?;
        let wrapping = keys::derive_wrapping_key(&self.master, file_id)?;
        let mut raw = crypto::decrypt_raw(wrapping.as_bytes(), &envelope)?;
        let key = DataKey::from_slice(&raw);
        zeroize::Zeroize::zeroize(&mut raw);
        key
    }

    /// Remove the key for `file_id`. Later fetches fail with `KeyNotFound`.
    pub fn revoke(&self, file_id: &str) -> Result<()> {
        self.store.remove(file_id)
    }
}
