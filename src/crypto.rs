//! Envelope crypto engine.
//!
//! One of exactly two modules that import `ring` directly (the other is
//! `keys`). Everything else encrypts and decrypts through the functions here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption, no associated data)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//!
//! # Persisted layout
//! ```text
//! [ nonce (12 bytes) ][ ciphertext + GCM tag (16 bytes) ]
//! ```

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};
use crate::keys::DataKey;

const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Size of a data or master key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// An encrypted file body: the nonce it was sealed under plus the
/// authenticated ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext with the GCM tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Serialise as `nonce || ciphertext_with_tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a persisted envelope.
    ///
    /// Anything shorter than a nonce plus a tag cannot be authentic and is
    /// rejected as an integrity failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::IntegrityError);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| VaultError::IntegrityError)?;
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| VaultError::RandomnessFailure)
}

fn less_safe_key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| VaultError::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

/// Generate a fresh 256-bit data encryption key.
pub fn generate_key() -> Result<DataKey> {
    let mut bytes = [0u8; KEY_LEN];
    fill_random(&mut bytes)?;
    Ok(DataKey::from_bytes(bytes))
}

/// Generate raw random key bytes. Used for master keys.
pub(crate) fn generate_random_key() -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    fill_random(&mut key)?;
    Ok(key)
}

/// Encrypt `plaintext` under `key` with a freshly drawn nonce.
pub fn encrypt(key: &DataKey, plaintext: &[u8]) -> Result<Envelope> {
    encrypt_raw(key.as_bytes(), plaintext)
}

/// Decrypt an envelope. Fails closed with `IntegrityError`; the caller
/// never receives partial plaintext.
pub fn decrypt(key: &DataKey, envelope: &Envelope) -> Result<Vec<u8>> {
    decrypt_raw(key.as_bytes(), envelope)
}

pub(crate) fn encrypt_raw(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Envelope> {
    let key = less_safe_key(key_bytes)?;

    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;

    let mut in_out = Vec::with_capacity(plaintext.len() + ALGORITHM.tag_len());
    in_out.extend_from_slice(plaintext);
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        aead::Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| VaultError::EncryptionFailure)?;

    Ok(Envelope {
        nonce,
        ciphertext: in_out,
    })
}

pub(crate) fn decrypt_raw(key_bytes: &[u8; KEY_LEN], envelope: &Envelope) -> Result<Vec<u8>> {
    if envelope.ciphertext.len() < TAG_LEN {
        return Err(VaultError::IntegrityError);
    }
    let key = less_safe_key(key_bytes)?;

    let mut payload = envelope.ciphertext.clone();
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(envelope.nonce),
            aead::Aad::empty(),
            &mut payload,
        )
        .map_err(|_| VaultError::IntegrityError)?;

    Ok(plaintext.to_vec())
}
