//! Storage abstractions for the vault.
//!
//! The vault never touches a concrete map or directory. It talks to three
//! injected backends:
//! - `ContentStore`: ciphertext blobs, addressed by `ContentRef`.
//! - `RecordRegistry`: file metadata, addressed by `FileId`.
//! - `KeyStore`: wrapped data keys, addressed by `FileId`.
//!
//! Each backend must give atomic per-key get/put semantics. In-memory
//! implementations are provided for all three, plus a filesystem content
//! store.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, VaultError};
use crate::record::{ContentRef, FileId, FileRecord};

/// Blob storage for encrypted file bodies.
pub trait ContentStore: Send + Sync {
    /// Write a blob. Overwrites any existing blob under the same locator.
    fn put(&self, content_ref: &ContentRef, blob: &[u8]) -> Result<()>;

    /// Read a blob, or `None` if nothing is stored under the locator.
    fn get(&self, content_ref: &ContentRef) -> Result<Option<Vec<u8>>>;

    /// Remove a blob. Removing a missing blob is not an error.
    fn delete(&self, content_ref: &ContentRef) -> Result<()>;
}

/// Metadata registry for file records.
pub trait RecordRegistry: Send + Sync {
    /// Insert a new record. Fails if the id is already taken.
    fn insert(&self, record: FileRecord) -> Result<()>;

    fn get(&self, file_id: &str) -> Result<Option<FileRecord>>;

    /// Replace the access policy of an existing record.
    fn update_policy(&self, file_id: &str, policy: &str) -> Result<()>;

    fn list(&self) -> Result<Vec<FileRecord>>;
}

/// Storage for wrapped (encrypted) data keys.
pub trait KeyStore: Send + Sync {
    fn put(&self, file_id: &str, wrapped: Vec<u8>) -> Result<()>;

    fn get(&self, file_id: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a wrapped key. Removing a missing key is not an error.
    fn remove(&self, file_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory backends
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<ContentRef, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, content_ref: &ContentRef, blob: &[u8]) -> Result<()> {
        self.blobs.write().insert(content_ref.clone(), blob.to_vec());
        Ok(())
    }

    fn get(&self, content_ref: &ContentRef) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(content_ref).cloned())
    }

    fn delete(&self, content_ref: &ContentRef) -> Result<()> {
        self.blobs.write().remove(content_ref);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: RwLock<HashMap<FileId, FileRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordRegistry for MemoryRegistry {
    fn insert(&self, record: FileRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.file_id) {
            return Err(VaultError::Storage(format!(
                "duplicate file id: {}",
                record.file_id
            )));
        }
        records.insert(record.file_id.clone(), record);
        Ok(())
    }

    fn get(&self, file_id: &str) -> Result<Option<FileRecord>> {
        Ok(self.records.read().get(file_id).cloned())
    }

    fn update_policy(&self, file_id: &str, policy: &str) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(file_id)
            .ok_or_else(|| VaultError::NotFound(file_id.to_string()))?;
        record.access_policy = policy.to_string();
        Ok(())
    }

    fn list(&self) -> Result<Vec<FileRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<FileId, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl KeyStore for MemoryKeyStore {
    fn put(&self, file_id: &str, wrapped: Vec<u8>) -> Result<()> {
        self.keys.write().insert(file_id.to_string(), wrapped);
        Ok(())
    }

    fn get(&self, file_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.keys.read().get(file_id).cloned())
    }

    fn remove(&self, file_id: &str) -> Result<()> {
        self.keys.write().remove(file_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filesystem content store
// ---------------------------------------------------------------------------

const BLOB_EXTENSION: &str = "bin";
const PARTIAL_EXTENSION: &str = "partial";

/// Stores each blob as one file under `root`.
///
/// Writes land in a `.partial` file first and are renamed into place, so a
/// reader never sees a half-written envelope.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, content_ref: &ContentRef, extension: &str) -> Result<PathBuf> {
        let name = content_ref.as_str();
        let safe = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(VaultError::Storage(format!("invalid content locator: {name}")));
        }
        Ok(self.root.join(format!("{name}.{extension}")))
    }
}

impl ContentStore for FsContentStore {
    fn put(&self, content_ref: &ContentRef, blob: &[u8]) -> Result<()> {
        let partial = self.path_for(content_ref, PARTIAL_EXTENSION)?;
        let target = self.path_for(content_ref, BLOB_EXTENSION)?;

        let written = write_partial(&partial, blob).and_then(|()| fs::rename(&partial, &target));
        if let Err(err) = written {
            if let Err(cleanup) = remove_if_present(&partial) {
                warn!(path = %partial.display(), error = %cleanup, "partial blob left behind");
            }
            return Err(err.into());
        }

        debug!(path = %target.display(), bytes = blob.len(), "blob written");
        Ok(())
    }

    fn get(&self, content_ref: &ContentRef) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(content_ref, BLOB_EXTENSION)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, content_ref: &ContentRef) -> Result<()> {
        remove_if_present(&self.path_for(content_ref, BLOB_EXTENSION)?)?;
        remove_if_present(&self.path_for(content_ref, PARTIAL_EXTENSION)?)?;
        Ok(())
    }
}

fn write_partial(path: &Path, blob: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(blob)?;
    file.sync_all()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
