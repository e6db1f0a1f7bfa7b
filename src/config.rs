//! Vault configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! no file) is valid. Two environment variables override the file:
//! `ATTRVAULT_STORAGE_DIR` switches the content store to the filesystem at
//! that path, `ATTRVAULT_AUDIT_LOG` enables the JSON-lines audit sink.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audit::DEFAULT_RETENTION;
use crate::error::{Result, VaultError};

pub const ENV_STORAGE_DIR: &str = "ATTRVAULT_STORAGE_DIR";
pub const ENV_AUDIT_LOG: &str = "ATTRVAULT_AUDIT_LOG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where ciphertext blobs live (default: memory)
    pub backend: StorageBackend,
    /// Blob directory for the filesystem backend (default: ./storage)
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            root: PathBuf::from("storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted upload in bytes (default: 64 MiB)
    pub max_upload_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines audit file; disabled when unset
    pub path: Option<PathBuf>,
    /// Records kept in memory (default: 10000, 0 keeps none)
    pub retain: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            retain: DEFAULT_RETENTION,
        }
    }
}

impl VaultConfig {
    /// Read a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("reading {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(
            std::env::var_os(ENV_STORAGE_DIR).map(PathBuf::from),
            std::env::var_os(ENV_AUDIT_LOG).map(PathBuf::from),
        )
    }

    fn apply_overrides(mut self, storage_dir: Option<PathBuf>, audit_log: Option<PathBuf>) -> Self {
        if let Some(dir) = storage_dir {
            self.storage.backend = StorageBackend::Filesystem;
            self.storage.root = dir;
        }
        if let Some(path) = audit_log {
            self.audit.path = Some(path);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.max_upload_bytes == 0 {
            return Err(VaultError::Config(
                "limits.max_upload_bytes must be greater than zero".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Filesystem
            && self.storage.root.as_os_str().is_empty()
        {
            return Err(VaultError::Config(
                "storage.root is required for the filesystem backend".into(),
            ));
        }
        Ok(())
    }
}
