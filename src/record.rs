//! File records and the read-only views handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::principal::PrincipalId;

/// A unique identifier for an uploaded file.
pub type FileId = String;

/// Generate a fresh file id.
pub(crate) fn new_file_id() -> FileId {
    Uuid::new_v4().to_string()
}

/// Opaque locator of a ciphertext blob inside a content store.
///
/// Never derived from the uploaded filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef(String);

impl ContentRef {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata for one protected file. Holds no key material and no ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub owner_id: PrincipalId,
    pub original_filename: String,
    pub content_ref: ContentRef,
    /// AND-only attribute policy. Empty means public.
    pub access_policy: String,
    pub created_at: DateTime<Utc>,
}

/// A plaintext file returned by a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A non-authoritative hint describing what a requester would need to
/// present to download a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeDescriptor {
    pub challenge_id: String,
    pub file_id: FileId,
    pub policy: String,
    pub nonce: String,
}

impl ChallengeDescriptor {
    pub(crate) fn for_record(record: &FileRecord) -> Self {
        Self {
            challenge_id: Uuid::new_v4().to_string(),
            file_id: record.file_id.clone(),
            policy: record.access_policy.clone(),
            nonce: Uuid::new_v4().to_string(),
        }
    }
}
