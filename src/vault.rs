//! File vault orchestration.
//!
//! Upload: validate → generate key → encrypt → write blob → store key →
//! register record. A failure in a later step undoes the earlier ones, so no
//! orphaned ciphertext or dangling key survives a failed upload.
//!
//! Download: authorize and fetch happen under one per-file read lock. Policy
//! updates and key revocation take the same lock for writing, so a download
//! observes either the old or the new policy, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::audit::{self, AuditEvent, AuditLog, AuditRecord, AuditSink, FileAuditSink};
use crate::config::{LimitsConfig, StorageBackend, VaultConfig};
use crate::crypto::{self, Envelope};
use crate::custodian::KeyCustodian;
use crate::error::{Result, VaultError};
use crate::keys::MasterKey;
use crate::policy::{AccessPolicy, AttributeSet};
use crate::principal::{Principal, PrincipalDirectory};
use crate::record::{self, ChallengeDescriptor, ContentRef, DownloadedFile, FileId, FileRecord};
use crate::store::{
    ContentStore, FsContentStore, KeyStore, MemoryContentStore, MemoryKeyStore, MemoryRegistry,
    RecordRegistry,
};

/// The access-controlled file store.
pub struct FileVault {
    content: Arc<dyn ContentStore>,
    registry: Arc<dyn RecordRegistry>,
    custodian: KeyCustodian,
    directory: Arc<PrincipalDirectory>,
    limits: LimitsConfig,
    locks: Mutex<HashMap<FileId, Arc<RwLock<()>>>>,
    audit: AuditLog,
}

impl std::fmt::Debug for FileVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileVault")
            .field("custodian", &self.custodian)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Assembles a `FileVault` from injected backends. Anything not supplied
/// falls back to an in-memory implementation.
pub struct FileVaultBuilder {
    master: MasterKey,
    content: Option<Arc<dyn ContentStore>>,
    registry: Option<Arc<dyn RecordRegistry>>,
    keys: Option<Arc<dyn KeyStore>>,
    directory: Option<Arc<PrincipalDirectory>>,
    limits: LimitsConfig,
    audit_retention: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl FileVaultBuilder {
    pub fn content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.content = Some(store);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RecordRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.keys = Some(store);
        self
    }

    pub fn directory(mut self, directory: Arc<PrincipalDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// How many audit records to keep in memory. Zero keeps none.
    pub fn audit_retention(mut self, retain: usize) -> Self {
        self.audit_retention = retain;
        self
    }

    pub fn audit_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> FileVault {
        let keys = self
            .keys
            .unwrap_or_else(|| Arc::new(MemoryKeyStore::new()));
        let audit = AuditLog::with_retention(self.audit_retention);
        for sink in self.sinks {
            audit.add_forward_sink(sink);
        }

        FileVault {
            content: self
                .content
                .unwrap_or_else(|| Arc::new(MemoryContentStore::new())),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(MemoryRegistry::new())),
            custodian: KeyCustodian::new(self.master, keys),
            directory: self
                .directory
                .unwrap_or_else(|| Arc::new(PrincipalDirectory::new())),
            limits: self.limits,
            locks: Mutex::new(HashMap::new()),
            audit,
        }
    }
}

impl FileVault {
    /// A vault with in-memory backends and an empty principal directory.
    pub fn new(master: MasterKey) -> Self {
        Self::builder(master).build()
    }

    pub fn builder(master: MasterKey) -> FileVaultBuilder {
        FileVaultBuilder {
            master,
            content: None,
            registry: None,
            keys: None,
            directory: None,
            limits: LimitsConfig::default(),
            audit_retention: audit::DEFAULT_RETENTION,
            sinks: Vec::new(),
        }
    }

    /// Build a vault from configuration. The principal directory starts
    /// empty; register principals through `directory()`.
    pub fn from_config(master: MasterKey, config: &VaultConfig) -> Result<Self> {
        config.validate()?;

        let content: Arc<dyn ContentStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryContentStore::new()),
            StorageBackend::Filesystem => Arc::new(FsContentStore::open(&config.storage.root)?),
        };

        let mut builder = Self::builder(master)
            .content_store(content)
            .limits(config.limits.clone())
            .audit_retention(config.audit.retain);
        if let Some(path) = &config.audit.path {
            builder = builder.audit_sink(Box::new(FileAuditSink::new(path)?));
        }
        Ok(builder.build())
    }

    pub fn directory(&self) -> &PrincipalDirectory {
        &self.directory
    }

    /// Add a sink that receives a copy of every audit record.
    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) {
        self.audit.add_forward_sink(sink);
    }

    /// The audit trail. Its accessors return snapshots, so holding this
    /// reference never blocks other vault calls.
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    /// Encrypt and store a file under `policy`. An empty policy makes the
    /// file public.
    pub fn upload(
        &self,
        owner_id: &str,
        filename: &str,
        bytes: &[u8],
        policy: &str,
    ) -> Result<FileRecord> {
        let owner = self.directory.get(owner_id)?;
        if !owner.active {
            warn!(owner_id, "upload rejected for inactive principal");
            return Err(VaultError::Forbidden);
        }
        if bytes.is_empty() {
            return Err(VaultError::InvalidInput("empty payload".into()));
        }
        if bytes.len() > self.limits.max_upload_bytes {
            return Err(VaultError::InvalidInput(format!(
                "payload of {} bytes exceeds limit of {}",
                bytes.len(),
                self.limits.max_upload_bytes
            )));
        }
        let filename = display_name(filename)?;

        let key = crypto::generate_key()?;
        let envelope = crypto::encrypt(&key, bytes)?;

        let file_id = record::new_file_id();
        let content_ref = ContentRef::generate();
        self.content.put(&content_ref, &envelope.to_bytes())?;

        if let Err(err) = self.custodian.store(&file_id, &key) {
            self.discard_blob(&content_ref);
            return Err(err);
        }

        let record = FileRecord {
            file_id: file_id.clone(),
            owner_id: owner.id.clone(),
            original_filename: filename,
            content_ref: content_ref.clone(),
            access_policy: policy.trim().to_string(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.registry.insert(record.clone()) {
            self.discard_key(&file_id);
            self.discard_blob(&content_ref);
            return Err(err);
        }

        info!(
            file_id = %file_id,
            owner = %owner.id,
            bytes = bytes.len(),
            public = record.access_policy.is_empty(),
            "file stored"
        );
        self.record_event(AuditEvent::Uploaded, &file_id, Some(owner.id.as_str()));
        Ok(record)
    }

    fn discard_blob(&self, content_ref: &ContentRef) {
        if let Err(err) = self.content.delete(content_ref) {
            error!(content_ref = %content_ref, error = %err, "rollback: blob cleanup failed");
        }
    }

    fn discard_key(&self, file_id: &str) {
        if let Err(err) = self.custodian.revoke(file_id) {
            error!(file_id, error = %err, "rollback: key cleanup failed");
        }
    }

    // -----------------------------------------------------------------------
    // Download
    // -----------------------------------------------------------------------

    /// Decrypt a file for a requester presenting `requester_attributes`
    /// (comma-separated tokens, possibly empty).
    pub fn download(&self, file_id: &str, requester_attributes: &str) -> Result<DownloadedFile> {
        self.open(file_id, &AttributeSet::parse(requester_attributes), None)
    }

    /// Decrypt a file for a registered principal.
    ///
    /// The principal is resolved from the directory on every call, so a
    /// revoked principal loses access immediately, including to files it
    /// could open before.
    pub fn download_as(&self, principal_id: &str, file_id: &str) -> Result<DownloadedFile> {
        let principal = self.directory.get(principal_id)?;
        if !principal.active {
            warn!(file_id, principal_id, "download denied for inactive principal");
            self.record_event(AuditEvent::AccessDenied, file_id, Some(principal_id));
            return Err(VaultError::Forbidden);
        }
        self.open(file_id, &principal.attributes, Some(principal_id))
    }

    fn open(
        &self,
        file_id: &str,
        attributes: &AttributeSet,
        principal_id: Option<&str>,
    ) -> Result<DownloadedFile> {
        let lock = self.file_lock(file_id)?;
        let _guard = lock.read();

        let record = self.require_record(file_id)?;
        let policy = AccessPolicy::parse(&record.access_policy);
        if !policy.is_satisfied_by(attributes) {
            warn!(
                file_id,
                missing_clauses = policy.missing(attributes).len(),
                "download denied by policy"
            );
            self.record_event(AuditEvent::AccessDenied, file_id, principal_id);
            return Err(VaultError::Forbidden);
        }

        let key = self.custodian.fetch(file_id).map_err(|err| {
            error!(file_id, error = %err, "data key unavailable");
            err
        })?;
        let blob = self.content.get(&record.content_ref)?.ok_or_else(|| {
            error!(file_id, content_ref = %record.content_ref, "ciphertext blob missing");
            VaultError::Storage(format!("ciphertext missing for file {file_id}"))
        })?;

        let opened = Envelope::from_bytes(&blob).and_then(|envelope| crypto::decrypt(&key, &envelope));
        let bytes = match opened {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(file_id, "integrity check failed, envelope may have been tampered with");
                self.record_event(AuditEvent::IntegrityFailure, file_id, principal_id);
                return Err(err);
            }
        };

        self.record_event(AuditEvent::Downloaded, file_id, principal_id);
        Ok(DownloadedFile {
            filename: record.original_filename,
            bytes,
        })
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    /// All file records, oldest first. Records carry no key material.
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut records = self.registry.list()?;
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        Ok(records)
    }

    /// Describe what a requester would need to present for `file_id`.
    pub fn challenge(&self, file_id: &str) -> Result<ChallengeDescriptor> {
        let record = self.require_record(file_id)?;
        Ok(ChallengeDescriptor::for_record(&record))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Replace a file's policy. Only the owner or an authority may do this.
    pub fn update_policy(&self, file_id: &str, new_policy: &str, actor_id: &str) -> Result<()> {
        let actor = self.directory.get(actor_id)?;
        let lock = self.file_lock(file_id)?;
        let _guard = lock.write();

        let record = self.require_record(file_id)?;
        self.require_manager(&actor, &record)?;

        self.registry.update_policy(file_id, new_policy.trim())?;
        info!(file_id, actor = %actor.id, "access policy updated");
        self.record_event(AuditEvent::PolicyUpdated, file_id, Some(actor.id.as_str()));
        Ok(())
    }

    /// Destroy a file's data key. Later downloads fail with `KeyNotFound`.
    pub fn revoke_key(&self, file_id: &str, actor_id: &str) -> Result<()> {
        let actor = self.directory.get(actor_id)?;
        let lock = self.file_lock(file_id)?;
        let _guard = lock.write();

        let record = self.require_record(file_id)?;
        self.require_manager(&actor, &record)?;

        self.custodian.revoke(file_id)?;
        info!(file_id, actor = %actor.id, "data key revoked");
        self.record_event(AuditEvent::KeyRevoked, file_id, Some(actor.id.as_str()));
        Ok(())
    }

    fn require_manager(&self, actor: &Principal, record: &FileRecord) -> Result<()> {
        let allowed = actor.active && (actor.id == record.owner_id || actor.is_authority());
        if allowed {
            Ok(())
        } else {
            warn!(file_id = %record.file_id, actor = %actor.id, "mutation denied");
            self.record_event(AuditEvent::AccessDenied, &record.file_id, Some(actor.id.as_str()));
            Err(VaultError::Forbidden)
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_record(&self, file_id: &str) -> Result<FileRecord> {
        self.registry
            .get(file_id)?
            .ok_or_else(|| VaultError::NotFound(file_id.to_string()))
    }

    /// The per-file lock. Only created for ids the registry knows, so probing
    /// unknown ids does not grow the table.
    fn file_lock(&self, file_id: &str) -> Result<Arc<RwLock<()>>> {
        if let Some(lock) = self.locks.lock().get(file_id) {
            return Ok(Arc::clone(lock));
        }
        self.require_record(file_id)?;
        Ok(Arc::clone(
            self.locks.lock().entry(file_id.to_string()).or_default(),
        ))
    }

    fn record_event(&self, event: AuditEvent, file_id: &str, principal_id: Option<&str>) {
        self.audit
            .append(AuditRecord::now(event, file_id, principal_id));
    }
}

/// Reduce an uploaded name to its final path component.
fn display_name(filename: &str) -> Result<String> {
    let name = filename
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(VaultError::InvalidInput("missing filename".into()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::PrincipalRole;

    fn vault_with_owner() -> (FileVault, String) {
        let vault = FileVault::new(MasterKey::from_bytes([5u8; 32]));
        let owner = vault.directory().register(Principal::new(
            "owner",
            PrincipalRole::DataOwner,
            "Role:Owner",
        ));
        (vault, owner)
    }

    #[test]
    fn test_vault_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FileVault>();
    }

    #[test]
    fn test_display_name_strips_directories() {
        assert_eq!(display_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(display_name("C:\\docs\\report.pdf").unwrap(), "report.pdf");
        assert!(display_name("  ").is_err());
        assert!(display_name("dir/").is_err());
        assert!(display_name("..").is_err());
    }

    #[test]
    fn test_upload_limits() {
        let vault = FileVault::builder(MasterKey::from_bytes([5u8; 32]))
            .limits(LimitsConfig { max_upload_bytes: 4 })
            .build();
        let owner = vault
            .directory()
            .register(Principal::new("o", PrincipalRole::DataOwner, ""));

        assert!(matches!(
            vault.upload(&owner, "a.txt", b"", ""),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(matches!(
            vault.upload(&owner, "a.txt", b"too long", ""),
            Err(VaultError::InvalidInput(_))
        ));
        vault.upload(&owner, "a.txt", b"ok", "").unwrap();
    }

    #[test]
    fn test_unknown_ids_do_not_grow_lock_table() {
        let (vault, _) = vault_with_owner();
        for i in 0..10 {
            let _ = vault.download(&format!("missing-{i}"), "");
        }
        assert!(vault.locks.lock().is_empty());
    }

    #[test]
    fn test_policy_is_trimmed_on_store() {
        let (vault, owner) = vault_with_owner();
        let record = vault
            .upload(&owner, "a.txt", b"data", "  Role:Owner  ")
            .unwrap();
        assert_eq!(record.access_policy, "Role:Owner");
    }

    #[test]
    fn test_audit_trail_for_download_and_denial() {
        let (vault, owner) = vault_with_owner();
        let record = vault.upload(&owner, "a.txt", b"data", "Role:Owner").unwrap();
        vault.download(&record.file_id, "Role:Owner").unwrap();
        assert!(vault.download(&record.file_id, "Role:Guest").is_err());

        let events: Vec<AuditEvent> = vault
            .audit_log()
            .for_file(&record.file_id)
            .into_iter()
            .map(|r| r.event)
            .collect();
        assert_eq!(
            events,
            vec![
                AuditEvent::Uploaded,
                AuditEvent::Downloaded,
                AuditEvent::AccessDenied
            ]
        );
    }

    #[test]
    fn test_audit_retention_is_bounded() {
        let vault = FileVault::builder(MasterKey::from_bytes([5u8; 32]))
            .audit_retention(4)
            .build();
        let owner = vault
            .directory()
            .register(Principal::new("o", PrincipalRole::DataOwner, ""));
        let record = vault.upload(&owner, "a.txt", b"data", "Role:Owner").unwrap();

        for _ in 0..50 {
            assert!(vault.download(&record.file_id, "Role:Guest").is_err());
        }
        let log = vault.audit_log();
        assert_eq!(log.len(), 4);
        assert!(log
            .records()
            .iter()
            .all(|r| r.event == AuditEvent::AccessDenied));
    }

    #[test]
    fn test_holding_audit_log_does_not_block_vault() {
        let (vault, owner) = vault_with_owner();
        let log = vault.audit_log();
        let record = vault.upload(&owner, "a.txt", b"data", "").unwrap();
        vault.download(&record.file_id, "").unwrap();
        assert_eq!(log.len(), 2);
    }
}
