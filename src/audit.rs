//! Append-only audit trail.
//!
//! Records every upload, download, denial, policy change, key revocation and
//! integrity failure. Supports pluggable sinks for forwarding records to
//! files or other stores.
//!
//! The in-memory copy is a ring buffer: once `retain` records are held, the
//! oldest is dropped for each new one. Sinks see every record.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::record::FileId;

/// Records kept in memory when no retention is configured.
pub const DEFAULT_RETENTION: usize = 10_000;

/// A sink that receives audit records.
///
/// Sinks are called concurrently from every vault operation and must do
/// their own synchronisation. Keep `append` cheap; hand slow I/O to a
/// background writer the way `FileAuditSink` does.
pub trait AuditSink: Send + Sync {
    /// Append a record. Called for every audited event.
    fn append(&self, record: &AuditRecord);
}

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Uploaded,
    Downloaded,
    /// The requester did not satisfy the policy.
    AccessDenied,
    PolicyUpdated,
    KeyRevoked,
    /// AEAD authentication failed while opening the file. Tamper signal.
    IntegrityFailure,
}

/// A permanent record of one access-control event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event: AuditEvent,
    pub file_id: FileId,
    /// The acting principal, when the caller identified one.
    pub principal_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn now(event: AuditEvent, file_id: &str, principal_id: Option<&str>) -> Self {
        Self {
            event,
            file_id: file_id.to_string(),
            principal_id: principal_id.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// An append-only log with bounded in-memory retention. Can forward records
/// to additional sinks.
///
/// All methods take `&self` and return owned data, so no lock outlives a
/// call.
pub struct AuditLog {
    retain: usize,
    records: Mutex<VecDeque<AuditRecord>>,
    forward_sinks: RwLock<Vec<Box<dyn AuditSink>>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("retain", &self.retain)
            .field("records", &self.records.lock().len())
            .field("forward_sinks", &self.forward_sinks.read().len())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that keeps at most `retain` records in memory. Zero keeps none;
    /// sinks still receive everything.
    pub fn with_retention(retain: usize) -> Self {
        Self {
            retain,
            records: Mutex::new(VecDeque::with_capacity(retain.min(1024))),
            forward_sinks: RwLock::new(Vec::new()),
        }
    }

    /// Add a sink to receive a copy of every record.
    pub fn add_forward_sink(&self, sink: Box<dyn AuditSink>) {
        self.forward_sinks.write().push(sink);
    }

    /// Append a record and forward it to every attached sink.
    pub fn append(&self, record: AuditRecord) {
        for sink in self.forward_sinks.read().iter() {
            sink.append(&record);
        }
        if self.retain == 0 {
            return;
        }
        let mut records = self.records.lock();
        while records.len() >= self.retain {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn retention(&self) -> usize {
        self.retain
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of the retained records, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Retained records for a single file, oldest first.
    pub fn for_file(&self, file_id: &str) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.file_id == file_id)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines to a file, appending if it exists.
///
/// Records go over a channel to a dedicated writer thread, so callers never
/// block on disk. Dropping the sink drains the channel and joins the writer.
pub struct FileAuditSink {
    tx: Mutex<Option<Sender<AuditRecord>>>,
    writer: Option<JoinHandle<()>>,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (tx, rx) = mpsc::channel::<AuditRecord>();

        let writer = thread::Builder::new()
            .name("attrvault-audit".into())
            .spawn(move || {
                let mut out = BufWriter::new(file);
                while let Ok(record) = rx.recv() {
                    write_line(&mut out, &record);
                    // Drain the backlog so a burst shares one flush.
                    while let Ok(next) = rx.try_recv() {
                        write_line(&mut out, &next);
                    }
                    if let Err(err) = out.flush() {
                        tracing::warn!(error = %err, "audit sink flush failed");
                    }
                }
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            writer: Some(writer),
        })
    }
}

fn write_line(out: &mut impl Write, record: &AuditRecord) {
    match serde_json::to_string(record) {
        Ok(line) => {
            if let Err(err) = writeln!(out, "{line}") {
                tracing::warn!(error = %err, "audit sink write failed");
            }
        }
        Err(err) => tracing::warn!(error = %err, "audit record serialisation failed"),
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, record: &AuditRecord) {
        if let Some(tx) = self.tx.lock().as_ref() {
            if tx.send(record.clone()).is_err() {
                tracing::warn!("audit writer thread has stopped");
            }
        }
    }
}

impl Drop for FileAuditSink {
    fn drop(&mut self) {
        self.tx.get_mut().take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::warn!("audit writer thread panicked");
            }
        }
    }
}
