//! Walkthrough: an owner shares files under attribute policies.
//!
//! Run with: `cargo run --example file_sharing_demo`
//!
//! Set `ATTRVAULT_STORAGE_DIR` to keep ciphertext on disk, and
//! `ATTRVAULT_AUDIT_LOG` to persist the audit trail as JSON lines.
//! `RUST_LOG=debug` shows the vault's tracing output.

use attrvault::config::VaultConfig;
use attrvault::{generate_master_key, FileVault};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Setup
    let config = VaultConfig::default().apply_env();
    let master = generate_master_key()?;
    let vault = FileVault::from_config(master, &config)?;

    vault.directory().seed_defaults();
    let authority = vault.directory().find_by_name("authority").ok_or("missing authority")?;
    let owner = vault.directory().find_by_name("owner").ok_or("missing owner")?;
    for principal in vault.directory().list() {
        println!("{:<10} {:?} [{}]", principal.name, principal.role, principal.attributes);
    }

    // 2. Owner uploads a restricted file and a public one.
    let restricted = vault.upload(&owner.id, "salaries.csv", b"alice,100\nbob,90\n", "Role:Authority")?;
    let public = vault.upload(&owner.id, "handbook.txt", b"Welcome aboard.", "")?;
    println!("Stored {} file(s)", vault.list_files()?.len());

    // 3. The challenge tells a requester what it needs, nothing more.
    let challenge = vault.challenge(&restricted.file_id)?;
    println!("Challenge for {}: policy = {:?}", restricted.original_filename, challenge.policy);

    // 4. Owner is denied, authority succeeds, anyone reads the public file.
    match vault.download_as(&owner.id, &restricted.file_id) {
        Ok(_) => println!("owner unexpectedly read the restricted file"),
        Err(err) => println!("owner -> {} ({:?})", err, err.public_kind()),
    }
    let file = vault.download_as(&authority.id, &restricted.file_id)?;
    println!("authority -> {} ({} bytes)", file.filename, file.bytes.len());
    let file = vault.download(&public.file_id, "")?;
    println!("anonymous -> {}: {}", file.filename, String::from_utf8_lossy(&file.bytes));

    // 5. Authority revokes the owner; even public downloads as that
    // principal now fail.
    vault.directory().revoke(&authority.id, &owner.id)?;
    assert!(vault.download_as(&owner.id, &public.file_id).is_err());

    // 6. Audit log
    let records = vault.audit_log().records();
    println!("Audit log: {} record(s)", records.len());
    for record in &records {
        println!("  {:?} {} @ {}", record.event, record.file_id, record.timestamp);
    }

    Ok(())
}
