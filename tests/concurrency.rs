use std::sync::Arc;
use std::thread;

use attrvault::principal::{Principal, PrincipalRole};
use attrvault::{generate_master_key, FileVault, VaultError};

fn shared_vault() -> (Arc<FileVault>, String) {
    let vault = FileVault::new(generate_master_key().unwrap());
    let owner = vault
        .directory()
        .register(Principal::new("owner", PrincipalRole::DataOwner, "Role:Owner"));
    (Arc::new(vault), owner)
}

#[test]
fn test_parallel_downloads_return_identical_plaintext() {
    let (vault, owner) = shared_vault();
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let record = vault
        .upload(&owner, "big.bin", &payload, "Role:Reader")
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let vault = Arc::clone(&vault);
            let file_id = record.file_id.clone();
            thread::spawn(move || {
                (0..8)
                    .map(|_| vault.download(&file_id, "Role:Reader").unwrap().bytes)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        for bytes in handle.join().unwrap() {
            assert_eq!(bytes, payload);
        }
    }
}

#[test]
fn test_parallel_uploads_are_independent() {
    let (vault, owner) = shared_vault();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let vault = Arc::clone(&vault);
            let owner = owner.clone();
            thread::spawn(move || {
                let body = format!("file number {i}");
                let record = vault
                    .upload(&owner, &format!("{i}.txt"), body.as_bytes(), "")
                    .unwrap();
                (record.file_id, body)
            })
        })
        .collect();

    let uploaded: Vec<(String, String)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(vault.list_files().unwrap().len(), 8);
    for (file_id, body) in uploaded {
        assert_eq!(vault.download(&file_id, "").unwrap().bytes, body.as_bytes());
    }
}

#[test]
fn test_policy_flips_during_downloads_never_tear() {
    // Every download sees one of the two policies in full: it either
    // succeeds with the right bytes or is Forbidden.
    let (vault, owner) = shared_vault();
    let record = vault
        .upload(&owner, "flip.txt", b"flip", "Role:A")
        .unwrap();

    let flipper = {
        let vault = Arc::clone(&vault);
        let file_id = record.file_id.clone();
        let owner = owner.clone();
        thread::spawn(move || {
            for i in 0..200 {
                let policy = if i % 2 == 0 { "Role:B" } else { "Role:A" };
                vault.update_policy(&file_id, policy, &owner).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let vault = Arc::clone(&vault);
            let file_id = record.file_id.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    match vault.download(&file_id, "Role:A") {
                        Ok(file) => assert_eq!(file.bytes, b"flip"),
                        Err(VaultError::Forbidden) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect();

    flipper.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    // 200 updates: the last one (i = 199) restores Role:A.
    assert!(vault.download(&record.file_id, "Role:A").is_ok());
}
