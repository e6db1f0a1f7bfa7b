use std::sync::Arc;

use attrvault::crypto::{self, Envelope, NONCE_LEN, TAG_LEN};
use attrvault::principal::{Principal, PrincipalRole};
use attrvault::store::{ContentStore, MemoryContentStore, MemoryKeyStore, KeyStore};
use attrvault::{generate_master_key, FileVault, PublicErrorKind, VaultError};
use proptest::prelude::*;

struct Harness {
    vault: FileVault,
    blobs: Arc<MemoryContentStore>,
    keys: Arc<MemoryKeyStore>,
    owner: String,
}

fn harness() -> Harness {
    let blobs = Arc::new(MemoryContentStore::new());
    let keys = Arc::new(MemoryKeyStore::new());
    let vault = FileVault::builder(generate_master_key().unwrap())
        .content_store(blobs.clone())
        .key_store(keys.clone())
        .build();
    let owner = vault
        .directory()
        .register(Principal::new("owner", PrincipalRole::DataOwner, "Role:Owner"));
    Harness {
        vault,
        blobs,
        keys,
        owner,
    }
}

#[test]
fn test_blob_at_rest_is_not_plaintext() {
    // Threat Model: storage exposure.
    let h = harness();
    let plaintext = b"confidential quarterly numbers";
    let record = h.vault.upload(&h.owner, "q.txt", plaintext, "").unwrap();

    let blob = h.blobs.get(&record.content_ref).unwrap().unwrap();
    assert_eq!(blob.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
    assert!(!blob.windows(plaintext.len()).any(|w| w == plaintext));
}

#[test]
fn test_truncated_blob_fails_closed() {
    let h = harness();
    let record = h.vault.upload(&h.owner, "t.txt", b"truncate me", "").unwrap();

    let blob = h.blobs.get(&record.content_ref).unwrap().unwrap();
    for cut in [0, NONCE_LEN - 1, NONCE_LEN + TAG_LEN - 1, blob.len() - 1] {
        h.blobs.put(&record.content_ref, &blob[..cut]).unwrap();
        assert!(
            matches!(
                h.vault.download(&record.file_id, ""),
                Err(VaultError::IntegrityError)
            ),
            "truncation at {cut} was not detected"
        );
    }
}

#[test]
fn test_swapped_blobs_are_rejected() {
    // Each file has its own key: a ciphertext moved under another file's
    // record cannot be opened with that record's key.
    let h = harness();
    let a = h.vault.upload(&h.owner, "a.txt", b"file a", "").unwrap();
    let b = h.vault.upload(&h.owner, "b.txt", b"file b", "").unwrap();

    let blob_a = h.blobs.get(&a.content_ref).unwrap().unwrap();
    h.blobs.put(&b.content_ref, &blob_a).unwrap();

    assert!(matches!(
        h.vault.download(&b.file_id, ""),
        Err(VaultError::IntegrityError)
    ));
}

#[test]
fn test_relocated_wrapped_key_is_rejected() {
    let h = harness();
    let a = h.vault.upload(&h.owner, "a.txt", b"file a", "").unwrap();
    let b = h.vault.upload(&h.owner, "b.txt", b"file b", "").unwrap();

    let wrapped_a = h.keys.get(&a.file_id).unwrap().unwrap();
    h.keys.put(&b.file_id, wrapped_a).unwrap();

    assert!(matches!(
        h.vault.download(&b.file_id, ""),
        Err(VaultError::IntegrityError)
    ));
}

#[test]
fn test_tamper_is_indistinguishable_from_denial_externally() {
    let h = harness();
    let guarded = h
        .vault
        .upload(&h.owner, "g.txt", b"guarded", "Role:Authority")
        .unwrap();
    let tampered = h.vault.upload(&h.owner, "t.txt", b"tampered", "").unwrap();

    let mut blob = h.blobs.get(&tampered.content_ref).unwrap().unwrap();
    blob[NONCE_LEN] ^= 0x01;
    h.blobs.put(&tampered.content_ref, &blob).unwrap();

    let denied = h.vault.download(&guarded.file_id, "Role:Owner").unwrap_err();
    let corrupt = h.vault.download(&tampered.file_id, "").unwrap_err();

    assert!(matches!(denied, VaultError::Forbidden));
    assert!(matches!(corrupt, VaultError::IntegrityError));
    assert_eq!(denied.public_kind(), PublicErrorKind::Denied);
    assert_eq!(corrupt.public_kind(), PublicErrorKind::Denied);
}

#[test]
fn test_denied_requester_never_reaches_the_custodian() {
    // A forbidden request must fail before the key is consulted; with the
    // key gone it still reports Forbidden, not KeyNotFound.
    let h = harness();
    let record = h
        .vault
        .upload(&h.owner, "k.txt", b"keyless", "Role:Authority")
        .unwrap();
    h.keys.remove(&record.file_id).unwrap();

    assert!(matches!(
        h.vault.download(&record.file_id, "Role:Guest"),
        Err(VaultError::Forbidden)
    ));
    assert!(matches!(
        h.vault.download(&record.file_id, "Role:Authority"),
        Err(VaultError::KeyNotFound(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_flipped_bit_is_detected(
        plaintext in proptest::collection::vec(any::<u8>(), 1..256),
        bit in any::<usize>(),
    ) {
        let key = crypto::generate_key().unwrap();
        let mut bytes = crypto::encrypt(&key, &plaintext).unwrap().to_bytes();
        let bit = bit % (bytes.len() * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);

        let result = Envelope::from_bytes(&bytes).and_then(|env| crypto::decrypt(&key, &env));
        prop_assert!(matches!(result, Err(VaultError::IntegrityError)));
    }

    #[test]
    fn decrypt_inverts_encrypt(plaintext in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let key = crypto::generate_key().unwrap();
        let envelope = crypto::encrypt(&key, &plaintext).unwrap();
        let parsed = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
        prop_assert_eq!(crypto::decrypt(&key, &parsed).unwrap(), plaintext);
    }
}

#[test]
fn test_tampered_download_is_audited() {
    let h = harness();
    let record = h.vault.upload(&h.owner, "a.txt", b"audit me", "").unwrap();
    let mut blob = h.blobs.get(&record.content_ref).unwrap().unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x80;
    h.blobs.put(&record.content_ref, &blob).unwrap();

    assert!(h.vault.download(&record.file_id, "").is_err());
    let records = h.vault.audit_log().records();
    let last = records.last().unwrap();
    assert_eq!(last.event, attrvault::audit::AuditEvent::IntegrityFailure);
    assert_eq!(last.file_id, record.file_id);
}
