// Keypair Tests
// Key generation, byte encodings and fingerprints

use feedsync::identity::{KeyError, Keypair, PublicKey, SharedKey, SHARED_KEY_LEN};

// ============================================================================
// KEYPAIR
// ============================================================================

#[test]
fn test_keypair_generate_is_unique() {
    let a = Keypair::generate();
    let b = Keypair::generate();

    assert_ne!(a.public_key(), b.public_key());
}

#[test]
fn test_keypair_from_secret_bytes_restores_public_key() {
    let original = Keypair::generate();
    let restored = Keypair::from_bytes(&original.to_bytes()).unwrap();

    assert_eq!(restored.public_key(), original.public_key());
}

#[test]
fn test_keypair_rejects_wrong_length() {
    let result = Keypair::from_bytes(&[7u8; 31]);
    assert!(matches!(
        result,
        Err(KeyError::InvalidLength { expected: 32, got: 31 })
    ));
}

// ============================================================================
// PUBLIC KEY
// ============================================================================

#[test]
fn test_public_key_is_32_bytes() {
    let public_key = Keypair::generate().public_key();
    assert_eq!(public_key.as_bytes().len(), 32);
}

#[test]
fn test_public_key_fingerprint_is_stable() {
    let public_key = Keypair::generate().public_key();
    let copy = PublicKey::from_bytes(public_key.as_bytes()).unwrap();

    assert_eq!(public_key.fingerprint(), copy.fingerprint());
    assert_eq!(public_key.fingerprint().len(), 16);
}

// ============================================================================
// SHARED KEY
// ============================================================================

#[test]
fn test_shared_key_length() {
    let key = SharedKey::generate();
    assert_eq!(key.as_bytes().len(), SHARED_KEY_LEN);
}

#[test]
fn test_shared_keys_differ() {
    assert_ne!(SharedKey::generate(), SharedKey::generate());
}
