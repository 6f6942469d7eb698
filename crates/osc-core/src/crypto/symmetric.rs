//! Symmetric encryption for `Change.data`, and X25519-sealed encryption for
//! read keys delivered through ACL invite/join/rotation records.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

use super::hash::Hash32;
use crate::error::CoreError;

/// A space's symmetric read key (one per `readKeyId` in the ACL chain).
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct ReadKey(pub [u8; 32]);

impl std::fmt::Debug for ReadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadKey").finish_non_exhaustive()
    }
}

/// Derives the nonce for encrypting one change's `data` field deterministically
/// from `(treeId, changeId)` so a fixed key never reuses a nonce across the
/// changes it is applied to.
fn derive_nonce(tree_id_bytes: &[u8], change_id_bytes: &[u8]) -> [u8; 12] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tree_id_bytes);
    hasher.update(change_id_bytes);
    let digest = hasher.finalize();
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&digest.as_bytes()[..12]);
    nonce
}

/// Encrypts `plaintext` under `key`, with the nonce bound to `(tree_id,
/// change_id)`.
pub fn encrypt_change_data(
    key: &ReadKey,
    tree_id_bytes: &[u8],
    change_id_bytes: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let nonce_bytes = derive_nonce(tree_id_bytes, change_id_bytes);
    cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CoreError::corruption(format!("encrypt change data: {e}")))
}

/// Decrypts a change's `data` field; a failure here is a corruption error,
/// not a transient one — it means either the wrong read key was used or the
/// ciphertext was tampered with.
pub fn decrypt_change_data(
    key: &ReadKey,
    tree_id_bytes: &[u8],
    change_id_bytes: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let nonce_bytes = derive_nonce(tree_id_bytes, change_id_bytes);
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext)
        .map_err(|e| CoreError::corruption(format!("decrypt change data: {e}")))
}

/// Anonymous-sender sealed box: encrypts `plaintext` (a read key, in
/// practice) to `recipient_public`, embedding an ephemeral X25519 public key
/// so only the recipient's private key can derive the shared secret and
/// decrypt. Used for invite read-key delivery and read-key rotation fan-out.
pub fn seal_to(
    recipient_public: &x25519_dalek::PublicKey,
    plaintext: &[u8],
) -> Result<SealedBox, CoreError> {
    let ephemeral_secret = x25519_dalek::EphemeralSecret::random_from_rng(rand_core::OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient_public);
    let key = sealed_box_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient_public.as_bytes());

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce_bytes = [0u8; 12];
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CoreError::corruption(format!("seal read key: {e}")))?;

    Ok(SealedBox {
        ephemeral_public: *ephemeral_public.as_bytes(),
        ciphertext,
    })
}

/// Opens a sealed box produced by [`seal_to`] using the recipient's private key.
pub fn open_sealed(
    recipient_private: &x25519_dalek::StaticSecret,
    sealed: &SealedBox,
) -> Result<Vec<u8>, CoreError> {
    let ephemeral_public = x25519_dalek::PublicKey::from(sealed.ephemeral_public);
    let shared = recipient_private.diffie_hellman(&ephemeral_public);
    let recipient_public = x25519_dalek::PublicKey::from(recipient_private);
    let key = sealed_box_key(
        shared.as_bytes(),
        &sealed.ephemeral_public,
        recipient_public.as_bytes(),
    );

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce_bytes = [0u8; 12];
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), sealed.ciphertext.as_slice())
        .map_err(|e| CoreError::corruption(format!("open sealed read key: {e}")))
}

fn sealed_box_key(shared_secret: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(shared_secret);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(digest.as_bytes());
    key
}

/// Ciphertext plus the ephemeral public key needed to open it; serialized
/// verbatim into `inviteAnyone.encReadKey` / `readKeyChange.encForEachMember`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBox {
    pub ephemeral_public: [u8; 32],
    pub ciphertext: Vec<u8>,
}

/// Computes a stable identifier for a read key, used as `readKeyId` is only
/// a version counter in the ACL chain but tests and logs want a fingerprint.
pub fn read_key_fingerprint(key: &ReadKey) -> Hash32 {
    Hash32::digest(&key.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::RngCore;

    #[test]
    fn change_data_roundtrip() {
        let key = ReadKey([7u8; 32]);
        let ciphertext =
            encrypt_change_data(&key, b"tree-a", b"change-1", b"payload").unwrap();
        let plaintext = decrypt_change_data(&key, b"tree-a", b"change-1", &ciphertext).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn wrong_change_id_fails_to_decrypt() {
        let key = ReadKey([7u8; 32]);
        let ciphertext =
            encrypt_change_data(&key, b"tree-a", b"change-1", b"payload").unwrap();
        assert!(decrypt_change_data(&key, b"tree-a", b"change-2", &ciphertext).is_err());
    }

    #[test]
    fn sealed_box_roundtrip() {
        let mut rng = rand_core::OsRng;
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);
        let recipient_private = x25519_dalek::StaticSecret::from(secret_bytes);
        let recipient_public = x25519_dalek::PublicKey::from(&recipient_private);

        let sealed = seal_to(&recipient_public, b"the read key").unwrap();
        let opened = open_sealed(&recipient_private, &sealed).unwrap();
        assert_eq!(opened, b"the read key");
    }
}
