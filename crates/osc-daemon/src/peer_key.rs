//! `<dataDir>/users/<aid>/peer.key` (§6.3): the device's X25519 identity
//! key, used to open the sealed read keys an ACL invite or a read-key
//! rotation addresses to this account. Generated once and persisted raw,
//! unlike the mnemonic-derived space keys which are never written to disk.

use std::path::{Path, PathBuf};

use osc_core::error::{CoreError, Result};

pub struct PeerKeyStore {
    path: PathBuf,
}

impl PeerKeyStore {
    pub fn new(data_dir: &Path, aid: &str) -> Self {
        Self {
            path: data_dir.join("users").join(aid).join("peer.key"),
        }
    }

    pub fn load_or_create(&self) -> Result<x25519_dalek::StaticSecret> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::infrastructure(format!("create {}: {e}", parent.display())))?;
        }
        if self.path.exists() {
            let bytes = std::fs::read(&self.path)
                .map_err(|e| CoreError::infrastructure(format!("read {}: {e}", self.path.display())))?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|_| CoreError::corruption("peer.key must be 32 bytes"))?;
            return Ok(x25519_dalek::StaticSecret::from(arr));
        }
        let secret = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
        std::fs::write(&self.path, secret.to_bytes())
            .map_err(|e| CoreError::infrastructure(format!("write {}: {e}", self.path.display())))?;
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reloading_returns_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = PeerKeyStore::new(dir.path(), "aid123");
        let first = store.load_or_create().unwrap();
        let second = store.load_or_create().unwrap();
        assert_eq!(first.to_bytes(), second.to_bytes());
    }
}
