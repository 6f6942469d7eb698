//! `<dataDir>/spaces/<spaceType>/acl.json` (§6.3 "`<dataDir>/acl` tree,
//! kept as the logical structure"): the space's ACL chain, persisted as its
//! ordered `AclRecord` list so a restart can rehydrate via
//! `AclTree::from_records` instead of re-running `AclTree::init`.

use std::path::{Path, PathBuf};

use osc_acl::AclRecord;
use osc_core::error::{CoreError, Result};

pub struct AclStore {
    path: PathBuf,
}

impl AclStore {
    pub fn new(data_dir: &Path, space_type: &str) -> Self {
        Self {
            path: data_dir.join("spaces").join(space_type).join("acl.json"),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Vec<AclRecord>> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| CoreError::infrastructure(format!("read {}: {e}", self.path.display())))?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::corruption(format!("parse {}: {e}", self.path.display())))
    }

    pub fn save(&self, records: &[AclRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::infrastructure(format!("create {}: {e}", parent.display())))?;
        }
        let bytes =
            serde_json::to_vec_pretty(records).map_err(|e| CoreError::infrastructure(format!("encode acl chain: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| CoreError::infrastructure(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| CoreError::infrastructure(format!("rename {} -> {}", tmp.display(), self.path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_acl::AclTree;
    use osc_core::crypto::{Ed25519SigningKey, ReadKey};
    use osc_core::ids::AccountId;

    #[test]
    fn round_trips_a_freshly_initialized_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = AclStore::new(dir.path(), "community");
        assert!(!store.exists());

        let signing_key = Ed25519SigningKey::from_bytes([7u8; 32]);
        let owner = AccountId("owner".to_string());
        let owner_secret = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
        let tree = AclTree::init(owner.clone(), ReadKey([1u8; 32]), owner_secret.clone(), &signing_key, 1000).unwrap();

        store.save(tree.records()).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap();
        let rehydrated = AclTree::from_records(loaded, owner, owner_secret).unwrap();
        assert_eq!(rehydrated.tail_id(), tree.tail_id());
    }
}
