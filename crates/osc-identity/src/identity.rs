//! Local identity: mnemonic-derived AID, per-space key sets, and the
//! `identity.json` record that makes recovery possible from the mnemonic
//! alone (§6.3, §6.4).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use osc_core::crypto::key_derivation::{derive_space_keys, mnemonic_to_seed, SpaceKeyIndex, SpaceKeySet};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, SpaceId};

/// The four deterministic spaces every identity owns, keyed by their
/// well-known derivation index (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySpaces {
    pub private: SpaceId,
    pub community: SpaceId,
    pub community_readonly: SpaceId,
    pub admin: SpaceId,
}

/// On-disk shape of `<dataDir>/identity.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub aid: String,
    pub mnemonic: String,
    pub spaces: IdentitySpaces,
}

/// The live identity: the persisted record plus the derived key material,
/// which is never itself written to `identity.json` (only the mnemonic is;
/// keys are re-derived on load).
pub struct Identity {
    pub record: IdentityRecord,
    pub account_id: AccountId,
    pub private_keys: SpaceKeySet,
    pub community_keys: SpaceKeySet,
    pub community_readonly_keys: SpaceKeySet,
    pub admin_keys: SpaceKeySet,
}

impl Identity {
    /// Derives an AID and the four space key sets from a mnemonic, deriving
    /// stable space ids from the community-index signing key's public bytes
    /// so that reproducing the mnemonic reproduces the same space ids.
    pub fn from_mnemonic(mnemonic: &str, passphrase: &str) -> Result<Self> {
        let seed = mnemonic_to_seed(mnemonic, passphrase)?;
        let private_keys = derive_space_keys(&seed, SpaceKeyIndex::Private)?;
        let community_keys = derive_space_keys(&seed, SpaceKeyIndex::Community)?;
        let community_readonly_keys = derive_space_keys(&seed, SpaceKeyIndex::CommunityReadonly)?;
        let admin_keys = derive_space_keys(&seed, SpaceKeyIndex::Admin)?;

        let account_id = AccountId::new(hex::encode(community_keys.signing_key.verifying_key().as_bytes()));
        let spaces = IdentitySpaces {
            private: space_id_for(&private_keys),
            community: space_id_for(&community_keys),
            community_readonly: space_id_for(&community_readonly_keys),
            admin: space_id_for(&admin_keys),
        };

        Ok(Self {
            record: IdentityRecord {
                aid: account_id.0.clone(),
                mnemonic: mnemonic.to_string(),
                spaces,
            },
            account_id,
            private_keys,
            community_keys,
            community_readonly_keys,
            admin_keys,
        })
    }

    pub fn aid(&self) -> &AccountId {
        &self.account_id
    }
}

fn space_id_for(keys: &SpaceKeySet) -> SpaceId {
    SpaceId::new(hex::encode(keys.signing_key.verifying_key().as_bytes()))
}

/// Reads and atomically writes `<dataDir>/identity.json`.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("identity.json"),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<IdentityRecord> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| CoreError::infrastructure(format!("read {}: {e}", self.path.display())))?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::corruption(format!("identity.json: {e}")))
    }

    /// Writes to a sibling temp file then renames, so a crash mid-write never
    /// leaves a truncated `identity.json` behind.
    pub fn save(&self, record: &IdentityRecord) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| CoreError::infrastructure(format!("encode identity.json: {e}")))?;
        std::fs::write(&tmp_path, bytes)
            .map_err(|e| CoreError::infrastructure(format!("write {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| CoreError::infrastructure(format!("rename into {}: {e}", self.path.display())))?;
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .map_err(|e| CoreError::infrastructure(format!("remove {}: {e}", self.path.display())))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn same_mnemonic_reproduces_same_aid_and_spaces() {
        let a = Identity::from_mnemonic(TEST_MNEMONIC, "").unwrap();
        let b = Identity::from_mnemonic(TEST_MNEMONIC, "").unwrap();
        assert_eq!(a.record.aid, b.record.aid);
        assert_eq!(a.record.spaces.community, b.record.spaces.community);
        assert_eq!(a.record.spaces.private, b.record.spaces.private);
    }

    #[test]
    fn store_round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());
        assert!(!store.exists());

        let identity = Identity::from_mnemonic(TEST_MNEMONIC, "").unwrap();
        store.save(&identity.record).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.aid, identity.record.aid);

        store.delete().unwrap();
        assert!(!store.exists());
    }
}
