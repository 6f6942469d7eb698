//! BIP39 mnemonic → deterministic per-space key set derivation (§6.4).

use hkdf::Hkdf;
use sha2::Sha256;

use super::ed25519::Ed25519SigningKey;
use super::symmetric::ReadKey;
use crate::error::CoreError;

/// The four well-known space indices; order is part of the wire contract
/// since any client reproducing a mnemonic must reproduce the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SpaceKeyIndex {
    Private = 0,
    Community = 1,
    CommunityReadonly = 2,
    Admin = 3,
}

/// The deterministic key triple derived for one space.
pub struct SpaceKeySet {
    pub signing_key: Ed25519SigningKey,
    pub read_key: ReadKey,
    pub metadata_key: [u8; 32],
}

/// Generates a fresh 12-word BIP39 mnemonic from 128 bits of OS randomness,
/// for a device with no persisted identity yet.
pub fn generate_mnemonic() -> String {
    use rand_core::RngCore;
    let mut entropy = [0u8; 16];
    rand_core::OsRng.fill_bytes(&mut entropy);
    bip39::Mnemonic::from_entropy(&entropy)
        .expect("16 bytes is a valid BIP39 entropy length")
        .to_string()
}

/// Validates a mnemonic phrase and derives its BIP39 seed.
pub fn mnemonic_to_seed(mnemonic: &str, passphrase: &str) -> Result<[u8; 64], CoreError> {
    let parsed = bip39::Mnemonic::parse_normalized(mnemonic)
        .map_err(|e| CoreError::validation(format!("invalid mnemonic: {e}")))?;
    Ok(parsed.to_seed(passphrase))
}

/// Derives the key set for space index `i`: `HKDF(seed, "space/" + i)` split
/// into signing/read/metadata subkeys via distinct HKDF `expand` info labels.
pub fn derive_space_keys(seed: &[u8; 64], index: SpaceKeyIndex) -> Result<SpaceKeySet, CoreError> {
    let info = format!("space/{}", index as u32);
    let hk = Hkdf::<Sha256>::new(None, seed);

    let mut signing = [0u8; 32];
    hk.expand(format!("{info}/signing").as_bytes(), &mut signing)
        .map_err(|e| CoreError::infrastructure(format!("hkdf expand signing key: {e}")))?;

    let mut read = [0u8; 32];
    hk.expand(format!("{info}/read").as_bytes(), &mut read)
        .map_err(|e| CoreError::infrastructure(format!("hkdf expand read key: {e}")))?;

    let mut metadata = [0u8; 32];
    hk.expand(format!("{info}/metadata").as_bytes(), &mut metadata)
        .map_err(|e| CoreError::infrastructure(format!("hkdf expand metadata key: {e}")))?;

    Ok(SpaceKeySet {
        signing_key: Ed25519SigningKey::from_bytes(signing),
        read_key: ReadKey(read),
        metadata_key: metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn same_mnemonic_reproduces_same_keys() {
        let seed_a = mnemonic_to_seed(TEST_MNEMONIC, "").unwrap();
        let seed_b = mnemonic_to_seed(TEST_MNEMONIC, "").unwrap();
        assert_eq!(seed_a, seed_b);

        let a = derive_space_keys(&seed_a, SpaceKeyIndex::Community).unwrap();
        let b = derive_space_keys(&seed_b, SpaceKeyIndex::Community).unwrap();
        assert_eq!(a.signing_key.0, b.signing_key.0);
        assert_eq!(a.read_key.0, b.read_key.0);
    }

    #[test]
    fn distinct_indices_yield_distinct_keys() {
        let seed = mnemonic_to_seed(TEST_MNEMONIC, "").unwrap();
        let private = derive_space_keys(&seed, SpaceKeyIndex::Private).unwrap();
        let community = derive_space_keys(&seed, SpaceKeyIndex::Community).unwrap();
        assert_ne!(private.signing_key.0, community.signing_key.0);
        assert_ne!(private.read_key.0, community.read_key.0);
    }

    #[test]
    fn rejects_invalid_mnemonic() {
        assert!(mnemonic_to_seed("not a valid mnemonic phrase at all", "").is_err());
    }

    #[test]
    fn generated_mnemonic_is_valid_and_usable() {
        let mnemonic = generate_mnemonic();
        assert_eq!(mnemonic.split_whitespace().count(), 12);
        assert!(mnemonic_to_seed(&mnemonic, "").is_ok());
    }
}
