//! Cryptography & codec: signing, content addressing, symmetric encryption,
//! and key derivation (§2 "Crypto & Codec").

pub mod cid;
pub mod ed25519;
pub mod hash;
pub mod key_derivation;
pub mod symmetric;

pub use cid::Cid;
pub use ed25519::{ed25519_verify, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey};
pub use hash::Hash32;
pub use key_derivation::{derive_space_keys, generate_mnemonic, mnemonic_to_seed, SpaceKeyIndex, SpaceKeySet};
pub use symmetric::{decrypt_change_data, encrypt_change_data, open_sealed, seal_to, ReadKey, SealedBox};
