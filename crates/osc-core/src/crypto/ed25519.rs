//! Ed25519 signing/verification wrapper types.

use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Ed25519 signature (fixed-size byte wrapper for serialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CoreError::corruption("ed25519 signature must be 64 bytes"))?;
        Ok(Self(arr))
    }
}

impl TryFrom<&[u8]> for Ed25519Signature {
    type Error = CoreError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_slice(value)
    }
}

/// Ed25519 signing key.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Ed25519SigningKey(pub [u8; 32]);

impl Ed25519SigningKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn verifying_key(&self) -> Ed25519VerifyingKey {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        Ed25519VerifyingKey(key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        Ed25519Signature(key.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519SigningKey").finish_non_exhaustive()
    }
}

/// Ed25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519VerifyingKey(pub [u8; 32]);

impl Ed25519VerifyingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CoreError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(|_| Self(bytes))
            .map_err(|e| CoreError::corruption(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::corruption("invalid ed25519 public key length"))?;
        Self::from_bytes(arr)
    }

    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        if ed25519_verify(message, signature, self)? {
            Ok(())
        } else {
            Err(CoreError::corruption("signature verification failed"))
        }
    }
}

/// Verifies an Ed25519 signature.
pub fn ed25519_verify(
    message: &[u8],
    signature: &Ed25519Signature,
    public_key: &Ed25519VerifyingKey,
) -> Result<bool, CoreError> {
    let pk = ed25519_dalek::VerifyingKey::from_bytes(&public_key.0)
        .map_err(|e| CoreError::corruption(e.to_string()))?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    Ok(pk.verify_strict(message, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let key = Ed25519SigningKey::from_bytes([9u8; 32]);
        let msg = b"a committed change";
        let sig = key.sign(msg);
        assert!(key.verifying_key().verify(msg, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let key = Ed25519SigningKey::from_bytes([9u8; 32]);
        let sig = key.sign(b"original");
        assert!(key.verifying_key().verify(b"tampered", &sig).is_err());
    }

    #[test]
    fn invalid_lengths_rejected() {
        assert!(Ed25519Signature::try_from_slice(&[0u8; 63]).is_err());
        assert!(Ed25519VerifyingKey::try_from_slice(&[0u8; 31]).is_err());
    }
}
