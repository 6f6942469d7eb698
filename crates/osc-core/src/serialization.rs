//! Canonical encoding used for CID computation, `Change.rawPayload`, and
//! wire framing: DAG-CBOR via `serde_ipld_dagcbor` (§2, "Canonical encoding").

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CoreError;

/// Encodes a value to its canonical byte form.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    serde_ipld_dagcbor::to_vec(value)
        .map_err(|e| CoreError::validation(format!("dag-cbor encode: {e}")))
}

/// Decodes a value from its canonical byte form.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| CoreError::corruption(format!("dag-cbor decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn roundtrip() {
        let value = Sample {
            a: 42,
            b: "hello".into(),
        };
        let bytes = to_vec(&value).unwrap();
        let decoded: Sample = from_slice(&bytes).unwrap();
        assert_eq!(value, decoded);
    }
}
