//! Unified error taxonomy shared by every Object Sync Core crate.

/// The seven error kinds from the propagation policy: each maps to a
/// retry/surface decision made once here rather than re-derived at each
/// call site.
#[derive(thiserror::Error, Debug, Clone)]
pub enum CoreError {
    /// Malformed request, missing field, or invalid state transition.
    #[error("validation: {0}")]
    Validation(String),

    /// ACL denies the write.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Stale ACL tail, duplicate reaction, duplicate object id.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown treeId/objectId.
    #[error("not found: {0}")]
    NotFound(String),

    /// Change Store I/O, network transport, coordinator unavailable.
    #[error("infrastructure: {0}")]
    Infrastructure(String),

    /// Signature mismatch or CID mismatch on attach.
    #[error("corruption: {0}")]
    Corruption(String),

    /// WaitForSync, full-sync, or ACL join deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Category tag, stable across renames, used in log fields and HTTP mapping tables.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Permission(_) => "permission",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Infrastructure(_) => "infrastructure",
            Self::Corruption(_) => "corruption",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Whether the core itself may retry this error without surfacing it.
    /// Infrastructure is retried by the TreeSyncer with backoff; conflict is
    /// retried once after an ACL tail refresh. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::Conflict(_))
    }

    /// Suggested HTTP status for façades that want one; the core itself
    /// never emits HTTP.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Permission(_) => 403,
            Self::Conflict(_) => 409,
            Self::NotFound(_) => 404,
            Self::Infrastructure(_) => 503,
            Self::Corruption(_) => 500,
            Self::Timeout(_) => 504,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Infrastructure(e.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(e: toml::de::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<hex::FromHexError> for CoreError {
    fn from(e: hex::FromHexError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Standard result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_and_conflict_are_retryable() {
        assert!(CoreError::infrastructure("disk full").is_retryable());
        assert!(CoreError::conflict("stale acl tail").is_retryable());
        assert!(!CoreError::permission("no writer").is_retryable());
        assert!(!CoreError::corruption("bad sig").is_retryable());
    }

    #[test]
    fn http_status_mapping_matches_taxonomy() {
        assert_eq!(CoreError::validation("x").http_status(), 400);
        assert_eq!(CoreError::permission("x").http_status(), 403);
        assert_eq!(CoreError::conflict("x").http_status(), 409);
        assert_eq!(CoreError::not_found("x").http_status(), 404);
        assert_eq!(CoreError::infrastructure("x").http_status(), 503);
    }
}
