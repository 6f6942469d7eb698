//! Sync-layer error type, grounded on the teacher's pattern of a thin
//! per-crate error that folds into `CoreError` at the boundary rather than
//! inventing a second parallel taxonomy.

use osc_core::error::CoreError;
use osc_core::ids::PeerId;

#[derive(thiserror::Error, Debug, Clone)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("malformed wire message: {0}")]
    Wire(String),

    #[error("no transport route to peer {0}")]
    PeerUnreachable(PeerId),

    #[error("full-sync batch out of sequence: expected {expected}, got {got}")]
    OutOfSequence { expected: u32, got: u32 },
}

impl From<SyncError> for CoreError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Core(inner) => inner,
            SyncError::Wire(msg) => CoreError::validation(msg),
            SyncError::PeerUnreachable(peer) => {
                CoreError::infrastructure(format!("no route to {peer}"))
            }
            SyncError::OutOfSequence { expected, got } => {
                CoreError::validation(format!("out of sequence batch: expected {expected}, got {got}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
