#![forbid(unsafe_code)]

mod acl_store;
mod daemon;
mod peer_key;
mod routes;
mod transport;

pub use daemon::Daemon;
pub use routes::SyncStatus;
