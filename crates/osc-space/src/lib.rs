#![forbid(unsafe_code)]

mod acl_handle;
mod object_kind;
mod space;
mod state;
mod sync_handler;
mod tree_manager;

pub use acl_handle::AclHandle;
pub use object_kind::{ObjectKind, ObjectKindRegistry, PermissiveKind, ValidationContext};
pub use space::{Space, SpaceType};
pub use state::materialize;
pub use sync_handler::SpaceSyncHandler;
pub use tree_manager::{NoRemote, RemoteTreeSource, UnifiedTreeManager};
