#![forbid(unsafe_code)]

mod credential;
mod identity;
mod profile;

pub use credential::{CredentialManager, CredentialState};
pub use identity::{Identity, IdentityRecord, IdentitySpaces, IdentityStore};
pub use profile::{
    CommunityProfileManager, CommunityProfileState, PrivateProfileManager, PrivateProfileState, SharedProfileManager, SharedProfileState,
};
