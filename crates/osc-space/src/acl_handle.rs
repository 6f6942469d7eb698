//! Shares one mutable `AclTree` behind the two read-only trait objects
//! `ObjectTree` needs (`WriterAuthorization`, `ReadKeySource`), so a single
//! ACL chain can back every tree in the space without cloning it per tree.

use std::sync::Arc;

use osc_core::crypto::{Cid, ReadKey};
use osc_core::ids::{AccountId, ReadKeyId};
use osc_acl::AclTree;
use osc_tree::{ReadKeySource, WriterAuthorization};
use parking_lot::RwLock;

#[derive(Clone)]
pub struct AclHandle(pub Arc<RwLock<AclTree>>);

impl AclHandle {
    pub fn new(tree: AclTree) -> Self {
        Self(Arc::new(RwLock::new(tree)))
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, AclTree> {
        self.0.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, AclTree> {
        self.0.write()
    }
}

impl WriterAuthorization for AclHandle {
    fn can_write(&self, account: &AccountId, acl_head_id: &Cid) -> bool {
        self.0.read().can_write(account, acl_head_id)
    }

    fn current_acl_head(&self) -> Cid {
        self.0.read().current_acl_head()
    }
}

impl ReadKeySource for AclHandle {
    fn read_key(&self, read_key_id: ReadKeyId) -> Option<ReadKey> {
        self.0.read().read_key(read_key_id)
    }

    fn current_read_key(&self) -> (ReadKeyId, ReadKey) {
        self.0.read().current_read_key()
    }
}
