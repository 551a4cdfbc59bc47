//! Cluster state collaborators
//!
//! - Peer directory and volume repository (`MetadataStore`, RocksDB)
//! - Membership store access and lock tokens (`EtcdGateway`, JSON gateway)
//! - This node's own store daemon (`LocalStoreControl`)

pub mod etcd;
pub mod local;
pub mod metadata;
pub mod records;

pub use etcd::EtcdGateway;
pub use local::LocalStoreControl;
pub use metadata::MetadataStore;
pub use records::{Brick, Peer, Volume, VolumeStatus};

use crate::common::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory of cluster peers
pub trait PeerDirectory: Send + Sync {
    fn lookup(&self, id: Uuid) -> Result<Option<Peer>>;
    fn save(&self, peer: &Peer) -> Result<()>;
    fn delete(&self, id: Uuid) -> Result<()>;
    fn list(&self) -> Result<Vec<Peer>>;
}

/// Volume record persistence
pub trait VolumeRepository: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<Volume>>;
    fn save(&self, volume: &Volume) -> Result<()>;
    fn list(&self) -> Result<Vec<Volume>>;
}

/// Options for reconfiguring a peer's membership store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReconfigure {
    /// Wipe the peer's store data and restart it standalone
    #[serde(default)]
    pub delete_peer: bool,
}

/// Membership store bookkeeping
#[async_trait]
pub trait MembershipBackend: Send + Sync {
    async fn remove_member(&self, member_id: u64) -> Result<()>;
    async fn reconfigure_remote(&self, peer_address: &str, options: &StoreReconfigure)
        -> Result<()>;
}
