//! Peer and volume records

use crate::common::NodeState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cluster member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: Uuid,
    pub name: String,
    /// Advertised addresses, preferred first
    pub addresses: Vec<String>,
    /// Member id in the membership store
    pub member_id: u64,
    pub state: NodeState,
}

impl Peer {
    pub fn list_addresses(&self) -> &[String] {
        &self.addresses
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    Created,
    Started,
    Stopped,
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeStatus::Created => write!(f, "created"),
            VolumeStatus::Started => write!(f, "started"),
            VolumeStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brick {
    /// Owning node
    pub node_id: Uuid,
    pub hostname: String,
    pub path: String,
}

impl Brick {
    /// `host:path`, as shown to operators
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.hostname, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: Uuid,
    pub name: String,
    pub status: VolumeStatus,
    pub bricks: Vec<Brick>,
}

impl Volume {
    pub fn new(name: impl Into<String>, bricks: Vec<Brick>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: VolumeStatus::Created,
            bricks,
        }
    }

    /// Nodes hosting at least one brick, in brick order.
    pub fn nodes(&self) -> Vec<Uuid> {
        let mut nodes = Vec::new();
        for brick in &self.bricks {
            if !nodes.contains(&brick.node_id) {
                nodes.push(brick.node_id);
            }
        }
        nodes
    }

    pub fn bricks_on(&self, node: Uuid) -> impl Iterator<Item = &Brick> {
        self.bricks.iter().filter(move |b| b.node_id == node)
    }
}
