//! Common utilities and types shared across brickmgr

pub mod config;
pub mod error;
pub mod utils;

pub use config::{BrickConfig, Config, StoreConfig, TxnConfig};
pub use error::{Error, Result};
pub use utils::{form_remote_peer_address, NodeState};
