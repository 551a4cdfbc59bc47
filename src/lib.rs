//! # brickmgr
//!
//! Cluster management daemon for brick-based storage volumes:
//! - Distributed transactions with ordered steps and reverse-order rollback
//! - Cluster-wide lock tokens serializing administrative operations
//! - Step relay between nodes over an internal HTTP API
//! - Brick process management for volume start and stop
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!   brickmgr CLI ──HTTP──► node A (orchestrator)
//!                           │  Transaction: lock ─► step ─► ... ─► unlock
//!                           │
//!              ┌────────────┼──────────────┐
//!              │ local call │ relay (HTTP) │ relay (HTTP)
//!          ┌───▼────┐   ┌───▼────┐     ┌───▼────┐
//!          │ node A │   │ node B │     │ node C │
//!          │ bricks │   │ bricks │     │ bricks │
//!          └────────┘   └────────┘     └────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a node
//! ```bash
//! brickmgr-node serve --config /etc/brickmgr.toml
//! ```
//!
//! ### Use the CLI
//! ```bash
//! brickmgr volume create vol1 --brick <node-uuid>:node1:/data/b1
//! brickmgr volume start vol1
//! brickmgr volume stop vol1
//! brickmgr peer delete <peer-uuid>
//! ```

pub mod commands;
pub mod common;
pub mod daemon;
pub mod ops;
pub mod server;
pub mod store;
pub mod txn;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use server::NodeServer;
pub use txn::{Step, StepRegistry, Transaction, TxnCtx, TxnEngine};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
