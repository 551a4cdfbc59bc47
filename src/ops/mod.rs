//! Operator-side helpers for talking to a running node

pub mod client;

pub use client::AdminClient;
