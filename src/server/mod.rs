//! Node process: admin REST API, internal relay API and start-up wiring

pub mod http;
pub mod node;

pub use http::{create_internal_router, create_router, ApiState};
pub use node::NodeServer;
