//! Error types for brickmgr

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Request Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Transaction Errors ===
    #[error("Resource busy: {0} is locked by another transaction")]
    ResourceBusy(String),

    #[error("Step function not registered: {0}")]
    StepNotRegistered(String),

    #[error("Step function already registered: {0}")]
    DuplicateStep(String),

    #[error("Step {step} failed on node {node}: {source}")]
    StepFailed {
        step: String,
        node: Uuid,
        #[source]
        source: Box<Error>,
    },

    #[error("Transaction cancelled: {0}")]
    Cancelled(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Daemon Errors ===
    #[error("Address already in use: {0}")]
    AddressInUse(String),

    #[error("Daemon {name} failed: {reason}")]
    Daemon { name: String, reason: String },

    // === Cluster Errors ===
    #[error("Membership store {stage} failed: {reason}")]
    Membership { stage: String, reason: String },

    #[error("Remote node {node} failed: {reason}")]
    Remote { node: Uuid, reason: String },

    // === Serialization / Storage Errors ===
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Innermost error, looking through failed-step wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Is this the transient condition a brick start retries on?
    pub fn is_address_in_use(&self) -> bool {
        matches!(self.root(), Error::AddressInUse(_))
    }

    /// Convert to HTTP status code.
    ///
    /// A failed step is a server-side failure whichever node it ran on; only a
    /// busy lock or an expired deadline keep their own status through it.
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::ResourceBusy(_) => StatusCode::CONFLICT,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::StepFailed { source, .. } => match source.root() {
                Error::ResourceBusy(_) => StatusCode::CONFLICT,
                Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.to_http_status();
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
