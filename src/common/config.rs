//! Configuration for brickmgr nodes

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Environment variable prefix, e.g. `BRICKMGR_REST_ADDR` or `BRICKMGR_TXN__DEADLINE_MS`
pub const ENV_PREFIX: &str = "BRICKMGR";

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID; read from (or written to) `<state_dir>/uuid` when absent
    #[serde(default)]
    pub node_id: Option<Uuid>,

    /// Working directory for node-local state
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Bind address for the admin REST API
    #[serde(default = "default_rest_addr")]
    pub rest_addr: SocketAddr,

    /// Bind address for the internal relay API
    #[serde(default = "default_internal_addr")]
    pub internal_addr: SocketAddr,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub txn: TxnConfig,

    #[serde(default)]
    pub bricks: BrickConfig,
}

/// Metadata and membership store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// RocksDB path for peer and volume records
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Membership store JSON gateway (e.g. `http://127.0.0.1:2379`).
    /// Lock tokens are process-local when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Data directory of the local membership store daemon
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Membership store daemon binary, restarted standalone after peer removal
    #[serde(default)]
    pub daemon_binary: Option<PathBuf>,
}

/// Transaction engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnConfig {
    /// Deadline for each relayed step invocation
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_ms: u64,

    /// Overall deadline for the forward phase of a transaction
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Internal port appended to peer addresses that carry none
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
}

/// Brick daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickConfig {
    /// Brick server binary
    #[serde(default = "default_brick_binary")]
    pub binary: PathBuf,

    /// Directory for pid and socket files
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,

    /// Directory for brick logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Attempts made when a brick port is still in use
    #[serde(default = "default_start_max_retries")]
    pub start_max_retries: u32,

    /// Pause between attempts
    #[serde(default = "default_start_retry_interval")]
    pub start_retry_interval_ms: u64,

    /// How long to wait for a daemon to report readiness
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./brickmgr-data")
}
fn default_rest_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 24007))
}
fn default_internal_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 24008))
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./brickmgr-data/meta")
}
fn default_relay_timeout() -> u64 {
    30_000
}
fn default_peer_port() -> u16 {
    24008
}
fn default_brick_binary() -> PathBuf {
    PathBuf::from("glusterfsd")
}
fn default_run_dir() -> PathBuf {
    PathBuf::from("./brickmgr-data/run")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./brickmgr-data/log")
}
fn default_start_max_retries() -> u32 {
    3
}
fn default_start_retry_interval() -> u64 {
    1000
}
fn default_ready_timeout() -> u64 {
    10_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: None,
            state_dir: default_state_dir(),
            rest_addr: default_rest_addr(),
            internal_addr: default_internal_addr(),
            log_level: default_log_level(),
            store: StoreConfig::default(),
            txn: TxnConfig::default(),
            bricks: BrickConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            endpoint: None,
            data_dir: None,
            daemon_binary: None,
        }
    }
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            relay_timeout_ms: default_relay_timeout(),
            deadline_ms: None,
            peer_port: default_peer_port(),
        }
    }
}

impl Default for BrickConfig {
    fn default() -> Self {
        Self {
            binary: default_brick_binary(),
            run_dir: default_run_dir(),
            log_dir: default_log_dir(),
            start_max_retries: default_start_max_retries(),
            start_retry_interval_ms: default_start_retry_interval(),
            ready_timeout_ms: default_ready_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then `BRICKMGR_*` environment variables.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Config::load`], reading variables from `env` instead of the process when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env);
        let settings = builder.add_source(environment).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Node identity, persisted under the state directory on first use.
    pub fn resolve_node_id(&mut self) -> crate::Result<Uuid> {
        if let Some(id) = self.node_id {
            return Ok(id);
        }
        let path = self.state_dir.join("uuid");
        let id = match std::fs::read_to_string(&path) {
            Ok(s) => Uuid::parse_str(s.trim())
                .map_err(|e| crate::Error::InvalidConfig(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::fs::create_dir_all(&self.state_dir)?;
                let id = Uuid::new_v4();
                std::fs::write(&path, id.to_string())?;
                id
            }
            Err(e) => return Err(e.into()),
        };
        self.node_id = Some(id);
        Ok(id)
    }
}

impl TxnConfig {
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

impl BrickConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.start_retry_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}
