//! Node server

use crate::commands::{register_step_funcs, StepDeps};
use crate::common::{Config, Error, Result};
use crate::daemon::{DaemonHandle, ProcessDaemonManager};
use crate::server::http::{create_internal_router, create_router, ApiState};
use crate::store::{EtcdGateway, LocalStoreControl, MetadataStore, PeerDirectory};
use crate::txn::{HttpRelay, LockBackend, StandaloneLocks, StepRegistry, TxnEngine, TxnOptions};
use std::sync::Arc;
use uuid::Uuid;

pub struct NodeServer {
    config: Config,
    node_id: Uuid,
}

impl NodeServer {
    pub fn new(mut config: Config) -> Result<Self> {
        let node_id = config.resolve_node_id()?;
        Ok(Self { config, node_id })
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// Wire the stores, step functions and engine into handler state.
    pub fn build_state(&self) -> Result<ApiState> {
        let config = &self.config;
        let metadata = Arc::new(MetadataStore::open(&config.store.db_path)?);
        let daemons = Arc::new(ProcessDaemonManager::new(config.bricks.ready_timeout()));
        let gateway = Arc::new(EtcdGateway::new(
            config.store.endpoint.clone(),
            config.txn.peer_port,
            config.txn.relay_timeout(),
        ));

        let locks: Arc<dyn LockBackend> = if config.store.endpoint.is_some() {
            gateway.clone()
        } else {
            let peers = PeerDirectory::list(metadata.as_ref())?;
            if !peers.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "{} peer(s) recorded but store.endpoint is not set",
                    peers.len()
                )));
            }
            tracing::warn!("no membership store endpoint configured, running standalone");
            Arc::new(StandaloneLocks::new(metadata.clone()))
        };

        let deps = StepDeps {
            node_id: self.node_id,
            peers: metadata.clone(),
            volumes: metadata.clone(),
            membership: gateway,
            daemons: daemons.clone(),
            bricks: config.bricks.clone(),
        };
        let mut registry = StepRegistry::new();
        register_step_funcs(&mut registry, &deps)?;
        tracing::debug!(functions = ?registry.names(), "step functions registered");

        let relay = Arc::new(HttpRelay::new(
            metadata.clone(),
            config.txn.peer_port,
            config.txn.relay_timeout(),
        ));
        let engine = Arc::new(TxnEngine::new(
            self.node_id,
            Arc::new(registry),
            locks,
            relay,
            TxnOptions::from(&config.txn),
        ));

        let store_daemon = config.store.daemon_binary.as_ref().map(|binary| {
            let mut args = vec!["--name".to_string(), self.node_id.to_string()];
            if let Some(dir) = &config.store.data_dir {
                args.push("--data-dir".to_string());
                args.push(dir.display().to_string());
            }
            DaemonHandle {
                name: "membership store".to_string(),
                binary: binary.clone(),
                args,
                pidfile: config.state_dir.join("store.pid"),
            }
        });

        Ok(ApiState {
            engine,
            peers: metadata.clone(),
            volumes: metadata,
            store_control: Arc::new(LocalStoreControl::new(
                config.store.data_dir.clone(),
                store_daemon,
                daemons,
            )),
        })
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting node: {}", self.node_id);
        tracing::info!("  REST API: {}", self.config.rest_addr);
        tracing::info!("  Internal API: {}", self.config.internal_addr);
        tracing::info!("  DB path: {}", self.config.store.db_path.display());

        let state = self.build_state()?;
        let rest_router = create_router(state.clone());
        let internal_router = create_internal_router(state);

        let rest_listener = tokio::net::TcpListener::bind(self.config.rest_addr).await?;
        let internal_listener = tokio::net::TcpListener::bind(self.config.internal_addr).await?;

        tracing::info!("Node ready");

        tokio::select! {
            res = axum::serve(rest_listener, rest_router) => {
                if let Err(e) = res {
                    tracing::error!("REST server error: {}", e);
                }
            }
            res = axum::serve(internal_listener, internal_router) => {
                if let Err(e) = res {
                    tracing::error!("Internal server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
            }
        }

        Ok(())
    }
}
