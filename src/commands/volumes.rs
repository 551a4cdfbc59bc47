//! Volume start, stop, create and info
//!
//! Start and stop are transactions over the nodes hosting the volume's
//! bricks: `[lock(volname), vol-{start,stop}.Commit, unlock(volname)]`. The
//! volume record travels in the transaction context so every node sees the
//! same brick list.

use crate::commands::{run_transaction, StepDeps};
use crate::common::{BrickConfig, Error, Result};
use crate::daemon::{brick_daemon, DaemonHandle, DaemonManager};
use crate::store::{Brick, PeerDirectory, Volume, VolumeRepository, VolumeStatus};
use crate::txn::{NodeId, Step, StepFunc, StepRegistry, TxnCtx, TxnEngine};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const START_COMMIT: &str = "vol-start.Commit";
pub const START_UNDO: &str = "vol-start.Undo";
pub const STOP_COMMIT: &str = "vol-stop.Commit";
pub const STOP_UNDO: &str = "vol-stop.Undo";

const CTX_VOLNAME: &str = "volname";
const CTX_VOLINFO: &str = "volinfo";

/// Brick process control for the bricks this node owns.
struct BrickOps {
    daemons: Arc<dyn DaemonManager>,
    cfg: BrickConfig,
}

impl BrickOps {
    fn local_daemons(&self, ctx: &TxnCtx) -> Result<Vec<DaemonHandle>> {
        let vol: Volume = ctx.get(CTX_VOLINFO).inspect_err(|e| {
            tracing::error!(parent: ctx.logger(), key = CTX_VOLINFO, error = %e, "failed to get value from context");
        })?;
        Ok(vol
            .bricks_on(ctx.node_id())
            .map(|b| brick_daemon(&vol.name, b, ctx.node_id(), &self.cfg))
            .collect())
    }

    /// Start one brick, retrying while its port is still held.
    async fn start_with_retry(&self, ctx: &TxnCtx, daemon: &DaemonHandle) -> Result<()> {
        let attempts = self.cfg.start_max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.daemons.start(daemon, true).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_address_in_use() && attempt < attempts => {
                    tracing::info!(parent: ctx.logger(), brick = %daemon.name, attempt, "brick port unavailable, retrying");
                    tokio::time::sleep(self.cfg.retry_interval()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Start every local brick; on failure stop the ones already started.
    async fn start_all(&self, ctx: &TxnCtx) -> Result<()> {
        let daemons = self.local_daemons(ctx)?;
        for (i, daemon) in daemons.iter().enumerate() {
            tracing::info!(parent: ctx.logger(), brick = %daemon.name, "starting brick");
            if let Err(e) = self.start_with_retry(ctx, daemon).await {
                tracing::error!(parent: ctx.logger(), brick = %daemon.name, error = %e, "brick failed to start, stopping started bricks");
                for started in daemons[..i].iter().rev() {
                    if let Err(stop_err) = self.daemons.stop(started, true).await {
                        tracing::error!(parent: ctx.logger(), brick = %started.name, error = %stop_err, "failed to stop brick");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop every local brick, reporting the first failure.
    async fn stop_all(&self, ctx: &TxnCtx, force: bool) -> Result<()> {
        let mut first_err = None;
        for daemon in self.local_daemons(ctx)? {
            tracing::info!(parent: ctx.logger(), brick = %daemon.name, force, "stopping brick");
            if let Err(e) = self.daemons.stop(&daemon, force).await {
                tracing::error!(parent: ctx.logger(), brick = %daemon.name, error = %e, "failed to stop brick");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

struct StartBricks(Arc<BrickOps>);

#[async_trait]
impl StepFunc for StartBricks {
    async fn call(&self, ctx: &TxnCtx) -> Result<()> {
        self.0.start_all(ctx).await
    }
}

struct StopBricks {
    ops: Arc<BrickOps>,
    force: bool,
}

#[async_trait]
impl StepFunc for StopBricks {
    async fn call(&self, ctx: &TxnCtx) -> Result<()> {
        self.ops.stop_all(ctx, self.force).await
    }
}

pub(crate) fn register_step_funcs(registry: &mut StepRegistry, deps: &StepDeps) -> Result<()> {
    let ops = Arc::new(BrickOps {
        daemons: deps.daemons.clone(),
        cfg: deps.bricks.clone(),
    });
    registry.register(START_COMMIT, Arc::new(StartBricks(ops.clone())))?;
    registry.register(
        START_UNDO,
        Arc::new(StopBricks {
            ops: ops.clone(),
            force: true,
        }),
    )?;
    registry.register(
        STOP_COMMIT,
        Arc::new(StopBricks {
            ops: ops.clone(),
            force: false,
        }),
    )?;
    registry.register(STOP_UNDO, Arc::new(StartBricks(ops)))?;
    Ok(())
}

fn lookup(volumes: &dyn VolumeRepository, name: &str) -> Result<Volume> {
    if name.is_empty() {
        return Err(Error::InvalidRequest("volume name not present in the request".into()));
    }
    volumes
        .get(name)?
        .ok_or_else(|| Error::NotFound(format!("volume {}", name)))
}

/// Run the lock / `commit` / unlock transaction for `vol` on its brick nodes.
async fn run_volume_txn(
    engine: &Arc<TxnEngine>,
    vol: &Volume,
    commit: &str,
    undo: &str,
) -> Result<()> {
    let txn = engine.new_txn();
    run_transaction(txn, |txn| {
        txn.set_nodes(vol.nodes());
        let (lock, unlock) = txn.create_lock_steps(&vol.name);
        txn.add_step(lock)?;
        txn.add_step(Step::new(commit, vol.nodes()).with_undo(undo))?;
        txn.add_step(unlock)?;
        txn.ctx().set(CTX_VOLNAME, &vol.name)?;
        txn.ctx().set(CTX_VOLINFO, vol)?;
        Ok(())
    })
    .await
}

/// Start the brick processes of a created or stopped volume.
pub async fn start_volume(
    engine: &Arc<TxnEngine>,
    volumes: &dyn VolumeRepository,
    name: &str,
) -> Result<Volume> {
    let mut vol = lookup(volumes, name)?;
    if vol.status == VolumeStatus::Started {
        return Err(Error::InvalidRequest(format!("volume {} already started", name)));
    }

    if let Err(e) = run_volume_txn(engine, &vol, START_COMMIT, START_UNDO).await {
        tracing::error!(volume = %name, error = %e, "failed to start volume");
        return Err(e);
    }

    vol.status = VolumeStatus::Started;
    volumes.save(&vol)?;
    tracing::info!(volume = %name, "volume started");
    Ok(vol)
}

/// Stop the brick processes of a started volume.
pub async fn stop_volume(
    engine: &Arc<TxnEngine>,
    volumes: &dyn VolumeRepository,
    name: &str,
) -> Result<Volume> {
    let mut vol = lookup(volumes, name)?;
    if vol.status != VolumeStatus::Started {
        return Err(Error::InvalidRequest(format!("volume {} is not started", name)));
    }

    if let Err(e) = run_volume_txn(engine, &vol, STOP_COMMIT, STOP_UNDO).await {
        tracing::error!(volume = %name, error = %e, "failed to stop volume");
        return Err(e);
    }

    vol.status = VolumeStatus::Stopped;
    volumes.save(&vol)?;
    tracing::info!(volume = %name, "volume stopped");
    Ok(vol)
}

pub fn volume_info(volumes: &dyn VolumeRepository, name: &str) -> Result<Volume> {
    lookup(volumes, name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickRequest {
    pub node_id: NodeId,
    pub hostname: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub bricks: Vec<BrickRequest>,
}

fn valid_volume_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Record a new volume. Bricks must live on known nodes.
pub fn create_volume(
    local_node: NodeId,
    peers: &dyn PeerDirectory,
    volumes: &dyn VolumeRepository,
    req: CreateVolumeRequest,
) -> Result<Volume> {
    if !valid_volume_name(&req.name) {
        return Err(Error::InvalidRequest(format!("invalid volume name {:?}", req.name)));
    }
    if req.bricks.is_empty() {
        return Err(Error::InvalidRequest("volume needs at least one brick".into()));
    }
    if volumes.get(&req.name)?.is_some() {
        return Err(Error::InvalidRequest(format!("volume {} already exists", req.name)));
    }

    let mut bricks: Vec<Brick> = Vec::with_capacity(req.bricks.len());
    for b in req.bricks {
        if !b.path.starts_with('/') {
            return Err(Error::InvalidRequest(format!("brick path {} is not absolute", b.path)));
        }
        if b.node_id != local_node && peers.lookup(b.node_id)?.is_none() {
            return Err(Error::InvalidRequest(format!("brick node {} is not a peer", b.node_id)));
        }
        if bricks
            .iter()
            .any(|x| x.node_id == b.node_id && x.path == b.path)
        {
            return Err(Error::InvalidRequest(format!("duplicate brick {}:{}", b.hostname, b.path)));
        }
        bricks.push(Brick {
            node_id: b.node_id,
            hostname: b.hostname,
            path: b.path,
        });
    }

    let vol = Volume::new(req.name, bricks);
    volumes.save(&vol)?;
    tracing::info!(volume = %vol.name, bricks = vol.bricks.len(), "volume created");
    Ok(vol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MembershipBackend, MetadataStore, StoreReconfigure};
    use crate::txn::{LocalLocks, LoopbackRelay, TxnOptions};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};
    use uuid::Uuid;

    /// Records starts and stops; a brick fails with "address in use" for
    /// as many attempts as scripted.
    #[derive(Default)]
    struct SpyDaemons {
        conflicts: Mutex<HashMap<String, u32>>,
        starts: Mutex<Vec<String>>,
        stops: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DaemonManager for SpyDaemons {
        async fn start(&self, daemon: &DaemonHandle, _wait: bool) -> Result<()> {
            self.starts.lock().unwrap().push(daemon.name.clone());
            let mut conflicts = self.conflicts.lock().unwrap();
            match conflicts.get_mut(&daemon.name) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    Err(Error::AddressInUse(daemon.name.clone()))
                }
                _ => Ok(()),
            }
        }

        async fn stop(&self, daemon: &DaemonHandle, _force: bool) -> Result<()> {
            self.stops.lock().unwrap().push(daemon.name.clone());
            Ok(())
        }
    }

    struct NoMembership;

    #[async_trait]
    impl MembershipBackend for NoMembership {
        async fn remove_member(&self, _member_id: u64) -> Result<()> {
            Ok(())
        }
        async fn reconfigure_remote(&self, _addr: &str, _opts: &StoreReconfigure) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        node: Uuid,
        store: Arc<MetadataStore>,
        locks: Arc<LocalLocks>,
        daemons: Arc<SpyDaemons>,
        engine: Arc<TxnEngine>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let node = Uuid::new_v4();
        let store = Arc::new(MetadataStore::open(dir.path().join("meta")).unwrap());
        let locks = Arc::new(LocalLocks::new());
        let daemons = Arc::new(SpyDaemons::default());
        let deps = StepDeps {
            node_id: node,
            peers: store.clone(),
            volumes: store.clone(),
            membership: Arc::new(NoMembership),
            daemons: daemons.clone(),
            bricks: BrickConfig {
                start_retry_interval_ms: 10,
                ..Default::default()
            },
        };
        let mut registry = StepRegistry::new();
        crate::commands::register_step_funcs(&mut registry, &deps).unwrap();
        let engine = Arc::new(TxnEngine::new(
            node,
            Arc::new(registry),
            locks.clone(),
            Arc::new(LoopbackRelay::new()),
            TxnOptions::default(),
        ));
        Fixture {
            _dir: dir,
            node,
            store,
            locks,
            daemons,
            engine,
        }
    }

    fn seed(f: &Fixture, paths: &[&str]) -> Volume {
        let bricks = paths
            .iter()
            .map(|p| Brick {
                node_id: f.node,
                hostname: "node1".into(),
                path: p.to_string(),
            })
            .collect();
        let vol = Volume::new("vol1", bricks);
        VolumeRepository::save(f.store.as_ref(), &vol).unwrap();
        vol
    }

    #[tokio::test]
    async fn test_start_single_brick() {
        let f = fixture();
        seed(&f, &["/data/b1"]);

        let vol = start_volume(&f.engine, f.store.as_ref(), "vol1").await.unwrap();
        assert_eq!(vol.status, VolumeStatus::Started);
        assert_eq!(f.daemons.starts.lock().unwrap().len(), 1);
        assert!(f.daemons.stops.lock().unwrap().is_empty());
        assert_eq!(f.locks.holder("vol1"), None);

        let stored = VolumeRepository::get(f.store.as_ref(), "vol1").unwrap().unwrap();
        assert_eq!(stored.status, VolumeStatus::Started);
    }

    #[tokio::test]
    async fn test_port_conflict_then_success() {
        let f = fixture();
        seed(&f, &["/data/b1"]);
        f.daemons
            .conflicts
            .lock()
            .unwrap()
            .insert("brick node1:/data/b1".into(), 1);

        start_volume(&f.engine, f.store.as_ref(), "vol1").await.unwrap();
        assert_eq!(f.daemons.starts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_port_conflict_exhausts_retries() {
        let f = fixture();
        seed(&f, &["/data/b1", "/data/b2"]);
        f.daemons
            .conflicts
            .lock()
            .unwrap()
            .insert("brick node1:/data/b2".into(), 3);

        let err = start_volume(&f.engine, f.store.as_ref(), "vol1")
            .await
            .unwrap_err();
        assert!(err.is_address_in_use());
        // b1 once, b2 three times
        assert_eq!(f.daemons.starts.lock().unwrap().len(), 4);
        assert_eq!(
            *f.daemons.stops.lock().unwrap(),
            vec!["brick node1:/data/b1".to_string()]
        );
        assert_eq!(f.locks.holder("vol1"), None);

        let stored = VolumeRepository::get(f.store.as_ref(), "vol1").unwrap().unwrap();
        assert_eq!(stored.status, VolumeStatus::Created);
    }

    #[tokio::test]
    async fn test_start_validation() {
        let f = fixture();
        let err = start_volume(&f.engine, f.store.as_ref(), "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let mut vol = seed(&f, &["/data/b1"]);
        vol.status = VolumeStatus::Started;
        VolumeRepository::save(f.store.as_ref(), &vol).unwrap();
        let err = start_volume(&f.engine, f.store.as_ref(), "vol1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(f.daemons.starts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locked_volume_is_busy() {
        let f = fixture();
        seed(&f, &["/data/b1"]);
        let other = Uuid::new_v4();
        crate::txn::LockBackend::try_acquire(f.locks.as_ref(), "vol1", other)
            .await
            .unwrap();

        let err = start_volume(&f.engine, f.store.as_ref(), "vol1").await.unwrap_err();
        assert!(matches!(err.root(), Error::ResourceBusy(_)));
        assert_eq!(err.to_http_status(), axum::http::StatusCode::CONFLICT);
        assert_eq!(f.locks.holder("vol1"), Some(other));
        assert!(f.daemons.starts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_after_start() {
        let f = fixture();
        seed(&f, &["/data/b1"]);

        let err = stop_volume(&f.engine, f.store.as_ref(), "vol1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        start_volume(&f.engine, f.store.as_ref(), "vol1").await.unwrap();
        let vol = stop_volume(&f.engine, f.store.as_ref(), "vol1").await.unwrap();
        assert_eq!(vol.status, VolumeStatus::Stopped);
        assert_eq!(f.daemons.stops.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_create_volume_validation() {
        let f = fixture();
        let brick = |node, path: &str| BrickRequest {
            node_id: node,
            hostname: "node1".into(),
            path: path.into(),
        };

        let req = CreateVolumeRequest {
            name: "vol1".into(),
            bricks: vec![brick(Uuid::new_v4(), "/data/b1")],
        };
        let err = create_volume(f.node, f.store.as_ref(), f.store.as_ref(), req).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let req = CreateVolumeRequest {
            name: "vol1".into(),
            bricks: vec![brick(f.node, "/data/b1"), brick(f.node, "/data/b1")],
        };
        assert!(create_volume(f.node, f.store.as_ref(), f.store.as_ref(), req).is_err());

        let req = CreateVolumeRequest {
            name: "vol1".into(),
            bricks: vec![brick(f.node, "/data/b1")],
        };
        let vol = create_volume(f.node, f.store.as_ref(), f.store.as_ref(), req.clone()).unwrap();
        assert_eq!(vol.status, VolumeStatus::Created);
        assert_eq!(volume_info(f.store.as_ref(), "vol1").unwrap().id, vol.id);

        let err = create_volume(f.node, f.store.as_ref(), f.store.as_ref(), req).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
