//! Volume start across several in-process nodes

use async_trait::async_trait;
use brickmgr::commands::{self, StepDeps};
use brickmgr::common::{BrickConfig, Error, Result};
use brickmgr::daemon::{DaemonHandle, DaemonManager};
use brickmgr::store::{
    Brick, MembershipBackend, MetadataStore, StoreReconfigure, Volume, VolumeRepository,
    VolumeStatus,
};
use brickmgr::txn::{LocalLocks, LoopbackRelay, StepRegistry, TxnEngine, TxnOptions};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

/// Brick processes of one node; optionally every start hits a busy port.
#[derive(Default)]
struct NodeDaemons {
    busy: Mutex<bool>,
    running: Mutex<Vec<String>>,
    starts: Mutex<usize>,
}

#[async_trait]
impl DaemonManager for NodeDaemons {
    async fn start(&self, daemon: &DaemonHandle, _wait: bool) -> Result<()> {
        *self.starts.lock().unwrap() += 1;
        if *self.busy.lock().unwrap() {
            return Err(Error::AddressInUse(daemon.name.clone()));
        }
        let mut running = self.running.lock().unwrap();
        if !running.contains(&daemon.name) {
            running.push(daemon.name.clone());
        }
        Ok(())
    }

    async fn stop(&self, daemon: &DaemonHandle, _force: bool) -> Result<()> {
        self.running.lock().unwrap().retain(|n| n != &daemon.name);
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

struct Node {
    id: Uuid,
    engine: Arc<TxnEngine>,
    daemons: Arc<NodeDaemons>,
}

struct Cluster {
    _dir: TempDir,
    store: Arc<MetadataStore>,
    locks: Arc<LocalLocks>,
    nodes: Vec<Node>,
}

fn cluster(size: usize) -> Cluster {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MetadataStore::open(dir.path().join("meta")).unwrap());
    let locks = Arc::new(LocalLocks::new());
    let relay = Arc::new(LoopbackRelay::new());

    let nodes = (0..size)
        .map(|_| {
            let id = Uuid::new_v4();
            let daemons = Arc::new(NodeDaemons::default());
            let deps = StepDeps {
                node_id: id,
                peers: store.clone(),
                volumes: store.clone(),
                membership: Arc::new(NoMembership),
                daemons: daemons.clone(),
                bricks: BrickConfig {
                    start_retry_interval_ms: 5,
                    ..Default::default()
                },
            };
            let mut registry = StepRegistry::new();
            commands::register_step_funcs(&mut registry, &deps).unwrap();
            let engine = Arc::new(TxnEngine::new(
                id,
                Arc::new(registry),
                locks.clone(),
                relay.clone(),
                TxnOptions::default(),
            ));
            relay.register(&engine);
            Node {
                id,
                engine,
                daemons,
            }
        })
        .collect();

    Cluster {
        _dir: dir,
        store,
        locks,
        nodes,
    }
}

fn seed_volume(c: &Cluster) {
    let bricks = c
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| Brick {
            node_id: n.id,
            hostname: format!("node{}", i),
            path: "/data/b1".into(),
        })
        .collect();
    VolumeRepository::save(c.store.as_ref(), &Volume::new("vol1", bricks)).unwrap();
}

#[tokio::test]
async fn test_start_runs_on_every_brick_node() {
    let c = cluster(3);
    seed_volume(&c);

    let vol = commands::start_volume(&c.nodes[0].engine, c.store.as_ref(), "vol1")
        .await
        .unwrap();
    assert_eq!(vol.status, VolumeStatus::Started);
    for (i, node) in c.nodes.iter().enumerate() {
        assert_eq!(
            *node.daemons.running.lock().unwrap(),
            vec![format!("brick node{}:/data/b1", i)]
        );
    }
    assert_eq!(c.locks.holder("vol1"), None);
}

#[tokio::test]
async fn test_failed_node_reports_step_and_node() {
    let c = cluster(2);
    seed_volume(&c);
    *c.nodes[1].daemons.busy.lock().unwrap() = true;

    let err = commands::start_volume(&c.nodes[0].engine, c.store.as_ref(), "vol1")
        .await
        .unwrap_err();
    match &err {
        Error::StepFailed { step, node, .. } => {
            assert_eq!(step, "vol-start.Commit");
            assert_eq!(*node, c.nodes[1].id);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(*c.nodes[1].daemons.starts.lock().unwrap(), 3);
    assert!(c.nodes[1].daemons.running.lock().unwrap().is_empty());
    assert_eq!(c.locks.holder("vol1"), None);

    let stored = VolumeRepository::get(c.store.as_ref(), "vol1").unwrap().unwrap();
    assert_eq!(stored.status, VolumeStatus::Created);
}

#[tokio::test]
async fn test_start_can_be_retried_after_failure() {
    let c = cluster(2);
    seed_volume(&c);
    *c.nodes[1].daemons.busy.lock().unwrap() = true;
    assert!(commands::start_volume(&c.nodes[0].engine, c.store.as_ref(), "vol1")
        .await
        .is_err());

    *c.nodes[1].daemons.busy.lock().unwrap() = false;
    commands::start_volume(&c.nodes[0].engine, c.store.as_ref(), "vol1")
        .await
        .unwrap();
    assert_eq!(c.nodes[0].daemons.running.lock().unwrap().len(), 1);
    assert_eq!(c.nodes[1].daemons.running.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_starts_one_wins() {
    let c = cluster(1);
    seed_volume(&c);
    let other_owner = Uuid::new_v4();
    brickmgr::txn::LockBackend::try_acquire(c.locks.as_ref(), "vol1", other_owner)
        .await
        .unwrap();

    let err = commands::start_volume(&c.nodes[0].engine, c.store.as_ref(), "vol1")
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::ResourceBusy(_)));

    brickmgr::txn::LockBackend::release(c.locks.as_ref(), "vol1", other_owner)
        .await
        .unwrap();
    commands::start_volume(&c.nodes[0].engine, c.store.as_ref(), "vol1")
        .await
        .unwrap();
}
