//! Transactions and the engine that runs them
//!
//! Steps run strictly in order; each step fans out to its node set and must
//! succeed everywhere. When a step fails, the Undo functions of the steps
//! that already completed run in reverse order on the same node sets. The
//! failed step itself is not undone: rollback is tracked per step, not per
//! node, so Do functions clean up their own partial work before failing.

use crate::common::{Error, Result, TxnConfig};
use crate::txn::context::TxnCtx;
use crate::txn::dispatch::{first_failure, Dispatcher, StepExecutor};
use crate::txn::lock::{self, LockBackend};
use crate::txn::registry::StepRegistry;
use crate::txn::relay::RelayRequest;
use crate::txn::step::{NodeId, ResolvedFn, Step, StepFn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Engine tunables
#[derive(Debug, Clone, Default)]
pub struct TxnOptions {
    /// Deadline for the forward phase of a transaction
    pub deadline: Option<Duration>,
}

impl From<&TxnConfig> for TxnOptions {
    fn from(config: &TxnConfig) -> Self {
        Self {
            deadline: config.deadline(),
        }
    }
}

/// Per-node transaction engine: registry, dispatcher and lock backend.
pub struct TxnEngine {
    registry: Arc<StepRegistry>,
    dispatcher: Dispatcher,
    locks: Arc<dyn LockBackend>,
    options: TxnOptions,
}

impl TxnEngine {
    pub fn new(
        node_id: NodeId,
        registry: Arc<StepRegistry>,
        locks: Arc<dyn LockBackend>,
        relay: Arc<dyn StepExecutor>,
        options: TxnOptions,
    ) -> Self {
        Self::with_dispatcher(Dispatcher::new(node_id, relay), registry, locks, options)
    }

    pub fn with_dispatcher(
        dispatcher: Dispatcher,
        registry: Arc<StepRegistry>,
        locks: Arc<dyn LockBackend>,
        options: TxnOptions,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            locks,
            options,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.dispatcher.local_node()
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// New transaction: no steps, no nodes, empty context.
    pub fn new_txn(self: &Arc<Self>) -> Transaction {
        let id = Uuid::new_v4();
        let (cancel, _) = watch::channel(false);
        Transaction {
            id,
            nodes: Vec::new(),
            steps: Vec::new(),
            ctx: TxnCtx::new(id, self.node_id()),
            engine: self.clone(),
            cancel: Arc::new(cancel),
            cleaned_up: false,
        }
    }

    /// Run a step function relayed from another node's transaction.
    pub async fn run_relayed(&self, request: RelayRequest) -> Result<()> {
        let func = self.registry.resolve(&request.step)?;
        let ctx = TxnCtx::from_snapshot(request.txn_id, self.node_id(), request.context);
        let span = tracing::info_span!(parent: ctx.logger(), "relayed_step", step = %request.step);
        let result = func.call(&ctx).instrument(span).await;
        if let Err(e) = &result {
            tracing::error!(
                parent: ctx.logger(),
                step = %request.step,
                error = %e,
                "relayed step failed"
            );
        }
        result
    }

    fn resolve_fn(&self, f: &StepFn, owner: Uuid) -> Result<ResolvedFn> {
        match f {
            StepFn::Named(name) => Ok(ResolvedFn {
                name: name.clone(),
                func: self.registry.resolve(name)?,
                local_only: false,
            }),
            builtin => lock::resolve_builtin(builtin, &self.locks, owner)
                .ok_or_else(|| Error::Internal(format!("unresolvable step function {}", builtin))),
        }
    }
}

/// Cancels a running transaction from another task.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Debug)]
struct ResolvedStep {
    label: String,
    do_fn: ResolvedFn,
    undo_fn: Option<ResolvedFn>,
    nodes: Vec<NodeId>,
}

/// One administrative operation across a set of nodes.
///
/// Owned by the request handler that created it, which must call
/// [`Transaction::cleanup`] on every exit path. Dropping an uncleaned
/// transaction logs a warning and releases its lock tokens in the background.
pub struct Transaction {
    id: Uuid,
    nodes: Vec<NodeId>,
    steps: Vec<Step>,
    ctx: TxnCtx,
    engine: Arc<TxnEngine>,
    cancel: Arc<watch::Sender<bool>>,
    cleaned_up: bool,
}

impl Transaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ctx(&self) -> &TxnCtx {
        &self.ctx
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn set_nodes(&mut self, nodes: Vec<NodeId>) {
        self.nodes = dedup(nodes);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Lock/unlock pair for `resource`, run on this node.
    pub fn create_lock_steps(&self, resource: &str) -> (Step, Step) {
        lock::create_lock_steps(resource, self.engine.node_id())
    }

    /// Append a step. Every named function must already be registered.
    pub fn add_step(&mut self, step: Step) -> Result<()> {
        for name in step.named_functions() {
            if !self.engine.registry.contains(name) {
                return Err(Error::StepNotRegistered(name.to_string()));
            }
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Resolve every step before any node is contacted.
    fn resolve(&self) -> Result<Vec<ResolvedStep>> {
        let local = self.engine.node_id();
        self.steps
            .iter()
            .map(|step| {
                let nodes = if step.do_fn.is_builtin() {
                    if step.nodes.iter().any(|n| *n != local) {
                        return Err(Error::InvalidRequest(format!(
                            "{} must run on the orchestrating node",
                            step.do_fn
                        )));
                    }
                    vec![local]
                } else if step.nodes.is_empty() {
                    self.nodes.clone()
                } else {
                    if let Some(stray) = step.nodes.iter().find(|n| !self.nodes.contains(n)) {
                        return Err(Error::InvalidRequest(format!(
                            "step {} targets node {} outside the transaction",
                            step.do_fn, stray
                        )));
                    }
                    dedup(step.nodes.clone())
                };
                if nodes.is_empty() {
                    return Err(Error::InvalidRequest(format!(
                        "step {} has no nodes to run on",
                        step.do_fn
                    )));
                }
                Ok(ResolvedStep {
                    label: step.do_fn.to_string(),
                    do_fn: self.engine.resolve_fn(&step.do_fn, self.id)?,
                    undo_fn: step
                        .undo_fn
                        .as_ref()
                        .map(|f| self.engine.resolve_fn(f, self.id))
                        .transpose()?,
                    nodes,
                })
            })
            .collect()
    }

    /// Run all steps, rolling back completed steps if one fails.
    ///
    /// Returns the original failure; Undo failures are only logged.
    pub async fn execute(&mut self) -> Result<()> {
        let plan = self.resolve()?;
        let mut cancelled = self.cancel.subscribe();
        let deadline = self.engine.options.deadline.map(|d| Instant::now() + d);

        tracing::info!(
            parent: self.ctx.logger(),
            steps = plan.len(),
            nodes = self.nodes.len(),
            "executing transaction"
        );

        for (i, step) in plan.iter().enumerate() {
            let dispatch = self
                .engine
                .dispatcher
                .dispatch(&step.do_fn, &step.nodes, &self.ctx);

            let result = tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancelled) => {
                    Err(Error::Cancelled(format!("aborted during step {}", step.label)))
                }
                _ = wait_deadline(deadline) => {
                    Err(Error::Timeout(format!(
                        "transaction deadline exceeded during step {}",
                        step.label
                    )))
                }
                outcomes = dispatch => first_failure(&step.do_fn.name, outcomes),
            };

            if let Err(e) = result {
                tracing::error!(
                    parent: self.ctx.logger(),
                    step = %step.label,
                    error = %e,
                    "transaction step failed, rolling back"
                );
                self.rollback(&plan[..i]).await;
                return Err(e);
            }
        }

        tracing::info!(parent: self.ctx.logger(), "transaction completed");
        Ok(())
    }

    async fn rollback(&self, done: &[ResolvedStep]) {
        for step in done.iter().rev() {
            let Some(undo) = &step.undo_fn else {
                continue;
            };
            let outcomes = self
                .engine
                .dispatcher
                .dispatch(undo, &step.nodes, &self.ctx)
                .await;
            for outcome in outcomes {
                if let Err(e) = outcome.result {
                    tracing::error!(
                        parent: self.ctx.logger(),
                        step = %step.label,
                        undo = %undo.name,
                        node = %outcome.node,
                        error = %e,
                        "undo failed, manual intervention required"
                    );
                }
            }
        }
    }

    fn lock_resources(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| match &s.do_fn {
                StepFn::Lock(resource) => Some(resource.clone()),
                _ => None,
            })
            .collect()
    }

    /// Release everything this transaction still holds.
    pub async fn cleanup(mut self) {
        for resource in self.lock_resources() {
            if let Err(e) = self.engine.locks.release(&resource, self.id).await {
                tracing::warn!(
                    parent: self.ctx.logger(),
                    resource = %resource,
                    error = %e,
                    "failed to release lock during cleanup"
                );
            }
        }
        self.ctx.clear();
        self.cleaned_up = true;
        tracing::debug!(parent: self.ctx.logger(), "transaction cleaned up");
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.cleaned_up {
            return;
        }
        tracing::warn!(parent: self.ctx.logger(), "transaction dropped without cleanup");
        let resources = self.lock_resources();
        if resources.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let locks = self.engine.locks.clone();
        let owner = self.id;
        runtime.spawn(async move {
            for resource in resources {
                if let Err(e) = locks.release(&resource, owner).await {
                    tracing::warn!(
                        txn = %owner,
                        resource = %resource,
                        error = %e,
                        "failed to release lock of dropped transaction"
                    );
                }
            }
        });
    }
}

fn dedup(nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !seen.contains(&node) {
            seen.push(node);
        }
    }
    seen
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::lock::LocalLocks;
    use crate::txn::relay::LoopbackRelay;
    use crate::txn::step::StepFunc;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Appends "<name>@<node>" to the journal, optionally failing.
    struct Record {
        name: String,
        journal: Journal,
        fail: bool,
    }

    #[async_trait]
    impl StepFunc for Record {
        async fn call(&self, ctx: &TxnCtx) -> Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}@{}", self.name, ctx.node_id()));
            if self.fail {
                Err(Error::Internal(format!("{} failed", self.name)))
            } else {
                Ok(())
            }
        }
    }

    struct Sleep(Duration);

    #[async_trait]
    impl StepFunc for Sleep {
        async fn call(&self, _ctx: &TxnCtx) -> Result<()> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    fn registry(journal: &Journal, failing: &[&str]) -> StepRegistry {
        let mut registry = StepRegistry::new();
        for i in 1..=4 {
            for kind in ["Do", "Undo"] {
                let name = format!("s{}.{}", i, kind);
                registry
                    .register(
                        name.clone(),
                        Arc::new(Record {
                            fail: failing.contains(&name.as_str()),
                            name,
                            journal: journal.clone(),
                        }),
                    )
                    .unwrap();
            }
        }
        registry
    }

    fn engine(node: NodeId, registry: StepRegistry, options: TxnOptions) -> Arc<TxnEngine> {
        Arc::new(TxnEngine::new(
            node,
            Arc::new(registry),
            Arc::new(LocalLocks::new()),
            Arc::new(LoopbackRelay::new()),
            options,
        ))
    }

    fn names(journal: &Journal) -> Vec<String> {
        journal
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.split('@').next().unwrap().to_string())
            .collect()
    }

    fn four_steps(txn: &mut Transaction) {
        for i in 1..=4 {
            txn.add_step(Step::new(format!("s{}.Do", i), vec![]).with_undo(format!("s{}.Undo", i)))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_all_steps_succeed_without_undo() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let engine = engine(me, registry(&journal, &[]), TxnOptions::default());

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        four_steps(&mut txn);
        txn.execute().await.unwrap();
        txn.cleanup().await;

        assert_eq!(names(&journal), vec!["s1.Do", "s2.Do", "s3.Do", "s4.Do"]);
    }

    #[tokio::test]
    async fn test_failure_undoes_previous_steps_in_reverse() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let engine = engine(me, registry(&journal, &["s3.Do"]), TxnOptions::default());

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        four_steps(&mut txn);
        let err = txn.execute().await.unwrap_err();
        txn.cleanup().await;

        assert!(matches!(
            err,
            Error::StepFailed { ref step, node, .. } if step == "s3.Do" && node == me
        ));
        assert_eq!(
            names(&journal),
            vec!["s1.Do", "s2.Do", "s3.Do", "s2.Undo", "s1.Undo"]
        );
    }

    #[tokio::test]
    async fn test_first_step_failure_undoes_nothing() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let engine = engine(me, registry(&journal, &["s1.Do"]), TxnOptions::default());

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        four_steps(&mut txn);
        assert!(txn.execute().await.is_err());
        txn.cleanup().await;
        assert_eq!(names(&journal), vec!["s1.Do"]);
    }

    #[tokio::test]
    async fn test_undo_failure_does_not_mask_original_error() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let engine = engine(
            me,
            registry(&journal, &["s2.Do", "s1.Undo"]),
            TxnOptions::default(),
        );

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        four_steps(&mut txn);
        let err = txn.execute().await.unwrap_err();
        txn.cleanup().await;
        assert!(matches!(err, Error::StepFailed { ref step, .. } if step == "s2.Do"));
        assert_eq!(names(&journal), vec!["s1.Do", "s2.Do", "s1.Undo"]);
    }

    #[tokio::test]
    async fn test_unregistered_function_rejected_before_any_node() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let engine = engine(me, registry(&journal, &[]), TxnOptions::default());

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        txn.add_step(Step::new("s1.Do", vec![])).unwrap();
        assert!(matches!(
            txn.add_step(Step::new("missing.Do", vec![])),
            Err(Error::StepNotRegistered(_))
        ));
        // Steps pushed directly still fail resolution before dispatch
        txn.steps.push(Step::new("s2.Do", vec![]).with_undo("missing.Undo"));
        assert!(matches!(
            txn.execute().await,
            Err(Error::StepNotRegistered(name)) if name == "missing.Undo"
        ));
        txn.cleanup().await;
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_step_nodes_must_belong_to_transaction() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let engine = engine(me, registry(&journal, &[]), TxnOptions::default());

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        txn.add_step(Step::new("s1.Do", vec![Uuid::new_v4()])).unwrap();
        assert!(matches!(
            txn.execute().await,
            Err(Error::InvalidRequest(_))
        ));
        txn.cleanup().await;
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multi_node_context_visible_everywhere() {
        #[derive(Clone)]
        struct ReadVolname {
            seen: Arc<Mutex<Vec<(NodeId, String)>>>,
        }

        #[async_trait]
        impl StepFunc for ReadVolname {
            async fn call(&self, ctx: &TxnCtx) -> Result<()> {
                let volname: String = ctx.get("volname")?;
                self.seen.lock().unwrap().push((ctx.node_id(), volname));
                Ok(())
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let relay = Arc::new(LoopbackRelay::new());
        let locks: Arc<dyn LockBackend> = Arc::new(LocalLocks::new());
        let nodes: Vec<NodeId> = (0..3).map(|_| Uuid::new_v4()).collect();
        let engines: Vec<Arc<TxnEngine>> = nodes
            .iter()
            .map(|&node| {
                let mut registry = StepRegistry::new();
                registry
                    .register("read.Do", Arc::new(ReadVolname { seen: seen.clone() }))
                    .unwrap();
                let engine = Arc::new(TxnEngine::new(
                    node,
                    Arc::new(registry),
                    locks.clone(),
                    relay.clone(),
                    TxnOptions::default(),
                ));
                relay.register(&engine);
                engine
            })
            .collect();

        let mut txn = engines[0].new_txn();
        txn.set_nodes(nodes.clone());
        txn.ctx().set("volname", "vol1").unwrap();
        let (lock, unlock) = txn.create_lock_steps("vol1");
        txn.add_step(lock).unwrap();
        txn.add_step(Step::new("read.Do", vec![])).unwrap();
        txn.add_step(Step::new("read.Do", vec![])).unwrap();
        txn.add_step(unlock).unwrap();
        txn.execute().await.unwrap();
        txn.cleanup().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        for node in &nodes {
            assert_eq!(seen.iter().filter(|(n, _)| n == node).count(), 2);
        }
        assert!(seen.iter().all(|(_, v)| v == "vol1"));
    }

    #[tokio::test]
    async fn test_lock_held_by_other_transaction_is_busy() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let engine = engine(me, registry(&journal, &[]), TxnOptions::default());

        let mut holder = engine.new_txn();
        holder.set_nodes(vec![me]);
        let (lock, _unlock) = holder.create_lock_steps("vol1");
        holder.add_step(lock).unwrap();
        holder.execute().await.unwrap();

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        let (lock, unlock) = txn.create_lock_steps("vol1");
        txn.add_step(lock).unwrap();
        txn.add_step(Step::new("s1.Do", vec![]).with_undo("s1.Undo"))
            .unwrap();
        txn.add_step(unlock).unwrap();
        let err = txn.execute().await.unwrap_err();
        assert!(matches!(err.root(), Error::ResourceBusy(r) if r == "vol1"));
        txn.cleanup().await;
        assert!(journal.lock().unwrap().is_empty());

        // Cleanup of the holder releases the token
        holder.cleanup().await;
        let mut again = engine.new_txn();
        again.set_nodes(vec![me]);
        let (lock, unlock) = again.create_lock_steps("vol1");
        again.add_step(lock).unwrap();
        again.add_step(unlock).unwrap();
        again.execute().await.unwrap();
        again.cleanup().await;
    }

    #[tokio::test]
    async fn test_failure_after_lock_releases_token() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let locks = Arc::new(LocalLocks::new());
        let engine = Arc::new(TxnEngine::new(
            me,
            Arc::new(registry(&journal, &["s1.Do"])),
            locks.clone(),
            Arc::new(LoopbackRelay::new()),
            TxnOptions::default(),
        ));

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        let (lock, unlock) = txn.create_lock_steps("vol1");
        txn.add_step(lock).unwrap();
        txn.add_step(Step::new("s1.Do", vec![]).with_undo("s1.Undo"))
            .unwrap();
        txn.add_step(unlock).unwrap();
        assert!(txn.execute().await.is_err());
        // Released by the lock step's Undo, before cleanup
        assert_eq!(locks.holder("vol1"), None);
        txn.cleanup().await;
    }

    #[tokio::test]
    async fn test_deadline_rolls_back() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let mut registry = registry(&journal, &[]);
        registry
            .register("slow.Do", Arc::new(Sleep(Duration::from_secs(5))))
            .unwrap();
        let engine = engine(
            me,
            registry,
            TxnOptions {
                deadline: Some(Duration::from_millis(100)),
            },
        );

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        txn.add_step(Step::new("s1.Do", vec![]).with_undo("s1.Undo"))
            .unwrap();
        txn.add_step(Step::new("slow.Do", vec![])).unwrap();
        let err = txn.execute().await.unwrap_err();
        txn.cleanup().await;

        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(names(&journal), vec!["s1.Do", "s1.Undo"]);
    }

    #[tokio::test]
    async fn test_cancel_rolls_back() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let mut registry = registry(&journal, &[]);
        registry
            .register("slow.Do", Arc::new(Sleep(Duration::from_secs(5))))
            .unwrap();
        let engine = engine(me, registry, TxnOptions::default());

        let mut txn = engine.new_txn();
        txn.set_nodes(vec![me]);
        txn.add_step(Step::new("s1.Do", vec![]).with_undo("s1.Undo"))
            .unwrap();
        txn.add_step(Step::new("slow.Do", vec![])).unwrap();

        let handle = txn.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });
        let err = txn.execute().await.unwrap_err();
        txn.cleanup().await;

        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(names(&journal), vec!["s1.Do", "s1.Undo"]);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_lock() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let locks = Arc::new(LocalLocks::new());
        let engine = Arc::new(TxnEngine::new(
            me,
            Arc::new(registry(&journal, &[])),
            locks.clone(),
            Arc::new(LoopbackRelay::new()),
            TxnOptions::default(),
        ));

        {
            let mut txn = engine.new_txn();
            txn.set_nodes(vec![me]);
            let (lock, _unlock) = txn.create_lock_steps("vol1");
            txn.add_step(lock).unwrap();
            txn.execute().await.unwrap();
            assert!(locks.holder("vol1").is_some());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(locks.holder("vol1"), None);
    }

    /// Grants every lock; every release fails.
    #[derive(Default)]
    struct StuckLocks {
        releases: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LockBackend for StuckLocks {
        async fn try_acquire(&self, _resource: &str, _owner: Uuid) -> Result<()> {
            Ok(())
        }

        async fn release(&self, resource: &str, _owner: Uuid) -> Result<()> {
            self.releases.lock().unwrap().push(resource.to_string());
            Err(Error::Internal("store unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_release_failure_continues() {
        let journal = Journal::default();
        let me = Uuid::new_v4();
        let locks = Arc::new(StuckLocks::default());
        let engine = Arc::new(TxnEngine::new(
            me,
            Arc::new(registry(&journal, &[])),
            locks.clone(),
            Arc::new(LoopbackRelay::new()),
            TxnOptions::default(),
        ));

        {
            let mut txn = engine.new_txn();
            txn.set_nodes(vec![me]);
            for resource in ["vol1", "vol2"] {
                let (lock, _unlock) = txn.create_lock_steps(resource);
                txn.add_step(lock).unwrap();
            }
            txn.execute().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*locks.releases.lock().unwrap(), vec!["vol1", "vol2"]);
    }
}
