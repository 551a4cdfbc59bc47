//! Distributed transaction engine
//!
//! A [`Transaction`] is an ordered list of [`Step`]s run across a set of
//! nodes with a shared [`TxnCtx`]. Step functions are looked up by name in
//! the [`StepRegistry`] built at start-up; each step is dispatched to its
//! nodes concurrently, locally or through the relay; a failure undoes the
//! steps already completed, newest first.
//!
//! ```text
//!  handler ──► Transaction::execute
//!                 │  lock(vol1)            (orchestrator only)
//!                 │  vol-start.Commit ───► node A (local call)
//!                 │                   └──► node B (relay)
//!                 │  unlock(vol1)
//!                 └─ on failure: Undo completed steps in reverse
//! ```

pub mod context;
pub mod dispatch;
pub mod lock;
pub mod registry;
pub mod relay;
pub mod step;
pub mod transaction;

pub use context::{CtxSnapshot, TxnCtx};
pub use dispatch::{Dispatcher, LocalExecutor, NodeOutcome, StepExecutor};
pub use lock::{create_lock_steps, LocalLocks, LockBackend, StandaloneLocks};
pub use registry::StepRegistry;
pub use relay::{HttpRelay, LoopbackRelay, RelayError, RelayRequest, RELAY_PATH};
pub use step::{NodeId, ResolvedFn, Step, StepFn, StepFunc};
pub use transaction::{CancelHandle, Transaction, TxnEngine, TxnOptions};
