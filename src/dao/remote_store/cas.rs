//! Bounded-retry compare-and-set shared by every backend.
//!
//! Backends only provide a versioned read and a conditional write; the loop
//! that re-reads and re-runs the update function after a lost race lives
//! here, so business code only ever expresses its abort predicate.

use std::future::Future;

use tracing::debug;

use crate::dao::{
    models::{CanonicalState, Snapshot, WriteOrigin},
    remote_store::{TransactOutcome, TxDecision, TxUpdate},
    storage::{StorageError, StorageResult},
};

/// Upper bound on read/write rounds before a transaction is abandoned.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 25;

/// Snapshot paired with the backend's revision token for it.
#[derive(Debug, Clone)]
pub struct Versioned<R> {
    /// State as read.
    pub snapshot: Snapshot,
    /// Token a conditional write must match.
    pub revision: R,
}

/// Capability needed to run [`run_transaction`] against a backend.
pub trait VersionedBackend: Send + Sync {
    /// Opaque token identifying a durable revision (etag, row revision, counter).
    type Revision: Clone + Send + Sync + 'static;

    /// Read the current state along with its revision.
    fn read_versioned(
        &self,
    ) -> impl Future<Output = StorageResult<Versioned<Self::Revision>>> + Send;

    /// Write `state` only if the durable revision still equals `expected`.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    fn write_if(
        &self,
        expected: &Self::Revision,
        state: &CanonicalState,
        origin: &WriteOrigin,
    ) -> impl Future<Output = StorageResult<bool>> + Send;
}

/// Run `update` atomically against `backend`, retrying on lost races.
pub async fn run_transaction<B>(
    backend: &B,
    origin: WriteOrigin,
    mut update: TxUpdate,
) -> StorageResult<TransactOutcome>
where
    B: VersionedBackend,
{
    for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
        let Versioned { snapshot, revision } = backend.read_versioned().await?;

        let next = match update(&snapshot.state) {
            TxDecision::Commit(next) => next,
            TxDecision::Abort(reason) => {
                return Ok(TransactOutcome::Aborted {
                    reason,
                    current: snapshot.state,
                });
            }
        };

        if backend.write_if(&revision, &next, &origin).await? {
            return Ok(TransactOutcome::Committed(next));
        }

        debug!(attempt, "transaction lost a compare-and-set race; retrying");
    }

    Err(StorageError::Contention {
        attempts: MAX_TRANSACTION_ATTEMPTS,
    })
}
