use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{
    RwLock,
    broadcast::{self, error::RecvError},
};
use uuid::Uuid;

use crate::dao::{
    identity::{Identity, IdentitySlot},
    models::{CanonicalState, Snapshot, WriteOrigin},
    normalize::normalize,
    remote_store::{
        BackendKind, RemoteStore, SnapshotListener, Subscription, TransactOutcome, TxUpdate,
        cas::{self, Versioned, VersionedBackend},
    },
    storage::StorageResult,
};

const CHANGE_CAPACITY: usize = 64;

/// In-process store keeping the durable document as raw JSON, like a remote would.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    document: RwLock<MemoryDocument>,
    changes: broadcast::Sender<Snapshot>,
    identity: IdentitySlot,
}

struct MemoryDocument {
    raw: Value,
    revision: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_document(Value::Null)
    }

    /// Create a store pre-seeded with a raw document in any backend shape.
    pub fn with_document(raw: Value) -> Self {
        let (changes, _receiver) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                document: RwLock::new(MemoryDocument { raw, revision: 0 }),
                changes,
                identity: IdentitySlot::new(),
            }),
        }
    }

    async fn current(&self) -> Snapshot {
        let guard = self.inner.document.read().await;
        normalize(&guard.raw)
    }

    async fn replace(&self, state: &CanonicalState, origin: &WriteOrigin) {
        let snapshot = {
            let mut guard = self.inner.document.write().await;
            guard.raw = state.to_document(Some(origin));
            guard.revision += 1;
            normalize(&guard.raw)
        };
        let _ = self.inner.changes.send(snapshot);
    }
}

impl VersionedBackend for MemoryStore {
    type Revision = u64;

    async fn read_versioned(&self) -> StorageResult<Versioned<u64>> {
        self.inner.identity.require()?;
        let guard = self.inner.document.read().await;
        Ok(Versioned {
            snapshot: normalize(&guard.raw),
            revision: guard.revision,
        })
    }

    async fn write_if(
        &self,
        expected: &u64,
        state: &CanonicalState,
        origin: &WriteOrigin,
    ) -> StorageResult<bool> {
        self.inner.identity.require()?;
        let snapshot = {
            let mut guard = self.inner.document.write().await;
            if guard.revision != *expected {
                return Ok(false);
            }
            guard.raw = state.to_document(Some(origin));
            guard.revision += 1;
            normalize(&guard.raw)
        };
        let _ = self.inner.changes.send(snapshot);
        Ok(true)
    }
}

impl RemoteStore for MemoryStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn identity(&self) -> &IdentitySlot {
        &self.inner.identity
    }

    fn sign_in_anonymously(&self) -> BoxFuture<'static, StorageResult<Identity>> {
        Box::pin(async move { Ok(Identity::new(Uuid::new_v4().to_string(), None)) })
    }

    /// There is no auth service in-process; any uid is taken at its word.
    fn verify_identity(&self, identity: Identity) -> BoxFuture<'static, StorageResult<Identity>> {
        Box::pin(async move { Ok(identity) })
    }

    fn read(&self) -> BoxFuture<'static, StorageResult<Snapshot>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.identity.require()?;
            Ok(store.current().await)
        })
    }

    fn write(
        &self,
        state: CanonicalState,
        origin: WriteOrigin,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.identity.require()?;
            store.replace(&state, &origin).await;
            Ok(())
        })
    }

    fn subscribe(&self, listener: SnapshotListener) -> StorageResult<Subscription> {
        self.inner.identity.require()?;
        let store = self.clone();
        let mut receiver = self.inner.changes.subscribe();
        let task = tokio::spawn(async move {
            listener(Ok(store.current().await));
            loop {
                match receiver.recv().await {
                    Ok(snapshot) => listener(Ok(snapshot)),
                    // Snapshot semantics: skipping intermediate states is fine.
                    Err(RecvError::Lagged(_)) => listener(Ok(store.current().await)),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::from_task(task))
    }

    fn transact(
        &self,
        origin: WriteOrigin,
        update: TxUpdate,
    ) -> BoxFuture<'static, StorageResult<TransactOutcome>> {
        let store = self.clone();
        Box::pin(async move { cas::run_transaction(&store, origin, update).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::dao::storage::StorageError;

    fn origin(seq: u64) -> WriteOrigin {
        WriteOrigin {
            client: Uuid::nil(),
            seq,
        }
    }

    fn signed_in(store: MemoryStore) -> MemoryStore {
        store.identity().set(Some(Identity::new("u1", None)));
        store
    }

    #[tokio::test]
    async fn every_operation_requires_an_identity() {
        let store = MemoryStore::new();
        assert!(matches!(store.read().await, Err(StorageError::Unauthenticated)));
        assert!(matches!(
            store.write(CanonicalState::default(), origin(1)).await,
            Err(StorageError::Unauthenticated)
        ));
        assert!(matches!(
            store.subscribe(Arc::new(|_| {})),
            Err(StorageError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn seeded_documents_are_normalized_on_read() {
        let store = signed_in(MemoryStore::with_document(json!({
            "operatives": {"1": "BB", "0": "AA"},
        })));
        let snapshot = store.read().await.unwrap();
        let players: Vec<_> = snapshot.state.players.iter().cloned().collect();
        assert_eq!(players, vec!["AA", "BB"]);
        assert!(snapshot.state.scores.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_current_state_then_writes() {
        let store = signed_in(MemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = store
            .subscribe(Arc::new(move |delivery| {
                let _ = tx.send(delivery);
            }))
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first, Snapshot::default());

        let mut state = CanonicalState::default();
        state.players.insert("AA".into());
        store.write(state.clone(), origin(7)).await.unwrap();

        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.state, state);
        assert_eq!(second.origin, Some(origin(7)));

        subscription.dispose();
        store.write(CanonicalState::default(), origin(8)).await.unwrap();
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(late, Ok(Some(_))));
    }
}
