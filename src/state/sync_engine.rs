//! Session lifecycle, optimistic mutations and subscription handling.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock, broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        identity::Identity,
        models::{CanonicalState, ScoreKey, Snapshot, WriteOrigin},
        remote_store::{RemoteStore, SnapshotListener, Subscription, TransactOutcome, TxUpdate},
        storage::StorageResult,
    },
    error::SyncError,
    state::{
        cache::{Reconciliation, StateCache, StateChange},
        catalog::ActivityCatalog,
        claim::{add_or_claim_update, claim_update},
        input::{parse_activity_id, parse_score, parse_score_date, sanitize_player_name},
        session::{SessionEvent, SessionMachine, SessionPhase, SessionSnapshot},
    },
};

/// Result type returned by engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

const CHANGE_CAPACITY: usize = 64;
/// Default coalescing window for score edits.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
/// Default roster capacity.
pub const DEFAULT_MAX_PLAYERS: usize = 10;

/// Tunables for [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Activities and winner metrics scores are validated against.
    pub catalog: Arc<ActivityCatalog>,
    /// Roster capacity enforced by add-or-claim.
    pub max_players: usize,
    /// Quiet period after the last score edit before the batch is written.
    pub debounce: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            catalog: Arc::new(ActivityCatalog::default()),
            max_players: DEFAULT_MAX_PLAYERS,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Consistent view of the engine for readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineView {
    /// Session phase and generation.
    pub session: SessionSnapshot,
    /// Cache version the state was read at.
    pub version: u64,
    /// Uid of the installed identity.
    pub identity: Option<String>,
    /// Cached state, pending score edits included.
    pub state: CanonicalState,
}

impl EngineView {
    /// Profile the signed-in identity has claimed, if any.
    pub fn active_player(&self) -> Option<&str> {
        self.identity
            .as_deref()
            .and_then(|uid| self.state.binding_for(uid))
    }
}

/// Outcome of a successful claim or add-or-claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimOutcome {
    /// Sanitized profile name.
    pub player: String,
    /// Whether the caller's identity is now bound to `player`.
    pub bound: bool,
}

/// Subscription plus the task draining its deliveries; both stop on drop.
struct LiveFeed {
    _subscription: Subscription,
    pump: JoinHandle<()>,
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

type FlushWaiter = oneshot::Sender<SyncResult<()>>;

/// Callers waiting for the debounce window to close. The edits themselves
/// are queued in the [`StateCache`].
#[derive(Default)]
struct FlushQueue {
    generation: u64,
    waiters: Vec<FlushWaiter>,
}

impl FlushQueue {
    /// Take the pending waiters and invalidate any armed timer.
    fn drain(&mut self) -> Vec<FlushWaiter> {
        self.generation += 1;
        std::mem::take(&mut self.waiters)
    }
}

/// Owns the cached shared state and keeps it in sync with a [`RemoteStore`].
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    settings: EngineSettings,
    session: RwLock<SessionMachine>,
    cache: Mutex<StateCache>,
    live: Mutex<Option<LiveFeed>>,
    flush: Mutex<FlushQueue>,
    changes: broadcast::Sender<StateChange>,
}

impl SyncEngine {
    /// Build an engine around `store`; nothing happens until [`SyncEngine::sign_in`].
    pub fn new(store: Arc<dyn RemoteStore>, settings: EngineSettings) -> Arc<Self> {
        let (changes, _receiver) = broadcast::channel(CHANGE_CAPACITY);
        Arc::new(Self {
            store,
            settings,
            session: RwLock::new(SessionMachine::new()),
            cache: Mutex::new(StateCache::new(Uuid::new_v4())),
            live: Mutex::new(None),
            flush: Mutex::new(FlushQueue::default()),
            changes,
        })
    }

    /// Tunables the engine was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Backend the engine syncs with.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Observe every applied cache change.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Current session phase.
    pub async fn session(&self) -> SessionSnapshot {
        self.session.read().await.snapshot()
    }

    /// Current state, session and identity in one read.
    pub async fn view(&self) -> EngineView {
        let session = self.session().await;
        let identity = self.store.identity().current().map(|identity| identity.uid);
        let cache = self.cache.lock().await;
        EngineView {
            session,
            version: cache.version(),
            identity,
            state: cache.state().clone(),
        }
    }

    fn publish(&self, change: StateChange) {
        let _ = self.changes.send(change);
    }

    /// Establish `identity` (or an anonymous one), load the state and go live.
    ///
    /// A supplied identity must pass the backend's credential check. An
    /// already active session is torn down once the new identity is known.
    pub async fn sign_in(self: &Arc<Self>, identity: Option<Identity>) -> SyncResult<Identity> {
        let identity = match identity {
            Some(identity) => self.store.verify_identity(identity).await?,
            None => self.store.sign_in_anonymously().await?,
        };

        if self.session().await.phase != SessionPhase::Unauthenticated {
            self.sign_out().await?;
        }

        let loading = {
            let mut session = self.session.write().await;
            session.apply(SessionEvent::SignedIn)?;
            self.store.identity().set(Some(identity.clone()));
            session.snapshot()
        };
        info!(uid = %identity.uid, backend = %self.store.kind(), "session loading");

        let loaded = self.open_feed().await;

        let mut session = self.session.write().await;
        if session.snapshot() != loading {
            // Signed out while loading; the feed is dropped here.
            return Err(SyncError::Unauthenticated);
        }
        match loaded {
            Ok(feed) => {
                *self.live.lock().await = Some(feed);
                session.apply(SessionEvent::Loaded)?;
                info!(uid = %identity.uid, "session live");
                Ok(identity)
            }
            Err(err) => {
                self.store.identity().set(None);
                session.apply(SessionEvent::LoadFailed)?;
                let change = self.cache.lock().await.clear();
                self.publish(change);
                warn!(error = %err, "initial load failed");
                Err(err)
            }
        }
    }

    async fn open_feed(self: &Arc<Self>) -> SyncResult<LiveFeed> {
        let snapshot = self.store.read().await?;
        {
            let mut cache = self.cache.lock().await;
            let change = cache.load(snapshot);
            self.publish(change);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let listener: SnapshotListener = Arc::new(move |delivery| {
            let _ = sender.send(delivery);
        });
        let subscription = self.store.subscribe(listener)?;
        let pump = tokio::spawn(Self::pump(Arc::downgrade(self), receiver));

        Ok(LiveFeed {
            _subscription: subscription,
            pump,
        })
    }

    async fn pump(
        engine: Weak<Self>,
        mut deliveries: mpsc::UnboundedReceiver<StorageResult<Snapshot>>,
    ) {
        while let Some(delivery) = deliveries.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            engine.on_delivery(delivery).await;
        }
    }

    async fn on_delivery(&self, delivery: StorageResult<Snapshot>) {
        match delivery {
            Ok(snapshot) => {
                let outcome = self.cache.lock().await.reconcile(snapshot);
                match outcome {
                    Reconciliation::Applied(change) => self.publish(change),
                    Reconciliation::SkippedStale {
                        seq,
                        newest_pending,
                    } => debug!(seq, newest_pending, "skipped superseded self-echo"),
                }
            }
            Err(err) => warn!(error = %err, "subscription delivery failed; keeping cached state"),
        }
    }

    /// End the session: stop the subscription, drop the identity, empty the cache.
    ///
    /// Score edits still waiting for their flush are failed with `Unauthenticated`.
    pub async fn sign_out(&self) -> SyncResult<()> {
        {
            let mut session = self.session.write().await;
            session.apply(SessionEvent::SignedOut)?;
            self.live.lock().await.take();
            self.store.identity().set(None);
        }

        let waiters = self.flush.lock().await.drain();
        for waiter in waiters {
            let _ = waiter.send(Err(SyncError::Unauthenticated));
        }

        let change = self.cache.lock().await.clear();
        self.publish(change);
        info!("session ended");
        Ok(())
    }

    /// Flush pending edits and end the session, if any.
    pub async fn shutdown(&self) {
        if self.session().await.phase == SessionPhase::Unauthenticated {
            return;
        }
        if let Err(err) = self.flush_pending().await {
            warn!(error = %err, "pending score edits lost during shutdown");
        }
        if let Err(err) = self.sign_out().await {
            debug!(error = %err, "session already closed during shutdown");
        }
    }

    async fn require_live(&self) -> SyncResult<Identity> {
        if self.session().await.phase != SessionPhase::Live {
            return Err(SyncError::Unauthenticated);
        }
        Ok(self.store.identity().require()?)
    }

    /// Register `name` and claim it, or claim it if it already exists.
    pub async fn add_or_claim(&self, name: &str) -> SyncResult<ClaimOutcome> {
        let player = sanitize_player_name(name)?;
        let identity = self.require_live().await?;
        let update = add_or_claim_update(player.clone(), identity.uid.clone(), self.settings.max_players);
        self.run_claim(player, identity, update).await
    }

    /// Bind the caller to the existing profile `name`.
    pub async fn claim(&self, name: &str) -> SyncResult<ClaimOutcome> {
        let player = sanitize_player_name(name)?;
        let identity = self.require_live().await?;
        let update = claim_update(player.clone(), identity.uid.clone());
        self.run_claim(player, identity, update).await
    }

    async fn run_claim(
        &self,
        player: String,
        identity: Identity,
        update: TxUpdate,
    ) -> SyncResult<ClaimOutcome> {
        self.flush_pending().await?;

        let origin = self.cache.lock().await.next_origin();
        match self.store.transact(origin, update).await? {
            TransactOutcome::Committed(state) => {
                let bound = state.binding_for(&identity.uid) == Some(player.as_str());
                if let Some(change) = self.cache.lock().await.apply_committed(state, origin) {
                    self.publish(change);
                }
                info!(player = %player, bound, "claim committed");
                Ok(ClaimOutcome { player, bound })
            }
            TransactOutcome::Aborted { reason, .. } => {
                debug!(?reason, "claim aborted");
                Err(reason.into())
            }
        }
    }

    /// Remove `name` together with its scores and claims.
    pub async fn delete_player(&self, name: &str) -> SyncResult<()> {
        let player = sanitize_player_name(name)?;
        self.require_live().await?;
        self.flush_pending().await?;

        self.write_through(|state| {
            if !state.has_player(&player) {
                return Err(SyncError::ProfileNotFound {
                    player: player.clone(),
                });
            }
            Ok(state.without_player(&player))
        })
        .await
    }

    /// Wipe roster, scores and claims.
    pub async fn reset_all(&self) -> SyncResult<()> {
        self.require_live().await?;
        self.flush_pending().await?;
        self.write_through(|_| Ok(CanonicalState::default())).await
    }

    /// Apply `mutate` to the cache optimistically and write the result.
    async fn write_through<F>(&self, mutate: F) -> SyncResult<()>
    where
        F: FnOnce(&CanonicalState) -> SyncResult<CanonicalState>,
    {
        let (next, origin) = {
            let mut cache = self.cache.lock().await;
            let next = mutate(cache.state())?;
            let origin = cache.next_origin();
            let change = cache.apply_local(next.clone(), origin);
            self.publish(change);
            (next, origin)
        };
        self.write(next, origin).await
    }

    async fn write(&self, state: CanonicalState, origin: WriteOrigin) -> SyncResult<()> {
        match self.store.write(state, origin).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.cache.lock().await.write_failed(origin.seq);
                warn!(seq = origin.seq, error = %err, "write failed; cache keeps optimistic state");
                Err(err.into())
            }
        }
    }

    /// Set or clear (blank `raw`) the caller's score for `activity` on `date`.
    ///
    /// The cache updates immediately; the write happens once the debounce
    /// window closes and its outcome is returned to every coalesced caller.
    pub async fn update_score(
        self: &Arc<Self>,
        date: &str,
        player: &str,
        activity: &str,
        raw: &str,
    ) -> SyncResult<()> {
        let date = parse_score_date(date)?;
        let activity = parse_activity_id(activity)?;
        let value = parse_score(raw, &activity, &self.settings.catalog)?;
        let player = sanitize_player_name(player)?;
        let identity = self.require_live().await?;
        let key = ScoreKey::new(date, player, activity);

        let receiver = {
            let mut cache = self.cache.lock().await;
            let state = cache.state();
            if !state.has_player(&key.player) {
                return Err(SyncError::ProfileNotFound { player: key.player });
            }
            if state.binding_for(&identity.uid) != Some(key.player.as_str()) {
                return Err(SyncError::NotProfileOwner { player: key.player });
            }
            let change = cache.queue_edit(key, value);
            self.publish(change);

            let (sender, receiver) = oneshot::channel();
            let mut queue = self.flush.lock().await;
            queue.generation += 1;
            queue.waiters.push(sender);
            self.arm_flush(queue.generation);
            receiver
        };

        receiver.await.unwrap_or(Err(SyncError::Unauthenticated))
    }

    fn arm_flush(self: &Arc<Self>, generation: u64) {
        let engine = Arc::downgrade(self);
        let delay = self.settings.debounce;
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(engine) = engine.upgrade() {
                engine.flush_generation(generation).await;
            }
        });
    }

    async fn flush_generation(&self, generation: u64) {
        let waiters = {
            let mut queue = self.flush.lock().await;
            if queue.generation != generation || queue.waiters.is_empty() {
                return;
            }
            queue.drain()
        };
        let _ = self.write_batch(waiters).await;
    }

    /// Write any pending score edits now.
    pub async fn flush_pending(&self) -> SyncResult<()> {
        let waiters = self.flush.lock().await.drain();
        self.write_batch(waiters).await
    }

    async fn write_batch(&self, waiters: Vec<FlushWaiter>) -> SyncResult<()> {
        let batch = {
            let mut cache = self.cache.lock().await;
            let edits = cache.take_queued();
            if edits.is_empty() {
                None
            } else {
                // Queued edits are already part of the cached state, minus any
                // whose profile someone else removed meanwhile.
                let next = cache.state().clone();
                let origin = cache.next_origin();
                let change = cache.apply_local(next.clone(), origin);
                self.publish(change);
                Some((next, origin, edits.len()))
            }
        };

        let Some((next, origin, edits)) = batch else {
            // An earlier batch already carried these edits.
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
            return Ok(());
        };

        debug!(edits, seq = origin.seq, "flushing score edits");
        let result = self.write(next, origin).await;
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result
    }
}
