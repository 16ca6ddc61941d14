//! Optimistic mutation protocol.
//!
//! Every write goes through [`MutationCoordinator::mutate`]:
//!
//! 1. the key is superseded, snapshotted and overwritten with the optimistic value;
//! 2. the remote operation runs;
//! 3. on failure the snapshot is restored, unless a newer write to the key has landed since;
//! 4. success or not, the key is fetched again and replaced with the authoritative result,
//!    unless another mutation on the key is still pending (that one reconciles instead).
//!
//! Each step is reported on a broadcast channel so a view can surface failures.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::cache::{Cached, Entity, QueryCache, QueryKey};
use super::store::StoreError;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Identifier of one dispatched mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(u64);

/// Lifecycle state of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending,
    SettledSuccess,
    SettledError,
}

/// Observable step of a mutation's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEvent {
    /// Optimistic value written, remote operation about to run
    Dispatched { id: MutationId, key: QueryKey },
    /// Remote operation succeeded
    Succeeded { id: MutationId, key: QueryKey },
    /// Remote operation failed; `rolled_back` is false when a newer write owned the key
    Failed {
        id: MutationId,
        key: QueryKey,
        error: StoreError,
        rolled_back: bool,
    },
    /// Reconciliation fetch returned; `applied` is false when its result was superseded
    Reconciled {
        id: MutationId,
        key: QueryKey,
        applied: bool,
    },
    /// Reconciliation fetch failed; the key was invalidated instead
    ReconcileFailed {
        id: MutationId,
        key: QueryKey,
        error: StoreError,
    },
}

impl MutationEvent {
    pub fn id(&self) -> MutationId {
        match self {
            MutationEvent::Dispatched { id, .. }
            | MutationEvent::Succeeded { id, .. }
            | MutationEvent::Failed { id, .. }
            | MutationEvent::Reconciled { id, .. }
            | MutationEvent::ReconcileFailed { id, .. } => *id,
        }
    }

    pub fn key(&self) -> &QueryKey {
        match self {
            MutationEvent::Dispatched { key, .. }
            | MutationEvent::Succeeded { key, .. }
            | MutationEvent::Failed { key, .. }
            | MutationEvent::Reconciled { key, .. }
            | MutationEvent::ReconcileFailed { key, .. } => key,
        }
    }

    /// State the mutation is in once this event has been emitted.
    pub fn state(&self) -> MutationState {
        match self {
            MutationEvent::Dispatched { .. } => MutationState::Pending,
            MutationEvent::Succeeded { .. } => MutationState::SettledSuccess,
            MutationEvent::Failed { .. } => MutationState::SettledError,
            MutationEvent::Reconciled { .. } | MutationEvent::ReconcileFailed { .. } => {
                MutationState::Idle
            }
        }
    }
}

/// Shared mutation id allocator and event channel.
#[derive(Clone)]
pub struct MutationEvents {
    sender: broadcast::Sender<MutationEvent>,
    next_id: Arc<AtomicU64>,
}

impl Default for MutationEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.sender.subscribe()
    }

    fn next_id(&self) -> MutationId {
        MutationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn emit(&self, event: MutationEvent) {
        let _ = self.sender.send(event);
    }
}

/// Runs optimistic writes against one entity type's query cache.
pub struct MutationCoordinator<T: Entity> {
    cache: QueryCache<T>,
    events: MutationEvents,
}

impl<T: Entity> Clone for MutationCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T: Entity> MutationCoordinator<T> {
    pub fn new(cache: QueryCache<T>, events: MutationEvents) -> Self {
        Self { cache, events }
    }

    pub fn cache(&self) -> &QueryCache<T> {
        &self.cache
    }

    /// Run one mutation through the full optimistic protocol.
    ///
    /// `remote` and `refetch` are not polled until their step is reached. The remote outcome
    /// is returned after reconciliation has finished.
    pub async fn mutate<R, F, Op, Fetch>(
        &self,
        key: QueryKey,
        optimistic: F,
        remote: Op,
        refetch: Fetch,
    ) -> Result<R, StoreError>
    where
        F: FnOnce(Vec<Cached<T>>) -> Vec<Cached<T>>,
        Op: Future<Output = Result<R, StoreError>>,
        Fetch: Future<Output = Result<Vec<T>, StoreError>>,
    {
        let id = self.events.next_id();
        let (snapshot, generation) = self.cache.begin_mutation(&key, optimistic);
        tracing::debug!("Mutation {:?} dispatched on {}", id, key);
        self.events.emit(MutationEvent::Dispatched {
            id,
            key: key.clone(),
        });

        let outcome = remote.await;

        match &outcome {
            Ok(_) => {
                self.events.emit(MutationEvent::Succeeded {
                    id,
                    key: key.clone(),
                });
            }
            Err(error) => {
                let rolled_back = self.cache.rollback(&key, generation, snapshot);
                if rolled_back {
                    tracing::warn!("Mutation {:?} on {} failed, rolled back: {}", id, key, error);
                } else {
                    tracing::warn!(
                        "Mutation {:?} on {} failed after a newer write, rollback skipped: {}",
                        id,
                        key,
                        error
                    );
                }
                self.events.emit(MutationEvent::Failed {
                    id,
                    key: key.clone(),
                    error: error.clone(),
                    rolled_back,
                });
            }
        }

        self.cache.settle_mutation(&key);
        self.reconcile(id, key, refetch).await;
        outcome
    }

    async fn reconcile<Fetch>(&self, id: MutationId, key: QueryKey, refetch: Fetch)
    where
        Fetch: Future<Output = Result<Vec<T>, StoreError>>,
    {
        let generation = self.cache.begin_fetch(&key);
        match refetch.await {
            Ok(items) => {
                let applied = self.cache.complete_fetch(&key, generation, items);
                if !applied {
                    tracing::debug!("Reconciliation for {:?} on {} superseded", id, key);
                }
                self.events
                    .emit(MutationEvent::Reconciled { id, key, applied });
            }
            Err(error) => {
                tracing::warn!("Reconciliation for {:?} on {} failed: {}", id, key, error);
                self.cache.invalidate(&key);
                self.events
                    .emit(MutationEvent::ReconcileFailed { id, key, error });
            }
        }
    }
}

/// Append a placeholder built from submitted fields.
pub fn append_placeholder<T: Entity>(draft: T::Draft) -> impl FnOnce(Vec<Cached<T>>) -> Vec<Cached<T>> {
    move |mut list| {
        list.push(Cached::Placeholder(draft));
        list
    }
}

/// Remove the stored entity with `id`; a missing id leaves the list unchanged.
pub fn remove_by_id<T: Entity>(id: String) -> impl FnOnce(Vec<Cached<T>>) -> Vec<Cached<T>> {
    move |list| {
        list.into_iter()
            .filter(|item| item.id() != Some(id.as_str()))
            .collect()
    }
}
