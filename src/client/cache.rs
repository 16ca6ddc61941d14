//! Key-addressed query cache.
//!
//! Holds the last known result of each list query so a view can render immediately and so
//! mutations can be applied optimistically. Every key carries a generation counter: starting
//! a fetch, dispatching a mutation or invalidating the key bumps it, and an asynchronous
//! completion is applied only while the generation it captured is still current. Fetch
//! results are also ignored while any mutation on the key is still pending; the last
//! mutation to settle reconciles the key.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use super::store::StoreError;
use crate::models::{CreateNoteRequest, CreateTopicRequest, Note, Topic};

/// Buffered update notifications per subscriber before it starts lagging.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Identity of a cached query: the operation plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// All topics of the signed-in user
    Topics,
    /// All notes of one topic
    Notes { topic_id: String },
}

impl QueryKey {
    pub fn notes(topic_id: impl Into<String>) -> Self {
        QueryKey::Notes {
            topic_id: topic_id.into(),
        }
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKey::Topics => write!(f, "topic.getAll"),
            QueryKey::Notes { topic_id } => write!(f, "note.getAll({})", topic_id),
        }
    }
}

/// A server-owned record that can be held in the cache.
pub trait Entity: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Client-submitted fields used to build an optimistic placeholder.
    type Draft: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Server-assigned identifier.
    fn id(&self) -> &str;
}

impl Entity for Topic {
    type Draft = CreateTopicRequest;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Note {
    type Draft = CreateNoteRequest;

    fn id(&self) -> &str {
        &self.id
    }
}

/// One element of a cached list.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T: Entity> {
    /// Optimistic entry built from submitted fields; has no id or timestamps yet
    Placeholder(T::Draft),
    /// Authoritative record returned by the remote store
    Stored(T),
}

impl<T: Entity> Cached<T> {
    pub fn id(&self) -> Option<&str> {
        match self {
            Cached::Placeholder(_) => None,
            Cached::Stored(entity) => Some(entity.id()),
        }
    }

    pub fn stored(&self) -> Option<&T> {
        match self {
            Cached::Placeholder(_) => None,
            Cached::Stored(entity) => Some(entity),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Cached::Placeholder(_))
    }
}

/// Token captured when an asynchronous write to a key begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

struct Slot<T: Entity> {
    value: Option<Vec<Cached<T>>>,
    generation: u64,
    stale: bool,
    pending_mutations: usize,
}

impl<T: Entity> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            generation: 0,
            stale: false,
            pending_mutations: 0,
        }
    }
}

/// In-memory store of list query results for one entity type.
///
/// Cloning yields another handle to the same cache.
pub struct QueryCache<T: Entity> {
    slots: Arc<RwLock<HashMap<QueryKey, Slot<T>>>>,
    updates: broadcast::Sender<QueryKey>,
}

impl<T: Entity> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            updates: self.updates.clone(),
        }
    }
}

impl<T: Entity> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> QueryCache<T> {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            updates,
        }
    }

    /// Receive the key of every entry whose value changes.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.updates.subscribe()
    }

    /// Last stored value for `key`, or `None` if it was never populated.
    pub fn get(&self, key: &QueryKey) -> Option<Vec<Cached<T>>> {
        self.read().get(key).and_then(|slot| slot.value.clone())
    }

    /// Replace the entry for `key` unconditionally.
    pub fn set(&self, key: QueryKey, value: Vec<Cached<T>>) {
        {
            let mut slots = self.write();
            let slot = slots.entry(key.clone()).or_default();
            slot.value = Some(value);
            slot.stale = false;
        }
        self.notify(key);
    }

    /// Mark `key` for re-fetch and supersede any fetch already in flight for it.
    pub fn invalidate(&self, key: &QueryKey) {
        {
            let mut slots = self.write();
            let slot = slots.entry(key.clone()).or_default();
            slot.stale = true;
            slot.generation += 1;
        }
        self.notify(key.clone());
    }

    /// Whether the next read of `key` must go to the remote store.
    pub fn needs_fetch(&self, key: &QueryKey) -> bool {
        self.read()
            .get(key)
            .map_or(true, |slot| slot.value.is_none() || slot.stale)
    }

    /// Current generation of `key`.
    pub fn generation(&self, key: &QueryKey) -> Generation {
        Generation(self.read().get(key).map_or(0, |slot| slot.generation))
    }

    /// Start a fetch for `key`; the returned token must still be current when it lands.
    pub fn begin_fetch(&self, key: &QueryKey) -> Generation {
        let mut slots = self.write();
        let slot = slots.entry(key.clone()).or_default();
        slot.generation += 1;
        Generation(slot.generation)
    }

    /// Apply a fetch result if `generation` is still current and no mutation on `key` is
    /// pending. Returns whether it was applied.
    pub fn complete_fetch(&self, key: &QueryKey, generation: Generation, items: Vec<T>) -> bool {
        {
            let mut slots = self.write();
            let slot = slots.entry(key.clone()).or_default();
            if slot.generation != generation.0 || slot.pending_mutations > 0 {
                return false;
            }
            slot.value = Some(items.into_iter().map(Cached::Stored).collect());
            slot.stale = false;
        }
        self.notify(key.clone());
        true
    }

    /// Supersede in-flight fetches, snapshot the entry and write the optimistic value.
    ///
    /// The transform receives the snapshot, or an empty list if the entry is absent. Returns
    /// the snapshot exactly as it was (absent stays absent) and the mutation's generation.
    pub fn begin_mutation<F>(&self, key: &QueryKey, transform: F) -> (Option<Vec<Cached<T>>>, Generation)
    where
        F: FnOnce(Vec<Cached<T>>) -> Vec<Cached<T>>,
    {
        let result = {
            let mut slots = self.write();
            let slot = slots.entry(key.clone()).or_default();
            slot.generation += 1;
            slot.pending_mutations += 1;
            // The mutation's own reconciliation refetches the key
            slot.stale = false;
            let snapshot = slot.value.clone();
            slot.value = Some(transform(snapshot.clone().unwrap_or_default()));
            (snapshot, Generation(slot.generation))
        };
        self.notify(key.clone());
        result
    }

    /// Restore a mutation's snapshot if nothing has touched `key` since it was dispatched.
    pub fn rollback(
        &self,
        key: &QueryKey,
        generation: Generation,
        snapshot: Option<Vec<Cached<T>>>,
    ) -> bool {
        {
            let mut slots = self.write();
            let slot = slots.entry(key.clone()).or_default();
            if slot.generation != generation.0 {
                return false;
            }
            slot.value = snapshot;
        }
        self.notify(key.clone());
        true
    }

    /// Record that a mutation dispatched on `key` has heard back from the remote store.
    pub fn settle_mutation(&self, key: &QueryKey) {
        let mut slots = self.write();
        let slot = slots.entry(key.clone()).or_default();
        slot.pending_mutations = slot.pending_mutations.saturating_sub(1);
    }

    /// Number of mutations on `key` still waiting for the remote store.
    pub fn pending_mutations(&self, key: &QueryKey) -> usize {
        self.read().get(key).map_or(0, |slot| slot.pending_mutations)
    }

    /// Read path: serve `key` from the cache, fetching it first on a miss or when stale.
    ///
    /// A fetch result that lands after the key was superseded, or while a mutation on it is
    /// pending, is discarded and the current cached value is returned instead.
    pub async fn fetch_query<Fut>(&self, key: &QueryKey, fetch: Fut) -> Result<Vec<Cached<T>>, StoreError>
    where
        Fut: Future<Output = Result<Vec<T>, StoreError>>,
    {
        if self.needs_fetch(key) {
            let generation = self.begin_fetch(key);
            let items = fetch.await?;
            if !self.complete_fetch(key, generation, items) {
                tracing::debug!("Discarded stale fetch for {}", key);
            }
        }
        Ok(self.get(key).unwrap_or_default())
    }

    /// Drop every value, e.g. after sign-out.
    ///
    /// Generations keep counting so that nothing started before the clear can land after it.
    pub fn clear(&self) {
        let keys: Vec<QueryKey> = {
            let mut slots = self.write();
            slots
                .iter_mut()
                .map(|(key, slot)| {
                    slot.value = None;
                    slot.stale = false;
                    slot.pending_mutations = 0;
                    slot.generation += 1;
                    key.clone()
                })
                .collect()
        };
        for key in keys {
            self.notify(key);
        }
    }

    fn notify(&self, key: QueryKey) {
        // No subscribers is fine
        let _ = self.updates.send(key);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<QueryKey, Slot<T>>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<QueryKey, Slot<T>>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: &str, title: &str) -> Topic {
        Topic {
            id: id.to_string(),
            title: title.to_string(),
            user_id: "u1".to_string(),
        }
    }

    fn stored(topics: &[Topic]) -> Vec<Cached<Topic>> {
        topics.iter().cloned().map(Cached::Stored).collect()
    }

    #[test]
    fn test_get_absent_then_set_replaces() {
        let cache = QueryCache::<Topic>::new();
        assert_eq!(cache.get(&QueryKey::Topics), None);
        assert!(cache.needs_fetch(&QueryKey::Topics));

        cache.set(QueryKey::Topics, stored(&[topic("t1", "Work")]));
        cache.set(QueryKey::Topics, stored(&[topic("t2", "Home")]));

        assert_eq!(
            cache.get(&QueryKey::Topics),
            Some(stored(&[topic("t2", "Home")]))
        );
        assert!(!cache.needs_fetch(&QueryKey::Topics));
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = QueryCache::<Note>::new();
        cache.set(QueryKey::notes("T1"), Vec::new());
        assert_eq!(cache.get(&QueryKey::notes("T1")), Some(Vec::new()));
        assert_eq!(cache.get(&QueryKey::notes("T2")), None);
    }

    #[test]
    fn test_invalidate_forces_fetch_and_supersedes_in_flight() {
        let cache = QueryCache::<Topic>::new();
        cache.set(QueryKey::Topics, Vec::new());

        let in_flight = cache.begin_fetch(&QueryKey::Topics);
        cache.invalidate(&QueryKey::Topics);
        assert!(cache.needs_fetch(&QueryKey::Topics));

        assert!(!cache.complete_fetch(&QueryKey::Topics, in_flight, vec![topic("t1", "Old")]));
        assert_eq!(cache.get(&QueryKey::Topics), Some(Vec::new()));
    }

    #[test]
    fn test_clear_supersedes_fetch_started_before_it() {
        let cache = QueryCache::<Topic>::new();
        let previous_user = cache.begin_fetch(&QueryKey::Topics);

        cache.clear();
        assert_eq!(cache.get(&QueryKey::Topics), None);
        let current_user = cache.begin_fetch(&QueryKey::Topics);
        assert!(current_user > previous_user);

        assert!(!cache.complete_fetch(&QueryKey::Topics, previous_user, vec![topic("x1", "Other")]));
        assert_eq!(cache.get(&QueryKey::Topics), None);

        assert!(cache.complete_fetch(&QueryKey::Topics, current_user, vec![topic("t1", "Work")]));
        assert_eq!(cache.get(&QueryKey::Topics), Some(stored(&[topic("t1", "Work")])));
    }

    #[test]
    fn test_clear_before_any_refetch_still_rejects_old_fetch() {
        let cache = QueryCache::<Topic>::new();
        let in_flight = cache.begin_fetch(&QueryKey::Topics);
        cache.clear();

        assert!(!cache.complete_fetch(&QueryKey::Topics, in_flight, vec![topic("x1", "Other")]));
        assert!(cache.needs_fetch(&QueryKey::Topics));
    }

    #[test]
    fn test_mutation_on_stale_key_clears_stale_flag() {
        let cache = QueryCache::<Topic>::new();
        cache.set(QueryKey::Topics, Vec::new());
        cache.invalidate(&QueryKey::Topics);
        assert!(cache.needs_fetch(&QueryKey::Topics));

        let (snapshot, generation) = cache.begin_mutation(&QueryKey::Topics, |mut list| {
            list.push(Cached::Placeholder(CreateTopicRequest {
                title: "Work".to_string(),
            }));
            list
        });
        assert!(!cache.needs_fetch(&QueryKey::Topics));

        assert!(cache.rollback(&QueryKey::Topics, generation, snapshot));
        assert_eq!(cache.get(&QueryKey::Topics), Some(Vec::new()));
    }

    #[test]
    fn test_reconciliation_is_idempotent() {
        let cache = QueryCache::<Topic>::new();
        let generation = cache.begin_fetch(&QueryKey::Topics);
        let result = vec![topic("t1", "Work"), topic("t2", "Home")];

        assert!(cache.complete_fetch(&QueryKey::Topics, generation, result.clone()));
        let once = cache.get(&QueryKey::Topics);
        assert!(cache.complete_fetch(&QueryKey::Topics, generation, result));
        assert_eq!(cache.get(&QueryKey::Topics), once);
    }

    #[test]
    fn test_mutation_supersedes_fetch_in_flight() {
        let cache = QueryCache::<Topic>::new();
        cache.set(QueryKey::Topics, Vec::new());
        let in_flight = cache.begin_fetch(&QueryKey::Topics);

        let draft = CreateTopicRequest {
            title: "Work".to_string(),
        };
        cache.begin_mutation(&QueryKey::Topics, |mut list| {
            list.push(Cached::Placeholder(draft.clone()));
            list
        });

        assert!(!cache.complete_fetch(&QueryKey::Topics, in_flight, Vec::new()));
        assert_eq!(
            cache.get(&QueryKey::Topics),
            Some(vec![Cached::Placeholder(draft)])
        );
    }

    #[test]
    fn test_fetch_landing_mid_mutation_is_ignored() {
        let cache = QueryCache::<Topic>::new();
        cache.begin_mutation(&QueryKey::Topics, |list| list);
        assert_eq!(cache.pending_mutations(&QueryKey::Topics), 1);

        let generation = cache.begin_fetch(&QueryKey::Topics);
        assert!(!cache.complete_fetch(&QueryKey::Topics, generation, vec![topic("t1", "Work")]));

        cache.settle_mutation(&QueryKey::Topics);
        let generation = cache.begin_fetch(&QueryKey::Topics);
        assert!(cache.complete_fetch(&QueryKey::Topics, generation, vec![topic("t1", "Work")]));
        assert_eq!(cache.pending_mutations(&QueryKey::Topics), 0);
    }

    #[test]
    fn test_rollback_restores_snapshot_exactly() {
        let cache = QueryCache::<Topic>::new();
        let before = stored(&[topic("t1", "Work"), topic("t2", "Home")]);
        cache.set(QueryKey::Topics, before.clone());

        let (snapshot, generation) = cache.begin_mutation(&QueryKey::Topics, |list| {
            list.into_iter().filter(|t| t.id() != Some("t1")).collect()
        });
        assert_eq!(snapshot.as_ref(), Some(&before));
        assert_eq!(cache.get(&QueryKey::Topics).map(|l| l.len()), Some(1));

        assert!(cache.rollback(&QueryKey::Topics, generation, snapshot));
        assert_eq!(cache.get(&QueryKey::Topics), Some(before));
    }

    #[test]
    fn test_rollback_of_absent_entry_restores_absent() {
        let cache = QueryCache::<Topic>::new();
        let (snapshot, generation) = cache.begin_mutation(&QueryKey::Topics, |mut list| {
            list.push(Cached::Placeholder(CreateTopicRequest {
                title: "Work".to_string(),
            }));
            list
        });
        assert_eq!(snapshot, None);
        assert!(cache.rollback(&QueryKey::Topics, generation, snapshot));
        assert_eq!(cache.get(&QueryKey::Topics), None);
    }

    #[test]
    fn test_rollback_skipped_once_superseded() {
        let cache = QueryCache::<Topic>::new();
        cache.set(QueryKey::Topics, Vec::new());
        let first = CreateTopicRequest {
            title: "First".to_string(),
        };
        let second = CreateTopicRequest {
            title: "Second".to_string(),
        };

        let (first_snapshot, first_generation) =
            cache.begin_mutation(&QueryKey::Topics, |mut list| {
                list.push(Cached::Placeholder(first.clone()));
                list
            });
        cache.begin_mutation(&QueryKey::Topics, |mut list| {
            list.push(Cached::Placeholder(second.clone()));
            list
        });

        assert!(!cache.rollback(&QueryKey::Topics, first_generation, first_snapshot));
        assert_eq!(
            cache.get(&QueryKey::Topics),
            Some(vec![Cached::Placeholder(first), Cached::Placeholder(second)])
        );
    }

    #[tokio::test]
    async fn test_fetch_query_only_fetches_on_miss() {
        let cache = QueryCache::<Topic>::new();

        let first = cache
            .fetch_query(&QueryKey::Topics, async { Ok::<_, StoreError>(vec![topic("t1", "Work")]) })
            .await
            .unwrap();
        assert_eq!(first, stored(&[topic("t1", "Work")]));

        let second = cache
            .fetch_query(&QueryKey::Topics, async {
                Err::<Vec<Topic>, _>(StoreError::Transport("must not be called".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_set_is_observable_by_subscribers() {
        let cache = QueryCache::<Topic>::new();
        let mut updates = cache.subscribe();

        cache.set(QueryKey::Topics, Vec::new());

        assert_eq!(updates.recv().await.unwrap(), QueryKey::Topics);
    }
}
