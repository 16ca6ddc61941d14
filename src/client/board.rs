//! Session-gated topic and note board.
//!
//! This is what a view layer drives: it reads topics and the selected topic's notes through
//! the query caches, keeps the selection, and dispatches the three write intents through
//! the optimistic mutation protocol.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use super::cache::{Cached, QueryCache, QueryKey};
use super::mutation::{
    append_placeholder, remove_by_id, MutationCoordinator, MutationEvent, MutationEvents,
};
use super::selection::Selection;
use super::store::{RemoteStore, SessionAuthority, StoreError};
use crate::models::{CreateNoteRequest, CreateTopicRequest, Note, SessionInfo, Topic};

/// Why a board operation did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// No user session
    SignedOut,
    /// A note intent needs a selected topic
    NoTopicSelected,
    /// Rejected before dispatch
    Validation(String),
    /// The remote store failed; any optimistic change has been rolled back
    Store(StoreError),
}

impl std::fmt::Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardError::SignedOut => write!(f, "not signed in"),
            BoardError::NoTopicSelected => write!(f, "no topic selected"),
            BoardError::Validation(msg) => write!(f, "{}", msg),
            BoardError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for BoardError {}

impl From<StoreError> for BoardError {
    fn from(err: StoreError) -> Self {
        BoardError::Store(err)
    }
}

/// Topics, notes and selection for one signed-in user.
pub struct NoteBoard<S> {
    store: Arc<S>,
    topics: MutationCoordinator<Topic>,
    notes: MutationCoordinator<Note>,
    events: MutationEvents,
    selection: Arc<RwLock<Selection>>,
    session: Arc<RwLock<Option<SessionInfo>>>,
}

impl<S> Clone for NoteBoard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            topics: self.topics.clone(),
            notes: self.notes.clone(),
            events: self.events.clone(),
            selection: Arc::clone(&self.selection),
            session: Arc::clone(&self.session),
        }
    }
}

impl<S> NoteBoard<S>
where
    S: RemoteStore + SessionAuthority + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        let events = MutationEvents::new();
        Self {
            store,
            topics: MutationCoordinator::new(QueryCache::new(), events.clone()),
            notes: MutationCoordinator::new(QueryCache::new(), events.clone()),
            events,
            selection: Arc::new(RwLock::new(Selection::default())),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn topic_cache(&self) -> &QueryCache<Topic> {
        self.topics.cache()
    }

    pub fn note_cache(&self) -> &QueryCache<Note> {
        self.notes.cache()
    }

    /// Lifecycle events of every mutation dispatched through this board.
    pub fn mutation_events(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }

    // ==================== SESSION ====================

    pub fn session(&self) -> Option<SessionInfo> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.session().is_some()
    }

    /// Re-query the session authority.
    pub async fn refresh_session(&self) -> Result<Option<SessionInfo>, StoreError> {
        let session = self.store.current_session().await?;
        if session.is_none() && self.is_signed_in() {
            tracing::info!("Session ended");
            self.reset();
        }
        self.set_session(session.clone());
        Ok(session)
    }

    pub async fn sign_in(&self, name: &str) -> Result<SessionInfo, BoardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BoardError::Validation("Name is required".to_string()));
        }
        let session = self.store.sign_in(name).await?;
        self.reset();
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Sign out and forget everything cached for the previous user.
    pub async fn sign_out(&self) -> Result<(), BoardError> {
        let result = self.store.sign_out().await;
        self.set_session(None);
        self.reset();
        result.map_err(BoardError::from)
    }

    fn set_session(&self, session: Option<SessionInfo>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn reset(&self) {
        self.topics.cache().clear();
        self.notes.cache().clear();
        self.with_selection(Selection::clear);
    }

    // ==================== SELECTION ====================

    pub fn selected_topic(&self) -> Option<Topic> {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current()
            .cloned()
    }

    /// Show `topic`'s notes. They are fetched on the next [`NoteBoard::notes`] read.
    pub fn select_topic(&self, topic: Topic) {
        self.with_selection(|selection| selection.select(topic));
    }

    pub fn clear_selection(&self) {
        self.with_selection(Selection::clear);
    }

    fn with_selection<R>(&self, f: impl FnOnce(&mut Selection) -> R) -> R {
        let mut selection = self.selection.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut selection)
    }

    /// Selected topic together with the key of its notes query.
    fn selected_notes(&self) -> Option<(Topic, QueryKey)> {
        let selection = self.selection.read().unwrap_or_else(PoisonError::into_inner);
        Some((selection.current()?.clone(), selection.notes_key()?))
    }

    fn apply_default_selection(&self) {
        let topics = self.topics.cache().get(&QueryKey::Topics).unwrap_or_default();
        self.with_selection(|selection| {
            selection.on_topics_changed(&topics);
        });
    }

    // ==================== READS ====================

    /// The user's topics, or `None` while signed out.
    pub async fn topics(&self) -> Result<Option<Vec<Cached<Topic>>>, StoreError> {
        if !self.is_signed_in() {
            return Ok(None);
        }
        let topics = self
            .topics
            .cache()
            .fetch_query(&QueryKey::Topics, self.store.list_topics())
            .await?;
        self.apply_default_selection();
        Ok(Some(topics))
    }

    /// Notes of the selected topic, or `None` while signed out or with nothing selected.
    pub async fn notes(&self) -> Result<Option<Vec<Cached<Note>>>, StoreError> {
        if !self.is_signed_in() {
            return Ok(None);
        }
        let Some((topic, key)) = self.selected_notes() else {
            return Ok(None);
        };
        let notes = self
            .notes
            .cache()
            .fetch_query(&key, self.store.list_notes(&topic.id))
            .await?;
        Ok(Some(notes))
    }

    // ==================== WRITES ====================

    /// Create a topic from a submitted title.
    pub async fn create_topic(&self, title: &str) -> Result<Topic, BoardError> {
        if !self.is_signed_in() {
            return Err(BoardError::SignedOut);
        }
        if title.trim().is_empty() {
            return Err(BoardError::Validation("Topic title is required".to_string()));
        }

        let request = CreateTopicRequest {
            title: title.to_string(),
        };
        let outcome = self
            .topics
            .mutate(
                QueryKey::Topics,
                append_placeholder::<Topic>(request.clone()),
                self.store.create_topic(&request),
                self.store.list_topics(),
            )
            .await;
        self.apply_default_selection();
        Ok(outcome?)
    }

    /// Create a note under the selected topic.
    pub async fn create_note(&self, title: &str, content: &str) -> Result<Note, BoardError> {
        if !self.is_signed_in() {
            return Err(BoardError::SignedOut);
        }
        let (topic, key) = self.selected_notes().ok_or(BoardError::NoTopicSelected)?;
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(BoardError::Validation(
                "Note title and content are required".to_string(),
            ));
        }

        let request = CreateNoteRequest {
            title: title.to_string(),
            content: content.to_string(),
            topic_id: topic.id.clone(),
        };
        let note = self
            .notes
            .mutate(
                key,
                append_placeholder::<Note>(request.clone()),
                self.store.create_note(&request),
                self.store.list_notes(&topic.id),
            )
            .await?;
        Ok(note)
    }

    /// Delete a note of the selected topic.
    pub async fn delete_note(&self, id: &str) -> Result<(), BoardError> {
        if !self.is_signed_in() {
            return Err(BoardError::SignedOut);
        }
        let (topic, key) = self.selected_notes().ok_or(BoardError::NoTopicSelected)?;

        self.notes
            .mutate(
                key,
                remove_by_id::<Note>(id.to_string()),
                self.store.delete_note(id),
                self.store.list_notes(&topic.id),
            )
            .await?;
        Ok(())
    }
}
