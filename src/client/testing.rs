//! In-memory collaborators for client tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::store::{RemoteStore, SessionAuthority, StoreError};
use crate::models::{CreateNoteRequest, CreateTopicRequest, Note, SessionInfo, Topic, User};

const TIMESTAMP: &str = "2024-01-01T00:00:00+00:00";

#[derive(Default)]
struct FakeState {
    topics: Vec<Topic>,
    notes: Vec<Note>,
    next_id: u64,
    session: Option<SessionInfo>,
}

/// Remote store backed by vectors. Writes can be held back or made to fail.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
    fail_writes: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    note_list_calls: AtomicUsize,
}

impl FakeStore {
    /// Hold every write until [`FakeStore::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let one held write proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn note_list_calls(&self) -> usize {
        self.note_list_calls.load(Ordering::SeqCst)
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        Ok(())
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}{}", prefix, state.next_id)
    }
}

#[async_trait]
impl SessionAuthority for FakeStore {
    async fn current_session(&self) -> Result<Option<SessionInfo>, StoreError> {
        Ok(self.state.lock().unwrap().session.clone())
    }

    async fn sign_in(&self, name: &str) -> Result<SessionInfo, StoreError> {
        let session = SessionInfo {
            token: format!("token-{}", name),
            user: User {
                id: format!("user-{}", name),
                name: name.to_string(),
            },
            expires_at: TIMESTAMP.to_string(),
        };
        self.state.lock().unwrap().session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        self.state.lock().unwrap().session = None;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        Ok(self.state.lock().unwrap().topics.clone())
    }

    async fn create_topic(&self, request: &CreateTopicRequest) -> Result<Topic, StoreError> {
        self.before_write().await?;
        let mut state = self.state.lock().unwrap();
        let topic = Topic {
            id: Self::next_id(&mut state, "t"),
            title: request.title.clone(),
            user_id: "user-ada".to_string(),
        };
        state.topics.push(topic.clone());
        Ok(topic)
    }

    async fn list_notes(&self, topic_id: &str) -> Result<Vec<Note>, StoreError> {
        self.note_list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .notes
            .iter()
            .filter(|note| note.topic_id == topic_id)
            .cloned()
            .collect())
    }

    async fn create_note(&self, request: &CreateNoteRequest) -> Result<Note, StoreError> {
        self.before_write().await?;
        let mut state = self.state.lock().unwrap();
        let note = Note {
            id: Self::next_id(&mut state, "n"),
            title: request.title.clone(),
            content: request.content.clone(),
            topic_id: request.topic_id.clone(),
            created_at: TIMESTAMP.to_string(),
            updated_at: TIMESTAMP.to_string(),
        };
        state.notes.push(note.clone());
        Ok(note)
    }

    async fn delete_note(&self, id: &str) -> Result<(), StoreError> {
        self.before_write().await?;
        let mut state = self.state.lock().unwrap();
        let before = state.notes.len();
        state.notes.retain(|note| note.id != id);
        if state.notes.len() == before {
            return Err(StoreError::Api {
                status: 404,
                code: "NOT_FOUND".to_string(),
                message: format!("Note {} not found", id),
            });
        }
        Ok(())
    }
}
