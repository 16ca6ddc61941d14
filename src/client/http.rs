//! HTTP implementation of the session authority and remote store.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use super::store::{RemoteStore, SessionAuthority, StoreError};
use crate::api::ApiResponse;
use crate::auth::API_KEY_HEADER;
use crate::errors::ErrorResponse;
use crate::models::{
    CreateNoteRequest, CreateTopicRequest, ListNotesQuery, Note, SessionInfo, SignInRequest, Topic,
};

/// Talks to the NoteTaker REST API and remembers the session token issued at sign-in.
pub struct HttpStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    token: RwLock<Option<String>>,
    revision_id: AtomicI64,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            token: RwLock::new(None),
            revision_id: AtomicI64::new(0),
        }
    }

    /// Key sent with sign-in requests when the server requires one.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Current session token, if signed in.
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Highest data revision the server has reported so far.
    pub fn revision_id(&self) -> i64 {
        self.revision_id.load(Ordering::Acquire)
    }

    fn observe_revision(&self, revision_id: i64) {
        self.revision_id.fetch_max(revision_id, Ordering::AcqRel);
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn note_url(&self, id: &str) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.url("/api/notes")).map_err(|e| StoreError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport(format!("invalid base URL {}", self.base_url)))?
            .push(id);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and unwrap the response envelope.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if status.is_success() {
            let envelope: ApiResponse<T> =
                serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
            self.observe_revision(envelope.revision_id);
            return Ok(envelope.data);
        }

        Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(envelope) => {
                self.observe_revision(envelope.revision_id);
                StoreError::Api {
                    status: status.as_u16(),
                    code: envelope.error.code,
                    message: envelope.error.message,
                }
            }
            Err(_) => StoreError::Api {
                status: status.as_u16(),
                code: format!("HTTP_{}", status.as_u16()),
                message: body,
            },
        })
    }
}

#[async_trait]
impl SessionAuthority for HttpStore {
    async fn current_session(&self) -> Result<Option<SessionInfo>, StoreError> {
        if self.token().is_none() {
            return Ok(None);
        }
        let request = self.authorized(self.client.get(self.url("/api/auth/session")));
        let session: Option<SessionInfo> = self.send(request).await?;
        if session.is_none() {
            self.set_token(None);
        }
        Ok(session)
    }

    async fn sign_in(&self, name: &str) -> Result<SessionInfo, StoreError> {
        let mut request = self
            .client
            .post(self.url("/api/auth/signin"))
            .json(&SignInRequest {
                name: name.to_string(),
            });
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let session: SessionInfo = self.send(request).await?;
        self.set_token(Some(session.token.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let request = self.authorized(self.client.post(self.url("/api/auth/signout")));
        // The local token is dropped even if the server could not be reached
        self.set_token(None);
        self.send(request).await
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        self.send(self.authorized(self.client.get(self.url("/api/topics"))))
            .await
    }

    async fn create_topic(&self, request: &CreateTopicRequest) -> Result<Topic, StoreError> {
        self.send(self.authorized(self.client.post(self.url("/api/topics")).json(request)))
            .await
    }

    async fn list_notes(&self, topic_id: &str) -> Result<Vec<Note>, StoreError> {
        let query = ListNotesQuery {
            topic_id: topic_id.to_string(),
        };
        self.send(self.authorized(self.client.get(self.url("/api/notes")).query(&query)))
            .await
    }

    async fn create_note(&self, request: &CreateNoteRequest) -> Result<Note, StoreError> {
        self.send(self.authorized(self.client.post(self.url("/api/notes")).json(request)))
            .await
    }

    async fn delete_note(&self, id: &str) -> Result<(), StoreError> {
        let url = self.note_url(id)?;
        self.send(self.authorized(self.client.delete(url))).await
    }
}
