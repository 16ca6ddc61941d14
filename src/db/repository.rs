//! Database repository for CRUD operations.
//!
//! Every topic and note query is scoped to the owning user; rows belonging to someone else
//! are indistinguishable from missing rows.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{CreateNoteRequest, CreateTopicRequest, Note, SessionInfo, Topic, User};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    // ==================== USER / SESSION OPERATIONS ====================

    /// Look up a user by name, creating it on first sign-in.
    pub async fn find_or_create_user(&self, name: &str) -> Result<User, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query("INSERT OR IGNORE INTO users (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT id, name FROM users WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(User {
            id: row.get("id"),
            name: row.get("name"),
        })
    }

    /// Issue a new session token for a user.
    pub async fn create_session(
        &self,
        user: &User,
        ttl: Duration,
    ) -> Result<SessionInfo, AppError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let expires_at = (Utc::now() + ttl).to_rfc3339();

        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(&user.id)
            .bind(&expires_at)
            .execute(&self.pool)
            .await?;

        Ok(SessionInfo {
            token,
            user: user.clone(),
            expires_at,
        })
    }

    /// Resolve a session token. Expired sessions are purged and reported as absent.
    pub async fn get_session(&self, token: &str) -> Result<Option<SessionInfo>, AppError> {
        let row = sqlx::query(
            r#"SELECT s.token, s.expires_at, u.id AS user_id, u.name AS user_name
               FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.token = ?"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.get("expires_at");
        let expired = DateTime::parse_from_rfc3339(&expires_at)
            .map(|at| at.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(true);

        if expired {
            tracing::debug!("Session expired at {}", expires_at);
            self.delete_session(token).await?;
            return Ok(None);
        }

        Ok(Some(SessionInfo {
            token: row.get("token"),
            user: User {
                id: row.get("user_id"),
                name: row.get("user_name"),
            },
            expires_at,
        }))
    }

    /// Delete a session. Unknown tokens are ignored.
    pub async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== TOPIC OPERATIONS ====================

    /// List a user's topics in creation order.
    pub async fn list_topics(&self, user_id: &str) -> Result<Vec<Topic>, AppError> {
        let rows = sqlx::query(
            "SELECT id, title, user_id FROM topics WHERE user_id = ? ORDER BY created_at, rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(topic_from_row).collect())
    }

    /// Get one of a user's topics by ID.
    pub async fn get_topic(&self, user_id: &str, id: &str) -> Result<Option<Topic>, AppError> {
        let row = sqlx::query("SELECT id, title, user_id FROM topics WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(topic_from_row))
    }

    /// Create a new topic.
    pub async fn create_topic(
        &self,
        user_id: &str,
        request: &CreateTopicRequest,
    ) -> Result<Topic, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO topics (id, title, user_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(&request.title)
            .bind(user_id)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;

        Ok(Topic {
            id,
            title: request.title.clone(),
            user_id: user_id.to_string(),
        })
    }

    // ==================== NOTE OPERATIONS ====================

    /// List the notes of one of a user's topics in creation order.
    ///
    /// A topic the user does not own yields an empty list.
    pub async fn list_notes(&self, user_id: &str, topic_id: &str) -> Result<Vec<Note>, AppError> {
        let rows = sqlx::query(
            r#"SELECT n.id, n.title, n.content, n.topic_id, n.created_at, n.updated_at
               FROM notes n JOIN topics t ON t.id = n.topic_id
               WHERE n.topic_id = ? AND t.user_id = ?
               ORDER BY n.created_at, n.rowid"#,
        )
        .bind(topic_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    /// Create a new note under one of the user's topics.
    pub async fn create_note(
        &self,
        user_id: &str,
        request: &CreateNoteRequest,
    ) -> Result<Note, AppError> {
        if self.get_topic(user_id, &request.topic_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Topic {} not found",
                request.topic_id
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO notes (id, title, content, topic_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.title)
        .bind(&request.content)
        .bind(&request.topic_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Note {
            id,
            title: request.title.clone(),
            content: request.content.clone(),
            topic_id: request.topic_id.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Delete one of the user's notes.
    pub async fn delete_note(&self, user_id: &str, id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"DELETE FROM notes
               WHERE id = ? AND topic_id IN (SELECT id FROM topics WHERE user_id = ?)"#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Note {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }
}

// Helper functions for row conversion

fn topic_from_row(row: &sqlx::sqlite::SqliteRow) -> Topic {
    Topic {
        id: row.get("id"),
        title: row.get("title"),
        user_id: row.get("user_id"),
    }
}

fn note_from_row(row: &sqlx::sqlite::SqliteRow) -> Note {
    Note {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        topic_id: row.get("topic_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
