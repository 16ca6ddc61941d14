//! Note model.

use serde::{Deserialize, Serialize};

/// A short text note filed under exactly one topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub topic_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a new note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    pub title: String,
    pub content: String,
    pub topic_id: String,
}

/// Query string for listing the notes of a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotesQuery {
    pub topic_id: String,
}
