//! Topic model.

use serde::{Deserialize, Serialize};

/// A named group of notes owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub user_id: String,
}

/// Request body for creating a new topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicRequest {
    pub title: String,
}
