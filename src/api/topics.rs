//! Topic API endpoints.

use axum::{extract::State, Extension, Json};

use super::{error, require_text, success, ApiResult};
use crate::auth::CurrentUser;
use crate::models::{CreateTopicRequest, Topic};
use crate::AppState;

/// GET /api/topics - List the signed-in user's topics.
pub async fn list_topics(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Vec<Topic>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_topics(&user.id).await {
        Ok(topics) => success(topics, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/topics - Create a new topic.
pub async fn create_topic(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<CreateTopicRequest>,
) -> ApiResult<Topic> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = require_text(&request.title, "Title") {
        return error(e, revision_id);
    }

    match state.repo.create_topic(&user.id, &request).await {
        Ok(topic) => {
            tracing::debug!("Created topic {} for user {}", topic.id, user.id);
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(topic, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
