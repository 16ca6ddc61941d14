//! Note API endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{error, require_text, success, ApiResult};
use crate::auth::CurrentUser;
use crate::models::{CreateNoteRequest, ListNotesQuery, Note};
use crate::AppState;

/// GET /api/notes?topicId=... - List the notes of a topic.
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<ListNotesQuery>,
) -> ApiResult<Vec<Note>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_notes(&user.id, &query.topic_id).await {
        Ok(notes) => success(notes, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notes - Create a new note.
pub async fn create_note(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<CreateNoteRequest>,
) -> ApiResult<Note> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let validated = require_text(&request.title, "Title")
        .and_then(|_| require_text(&request.content, "Content"))
        .and_then(|_| require_text(&request.topic_id, "Topic id"));
    if let Err(e) = validated {
        return error(e, revision_id);
    }

    match state.repo.create_note(&user.id, &request).await {
        Ok(note) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(note, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/notes/{id} - Delete a note.
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_note(&user.id, &id).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
