//! Session endpoints: sign in, look up the current session, sign out.

use axum::{extract::State, http::HeaderMap, Json};
use chrono::Duration;

use super::{error, require_text, success, ApiResult};
use crate::auth::bearer_token;
use crate::models::{SessionInfo, SignInRequest};
use crate::AppState;

/// POST /api/auth/signin - Sign in by name and receive a session token.
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<SessionInfo> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let name = request.name.trim();
    if let Err(e) = require_text(name, "Name") {
        return error(e, revision_id);
    }

    let user = match state.repo.find_or_create_user(name).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    let ttl = Duration::hours(state.config.session_ttl_hours);
    match state.repo.create_session(&user, ttl).await {
        Ok(session) => {
            tracing::info!("User {} signed in", user.name);
            success(session, revision_id)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/auth/session - The caller's session, or `null` when signed out.
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Option<SessionInfo>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let Some(token) = bearer_token(&headers) else {
        return success(None, revision_id);
    };

    match state.repo.get_session(&token).await {
        Ok(session) => success(session, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/auth/signout - Drop the caller's session. Always succeeds.
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Some(token) = bearer_token(&headers) {
        if let Err(e) = state.repo.delete_session(&token).await {
            return error(e, revision_id);
        }
    }

    success((), revision_id)
}
