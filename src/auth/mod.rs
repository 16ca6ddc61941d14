//! Authentication module.
//!
//! Sign-in is gated by an optional pre-shared key compared in constant time. Every data
//! route then requires a bearer session token issued at sign-in.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::db::Repository;
use crate::errors::{codes, ErrorDetails, ErrorResponse};
use crate::models::User;

/// Header name for the sign-in key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The user resolved from the request's session token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// PSK gate for the sign-in route.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, anyone may sign in (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(provided_key) if constant_time_compare(provided_key, &expected) => {
            next.run(request).await
        }
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing API key"),
    }
}

/// Session gate for data routes. Inserts [`CurrentUser`] into the request extensions.
pub async fn session_auth_layer(repo: Arc<Repository>, mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return unauthorized_response("Missing session token");
    };

    match repo.get_session(&token).await {
        Ok(Some(session)) => {
            request.extensions_mut().insert(CurrentUser(session.user));
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid or expired session"),
        Err(e) => {
            tracing::error!("Session lookup failed: {}", e);
            let body = ErrorResponse::new(&e, 0);
            (e.status_code(), Json(body)).into_response()
        }
    }
}

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Create an unauthorized response.
fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: codes::UNAUTHORIZED.to_string(),
            message: message.to_string(),
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
