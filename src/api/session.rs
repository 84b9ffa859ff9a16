//! Session endpoints
//!
//! Let a page find out who is signed in without re-running the flow.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser, UserIdentity};

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Option<UserIdentity>,
}

/// Create session router
///
/// Routes:
/// - GET /api/session - Current user or `null`
/// - GET /api/me - Current user, 401 when signed out
pub fn session_router() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(current_session))
        .route("/api/me", get(me))
}

async fn current_session(MaybeUser(user): MaybeUser) -> Json<SessionResponse> {
    Json(SessionResponse { user })
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserIdentity> {
    Json(user)
}
