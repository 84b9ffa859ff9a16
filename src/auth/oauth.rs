//! GitHub OAuth endpoint
//!
//! Implements the OAuth 2.0 authorization code flow with GitHub. The same
//! endpoint starts the flow (no `code` yet) and receives GitHub's callback.

use axum::{
    Router,
    extract::{RawQuery, State},
    http::Method,
    response::{IntoResponse, Response},
    routing::any,
};

use super::machine::AuthMachine;
use super::request::AuthRequest;
use crate::AppState;

/// Path of the sign-in endpoint; `github.redirect_uri` should point here
pub const GITHUB_AUTH_PATH: &str = "/api/auth/github";

/// Create authentication router
///
/// Routes:
/// - ANY /api/auth/github - Start sign-in or handle GitHub's callback
pub fn auth_router() -> Router<AppState> {
    // Every method is routed so that non-GET requests get the home redirect
    Router::new().route(GITHUB_AUTH_PATH, any(github_auth))
}

/// ANY /api/auth/github
///
/// Runs one attempt of the sign-in state machine and returns its redirect.
async fn github_auth(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Response {
    let request = AuthRequest::new(method, query.as_deref());
    let machine = AuthMachine::new(
        state.github.as_ref(),
        &state.config.github,
        &state.signer,
        &state.cookie,
    );

    machine.run(request).await.into_response()
}
