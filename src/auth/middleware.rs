//! Session extractors
//!
//! Recover the signed-in user from the session cookie on ordinary page
//! and API requests. This path never touches the sign-in state machine.

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

use super::cookie::SessionCookie;
use super::session::{SessionSigner, UserIdentity};
use crate::AppState;
use crate::error::AppError;

/// Read and verify the session cookie
///
/// Missing, empty, malformed, tampered and expired cookies all read as
/// `None`.
pub fn read_user(
    headers: &HeaderMap,
    cookie: &SessionCookie,
    signer: &SessionSigner,
) -> Option<UserIdentity> {
    let credential = cookie.read(headers)?;
    signer.verify(&credential)
}

fn user_from_parts(parts: &mut Parts, state: &AppState) -> Option<UserIdentity> {
    if let Some(user) = parts.extensions.get::<UserIdentity>().cloned() {
        return Some(user);
    }

    let user = read_user(&parts.headers, &state.cookie, &state.signer)?;
    parts.extensions.insert(user.clone());
    Some(user)
}

/// Extractor for current authenticated user
///
/// Rejects with 401 when there is no valid session.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(user): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", user.email)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        user_from_parts(parts, &state)
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserIdentity>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(MaybeUser(user_from_parts(parts, &state)))
    }
}
