//! GitHub provider client
//!
//! Stateless calls against GitHub's OAuth and REST endpoints:
//! - code → access token exchange
//! - authenticated user profile
//! - authenticated user email list
//!
//! Missing fields in GitHub's answers are returned as-is. Deciding what
//! an absent token, id or email means is left to the sign-in flow.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client::GitHubClient;

#[cfg(test)]
use mockall::automock;

/// Token type GitHub implies when the token response omits one
pub const DEFAULT_TOKEN_TYPE: &str = "bearer";

/// Calls made to GitHub during one sign-in attempt
///
/// Each call is a single request/response round trip with no retry.
/// Only transport and decoding failures are errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// POST the authorization code to the token endpoint
    async fn exchange_code_for_token(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<AccessTokenResponse>;

    /// GET the authenticated user's profile
    async fn fetch_profile(&self, token: &AccessToken) -> Result<GitHubProfile>;

    /// GET the authenticated user's email addresses
    async fn fetch_emails(&self, token: &AccessToken) -> Result<Vec<GitHubEmail>>;
}

/// GitHub token endpoint response
///
/// On a bad or expired code GitHub still answers 200, with `error`
/// set and no `access_token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccessTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl AccessTokenResponse {
    /// The usable token, if GitHub issued one
    ///
    /// `token_type` falls back to [`DEFAULT_TOKEN_TYPE`].
    pub fn into_access_token(self) -> Option<AccessToken> {
        let access_token = self.access_token.filter(|token| !token.is_empty())?;
        let token_type = self
            .token_type
            .filter(|token_type| !token_type.is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());

        Some(AccessToken {
            access_token,
            token_type,
        })
    }
}

/// Access token plus its type, always held together
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
        }
    }

    /// Value for the `Authorization` header: `"<token_type> <access_token>"`
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// GitHub `/user` response
///
/// `id` and `email` may be missing depending on the user's privacy
/// settings, or when GitHub answers with an error object instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitHubProfile {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: String,
}

/// One entry of GitHub `/user/emails`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitHubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// Pick the address used for the session identity
///
/// The entry flagged primary wins; without one, the first entry is used.
pub fn select_primary_email(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|entry| entry.primary)
        .or_else(|| emails.first())
        .map(|entry| entry.email.clone())
}
