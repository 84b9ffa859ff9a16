//! ghlogin - GitHub sign-in with signed, cookie-held sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - /api/auth/github  sign-in endpoint                       │
//! │  - /api/session, /api/me  session lookup                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Sign-in State Machine                      │
//! │  - validates config and request                             │
//! │  - sequences GitHub calls, signs, sets cookie, redirects    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitHub Client                            │
//! │  - token exchange, profile, emails (reqwest)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `auth`: Sign-in state machine, session credentials and cookie
//! - `github`: GitHub OAuth/REST client
//! - `api`: Session and metrics endpoints
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Nothing in here changes after startup; each sign-in attempt keeps its
/// own working state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// GitHub client
    pub github: Arc<dyn github::GitHubApi>,

    /// Session credential signer/verifier
    pub signer: Arc<auth::SessionSigner>,

    /// Session cookie settings
    pub cookie: Arc<auth::SessionCookie>,
}

impl AppState {
    /// Initialize application state with the real GitHub client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let github = github::GitHubClient::new(&config.github)?;
        tracing::info!(
            api = %config.github.api_base_url,
            timeout_seconds = config.github.request_timeout_seconds,
            "GitHub client initialized"
        );

        Ok(Self::with_github(config, Arc::new(github)))
    }

    /// Initialize application state around any GitHub implementation
    pub fn with_github(config: config::AppConfig, github: Arc<dyn github::GitHubApi>) -> Self {
        let signer = auth::SessionSigner::new(
            config.auth.session_secret.clone(),
            config.auth.session_max_age,
        );
        let cookie = auth::SessionCookie::from_config(&config);

        Self {
            config: Arc::new(config),
            github,
            signer: Arc::new(signer),
            cookie: Arc::new(cookie),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::session_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
