//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use ghlogin::{AppState, config};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const SESSION_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// Canned GitHub answers plus call counters
pub struct FakeGitHubState {
    pub token: Value,
    pub profile: Value,
    pub emails: Value,
    pub token_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub email_calls: AtomicUsize,
}

/// Fake GitHub OAuth + REST API listening on a random local port
pub struct FakeGitHub {
    pub addr: String,
    pub state: Arc<FakeGitHubState>,
}

impl FakeGitHub {
    pub async fn start(token: Value, profile: Value, emails: Value) -> Self {
        let state = Arc::new(FakeGitHubState {
            token,
            profile,
            emails,
            token_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            email_calls: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/login/oauth/access_token", post(token_handler))
            .route("/user", get(profile_handler))
            .route("/user/emails", get(emails_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{addr}"),
            state,
        }
    }

    /// GitHub that signs in user 42 with an email on the profile
    pub async fn happy() -> Self {
        Self::start(
            json!({"access_token": "tok", "token_type": "bearer", "scope": "read:user,user:email"}),
            json!({"id": 42, "login": "octo", "email": "a@b.com", "avatar_url": "http://x/a.png"}),
            json!([]),
        )
        .await
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.state.profile_calls.load(Ordering::SeqCst)
    }

    pub fn email_calls(&self) -> usize {
        self.state.email_calls.load(Ordering::SeqCst)
    }
}

async fn token_handler(State(state): State<Arc<FakeGitHubState>>) -> Json<Value> {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    Json(state.token.clone())
}

async fn profile_handler(
    State(state): State<Arc<FakeGitHubState>>,
    headers: HeaderMap,
) -> Json<Value> {
    state.profile_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return Json(json!({"message": "Bad credentials"}));
    }
    Json(state.profile.clone())
}

async fn emails_handler(
    State(state): State<Arc<FakeGitHubState>>,
    headers: HeaderMap,
) -> Json<Value> {
    state.email_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return Json(json!({"message": "Bad credentials"}));
    }
    Json(state.emails.clone())
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == "bearer tok")
}

/// Create test configuration pointing at `github_addr`
pub fn test_config(github_addr: &str) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            domain: "localhost:3000".to_string(),
            protocol: "http".to_string(),
        },
        github: config::GitHubOAuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            scope: "read:user user:email".to_string(),
            redirect_uri: "http://localhost:3000/api/auth/github".to_string(),
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: format!("{github_addr}/login/oauth/access_token"),
            api_base_url: github_addr.to_string(),
            request_timeout_seconds: 5,
        },
        auth: config::AuthConfig {
            session_secret: SESSION_SECRET.to_string(),
            session_max_age: 3600,
            cookie_name: "github-token".to_string(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: FakeGitHub,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Test server backed by a GitHub that signs in successfully
    pub async fn new() -> Self {
        Self::with_github(FakeGitHub::happy().await).await
    }

    pub async fn with_github(github: FakeGitHub) -> Self {
        let config = test_config(&github.addr);
        Self::with_config(github, config).await
    }

    pub async fn with_config(github: FakeGitHub, config: config::AppConfig) -> Self {
        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Redirects are what we are testing, never follow them
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = ghlogin::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            github,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Signed credential for user 42, as the sign-in flow would issue it
    pub fn create_test_token(&self) -> String {
        self.state
            .signer
            .sign(&ghlogin::auth::UserIdentity {
                id: 42,
                email: "a@b.com".to_string(),
                avatar_url: "http://x/a.png".to_string(),
            })
            .unwrap()
    }
}

/// `Location` header of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// All `Set-Cookie` header values
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(ToString::to_string))
        .collect()
}
