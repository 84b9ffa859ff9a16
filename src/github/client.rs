//! reqwest-backed GitHub client

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use super::{AccessToken, AccessTokenResponse, GitHubApi, GitHubEmail, GitHubProfile};
use crate::config::GitHubOAuthConfig;
use crate::error::{AppError, Result};
use crate::metrics::{GITHUB_REQUEST_DURATION_SECONDS, GITHUB_REQUESTS_TOTAL};

const GITHUB_JSON: &str = "application/vnd.github+json";

/// HTTP client for GitHub
///
/// Holds only the endpoint URLs and a configured `reqwest::Client`;
/// nothing from one attempt is kept for the next.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    token_url: String,
    profile_url: String,
    emails_url: String,
}

impl GitHubClient {
    /// Build a client from the GitHub section of the configuration
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(config: &GitHubOAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ghlogin/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self::with_http_client(http, config))
    }

    /// Build a client around an existing `reqwest::Client`
    pub fn with_http_client(http: reqwest::Client, config: &GitHubOAuthConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            profile_url: config.profile_url(),
            emails_url: config.emails_url(),
        }
    }

    async fn get_json<T>(&self, endpoint: &'static str, url: &str, token: &AccessToken) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let started = Instant::now();
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, token.authorization_header())
            .header(ACCEPT, GITHUB_JSON)
            .send()
            .await?;
        record_request(endpoint, response.status(), started);
        reject_server_error(endpoint, response.status())?;

        // 4xx bodies are decoded too; GitHub's error object simply lacks the
        // fields the caller looks for.
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    #[tracing::instrument(skip_all, err, fields(endpoint = "token"))]
    async fn exchange_code_for_token(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<AccessTokenResponse> {
        let started = Instant::now();
        let response = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
            ])
            .send()
            .await?;
        record_request("token", response.status(), started);
        reject_server_error("token", response.status())?;

        let body: AccessTokenResponse = response.json().await?;
        if let Some(error) = &body.error {
            tracing::warn!(
                error = %error,
                description = body.error_description.as_deref().unwrap_or_default(),
                "GitHub rejected the authorization code"
            );
        }

        Ok(body)
    }

    #[tracing::instrument(skip_all, err, fields(endpoint = "user"))]
    async fn fetch_profile(&self, token: &AccessToken) -> Result<GitHubProfile> {
        self.get_json("user", &self.profile_url, token).await
    }

    #[tracing::instrument(skip_all, err, fields(endpoint = "emails"))]
    async fn fetch_emails(&self, token: &AccessToken) -> Result<Vec<GitHubEmail>> {
        self.get_json("emails", &self.emails_url, token).await
    }
}

fn reject_server_error(endpoint: &str, status: reqwest::StatusCode) -> Result<()> {
    if status.is_server_error() {
        return Err(AppError::Provider(format!(
            "GitHub {endpoint} endpoint answered {status}"
        )));
    }
    Ok(())
}

fn record_request(endpoint: &str, status: reqwest::StatusCode, started: Instant) {
    GITHUB_REQUESTS_TOTAL
        .with_label_values(&[endpoint, status.as_str()])
        .inc();
    GITHUB_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint])
        .observe(started.elapsed().as_secs_f64());
    tracing::debug!(endpoint, status = status.as_u16(), "GitHub responded");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Form, Json, Router,
        http::HeaderMap,
        routing::{get, post},
    };
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    async fn spawn_github(app: Router) -> GitHubOAuthConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = crate::config::tests::valid_config().github;
        config.token_url = format!("http://{addr}/login/oauth/access_token");
        config.api_base_url = format!("http://{addr}");
        config
    }

    #[tokio::test]
    async fn exchange_posts_form_and_asks_for_json() {
        let app = Router::new().route(
            "/login/oauth/access_token",
            post(
                |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    assert_eq!(headers.get("accept").unwrap(), "application/json");
                    assert_eq!(form.get("client_id").unwrap(), "id");
                    assert_eq!(form.get("client_secret").unwrap(), "secret");
                    assert_eq!(form.get("code").unwrap(), "abc123");
                    Json(json!({"access_token": "tok", "token_type": "bearer", "scope": "read:user"}))
                },
            ),
        );
        let client = GitHubClient::new(&spawn_github(app).await).unwrap();

        let response = client
            .exchange_code_for_token("id", "secret", "abc123")
            .await
            .unwrap();

        assert_eq!(response.access_token.as_deref(), Some("tok"));
        assert_eq!(response.token_type.as_deref(), Some("bearer"));
    }

    #[tokio::test]
    async fn profile_and_emails_send_authorization_header() {
        let app = Router::new()
            .route(
                "/user",
                get(|headers: HeaderMap| async move {
                    assert_eq!(headers.get("authorization").unwrap(), "bearer tok");
                    Json(json!({"id": 42, "email": null, "avatar_url": "http://x/a.png"}))
                }),
            )
            .route(
                "/user/emails",
                get(|headers: HeaderMap| async move {
                    assert_eq!(headers.get("authorization").unwrap(), "bearer tok");
                    Json(json!([
                        {"email": "other@b.com", "primary": false, "verified": true},
                        {"email": "a@b.com", "primary": true, "verified": true}
                    ]))
                }),
            );
        let client = GitHubClient::new(&spawn_github(app).await).unwrap();
        let token = AccessToken::new("tok", "bearer");

        let profile = client.fetch_profile(&token).await.unwrap();
        assert_eq!(profile.id, Some(42));
        assert_eq!(profile.email, None);

        let emails = client.fetch_emails(&token).await.unwrap();
        assert_eq!(emails.len(), 2);
        assert!(emails[1].primary);
    }

    #[tokio::test]
    async fn server_error_is_a_provider_error() {
        let app = Router::new().route(
            "/user",
            get(|| async { axum::http::StatusCode::BAD_GATEWAY }),
        );
        let client = GitHubClient::new(&spawn_github(app).await).unwrap();

        let result = client.fetch_profile(&AccessToken::new("tok", "bearer")).await;

        assert!(matches!(result, Err(AppError::Provider(_))));
    }

    #[tokio::test]
    async fn undecodable_body_is_an_error() {
        let app = Router::new().route("/user/emails", get(|| async { "<html>oops</html>" }));
        let client = GitHubClient::new(&spawn_github(app).await).unwrap();

        let result = client
            .fetch_emails(&AccessToken::new("tok", "bearer"))
            .await;

        assert!(matches!(result, Err(AppError::HttpClient(_))));
    }
}
