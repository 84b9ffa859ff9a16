//! GitHub sign-in state machine
//!
//! One attempt runs from the inbound callback request to exactly one
//! redirect:
//!
//! ```text
//! idle ─initialize─▶ validatingClient ─valid─▶ validatingRequest ─valid─▶ requestingAccessToken
//!                        │                        │ methodInvalid → redirectingToHome
//!                        │ invalidClient*         │ error         → redirectingToError
//!                        ▼                        │ codeMissing   → redirectingToAuthorize
//!                  redirectingToError
//!
//! requestingAccessToken ─tokenReceived─▶ fetchingUser ─userReceived─▶ signingToken
//!        │ tokenMissing → redirectingToAuthorize │ userIdMissing → redirectingToAuthorize
//!                                                │ userEmailMissing
//!                                                ▼
//!                                       fetchingPrimaryEmail ─userPrimaryEmailReceived─▶ signingToken
//!
//! signingToken ─tokenSigned─▶ settingCookie ─done─▶ redirectingToHome
//! ```
//!
//! Any non-terminal state also accepts `failed`, which leads to
//! `redirectingToError`. Only `settingCookie` and the `redirecting*`
//! states touch the response, and each is entered at most once.

use crate::auth::cookie::SessionCookie;
use crate::auth::request::{AuthRequest, AuthResponse};
use crate::auth::session::{SessionSigner, UserIdentity};
use crate::config::GitHubOAuthConfig;
use crate::github::{self, AccessToken, GitHubApi};
use crate::metrics::{AUTH_ATTEMPTS_TOTAL, ERRORS_TOTAL};

const INVALID_CLIENT_ID: &str = "Invalid GitHub client ID provided";
const INVALID_CLIENT_SECRET: &str = "Invalid GitHub client secret provided";
const GITHUB_UNAVAILABLE: &str = "Unable to complete sign-in with GitHub, please try again";
const NO_EMAIL: &str = "No email address is associated with this GitHub account";
const UNEXPECTED: &str = "Unexpected sign-in error, please try again";

/// Machine states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    ValidatingClient,
    ValidatingRequest,
    RequestingAccessToken,
    FetchingUser,
    FetchingPrimaryEmail,
    SigningToken,
    SettingCookie,
    RedirectingToHome,
    RedirectingToError { message: String },
    RedirectingToAuthorize,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::ValidatingClient => "validatingClient",
            State::ValidatingRequest => "validatingRequest",
            State::RequestingAccessToken => "requestingAccessToken",
            State::FetchingUser => "fetchingUser",
            State::FetchingPrimaryEmail => "fetchingPrimaryEmail",
            State::SigningToken => "signingToken",
            State::SettingCookie => "settingCookie",
            State::RedirectingToHome => "redirectingToHome",
            State::RedirectingToError { .. } => "redirectingToError",
            State::RedirectingToAuthorize => "redirectingToAuthorize",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::RedirectingToHome
                | State::RedirectingToError { .. }
                | State::RedirectingToAuthorize
        )
    }
}

/// Profile fields known before the email is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialUser {
    pub id: u64,
    pub email: Option<String>,
    pub avatar_url: String,
}

impl PartialUser {
    /// Complete identity, if the email is known
    pub fn identity(&self) -> Option<UserIdentity> {
        let email = self.email.clone().filter(|email| !email.is_empty())?;
        Some(UserIdentity {
            id: self.id,
            email,
            avatar_url: self.avatar_url.clone(),
        })
    }
}

impl From<UserIdentity> for PartialUser {
    fn from(user: UserIdentity) -> Self {
        Self {
            id: user.id,
            email: Some(user.email),
            avatar_url: user.avatar_url,
        }
    }
}

/// Outcome events reported by each state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Initialize { request: AuthRequest },
    InvalidClientId { message: String },
    InvalidClientSecret { message: String },
    Valid,
    MethodInvalid,
    CodeMissing,
    Error { message: String },
    TokenReceived { token: AccessToken },
    TokenMissing,
    UserReceived { user: UserIdentity },
    UserEmailMissing { user: PartialUser },
    UserIdMissing,
    UserPrimaryEmailReceived { email: String },
    TokenSigned { credential: String },
    Done,
    Failed { message: String },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initialize { .. } => "initialize",
            Event::InvalidClientId { .. } => "invalidClientId",
            Event::InvalidClientSecret { .. } => "invalidClientSecret",
            Event::Valid => "valid",
            Event::MethodInvalid => "methodInvalid",
            Event::CodeMissing => "codeMissing",
            Event::Error { .. } => "error",
            Event::TokenReceived { .. } => "tokenReceived",
            Event::TokenMissing => "tokenMissing",
            Event::UserReceived { .. } => "userReceived",
            Event::UserEmailMissing { .. } => "userEmailMissing",
            Event::UserIdMissing => "userIdMissing",
            Event::UserPrimaryEmailReceived { .. } => "userPrimaryEmailReceived",
            Event::TokenSigned { .. } => "tokenSigned",
            Event::Done => "done",
            Event::Failed { .. } => "failed",
        }
    }
}

/// Transition table
///
/// Returns `None` when `state` does not accept `event`. Terminal states
/// accept nothing.
pub fn transition(state: &State, event: &Event) -> Option<State> {
    use Event as E;
    use State as S;

    let next = match (state, event) {
        (S::Idle, E::Initialize { .. }) => S::ValidatingClient,

        (S::ValidatingClient, E::InvalidClientId { message })
        | (S::ValidatingClient, E::InvalidClientSecret { message }) => S::RedirectingToError {
            message: message.clone(),
        },
        (S::ValidatingClient, E::Valid) => S::ValidatingRequest,

        (S::ValidatingRequest, E::MethodInvalid) => S::RedirectingToHome,
        (S::ValidatingRequest, E::Error { message }) => S::RedirectingToError {
            message: message.clone(),
        },
        (S::ValidatingRequest, E::CodeMissing) => S::RedirectingToAuthorize,
        (S::ValidatingRequest, E::Valid) => S::RequestingAccessToken,

        (S::RequestingAccessToken, E::TokenReceived { .. }) => S::FetchingUser,
        (S::RequestingAccessToken, E::TokenMissing) => S::RedirectingToAuthorize,

        (S::FetchingUser, E::UserReceived { .. }) => S::SigningToken,
        (S::FetchingUser, E::UserEmailMissing { .. }) => S::FetchingPrimaryEmail,
        (S::FetchingUser, E::UserIdMissing) => S::RedirectingToAuthorize,

        (S::FetchingPrimaryEmail, E::UserPrimaryEmailReceived { .. }) => S::SigningToken,

        (S::SigningToken, E::TokenSigned { .. }) => S::SettingCookie,

        (S::SettingCookie, E::Done) => S::RedirectingToHome,

        (state, E::Failed { message }) if !state.is_terminal() => S::RedirectingToError {
            message: message.clone(),
        },

        _ => return None,
    };

    Some(next)
}

/// Working state of one attempt
///
/// Flow fields only ever go from unset to set. Each event produces a new
/// snapshot through [`AuthContext::apply`].
#[derive(Debug, Clone)]
pub struct AuthContext<'a> {
    pub config: &'a GitHubOAuthConfig,
    pub request: Option<AuthRequest>,
    pub code: Option<String>,
    pub token: Option<AccessToken>,
    pub user: Option<PartialUser>,
    pub signed_token: Option<String>,
}

impl<'a> AuthContext<'a> {
    pub fn new(config: &'a GitHubOAuthConfig) -> Self {
        Self {
            config,
            request: None,
            code: None,
            token: None,
            user: None,
            signed_token: None,
        }
    }

    /// Context after `event` has been accepted
    pub fn apply(self, event: &Event) -> Self {
        match event {
            Event::Initialize { request } if self.request.is_none() => Self {
                code: request.code().map(ToOwned::to_owned),
                request: Some(request.clone()),
                ..self
            },
            Event::TokenReceived { token } => Self {
                token: Some(token.clone()),
                ..self
            },
            Event::UserReceived { user } => Self {
                user: Some(user.clone().into()),
                ..self
            },
            Event::UserEmailMissing { user } => Self {
                user: Some(user.clone()),
                ..self
            },
            Event::UserPrimaryEmailReceived { email } => {
                let user = self.user.clone().map(|user| PartialUser {
                    email: Some(email.clone()),
                    ..user
                });
                Self { user, ..self }
            }
            Event::TokenSigned { credential } => Self {
                signed_token: Some(credential.clone()),
                ..self
            },
            _ => self,
        }
    }
}

/// Which redirect ended the attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Home,
    Error,
    Authorize,
}

impl RedirectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectKind::Home => "home",
            RedirectKind::Error => "error",
            RedirectKind::Authorize => "authorize",
        }
    }
}

/// Result of a finished attempt
#[derive(Debug)]
pub struct AuthOutcome {
    pub response: AuthResponse,
    pub final_state: State,
    /// State names in the order they were entered, starting with `idle`
    pub visited: Vec<&'static str>,
    /// Credential issued by a successful attempt
    pub credential: Option<String>,
}

impl AuthOutcome {
    pub fn kind(&self) -> RedirectKind {
        match self.final_state {
            State::RedirectingToHome => RedirectKind::Home,
            State::RedirectingToAuthorize => RedirectKind::Authorize,
            _ => RedirectKind::Error,
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.response.location()
    }
}

impl axum::response::IntoResponse for AuthOutcome {
    fn into_response(self) -> axum::response::Response {
        self.response.into_response()
    }
}

/// Drives one sign-in attempt
///
/// Borrowed collaborators live for the attempt only; the machine holds
/// no state between calls to [`AuthMachine::run`].
pub struct AuthMachine<'a, A: GitHubApi + ?Sized> {
    github: &'a A,
    config: &'a GitHubOAuthConfig,
    signer: &'a SessionSigner,
    cookie: &'a SessionCookie,
}

impl<'a, A: GitHubApi + ?Sized> AuthMachine<'a, A> {
    pub fn new(
        github: &'a A,
        config: &'a GitHubOAuthConfig,
        signer: &'a SessionSigner,
        cookie: &'a SessionCookie,
    ) -> Self {
        Self {
            github,
            config,
            signer,
            cookie,
        }
    }

    /// Run the attempt to its single redirect
    pub async fn run(&self, request: AuthRequest) -> AuthOutcome {
        let mut response = AuthResponse::new();
        let mut context = AuthContext::new(self.config);
        let mut state = State::Idle;
        let mut visited = vec![state.name()];
        let mut event = Event::Initialize { request };

        loop {
            let next = transition(&state, &event).unwrap_or_else(|| {
                tracing::error!(
                    state = state.name(),
                    event = event.name(),
                    "Event not accepted by sign-in state"
                );
                State::RedirectingToError {
                    message: UNEXPECTED.to_string(),
                }
            });

            tracing::debug!(
                from = state.name(),
                to = next.name(),
                event = event.name(),
                "Sign-in transition"
            );

            context = context.apply(&event);
            state = next;
            visited.push(state.name());

            match self.enter(&state, &context, &mut response).await {
                Some(outcome) => event = outcome,
                None => break,
            }
        }

        let outcome = AuthOutcome {
            response,
            final_state: state,
            visited,
            credential: context.signed_token,
        };

        AUTH_ATTEMPTS_TOTAL
            .with_label_values(&[outcome.kind().as_str()])
            .inc();
        tracing::info!(
            outcome = outcome.kind().as_str(),
            user_id = context.user.as_ref().map(|user| user.id),
            "Sign-in attempt finished"
        );

        outcome
    }

    /// Perform the entry action of `state`
    ///
    /// Returns the event it produced, or `None` once a terminal state has
    /// written its redirect.
    async fn enter(
        &self,
        state: &State,
        context: &AuthContext<'_>,
        response: &mut AuthResponse,
    ) -> Option<Event> {
        let event = match state {
            State::Idle => Event::Failed {
                message: UNEXPECTED.to_string(),
            },
            State::ValidatingClient => validate_client(context.config),
            State::ValidatingRequest => validate_request(context),
            State::RequestingAccessToken => self.request_access_token(context).await,
            State::FetchingUser => self.fetch_user(context).await,
            State::FetchingPrimaryEmail => self.fetch_primary_email(context).await,
            State::SigningToken => self.sign_token(context),
            State::SettingCookie => self.set_cookie(context, response),
            State::RedirectingToHome => {
                write_redirect(response, "/".to_string());
                return None;
            }
            State::RedirectingToError { message } => {
                write_redirect(response, error_location(message));
                return None;
            }
            State::RedirectingToAuthorize => {
                let location = authorize_url(context.config).unwrap_or_else(|error| {
                    tracing::error!(%error, "Could not build GitHub authorization URL");
                    error_location(UNEXPECTED)
                });
                write_redirect(response, location);
                return None;
            }
        };

        Some(event)
    }

    async fn request_access_token(&self, context: &AuthContext<'_>) -> Event {
        let Some(code) = context.code.as_deref() else {
            return Event::Failed {
                message: UNEXPECTED.to_string(),
            };
        };

        match self
            .github
            .exchange_code_for_token(&self.config.client_id, &self.config.client_secret, code)
            .await
        {
            Ok(response) => match response.into_access_token() {
                Some(token) => Event::TokenReceived { token },
                None => Event::TokenMissing,
            },
            Err(error) => github_failure("token", error),
        }
    }

    async fn fetch_user(&self, context: &AuthContext<'_>) -> Event {
        let Some(token) = &context.token else {
            return Event::TokenMissing;
        };

        let profile = match self.github.fetch_profile(token).await {
            Ok(profile) => profile,
            Err(error) => return github_failure("user", error),
        };

        let Some(id) = profile.id else {
            return Event::UserIdMissing;
        };

        match profile.email.filter(|email| !email.is_empty()) {
            Some(email) => Event::UserReceived {
                user: UserIdentity {
                    id,
                    email,
                    avatar_url: profile.avatar_url,
                },
            },
            None => Event::UserEmailMissing {
                user: PartialUser {
                    id,
                    email: None,
                    avatar_url: profile.avatar_url,
                },
            },
        }
    }

    async fn fetch_primary_email(&self, context: &AuthContext<'_>) -> Event {
        let Some(token) = &context.token else {
            return Event::Failed {
                message: UNEXPECTED.to_string(),
            };
        };

        match self.github.fetch_emails(token).await {
            Ok(emails) => match github::select_primary_email(&emails) {
                Some(email) => Event::UserPrimaryEmailReceived { email },
                None => Event::Failed {
                    message: NO_EMAIL.to_string(),
                },
            },
            Err(error) => github_failure("emails", error),
        }
    }

    fn sign_token(&self, context: &AuthContext<'_>) -> Event {
        let Some(user) = context.user.as_ref().and_then(PartialUser::identity) else {
            tracing::error!("Refusing to sign an identity without an email");
            return Event::Failed {
                message: NO_EMAIL.to_string(),
            };
        };

        match self.signer.sign(&user) {
            Ok(credential) => Event::TokenSigned { credential },
            Err(error) => {
                tracing::error!(%error, "Failed to sign session credential");
                Event::Failed {
                    message: UNEXPECTED.to_string(),
                }
            }
        }
    }

    fn set_cookie(&self, context: &AuthContext<'_>, response: &mut AuthResponse) -> Event {
        let Some(credential) = context.signed_token.as_deref() else {
            return Event::Failed {
                message: UNEXPECTED.to_string(),
            };
        };

        match self.cookie.attach(response, credential) {
            Ok(()) => Event::Done,
            Err(error) => {
                tracing::error!(%error, "Failed to set session cookie");
                Event::Failed {
                    message: UNEXPECTED.to_string(),
                }
            }
        }
    }
}

fn validate_client(config: &GitHubOAuthConfig) -> Event {
    if config.client_id.is_empty() {
        return Event::InvalidClientId {
            message: INVALID_CLIENT_ID.to_string(),
        };
    }

    if config.client_secret.is_empty() {
        return Event::InvalidClientSecret {
            message: INVALID_CLIENT_SECRET.to_string(),
        };
    }

    Event::Valid
}

fn validate_request(context: &AuthContext<'_>) -> Event {
    let Some(request) = &context.request else {
        return Event::Failed {
            message: UNEXPECTED.to_string(),
        };
    };

    // GitHub sends the user back with a GET; anything else is not ours
    if request.method() != axum::http::Method::GET {
        return Event::MethodInvalid;
    }

    if let Some(message) = request.error_message() {
        return Event::Error { message };
    }

    // First visit: no code yet, go and get one
    if context.code.is_none() {
        return Event::CodeMissing;
    }

    Event::Valid
}

fn github_failure(endpoint: &'static str, error: crate::error::AppError) -> Event {
    tracing::error!(endpoint, %error, "GitHub request failed");
    ERRORS_TOTAL.with_label_values(&[error.kind()]).inc();
    Event::Failed {
        message: GITHUB_UNAVAILABLE.to_string(),
    }
}

fn write_redirect(response: &mut AuthResponse, location: String) {
    if let Err(error) = response.redirect(location) {
        tracing::error!(%error, "Sign-in redirect written twice");
    }
}

/// Home page location carrying a human readable error
pub fn error_location(message: &str) -> String {
    format!("/?error={}", urlencoding::encode(message))
}

/// GitHub authorization URL that sends the user back to `redirect_uri`
pub fn authorize_url(config: &GitHubOAuthConfig) -> Result<String, url::ParseError> {
    let url = url::Url::parse_with_params(
        &config.authorize_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("scope", config.scope.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
        ],
    )?;
    Ok(url.into())
}
