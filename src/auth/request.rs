//! Request and response handles for one sign-in attempt
//!
//! The state machine only reads the method and query of the inbound
//! request, and only writes headers plus a single redirect.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;

/// The parts of the inbound request the sign-in flow looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    method: Method,
    query: Vec<(String, String)>,
}

impl AuthRequest {
    /// Build from an HTTP method and the raw (still encoded) query string
    pub fn new(method: Method, raw_query: Option<&str>) -> Self {
        let query = raw_query
            .map(|raw| {
                url::form_urlencoded::parse(raw.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        Self { method, query }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Every value given for `name`, in order
    pub fn query_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The authorization code
    ///
    /// Present only when the query carries exactly one non-empty `code`.
    pub fn code(&self) -> Option<&str> {
        let mut codes = self.query_values("code");
        match (codes.next(), codes.next()) {
            (Some(code), None) if !code.is_empty() => Some(code),
            _ => None,
        }
    }

    /// GitHub's `error` parameter(s), space-joined
    pub fn error_message(&self) -> Option<String> {
        let message = self
            .query_values("error")
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        (!message.is_empty()).then_some(message)
    }
}

/// Outbound response under construction
///
/// Collects headers and exactly one redirect. Nothing may be written
/// once the redirect is set.
#[derive(Debug, Default)]
pub struct AuthResponse {
    headers: HeaderMap,
    location: Option<String>,
}

impl AuthResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), AppError> {
        if self.location.is_some() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "response already redirected; refusing to add {name}"
            )));
        }
        self.headers.append(name, value);
        Ok(())
    }

    pub fn redirect(&mut self, location: impl Into<String>) -> Result<(), AppError> {
        if let Some(existing) = &self.location {
            return Err(AppError::Internal(anyhow::anyhow!(
                "response already redirected to {existing}"
            )));
        }
        self.location = Some(location.into());
        Ok(())
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl IntoResponse for AuthResponse {
    fn into_response(self) -> Response {
        let Some(location) = self.location else {
            return AppError::Internal(anyhow::anyhow!("sign-in finished without a redirect"))
                .into_response();
        };

        let location = match HeaderValue::from_str(&location) {
            Ok(location) => location,
            Err(error) => return AppError::Internal(error.into()).into_response(),
        };

        let mut response = StatusCode::SEE_OTHER.into_response();
        *response.headers_mut() = self.headers;
        response.headers_mut().insert(LOCATION, location);
        response
    }
}
