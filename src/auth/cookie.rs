//! Session cookie codec
//!
//! Writes the signed credential into a `Set-Cookie` header and reads it
//! back. No verification happens here; see [`super::session`].

use axum::http::{HeaderMap, HeaderValue, header::SET_COOKIE};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::request::AuthResponse;
use crate::config::AppConfig;
use crate::error::AppError;

/// Session cookie settings
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    /// `secure` is off only for local development hosts
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.auth.cookie_name.clone(),
            config.should_use_secure_cookies(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the session cookie carrying `credential`
    pub fn build(&self, credential: &str) -> Cookie<'static> {
        Cookie::build((self.name.clone(), credential.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Add the `Set-Cookie` header for `credential` to `response`
    pub fn attach(&self, response: &mut AuthResponse, credential: &str) -> Result<(), AppError> {
        let value = HeaderValue::from_str(&self.build(credential).to_string())
            .map_err(|e| AppError::Internal(e.into()))?;
        response.append_header(SET_COOKIE, value)
    }

    /// Read the raw credential from the request's `Cookie` header
    ///
    /// An absent or empty cookie reads as `None`.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        let jar = CookieJar::from_headers(headers);
        jar.get(&self.name)
            .map(|cookie| cookie.value().to_owned())
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn attach_sets_fixed_attributes() {
        let cookie = SessionCookie::new("github-token", true);
        let mut response = AuthResponse::new();
        cookie.attach(&mut response, "payload.signature").unwrap();

        let header = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(header.starts_with("github-token=payload.signature"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Secure"));
    }

    #[test]
    fn local_development_cookie_is_not_secure() {
        let cookie = SessionCookie::new("github-token", false);
        let rendered = cookie.build("x.y").to_string();

        assert!(!rendered.contains("Secure"));
        assert!(rendered.contains("HttpOnly"));
    }

    #[test]
    fn secure_flag_follows_config() {
        let mut config = crate::config::tests::valid_config();
        assert!(!SessionCookie::from_config(&config).build("x").secure().unwrap_or(false));

        config.server.domain = "login.example.com".to_string();
        config.server.protocol = "https".to_string();
        assert_eq!(SessionCookie::from_config(&config).build("x").secure(), Some(true));
    }

    #[test]
    fn read_returns_named_cookie() {
        let cookie = SessionCookie::new("github-token", false);
        let headers = headers_with_cookie("theme=dark; github-token=abc.def");

        assert_eq!(cookie.read(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn read_treats_missing_or_empty_as_absent() {
        let cookie = SessionCookie::new("github-token", false);

        assert_eq!(cookie.read(&HeaderMap::new()), None);
        assert_eq!(cookie.read(&headers_with_cookie("github-token=")), None);
        assert_eq!(cookie.read(&headers_with_cookie("other=value")), None);
    }
}
