//! Session credentials
//!
//! Uses HMAC-signed tokens stored in cookies.
//! No server-side session storage needed.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Signed-in GitHub user
///
/// The identity carried inside the session credential. It always has an
/// email; the sign-in flow never signs one without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// GitHub user ID
    pub id: u64,
    /// Profile email, or the primary address from `/user/emails`
    pub email: String,
    /// Avatar URL from GitHub
    pub avatar_url: String,
}

/// Payload of a credential: the identity plus its validity window
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    user: UserIdentity,
    /// Issued at (unix seconds)
    iat: i64,
    /// Expires at (unix seconds)
    exp: i64,
}

/// Signs identities into credentials and verifies them again
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
#[derive(Clone)]
pub struct SessionSigner {
    secret: String,
    max_age: Duration,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("secret", &"[REDACTED]")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl SessionSigner {
    /// # Arguments
    /// * `secret` - HMAC secret key
    /// * `max_age_seconds` - Lifetime of issued credentials
    ///
    /// A lifetime beyond what `chrono` can represent is clamped; signing
    /// then fails instead of panicking.
    pub fn new(secret: impl Into<String>, max_age_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            max_age: Duration::try_seconds(max_age_seconds).unwrap_or(Duration::MAX),
        }
    }

    /// Create a signed credential valid from now
    pub fn sign(&self, user: &UserIdentity) -> Result<String, AppError> {
        self.sign_at(user, Utc::now())
    }

    /// Create a signed credential issued at `now`
    ///
    /// Deterministic for a fixed secret, identity and `now`.
    pub fn sign_at(&self, user: &UserIdentity, now: DateTime<Utc>) -> Result<String, AppError> {
        let expires_at = now.checked_add_signed(self.max_age).ok_or_else(|| {
            AppError::Encryption("session lifetime overflows the expiry timestamp".to_string())
        })?;
        let claims = SessionClaims {
            user: user.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        // 1. Serialize claims to JSON
        let payload = serde_json::to_string(&claims).map_err(|e| AppError::Internal(e.into()))?;

        // 2. Base64 encode the payload
        let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

        // 3. Create HMAC-SHA256 signature
        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        // 4. Return "{payload}.{signature}"
        Ok(format!("{}.{}", payload_b64, signature_b64))
    }

    /// Verify a credential and recover its identity
    ///
    /// Any malformed, tampered or expired credential yields `None`.
    pub fn verify(&self, token: &str) -> Option<UserIdentity> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<UserIdentity> {
        match self.decode(token, now) {
            Ok(user) => Some(user),
            Err(error) => {
                tracing::debug!(%error, "Rejected session credential");
                None
            }
        }
    }

    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<UserIdentity, AppError> {
        // 1. Split token into payload and signature
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(AppError::Unauthorized)?;
        if signature_b64.contains('.') {
            return Err(AppError::Unauthorized);
        }

        // 2. Verify HMAC signature
        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());

        let expected_signature = general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AppError::Unauthorized)?;

        mac.verify_slice(&expected_signature)
            .map_err(|_| AppError::InvalidSignature)?;

        // 3. Decode and deserialize payload
        let payload_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::Unauthorized)?;

        let claims: SessionClaims =
            serde_json::from_slice(&payload_bytes).map_err(|_| AppError::Unauthorized)?;

        // 4. Check if credential is expired
        if claims.exp <= now.timestamp() {
            return Err(AppError::Unauthorized);
        }

        Ok(claims.user)
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Encryption(e.to_string()))
    }
}
