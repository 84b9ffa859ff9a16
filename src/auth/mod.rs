//! GitHub OAuth authentication
//!
//! Handles:
//! - The sign-in state machine driving GitHub's code flow
//! - Signed session credentials and their cookie
//! - Session extractors for the read path

mod cookie;
pub mod machine;
mod middleware;
mod oauth;
pub mod request;
pub mod session;

pub use cookie::SessionCookie;
pub use machine::{AuthMachine, AuthOutcome, RedirectKind};
pub use middleware::{CurrentUser, MaybeUser, read_user};
pub use oauth::{GITHUB_AUTH_PATH, auth_router};
pub use request::{AuthRequest, AuthResponse};
pub use session::{SessionSigner, UserIdentity};
