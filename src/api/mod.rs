//! API layer
//!
//! HTTP handlers for:
//! - Session lookup
//! - Metrics (Prometheus)

pub mod metrics;
mod session;

pub use metrics::metrics_router;
pub use session::{SessionResponse, session_router};
