//! HTTP gateway for the workspace.
//!
//! Provides:
//! - `GatewayConfig` - Command-line and environment configuration
//! - `protocol` - Request and response bodies for every route
//! - `build_router` - The axum router over a shared `AppState`

pub mod config;
pub mod protocol;
pub mod routes;

pub use config::GatewayConfig;
pub use routes::{AppState, DEFAULT_BODY_LIMIT, build_router};
