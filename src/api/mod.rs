//! HTTP API module for health, status, and Prometheus endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, BotStatus};
pub use routes::create_router;
