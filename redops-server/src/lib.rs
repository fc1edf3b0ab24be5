//! # Redops Server
//!
//! Axum HTTP surface over the Redops engine. Routes live in [`routes`],
//! grouped handler modules in [`handlers`], and the shared state wiring in
//! [`infra`].

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use errors::{AppError, AppResult};
pub use infra::app_state::AppState;
pub use infra::config::Config;
