//! HTTP and command line front end for the streaming reply pipeline.
//!
//! `serve` exposes the chat API over axum with SQLite persistence; `ask`
//! streams a single reply to stdout through a delivery bridge.

pub mod ask;
pub mod auth;
pub mod config;
pub mod error;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, AppError};
pub use state::AppState;
