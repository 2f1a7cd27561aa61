//! HTTP handlers, grouped by resource.

pub mod chat;
pub mod documents;
pub mod health;
pub mod history;
pub mod suggestions;
