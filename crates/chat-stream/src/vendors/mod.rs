//! Built-in generation backends.
//!
//! Each vendor module owns its client configuration and wire decoding so the
//! coordinator stays backend-agnostic.
pub mod ollama;
pub mod openai;
