//! Streaming reply pipeline for chat backends.
//!
//! A [`StreamCoordinator`] resolves a model to a [`GenerationSource`], pulls
//! text fragments from it, encodes them as server-sent-event frames and
//! records the finished reply through a [`PersistenceSink`]. Frames are
//! consumed either asynchronously through an [`EventStream`] or from plain
//! threads through a [`DeliveryBridge`].
//!
//! Vendor backends are namespaced under `vendors::*`.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chat_stream::prelude::*;
//! use chat_stream::vendors::ollama::OllamaSource;
//!
//! # async fn demo(sink: Arc<dyn PersistenceSink>) -> Result<(), ServiceError> {
//! let registry = SourceRegistry::builder()
//!     .register_source(Arc::new(OllamaSource::from_env()?))
//!     .catalog(ModelCatalog::ollama_defaults())
//!     .build()?;
//! let coordinator = StreamCoordinator::new(Arc::new(registry), sink);
//!
//! let history = vec![ChatMessage::text(Role::User, "Say hello")];
//! let mut events = coordinator
//!     .start(uuid::Uuid::new_v4(), GenerationRequest::new("phi3:mini", history))
//!     .await?;
//! while let Some(unit) = events.next_unit().await {
//!     print!("{unit}");
//! }
//! # Ok(())
//! # }
//! ```

/// Blocking, thread-backed delivery of one stream.
pub mod bridge;
/// Chat message content types.
pub mod content;
/// Stream coordination, cancellation and stream summaries.
pub mod coordinator;
/// Server-sent-event framing.
pub mod encoder;
/// Public error types.
pub mod errors;
/// Typed stream events and channels.
pub mod event;
/// Backend ids, model catalog and delivery options.
pub mod model;
/// Durable-storage contract for finished replies.
pub mod persistence;
/// Common imports for typical usage.
pub mod prelude;
/// Registry of generation backends.
pub mod registry;
/// Generation source contract.
pub mod source;
pub mod sse;
/// Response headers and the blocking writer pump.
pub mod transport;
/// Vendor-specific generation backends.
pub mod vendors;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::DeliveryBridge;
pub use content::{ChatMessage, MessagePart, Role};
pub use coordinator::{
    AbortHandle, EventStream, StreamCoordinator, StreamOutcome, StreamSummary, StreamTask,
};
pub use encoder::{WireUnit, encode, encode_event};
pub use errors::{PersistenceError, ServiceError, SourceError, StreamFailure};
pub use event::{Channel, StreamEvent};
pub use model::{BackendId, ModelCatalog, ModelInfo, StreamOptions};
pub use persistence::{MessageRecord, NewMessage, PersistenceSink};
pub use registry::{SourceRegistry, SourceRegistryBuilder};
pub use source::{FragmentStream, GenerationRequest, GenerationSource};
