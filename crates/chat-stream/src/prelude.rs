//! Common imports for wiring a coordinator and consuming its streams.
pub use crate::{
    AbortHandle, BackendId, ChatMessage, DeliveryBridge, EventStream, GenerationRequest,
    GenerationSource, MessagePart, ModelCatalog, ModelInfo, PersistenceSink, Role, ServiceError,
    SourceRegistry, StreamCoordinator, StreamEvent, StreamOptions, StreamOutcome, StreamSummary,
    WireUnit,
};
