use std::thread::JoinHandle;

use tracing::{debug, error};

use crate::coordinator::{AbortHandle, EventStream, StreamCoordinator, StreamSummary};
use crate::encoder::WireUnit;
use crate::errors::ServiceError;
use crate::source::GenerationRequest;

/// Pull-based, blocking view of one reply stream.
///
/// Each bridge owns a dedicated worker thread with its own single-threaded
/// runtime, so the coordinator's async work never shares an execution
/// context with other requests. The bounded channel between the worker and
/// the bridge provides back-pressure: the worker is at most
/// `channel_capacity` frames ahead of the consumer.
///
/// Dropping the bridge cancels the stream and waits for the worker, which
/// releases the generation source before the drop returns.
///
/// All methods block the calling thread; do not use a bridge from inside an
/// async runtime. Async callers should use [`EventStream`] directly.
pub struct DeliveryBridge {
    chat_id: uuid::Uuid,
    message_id: uuid::Uuid,
    events: Option<EventStream>,
    abort: AbortHandle,
    worker: Option<JoinHandle<()>>,
}

impl DeliveryBridge {
    /// Validates the request and starts its worker thread.
    pub fn spawn(
        coordinator: &StreamCoordinator,
        chat_id: uuid::Uuid,
        request: GenerationRequest,
    ) -> Result<Self, ServiceError> {
        let (task, events) = coordinator.open(chat_id, request)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ServiceError::Runtime(format!("failed to build stream runtime: {err}")))?;
        let message_id = events.message_id();
        let worker = std::thread::Builder::new()
            .name(format!("reply-{message_id}"))
            .spawn(move || {
                runtime.block_on(task.run());
            })
            .map_err(|err| ServiceError::Runtime(format!("failed to spawn stream worker: {err}")))?;
        debug!(%chat_id, %message_id, "delivery worker spawned");

        Ok(Self {
            chat_id,
            message_id,
            abort: events.abort_handle(),
            events: Some(events),
            worker: Some(worker),
        })
    }

    pub fn chat_id(&self) -> uuid::Uuid {
        self.chat_id
    }

    pub fn message_id(&self) -> uuid::Uuid {
        self.message_id
    }

    /// Blocks until the next frame is produced. Returns `None` once the
    /// stream has ended, and keeps returning `None` afterwards.
    pub fn next_unit(&mut self) -> Option<WireUnit> {
        self.events.as_mut()?.blocking_next_unit()
    }

    /// Cancels the stream. Frames already buffered may still be returned;
    /// the reply is persisted only if `message-finish` was taken first.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Discards the frames not yet taken, joins the worker and returns its
    /// summary.
    pub fn finish(mut self) -> Result<StreamSummary, ServiceError> {
        let events = self
            .events
            .take()
            .ok_or_else(|| ServiceError::protocol_msg("delivery bridge already finished"))?;
        let summary = events.blocking_finish();
        self.join_worker();
        summary
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!(message_id = %self.message_id, "delivery worker panicked");
        }
    }
}

impl Iterator for DeliveryBridge {
    type Item = WireUnit;

    fn next(&mut self) -> Option<WireUnit> {
        self.next_unit()
    }
}

impl Drop for DeliveryBridge {
    fn drop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        self.abort.abort();
        // Closing the receiver also wakes a worker blocked on a full channel.
        self.events.take();
        self.join_worker();
    }
}
