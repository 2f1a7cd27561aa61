use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::encoder::{WireUnit, encode_event};
use crate::errors::{ServiceError, SourceError, StreamFailure};
use crate::event::StreamEvent;
use crate::model::{BackendId, StreamOptions};
use crate::persistence::{MessageRecord, NewMessage, PersistenceSink};
use crate::registry::SourceRegistry;
use crate::source::{FragmentStream, GenerationRequest, GenerationSource};

/// Handle used to cancel a running stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// A cancelled stream stops pulling from its source, emits no terminal
    /// event and persists nothing.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// `message-finish` was delivered. `persisted` is `None` when the
    /// durable write failed after the fact.
    Completed {
        text: String,
        persisted: Option<MessageRecord>,
    },
    /// An `error` event ended the stream; the partial reply was dropped.
    Failed {
        failure: StreamFailure,
        partial_len: usize,
    },
    /// The consumer went away or aborted the stream.
    Cancelled,
}

/// Final report of one stream, available once its worker has ended.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub chat_id: uuid::Uuid,
    pub message_id: uuid::Uuid,
    pub outcome: StreamOutcome,
}

impl StreamSummary {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, StreamOutcome::Completed { .. })
    }
}

/// Reply text accumulated in arrival order, owned by a single worker.
#[derive(Debug, Default)]
struct AccumulatedResponse {
    text: String,
}

impl AccumulatedResponse {
    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    fn len(&self) -> usize {
        self.text.len()
    }

    fn into_text(self) -> String {
        self.text
    }
}

/// Streaming -> {Finished, Failed}, plus the consumer-driven abort.
enum Terminal {
    Finished(AccumulatedResponse),
    Failed {
        failure: StreamFailure,
        partial: AccumulatedResponse,
    },
    Cancelled,
}

/// One queued frame. The `message-finish` frame carries an acknowledgement
/// that fires when a consumer takes it off the channel.
struct Outgoing {
    unit: WireUnit,
    delivered: Option<oneshot::Sender<()>>,
}

enum Pulled {
    Fragment(String),
    Exhausted,
    Failed(SourceError),
    TimedOut,
}

/// Orchestrates reply streams: resolves the backend, drives the source,
/// encodes events in order and records the finished reply once.
#[derive(Clone)]
pub struct StreamCoordinator {
    registry: Arc<SourceRegistry>,
    sink: Arc<dyn PersistenceSink>,
    options: StreamOptions,
}

impl StreamCoordinator {
    pub fn new(registry: Arc<SourceRegistry>, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            registry,
            sink,
            options: StreamOptions::default(),
        }
    }

    /// Overrides the delivery options used by every stream.
    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Validates a request and wires up one stream without running it.
    ///
    /// The returned [`StreamTask`] must be driven on some async runtime for
    /// the [`EventStream`] to yield anything.
    pub fn open(
        &self,
        chat_id: uuid::Uuid,
        request: GenerationRequest,
    ) -> Result<(StreamTask, EventStream), ServiceError> {
        if self.options.channel_capacity == 0 {
            return Err(ServiceError::Validation(
                "channel_capacity must be greater than 0".into(),
            ));
        }
        if request.history.is_empty() {
            return Err(ServiceError::Validation(
                "message history must not be empty".into(),
            ));
        }
        let (model, source) = self.registry.resolve(Some(&request.model))?;
        let request = GenerationRequest {
            model: model.id.clone(),
            history: request.history,
            system_prompt: request.system_prompt.filter(|s| !s.trim().is_empty()),
        };

        let (tx, rx) = mpsc::channel(self.options.channel_capacity);
        let (summary_tx, summary_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let message_id = uuid::Uuid::new_v4();

        let task = StreamTask {
            source,
            sink: self.sink.clone(),
            request,
            fragment_timeout: self.options.fragment_timeout,
            summary_tx,
            worker: Worker {
                chat_id,
                message_id,
                backend: model.backend.clone(),
                tx,
                abort_rx,
            },
        };
        let events = EventStream {
            chat_id,
            message_id,
            model: model.id,
            rx,
            summary_rx,
            abort_handle: AbortHandle { tx: abort_tx },
        };
        Ok((task, events))
    }

    /// Opens a stream and spawns its worker on the current tokio runtime.
    pub async fn start(
        &self,
        chat_id: uuid::Uuid,
        request: GenerationRequest,
    ) -> Result<EventStream, ServiceError> {
        let (task, events) = self.open(chat_id, request)?;
        tokio::spawn(task.run());
        Ok(events)
    }
}

/// Worker side of one stream. Runs to completion exactly once.
pub struct StreamTask {
    source: Arc<dyn GenerationSource>,
    sink: Arc<dyn PersistenceSink>,
    request: GenerationRequest,
    fragment_timeout: Option<Duration>,
    summary_tx: oneshot::Sender<StreamSummary>,
    worker: Worker,
}

impl StreamTask {
    /// Drives the stream until it finishes, fails or is cancelled.
    ///
    /// The returned summary is also handed to the [`EventStream`].
    pub async fn run(self) -> StreamSummary {
        let StreamTask {
            source,
            sink,
            request,
            fragment_timeout,
            summary_tx,
            mut worker,
        } = self;
        info!(
            chat_id = %worker.chat_id,
            message_id = %worker.message_id,
            backend = %worker.backend,
            model = %request.model,
            history_len = request.history.len(),
            "reply stream started"
        );

        let start = StreamEvent::MessageStart {
            message_id: worker.message_id,
            chat_id: worker.chat_id,
        };
        let terminal = if worker.emit(&start).await {
            worker
                .pump(source.as_ref(), &request, fragment_timeout)
                .await
        } else {
            Terminal::Cancelled
        };
        let outcome = worker.conclude(terminal, sink.as_ref()).await;

        let summary = StreamSummary {
            chat_id: worker.chat_id,
            message_id: worker.message_id,
            outcome,
        };
        let _ = summary_tx.send(summary.clone());
        summary
    }
}

struct Worker {
    chat_id: uuid::Uuid,
    message_id: uuid::Uuid,
    backend: BackendId,
    tx: mpsc::Sender<Outgoing>,
    abort_rx: watch::Receiver<bool>,
}

impl Worker {
    /// Sends one event; `false` means the consumer is gone or aborted.
    async fn emit(&mut self, event: &StreamEvent) -> bool {
        self.send(Outgoing {
            unit: encode_event(event),
            delivered: None,
        })
        .await
    }

    async fn send(&mut self, frame: Outgoing) -> bool {
        tokio::select! {
            biased;
            _ = abort_requested(&mut self.abort_rx) => false,
            sent = self.tx.send(frame) => sent.is_ok(),
        }
    }

    /// Queues `message-finish` and waits until the consumer has taken it.
    /// `false` means the frame was discarded undelivered.
    async fn deliver_finish(&mut self) -> bool {
        let (delivered_tx, mut delivered_rx) = oneshot::channel();
        let finish = StreamEvent::MessageFinish {
            message_id: self.message_id,
        };
        let queued = self
            .send(Outgoing {
                unit: encode_event(&finish),
                delivered: Some(delivered_tx),
            })
            .await;
        if !queued {
            return false;
        }
        tokio::select! {
            biased;
            taken = &mut delivered_rx => return taken.is_ok(),
            _ = abort_requested(&mut self.abort_rx) => {}
            _ = self.tx.closed() => {}
        }
        // The consumer may have taken the frame just before giving up on it.
        delivered_rx.close();
        delivered_rx.try_recv().is_ok()
    }

    /// Pulls fragments until the source is exhausted, fails or the consumer
    /// leaves. The fragment stream is dropped before this returns.
    async fn pump(
        &mut self,
        source: &dyn GenerationSource,
        request: &GenerationRequest,
        fragment_timeout: Option<Duration>,
    ) -> Terminal {
        let mut response = AccumulatedResponse::default();

        let started = tokio::select! {
            biased;
            _ = abort_requested(&mut self.abort_rx) => return Terminal::Cancelled,
            _ = self.tx.closed() => return Terminal::Cancelled,
            started = source.stream(request) => started,
        };
        let mut fragments = match started {
            Ok(fragments) => fragments,
            Err(err) => {
                return Terminal::Failed {
                    failure: StreamFailure::from(&err),
                    partial: response,
                };
            }
        };

        let mut seq = 0_u64;
        loop {
            let pulled = tokio::select! {
                biased;
                _ = abort_requested(&mut self.abort_rx) => return Terminal::Cancelled,
                _ = self.tx.closed() => return Terminal::Cancelled,
                pulled = next_fragment(&mut fragments, fragment_timeout) => pulled,
            };
            match pulled {
                Pulled::Fragment(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    debug!(message_id = %self.message_id, backend = %self.backend, seq, "text fragment");
                    response.push(&text);
                    seq = seq.saturating_add(1);
                    if !self.emit(&StreamEvent::TextDelta { content: text }).await {
                        return Terminal::Cancelled;
                    }
                }
                Pulled::Exhausted => return Terminal::Finished(response),
                Pulled::Failed(err) => {
                    return Terminal::Failed {
                        failure: StreamFailure::from(&err),
                        partial: response,
                    };
                }
                Pulled::TimedOut => {
                    return Terminal::Failed {
                        failure: StreamFailure::Timeout,
                        partial: response,
                    };
                }
            }
        }
    }

    /// Emits the terminal event and, on success, persists the reply.
    async fn conclude(&mut self, terminal: Terminal, sink: &dyn PersistenceSink) -> StreamOutcome {
        match terminal {
            Terminal::Finished(response) => {
                if !self.deliver_finish().await {
                    debug!(message_id = %self.message_id, "consumer left before message-finish; reply not persisted");
                    return StreamOutcome::Cancelled;
                }
                let text = response.into_text();
                let persisted = self.persist(sink, &text).await;
                info!(
                    chat_id = %self.chat_id,
                    message_id = %self.message_id,
                    reply_len = text.len(),
                    persisted = persisted.is_some(),
                    "reply stream finished"
                );
                StreamOutcome::Completed { text, persisted }
            }
            Terminal::Failed { failure, partial } => {
                warn!(
                    chat_id = %self.chat_id,
                    message_id = %self.message_id,
                    backend = %self.backend,
                    error = %failure,
                    partial_len = partial.len(),
                    "reply stream failed; partial reply dropped"
                );
                let _ = self.emit(&StreamEvent::from(&failure)).await;
                StreamOutcome::Failed {
                    failure,
                    partial_len: partial.len(),
                }
            }
            Terminal::Cancelled => {
                debug!(chat_id = %self.chat_id, message_id = %self.message_id, "reply stream cancelled");
                StreamOutcome::Cancelled
            }
        }
    }

    async fn persist(&self, sink: &dyn PersistenceSink, text: &str) -> Option<MessageRecord> {
        match sink
            .add_message(NewMessage::assistant_text(self.chat_id, text))
            .await
        {
            Ok(record) => {
                if let Err(err) = sink.touch_chat(self.chat_id).await {
                    warn!(chat_id = %self.chat_id, error = %err, "failed to touch chat after storing reply");
                }
                Some(record)
            }
            Err(err) => {
                error!(
                    chat_id = %self.chat_id,
                    message_id = %self.message_id,
                    error = %err,
                    "failed to persist assistant reply"
                );
                None
            }
        }
    }
}

async fn abort_requested(abort_rx: &mut watch::Receiver<bool>) {
    if abort_rx.wait_for(|aborted| *aborted).await.is_err() {
        // Every abort handle is gone; only a closed channel can cancel now.
        std::future::pending::<()>().await;
    }
}

async fn next_fragment(fragments: &mut FragmentStream, limit: Option<Duration>) -> Pulled {
    let next = match limit {
        Some(limit) => match tokio::time::timeout(limit, fragments.next()).await {
            Ok(next) => next,
            Err(_) => return Pulled::TimedOut,
        },
        None => fragments.next().await,
    };
    match next {
        Some(Ok(text)) => Pulled::Fragment(text),
        Some(Err(err)) => Pulled::Failed(err),
        None => Pulled::Exhausted,
    }
}

/// Consumer side of one stream: encoded frames in production order.
///
/// Dropping it cancels the stream.
pub struct EventStream {
    chat_id: uuid::Uuid,
    message_id: uuid::Uuid,
    model: String,
    rx: mpsc::Receiver<Outgoing>,
    summary_rx: oneshot::Receiver<StreamSummary>,
    abort_handle: AbortHandle,
}

impl EventStream {
    pub fn chat_id(&self) -> uuid::Uuid {
        self.chat_id
    }

    /// Id announced in `message-start` and `message-finish`.
    pub fn message_id(&self) -> uuid::Uuid {
        self.message_id
    }

    /// Resolved model id.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next frame. Returns `None` once the stream has ended,
    /// and on every call after that.
    ///
    /// Taking `message-finish` is what lets the worker persist the reply.
    pub async fn next_unit(&mut self) -> Option<WireUnit> {
        take(self.rx.recv().await?)
    }

    /// Blocking variant of [`Self::next_unit`]. Panics inside an async context.
    pub(crate) fn blocking_next_unit(&mut self) -> Option<WireUnit> {
        take(self.rx.blocking_recv()?)
    }

    /// Adapts the frames into a `Stream`, e.g. for an HTTP response body.
    pub fn into_stream(self) -> impl futures::Stream<Item = WireUnit> + Send + 'static {
        futures::stream::unfold(self, |mut events| async move {
            let unit = events.next_unit().await?;
            Some((unit, events))
        })
    }

    /// Discards any frames not yet taken and returns the stream summary.
    ///
    /// A `message-finish` discarded here was never delivered, so the reply
    /// is not persisted and the outcome is [`StreamOutcome::Cancelled`].
    pub async fn finish(mut self) -> Result<StreamSummary, ServiceError> {
        while self.rx.recv().await.is_some() {}
        let message_id = self.message_id;
        self.summary_rx
            .await
            .map_err(|_| missing_summary(message_id))
    }

    /// Blocking variant of [`Self::finish`]. Panics inside an async context.
    pub(crate) fn blocking_finish(mut self) -> Result<StreamSummary, ServiceError> {
        while self.rx.blocking_recv().is_some() {}
        let message_id = self.message_id;
        self.summary_rx
            .blocking_recv()
            .map_err(|_| missing_summary(message_id))
    }
}

/// Hands a frame to the consumer. A finish frame whose worker has already
/// given up is withheld.
fn take(frame: Outgoing) -> Option<WireUnit> {
    match frame.delivered {
        None => Some(frame.unit),
        Some(delivered) => delivered.send(()).ok().map(|()| frame.unit),
    }
}

fn missing_summary(message_id: uuid::Uuid) -> ServiceError {
    ServiceError::protocol_msg(format!(
        "stream worker ended without a summary (message_id={message_id})"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ChatMessage, Role};
    use crate::testing::{
        FakeBehavior, FakeSource, RecordingSink, coordinator_with, decode_frames, history,
    };
    use std::sync::atomic::Ordering;

    async fn collect(mut events: EventStream) -> (Vec<(String, serde_json::Value)>, StreamSummary) {
        let mut units = Vec::new();
        while let Some(unit) = events.next_unit().await {
            units.push(unit);
        }
        assert!(events.next_unit().await.is_none(), "stream must not restart");
        let summary = events.finish().await.expect("summary");
        (decode_frames(&units), summary)
    }

    fn types(frames: &[(String, serde_json::Value)]) -> Vec<String> {
        frames
            .iter()
            .map(|(_, json)| json["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn completed_stream_emits_deltas_and_persists_once() {
        let sink = Arc::new(RecordingSink::default());
        let source = FakeSource::new(FakeBehavior::fragments(["Hel", "lo"]));
        let released = source.released();
        let coordinator = coordinator_with(source, sink.clone());
        let chat_id = uuid::Uuid::new_v4();

        let events = coordinator
            .start(chat_id, GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let message_id = events.message_id();
        let (frames, summary) = collect(events).await;

        assert_eq!(
            types(&frames),
            ["message-start", "text-delta", "text-delta", "message-finish"]
        );
        assert!(frames[..3].iter().all(|(channel, _)| channel == "message"));
        assert_eq!(frames[0].1["id"], message_id.to_string());
        assert_eq!(frames[0].1["chat_id"], chat_id.to_string());
        assert_eq!(frames[3].1["id"], message_id.to_string());

        let deltas: String = frames
            .iter()
            .filter_map(|(_, json)| json["content"].as_str())
            .collect();
        let stored = sink.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].chat_id, chat_id);
        assert_eq!(stored[0].role, Role::Assistant);
        assert!(stored[0].attachments.is_empty());
        assert_eq!(stored[0].parts[0].as_text(), Some(deltas.as_str()));
        assert_eq!(deltas, "Hello");
        assert_eq!(sink.touches(), 1);
        assert!(released.load(Ordering::SeqCst));
        assert!(matches!(
            summary.outcome,
            StreamOutcome::Completed { ref text, persisted: Some(_) } if text == "Hello"
        ));
    }

    #[tokio::test]
    async fn mid_stream_failure_emits_error_and_skips_persistence() {
        let sink = Arc::new(RecordingSink::default());
        let source = FakeSource::new(FakeBehavior::Items(vec![
            Ok("Par".into()),
            Err(SourceError::transport("fake", "timeout")),
            Ok("never".into()),
        ]));
        let released = source.released();
        let coordinator = coordinator_with(source, sink.clone());

        let events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let (frames, summary) = collect(events).await;

        assert_eq!(types(&frames), ["message-start", "text-delta", "error"]);
        let (channel, error) = &frames[2];
        assert_eq!(channel, "error");
        assert_eq!(error["error"], "timeout");
        assert_eq!(error["code"], "internal_error");
        assert!(sink.stored().is_empty());
        assert_eq!(sink.touches(), 0);
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(
            summary.outcome,
            StreamOutcome::Failed {
                failure: StreamFailure::Source("timeout".into()),
                partial_len: 3,
            }
        );
    }

    #[tokio::test]
    async fn empty_generation_persists_empty_reply() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(Vec::<String>::new())),
            sink.clone(),
        );

        let events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let (frames, summary) = collect(events).await;

        assert_eq!(types(&frames), ["message-start", "message-finish"]);
        let stored = sink.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].parts[0].as_text(), Some(""));
        assert!(summary.is_completed());
    }

    #[tokio::test]
    async fn failure_before_first_fragment_still_starts_message() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::FailOnStart(SourceError::backend(
                "fake",
                "model not found",
                Some(404),
            ))),
            sink.clone(),
        );

        let events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let (frames, summary) = collect(events).await;

        assert_eq!(types(&frames), ["message-start", "error"]);
        assert_eq!(frames[1].1["error"], "model not found");
        assert!(sink.stored().is_empty());
        assert!(matches!(summary.outcome, StreamOutcome::Failed { partial_len: 0, .. }));
    }

    #[tokio::test]
    async fn empty_fragments_are_not_emitted() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(["", "a", "", "b"])),
            sink.clone(),
        );
        let events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let (frames, _) = collect(events).await;
        assert_eq!(
            types(&frames),
            ["message-start", "text-delta", "text-delta", "message-finish"]
        );
        assert_eq!(sink.stored()[0].parts[0].as_text(), Some("ab"));
    }

    #[tokio::test]
    async fn abort_releases_source_without_terminal_event() {
        let sink = Arc::new(RecordingSink::default());
        let source = FakeSource::new(FakeBehavior::then_pending(["one"]));
        let released = source.released();
        let coordinator = coordinator_with(source, sink.clone());

        let mut events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let abort = events.abort_handle();
        let first = events.next_unit().await.expect("start frame");
        assert!(first.as_str().contains("message-start"));
        let second = events.next_unit().await.expect("delta frame");
        assert!(second.as_str().contains("\"one\""));

        abort.abort();
        assert!(events.next_unit().await.is_none());
        let summary = events.finish().await.expect("summary");

        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert!(released.load(Ordering::SeqCst));
        assert!(sink.stored().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_consumer_cancels_the_worker() {
        let sink = Arc::new(RecordingSink::default());
        let source = FakeSource::new(FakeBehavior::then_pending(["one"]));
        let released = source.released();
        let coordinator = coordinator_with(source, sink.clone());

        let mut events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let _ = events.next_unit().await;
        let _ = events.next_unit().await;
        drop(events);

        for _ in 0..100 {
            if released.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released.load(Ordering::SeqCst));
        assert!(sink.stored().is_empty());
    }

    #[tokio::test]
    async fn leaving_after_first_delta_with_buffered_frames_persists_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let source = FakeSource::new(FakeBehavior::fragments(["a", "b", "c"]));
        let released = source.released();
        let coordinator = coordinator_with(source, sink.clone()).with_options(StreamOptions {
            channel_capacity: 8,
            fragment_timeout: None,
        });

        let (task, mut events) = coordinator
            .open(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .expect("open");
        let worker = tokio::spawn(task.run());
        assert!(events.next_unit().await.expect("start").as_str().contains("message-start"));
        assert!(events.next_unit().await.expect("delta").as_str().contains("\"a\""));
        drop(events);
        let summary = worker.await.expect("worker");

        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert!(sink.stored().is_empty());
        assert_eq!(sink.attempts(), 0);
        assert_eq!(sink.touches(), 0);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn leaving_with_message_finish_buffered_persists_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(["only"])),
            sink.clone(),
        );

        let (task, mut events) = coordinator
            .open(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .expect("open");
        let worker = tokio::spawn(task.run());
        let _ = events.next_unit().await.expect("start");
        let _ = events.next_unit().await.expect("delta");
        // Lets the worker queue message-finish.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(events);
        let summary = worker.await.expect("worker");

        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert!(sink.stored().is_empty());
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn abort_withholds_a_queued_message_finish() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(["only"])),
            sink.clone(),
        );

        let (task, mut events) = coordinator
            .open(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .expect("open");
        let worker = tokio::spawn(task.run());
        let _ = events.next_unit().await.expect("start");
        let _ = events.next_unit().await.expect("delta");
        tokio::time::sleep(Duration::from_millis(20)).await;
        events.abort_handle().abort();
        let summary = worker.await.expect("worker");

        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert!(events.next_unit().await.is_none());
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn fragment_timeout_fails_the_stream() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::then_pending(["slow"])),
            sink.clone(),
        )
        .with_options(StreamOptions {
            channel_capacity: 4,
            fragment_timeout: Some(Duration::from_millis(20)),
        });

        let events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let (frames, summary) = collect(events).await;

        assert_eq!(types(&frames), ["message-start", "text-delta", "error"]);
        assert_eq!(frames[2].1["error"], "timed out waiting for the next fragment");
        assert!(sink.stored().is_empty());
        assert!(matches!(
            summary.outcome,
            StreamOutcome::Failed {
                failure: StreamFailure::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn persistence_failure_does_not_alter_delivered_events() {
        let sink = Arc::new(RecordingSink::failing());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(["ok"])),
            sink.clone(),
        );

        let events = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .expect("start");
        let (frames, summary) = collect(events).await;

        assert_eq!(
            types(&frames),
            ["message-start", "text-delta", "message-finish"]
        );
        assert_eq!(sink.attempts(), 1);
        assert_eq!(
            summary.outcome,
            StreamOutcome::Completed {
                text: "ok".into(),
                persisted: None,
            }
        );
    }

    #[tokio::test]
    async fn open_validates_history_model_and_capacity() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(["x"])),
            sink.clone(),
        );

        let err = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", vec![]))
            .await
            .err()
            .expect("empty history");
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("history")));

        let err = coordinator
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("unknown", history()))
            .await
            .err()
            .expect("unknown model");
        assert!(matches!(err, ServiceError::UnknownModel(_)));

        let err = coordinator
            .clone()
            .with_options(StreamOptions {
                channel_capacity: 0,
                fragment_timeout: None,
            })
            .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
            .await
            .err()
            .expect("zero capacity");
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("channel_capacity")));
    }

    #[tokio::test]
    async fn source_sees_resolved_model_and_trimmed_system_prompt() {
        let sink = Arc::new(RecordingSink::default());
        let source = FakeSource::new(FakeBehavior::fragments(["x"]));
        let seen = source.seen_requests();
        let coordinator = coordinator_with(source, sink);

        let events = coordinator
            .start(
                uuid::Uuid::new_v4(),
                GenerationRequest::new("", vec![ChatMessage::text(Role::User, "hi")])
                    .system_prompt("   "),
            )
            .await
            .expect("start");
        assert_eq!(events.model(), "fake-model");
        let _ = collect(events).await;

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "fake-model");
        assert_eq!(seen[0].system_prompt, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_streams_keep_independent_replies() {
        let sink_a = Arc::new(RecordingSink::default());
        let sink_b = Arc::new(RecordingSink::default());
        let coordinator_a = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(["a1", "a2", "a3"])),
            sink_a.clone(),
        );
        let coordinator_b = coordinator_with(
            FakeSource::new(FakeBehavior::fragments(["b1", "b2"])),
            sink_b.clone(),
        );

        let (a, b) = tokio::join!(
            async {
                let events = coordinator_a
                    .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
                    .await
                    .expect("start a");
                collect(events).await
            },
            async {
                let events = coordinator_b
                    .start(uuid::Uuid::new_v4(), GenerationRequest::new("fake-model", history()))
                    .await
                    .expect("start b");
                collect(events).await
            }
        );

        assert!(a.1.is_completed() && b.1.is_completed());
        assert_eq!(sink_a.stored()[0].parts[0].as_text(), Some("a1a2a3"));
        assert_eq!(sink_b.stored()[0].parts[0].as_text(), Some("b1b2"));
    }
}
