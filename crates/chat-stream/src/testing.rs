//! Fakes shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt as _;

use crate::content::{ChatMessage, MessagePart, Role};
use crate::coordinator::StreamCoordinator;
use crate::encoder::WireUnit;
use crate::errors::{PersistenceError, SourceError};
use crate::model::{BackendId, ModelCatalog, ModelInfo};
use crate::persistence::{MessageRecord, NewMessage, PersistenceSink};
use crate::registry::SourceRegistry;
use crate::source::{FragmentStream, GenerationRequest, GenerationSource};
use crate::sse::SseDecoder;

pub(crate) enum FakeBehavior {
    /// Yields the items, then ends.
    Items(Vec<Result<String, SourceError>>),
    /// Yields the fragments, then never yields again.
    ThenPending(Vec<String>),
    /// `stream` itself fails.
    FailOnStart(SourceError),
}

impl FakeBehavior {
    pub(crate) fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Items(fragments.into_iter().map(|f| Ok(f.into())).collect())
    }

    pub(crate) fn then_pending<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ThenPending(fragments.into_iter().map(Into::into).collect())
    }
}

/// Sets a flag when the fragment stream holding it is dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakeSource {
    behavior: Mutex<Option<FakeBehavior>>,
    released: Arc<AtomicBool>,
    seen: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl FakeSource {
    pub(crate) fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior: Mutex::new(Some(behavior)),
            released: Arc::new(AtomicBool::new(false)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Flag flipped once the source's fragment stream has been dropped.
    pub(crate) fn released(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }

    pub(crate) fn seen_requests(&self) -> Arc<Mutex<Vec<GenerationRequest>>> {
        self.seen.clone()
    }
}

#[async_trait::async_trait]
impl GenerationSource for FakeSource {
    fn id(&self) -> BackendId {
        BackendId::new("fake")
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, SourceError> {
        self.seen.lock().expect("seen lock").push(request.clone());
        let behavior = self
            .behavior
            .lock()
            .expect("behavior lock")
            .take()
            .expect("fake source streams once");
        let guard = ReleaseGuard(self.released.clone());
        let items = match behavior {
            FakeBehavior::FailOnStart(err) => return Err(err),
            FakeBehavior::Items(items) => futures::stream::iter(items).boxed(),
            FakeBehavior::ThenPending(fragments) => {
                futures::stream::iter(fragments.into_iter().map(Ok::<String, SourceError>))
                    .chain(futures::stream::pending())
                    .boxed()
            }
        };
        Ok(Box::pin(items.map(move |item| {
            let _held = &guard;
            item
        })))
    }
}

/// Sink that records every write, optionally failing them.
#[derive(Default)]
pub(crate) struct RecordingSink {
    stored: Mutex<Vec<NewMessage>>,
    attempts: AtomicUsize,
    touches: AtomicUsize,
    fail: bool,
}

impl RecordingSink {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn stored(&self) -> Vec<NewMessage> {
        self.stored.lock().expect("stored lock").clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PersistenceSink for RecordingSink {
    async fn add_message(&self, message: NewMessage) -> Result<MessageRecord, PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PersistenceError::Unavailable("disk full".into()));
        }
        let record = MessageRecord {
            id: uuid::Uuid::new_v4(),
            chat_id: message.chat_id,
            role: message.role,
            parts: message.parts.clone(),
            attachments: message.attachments.clone(),
            created_at: chrono::Utc::now(),
        };
        self.stored.lock().expect("stored lock").push(message);
        Ok(record)
    }

    async fn touch_chat(&self, _chat_id: uuid::Uuid) -> Result<(), PersistenceError> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Coordinator over a single fake backend serving `fake-model`.
pub(crate) fn coordinator_with(source: FakeSource, sink: Arc<RecordingSink>) -> StreamCoordinator {
    let registry = SourceRegistry::builder()
        .register_source(Arc::new(source))
        .catalog(
            ModelCatalog::new()
                .with_model(ModelInfo::new("fake", "fake-model", "Fake"))
                .with_default("fake-model"),
        )
        .build()
        .expect("registry");
    StreamCoordinator::new(Arc::new(registry), sink)
}

pub(crate) fn history() -> Vec<ChatMessage> {
    vec![ChatMessage {
        role: Role::User,
        parts: vec![MessagePart::text("Say hello")],
        attachments: Vec::new(),
    }]
}

/// Decodes frames into `(channel, payload)` pairs.
pub(crate) fn decode_frames(units: &[WireUnit]) -> Vec<(String, serde_json::Value)> {
    let mut decoder = SseDecoder::default();
    units
        .iter()
        .flat_map(|unit| decoder.push_chunk(unit.as_bytes()))
        .map(|frame| {
            let json = frame.json().expect("frame json");
            (frame.event.unwrap_or_default(), json)
        })
        .collect()
}
