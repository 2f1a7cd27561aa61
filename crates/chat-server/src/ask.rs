//! `chat-server ask`: one reply, streamed from a plain thread.

use std::io::Write;
use std::sync::Arc;

use chat_store::{ChatRepository, MemoryChatStore, NewChat};
use chat_stream::sse::SseDecoder;
use chat_stream::transport::pump;
use chat_stream::{
    ChatMessage, DeliveryBridge, GenerationRequest, MessagePart, NewMessage, Role,
    StreamCoordinator, StreamOutcome, StreamSummary,
};
use tracing::debug;

use crate::config::AskConfig;
use crate::error::AppError;

/// Owner recorded on chats created from the command line.
const LOCAL_USER: &str = "local";

/// Builds the configured backends and streams one reply into `out`.
pub fn run(config: &AskConfig, out: &mut impl Write) -> Result<StreamSummary, AppError> {
    let registry = Arc::new(config.backend.build_registry()?);
    let store = Arc::new(MemoryChatStore::new());
    let coordinator = StreamCoordinator::new(registry, store.clone())
        .with_options(config.backend.stream_options());
    ask(&coordinator, store.as_ref(), config, out)
}

/// Records the prompt in `store`, then pulls the reply through a
/// [`DeliveryBridge`]. Must not be called from inside an async runtime.
pub fn ask(
    coordinator: &StreamCoordinator,
    store: &dyn ChatRepository,
    config: &AskConfig,
    out: &mut impl Write,
) -> Result<StreamSummary, AppError> {
    let prompt = config.prompt_text();
    let setup = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let chat = setup.block_on(async {
        let chat = store
            .create_chat(NewChat::from_opening_text(LOCAL_USER, &prompt))
            .await?;
        store
            .add_message(NewMessage {
                chat_id: chat.id,
                role: Role::User,
                parts: vec![MessagePart::text(prompt.as_str())],
                attachments: Vec::new(),
            })
            .await?;
        Ok::<_, AppError>(chat)
    })?;
    drop(setup);

    let mut request = GenerationRequest::new(
        config.model.clone().unwrap_or_default(),
        vec![ChatMessage::text(Role::User, prompt)],
    );
    if let Some(system) = &config.system {
        request = request.system_prompt(system.clone());
    }

    let mut bridge = DeliveryBridge::spawn(coordinator, chat.id, request)?;
    if config.text {
        write_text(&mut bridge, out)?;
    } else {
        let frames = pump(&mut bridge, out)?;
        debug!(frames, "frames written");
    }
    let summary = bridge.finish()?;
    if let StreamOutcome::Failed { failure, .. } = &summary.outcome {
        return Err(AppError::Reply(failure.clone()));
    }
    Ok(summary)
}

/// Writes only the text deltas, followed by a newline once the reply ends.
fn write_text(bridge: &mut DeliveryBridge, out: &mut impl Write) -> std::io::Result<()> {
    let mut decoder = SseDecoder::default();
    for unit in bridge.by_ref() {
        for frame in decoder.push_chunk(unit.as_bytes()) {
            let Ok(payload) = frame.json() else {
                continue;
            };
            if payload["type"] == "text-delta"
                && let Some(content) = payload["content"].as_str()
            {
                out.write_all(content.as_bytes())?;
                out.flush()?;
            }
        }
    }
    writeln!(out)
}
