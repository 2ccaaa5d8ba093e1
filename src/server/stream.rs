//! Packages a finished pipeline result into wire responses.
//!
//! The streaming contract is satisfied structurally: one SSE data frame
//! carrying the whole answer inside a chat-completion delta envelope,
//! followed by the `[DONE]` sentinel. There is no incremental delta
//! emission. Non-streaming callers get the same content as a single-shot
//! chat-completion body.

use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::stream;
use std::convert::Infallible;
use uuid::Uuid;

use crate::agent::PipelineResult;
use crate::models::api::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatDelta, ChunkChoice,
    OutboundMessage,
};
use crate::server::error::ServerError;

pub fn new_response_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..29])
}

/// The `data:` payloads of the SSE stream, in emission order.
pub fn sse_frames(
    result: &PipelineResult,
    model: &str,
    response_id: &str,
    created: i64,
) -> Result<Vec<String>, serde_json::Error> {
    let chunk = ChatCompletionChunk {
        id: response_id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChatDelta {
                role: "assistant".to_string(),
                content: result.answer_text.clone(),
            },
        }],
    };

    Ok(vec![serde_json::to_string(&chunk)?, "[DONE]".to_string()])
}

pub fn sse_response(
    result: &PipelineResult,
    model: &str,
    response_id: &str,
    created: i64,
) -> Result<Response, ServerError> {
    let frames = sse_frames(result, model, response_id, created)
        .map_err(|e| ServerError::Internal(format!("chunk serialization failed: {}", e)))?;

    let events: Vec<Result<Event, Infallible>> = frames
        .into_iter()
        .map(|frame| Ok(Event::default().data(frame)))
        .collect();

    Ok(Sse::new(stream::iter(events)).into_response())
}

pub fn single_shot_response(
    result: &PipelineResult,
    model: &str,
    response_id: &str,
    created: i64,
) -> Response {
    Json(ChatCompletionResponse {
        id: response_id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: OutboundMessage {
                role: "assistant".to_string(),
                content: result.answer_text.clone(),
            },
            finish_reason: "stop".to_string(),
        }],
    })
    .into_response()
}
