//! Streaming chat handler
//!
//! Relay events are forwarded to the browser as SSE `data:` frames. The
//! assistant reply is persisted when the relay completes, before the `done`
//! frame is sent, so a client that sees `done` can reload the conversation.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::auth::CurrentUser;
use crate::services::{run_blocking, RelayEvent};
use crate::types::{StreamChatRequest, StreamFrame};
use crate::AppState;

pub const GENERATION_FAILED: &str = "Failed to generate response";

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Send a message and stream the assistant reply
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    payload: Result<Json<StreamChatRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload?;
    let conversation_id = request.conversation_id;
    let events = state.chat_service.begin_stream(user.id, request).await?;

    let stream_id = Uuid::new_v4();
    tracing::info!(%stream_id, user_id = user.id, conversation_id, "Chat stream started");

    let frames = events.then(move |event| {
        let chat_service = state.chat_service.clone();
        async move {
            let frame = match event {
                RelayEvent::Delta(text) => StreamFrame::Chunk(text),
                RelayEvent::Done(text) => {
                    let saved = run_blocking(move || {
                        chat_service.complete_stream(conversation_id, &text)
                    })
                    .await;
                    match saved {
                        Ok(saved) => {
                            tracing::info!(
                                %stream_id,
                                message_id = saved.id,
                                chars = saved.content.chars().count(),
                                "Chat stream completed"
                            );
                            StreamFrame::Done(saved.content)
                        }
                        Err(e) => {
                            tracing::error!(%stream_id, error = %e, "Failed to save assistant reply");
                            StreamFrame::Error(GENERATION_FAILED.to_string())
                        }
                    }
                }
                RelayEvent::Error(e) => {
                    tracing::error!(%stream_id, error = %e, "Chat stream failed");
                    StreamFrame::Error(GENERATION_FAILED.to_string())
                }
            };

            Ok::<_, Infallible>(frame_event(&frame))
        }
    });

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(frames).keep_alive(KeepAlive::default()),
    ))
}

fn frame_event(frame: &StreamFrame) -> Event {
    Event::default().json_data(frame).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode stream frame");
        Event::default().comment("unencodable frame")
    })
}
