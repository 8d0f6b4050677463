//! Relay for chat-completion event streams
//!
//! Upstream providers answer streaming requests with `data: `-prefixed lines,
//! one JSON object per line, terminated by `data: [DONE]`. Network chunks
//! split those lines at arbitrary points, so [`SseDecoder`] keeps the
//! unterminated tail between fragments and only parses complete lines.
//!
//! [`relay`] wraps a decoder around an upstream byte stream and yields
//! [`RelayEvent`]s: any number of deltas followed by exactly one terminal
//! `Done` or `Error`.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::services::chat_completion::ChatError;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Event produced by the relay
#[derive(Debug)]
pub enum RelayEvent {
    /// Incremental text, forwarded as soon as it is parsed
    Delta(String),
    /// Stream finished; carries every delta concatenated in arrival order
    Done(String),
    /// Stream failed; no further events follow
    Error(ChatError),
}

pub type RelayStream = BoxStream<'static, RelayEvent>;

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental line decoder for one upstream response
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    accumulated: String,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text emitted so far
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Whether the `[DONE]` sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume one fragment and return the events it completes, in order.
    pub fn feed(&mut self, fragment: &[u8]) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.extend_from_slice(fragment);

        // '\n' is ASCII, so splitting on it never cuts a UTF-8 sequence.
        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return events;
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        for raw in complete.split(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(raw);
            let line = line.trim();
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };

            if payload == DONE_SENTINEL {
                self.finished = true;
                self.buffer.clear();
                events.push(RelayEvent::Done(self.accumulated.clone()));
                return events;
            }

            if let Some(delta) = Self::extract_delta(payload) {
                self.accumulated.push_str(&delta);
                events.push(RelayEvent::Delta(delta));
            }
        }

        events
    }

    /// Terminal event for a transport that closed without `[DONE]`.
    pub fn finish(&mut self) -> RelayEvent {
        self.finished = true;
        self.buffer.clear();
        RelayEvent::Done(std::mem::take(&mut self.accumulated))
    }

    fn extract_delta(payload: &str) -> Option<String> {
        // Heartbeats and malformed lines are expected; they are simply dropped.
        let chunk: CompletionChunk = serde_json::from_str(payload).ok()?;
        chunk
            .choices
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|c| !c.is_empty())
    }
}

struct RelayState<S> {
    upstream: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<RelayEvent>,
    terminated: bool,
}

/// Turn an upstream byte stream into a relay event stream.
///
/// The upstream is polled only when the previous fragment's events have been
/// consumed. Dropping the returned stream drops the upstream with it.
pub fn relay<S, B, E>(upstream: S) -> RelayStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = RelayState {
        upstream: Box::pin(upstream),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        terminated: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.terminated {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(fragment)) => {
                    state.pending.extend(state.decoder.feed(fragment.as_ref()));
                    if state.decoder.is_finished() {
                        state.terminated = true;
                    }
                }
                Some(Err(e)) => {
                    state.terminated = true;
                    state
                        .pending
                        .push_back(RelayEvent::Error(ChatError::Transport(e.to_string())));
                }
                None => {
                    state.terminated = true;
                    state.pending.push_back(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

/// A relay stream that fails immediately
pub fn failed(error: ChatError) -> RelayStream {
    stream::once(async move { RelayEvent::Error(error) }).boxed()
}
