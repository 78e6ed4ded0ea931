//! Textual JSON messages exchanged over the `/transcribe` websocket once a session is `Ready`,
//! and the response body of the `/api/usage` route.
//!
//! Inbound binary frames (the client's audio packets) are not modeled here — they are a raw
//! `[u32 big-endian sequence id][payload bytes]` layout decoded directly from the websocket
//! binary frame, with no JSON involved. See the gateway crate's frame codec.

use serde::{Deserialize, Serialize};

/// Sent once, immediately after a session is admitted and transitions to `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Always `"ready"`; present so the message shape matches other server-sent events.
    pub event: ReadyEventTag,
}

/// The fixed `"ready"` tag of a [`ReadyEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyEventTag {
    /// Serializes as the string `"ready"`.
    #[serde(rename = "ready")]
    Ready,
}

impl Default for ReadyEvent {
    fn default() -> Self {
        Self {
            event: ReadyEventTag::Ready,
        }
    }
}

/// One transcription reply, sent in response to an inbound binary frame.
///
/// `id` echoes the request's `sequenceId`, letting a pipelining client reconcile replies even
/// though no cross-packet ordering is guaranteed beyond per-user FIFO.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionReply {
    /// Echoes the inbound frame's sequence id.
    pub id: u32,
    /// The transcribed text.
    pub transcript: String,
    /// The transcriber's confidence in `[0, 1]`.
    pub confidence: f64,
    /// Milliseconds of budget this transcription consumed.
    #[serde(rename = "usageUsedMs")]
    pub usage_used_ms: u64,
    /// Milliseconds of budget remaining after this transcription.
    #[serde(rename = "usageRemainingMs")]
    pub usage_remaining_ms: u64,
}

/// Body of a `401 Unauthorized` HTTP response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnauthorizedBody {
    /// Always `"Unauthorized"`.
    pub error: String,
}

impl Default for UnauthorizedBody {
    fn default() -> Self {
        Self {
            error: "Unauthorized".to_owned(),
        }
    }
}

/// Body of a `500 Internal Server Error` HTTP response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerErrorBody {
    /// The wrapped error message.
    pub error: ServerErrorMessage,
}

/// The inner `message` field of a [`ServerErrorBody`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerErrorMessage {
    /// A short, human-readable description of the failure.
    pub message: String,
}

impl ServerErrorBody {
    /// Wraps a message as a `ServerErrorBody`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: ServerErrorMessage {
                message: message.into(),
            },
        }
    }
}
