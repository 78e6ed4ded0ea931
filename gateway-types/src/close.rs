//! The close-code and structured-reason encoding shared by every failure path in the gateway.
//!
//! A `CloseReason` is never constructed directly by callers outside this crate's
//! [`InternalErrorCode`] -> websocket close-code mapping; it is the payload carried in the
//! websocket close frame's reason string, always serialized as compact JSON.

use serde::{Deserialize, Serialize};

/// The well-known websocket close codes the gateway sends.
///
/// These mirror the codes in [RFC 6455 §7.4](https://www.rfc-editor.org/rfc/rfc6455#section-7.4)
/// plus the unregistered `3008` the gateway uses for per-packet timeouts.
pub mod close_code {
    /// Client-initiated close; never sent by the gateway itself.
    pub const NORMAL: u16 = 1000;
    /// Server shutdown or an aborted task.
    pub const GOING_AWAY: u16 = 1001;
    /// Malformed inbound frame.
    pub const INVALID_DATA: u16 = 1007;
    /// Auth failure, budget exhaustion, session replacement, or a frame before `ready`.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Any other server-side failure.
    pub const UNEXPECTED_ERROR: u16 = 1011;
    /// Per-packet transcription deadline exceeded. Not part of RFC 6455; a private-use code.
    pub const TIMEOUT: u16 = 3008;
}

/// The numeric code embedded in a [`CloseReason`]'s JSON payload.
///
/// Distinct from the websocket close code itself: several `InternalErrorCode`s share the same
/// websocket close code (e.g. `Unauthorized` and `ExceededAllocatedUsage` both close with
/// `POLICY_VIOLATION`) but are still distinguishable by clients via this field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum InternalErrorCode {
    /// The user has no remaining transcription budget.
    ExceededAllocatedUsage = 0,
    /// The per-packet transcription deadline was exceeded.
    Timeout = 1,
    /// The in-flight task was cancelled for a reason other than shutdown or session close.
    Aborted = 2,
    /// A newer session for the same user replaced this one.
    ConnectionReplaced = 3,
    /// The bearer token was missing or unknown.
    Unauthorized = 4,
    /// The server is shutting down.
    ShuttingDown = 5,
    /// A frame arrived before the session reached `Ready`.
    NotReady = 6,
    /// An inbound frame was malformed.
    InvalidData = 7,
    /// Any other server-side error.
    ServerError = 99,
}

impl From<InternalErrorCode> for u8 {
    fn from(code: InternalErrorCode) -> Self {
        code as u8
    }
}

/// The wire value did not match any known [`InternalErrorCode`].
#[derive(Debug, thiserror::Error)]
#[error("unknown internal error code: {0}")]
pub struct UnknownErrorCode(u8);

impl TryFrom<u8> for InternalErrorCode {
    type Error = UnknownErrorCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ExceededAllocatedUsage),
            1 => Ok(Self::Timeout),
            2 => Ok(Self::Aborted),
            3 => Ok(Self::ConnectionReplaced),
            4 => Ok(Self::Unauthorized),
            5 => Ok(Self::ShuttingDown),
            6 => Ok(Self::NotReady),
            7 => Ok(Self::InvalidData),
            99 => Ok(Self::ServerError),
            other => Err(UnknownErrorCode(other)),
        }
    }
}

impl InternalErrorCode {
    /// The websocket close code this internal code is sent under.
    pub fn close_code(self) -> u16 {
        match self {
            InternalErrorCode::ExceededAllocatedUsage
            | InternalErrorCode::Unauthorized
            | InternalErrorCode::ConnectionReplaced
            | InternalErrorCode::NotReady => close_code::POLICY_VIOLATION,
            InternalErrorCode::Timeout => close_code::TIMEOUT,
            InternalErrorCode::Aborted | InternalErrorCode::ShuttingDown => {
                close_code::GOING_AWAY
            }
            InternalErrorCode::InvalidData => close_code::INVALID_DATA,
            InternalErrorCode::ServerError => close_code::UNEXPECTED_ERROR,
        }
    }
}

/// The structured reason carried in a websocket close frame's reason payload.
///
/// Serializes as a compact textual object: `{"error":"<message>","code":<code>}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    /// A short, human-readable description of why the session closed.
    pub error: String,
    /// The machine-readable [`InternalErrorCode`].
    pub code: InternalErrorCode,
}

impl CloseReason {
    /// Builds a `CloseReason` from an [`InternalErrorCode`] and a human-readable message.
    pub fn new(code: InternalErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }

    /// The websocket close code this reason should be sent under.
    pub fn close_code(&self) -> u16 {
        self.code.close_code()
    }

    /// Serializes this reason as compact JSON, for embedding in a close frame's reason string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("CloseReason always serializes")
    }
}
