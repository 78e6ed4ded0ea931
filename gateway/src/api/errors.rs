//! This module defines the [`GatewayError`] a session may encounter during its lifecycle, and
//! the conversion from each variant into the websocket close frame the peer should receive.

use axum::extract::ws::CloseFrame;
use gateway_types::close::{CloseReason, InternalErrorCode};

/// All errors that may terminate a session, or be reported from the HTTP usage route.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum GatewayError {
    /// Missing bearer header, non-`Bearer` scheme, or unknown token.
    #[error("unauthorized")]
    Unauthorized,
    /// An inbound frame arrived on a session that has not reached `Ready`.
    #[error("frame received before session is ready")]
    NotReady,
    /// An inbound binary frame was shorter than 4 bytes, or its payload was empty.
    #[error("invalid frame")]
    InvalidData,
    /// `remainingMs <= 0`, either at admission or after a completed transcription.
    #[error("usage budget exhausted")]
    ExceededAllocatedUsage,
    /// The per-packet transcription deadline was exceeded.
    #[error("transcription timed out")]
    Timeout,
    /// The in-flight task was cancelled for a reason other than shutdown or session close.
    #[error("aborted")]
    Aborted,
    /// A newer session for the same user replaced this one.
    #[error("connection replaced by a newer session")]
    ConnectionReplaced,
    /// The server is shutting down.
    #[error("server is shutting down")]
    ShuttingDown,
    /// The peer closed the connection, or the session vanished mid-processing. Never surfaced
    /// to the peer — there is no one left to send a close frame to.
    #[error("connection closed unexpectedly")]
    ConnectionClosedUnexpectedly,
    /// Any other server-side failure.
    #[error("server error: {0}")]
    ServerError(String),
}

impl GatewayError {
    /// Converts this error into the [`CloseReason`] sent over the wire.
    ///
    /// Returns `None` only for [`GatewayError::ConnectionClosedUnexpectedly`]: there is no peer
    /// left to send a close frame to, so the caller should simply tear the session down.
    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        let (code, message) = match self {
            GatewayError::Unauthorized => (InternalErrorCode::Unauthorized, self.to_string()),
            GatewayError::NotReady => (InternalErrorCode::NotReady, self.to_string()),
            GatewayError::InvalidData => (InternalErrorCode::InvalidData, self.to_string()),
            GatewayError::ExceededAllocatedUsage => {
                (InternalErrorCode::ExceededAllocatedUsage, self.to_string())
            }
            GatewayError::Timeout => (InternalErrorCode::Timeout, self.to_string()),
            GatewayError::Aborted => (InternalErrorCode::Aborted, self.to_string()),
            GatewayError::ConnectionReplaced => {
                (InternalErrorCode::ConnectionReplaced, self.to_string())
            }
            GatewayError::ShuttingDown => (InternalErrorCode::ShuttingDown, self.to_string()),
            GatewayError::ConnectionClosedUnexpectedly => return None,
            GatewayError::ServerError(message) => {
                (InternalErrorCode::ServerError, message.clone())
            }
        };
        Some(CloseReason::new(code, message))
    }

    /// Converts this error into the websocket [`CloseFrame`] to send, if any.
    pub(crate) fn into_close_frame(self) -> Option<CloseFrame> {
        let reason = self.close_reason()?;
        Some(CloseFrame {
            code: reason.close_code(),
            reason: reason.to_json().into(),
        })
    }
}

impl From<CloseReason> for GatewayError {
    /// Reconstructs the error that produced a [`CloseReason`] received from the dispatcher over
    /// a [`SessionSender`](crate::services::session::SessionSender) channel, so the session
    /// handler's read loop can fold dispatcher-originated closes into the same `Result` it
    /// already propagates for its own locally-detected errors.
    fn from(reason: CloseReason) -> Self {
        match reason.code {
            InternalErrorCode::ExceededAllocatedUsage => GatewayError::ExceededAllocatedUsage,
            InternalErrorCode::Timeout => GatewayError::Timeout,
            InternalErrorCode::Aborted => GatewayError::Aborted,
            InternalErrorCode::ConnectionReplaced => GatewayError::ConnectionReplaced,
            InternalErrorCode::Unauthorized => GatewayError::Unauthorized,
            InternalErrorCode::ShuttingDown => GatewayError::ShuttingDown,
            InternalErrorCode::NotReady => GatewayError::NotReady,
            InternalErrorCode::InvalidData => GatewayError::InvalidData,
            InternalErrorCode::ServerError => GatewayError::ServerError(reason.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_closed_unexpectedly_has_no_close_frame() {
        assert!(
            GatewayError::ConnectionClosedUnexpectedly
                .close_reason()
                .is_none()
        );
    }

    #[test]
    fn exceeded_allocated_usage_maps_to_policy_violation() {
        let reason = GatewayError::ExceededAllocatedUsage.close_reason().unwrap();
        assert_eq!(reason.close_code(), gateway_types::close::close_code::POLICY_VIOLATION);
        assert_eq!(reason.code, InternalErrorCode::ExceededAllocatedUsage);
    }

    #[test]
    fn timeout_maps_to_timeout_close_code() {
        let reason = GatewayError::Timeout.close_reason().unwrap();
        assert_eq!(reason.close_code(), gateway_types::close::close_code::TIMEOUT);
    }

    #[test]
    fn close_reason_round_trips_back_to_the_matching_error() {
        for original in [
            GatewayError::ExceededAllocatedUsage,
            GatewayError::Timeout,
            GatewayError::Aborted,
            GatewayError::ConnectionReplaced,
            GatewayError::Unauthorized,
            GatewayError::ShuttingDown,
            GatewayError::NotReady,
            GatewayError::InvalidData,
            GatewayError::ServerError("boom".to_owned()),
        ] {
            let reason = original.close_reason().unwrap();
            assert_eq!(GatewayError::from(reason), original);
        }
    }

    #[test]
    fn server_error_carries_original_message() {
        let reason = GatewayError::ServerError("boom".to_owned())
            .close_reason()
            .unwrap();
        assert_eq!(reason.error, "boom");
        assert_eq!(reason.code, InternalErrorCode::ServerError);
    }
}
