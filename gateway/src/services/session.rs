//! The channel a session's owning task is reached through.
//!
//! The websocket itself (the actual `Sink`/`Stream`) is only ever touched by the
//! [`SessionHandler`](crate::api::transcribe) task that owns the upgraded connection — nothing
//! else may write to it directly. The [`SessionRegistry`](super::session_registry::SessionRegistry)
//! and the [`Dispatcher`](super::dispatcher) only ever hold a [`SessionSender`], a cheap `Clone`
//! handle that queues an [`OutboundEvent`] for that task to write out in order. If the owning
//! task has already exited, the channel is closed and sends are silently dropped — matching the
//! "drop the result silently" rule for a session that vanished mid-processing.

use gateway_types::{close::CloseReason, wire::TranscriptionReply};
use tokio::sync::mpsc;

/// One message destined for a session's outbound websocket stream.
pub(crate) enum OutboundEvent {
    /// A completed transcription reply.
    Reply(TranscriptionReply),
    /// The session must close with this reason; no further events will be sent after this one.
    Close(CloseReason),
}

/// A cheap, cloneable handle used to queue outbound events for a session's owning task.
#[derive(Clone)]
pub(crate) struct SessionSender(mpsc::UnboundedSender<OutboundEvent>);

/// The receiving half, held exclusively by the session's owning task.
pub(crate) type SessionReceiver = mpsc::UnboundedReceiver<OutboundEvent>;

impl SessionSender {
    /// Wraps the sending half of a fresh channel.
    pub(crate) fn new(sender: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self(sender)
    }

    /// Creates a fresh channel pair for a new session.
    pub(crate) fn channel() -> (Self, SessionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queues a transcription reply. Silently dropped if the session has already exited.
    pub(crate) fn send_reply(&self, reply: TranscriptionReply) {
        let _ = self.0.send(OutboundEvent::Reply(reply));
    }

    /// Queues a close. Silently dropped if the session has already exited (it is already
    /// closing, or closed, by some other path).
    pub(crate) fn send_close(&self, reason: CloseReason) {
        let _ = self.0.send(OutboundEvent::Close(reason));
    }
}
