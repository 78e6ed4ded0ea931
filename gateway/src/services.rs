//! The gateway's pluggable collaborators: authentication, session bookkeeping, per-user queuing,
//! scheduling, usage accounting, and transcription, each behind a small, independently testable
//! type.

pub(crate) mod auth;
pub(crate) mod dispatcher;
pub(crate) mod per_user_queue;
pub(crate) mod session;
pub(crate) mod session_registry;
pub(crate) mod transcriber;
pub(crate) mod usage_store;
