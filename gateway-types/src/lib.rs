#![deny(missing_docs)]
//! Core type definitions shared between the transcription gateway and its clients.
//!
//! This crate groups together the strongly-typed values and message
//! structures used across the gateway:
//!
//! * [`UserId`], the opaque identity the gateway's core keeps around but never parses.
//! * [`UsageRecord`], the usage ledger an [`UsageStore`](crate::usage::UsageRecord) persists.
//! * Wire types exchanged over the `/transcribe` websocket and the `/api/usage` route (see
//!   [`wire`] module).
//! * The close-code and structured-reason encoding shared by all failure paths (see
//!   [`close`] module).

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod close;
pub mod wire;

/// Opaque user identity.
///
/// Equality only; the gateway's core never parses or inspects the inner value. Constructed by
/// an `AuthResolver` from a bearer token and carried through sessions, queues, and the usage
/// store as a map key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw identifier as a `UserId`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the wrapped identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's transcription usage ledger.
///
/// Invariants: `remaining_ms` is clamped at zero on every update; `total_used_ms` is
/// monotonically non-decreasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Milliseconds of transcription the user may still consume.
    #[serde(rename = "remainingMs")]
    pub remaining_ms: u64,
    /// Total milliseconds of transcription the user has consumed so far.
    #[serde(rename = "totalUsedMs")]
    pub total_used_ms: u64,
}

impl UsageRecord {
    /// A fresh ledger with `limit` milliseconds of budget and nothing used yet.
    pub fn with_limit(limit: u64) -> Self {
        Self {
            remaining_ms: limit,
            total_used_ms: 0,
        }
    }

    /// Applies a completed transcription's cost to this ledger.
    ///
    /// `total_used_ms` accumulates the full cost even past exhaustion; `remaining_ms` is
    /// clamped at zero rather than allowed to go negative.
    pub fn apply_usage(&mut self, used_ms: u64) {
        self.total_used_ms = self.total_used_ms.saturating_add(used_ms);
        self.remaining_ms = self.remaining_ms.saturating_sub(used_ms);
    }
}

impl Default for UsageRecord {
    fn default() -> Self {
        Self {
            remaining_ms: 0,
            total_used_ms: 0,
        }
    }
}
