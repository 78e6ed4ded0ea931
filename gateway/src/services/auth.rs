//! Maps a bearer token to a [`UserId`] against a static, in-process table.
//!
//! No network I/O and no timing-safety requirement: this is a lookup table, not a
//! credential verifier. Built once from [`GatewayConfig`](crate::config::GatewayConfig) and held
//! read-only for the life of the process, so a plain `HashMap` behind a `Clone`-able `Arc`
//! suffices — no interior mutability needed.

use std::{collections::HashMap, sync::Arc};

use gateway_types::UserId;

use crate::api::errors::GatewayError;

/// Resolves `Authorization` header values to a [`UserId`].
#[derive(Clone)]
pub(crate) struct AuthResolver {
    tokens: Arc<HashMap<String, UserId>>,
}

impl AuthResolver {
    /// Builds a resolver from a static token → user table.
    pub(crate) fn new(tokens: HashMap<String, UserId>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    /// Resolves the raw `Authorization` header value.
    ///
    /// Only `Bearer <token>` is accepted. A missing header, a non-`Bearer` scheme, or a token
    /// not present in the table is [`GatewayError::Unauthorized`]. An empty token after
    /// `Bearer ` is looked up like any other string — it is simply never going to match a
    /// configured token, not treated as a distinct "no credentials" case.
    pub(crate) fn resolve(&self, header: Option<&str>) -> Result<UserId, GatewayError> {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(GatewayError::Unauthorized)?;
        self.tokens
            .get(token)
            .cloned()
            .ok_or(GatewayError::Unauthorized)
    }
}
