#![deny(missing_docs)]
//! This crate provides the core functionality of the token-authenticated streaming transcription
//! gateway.
//!
//! Clients open a persistent bidirectional websocket at `/transcribe`, push binary audio packets,
//! and receive per-packet transcription replies while the server meters usage against a per-user
//! budget. The main entry point is [`GatewayBuilder`], which wires together the gateway's
//! collaborators ([`services::auth::AuthResolver`], [`services::session_registry::SessionRegistry`],
//! [`services::dispatcher::Dispatcher`], and a pluggable
//! [`services::usage_store::UsageStore`]/[`services::transcriber::Transcriber`] pair) and returns
//! an `axum::Router` plus a `JoinHandle` for the dispatcher's scheduling loop.
//!
//! If the dispatcher encounters an unrecoverable error, the provided `CancellationToken` is
//! cancelled, allowing the hosting binary to shut down gracefully. The token can also be
//! cancelled externally (e.g. on `SIGINT`/`SIGTERM`) to stop the gateway from the outside. To
//! ensure a clean shutdown, the hosting binary should await the `JoinHandle` returned by
//! [`GatewayBuilder::build`] after cancelling the token.

use std::{sync::Arc, time::Duration};

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub(crate) mod api;
pub mod config;
pub mod metrics;
pub(crate) mod services;

use config::GatewayConfig;
use services::{
    auth::AuthResolver,
    dispatcher::Dispatcher,
    session_registry::SessionRegistry,
    transcriber::{ReferenceTranscriber, TranscriberService},
    usage_store::{InMemoryUsageStore, UsageStoreService},
};

/// Shared state handed to every Axum route via `State<GatewayState>`.
#[derive(Clone)]
pub(crate) struct GatewayState {
    pub(crate) auth: AuthResolver,
    pub(crate) session_registry: SessionRegistry,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) usage_store: UsageStoreService,
    pub(crate) shutdown: CancellationToken,
}

/// Initializes and assembles the transcription gateway.
///
/// # Returns
///
/// [`GatewayBuilder::build`] returns a tuple containing:
/// - An Axum `Router` with the `/transcribe` and `/api/usage` routes mounted.
/// - A `JoinHandle` for the dispatcher's scheduling loop, which the hosting binary should await
///   after cancelling the `CancellationToken` passed to [`GatewayBuilder::init`].
pub struct GatewayBuilder {
    router: Router,
    dispatcher_task: tokio::task::JoinHandle<()>,
    usage_store: UsageStoreService,
}

impl GatewayBuilder {
    /// Builds the gateway's state and routes from `config`.
    ///
    /// Uses [`InMemoryUsageStore`] and [`ReferenceTranscriber`] as the concrete collaborators;
    /// both are swappable seams (`UsageStore`/`Transcriber`) for a deployment with a persistent
    /// usage backend or a real transcription engine, but this crate only ships the reference
    /// pair.
    pub fn init(config: GatewayConfig, shutdown: CancellationToken) -> Self {
        metrics::describe_metrics();

        let auth = AuthResolver::new(config.auth_tokens);
        let session_registry = SessionRegistry::default();
        let usage_store: UsageStoreService = Arc::new(InMemoryUsageStore::new(config.initial_budget_ms));
        let transcriber: TranscriberService = Arc::new(ReferenceTranscriber::new(
            config.bytes_per_word,
            config.ms_per_word,
        ));
        let dispatcher = Dispatcher::new(
            config.max_concurrent,
            config.per_task_timeout,
            usage_store.clone(),
            transcriber,
            session_registry.clone(),
            shutdown.clone(),
        );

        let dispatcher_task = tokio::spawn(dispatcher.clone().run());

        let state = GatewayState {
            auth,
            session_registry,
            dispatcher,
            usage_store: usage_store.clone(),
            shutdown,
        };

        let router = Router::new()
            .merge(api::transcribe::routes())
            .nest("/api", api::usage::routes())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        Self {
            router,
            dispatcher_task,
            usage_store,
        }
    }

    /// The usage store backing this gateway, exposed so a test harness can call
    /// `reset_storage` between scenarios without reaching into private state.
    pub fn usage_store(&self) -> UsageStoreService {
        self.usage_store.clone()
    }

    /// Consumes the builder, returning the assembled `Router` and the dispatcher's `JoinHandle`.
    pub fn build(self) -> (Router, tokio::task::JoinHandle<()>) {
        (self.router, self.dispatcher_task)
    }
}

/// The dispatcher's per-task hard deadline, matching [`GatewayConfig::per_task_timeout`]'s
/// default. Exposed for test harnesses that construct a [`GatewayConfig`] without going through
/// `clap` parsing.
pub const DEFAULT_PER_TASK_TIMEOUT: Duration = Duration::from_secs(60);
