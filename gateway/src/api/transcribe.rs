//! The `/transcribe` websocket upgrade handler and the session state machine it drives.
//!
//! An outer Axum handler performs the upgrade and turns whatever the inner function returns into
//! a close frame, while [`run_session`] owns the actual state machine (`Unauthenticated` ->
//! `Admitting` -> `Ready` -> `Closing`).

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{self, CloseFrame, Message, WebSocket},
    },
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::any,
};
use gateway_types::wire::ReadyEvent;
use serde::Serialize;
use tracing::instrument;

use crate::{
    GatewayState,
    api::errors::GatewayError,
    services::{
        per_user_queue::WorkItem,
        session::{OutboundEvent, SessionReceiver, SessionSender},
        session_registry::SessionHandle,
    },
};

/// Monotonic counter handing out a fresh generation to every newly registered session, so a
/// late-closing predecessor can never be mistaken for its successor in a compare-and-remove.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(0);

/// Builds the router for the `/transcribe` upgrade route.
pub(crate) fn routes() -> Router<GatewayState> {
    Router::new().route("/transcribe", any(upgrade))
}

#[instrument(level = "debug", skip_all, fields(user = tracing::field::Empty))]
async fn upgrade(ws: WebSocketUpgrade, State(state): State<GatewayState>, headers: HeaderMap) -> impl IntoResponse {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    ws.on_failed_upgrade(|err| {
        tracing::warn!("could not establish websocket connection: {err:?}");
    })
    .on_upgrade(move |mut socket| async move {
        let close_frame = match run_session(&mut socket, &state, token.as_deref()).await {
            Ok(()) => Some(CloseFrame {
                code: ws::close_code::NORMAL,
                reason: "closed".into(),
            }),
            Err(err) => err.into_close_frame(),
        };
        if let Some(close_frame) = close_frame {
            tracing::trace!("sending close frame: {close_frame:?}");
            let _ = socket.send(Message::Close(Some(close_frame))).await;
        }
    })
}

/// Runs one connection's whole lifecycle: authenticate, register, admit, then relay frames
/// until the session closes for any reason. Registry and dispatcher bookkeeping is always
/// unwound on the way out, regardless of which branch produced the result.
async fn run_session(socket: &mut WebSocket, state: &GatewayState, token: Option<&str>) -> Result<(), GatewayError> {
    let user_id = state.auth.resolve(token)?;
    tracing::Span::current().record("user", tracing::field::display(&user_id));

    let (sender, receiver) = SessionSender::channel();
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    if let Some(evicted) = state.session_registry.register(SessionHandle {
        user_id: user_id.clone(),
        generation,
        sender,
    }) {
        metrics::counter!(crate::metrics::METRICS_ID_SESSIONS_EVICTED).increment(1);
        evicted.sender.send_close(
            GatewayError::ConnectionReplaced
                .close_reason()
                .expect("ConnectionReplaced always carries a close reason"),
        );
    }

    let result = run_admitted_session(socket, state, &user_id, receiver).await;

    state.session_registry.unregister(&user_id, generation);
    state.dispatcher.close_user(&user_id);
    result
}

/// Admits the session against the usage budget, then relays frames until closed.
///
/// Admission races against the socket itself: a frame arriving before the usage store responds
/// is rejected with [`GatewayError::NotReady`], since the session has not reached `Ready` yet.
async fn run_admitted_session(
    socket: &mut WebSocket,
    state: &GatewayState,
    user_id: &gateway_types::UserId,
    mut receiver: SessionReceiver,
) -> Result<(), GatewayError> {
    let usage = {
        let admission = state.usage_store.seed_if_absent(user_id);
        tokio::pin!(admission);
        loop {
            tokio::select! {
                usage = &mut admission => break usage,
                inbound = socket.recv() => match inbound {
                    None => return Err(GatewayError::ConnectionClosedUnexpectedly),
                    Some(Err(_)) => return Err(GatewayError::ConnectionClosedUnexpectedly),
                    Some(Ok(Message::Close(_))) => return Err(GatewayError::ConnectionClosedUnexpectedly),
                    Some(Ok(_)) => return Err(GatewayError::NotReady),
                },
            }
        }
    };
    if usage.remaining_ms == 0 {
        return Err(GatewayError::ExceededAllocatedUsage);
    }

    state.dispatcher.register_user(user_id.clone());
    send_json(socket, &ReadyEvent::default()).await?;

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                None => return Err(GatewayError::ConnectionClosedUnexpectedly),
                Some(Err(_)) => return Err(GatewayError::ConnectionClosedUnexpectedly),
                Some(Ok(Message::Close(_))) => return Err(GatewayError::ConnectionClosedUnexpectedly),
                Some(Ok(Message::Binary(payload))) => {
                    let item = decode_frame(&payload)?;
                    state.dispatcher.enqueue(user_id, item);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Text(_))) => return Err(GatewayError::InvalidData),
            },
            outbound = receiver.recv() => match outbound {
                Some(OutboundEvent::Reply(reply)) => send_json(socket, &reply).await?,
                Some(OutboundEvent::Close(reason)) => return Err(GatewayError::from(reason)),
                None => return Err(GatewayError::ConnectionClosedUnexpectedly),
            },
            _ = state.shutdown.cancelled() => return Err(GatewayError::ShuttingDown),
        }
    }
}

/// Decodes an inbound binary frame: `[u32 big-endian sequenceId][payload bytes]`.
///
/// A frame shorter than 4 bytes, or one whose payload is empty once the prefix is stripped, is
/// rejected as [`GatewayError::InvalidData`].
fn decode_frame(payload: &[u8]) -> Result<WorkItem, GatewayError> {
    if payload.len() < 4 {
        return Err(GatewayError::InvalidData);
    }
    let (sequence_bytes, body) = payload.split_at(4);
    if body.is_empty() {
        return Err(GatewayError::InvalidData);
    }
    let sequence_id = u32::from_be_bytes(
        sequence_bytes
            .try_into()
            .expect("split_at(4) always yields a 4-byte slice"),
    );
    Ok(WorkItem {
        sequence_id,
        payload: body.to_vec(),
        enqueued_at: Instant::now(),
    })
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), GatewayError> {
    let body = serde_json::to_string(value).expect("outbound gateway messages always serialize");
    socket
        .send(Message::Text(body.into()))
        .await
        .map_err(|err| GatewayError::ServerError(err.to_string()))
}
