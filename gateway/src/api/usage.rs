//! The trivial `/api/usage` read-through route: reports the caller's current [`UsageRecord`].

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use gateway_types::wire::UnauthorizedBody;

use crate::GatewayState;

/// Builds the router for the `/api/usage` route.
pub(crate) fn routes() -> Router<GatewayState> {
    Router::new().route("/usage", get(usage))
}

async fn usage(State(state): State<GatewayState>, headers: HeaderMap) -> impl IntoResponse {
    let token = headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok());
    match state.auth.resolve(token) {
        Ok(user_id) => {
            let record = state.usage_store.get_usage(&user_id).await;
            Json(record).into_response()
        }
        Err(_) => (StatusCode::UNAUTHORIZED, Json(UnauthorizedBody::default())).into_response(),
    }
}
