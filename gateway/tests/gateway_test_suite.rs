//! End-to-end session lifecycle scenarios, driven against a real `axum_test::TestServer` over
//! an actual websocket connection.
//!
//! Constants throughout: `BYTES_PER_WORD=16000`, `MS_PER_WORD=250`, initial budget `1000ms` (4
//! words).


use axum::{
    extract::ws::{CloseFrame, Message},
    http::StatusCode,
};
use gateway_types::{
    UsageRecord,
    close::{InternalErrorCode, close_code},
    wire::{ReadyEvent, TranscriptionReply},
};
use setup::{TestGateway, cost_for_len, encode_frame};

fn expect_close(message: Message) -> CloseFrame {
    match message {
        Message::Close(Some(frame)) => frame,
        other => panic!("expected a close frame, got {other:?}"),
    }
}

fn close_reason(frame: &CloseFrame) -> gateway_types::close::CloseReason {
    serde_json::from_str(frame.reason.as_str()).expect("close reason is valid JSON")
}

#[tokio::test]
async fn happy_single_packet() {
    let gateway = TestGateway::start(&[("a", "user-a")], 1000).await;

    let mut ws = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer a")
        .await
        .into_websocket()
        .await;

    let ready: ReadyEvent = ws.receive_json().await;
    assert_eq!(ready, ReadyEvent::default());

    ws.send_message(Message::Binary(encode_frame(1, 16_000).into()))
        .await;

    let reply: TranscriptionReply = ws.receive_json().await;
    assert_eq!(reply.id, 1);
    assert_eq!(reply.usage_used_ms, 250);
    assert_eq!(reply.usage_remaining_ms, 750);

    let usage: UsageRecord = gateway
        .server
        .get("/api/usage")
        .add_header("authorization", "Bearer a")
        .await
        .json();
    assert_eq!(usage.remaining_ms, 750);
    assert_eq!(usage.total_used_ms, 250);
}

#[tokio::test]
async fn budget_exhaustion_mid_session() {
    let gateway = TestGateway::start(&[("a", "user-a")], 1000).await;

    let mut ws = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer a")
        .await
        .into_websocket()
        .await;

    let _ready: ReadyEvent = ws.receive_json().await;

    let expected_remaining = [750u64, 500, 250, 0];
    for (i, expected) in expected_remaining.iter().enumerate() {
        let seq = i as u32 + 1;
        ws.send_message(Message::Binary(encode_frame(seq, 16_000).into()))
            .await;
        let reply: TranscriptionReply = ws.receive_json().await;
        assert_eq!(reply.id, seq);
        assert_eq!(reply.usage_used_ms, cost_for_len(16_000));
        assert_eq!(reply.usage_remaining_ms, *expected);
    }

    let frame = expect_close(ws.receive_message().await);
    assert_eq!(frame.code, close_code::POLICY_VIOLATION);
    assert_eq!(close_reason(&frame).code, InternalErrorCode::ExceededAllocatedUsage);
}

#[tokio::test]
async fn admission_rejection_after_exhaustion() {
    let gateway = TestGateway::start(&[("a", "user-a")], 1000).await;

    {
        let mut ws = gateway
            .server
            .get_websocket("/transcribe")
            .add_header("authorization", "Bearer a")
            .await
            .into_websocket()
            .await;
        let _ready: ReadyEvent = ws.receive_json().await;
        for seq in 1..=4u32 {
            ws.send_message(Message::Binary(encode_frame(seq, 16_000).into()))
                .await;
            let _reply: TranscriptionReply = ws.receive_json().await;
        }
        let _close = ws.receive_message().await;
    }

    let mut ws = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer a")
        .await
        .into_websocket()
        .await;

    // No `ready` event should ever arrive: admission rejects before the session becomes Ready.
    let frame = expect_close(ws.receive_message().await);
    assert_eq!(frame.code, close_code::POLICY_VIOLATION);
    assert_eq!(close_reason(&frame).code, InternalErrorCode::ExceededAllocatedUsage);
}

#[tokio::test]
async fn session_eviction_by_newer_connection() {
    let gateway = TestGateway::start(&[("a", "user-a"), ("b", "user-b")], 1000).await;

    let mut session_a = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer a")
        .await
        .into_websocket()
        .await;
    let _ready_a: ReadyEvent = session_a.receive_json().await;

    let mut session_c = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer b")
        .await
        .into_websocket()
        .await;
    let _ready_c: ReadyEvent = session_c.receive_json().await;

    let mut session_b = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer a")
        .await
        .into_websocket()
        .await;
    let _ready_b: ReadyEvent = session_b.receive_json().await;

    let frame = expect_close(session_a.receive_message().await);
    assert_eq!(frame.code, close_code::POLICY_VIOLATION);
    assert_eq!(close_reason(&frame).code, InternalErrorCode::ConnectionReplaced);

    session_b
        .send_message(Message::Binary(encode_frame(1, 16_000).into()))
        .await;
    let reply: TranscriptionReply = session_b.receive_json().await;
    assert_eq!(reply.id, 1);
    assert_eq!(reply.usage_remaining_ms, 750);

    session_c
        .send_message(Message::Binary(encode_frame(9, 16_000).into()))
        .await;
    let reply_c: TranscriptionReply = session_c.receive_json().await;
    assert_eq!(reply_c.id, 9);
    assert_eq!(reply_c.usage_remaining_ms, 750);
}

#[tokio::test]
async fn unauthorized_upgrade_without_header() {
    let gateway = TestGateway::start(&[("a", "user-a")], 1000).await;

    let mut ws = gateway.server.get_websocket("/transcribe").await.into_websocket().await;

    let frame = expect_close(ws.receive_message().await);
    assert_eq!(frame.code, close_code::POLICY_VIOLATION);
    assert_eq!(close_reason(&frame).code, InternalErrorCode::Unauthorized);
}

#[tokio::test]
async fn usage_route_rejects_unknown_token() {
    let gateway = TestGateway::start(&[("a", "user-a")], 1000).await;

    let response = gateway
        .server
        .get("/api/usage")
        .add_header("authorization", "Bearer nope")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_frame_after_ready_closes_with_invalid_data() {
    let gateway = TestGateway::start(&[("a", "user-a")], 1000).await;

    let mut ws = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer a")
        .await
        .into_websocket()
        .await;
    let _ready: ReadyEvent = ws.receive_json().await;

    // Total length 4: a zero-length payload once the sequence-id prefix is stripped.
    ws.send_message(Message::Binary(vec![0, 0, 0, 1].into())).await;

    let frame = expect_close(ws.receive_message().await);
    assert_eq!(frame.code, close_code::INVALID_DATA);
    assert_eq!(close_reason(&frame).code, InternalErrorCode::InvalidData);
}

#[tokio::test]
async fn exact_budget_boundary_succeeds_then_closes() {
    // initial budget exactly one word: the packet that spends it all succeeds, and only the
    // subsequent close carries ExceededAllocatedUsage.
    let gateway = TestGateway::start(&[("a", "user-a")], 250).await;

    let mut ws = gateway
        .server
        .get_websocket("/transcribe")
        .add_header("authorization", "Bearer a")
        .await
        .into_websocket()
        .await;
    let _ready: ReadyEvent = ws.receive_json().await;

    ws.send_message(Message::Binary(encode_frame(1, 16_000).into()))
        .await;
    let reply: TranscriptionReply = ws.receive_json().await;
    assert_eq!(reply.usage_used_ms, 250);
    assert_eq!(reply.usage_remaining_ms, 0);

    let frame = expect_close(ws.receive_message().await);
    assert_eq!(close_reason(&frame).code, InternalErrorCode::ExceededAllocatedUsage);
}
