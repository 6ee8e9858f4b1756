//! SSE 리소스 스트림 → 구독 레지스트리 → 디바운스 싱크 (mockito 패널).

use std::sync::Arc;
use std::time::Duration;

use hostpanel_core::models::resource::ProcessState;
use hostpanel_network::auth::ApiKey;
use hostpanel_network::sse_client::ResourceStreamClient;
use hostpanel_sync::debounce::DebouncedStateSink;
use hostpanel_sync::stream::{StreamEvent, StreamRegistry};
use tokio::sync::broadcast;

const STREAM: &str = "/api/client/servers/srv1/resources/stream";

fn sse_body(states: &[&str]) -> String {
    let mut body = String::from(": keep-alive\n\n");
    for (i, state) in states.iter().enumerate() {
        body.push_str(&format!(
            "data: {{\"attributes\":{{\"current_state\":\"{state}\",\"is_suspended\":false,\
             \"resources\":{{\"memory_bytes\":{},\"cpu_absolute\":1.5}}}}}}\n\n",
            (i + 1) * 1024
        ));
    }
    body
}

fn registry_for(server: &mockito::ServerGuard, reconnect: Duration) -> StreamRegistry {
    let source = Arc::new(ResourceStreamClient::new(
        &server.url(),
        ApiKey::new(Some("ptlc_test")),
    ));
    StreamRegistry::new(source, reconnect, 16)
}

async fn next_event(rx: &mut broadcast::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("스트림 이벤트 대기 시간 초과")
        .expect("스트림 채널 닫힘")
}

#[tokio::test]
async fn snapshots_flow_then_closed_stream_degrades() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", STREAM)
        .match_header("authorization", "Bearer ptlc_test")
        .match_header("accept", "text/event-stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["starting", "running"]))
        .create_async()
        .await;

    let registry = registry_for(&server, Duration::from_secs(60));
    let handle = registry.subscribe("srv1");
    let mut rx = handle.events();

    assert!(matches!(next_event(&mut rx).await, StreamEvent::Connected));
    let StreamEvent::Snapshot(first) = next_event(&mut rx).await else {
        panic!("첫 스냅샷이 아님");
    };
    assert_eq!(first.current_state, ProcessState::Starting);
    let StreamEvent::Snapshot(second) = next_event(&mut rx).await else {
        panic!("두 번째 스냅샷이 아님");
    };
    assert_eq!(second.current_state, ProcessState::Running);
    assert_eq!(second.resources.memory_bytes, 2048);

    let StreamEvent::Degraded { retry_in, .. } = next_event(&mut rx).await else {
        panic!("연결 종료 후 Degraded가 와야 함");
    };
    assert_eq!(retry_in, Duration::from_secs(60));
    assert!(registry.last_error("srv1").is_some());
    mock.assert_async().await;

    handle.close();
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn malformed_message_keeps_connection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", STREAM)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(format!("data: not-json\n\n{}", sse_body(&["running"])))
        .create_async()
        .await;

    let registry = registry_for(&server, Duration::from_secs(60));
    let handle = registry.subscribe("srv1");
    let mut rx = handle.events();

    assert!(matches!(next_event(&mut rx).await, StreamEvent::Connected));
    assert!(matches!(next_event(&mut rx).await, StreamEvent::ParseError(_)));
    // 같은 연결에서 다음 메시지가 정상 처리된다
    assert!(matches!(next_event(&mut rx).await, StreamEvent::Snapshot(_)));
}

#[tokio::test]
async fn rejected_stream_reconnects_after_delay() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", STREAM)
        .with_status(500)
        .expect_at_least(2)
        .create_async()
        .await;

    let registry = registry_for(&server, Duration::from_millis(50));
    let handle = registry.subscribe("srv1");
    let mut rx = handle.events();

    for _ in 0..2 {
        assert!(matches!(
            next_event(&mut rx).await,
            StreamEvent::Degraded { .. }
        ));
    }
    mock.assert_async().await;
    drop(handle);
    assert!(!registry.is_active("srv1"));
}

#[tokio::test]
async fn shared_subscription_feeds_debounced_sink() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", STREAM)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["starting", "starting", "running"]))
        .expect(1)
        .create_async()
        .await;

    let registry = registry_for(&server, Duration::from_secs(60));
    let first = registry.subscribe("srv1");
    let second = registry.subscribe("srv1");
    assert_eq!(registry.subscriber_count("srv1"), 2);

    let sink = DebouncedStateSink::new(Duration::from_millis(100));
    let (tx, mut rendered) = tokio::sync::mpsc::unbounded_channel();
    sink.on_render(move |state: &ProcessState| {
        let _ = tx.send(*state);
    });
    let pusher = sink.pusher();
    first.on_snapshot(move |snapshot| pusher.push(snapshot.current_state));

    // 한 창 안에 들어온 세 스냅샷 중 마지막만 전달된다
    let state = tokio::time::timeout(Duration::from_secs(5), rendered.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, ProcessState::Running);

    drop(first);
    assert!(registry.is_active("srv1"));
    drop(second);
    assert!(!registry.is_active("srv1"));
    mock.assert_async().await;
}
