//! 설정 및 DI 와이어링 통합 테스트.
//!
//! 설정 파일 → AppConfig → 어댑터 → 세션 생성 검증.

use std::sync::Arc;
use std::time::Duration;

use hostpanel_core::config::AppConfig;
use hostpanel_core::config_manager::ConfigManager;
use hostpanel_core::models::server::ServerRef;
use hostpanel_core::ports::api_client::PanelApi;
use hostpanel_core::ports::stream::{ConsoleSocket, EventStreamSource};
use hostpanel_network::auth::ApiKey;
use hostpanel_network::http_client::HttpApiClient;
use hostpanel_network::sse_client::ResourceStreamClient;
use hostpanel_network::ws_client::ConsoleSocketClient;
use hostpanel_sync::session::ServerSession;

#[test]
fn config_defaults_are_valid() {
    let config = AppConfig::default_config();

    assert!(!config.server.base_url.is_empty());
    assert!(config.server.request_timeout_ms > 0);

    // 리소스 스트림은 콘솔 소켓보다 느리게 재연결
    assert!(config.stream.resource_reconnect_ms > config.stream.console_reconnect_ms);
    assert!(config.stream.debounce_ms < config.stream.resource_reconnect_ms);
    assert!(config.stream.channel_capacity > 0);

    assert!(config.poller.max_consecutive_failures > 0);
    assert!(config.poller.max_duration_secs * 1000 > config.poller.interval_ms);
}

#[test]
fn config_duration_conversions() {
    let config = AppConfig::default_config();
    assert_eq!(config.resource_reconnect_delay(), Duration::from_secs(5));
    assert_eq!(config.console_reconnect_delay(), Duration::from_secs(1));
    assert_eq!(config.debounce_window(), Duration::from_millis(100));
    assert_eq!(config.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.auto_close_delay(), Duration::from_secs(3));
}

#[test]
fn config_file_is_created_then_partial_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let manager = ConfigManager::with_path(path.clone()).unwrap();
    assert!(path.exists());
    assert_eq!(manager.get().stream.debounce_ms, 100);

    // 일부 필드만 있는 파일: 나머지는 기본값
    std::fs::write(
        &path,
        r#"{
            "server": { "base_url": "https://panel.example.com" },
            "stream": { "resource_reconnect_ms": 250 },
            "poller": {},
            "display": { "power_override_secs": 9 }
        }"#,
    )
    .unwrap();
    manager.reload().unwrap();

    let config = manager.get();
    assert_eq!(config.server.base_url, "https://panel.example.com");
    assert_eq!(config.resource_reconnect_delay(), Duration::from_millis(250));
    assert_eq!(config.stream.console_reconnect_ms, 1_000);
    assert_eq!(config.display.power_override_secs, 9);
}

#[test]
fn config_update_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let manager = ConfigManager::with_path(path.clone()).unwrap();

    manager.update_with(|c| c.poller.interval_ms = 500).unwrap();

    let reopened = ConfigManager::with_path(path).unwrap();
    assert_eq!(reopened.get().poll_interval(), Duration::from_millis(500));
}

#[tokio::test]
async fn all_adapters_wire_into_a_session() {
    let config = AppConfig::default_config();
    let api_key = ApiKey::new(Some("ptlc_test"));

    let http = HttpApiClient::new(
        &config.server.base_url,
        api_key.clone(),
        config.request_timeout(),
    )
    .unwrap();
    let api: Arc<dyn PanelApi> = Arc::new(http);
    let source: Arc<dyn EventStreamSource> =
        Arc::new(ResourceStreamClient::new(&config.server.base_url, api_key));
    let console: Arc<dyn ConsoleSocket> = Arc::new(ConsoleSocketClient::new(
        api.clone(),
        config.console_reconnect_delay(),
    ));

    let session = ServerSession::start(
        ServerRef::new("wings", "srv1"),
        api,
        source,
        console,
        &config,
    );
    assert_eq!(session.server().uuid, "srv1");
    assert_eq!(session.poller().active_count(), 0);
    assert_eq!(session.streams().active_count(), 0);
    drop(session);
}
