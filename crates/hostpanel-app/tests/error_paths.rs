//! Cross-crate 에러 경로 테스트.
//!
//! HTTP 상태 코드가 `CoreError`로 매핑되어 동기화 계층까지 전파되는지 검증한다.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use hostpanel_core::config::PollerConfig;
use hostpanel_core::error::CoreError;
use hostpanel_core::models::backup::CreateBackupParams;
use hostpanel_core::models::operation::OperationKind;
use hostpanel_core::models::server::ServerRef;
use hostpanel_network::auth::ApiKey;
use hostpanel_network::http_client::HttpApiClient;
use hostpanel_sync::backup::UnifiedBackupReconciler;
use hostpanel_sync::poller::{OperationPoller, PollerSettings};
use tokio::sync::oneshot;

const BACKUPS: &str = "/api/client/servers/wings/srv1/backups";

fn server_ref() -> ServerRef {
    ServerRef::new("wings", "srv1")
}

/// 기본 재시도 설정 그대로. 작업 상태 조회 횟수는 폴러 정책만 따른다.
fn poller_for(server: &mockito::ServerGuard) -> Arc<OperationPoller> {
    let api = HttpApiClient::new(
        &server.url(),
        ApiKey::new(Some("ptlc_test")),
        Duration::from_secs(5),
    )
    .unwrap();
    let settings = PollerSettings::from(&PollerConfig {
        interval_ms: 20,
        ..PollerConfig::default()
    });
    Arc::new(OperationPoller::new(Arc::new(api), settings))
}

fn reconciler_for(server: &mockito::ServerGuard) -> Arc<UnifiedBackupReconciler> {
    let api = Arc::new(
        HttpApiClient::new(
            &server.url(),
            ApiKey::new(Some("ptlc_test")),
            Duration::from_secs(5),
        )
        .unwrap(),
    );
    Arc::new(UnifiedBackupReconciler::new(api, poller_for(server)))
}

/// 폴링을 시작하고 에러 콜백 결과를 기다린다
async fn poll_until_error(poller: &OperationPoller, job_id: &str) -> CoreError {
    let (tx, rx) = oneshot::channel();
    poller.start_polling(
        server_ref(),
        job_id,
        OperationKind::BackupCreate,
        |_| {},
        |op| panic!("완료되면 안 됨: {op:?}"),
        move |e| {
            let _ = tx.send(e);
        },
    );
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("에러 콜백 대기 시간 초과")
        .unwrap()
}

#[tokio::test]
async fn unknown_backup_shape_is_invalid_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", BACKUPS)
        .with_status(200)
        .with_body(r#"{"result":"ok","id":7}"#)
        .create_async()
        .await;

    let reconciler = reconciler_for(&server);
    let err = reconciler
        .create_backup(&server_ref(), &CreateBackupParams::default())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::InvalidResponse(msg) if msg.contains("id, result"));
    assert!(reconciler.backups(&server_ref()).is_empty());
}

#[tokio::test]
async fn unauthorized_create_is_auth_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", BACKUPS)
        .with_status(401)
        .with_body("invalid api key")
        .expect(1)
        .create_async()
        .await;

    let err = reconciler_for(&server)
        .create_backup(&server_ref(), &CreateBackupParams::default())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Auth(_));
    mock.assert_async().await;
}

#[tokio::test]
async fn auth_failure_stops_polling_immediately() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", format!("{BACKUPS}/J1/status").as_str())
        .with_status(403)
        .expect(1)
        .create_async()
        .await;

    let poller = poller_for(&server);
    let err = poll_until_error(&poller, "J1").await;
    assert_matches!(err, CoreError::Auth(_));
    assert!(!poller.is_polling("J1"));
    mock.assert_async().await;
}

#[tokio::test]
async fn repeated_unavailable_gives_up_after_threshold() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", format!("{BACKUPS}/J2/status").as_str())
        .with_status(503)
        .with_body("maintenance")
        // 폴러의 연속 실패 한도(3)만큼만 요청된다
        .expect(3)
        .create_async()
        .await;

    let poller = poller_for(&server);
    let err = poll_until_error(&poller, "J2").await;
    assert_matches!(err, CoreError::ServiceUnavailable(_));
    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_job_status_is_parse_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("{BACKUPS}/J3/status").as_str())
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let err = poll_until_error(&poller_for(&server), "J3").await;
    assert_matches!(err, CoreError::Parse(_));
}
