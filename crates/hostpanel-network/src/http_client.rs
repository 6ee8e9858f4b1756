//! HTTP REST API 클라이언트.
//!
//! `PanelApi` 포트 구현. API 키 헤더 자동 주입 + 목록/접속 정보 조회 재시도.
//! 작업 상태 조회는 폴러가 주기적으로 다시 부르므로 재시도하지 않는다.

use async_trait::async_trait;
use hostpanel_core::error::CoreError;
use hostpanel_core::models::backup::{BackupRecord, CreateBackupParams};
use hostpanel_core::models::operation::JobStatus;
use hostpanel_core::models::server::{PowerAction, ServerRef, WebsocketCredentials};
use hostpanel_core::ports::api_client::PanelApi;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::ApiKey;

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 3;

/// 429 응답에 Retry-After가 없을 때 대기 시간 (초)
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// REST API 클라이언트 (`PanelApi` 포트 구현)
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
    max_retries: u32,
    retry_base_delay: Duration,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

impl HttpApiClient {
    /// 새 HTTP API 클라이언트 생성
    pub fn new(base_url: &str, api_key: ApiKey, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_secs(1),
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 첫 재시도 대기 시간 설정 (이후 두 배씩 증가)
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// 인증 헤더가 포함된 요청 빌더 반환
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.api_key.apply(
            self.client
                .request(method, url)
                .header(reqwest::header::ACCEPT, "application/json"),
        )
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();

        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });

        match status.as_u16() {
            401 | 403 => Err(CoreError::Auth(format!("인증 실패 ({status}): {text}"))),
            404 => Err(CoreError::NotFound {
                resource_type: "API".to_string(),
                id: text,
            }),
            429 => Err(CoreError::RateLimit {
                retry_after_secs: retry_after,
            }),
            502..=504 => Err(CoreError::ServiceUnavailable(text)),
            _ => Err(CoreError::Internal(format!("API 에러 ({status}): {text}"))),
        }
    }

    /// 응답 본문을 JSON으로 읽기
    async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, CoreError> {
        let body = resp
            .text()
            .await
            .map_err(|e| CoreError::Network(format!("응답 본문 수신 실패: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| CoreError::Parse(format!("JSON 응답 파싱 실패: {e}")))
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: base → 2×base → 4×base (최대 30초)
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = self.retry_base_delay;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_transient() || attempt >= self.max_retries {
                        return Err(e);
                    }

                    // RateLimit의 경우 서버 지정 대기 시간 사용
                    if let CoreError::RateLimit { retry_after_secs } = &e {
                        delay = Duration::from_secs(*retry_after_secs);
                    }

                    attempt += 1;
                    warn!(
                        "요청 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                        attempt,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, CoreError> {
        let resp = request
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("요청 실패: {e}")))?;
        Self::check_response(resp).await
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, CoreError> {
        self.execute_with_retry(|| async {
            let resp = self.send(self.request(reqwest::Method::GET, path)).await?;
            Self::read_json(resp).await
        })
        .await
    }
}

#[async_trait]
impl PanelApi for HttpApiClient {
    async fn job_status(
        &self,
        server: &ServerRef,
        operation_id: &str,
    ) -> Result<JobStatus, CoreError> {
        let path = format!("{}/{}/status", server.backups_path(), operation_id);
        debug!("작업 상태 조회: {path}");

        // 재시도와 실패 허용 횟수는 폴러가 정한다. 여기서는 한 번만 요청
        let resp = self.send(self.request(reqwest::Method::GET, &path)).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| CoreError::Network(format!("응답 본문 수신 실패: {e}")))?;
        JobStatus::from_body(&body)
    }

    async fn create_backup(
        &self,
        server: &ServerRef,
        params: &CreateBackupParams,
    ) -> Result<serde_json::Value, CoreError> {
        debug!("백업 생성 요청: server={server}");

        // 생성 요청은 중복 백업을 만들 수 있어 재시도하지 않음
        let resp = self
            .send(
                self.request(reqwest::Method::POST, &server.backups_path())
                    .json(params),
            )
            .await?;
        Self::read_json(resp).await
    }

    async fn retry_backup(
        &self,
        server: &ServerRef,
        backup_uuid: &str,
    ) -> Result<serde_json::Value, CoreError> {
        debug!("백업 재시도 요청: server={server}, backup={backup_uuid}");

        let path = format!("{}/{}/retry", server.backups_path(), backup_uuid);
        let resp = self.send(self.request(reqwest::Method::POST, &path)).await?;
        Self::read_json(resp).await
    }

    async fn list_backups(&self, server: &ServerRef) -> Result<Vec<BackupRecord>, CoreError> {
        let value = self.get_json(&server.backups_path()).await?;
        let envelope: DataEnvelope<Vec<serde_json::Value>> = serde_json::from_value(value)
            .map_err(|e| CoreError::Parse(format!("백업 목록 파싱 실패: {e}")))?;

        let backups = envelope
            .data
            .into_iter()
            .map(BackupRecord::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("백업 목록 수신: {}건", backups.len());
        Ok(backups)
    }

    async fn send_power_action(
        &self,
        server_id: &str,
        action: PowerAction,
    ) -> Result<(), CoreError> {
        debug!("전원 명령 전송: server={server_id}, action={action}");

        let path = format!("/api/client/servers/{server_id}/power");
        let body = serde_json::json!({ "signal": action });
        self.send(self.request(reqwest::Method::POST, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn websocket_credentials(
        &self,
        server_id: &str,
    ) -> Result<WebsocketCredentials, CoreError> {
        let path = format!("/api/client/servers/{server_id}/websocket");
        let value = self.get_json(&path).await?;
        let envelope: DataEnvelope<WebsocketCredentials> = serde_json::from_value(value)
            .map_err(|e| CoreError::Parse(format!("웹소켓 접속 정보 파싱 실패: {e}")))?;
        Ok(envelope.data)
    }
}
