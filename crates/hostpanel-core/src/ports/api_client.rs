//! 패널 REST API 포트.
//!
//! 구현: `hostpanel-network` crate (reqwest)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::backup::{BackupRecord, CreateBackupParams};
use crate::models::operation::JobStatus;
use crate::models::server::{PowerAction, ServerRef, WebsocketCredentials};

/// 이 서브시스템이 사용하는 패널 API
#[async_trait]
pub trait PanelApi: Send + Sync {
    /// 작업 상태 조회
    async fn job_status(&self, server: &ServerRef, operation_id: &str)
        -> Result<JobStatus, CoreError>;

    /// 백업 생성 요청
    ///
    /// 응답 형태가 여러 가지이므로 원시 JSON을 그대로 반환한다.
    /// 분류는 `BackupCreateResponse::classify`가 담당.
    async fn create_backup(
        &self,
        server: &ServerRef,
        params: &CreateBackupParams,
    ) -> Result<serde_json::Value, CoreError>;

    /// 실패한 백업 재시도 (응답 형태는 생성과 동일)
    async fn retry_backup(
        &self,
        server: &ServerRef,
        backup_uuid: &str,
    ) -> Result<serde_json::Value, CoreError>;

    /// 서버의 백업 목록
    async fn list_backups(&self, server: &ServerRef) -> Result<Vec<BackupRecord>, CoreError>;

    /// 전원 명령 전송. 결과는 리소스 스트림으로 관찰한다.
    async fn send_power_action(&self, server_id: &str, action: PowerAction)
        -> Result<(), CoreError>;

    /// 콘솔 웹소켓 접속 정보 발급
    async fn websocket_credentials(&self, server_id: &str)
        -> Result<WebsocketCredentials, CoreError>;
}
