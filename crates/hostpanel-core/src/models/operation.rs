//! 장시간 작업(Operation) 모델.
//!
//! 백업 생성/복원 같은 비동기 작업의 상태 응답(`JobStatus`)과
//! 클라이언트가 추적하는 작업 뷰(`Operation`)를 정의한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// 작업 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// 종료 상태 여부 (더 이상 폴링하지 않음)
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 진행률을 0~100 정수로 정규화
pub fn normalize_progress(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.clamp(0.0, 100.0).round() as u8
}

/// 작업 상태 조회 응답 (`GET .../backups/{uuid}/status`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    /// 작업 ID
    pub job_id: String,
    /// 작업 상태
    pub status: OperationStatus,
    /// 진행률 (서버 값 그대로, 범위 밖일 수 있음)
    #[serde(default)]
    pub progress: f64,
    /// 진행 메시지
    #[serde(default)]
    pub message: Option<String>,
    /// 실패 사유
    #[serde(default)]
    pub error: Option<String>,
    /// 성공 여부
    #[serde(default)]
    pub is_successful: bool,
    /// 취소 가능 여부
    #[serde(default)]
    pub can_cancel: bool,
    /// 재시도 가능 여부
    #[serde(default)]
    pub can_retry: bool,
    /// 시작 시각
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// 마지막 갱신 시각
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
    /// 완료 시각
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// 응답 본문 파싱. `{ data: {...} }` 래핑도 허용한다.
    pub fn from_body(body: &str) -> Result<Self, CoreError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| CoreError::Parse(format!("작업 상태 응답 파싱 실패: {e}")))?;
        let inner = match value.get("data") {
            Some(data) if data.is_object() => data.clone(),
            _ => value,
        };
        serde_json::from_value(inner)
            .map_err(|e| CoreError::Parse(format!("작업 상태 필드 오류: {e}")))
    }

    /// 0~100 정수 진행률
    pub fn percent(&self) -> u8 {
        normalize_progress(self.progress)
    }
}

/// 작업 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    BackupCreate,
    BackupRestore,
    Power,
}

/// 클라이언트가 추적 중인 작업
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
    /// 0~100
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub can_retry: bool,
}

impl Operation {
    /// 새 작업 (pending, 0%)
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: OperationStatus::Pending,
            progress: 0,
            message: None,
            error: None,
            can_retry: false,
        }
    }

    /// 폴링 응답 반영. 작업 상태는 이 경로로만 변경된다.
    pub fn apply(&mut self, job: &JobStatus) {
        self.status = job.status;
        self.progress = job.percent();
        if job.message.is_some() {
            self.message = job.message.clone();
        }
        self.error = job.error.clone();
        self.can_retry = job.can_retry;
        if self.status == OperationStatus::Completed {
            self.progress = 100;
        }
    }

    /// 종료 상태 여부
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// failed로 종료된 경우 사용자에게 보여줄 에러
    pub fn failure(&self) -> Option<CoreError> {
        if self.status != OperationStatus::Failed {
            return None;
        }
        let message = self
            .error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "알 수 없는 오류".to_string());
        Some(CoreError::OperationFailed {
            job_id: self.id.clone(),
            message,
        })
    }
}
