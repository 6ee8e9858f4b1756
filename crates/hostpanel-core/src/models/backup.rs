//! 백업 모델.
//!
//! 백엔드는 백업 생성 요청에 세 가지 형태로 응답한다.
//! 응답은 경계에서 한 번 [`BackupCreateResponse`]로 분류되고,
//! 이후 코드는 정규화된 [`UnifiedBackup`]만 다룬다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::operation::{normalize_progress, JobStatus, Operation, OperationStatus};
use crate::error::CoreError;

/// 비동기 작업으로 생성되어 아직 이름이 없는 백업의 표시 이름
pub const PENDING_BACKUP_NAME: &str = "Pending...";

/// 백업 생성 요청 본문
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateBackupParams {
    /// 백업 이름 (없으면 서버가 생성)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 제외 패턴 (줄바꿈 구분)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<String>,
    /// 잠금 여부
    pub is_locked: bool,
}

/// 서버가 보낸 백업 엔티티 (`attributes` 래핑 해제 후)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupRecord {
    pub uuid: String,
    pub name: String,
    pub ignored_files: Vec<String>,
    pub checksum: Option<String>,
    pub bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_successful: bool,
    pub is_locked: bool,
    pub is_automatic: bool,
    pub job_id: Option<String>,
    pub status: Option<OperationStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub can_retry: Option<bool>,
}

impl BackupRecord {
    /// `{ object: "backup", attributes: {...} }` 래핑을 벗기고 파싱
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let inner = match value {
            Value::Object(mut map) => match map.remove("attributes") {
                Some(attrs @ Value::Object(_)) => attrs,
                Some(other) => {
                    map.insert("attributes".to_string(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            },
            other => other,
        };
        serde_json::from_value(inner)
            .map_err(|e| CoreError::Parse(format!("백업 엔티티 파싱 실패: {e}")))
    }
}

/// 생성 응답의 작업 필드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobMeta {
    pub job_id: Option<String>,
    pub status: OperationStatus,
    pub progress: f64,
    pub message: Option<String>,
}

/// 백업 생성 응답의 세 가지 형태
#[derive(Debug, Clone)]
pub enum BackupCreateResponse {
    /// `data` + `meta`: 엔티티와 작업 정보가 함께 옴
    Hybrid { record: BackupRecord, job: JobMeta },
    /// `job_id` + `status`: 작업만 생성됨, 엔티티는 나중에 도착
    Async(JobMeta),
    /// 최상위 `uuid` 또는 `object == "backup"`: 완성된 엔티티
    Entity(BackupRecord),
}

impl BackupCreateResponse {
    /// 원시 응답을 분류
    pub fn classify(value: Value) -> Result<Self, CoreError> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(CoreError::InvalidResponse(format!(
                    "JSON 객체가 아님: {}",
                    json_kind(&other)
                )))
            }
        };

        if map.contains_key("data") && map.contains_key("meta") {
            let mut map = map;
            let data = map.remove("data").unwrap_or(Value::Null);
            let meta = map.remove("meta").unwrap_or(Value::Null);
            let record = BackupRecord::from_value(data)?;
            let job: JobMeta = serde_json::from_value(meta)
                .map_err(|e| CoreError::Parse(format!("meta 파싱 실패: {e}")))?;
            return Ok(Self::Hybrid { record, job });
        }

        if map.contains_key("job_id") && map.contains_key("status") && !map.contains_key("data")
        {
            let job: JobMeta = serde_json::from_value(Value::Object(map))
                .map_err(|e| CoreError::Parse(format!("작업 응답 파싱 실패: {e}")))?;
            return Ok(Self::Async(job));
        }

        let is_backup_object = map.get("object").and_then(Value::as_str) == Some("backup");
        if map.contains_key("uuid") || is_backup_object {
            return Ok(Self::Entity(BackupRecord::from_value(Value::Object(map))?));
        }

        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        Err(CoreError::InvalidResponse(format!(
            "백업 응답에서 data/meta, job_id/status, uuid/object 중 어느 것도 찾지 못함 (키: [{}])",
            keys.join(", ")
        )))
    }

    /// 응답의 작업 ID
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Hybrid { record, job } => job.job_id.as_deref().or(record.job_id.as_deref()),
            Self::Async(job) => job.job_id.as_deref(),
            Self::Entity(record) => record.job_id.as_deref(),
        }
    }

    /// 정규화된 백업
    pub fn into_unified(self) -> UnifiedBackup {
        match self {
            Self::Hybrid { record, job } => UnifiedBackup::from_hybrid(record, job),
            Self::Async(job) => UnifiedBackup::placeholder(job),
            Self::Entity(record) => UnifiedBackup::from_entity(record),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 출처와 무관하게 정규화된 백업 뷰
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedBackup {
    /// 할당 전에는 빈 문자열
    pub uuid: String,
    pub job_id: Option<String>,
    pub name: String,
    pub status: OperationStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub is_successful: bool,
    pub is_locked: bool,
    pub is_automatic: bool,
    pub checksum: Option<String>,
    pub bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub can_retry: bool,
    pub can_delete: bool,
    pub can_download: bool,
    pub can_restore: bool,
    /// 실제 uuid를 가진 서버 레코드가 도착하기 전까지 true
    pub is_live_only: bool,
    #[serde(skip)]
    job_can_retry: bool,
    /// 작업 응답만으로 만든 레코드 (서버 레코드 필드 없음)
    #[serde(skip)]
    job_only: bool,
}

impl UnifiedBackup {
    fn base(record: BackupRecord) -> Self {
        let mut backup = Self {
            is_live_only: record.uuid.is_empty(),
            uuid: record.uuid,
            job_id: record.job_id,
            name: record.name,
            status: record.status.unwrap_or_default(),
            progress: normalize_progress(record.progress.unwrap_or(0.0)),
            message: record.message,
            is_successful: record.is_successful,
            is_locked: record.is_locked,
            is_automatic: record.is_automatic,
            checksum: record.checksum,
            bytes: record.bytes,
            created_at: record.created_at,
            completed_at: record.completed_at,
            can_retry: false,
            can_delete: false,
            can_download: false,
            can_restore: false,
            job_can_retry: record.can_retry.unwrap_or(false),
            job_only: false,
        };
        backup.derive_capabilities();
        backup
    }

    /// 생성 응답 형태 3: 엔티티 자체에서 작업 필드를 읽는다 (status→pending, progress→0)
    pub fn from_entity(record: BackupRecord) -> Self {
        Self::base(record)
    }

    /// 생성 응답 형태 1: 엔티티는 `data`, 작업 필드는 `meta`
    pub fn from_hybrid(record: BackupRecord, job: JobMeta) -> Self {
        let mut backup = Self::base(record);
        if job.job_id.is_some() {
            backup.job_id = job.job_id;
        }
        backup.status = job.status;
        backup.progress = normalize_progress(job.progress);
        if job.message.is_some() {
            backup.message = job.message;
        }
        backup.derive_capabilities();
        backup
    }

    /// 생성 응답 형태 2: 목록에 즉시 보여줄 임시 레코드
    pub fn placeholder(job: JobMeta) -> Self {
        let record = BackupRecord {
            name: PENDING_BACKUP_NAME.to_string(),
            job_id: job.job_id,
            status: Some(job.status),
            progress: Some(job.progress),
            message: job.message,
            is_successful: false,
            ..Default::default()
        };
        let mut backup = Self::base(record);
        backup.job_only = true;
        backup
    }

    /// 백업 목록 API의 레코드. 상태 필드가 없으면 완료 시각/성공 여부로 추론한다.
    pub fn from_listed(record: BackupRecord) -> Self {
        let inferred = match (record.status, record.completed_at) {
            (Some(status), _) => status,
            (None, Some(_)) if record.is_successful => OperationStatus::Completed,
            (None, Some(_)) => OperationStatus::Failed,
            (None, None) => OperationStatus::Running,
        };
        let mut backup = Self::base(record);
        backup.status = inferred;
        if inferred == OperationStatus::Completed {
            backup.progress = 100;
        }
        backup.derive_capabilities();
        backup
    }

    /// 대상 백업을 이미 아는 응답(재시도 등)에 uuid를 붙인다. uuid가 있으면 그대로 둔다.
    pub fn attach_to(&mut self, backup_uuid: &str) {
        if self.uuid.is_empty() && !backup_uuid.is_empty() {
            self.uuid = backup_uuid.to_string();
            self.is_live_only = false;
            self.derive_capabilities();
        }
    }

    /// 임시 레코드 여부 (아직 uuid 없음)
    pub fn is_placeholder(&self) -> bool {
        self.uuid.is_empty()
    }

    /// 폴링 결과 반영
    pub fn apply_job(&mut self, job: &JobStatus) {
        self.status = job.status;
        self.progress = if job.status == OperationStatus::Completed {
            100
        } else {
            job.percent()
        };
        if let Some(message) = job.error.clone().or_else(|| job.message.clone()) {
            self.message = Some(message);
        }
        self.is_successful = job.is_successful
            || (job.status == OperationStatus::Completed && !self.is_placeholder());
        if job.completed_at.is_some() {
            self.completed_at = job.completed_at;
        }
        self.job_can_retry = job.can_retry;
        self.derive_capabilities();
    }

    /// 폴러가 추적 중인 작업 뷰 반영
    pub fn apply_operation(&mut self, operation: &Operation) {
        self.status = operation.status;
        self.progress = operation.progress;
        if let Some(message) = operation.error.clone().or_else(|| operation.message.clone()) {
            self.message = Some(message);
        }
        if operation.status == OperationStatus::Completed && !self.is_placeholder() {
            self.is_successful = true;
        }
        self.job_can_retry = operation.can_retry;
        self.derive_capabilities();
    }

    /// 같은 논리 백업의 새 레코드를 흡수한다. 새 레코드가 비워 둔 식별자는 유지.
    ///
    /// 작업 응답만으로 만든 레코드는 작업 필드(상태, 진행률, 메시지, 작업 ID)만 반영하고
    /// 잠금, 크기, 체크섬 같은 서버 레코드 필드는 건드리지 않는다.
    pub fn merge_from(&mut self, incoming: UnifiedBackup) {
        if incoming.job_only {
            self.merge_job_fields(incoming);
            return;
        }
        let previous = std::mem::replace(self, incoming);
        if self.uuid.is_empty() {
            self.uuid = previous.uuid;
        }
        if self.job_id.is_none() {
            self.job_id = previous.job_id;
        }
        if self.name == PENDING_BACKUP_NAME && previous.name != PENDING_BACKUP_NAME {
            self.name = previous.name;
        }
        if self.created_at.is_none() {
            self.created_at = previous.created_at;
        }
        self.is_live_only = self.uuid.is_empty();
        self.derive_capabilities();
    }

    fn merge_job_fields(&mut self, incoming: UnifiedBackup) {
        if self.uuid.is_empty() {
            self.uuid = incoming.uuid;
        }
        if incoming.job_id.is_some() {
            self.job_id = incoming.job_id;
        }
        self.status = incoming.status;
        self.progress = incoming.progress;
        if incoming.message.is_some() {
            self.message = incoming.message;
        }
        self.job_can_retry = incoming.job_can_retry;
        self.is_live_only = self.uuid.is_empty();
        self.derive_capabilities();
    }

    fn derive_capabilities(&mut self) {
        let has_uuid = !self.uuid.is_empty();
        let done_ok = self.is_successful
            && matches!(self.status, OperationStatus::Completed)
            && has_uuid;
        self.can_download = done_ok;
        self.can_restore = done_ok;
        self.can_delete = !self.is_locked && has_uuid && self.status.is_terminal();
        self.can_retry = self.status == OperationStatus::Failed || self.job_can_retry;
    }
}
