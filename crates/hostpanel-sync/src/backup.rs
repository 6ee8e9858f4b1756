//! 백업 목록 정규화 및 병합.
//!
//! 생성/재시도 응답은 세 가지 형태 중 하나로 온다. 경계에서 한 번
//! `BackupCreateResponse`로 분류한 뒤 [`UnifiedBackup`]으로만 다룬다.
//!
//! 목록에는 논리 백업 하나당 항목 하나만 존재한다.
//! 같은 백업인지는 작업 ID를 먼저, uuid를 다음으로 비교한다.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use hostpanel_core::error::CoreError;
use hostpanel_core::models::backup::{BackupCreateResponse, CreateBackupParams, UnifiedBackup};
use hostpanel_core::models::operation::{JobStatus, Operation, OperationKind, OperationStatus};
use hostpanel_core::models::server::ServerRef;
use hostpanel_core::ports::api_client::PanelApi;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::poller::OperationPoller;

/// 백업 생성/재시도 결과
#[derive(Debug, Clone, PartialEq)]
pub struct CreateBackupResult {
    pub backup: UnifiedBackup,
    pub job_id: Option<String>,
    pub status: OperationStatus,
    pub progress: u8,
    pub message: Option<String>,
}

impl CreateBackupResult {
    fn from_backup(backup: UnifiedBackup, job_id: Option<String>) -> Self {
        Self {
            job_id: job_id.or_else(|| backup.job_id.clone()),
            status: backup.status,
            progress: backup.progress,
            message: backup.message.clone(),
            backup,
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn same_job(a: &UnifiedBackup, b: &UnifiedBackup) -> bool {
    matches!((&a.job_id, &b.job_id), (Some(x), Some(y)) if x == y)
}

/// uuid 비교. 작업 ID가 곧 백업 uuid가 되는 경우도 같은 백업으로 본다.
fn same_uuid(a: &UnifiedBackup, b: &UnifiedBackup) -> bool {
    if let (Some(x), Some(y)) = (non_empty(&a.uuid), non_empty(&b.uuid)) {
        return x == y;
    }
    let cross = |placeholder: &UnifiedBackup, record: &UnifiedBackup| {
        placeholder.uuid.is_empty()
            && placeholder.job_id.as_deref().is_some_and(|job| job == record.uuid)
    };
    cross(a, b) || cross(b, a)
}

fn find_match(list: &[UnifiedBackup], incoming: &UnifiedBackup) -> Option<usize> {
    list.iter()
        .position(|existing| same_job(existing, incoming))
        .or_else(|| list.iter().position(|existing| same_uuid(existing, incoming)))
}

/// 새 레코드를 목록에 반영한다. 같은 백업이 있으면 교체하고, 없으면 맨 앞에 추가한다.
pub fn reconcile(mut list: Vec<UnifiedBackup>, incoming: UnifiedBackup) -> Vec<UnifiedBackup> {
    match find_match(&list, &incoming) {
        Some(index) => {
            list[index].merge_from(incoming);
            // 병합으로 uuid가 생겼다면 같은 uuid의 다른 항목은 중복이다
            let merged_uuid = list[index].uuid.clone();
            if !merged_uuid.is_empty() {
                let mut position = 0;
                list.retain(|b| {
                    let keep = position == index || b.uuid != merged_uuid;
                    position += 1;
                    keep
                });
            }
        }
        None => list.insert(0, incoming),
    }
    list
}

/// 권위 있는 목록으로 갱신한다.
///
/// 모든 서버 레코드를 반영하고, 아직 서버 레코드와 짝지어지지 않은 임시 항목은
/// 마지막 상태 그대로 유지한다. 서버 목록에서 사라진 확정 항목은 제거된다.
pub fn merge_refresh(
    list: Vec<UnifiedBackup>,
    authoritative: Vec<UnifiedBackup>,
) -> Vec<UnifiedBackup> {
    let mut merged = list;
    for record in &authoritative {
        merged = reconcile(merged, record.clone());
    }
    merged.retain(|backup| {
        backup.is_placeholder()
            || authoritative
                .iter()
                .any(|record| record.uuid == backup.uuid)
    });
    merged
}

/// 백업 목록 관리자
pub struct UnifiedBackupReconciler {
    api: Arc<dyn PanelApi>,
    poller: Arc<OperationPoller>,
    lists: Mutex<HashMap<ServerRef, Vec<UnifiedBackup>>>,
    changes: broadcast::Sender<ServerRef>,
}

impl UnifiedBackupReconciler {
    pub fn new(api: Arc<dyn PanelApi>, poller: Arc<OperationPoller>) -> Self {
        let (changes, _) = broadcast::channel(32);
        Self {
            api,
            poller,
            lists: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// 현재 목록
    pub fn backups(&self, server: &ServerRef) -> Vec<UnifiedBackup> {
        self.lists.lock().get(server).cloned().unwrap_or_default()
    }

    /// 목록 변경 알림 수신기
    pub fn subscribe(&self) -> broadcast::Receiver<ServerRef> {
        self.changes.subscribe()
    }

    /// 백업 생성
    ///
    /// 응답 형태가 알려진 세 가지와 다르면 `CoreError::InvalidResponse`.
    pub async fn create_backup(
        &self,
        server: &ServerRef,
        params: &CreateBackupParams,
    ) -> Result<CreateBackupResult, CoreError> {
        let raw = self.api.create_backup(server, params).await?;
        let result = self.absorb_response(server, raw, None)?;
        info!(
            "백업 생성 요청 완료: {server} (작업: {:?}, 상태: {})",
            result.job_id, result.status
        );
        Ok(result)
    }

    /// 실패한 백업 재시도. 응답 형태는 생성과 같다.
    ///
    /// 작업 ID만 오는 응답도 대상 백업의 uuid에 붙여 기존 항목을 갱신한다.
    pub async fn retry_backup(
        &self,
        server: &ServerRef,
        backup_uuid: &str,
    ) -> Result<CreateBackupResult, CoreError> {
        let raw = self.api.retry_backup(server, backup_uuid).await?;
        let result = self.absorb_response(server, raw, Some(backup_uuid))?;
        info!("백업 재시도 요청 완료: {backup_uuid}");
        Ok(result)
    }

    fn absorb_response(
        &self,
        server: &ServerRef,
        raw: serde_json::Value,
        backup_uuid: Option<&str>,
    ) -> Result<CreateBackupResult, CoreError> {
        let response = BackupCreateResponse::classify(raw).inspect_err(|e| {
            warn!("백업 응답 분류 실패: {e}");
        })?;
        let job_id = response.job_id().map(str::to_string);
        let mut backup = response.into_unified();
        if let Some(uuid) = backup_uuid {
            backup.attach_to(uuid);
        }
        let merged = self.upsert(server, backup);
        Ok(CreateBackupResult::from_backup(merged, job_id))
    }

    /// 서버 목록을 다시 읽어 병합
    pub async fn refresh(&self, server: &ServerRef) -> Result<Vec<UnifiedBackup>, CoreError> {
        let records = self.api.list_backups(server).await?;
        let authoritative: Vec<UnifiedBackup> =
            records.into_iter().map(UnifiedBackup::from_listed).collect();
        debug!("백업 목록 {}개 수신: {server}", authoritative.len());

        let merged = {
            let mut lists = self.lists.lock();
            let current = lists.remove(server).unwrap_or_default();
            let merged = merge_refresh(current, authoritative);
            lists.insert(server.clone(), merged.clone());
            merged
        };
        let _ = self.changes.send(server.clone());
        Ok(merged)
    }

    /// 작업 상태 응답을 해당 항목에 반영. 항목이 있으면 `true`.
    pub fn apply_job_status(&self, server: &ServerRef, job: &JobStatus) -> bool {
        self.update_by_job(server, &job.job_id, |backup| backup.apply_job(job))
    }

    /// 폴러의 작업 뷰를 해당 항목에 반영
    pub fn apply_operation(&self, server: &ServerRef, operation: &Operation) -> bool {
        self.update_by_job(server, &operation.id, |backup| {
            backup.apply_operation(operation)
        })
    }

    fn update_by_job<F>(&self, server: &ServerRef, job_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut UnifiedBackup),
    {
        let found = {
            let mut lists = self.lists.lock();
            let entry = lists.get_mut(server).and_then(|list| {
                list.iter_mut().find(|b| {
                    b.job_id.as_deref() == Some(job_id) || (!b.uuid.is_empty() && b.uuid == job_id)
                })
            });
            match entry {
                Some(backup) => {
                    update(backup);
                    true
                }
                None => false,
            }
        };
        if found {
            let _ = self.changes.send(server.clone());
        } else {
            debug!("작업에 해당하는 백업 없음: {job_id}");
        }
        found
    }

    /// 목록에 반영하고 병합된 항목을 돌려준다
    fn upsert(&self, server: &ServerRef, backup: UnifiedBackup) -> UnifiedBackup {
        let merged = {
            let mut lists = self.lists.lock();
            let current = lists.remove(server).unwrap_or_default();
            let list = reconcile(current, backup.clone());
            let merged = find_match(&list, &backup)
                .map(|index| list[index].clone())
                .unwrap_or(backup);
            lists.insert(server.clone(), list);
            merged
        };
        let _ = self.changes.send(server.clone());
        merged
    }

    /// 생성 후 작업이 끝날 때까지 추적
    ///
    /// 진행 상황은 목록에 계속 반영되고, 작업이 끝나면 목록을 새로 읽은 뒤
    /// `on_finished`가 한 번 호출된다. 응답이 이미 종료 상태면 폴링 없이 바로 호출된다.
    pub async fn create_and_track<F>(
        self: &Arc<Self>,
        server: &ServerRef,
        params: &CreateBackupParams,
        on_finished: F,
    ) -> Result<CreateBackupResult, CoreError>
    where
        F: FnOnce(Result<Operation, CoreError>) + Send + 'static,
    {
        let result = self.create_backup(server, params).await?;

        let Some(job_id) = result.job_id.clone() else {
            debug!("작업 ID 없는 백업 응답, 추적 생략");
            let mut operation =
                Operation::new(result.backup.uuid.clone(), OperationKind::BackupCreate);
            operation.status = result.status;
            operation.progress = result.progress;
            on_finished(Ok(operation));
            return Ok(result);
        };
        if result.status.is_terminal() {
            let mut operation = Operation::new(job_id, OperationKind::BackupCreate);
            operation.status = result.status;
            operation.progress = result.progress;
            on_finished(Ok(operation));
            return Ok(result);
        }

        let on_finished = Arc::new(Mutex::new(Some(on_finished)));
        let finish_ok = on_finished.clone();

        let on_update = {
            let this: Weak<Self> = Arc::downgrade(self);
            let server = server.clone();
            move |operation: &Operation| {
                if let Some(this) = this.upgrade() {
                    this.apply_operation(&server, operation);
                }
            }
        };
        let on_complete = {
            let this: Weak<Self> = Arc::downgrade(self);
            let server = server.clone();
            move |operation: Operation| {
                let Some(this) = this.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    if let Err(e) = this.refresh(&server).await {
                        warn!("작업 종료 후 백업 목록 갱신 실패: {e}");
                    }
                    if let Some(callback) = finish_ok.lock().take() {
                        callback(Ok(operation));
                    }
                });
            }
        };
        let on_error = move |error: CoreError| {
            if let Some(callback) = on_finished.lock().take() {
                callback(Err(error));
            }
        };

        self.poller.start_polling(
            server.clone(),
            &job_id,
            OperationKind::BackupCreate,
            on_update,
            on_complete,
            on_error,
        );
        Ok(result)
    }
}
