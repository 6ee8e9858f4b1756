//! 단위 테스트용 포트 가짜 구현.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use hostpanel_core::error::CoreError;
use hostpanel_core::models::backup::{BackupRecord, CreateBackupParams};
use hostpanel_core::models::connection::ConsoleEvent;
use hostpanel_core::models::operation::{JobStatus, OperationStatus};
use hostpanel_core::models::server::{PowerAction, ServerRef, WebsocketCredentials};
use hostpanel_core::ports::api_client::PanelApi;
use hostpanel_core::ports::stream::{ConsoleSocket, EventStreamSource, RawMessageStream};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

pub(crate) fn job(id: &str, status: OperationStatus, progress: f64) -> JobStatus {
    JobStatus {
        job_id: id.to_string(),
        status,
        progress,
        message: None,
        error: None,
        is_successful: status == OperationStatus::Completed,
        can_cancel: false,
        can_retry: status == OperationStatus::Failed,
        started_at: None,
        last_updated_at: None,
        completed_at: None,
    }
}

/// 작업 ID별로 준비된 응답을 순서대로 돌려주는 API.
/// 준비된 응답이 떨어지면 running 0%를 계속 반환한다.
#[derive(Default)]
pub(crate) struct FakeApi {
    jobs: Mutex<HashMap<String, VecDeque<Result<JobStatus, CoreError>>>>,
    job_calls: Mutex<HashMap<String, usize>>,
    create_responses: Mutex<VecDeque<Result<Value, CoreError>>>,
    listed: Mutex<Vec<BackupRecord>>,
    power_calls: Mutex<Vec<(String, PowerAction)>>,
}

impl FakeApi {
    pub(crate) fn script_job(&self, id: &str, responses: Vec<Result<JobStatus, CoreError>>) {
        self.jobs.lock().insert(id.to_string(), responses.into());
    }

    pub(crate) fn job_calls(&self, id: &str) -> usize {
        self.job_calls.lock().get(id).copied().unwrap_or(0)
    }

    pub(crate) fn push_create_response(&self, response: Result<Value, CoreError>) {
        self.create_responses.lock().push_back(response);
    }

    pub(crate) fn set_listed(&self, records: Vec<BackupRecord>) {
        *self.listed.lock() = records;
    }

    pub(crate) fn power_calls(&self) -> Vec<(String, PowerAction)> {
        self.power_calls.lock().clone()
    }
}

#[async_trait]
impl PanelApi for FakeApi {
    async fn job_status(
        &self,
        _server: &ServerRef,
        operation_id: &str,
    ) -> Result<JobStatus, CoreError> {
        *self.job_calls.lock().entry(operation_id.to_string()).or_default() += 1;
        let next = self
            .jobs
            .lock()
            .get_mut(operation_id)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(job(operation_id, OperationStatus::Running, 0.0)))
    }

    async fn create_backup(
        &self,
        _server: &ServerRef,
        _params: &CreateBackupParams,
    ) -> Result<Value, CoreError> {
        self.create_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::Internal("준비된 응답 없음".into())))
    }

    async fn retry_backup(
        &self,
        _server: &ServerRef,
        _backup_uuid: &str,
    ) -> Result<Value, CoreError> {
        self.create_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::Internal("준비된 응답 없음".into())))
    }

    async fn list_backups(&self, _server: &ServerRef) -> Result<Vec<BackupRecord>, CoreError> {
        Ok(self.listed.lock().clone())
    }

    async fn send_power_action(
        &self,
        server_id: &str,
        action: PowerAction,
    ) -> Result<(), CoreError> {
        self.power_calls.lock().push((server_id.to_string(), action));
        Ok(())
    }

    async fn websocket_credentials(
        &self,
        _server_id: &str,
    ) -> Result<WebsocketCredentials, CoreError> {
        Err(CoreError::Internal("사용하지 않음".into()))
    }
}

/// 가짜 SSE 연결 하나의 동작
pub(crate) enum ScriptedConnection {
    /// 연결 자체가 실패
    Refuse(CoreError),
    /// 메시지를 보낸 뒤 종료
    Close(Vec<Result<String, CoreError>>),
    /// 메시지를 보낸 뒤 계속 열려 있음
    Hold(Vec<Result<String, CoreError>>),
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 연결 시도 횟수와 살아 있는 연결 수를 기록하는 스트림 소스.
/// 스크립트가 떨어지면 빈 채로 열려 있는 연결을 준다.
#[derive(Default)]
pub(crate) struct FakeSource {
    script: Mutex<VecDeque<ScriptedConnection>>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl FakeSource {
    pub(crate) fn with_script(script: Vec<ScriptedConnection>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStreamSource for FakeSource {
    async fn open(&self, _target_id: &str) -> Result<RawMessageStream, CoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(ScriptedConnection::Hold(Vec::new()));

        let (items, hold) = match next {
            ScriptedConnection::Refuse(e) => return Err(e),
            ScriptedConnection::Close(items) => (items, false),
            ScriptedConnection::Hold(items) => (items, true),
        };

        self.live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(self.live.clone());
        let head = stream::iter(items).map(move |item| {
            let _held = &guard;
            item
        });
        if hold {
            Ok(Box::pin(head.chain(stream::pending())))
        } else {
            Ok(Box::pin(head))
        }
    }
}

pub(crate) fn snapshot_message(state: &str, memory_bytes: u64) -> String {
    serde_json::json!({
        "attributes": {
            "current_state": state,
            "is_suspended": false,
            "resources": { "memory_bytes": memory_bytes, "cpu_absolute": 12.5 }
        }
    })
    .to_string()
}

/// 준비된 이벤트를 보낸 뒤 수신 측이 닫힐 때까지 대기하는 콘솔 소켓
#[derive(Default)]
pub(crate) struct FakeConsole {
    events: Mutex<Vec<ConsoleEvent>>,
}

impl FakeConsole {
    pub(crate) fn with_events(events: Vec<ConsoleEvent>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }
}

#[async_trait]
impl ConsoleSocket for FakeConsole {
    async fn run(
        &self,
        _server_id: &str,
        tx: mpsc::Sender<ConsoleEvent>,
    ) -> Result<(), CoreError> {
        let events = std::mem::take(&mut *self.events.lock());
        for event in events {
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }
        tx.closed().await;
        Ok(())
    }
}
