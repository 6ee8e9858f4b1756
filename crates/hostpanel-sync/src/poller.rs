//! 장시간 작업 폴러.
//!
//! 작업 ID마다 폴링 태스크를 하나만 돌리고, 같은 작업을 추적하려는 소비자는
//! 그 태스크에 구독자로 붙는다. 구독자마다 자기 콜백을 갖고, 마지막 구독자가
//! 떠나면 폴링도 멈춘다.
//!
//! 상태: 미추적 → 폴링 중 → 종료(`on_complete` 1회) 또는 에러(`on_error` 1회).
//! 첫 조회는 즉시, 이후 `interval`마다 조회한다.
//!
//! 실패 정책:
//! - 일시적 에러(`CoreError::is_transient`)는 연속 `max_consecutive_failures`회까지 허용
//! - 성공하면 연속 실패 횟수 초기화
//! - 그 외 에러(파싱, 인증, 미발견)는 즉시 에러 상태
//! - 전체 추적 시간이 `max_duration`을 넘으면 `CoreError::Timeout`
//!
//! 콜백은 해당 작업의 구독자 잠금을 잡은 채 호출된다. 그래서 `stop_polling`이나
//! `unsubscribe`가 반환된 뒤에는 그 구독자의 콜백이 호출되지 않는다.
//! 콜백 안에서 같은 작업의 폴링을 멈추거나 구독을 해제하면 안 된다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hostpanel_core::config::PollerConfig;
use hostpanel_core::error::CoreError;
use hostpanel_core::models::operation::{Operation, OperationKind};
use hostpanel_core::models::server::ServerRef;
use hostpanel_core::ports::api_client::PanelApi;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 폴링 설정
#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    pub max_consecutive_failures: u32,
    pub max_duration: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}

impl From<&PollerConfig> for PollerSettings {
    fn from(config: &PollerConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            max_duration: Duration::from_secs(config.max_duration_secs),
        }
    }
}

/// 구독 식별자. 구독 해제 시 사용
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type UpdateFn = Box<dyn FnMut(&Operation) + Send>;
type CompleteFn = Box<dyn FnOnce(Operation) + Send>;
type ErrorFn = Box<dyn FnOnce(CoreError) + Send>;

struct Subscriber {
    id: SubscriptionId,
    on_update: UpdateFn,
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

#[derive(Default)]
struct Subscribers {
    /// 닫힌 뒤에는 구독 추가도 콜백 호출도 없다
    closed: bool,
    /// 마지막으로 조회한 작업 상태. 늦게 붙은 구독자에게 바로 전달한다
    latest: Option<Operation>,
    list: Vec<Subscriber>,
}

impl Subscribers {
    fn close(&mut self) {
        self.closed = true;
        self.list.clear();
    }
}

type SharedSubscribers = Arc<Mutex<Subscribers>>;

struct ActivePoll {
    task: JoinHandle<()>,
    subscribers: SharedSubscribers,
}

type ActiveMap = Mutex<HashMap<String, ActivePoll>>;

/// 같은 폴링 항목이 아직 추적 목록에 있으면 빼서 돌려준다
fn take_if_same(
    active: &ActiveMap,
    operation_id: &str,
    subscribers: &SharedSubscribers,
) -> Option<ActivePoll> {
    let mut active = active.lock();
    let same = active
        .get(operation_id)
        .is_some_and(|poll| Arc::ptr_eq(&poll.subscribers, subscribers));
    if same {
        active.remove(operation_id)
    } else {
        None
    }
}

/// 여러 구독자에게 같은 에러를 넘기기 위한 복제
fn copy_error(error: &CoreError) -> CoreError {
    match error {
        CoreError::Config(m) => CoreError::Config(m.clone()),
        CoreError::Auth(m) => CoreError::Auth(m.clone()),
        CoreError::NotFound { resource_type, id } => CoreError::NotFound {
            resource_type: resource_type.clone(),
            id: id.clone(),
        },
        CoreError::Network(m) => CoreError::Network(m.clone()),
        CoreError::Transport(m) => CoreError::Transport(m.clone()),
        CoreError::RateLimit { retry_after_secs } => CoreError::RateLimit {
            retry_after_secs: *retry_after_secs,
        },
        CoreError::ServiceUnavailable(m) => CoreError::ServiceUnavailable(m.clone()),
        CoreError::Parse(m) => CoreError::Parse(m.clone()),
        CoreError::InvalidResponse(m) => CoreError::InvalidResponse(m.clone()),
        CoreError::OperationFailed { job_id, message } => CoreError::OperationFailed {
            job_id: job_id.clone(),
            message: message.clone(),
        },
        CoreError::Timeout { timeout_secs } => CoreError::Timeout {
            timeout_secs: *timeout_secs,
        },
        CoreError::Internal(m) => CoreError::Internal(m.clone()),
        other => CoreError::Internal(other.to_string()),
    }
}

/// 작업 폴러
pub struct OperationPoller {
    api: Arc<dyn PanelApi>,
    settings: PollerSettings,
    active: Arc<ActiveMap>,
    next_subscription: AtomicU64,
}

impl OperationPoller {
    pub fn new(api: Arc<dyn PanelApi>, settings: PollerSettings) -> Self {
        Self {
            api,
            settings,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// 폴링 시작 또는 진행 중인 폴링에 구독 추가.
    ///
    /// 이미 추적 중인 ID면 새 타이머를 만들지 않고 콜백만 등록한다. 이때 마지막으로
    /// 조회한 상태가 있으면 `on_update`가 바로 한 번 호출된다.
    /// `on_update`는 성공한 조회마다, `on_complete`는 종료 상태에서 한 번,
    /// `on_error`는 추적 실패 시 한 번 호출된다.
    pub fn start_polling<U, C, E>(
        &self,
        target: ServerRef,
        operation_id: &str,
        kind: OperationKind,
        on_update: U,
        on_complete: C,
        on_error: E,
    ) -> SubscriptionId
    where
        U: FnMut(&Operation) + Send + 'static,
        C: FnOnce(Operation) + Send + 'static,
        E: FnOnce(CoreError) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut subscriber = Subscriber {
            id,
            on_update: Box::new(on_update),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        };

        loop {
            let existing = {
                let mut active = self.active.lock();
                match active.get(operation_id) {
                    Some(poll) => poll.subscribers.clone(),
                    None => {
                        let subscribers = Arc::new(Mutex::new(Subscribers {
                            list: vec![subscriber],
                            ..Subscribers::default()
                        }));
                        let job = PollJob {
                            api: self.api.clone(),
                            target,
                            operation: Operation::new(operation_id, kind),
                            settings: self.settings,
                            active: Arc::downgrade(&self.active),
                            subscribers: subscribers.clone(),
                        };
                        let task = tokio::spawn(job.run());
                        active.insert(
                            operation_id.to_string(),
                            ActivePoll { task, subscribers },
                        );
                        info!("작업 폴링 시작: {operation_id}");
                        return id;
                    }
                }
            };

            let mut subscribers = existing.lock();
            if !subscribers.closed {
                if let Some(latest) = &subscribers.latest {
                    (subscriber.on_update)(latest);
                }
                subscribers.list.push(subscriber);
                debug!(
                    "진행 중인 폴링에 구독 추가: {operation_id} ({}개)",
                    subscribers.list.len()
                );
                return id;
            }
            drop(subscribers);

            // 마지막 구독이 막 해제된 항목. 치우고 새로 시작한다
            if let Some(stale) = take_if_same(&self.active, operation_id, &existing) {
                stale.task.abort();
            }
        }
    }

    /// 구독 하나 해제. 남은 구독자가 없으면 폴링도 멈춘다. 해제했으면 `true`.
    pub fn unsubscribe(&self, operation_id: &str, subscription: SubscriptionId) -> bool {
        let Some(subscribers) = self
            .active
            .lock()
            .get(operation_id)
            .map(|poll| poll.subscribers.clone())
        else {
            return false;
        };

        let last = {
            let mut guard = subscribers.lock();
            let before = guard.list.len();
            guard.list.retain(|s| s.id != subscription);
            if guard.list.len() == before {
                return false;
            }
            if guard.list.is_empty() {
                guard.close();
                true
            } else {
                false
            }
        };

        if last {
            if let Some(poll) = take_if_same(&self.active, operation_id, &subscribers) {
                poll.task.abort();
            }
            debug!("마지막 구독 해제, 작업 폴링 중단: {operation_id}");
        }
        true
    }

    /// 모든 구독자를 포함해 폴링 중단. 추적 중이었으면 `true`.
    pub fn stop_polling(&self, operation_id: &str) -> bool {
        let Some(poll) = self.active.lock().remove(operation_id) else {
            return false;
        };
        poll.task.abort();
        // 실행 중인 콜백이 있으면 끝날 때까지 기다린다
        poll.subscribers.lock().close();
        debug!("작업 폴링 중단: {operation_id}");
        true
    }

    /// 모든 폴링 중단
    pub fn stop_all(&self) {
        let drained: Vec<ActivePoll> = self.active.lock().drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            debug!("작업 폴링 {}개 중단", drained.len());
        }
        for poll in drained {
            poll.task.abort();
            poll.subscribers.lock().close();
        }
    }

    /// 추적 중 여부
    pub fn is_polling(&self, operation_id: &str) -> bool {
        self.active.lock().contains_key(operation_id)
    }

    /// 추적 중인 작업 수
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// 작업의 구독자 수
    pub fn subscriber_count(&self, operation_id: &str) -> usize {
        let subscribers = self
            .active
            .lock()
            .get(operation_id)
            .map(|poll| poll.subscribers.clone());
        subscribers.map_or(0, |s| s.lock().list.len())
    }
}

impl Drop for OperationPoller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

struct PollJob {
    api: Arc<dyn PanelApi>,
    target: ServerRef,
    operation: Operation,
    settings: PollerSettings,
    active: Weak<ActiveMap>,
    subscribers: SharedSubscribers,
}

impl PollJob {
    /// 추적 목록에서 이 폴링을 뺀다. 이미 중단된 폴링이면 `false`.
    fn retire(&self) -> bool {
        self.active.upgrade().is_some_and(|active| {
            take_if_same(&active, &self.operation.id, &self.subscribers).is_some()
        })
    }

    /// 구독자마다 진행 상황 전달. 중단된 폴링이면 `false`.
    fn notify_update(&self) -> bool {
        let mut guard = self.subscribers.lock();
        if guard.closed {
            return false;
        }
        guard.latest = Some(self.operation.clone());
        for subscriber in guard.list.iter_mut() {
            (subscriber.on_update)(&self.operation);
        }
        true
    }

    fn complete(&self) {
        if !self.retire() {
            return;
        }
        let mut guard = self.subscribers.lock();
        guard.closed = true;
        for subscriber in guard.list.drain(..) {
            (subscriber.on_complete)(self.operation.clone());
        }
    }

    fn fail(&self, error: CoreError) {
        if !self.retire() {
            return;
        }
        let mut guard = self.subscribers.lock();
        guard.closed = true;
        let mut list: Vec<Subscriber> = guard.list.drain(..).collect();
        if let Some(last) = list.pop() {
            for subscriber in list {
                (subscriber.on_error)(copy_error(&error));
            }
            (last.on_error)(error);
        }
    }

    async fn run(mut self) {
        let started = Instant::now();
        let mut failures = 0u32;
        let id = self.operation.id.clone();

        loop {
            if started.elapsed() >= self.settings.max_duration {
                warn!("작업 추적 시간 초과: {id}");
                self.fail(CoreError::Timeout {
                    timeout_secs: self.settings.max_duration.as_secs(),
                });
                return;
            }

            match self.api.job_status(&self.target, &id).await {
                Ok(job) => {
                    failures = 0;
                    self.operation.apply(&job);
                    if !self.notify_update() {
                        return;
                    }

                    if self.operation.is_completed() {
                        info!("작업 종료: {id} ({})", self.operation.status);
                        self.complete();
                        return;
                    }
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= self.settings.max_consecutive_failures {
                        warn!("작업 상태 조회 연속 {failures}회 실패, 추적 중단: {id}: {e}");
                        self.fail(e);
                        return;
                    }
                    debug!("작업 상태 조회 일시 실패 ({failures}회): {id}: {e}");
                }
                Err(e) => {
                    warn!("작업 상태 조회 실패, 추적 중단: {id}: {e}");
                    self.fail(e);
                    return;
                }
            }

            tokio::time::sleep(self.settings.interval).await;
        }
    }
}
