//! 콘솔 소켓 연결 상태 모델.
//!
//! 상태를 바꾸는 쪽은 [`StatusPublisher`] 하나뿐이다 (`Clone` 불가).
//! 읽는 쪽은 콜백 구독 또는 `watch` 수신기로 원하는 만큼 붙을 수 있다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hostpanel_core::models::connection::ConnectionStatus;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

type Callback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

struct ModelShared {
    tx: watch::Sender<ConnectionStatus>,
    callbacks: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

/// 연결 상태 모델 (읽기 전용 뷰, 복제 가능)
#[derive(Clone)]
pub struct ConnectionStatusModel {
    shared: Arc<ModelShared>,
}

impl ConnectionStatusModel {
    /// 새 모델과 그 유일한 발행자. 초기 상태는 `Connecting`.
    pub fn new() -> (Self, StatusPublisher) {
        let (tx, _) = watch::channel(ConnectionStatus::Connecting);
        let shared = Arc::new(ModelShared {
            tx,
            callbacks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        });
        (
            Self {
                shared: shared.clone(),
            },
            StatusPublisher { shared },
        )
    }

    /// 현재 상태
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.tx.borrow()
    }

    /// 비동기 소비자용 수신기
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.tx.subscribe()
    }

    /// 콜백 구독. 현재 상태로 즉시 한 번 호출된다.
    ///
    /// 반환된 [`Subscription`]이 drop되면 구독이 해제된다.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback = Arc::new(callback);
        self.shared.callbacks.lock().push((id, callback.clone()));
        callback(self.status());
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// 콜백 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.shared.callbacks.lock().len()
    }
}

/// 연결 상태 발행자
pub struct StatusPublisher {
    shared: Arc<ModelShared>,
}

impl StatusPublisher {
    /// 상태 변경. 같은 상태는 다시 알리지 않으며, 변경되었으면 `true`.
    ///
    /// 상태 기계에 없는 전이도 마지막 쓰기를 따르되 경고를 남긴다.
    pub fn set_status(&self, next: ConnectionStatus) -> bool {
        let current = *self.shared.tx.borrow();
        if current == next {
            debug!("연결 상태 유지: {next}");
            return false;
        }
        if !current.can_transition_to(next) {
            warn!("예상하지 못한 연결 상태 전이: {current} → {next}");
        }
        self.shared.tx.send_replace(next);
        info!("연결 상태 변경: {current} → {next}");

        let callbacks: Vec<Callback> = self
            .shared
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(next);
        }
        true
    }

    /// 현재 상태
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.tx.borrow()
    }
}

/// 콜백 구독 핸들
pub struct Subscription {
    shared: Weak<ModelShared>,
    id: u64,
}

impl Subscription {
    /// 명시적 구독 해제
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.callbacks.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// 연결 상태 표시기
///
/// `Connected`가 되면 `hide_after` 뒤에 숨는다. 다른 상태는 즉시 보이게 하고,
/// 숨기 전에 상태가 바뀌면 타이머를 다시 잡는다.
pub struct ConnectionIndicator {
    visible: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ConnectionIndicator {
    /// 모델을 구독하는 표시기 생성
    pub fn spawn(model: &ConnectionStatusModel, hide_after: Duration) -> Self {
        let (visible_tx, visible) = watch::channel(true);
        let mut rx = model.watch();

        let task = tokio::spawn(async move {
            let mut hide_at = hide_deadline(*rx.borrow_and_update(), hide_after);
            loop {
                let deadline = hide_at;
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = *rx.borrow_and_update();
                        visible_tx.send_replace(true);
                        hide_at = hide_deadline(status, hide_after);
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        debug!("연결 표시기 숨김");
                        visible_tx.send_replace(false);
                        hide_at = None;
                    }
                }
            }
        });

        Self { visible, task }
    }

    /// 현재 표시 여부
    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    /// 표시 여부 수신기
    pub fn visibility(&self) -> watch::Receiver<bool> {
        self.visible.clone()
    }
}

impl Drop for ConnectionIndicator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn hide_deadline(status: ConnectionStatus, hide_after: Duration) -> Option<Instant> {
    (status == ConnectionStatus::Connected).then(|| Instant::now() + hide_after)
}
