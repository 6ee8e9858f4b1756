//! 작업 진행 대화상자.
//!
//! 폴러로 작업 하나를 추적하고 상태를 `watch` 채널로 내보낸다.
//! 작업이 끝나면 `auto_close` 뒤에 스스로 닫힌다. 직접 닫기, 다른 작업으로 교체,
//! drop 시에는 닫힘 타이머를 취소하고 자기 구독만 해제한다. 다른 소비자가 같은 작업을
//! 추적 중이면 폴링은 계속된다.

use std::sync::{Arc, Weak};
use std::time::Duration;

use hostpanel_core::error::CoreError;
use hostpanel_core::models::operation::{Operation, OperationKind};
use hostpanel_core::models::server::ServerRef;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::poller::{OperationPoller, SubscriptionId};

/// 대화상자 상태
#[derive(Debug, Clone, PartialEq)]
pub enum DialogState {
    /// 닫힘
    Closed,
    /// 작업 진행 또는 종료 표시 중
    Open(Operation),
    /// 추적 실패 (직접 닫을 때까지 유지)
    Errored { operation_id: String, message: String },
}

#[derive(Default)]
struct DialogInner {
    operation_id: Option<String>,
    subscription: Option<SubscriptionId>,
    generation: u64,
    close_timer: Option<JoinHandle<()>>,
}

struct DialogShared {
    inner: Mutex<DialogInner>,
    state: watch::Sender<DialogState>,
}

impl DialogShared {
    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }
}

/// 작업 진행 대화상자
pub struct OperationDialog {
    poller: Arc<OperationPoller>,
    target: ServerRef,
    auto_close: Duration,
    shared: Arc<DialogShared>,
}

impl OperationDialog {
    pub fn new(poller: Arc<OperationPoller>, target: ServerRef, auto_close: Duration) -> Self {
        let (state, _) = watch::channel(DialogState::Closed);
        Self {
            poller,
            target,
            auto_close,
            shared: Arc::new(DialogShared {
                inner: Mutex::new(DialogInner::default()),
                state,
            }),
        }
    }

    /// 현재 상태
    pub fn state(&self) -> DialogState {
        self.shared.state.borrow().clone()
    }

    /// 상태 수신기
    pub fn watch(&self) -> watch::Receiver<DialogState> {
        self.shared.state.subscribe()
    }

    /// 추적 중인 작업 ID
    pub fn operation_id(&self) -> Option<String> {
        self.shared.inner.lock().operation_id.clone()
    }

    /// 작업 추적 시작. 이전 작업이 있으면 대체한다.
    pub fn track(&self, operation_id: &str, kind: OperationKind) {
        let generation = self.reset();
        self.shared.inner.lock().operation_id = Some(operation_id.to_string());
        self.shared
            .state
            .send_replace(DialogState::Open(Operation::new(operation_id, kind)));

        let on_update = {
            let shared = Arc::downgrade(&self.shared);
            move |operation: &Operation| {
                if let Some(shared) = shared.upgrade() {
                    if shared.is_current(generation) {
                        shared.state.send_replace(DialogState::Open(operation.clone()));
                    }
                }
            }
        };
        let on_complete = {
            let shared = Arc::downgrade(&self.shared);
            let auto_close = self.auto_close;
            move |operation: Operation| schedule_close(shared, generation, auto_close, operation)
        };
        let on_error = {
            let shared = Arc::downgrade(&self.shared);
            let operation_id = operation_id.to_string();
            move |error: CoreError| {
                if let Some(shared) = shared.upgrade() {
                    if shared.is_current(generation) {
                        shared.state.send_replace(DialogState::Errored {
                            operation_id,
                            message: error.to_string(),
                        });
                    }
                }
            }
        };

        let subscription = self.poller.start_polling(
            self.target.clone(),
            operation_id,
            kind,
            on_update,
            on_complete,
            on_error,
        );
        let mut inner = self.shared.inner.lock();
        if inner.generation == generation {
            inner.subscription = Some(subscription);
        } else {
            drop(inner);
            self.poller.unsubscribe(operation_id, subscription);
        }
    }

    /// 직접 닫기
    pub fn dismiss(&self) {
        self.reset();
        self.shared.state.send_replace(DialogState::Closed);
    }

    /// 세대를 올리고 이전 작업의 구독과 닫힘 타이머를 정리한다.
    fn reset(&self) -> u64 {
        let (previous, subscription, timer, generation) = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            (
                inner.operation_id.take(),
                inner.subscription.take(),
                inner.close_timer.take(),
                inner.generation,
            )
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        if let (Some(id), Some(subscription)) = (previous, subscription) {
            self.poller.unsubscribe(&id, subscription);
        }
        generation
    }
}

impl Drop for OperationDialog {
    fn drop(&mut self) {
        self.reset();
    }
}

/// 작업 종료 표시 후 자동 닫힘 예약
fn schedule_close(
    shared: Weak<DialogShared>,
    generation: u64,
    auto_close: Duration,
    operation: Operation,
) {
    let Some(strong) = shared.upgrade() else {
        return;
    };
    let mut inner = strong.inner.lock();
    if inner.generation != generation {
        return;
    }
    strong.state.send_replace(DialogState::Open(operation));

    let weak = shared.clone();
    inner.close_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(auto_close).await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.operation_id = None;
        inner.subscription = None;
        inner.close_timer = None;
        shared.state.send_replace(DialogState::Closed);
        debug!("작업 대화상자 자동 닫힘");
    }));
}
