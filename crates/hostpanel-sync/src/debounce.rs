//! 디바운스 상태 싱크.
//!
//! 고정 윈도우 동안 들어온 값 중 마지막 값만 렌더러에 전달한다.
//! 윈도우는 유휴 상태에서 첫 `push`가 들어올 때 시작하며,
//! 이후 `push`로 연장되지 않는다. 렌더러는 윈도우당 최대 한 번 호출된다.
//!
//! 소비자마다 자기 싱크를 소유한다. 싱크가 drop되면 대기 중인 전달도 취소된다.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

type Renderer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SinkState<T> {
    pending: Option<T>,
    timer: Option<JoinHandle<()>>,
    renderers: Vec<Renderer<T>>,
    cancelled: bool,
}

struct SinkInner<T> {
    window: Duration,
    state: Mutex<SinkState<T>>,
}

impl<T: Send + 'static> SinkInner<T> {
    fn push(self: &Arc<Self>, value: T) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        state.pending = Some(value);
        if state.timer.is_none() {
            let weak = Arc::downgrade(self);
            let window = self.window;
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if let Some(inner) = weak.upgrade() {
                    inner.flush();
                }
            }));
        }
    }

    fn flush(&self) {
        let (value, renderers) = {
            let mut state = self.state.lock();
            state.timer = None;
            if state.cancelled {
                return;
            }
            match state.pending.take() {
                Some(value) => (value, state.renderers.clone()),
                None => return,
            }
        };
        trace!("디바운스 윈도우 종료, 렌더러 {}개에 전달", renderers.len());
        for render in renderers {
            render(&value);
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        state.pending = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

/// 디바운스 싱크
pub struct DebouncedStateSink<T> {
    inner: Arc<SinkInner<T>>,
}

impl<T: Send + 'static> DebouncedStateSink<T> {
    /// 새 싱크. `window`는 전달 간격 (기본 100ms).
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                window,
                state: Mutex::new(SinkState {
                    pending: None,
                    timer: None,
                    renderers: Vec::new(),
                    cancelled: false,
                }),
            }),
        }
    }

    /// 렌더러 등록
    pub fn on_render<F>(&self, render: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.state.lock().renderers.push(Arc::new(render));
    }

    /// 값 투입. 취소된 뒤에는 무시된다.
    ///
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn push(&self, value: T) {
        self.inner.push(value);
    }

    /// 스트림 리스너 등에 넘길 수 있는 약한 참조 투입기
    pub fn pusher(&self) -> SinkPusher<T> {
        SinkPusher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// 대기 중인 전달 취소. 이후 `push`는 무시된다.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// 전달 대기 중인 값이 있는지
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }
}

impl<T> Drop for DebouncedStateSink<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.cancelled = true;
        state.pending = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

/// 싱크에 대한 약한 참조. 싱크가 사라지면 `push`는 아무 일도 하지 않는다.
pub struct SinkPusher<T> {
    inner: Weak<SinkInner<T>>,
}

impl<T> Clone for SinkPusher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> SinkPusher<T> {
    /// 값 투입
    pub fn push(&self, value: T) {
        if let Some(inner) = self.inner.upgrade() {
            inner.push(value);
        }
    }
}
