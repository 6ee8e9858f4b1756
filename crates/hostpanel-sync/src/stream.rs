//! 리소스 스트림 구독 레지스트리.
//!
//! 대상(서버 ID)마다 SSE 연결을 정확히 하나만 유지한다.
//! 첫 구독에서 연결 태스크를 만들고, 마지막 핸들이 닫히면 연결을 끊는다.
//!
//! 연결이 에러로 끊기면 구독자에게 `Degraded`를 알리고
//! 고정 지연 후 한 번 재연결한다. 재시도 횟수 제한은 없다.
//! 메시지 파싱 실패는 연결을 닫지 않고 `ParseError`로만 알린다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use hostpanel_core::models::resource::ResourceSnapshot;
use hostpanel_core::ports::stream::EventStreamSource;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 구독자에게 전달되는 스트림 이벤트
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// 연결 수립
    Connected,
    /// 새 리소스 스냅샷
    Snapshot(Arc<ResourceSnapshot>),
    /// 메시지 하나를 해석하지 못함 (연결은 유지)
    ParseError(String),
    /// 연결 끊김, `retry_in` 후 재연결
    Degraded { error: String, retry_in: Duration },
}

/// 대상별 연결 상태
struct Subscription {
    id: u64,
    refs: usize,
    events: broadcast::Sender<StreamEvent>,
    last_error: Arc<Mutex<Option<String>>>,
    task: JoinHandle<()>,
}

struct RegistryInner {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    /// 핸들 하나의 참조 해제. `shutdown` 이후 새로 만들어진 구독은 건드리지 않는다.
    fn release(&self, target_id: &str, subscription_id: u64) {
        let mut subs = self.subscriptions.lock();
        let Some(sub) = subs.get_mut(target_id) else {
            return;
        };
        if sub.id != subscription_id {
            return;
        }
        sub.refs = sub.refs.saturating_sub(1);
        if sub.refs == 0 {
            if let Some(sub) = subs.remove(target_id) {
                sub.task.abort();
            }
            info!("리소스 스트림 구독 해제: {target_id}");
        }
    }
}

/// 리소스 스트림 구독 레지스트리
pub struct StreamRegistry {
    source: Arc<dyn EventStreamSource>,
    reconnect_delay: Duration,
    channel_capacity: usize,
    inner: Arc<RegistryInner>,
}

impl StreamRegistry {
    /// 새 레지스트리
    ///
    /// `reconnect_delay`: 연결이 끊긴 뒤 재연결까지 고정 대기 시간
    pub fn new(
        source: Arc<dyn EventStreamSource>,
        reconnect_delay: Duration,
        channel_capacity: usize,
    ) -> Self {
        Self {
            source,
            reconnect_delay,
            channel_capacity: channel_capacity.max(1),
            inner: Arc::new(RegistryInner {
                subscriptions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// 대상 구독. 같은 대상의 두 번째 구독부터는 기존 연결을 공유한다.
    ///
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn subscribe(&self, target_id: &str) -> StreamHandle {
        let mut subs = self.inner.subscriptions.lock();
        let sub = subs.entry(target_id.to_string()).or_insert_with(|| {
            info!("리소스 스트림 구독 시작: {target_id}");
            let (events, _) = broadcast::channel(self.channel_capacity);
            let last_error = Arc::new(Mutex::new(None));
            let task = tokio::spawn(run_connection(
                self.source.clone(),
                target_id.to_string(),
                events.clone(),
                last_error.clone(),
                self.reconnect_delay,
            ));
            Subscription {
                id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
                refs: 0,
                events,
                last_error,
                task,
            }
        });
        sub.refs += 1;

        StreamHandle {
            target_id: target_id.to_string(),
            subscription_id: sub.id,
            events: sub.events.clone(),
            registry: self.inner.clone(),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 활성 구독 대상 수
    pub fn active_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    /// 대상 구독 여부
    pub fn is_active(&self, target_id: &str) -> bool {
        self.inner.subscriptions.lock().contains_key(target_id)
    }

    /// 대상의 구독 핸들 수
    pub fn subscriber_count(&self, target_id: &str) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(target_id)
            .map_or(0, |sub| sub.refs)
    }

    /// 마지막 연결 에러
    pub fn last_error(&self, target_id: &str) -> Option<String> {
        self.inner
            .subscriptions
            .lock()
            .get(target_id)
            .and_then(|sub| sub.last_error.lock().clone())
    }

    /// 모든 연결 종료. 남은 핸들의 `close()`는 아무 일도 하지 않는다.
    pub fn shutdown(&self) {
        let drained: Vec<(String, Subscription)> =
            self.inner.subscriptions.lock().drain().collect();
        for (target_id, sub) in drained {
            sub.task.abort();
            debug!("리소스 스트림 강제 종료: {target_id}");
        }
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 연결 태스크. 레지스트리가 abort할 때까지 재연결을 반복한다.
async fn run_connection(
    source: Arc<dyn EventStreamSource>,
    target_id: String,
    events: broadcast::Sender<StreamEvent>,
    last_error: Arc<Mutex<Option<String>>>,
    reconnect_delay: Duration,
) {
    loop {
        let error = match source.open(&target_id).await {
            Ok(mut stream) => {
                debug!("리소스 스트림 연결됨: {target_id}");
                *last_error.lock() = None;
                let _ = events.send(StreamEvent::Connected);

                loop {
                    match stream.next().await {
                        Some(Ok(data)) => match ResourceSnapshot::from_stream_message(&data) {
                            Ok(snapshot) => {
                                let _ = events.send(StreamEvent::Snapshot(Arc::new(snapshot)));
                            }
                            Err(e) => {
                                warn!("리소스 메시지 파싱 실패 ({target_id}): {e}");
                                let _ = events.send(StreamEvent::ParseError(e.to_string()));
                            }
                        },
                        Some(Err(e)) => break e.to_string(),
                        None => break "서버가 스트림을 닫음".to_string(),
                    }
                }
            }
            Err(e) => e.to_string(),
        };

        warn!(
            "리소스 스트림 끊김 ({target_id}): {error}, {}ms 후 재연결",
            reconnect_delay.as_millis()
        );
        *last_error.lock() = Some(error.clone());
        let _ = events.send(StreamEvent::Degraded {
            error,
            retry_in: reconnect_delay,
        });

        tokio::time::sleep(reconnect_delay).await;
    }
}

/// 구독 핸들
///
/// 닫히거나 drop되면 등록된 리스너가 모두 중단되고 구독 참조가 해제된다.
pub struct StreamHandle {
    target_id: String,
    subscription_id: u64,
    events: broadcast::Sender<StreamEvent>,
    registry: Arc<RegistryInner>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl StreamHandle {
    /// 구독 대상 ID
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// 비동기 소비자용 이벤트 수신기
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// 스냅샷 리스너 등록
    pub fn on_snapshot<F>(&self, mut listener: F)
    where
        F: FnMut(Arc<ResourceSnapshot>) + Send + 'static,
    {
        self.on_event(move |event| {
            if let StreamEvent::Snapshot(snapshot) = event {
                listener(snapshot);
            }
        });
    }

    /// 모든 스트림 이벤트 리스너 등록
    pub fn on_event<F>(&self, mut listener: F)
    where
        F: FnMut(StreamEvent) + Send + 'static,
    {
        if self.is_closed() {
            debug!("닫힌 핸들에 리스너 등록 무시: {}", self.target_id);
            return;
        }
        let mut rx = self.events.subscribe();
        let target_id = self.target_id.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => listener(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("리스너 지연으로 이벤트 {skipped}개 건너뜀 ({target_id})");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.listeners.lock().push(task);
    }

    /// 닫힘 여부
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 구독 종료. 여러 번 호출해도 한 번만 처리된다.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in self.listeners.lock().drain(..) {
            task.abort();
        }
        self.registry.release(&self.target_id, self.subscription_id);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}
