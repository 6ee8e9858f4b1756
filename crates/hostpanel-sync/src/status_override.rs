//! 상태 표시 덮어쓰기.
//!
//! 전원 명령 직후처럼 잠시 다른 문구를 보여줘야 할 때 사용한다.
//! 세션마다 브로드캐스터 하나, 렌더러 하나, 활성 덮어쓰기 최대 하나.

use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 덮어쓰기 유지 시간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDuration {
    /// 지정 초 후 자동 해제
    Seconds(u64),
    /// 직접 해제하거나 다음 덮어쓰기가 올 때까지 유지 (`-`)
    Indefinite,
}

impl FromStr for OverrideDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "-" {
            return Ok(Self::Indefinite);
        }
        s.parse::<u64>()
            .map(Self::Seconds)
            .map_err(|_| format!("잘못된 유지 시간: {s} (초 단위 정수 또는 '-')"))
    }
}

/// 활성 덮어쓰기
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOverride {
    pub text: String,
    pub color: String,
    /// `None`이면 무기한
    pub expires_at: Option<Instant>,
}

type Renderer = Arc<dyn Fn(Option<&StatusOverride>) + Send + Sync>;

#[derive(Default)]
struct OverrideState {
    renderer: Option<Renderer>,
    current: Option<StatusOverride>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// 상태 표시 덮어쓰기 브로드캐스터
#[derive(Default)]
pub struct StatusOverrideBroadcaster {
    state: Arc<Mutex<OverrideState>>,
}

impl StatusOverrideBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 렌더러 등록. 기존 렌더러는 교체된다.
    pub fn register_renderer<F>(&self, renderer: F)
    where
        F: Fn(Option<&StatusOverride>) + Send + Sync + 'static,
    {
        let renderer: Renderer = Arc::new(renderer);
        let current = {
            let mut state = self.state.lock();
            if state.renderer.is_some() {
                debug!("상태 덮어쓰기 렌더러 교체");
            }
            state.renderer = Some(renderer.clone());
            state.current.clone()
        };
        renderer(current.as_ref());
    }

    /// 렌더러 등록 여부
    pub fn has_renderer(&self) -> bool {
        self.state.lock().renderer.is_some()
    }

    /// 덮어쓰기 설정. 렌더러가 없으면 아무 일도 하지 않고 `false`.
    ///
    /// 이전 덮어쓰기의 자동 해제 타이머는 취소된다.
    /// `Seconds`를 쓰려면 tokio 런타임 안에서 호출해야 한다.
    pub fn set_status(&self, text: &str, color: &str, duration: OverrideDuration) -> bool {
        let (renderer, current) = {
            let mut state = self.state.lock();
            let Some(renderer) = state.renderer.clone() else {
                warn!("상태 덮어쓰기 렌더러가 아직 없음, 무시: {text}");
                return false;
            };

            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }

            let expires_at = match duration {
                OverrideDuration::Seconds(secs) => {
                    let delay = Duration::from_secs(secs);
                    state.timer = Some(spawn_clear_timer(
                        Arc::downgrade(&self.state),
                        state.generation,
                        delay,
                    ));
                    Some(Instant::now() + delay)
                }
                OverrideDuration::Indefinite => None,
            };

            let current = StatusOverride {
                text: text.to_string(),
                color: color.to_string(),
                expires_at,
            };
            state.current = Some(current.clone());
            (renderer, current)
        };

        debug!("상태 덮어쓰기: {} ({:?})", current.text, duration);
        renderer(Some(&current));
        true
    }

    /// 현재 덮어쓰기 해제
    pub fn clear(&self) {
        let renderer = {
            let mut state = self.state.lock();
            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            if state.current.take().is_none() {
                return;
            }
            state.renderer.clone()
        };
        if let Some(render) = renderer {
            render(None);
        }
    }

    /// 현재 덮어쓰기
    pub fn current(&self) -> Option<StatusOverride> {
        self.state.lock().current.clone()
    }
}

impl Drop for StatusOverrideBroadcaster {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}

/// 자동 해제 타이머. 만료 시점에 세대가 바뀌었으면 아무것도 하지 않는다.
fn spawn_clear_timer(
    state: Weak<Mutex<OverrideState>>,
    generation: u64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(state) = state.upgrade() else {
            return;
        };
        let renderer = {
            let mut state = state.lock();
            if state.generation != generation {
                return;
            }
            state.current = None;
            state.timer = None;
            state.renderer.clone()
        };
        debug!("상태 덮어쓰기 만료");
        if let Some(render) = renderer {
            render(None);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_recorder() -> (StatusOverrideBroadcaster, Arc<Mutex<Vec<Option<String>>>>) {
        let broadcaster = StatusOverrideBroadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = seen.clone();
        broadcaster.register_renderer(move |o| out.lock().push(o.map(|o| o.text.clone())));
        seen.lock().clear();
        (broadcaster, seen)
    }

    #[test]
    fn parses_duration() {
        assert_eq!("-".parse::<OverrideDuration>(), Ok(OverrideDuration::Indefinite));
        assert_eq!("5".parse::<OverrideDuration>(), Ok(OverrideDuration::Seconds(5)));
        assert!("soon".parse::<OverrideDuration>().is_err());
    }

    #[test]
    fn set_before_renderer_is_noop() {
        let broadcaster = StatusOverrideBroadcaster::new();
        assert!(!broadcaster.set_status("Starting", "green", OverrideDuration::Indefinite));
        assert!(broadcaster.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn override_clears_after_duration() {
        let (broadcaster, seen) = with_recorder();
        assert!(broadcaster.set_status("Restarting", "blue", OverrideDuration::Seconds(5)));
        assert_eq!(broadcaster.current().unwrap().text, "Restarting");

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(broadcaster.current().is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(broadcaster.current().is_none());
        assert_eq!(*seen.lock(), vec![Some("Restarting".to_string()), None]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_clear_newer_override() {
        let (broadcaster, seen) = with_recorder();
        broadcaster.set_status("Stopping", "yellow", OverrideDuration::Seconds(2));
        tokio::time::sleep(Duration::from_secs(1)).await;
        broadcaster.set_status("Killing", "red", OverrideDuration::Seconds(5));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(broadcaster.current().unwrap().text, "Killing");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(broadcaster.current().is_none());
        assert_eq!(
            *seen.lock(),
            vec![Some("Stopping".to_string()), Some("Killing".to_string()), None]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn indefinite_override_stays_until_cleared() {
        let (broadcaster, seen) = with_recorder();
        broadcaster.set_status("Maintenance", "gray", OverrideDuration::Indefinite);
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert!(broadcaster.current().unwrap().expires_at.is_none());

        broadcaster.clear();
        broadcaster.clear();
        assert!(broadcaster.current().is_none());
        assert_eq!(*seen.lock(), vec![Some("Maintenance".to_string()), None]);
    }
}
