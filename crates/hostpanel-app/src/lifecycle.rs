//! 라이프사이클 관리.
//!
//! 종료 신호 브로드캐스트와 OS 시그널 대기.

use tokio::sync::watch;
use tracing::{info, warn};

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// 종료 수신기
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 종료 신호 발송
    pub fn shutdown(&self) {
        info!("종료 신호 발송");
        self.shutdown_tx.send_replace(true);
    }

    /// 종료 신호가 이미 발송되었는지
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// OS 시그널 대기 (SIGINT, SIGTERM) 후 종료 신호 발송
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
            ) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => info!("SIGINT 수신"),
                        _ = sigterm.recv() => info!("SIGTERM 수신"),
                    }
                }
                _ => {
                    warn!("시그널 핸들러 등록 실패, Ctrl+C만 대기");
                    wait_ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        wait_ctrl_c().await;

        self.shutdown();
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C 수신"),
        Err(e) => warn!("Ctrl+C 핸들러 등록 실패: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let lm = LifecycleManager::new();
        assert!(!*lm.subscribe().borrow());
        assert!(!lm.is_shutting_down());
    }

    #[tokio::test]
    async fn shutdown_reaches_subscribers() {
        let lm = LifecycleManager::new();
        let mut rx = lm.subscribe();
        lm.shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(lm.is_shutting_down());
    }
}
