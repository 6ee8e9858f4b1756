//! 실시간 스트림 포트.
//!
//! 구현: `hostpanel-network` crate (eventsource-stream, tokio-tungstenite)

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::connection::ConsoleEvent;

/// 원시 메시지 스트림. 항목은 SSE `data` 본문 또는 연결 수준 에러.
pub type RawMessageStream = BoxStream<'static, Result<String, CoreError>>;

/// SSE 연결 하나를 여는 소스
///
/// 재연결은 호출자(구독 레지스트리)가 담당한다.
/// 스트림이 `None`으로 끝나거나 `Err`를 내면 연결이 닫힌 것으로 본다.
#[async_trait]
pub trait EventStreamSource: Send + Sync {
    /// 대상 서버의 리소스 스트림 연결
    async fn open(&self, target_id: &str) -> Result<RawMessageStream, CoreError>;
}

/// 콘솔 웹소켓
#[async_trait]
pub trait ConsoleSocket: Send + Sync {
    /// 소켓 연결 및 이벤트 수신
    ///
    /// 수신된 이벤트를 `tx` 채널로 전송한다.
    /// 연결이 끊기면 고정 지연 후 재연결하며, `tx`가 닫히면 반환한다.
    async fn run(&self, server_id: &str, tx: mpsc::Sender<ConsoleEvent>) -> Result<(), CoreError>;
}
