//! 콘솔 소켓 연결 상태와 이벤트 모델.

use serde::{Deserialize, Serialize};

use super::resource::ProcessState;

/// 콘솔 소켓 연결 상태
///
/// 전이: Connecting → Connected (소켓 open + 인증 응답),
/// 임의 상태 → Disconnected (에러/종료), Disconnected → Connecting (재연결 예약).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// 연결 중
    Connecting,
    /// 연결됨 (인증 완료)
    Connected,
    /// 연결 끊김
    Disconnected,
}

impl ConnectionStatus {
    /// 상태 기계가 허용하는 전이인지 확인
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        matches!(
            (self, next),
            (ConnectionStatus::Connecting, ConnectionStatus::Connected)
                | (_, ConnectionStatus::Disconnected)
                | (ConnectionStatus::Disconnected, ConnectionStatus::Connecting)
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// 콘솔 소켓에서 올라오는 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// 연결 상태 전이
    Connection(ConnectionStatus),
    /// 전원 상태 변경 (`status` 이벤트)
    PowerState(ProcessState),
    /// 콘솔 출력 한 줄
    Output(String),
    /// 데몬/토큰 에러
    Error(String),
}
