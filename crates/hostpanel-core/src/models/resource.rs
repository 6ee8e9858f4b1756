//! 리소스 사용량 스냅샷 모델.
//!
//! `/resources/stream` SSE 메시지 한 건이 [`ResourceSnapshot`] 하나가 된다.
//! 스냅샷은 불변이며 다음 스냅샷으로 통째로 대체된다 (병합하지 않음).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// 게임 서버 프로세스 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// 정지됨
    #[default]
    Offline,
    /// 시작 중
    Starting,
    /// 실행 중
    Running,
    /// 정지 중
    Stopping,
}

impl ProcessState {
    /// 콘솔 소켓 `status` 이벤트 인자를 상태로 변환
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "offline" => Some(Self::Offline),
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "stopping" => Some(Self::Stopping),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Offline => write!(f, "offline"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
        }
    }
}

/// 리소스 카운터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    /// CPU 사용률 (코어 합산, 100 = 1코어)
    pub cpu_absolute: f64,
    /// 메모리 사용량 (바이트)
    pub memory_bytes: u64,
    /// 디스크 사용량 (바이트)
    pub disk_bytes: u64,
    /// 누적 수신 바이트
    pub network_rx_bytes: u64,
    /// 누적 송신 바이트
    pub network_tx_bytes: u64,
    /// 가동 시간 (밀리초)
    pub uptime: u64,
}

/// 특정 시점의 서버 상태 측정값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// 프로세스 상태
    pub current_state: ProcessState,
    /// 정지(suspend) 여부
    #[serde(default)]
    pub is_suspended: bool,
    /// 리소스 카운터
    #[serde(default)]
    pub resources: ResourceUsage,
}

#[derive(Deserialize)]
struct ResourceEnvelope {
    attributes: ResourceSnapshot,
}

impl ResourceSnapshot {
    /// SSE 메시지 본문(`{ attributes: {...} }`)을 파싱
    pub fn from_stream_message(data: &str) -> Result<Self, CoreError> {
        let envelope: ResourceEnvelope = serde_json::from_str(data)
            .map_err(|e| CoreError::Parse(format!("리소스 메시지 파싱 실패: {e}")))?;
        Ok(envelope.attributes)
    }

    /// 메모리 사용량 (MiB)
    pub fn memory_mib(&self) -> f64 {
        self.resources.memory_bytes as f64 / (1024.0 * 1024.0)
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.current_state == ProcessState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_message() {
        let data = r#"{
            "attributes": {
                "current_state": "running",
                "is_suspended": false,
                "resources": {
                    "cpu_absolute": 12.5,
                    "memory_bytes": 1048576,
                    "disk_bytes": 2048,
                    "network_rx_bytes": 10,
                    "network_tx_bytes": 20,
                    "uptime": 60000
                }
            }
        }"#;
        let snapshot = ResourceSnapshot::from_stream_message(data).unwrap();
        assert_eq!(snapshot.current_state, ProcessState::Running);
        assert!(snapshot.is_running());
        assert_eq!(snapshot.resources.uptime, 60_000);
        assert!((snapshot.memory_mib() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_counters_default_to_zero() {
        let data = r#"{"attributes": {"current_state": "starting", "resources": {"cpu_absolute": 3.0}}}"#;
        let snapshot = ResourceSnapshot::from_stream_message(data).unwrap();
        assert_eq!(snapshot.current_state, ProcessState::Starting);
        assert_eq!(snapshot.resources.memory_bytes, 0);
        assert!(!snapshot.is_suspended);
    }

    #[test]
    fn rejects_non_json() {
        let err = ResourceSnapshot::from_stream_message("not json").unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_state() {
        let data = r#"{"attributes": {"current_state": "exploding"}}"#;
        assert!(ResourceSnapshot::from_stream_message(data).is_err());
    }

    #[test]
    fn process_state_parse() {
        assert_eq!(ProcessState::parse("stopping"), Some(ProcessState::Stopping));
        assert_eq!(ProcessState::parse("nope"), None);
        assert_eq!(ProcessState::Running.to_string(), "running");
    }
}
