//! hostpanel 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 이 타입을 그대로 반환한다.
//! 스트림/소켓 에러는 로컬에서 재연결로 복구되고,
//! 응답 형태 에러와 작업 실패만 사용자에게 노출된다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 인증 실패 (API 키 오류, 소켓 토큰 거부 등)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Backup", "Server")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 스트림/소켓 연결 유지 실패
    #[error("전송 계층 에러: {0}")]
    Transport(String),

    /// Rate Limit 초과 (429)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 메시지/응답 본문이 예상한 JSON이 아님
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 백업 생성 응답이 알려진 형태와 일치하지 않음
    #[error("알 수 없는 응답 구조: {0}")]
    InvalidResponse(String),

    /// 백엔드가 작업을 failed로 종료함
    #[error("작업 실패 ({job_id}): {message}")]
    OperationFailed {
        /// 작업 ID
        job_id: String,
        /// 서버가 보고한 실패 사유
        message: String,
    },

    /// 작업 추적 시간 초과
    #[error("작업 추적 타임아웃: {timeout_secs}초 초과")]
    Timeout {
        /// 초과된 시간 (초)
        timeout_secs: u64,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 잠시 후 다시 시도하면 복구될 수 있는 에러인지 판별
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_)
                | CoreError::Transport(_)
                | CoreError::ServiceUnavailable(_)
                | CoreError::RateLimit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CoreError::Network("x".into()).is_transient());
        assert!(CoreError::Transport("x".into()).is_transient());
        assert!(CoreError::ServiceUnavailable("x".into()).is_transient());
        assert!(CoreError::RateLimit {
            retry_after_secs: 1
        }
        .is_transient());
        assert!(!CoreError::Parse("x".into()).is_transient());
        assert!(!CoreError::Auth("x".into()).is_transient());
        assert!(!CoreError::InvalidResponse("x".into()).is_transient());
    }

    #[test]
    fn operation_failed_message() {
        let err = CoreError::OperationFailed {
            job_id: "J1".into(),
            message: "disk full".into(),
        };
        let text = err.to_string();
        assert!(text.contains("J1"));
        assert!(text.contains("disk full"));
    }
}
