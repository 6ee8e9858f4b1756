//! 애플리케이션 설정 구조체.
//!
//! 패널 URL/API 키, 스트림 재연결 지연, 디바운스 창, 작업 폴링 정책,
//! 표시 타이머 등 런타임 설정을 정의한다.
//! `ConfigManager`가 파일과 환경변수에서 로드한다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 패널 연결 설정
    pub server: ServerConfig,
    /// 실시간 스트림 설정
    #[serde(default)]
    pub stream: StreamConfig,
    /// 작업 폴링 설정
    #[serde(default)]
    pub poller: PollerConfig,
    /// 상태 표시 설정
    #[serde(default)]
    pub display: DisplayConfig,
}

// ============================================================
// 패널 연결 설정
// ============================================================

/// 패널 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 패널 기본 URL (예: "https://panel.example.com")
    pub base_url: String,
    /// 클라이언트 API 키 (Bearer)
    #[serde(default)]
    pub api_key: Option<String>,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// REST 요청 재시도 횟수
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

// ============================================================
// 스트림 설정
// ============================================================

/// 실시간 스트림 설정
///
/// 리소스 스트림과 콘솔(전원 상태) 소켓은 허용하는 지연이 달라
/// 재연결 지연을 따로 둔다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// 리소스 SSE 재연결 지연 (밀리초)
    #[serde(default = "default_resource_reconnect_ms")]
    pub resource_reconnect_ms: u64,
    /// 콘솔 소켓 재연결 지연 (밀리초)
    #[serde(default = "default_console_reconnect_ms")]
    pub console_reconnect_ms: u64,
    /// 스냅샷 디바운스 창 (밀리초)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// 구독자 브로드캐스트 버퍼 크기
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            resource_reconnect_ms: default_resource_reconnect_ms(),
            console_reconnect_ms: default_console_reconnect_ms(),
            debounce_ms: default_debounce_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// ============================================================
// 작업 폴링 설정
// ============================================================

/// 작업 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// 폴링 주기 (밀리초)
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// 이 횟수만큼 연속으로 일시적 실패하면 추적 중단
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// 작업 하나를 추적하는 최대 시간 (초)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    /// 완료 후 작업 창 자동 닫힘 지연 (밀리초)
    #[serde(default = "default_auto_close_ms")]
    pub auto_close_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_duration_secs: default_max_duration_secs(),
            auto_close_ms: default_auto_close_ms(),
        }
    }
}

// ============================================================
// 표시 설정
// ============================================================

/// 상태 표시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// 연결됨 표시 자동 숨김 지연 (밀리초)
    #[serde(default = "default_indicator_hide_ms")]
    pub indicator_hide_ms: u64,
    /// 전원 명령 후 상태 표시 덮어쓰기 유지 시간 (초)
    #[serde(default = "default_power_override_secs")]
    pub power_override_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            indicator_hide_ms: default_indicator_hide_ms(),
            power_override_secs: default_power_override_secs(),
        }
    }
}

// ============================================================
// AppConfig impl
// ============================================================

impl AppConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:8080".to_string(),
                api_key: None,
                request_timeout_ms: default_request_timeout_ms(),
                max_retries: default_max_retries(),
            },
            stream: StreamConfig::default(),
            poller: PollerConfig::default(),
            display: DisplayConfig::default(),
        }
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// 리소스 스트림 재연결 지연
    pub fn resource_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.stream.resource_reconnect_ms)
    }

    /// 콘솔 소켓 재연결 지연
    pub fn console_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.stream.console_reconnect_ms)
    }

    /// 디바운스 창
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.stream.debounce_ms)
    }

    /// 작업 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poller.interval_ms)
    }

    /// 작업 창 자동 닫힘 지연
    pub fn auto_close_delay(&self) -> Duration {
        Duration::from_millis(self.poller.auto_close_ms)
    }

    /// 연결 표시 자동 숨김 지연
    pub fn indicator_hide_delay(&self) -> Duration {
        Duration::from_millis(self.display.indicator_hide_ms)
    }
}

// ============================================================
// 기본값 함수
// ============================================================

fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_resource_reconnect_ms() -> u64 {
    5_000
}
fn default_console_reconnect_ms() -> u64 {
    1_000
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_channel_capacity() -> usize {
    64
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_max_consecutive_failures() -> u32 {
    3
}
fn default_max_duration_secs() -> u64 {
    1_800 // 30분
}
fn default_auto_close_ms() -> u64 {
    3_000
}
fn default_indicator_hide_ms() -> u64 {
    3_000
}
fn default_power_override_secs() -> u64 {
    5
}
