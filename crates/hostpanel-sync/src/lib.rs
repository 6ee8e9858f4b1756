//! # hostpanel-sync
//!
//! 서버 실시간 상태 동기화와 장시간 작업 추적.
//! 네트워크 어댑터는 `hostpanel-core` 포트(`Arc<dyn T>`)로만 받는다.
//!
//! ## 구성
//!
//! - [`stream`]: 대상별 SSE 구독 레지스트리 (고정 지연 재연결)
//! - [`debounce`]: 고빈도 스냅샷을 윈도우당 한 번으로 합치는 싱크
//! - [`connection_status`]: 콘솔 소켓 연결 상태 모델 + 표시기
//! - [`status_override`]: 세션 단위 상태 표시 덮어쓰기
//! - [`poller`]: 작업 ID별 상태 폴링
//! - [`dialog`]: 작업 하나를 추적하는 진행 대화상자 (자동 닫힘)
//! - [`backup`]: 백업 응답 정규화 및 목록 병합
//! - [`session`]: 위 구성요소를 소유하는 서버 세션

pub mod backup;
pub mod connection_status;
pub mod debounce;
pub mod dialog;
pub mod poller;
pub mod session;
pub mod status_override;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;
