//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! `hostpanel-network`가 이 trait들을 구현하며,
//! `hostpanel-sync`와 `hostpanel-app`은 `Arc<dyn T>`로만 사용한다.
//!
//! 모든 async trait은 `async_trait` 매크로를 사용하여
//! object safety를 보장한다.

pub mod api_client;
pub mod stream;
