//! hostpanel 도메인 모델.
//!
//! 패널 API/스트림과 주고받는 데이터 구조체를 정의한다.
//! 모든 와이어 모델은 `serde` Serialize/Deserialize를 구현한다.

pub mod backup;
pub mod connection;
pub mod operation;
pub mod resource;
pub mod server;
