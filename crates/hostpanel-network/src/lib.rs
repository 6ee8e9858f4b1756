//! # hostpanel-network
//!
//! 패널 REST/SSE/WebSocket 네트워크 어댑터.
//! `hostpanel-core`의 포트를 구현한다.
//!
//! - [`http_client::HttpApiClient`]: `PanelApi` (reqwest)
//! - [`sse_client::ResourceStreamClient`]: `EventStreamSource` (eventsource-stream)
//! - [`ws_client::ConsoleSocketClient`]: `ConsoleSocket` (tokio-tungstenite)
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use hostpanel_network::auth::ApiKey;
//! use hostpanel_network::http_client::HttpApiClient;
//! use hostpanel_network::sse_client::ResourceStreamClient;
//!
//! let key = ApiKey::new(Some("ptlc_..."));
//! let api = HttpApiClient::new("https://panel.example.com", key.clone(), timeout)?;
//! let stream = ResourceStreamClient::new("https://panel.example.com", key);
//! ```

pub mod auth;
pub mod http_client;
pub mod sse_client;
pub mod ws_client;
