//! 어댑터 생성 (DI 와이어링).
//!
//! 설정 하나로 네트워크 어댑터를 만들고 포트 trait 객체로 묶는다.

use std::sync::Arc;

use anyhow::{Context, Result};
use hostpanel_core::config::AppConfig;
use hostpanel_core::models::server::ServerRef;
use hostpanel_core::ports::api_client::PanelApi;
use hostpanel_core::ports::stream::{ConsoleSocket, EventStreamSource};
use hostpanel_network::auth::ApiKey;
use hostpanel_network::http_client::HttpApiClient;
use hostpanel_network::sse_client::ResourceStreamClient;
use hostpanel_network::ws_client::ConsoleSocketClient;
use hostpanel_sync::session::ServerSession;
use tracing::{info, warn};

/// 포트 구현 묶음
pub struct Adapters {
    pub api: Arc<dyn PanelApi>,
    pub stream_source: Arc<dyn EventStreamSource>,
    pub console: Arc<dyn ConsoleSocket>,
}

impl Adapters {
    /// 설정에서 어댑터 생성
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = ApiKey::new(config.server.api_key.as_deref());
        if !api_key.is_set() {
            warn!("API 키가 설정되지 않음 (--api-key 또는 HOSTPANEL__SERVER__API_KEY)");
        }

        let api: Arc<dyn PanelApi> = Arc::new(
            HttpApiClient::new(
                &config.server.base_url,
                api_key.clone(),
                config.request_timeout(),
            )
            .context("HTTP 클라이언트 생성 실패")?
            .with_max_retries(config.server.max_retries),
        );
        let stream_source: Arc<dyn EventStreamSource> = Arc::new(ResourceStreamClient::new(
            &config.server.base_url,
            api_key,
        ));
        let console: Arc<dyn ConsoleSocket> = Arc::new(
            ConsoleSocketClient::new(api.clone(), config.console_reconnect_delay())
                .with_origin(&config.server.base_url),
        );

        info!("어댑터 생성 완료: {}", config.server.base_url);
        Ok(Self {
            api,
            stream_source,
            console,
        })
    }

    /// 서버 세션 시작
    pub fn start_session(&self, server: ServerRef, config: &AppConfig) -> ServerSession {
        ServerSession::start(
            server,
            self.api.clone(),
            self.stream_source.clone(),
            self.console.clone(),
            config,
        )
    }
}
