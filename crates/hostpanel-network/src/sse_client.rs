//! SSE(Server-Sent Events) 리소스 스트림 클라이언트.
//!
//! `EventStreamSource` 포트 구현. 연결 하나를 열어 메시지 `data`를 흘려보낸다.
//! 재연결은 `hostpanel-sync`의 구독 레지스트리가 고정 지연으로 담당한다.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::StreamExt;
use hostpanel_core::error::CoreError;
use hostpanel_core::ports::stream::{EventStreamSource, RawMessageStream};
use tracing::{debug, info};

use crate::auth::ApiKey;

/// SSE 스트림 클라이언트 (`EventStreamSource` 포트 구현)
pub struct ResourceStreamClient {
    base_url: String,
    api_key: ApiKey,
    http_client: reqwest::Client,
}

impl ResourceStreamClient {
    /// 새 SSE 클라이언트 생성
    ///
    /// 스트림은 장시간 유지되므로 전체 요청 타임아웃을 두지 않는다.
    pub fn new(base_url: &str, api_key: ApiKey) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn stream_url(&self, target_id: &str) -> String {
        format!(
            "{}/api/client/servers/{}/resources/stream",
            self.base_url, target_id
        )
    }

    /// SSE 이벤트를 스트림 항목으로 변환
    ///
    /// `None`이면 구독자에게 전달하지 않는다.
    fn classify_event(event_type: &str, data: String) -> Option<Result<String, CoreError>> {
        match event_type {
            // 기본 이벤트 타입 "message"
            "" | "message" | "stats" => {
                if data.trim().is_empty() {
                    None
                } else {
                    Some(Ok(data))
                }
            }
            "ping" | "keep-alive" | "heartbeat" => None,
            "error" => Some(Err(CoreError::Transport(format!("서버 스트림 에러: {data}")))),
            _ => {
                debug!("알 수 없는 SSE 이벤트 타입: {event_type}");
                None
            }
        }
    }
}

#[async_trait]
impl EventStreamSource for ResourceStreamClient {
    async fn open(&self, target_id: &str) -> Result<RawMessageStream, CoreError> {
        let url = self.stream_url(target_id);
        info!("SSE 연결 시작: {url}");

        let request = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let resp = self
            .api_key
            .apply(request)
            .send()
            .await
            .map_err(|e| CoreError::Transport(format!("SSE 연결 실패: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(CoreError::Auth(format!("SSE 인증 실패 ({status})")));
        }
        if !status.is_success() {
            return Err(CoreError::Transport(format!("SSE 연결 거부 ({status})")));
        }

        debug!("SSE 연결 수립됨: {target_id}");

        let stream = resp
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) => Self::classify_event(&event.event, event.data),
                    Err(e) => Some(Err(CoreError::Transport(format!("SSE 스트림 에러: {e}")))),
                }
            });

        Ok(Box::pin(stream))
    }
}
