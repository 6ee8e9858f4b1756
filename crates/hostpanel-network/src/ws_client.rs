//! 콘솔 WebSocket 클라이언트.
//!
//! `ConsoleSocket` 포트 구현. 단기 토큰으로 인증한 뒤
//! 연결 상태, 전원 상태, 콘솔 출력을 이벤트 채널로 전달한다.
//! 끊기면 고정 지연 후 새 토큰으로 재연결한다.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use hostpanel_core::error::CoreError;
use hostpanel_core::models::connection::{ConnectionStatus, ConsoleEvent};
use hostpanel_core::models::resource::ProcessState;
use hostpanel_core::ports::api_client::PanelApi;
use hostpanel_core::ports::stream::ConsoleSocket;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// 소켓 프레임 `{ "event": ..., "args": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketFrame {
    pub event: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl SocketFrame {
    fn auth(token: &str) -> Self {
        Self {
            event: "auth".to_string(),
            args: vec![serde_json::Value::String(token.to_string())],
        }
    }

    /// 첫 번째 인자를 문자열로
    fn first_arg(&self) -> Option<String> {
        self.args.first().map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// 해석된 소켓 프레임
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleFrame {
    AuthSuccess,
    Status(ProcessState),
    Output(String),
    TokenExpiring,
    TokenExpired,
    Error(String),
}

/// 텍스트 프레임 해석. 관심 없는 이벤트는 `None`.
pub fn parse_frame(text: &str) -> Option<ConsoleFrame> {
    let frame: SocketFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("소켓 프레임 파싱 실패: {e}");
            return None;
        }
    };

    match frame.event.as_str() {
        "auth success" => Some(ConsoleFrame::AuthSuccess),
        "status" => {
            let state = frame.first_arg()?;
            match ProcessState::parse(&state) {
                Some(state) => Some(ConsoleFrame::Status(state)),
                None => {
                    debug!("알 수 없는 전원 상태: {state}");
                    None
                }
            }
        }
        "console output" | "install output" | "daemon message" => {
            frame.first_arg().map(ConsoleFrame::Output)
        }
        "token expiring" => Some(ConsoleFrame::TokenExpiring),
        "token expired" => Some(ConsoleFrame::TokenExpired),
        "daemon error" | "jwt error" => Some(ConsoleFrame::Error(
            frame.first_arg().unwrap_or_else(|| frame.event.clone()),
        )),
        _ => None,
    }
}

/// 세션 종료 사유
enum SessionEnd {
    /// 서버가 소켓을 닫음
    Closed,
    /// 이벤트 수신자가 사라짐
    ReceiverClosed,
}

/// 콘솔 WebSocket 클라이언트 (`ConsoleSocket` 포트 구현)
pub struct ConsoleSocketClient {
    api: Arc<dyn PanelApi>,
    reconnect_delay: Duration,
    origin: Option<String>,
}

impl ConsoleSocketClient {
    /// 새 콘솔 소켓 클라이언트 생성
    pub fn new(api: Arc<dyn PanelApi>, reconnect_delay: Duration) -> Self {
        Self {
            api,
            reconnect_delay,
            origin: None,
        }
    }

    /// 데몬이 검사하는 Origin 헤더 설정 (보통 패널 URL)
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.trim_end_matches('/').to_string());
        self
    }

    async fn send_frame(write: &mut WsWriter, frame: &SocketFrame) -> Result<(), CoreError> {
        let json = serde_json::to_string(frame)?;
        write
            .send(Message::text(json))
            .await
            .map_err(|e| CoreError::Transport(format!("WebSocket 전송 실패: {e}")))
    }

    /// 한 번의 연결 수명
    async fn session(
        &self,
        server_id: &str,
        tx: &mpsc::Sender<ConsoleEvent>,
    ) -> Result<SessionEnd, CoreError> {
        let creds = self.api.websocket_credentials(server_id).await?;

        let mut request = creds
            .socket
            .as_str()
            .into_client_request()
            .map_err(|e| CoreError::Transport(format!("잘못된 소켓 URL: {e}")))?;
        if let Some(origin) = &self.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| CoreError::Config(format!("잘못된 Origin: {e}")))?;
            request.headers_mut().insert("Origin", value);
        }

        info!("콘솔 소켓 연결: {}", creds.socket);
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| CoreError::Transport(format!("WebSocket 연결 실패: {e}")))?;

        let (mut write, mut read) = ws_stream.split();
        Self::send_frame(&mut write, &SocketFrame::auth(&creds.token)).await?;

        while let Some(msg) = read.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    debug!("콘솔 소켓 종료 프레임 수신");
                    return Ok(SessionEnd::Closed);
                }
                Ok(_) => continue, // Ping/Pong은 자동 처리
                Err(e) => {
                    return Err(CoreError::Transport(format!("WebSocket 수신 에러: {e}")));
                }
            };

            let event = match parse_frame(text.as_str()) {
                Some(ConsoleFrame::AuthSuccess) => {
                    info!("콘솔 소켓 인증 완료: {server_id}");
                    ConsoleEvent::Connection(ConnectionStatus::Connected)
                }
                Some(ConsoleFrame::Status(state)) => ConsoleEvent::PowerState(state),
                Some(ConsoleFrame::Output(line)) => ConsoleEvent::Output(line),
                Some(ConsoleFrame::TokenExpiring) => {
                    debug!("소켓 토큰 만료 임박, 재인증");
                    let creds = self.api.websocket_credentials(server_id).await?;
                    Self::send_frame(&mut write, &SocketFrame::auth(&creds.token)).await?;
                    continue;
                }
                Some(ConsoleFrame::TokenExpired) => {
                    return Err(CoreError::Auth("소켓 토큰 만료".to_string()));
                }
                Some(ConsoleFrame::Error(message)) => ConsoleEvent::Error(message),
                None => continue,
            };

            if tx.send(event).await.is_err() {
                return Ok(SessionEnd::ReceiverClosed);
            }
        }

        Ok(SessionEnd::Closed)
    }
}

#[async_trait]
impl ConsoleSocket for ConsoleSocketClient {
    async fn run(&self, server_id: &str, tx: mpsc::Sender<ConsoleEvent>) -> Result<(), CoreError> {
        loop {
            if tx
                .send(ConsoleEvent::Connection(ConnectionStatus::Connecting))
                .await
                .is_err()
            {
                return Ok(());
            }

            match self.session(server_id, &tx).await {
                Ok(SessionEnd::ReceiverClosed) => {
                    info!("콘솔 이벤트 채널 닫힘, 연결 종료");
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => info!("콘솔 소켓 연결 종료"),
                Err(e) => warn!("콘솔 소켓 에러: {e}"),
            }

            if tx
                .send(ConsoleEvent::Connection(ConnectionStatus::Disconnected))
                .await
                .is_err()
            {
                return Ok(());
            }

            // 고정 지연 재연결 (횟수 제한 없음)
            warn!("콘솔 소켓 재연결 대기: {:?}", self.reconnect_delay);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}
