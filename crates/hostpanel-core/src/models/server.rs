//! 서버 식별자와 전원 명령 모델.

use serde::{Deserialize, Serialize};

/// 클라이언트 API 라우트에서 서버를 가리키는 식별자
///
/// 백업 라우트는 `/api/client/servers/{daemon_type}/{uuid}/...` 형태이고,
/// 리소스 스트림/전원/웹소켓 라우트는 `uuid`만 사용한다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerRef {
    /// 데몬 종류 (예: "wings", "elytra")
    pub daemon_type: String,
    /// 서버 UUID (또는 짧은 식별자)
    pub uuid: String,
}

impl ServerRef {
    /// 새 서버 식별자 생성
    pub fn new(daemon_type: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            daemon_type: daemon_type.into(),
            uuid: uuid.into(),
        }
    }

    /// 백업 컬렉션 경로
    pub fn backups_path(&self) -> String {
        format!(
            "/api/client/servers/{}/{}/backups",
            self.daemon_type, self.uuid
        )
    }
}

impl std::fmt::Display for ServerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.daemon_type, self.uuid)
    }
}

/// 전원 명령
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
    Kill,
}

impl PowerAction {
    /// API 전송용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Restart => "restart",
            PowerAction::Kill => "kill",
        }
    }
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PowerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(PowerAction::Start),
            "stop" => Ok(PowerAction::Stop),
            "restart" => Ok(PowerAction::Restart),
            "kill" => Ok(PowerAction::Kill),
            other => Err(format!("알 수 없는 전원 명령: {other}")),
        }
    }
}

/// 콘솔 웹소켓 접속 정보 (`GET /websocket`)
#[derive(Debug, Clone, Deserialize)]
pub struct WebsocketCredentials {
    /// 단기 JWT
    pub token: String,
    /// 접속할 소켓 URL
    pub socket: String,
}
