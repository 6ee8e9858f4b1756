//! 클라이언트 API 키 인증.
//!
//! 패널 클라이언트 API는 정적 API 키를 Bearer 토큰으로 받는다.
//! REST 클라이언트와 SSE 클라이언트가 같은 키를 공유한다.

use std::sync::Arc;

/// 공유 API 키
#[derive(Clone, Default)]
pub struct ApiKey {
    key: Option<Arc<str>>,
}

impl ApiKey {
    /// 새 API 키. 빈 문자열은 키 없음으로 취급한다.
    pub fn new(key: Option<&str>) -> Self {
        let key = key.map(str::trim).filter(|k| !k.is_empty()).map(Arc::from);
        Self { key }
    }

    /// 키 설정 여부
    pub fn is_set(&self) -> bool {
        self.key.is_some()
    }

    /// 요청에 Authorization 헤더 부착
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 키 값은 로그에 남기지 않음
        let shown = if self.key.is_some() { "***" } else { "<none>" };
        f.debug_struct("ApiKey").field("key", &shown).finish()
    }
}
