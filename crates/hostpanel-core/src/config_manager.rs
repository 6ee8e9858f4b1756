//! 설정 파일 관리.
//!
//! JSON 설정 파일을 로드/저장하고, `HOSTPANEL__SECTION__KEY` 형태의
//! 환경변수로 개별 값을 덮어쓴다 (예: `HOSTPANEL__SERVER__API_KEY`).

use crate::config::AppConfig;
use crate::error::CoreError;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "config.json";

/// 환경변수 접두사
const ENV_PREFIX: &str = "HOSTPANEL";

/// 설정 관리자
///
/// 설정 파일의 로드/저장 및 런타임 설정 변경을 관리한다.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 현재 설정 (스레드 안전)
    config: Arc<RwLock<AppConfig>>,
    /// 설정 파일 경로
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// 지정된 경로로 설정 관리자 생성
    ///
    /// 설정 파일이 없으면 기본 설정을 생성하고 저장한다.
    pub fn with_path(config_path: PathBuf) -> Result<Self, CoreError> {
        Self::with_env_prefix(config_path, ENV_PREFIX)
    }

    /// 환경변수 접두사를 지정하여 생성
    pub fn with_env_prefix(config_path: PathBuf, env_prefix: &str) -> Result<Self, CoreError> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    CoreError::Config(format!(
                        "설정 디렉토리 생성 실패: {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
                info!("설정 디렉토리 생성: {}", parent.display());
            }
        }

        if !config_path.exists() {
            Self::save_to_file(&config_path, &AppConfig::default_config())?;
            info!("기본 설정 파일 생성: {}", config_path.display());
        }

        let config = Self::load_from_file(&config_path, env_prefix)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            env_prefix: env_prefix.to_string(),
        })
    }

    /// 현재 설정 반환 (복제본)
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// 설정 업데이트 및 파일 저장
    pub fn update(&self, new_config: AppConfig) -> Result<(), CoreError> {
        Self::save_to_file(&self.config_path, &new_config)?;
        *self.config.write() = new_config;
        debug!("설정 저장 완료: {}", self.config_path.display());
        Ok(())
    }

    /// 특정 필드만 업데이트
    pub fn update_with<F>(&self, updater: F) -> Result<AppConfig, CoreError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.get();
        updater(&mut config);
        self.update(config.clone())?;
        Ok(config)
    }

    /// 설정 파일 경로 반환
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 설정 다시 로드
    pub fn reload(&self) -> Result<(), CoreError> {
        let config = Self::load_from_file(&self.config_path, &self.env_prefix)?;
        *self.config.write() = config;
        info!("설정 다시 로드 완료");
        Ok(())
    }

    /// 파일 + 환경변수에서 설정 로드
    fn load_from_file(path: &Path, env_prefix: &str) -> Result<AppConfig, CoreError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                CoreError::Config(format!("설정 파일 읽기 실패: {}: {}", path.display(), e))
            })?;

        settings.try_deserialize::<AppConfig>().map_err(|e| {
            CoreError::Config(format!("설정 파일 파싱 실패: {}: {}", path.display(), e))
        })
    }

    /// 설정을 파일에 저장
    fn save_to_file(path: &Path, config: &AppConfig) -> Result<(), CoreError> {
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content).map_err(|e| {
            CoreError::Config(format!("설정 파일 쓰기 실패: {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_and_load_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let manager = ConfigManager::with_env_prefix(path.clone(), "HP_TEST_CREATE").unwrap();
        assert!(path.exists());

        let config = manager.get();
        assert_eq!(config.stream.resource_reconnect_ms, 5_000);
        assert_eq!(config.stream.console_reconnect_ms, 1_000);
        assert_eq!(config.stream.debounce_ms, 100);
        assert_eq!(config.poller.max_consecutive_failures, 3);
    }

    #[test]
    fn update_and_persist_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let manager = ConfigManager::with_env_prefix(path.clone(), "HP_TEST_UPDATE").unwrap();
        manager
            .update_with(|c| {
                c.server.base_url = "https://panel.example.com".to_string();
                c.poller.interval_ms = 500;
            })
            .unwrap();

        let reopened = ConfigManager::with_env_prefix(path, "HP_TEST_UPDATE").unwrap();
        let config = reopened.get();
        assert_eq!(config.server.base_url, "https://panel.example.com");
        assert_eq!(config.poller.interval_ms, 500);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"server": {"base_url": "https://p.example"}}"#).unwrap();

        let manager = ConfigManager::with_env_prefix(path, "HP_TEST_PARTIAL").unwrap();
        let config = manager.get();
        assert_eq!(config.server.base_url, "https://p.example");
        assert!(config.server.api_key.is_none());
        assert_eq!(config.display.indicator_hide_ms, 3_000);
        assert_eq!(config.poller.auto_close_ms, 3_000);
    }

    #[test]
    fn env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::env::set_var("HP_TEST_ENV__SERVER__API_KEY", "ptlc_secret");
        std::env::set_var("HP_TEST_ENV__POLLER__INTERVAL_MS", "750");

        let manager = ConfigManager::with_env_prefix(path, "HP_TEST_ENV").unwrap();
        let config = manager.get();
        assert_eq!(config.server.api_key.as_deref(), Some("ptlc_secret"));
        assert_eq!(config.poller.interval_ms, 750);

        std::env::remove_var("HP_TEST_ENV__SERVER__API_KEY");
        std::env::remove_var("HP_TEST_ENV__POLLER__INTERVAL_MS");
    }

    #[test]
    fn reload_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let manager = ConfigManager::with_env_prefix(path.clone(), "HP_TEST_RELOAD").unwrap();

        let mut edited = manager.get();
        edited.stream.debounce_ms = 250;
        fs::write(&path, serde_json::to_string(&edited).unwrap()).unwrap();

        manager.reload().unwrap();
        assert_eq!(manager.get().stream.debounce_ms, 250);
    }

    #[test]
    fn invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigManager::with_env_prefix(path, "HP_TEST_INVALID").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
