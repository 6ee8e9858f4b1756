//! # hostpanel-app
//!
//! hostpanel CLI 바이너리 진입점.
//! 설정 로드, 어댑터 와이어링, 서버 세션 구동.

mod commands;
mod lifecycle;
mod wiring;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use hostpanel_core::config::AppConfig;
use hostpanel_core::config_manager::{ConfigManager, CONFIG_FILE_NAME};
use hostpanel_core::models::backup::CreateBackupParams;
use hostpanel_core::models::server::{PowerAction, ServerRef};
use hostpanel_sync::session::ServerSession;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::lifecycle::LifecycleManager;
use crate::wiring::Adapters;

/// 게임 서버 패널 클라이언트
///
/// 실시간 리소스 스트림, 콘솔 연결 상태, 백업 작업 추적
#[derive(Parser, Debug)]
#[command(name = "hostpanel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (기본: 플랫폼별 설정 디렉토리의 config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 패널 URL (설정 파일 값을 덮어씀)
    #[arg(long)]
    base_url: Option<String>,

    /// 클라이언트 API 키
    #[arg(long, env = "HOSTPANEL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 서버 uuid
    #[arg(long, short = 's', global = true)]
    server: Option<String>,

    /// 서버 데몬 종류 (백업 경로에 사용)
    #[arg(long, default_value = "wings", global = true)]
    daemon_type: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 리소스, 콘솔 출력, 전원 상태 실시간 감시
    Watch,
    /// 백업 관리
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// 전원 명령 (start, stop, restart, kill)
    Power { action: PowerAction },
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    /// 백업 목록
    List {
        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },
    /// 백업 생성 후 완료까지 추적
    Create {
        /// 백업 이름
        #[arg(long)]
        name: Option<String>,
        /// 제외 패턴 (여러 번 지정 가능)
        #[arg(long)]
        ignore: Vec<String>,
        /// 잠금
        #[arg(long)]
        locked: bool,
    },
    /// 실패한 백업 재시도
    Retry { backup_uuid: String },
}

/// 설정 파일 경로 결정 (CLI 인자 또는 플랫폼별 기본 경로)
///
/// - macOS: `~/Library/Application Support/com.hostpanel.cli/config.json`
/// - Windows: `%APPDATA%\hostpanel\cli\config\config.json`
/// - Linux: `~/.config/cli/config.json` (XDG)
fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| {
            ProjectDirs::from("com", "hostpanel", "cli")
                .map(|p| p.config_dir().join(CONFIG_FILE_NAME))
        })
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// CLI 인자로 설정 덮어쓰기
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(ref base_url) = args.base_url {
        config.server.base_url = base_url.clone();
    }
    if let Some(ref api_key) = args.api_key {
        config.server.api_key = Some(api_key.clone());
    }
}

fn init_tracing(log_level: &str) {
    let log_filter = format!(
        "hostpanel={log_level},hostpanel_app={log_level},hostpanel_core={log_level},hostpanel_network={log_level},hostpanel_sync={log_level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config_path = resolve_config_path(args.config.clone());
    let manager = ConfigManager::with_path(config_path.clone())
        .with_context(|| format!("설정 로드 실패: {}", config_path.display()))?;
    let mut config = manager.get();
    apply_overrides(&mut config, &args);
    info!("설정 파일: {}", config_path.display());

    let server_id = args
        .server
        .clone()
        .context("서버 uuid가 필요함 (--server)")?;
    let server = ServerRef::new(args.daemon_type.clone(), server_id);

    let adapters = Adapters::from_config(&config)?;
    let session = adapters.start_session(server, &config);

    let lifecycle = LifecycleManager::new();
    let outcome = tokio::select! {
        result = run(&args.command, &session, &lifecycle) => result,
        _ = lifecycle.wait_for_signal() => Ok(()),
    };

    session.shutdown();
    info!("hostpanel 종료");
    outcome
}

async fn run(
    command: &Command,
    session: &ServerSession,
    lifecycle: &LifecycleManager,
) -> Result<()> {
    match command {
        Command::Watch => commands::watch(session, lifecycle).await,
        Command::Power { action } => commands::power(session, *action).await,
        Command::Backup { action } => match action {
            BackupAction::List { json } => commands::list_backups(session, *json).await,
            BackupAction::Create {
                name,
                ignore,
                locked,
            } => {
                let params = CreateBackupParams {
                    name: name.clone(),
                    ignored: (!ignore.is_empty()).then(|| ignore.join("\n")),
                    is_locked: *locked,
                };
                commands::create_backup(session, lifecycle, params).await
            }
            BackupAction::Retry { backup_uuid } => {
                commands::retry_backup(session, lifecycle, backup_uuid).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_power_subcommand() {
        let args = Args::try_parse_from(["hostpanel", "--server", "srv1", "power", "restart"])
            .unwrap();
        assert_eq!(args.server.as_deref(), Some("srv1"));
        assert_eq!(args.daemon_type, "wings");
        assert!(matches!(
            args.command,
            Command::Power {
                action: PowerAction::Restart
            }
        ));
    }

    #[test]
    fn rejects_unknown_power_action() {
        assert!(Args::try_parse_from(["hostpanel", "power", "explode"]).is_err());
    }

    #[test]
    fn parses_backup_create_flags() {
        let args = Args::try_parse_from([
            "hostpanel",
            "backup",
            "create",
            "--name",
            "nightly",
            "--ignore",
            "*.log",
            "--ignore",
            "cache/",
            "--locked",
        ])
        .unwrap();
        let Command::Backup {
            action:
                BackupAction::Create {
                    name,
                    ignore,
                    locked,
                },
        } = args.command
        else {
            panic!("backup create가 아님");
        };
        assert_eq!(name.as_deref(), Some("nightly"));
        assert_eq!(ignore, vec!["*.log", "cache/"]);
        assert!(locked);
    }

    #[test]
    fn cli_overrides_config() {
        let args = Args::try_parse_from([
            "hostpanel",
            "--base-url",
            "https://panel.example.com",
            "--api-key",
            "ptlc_abc",
            "watch",
        ])
        .unwrap();
        let mut config = AppConfig::default_config();
        apply_overrides(&mut config, &args);
        assert_eq!(config.server.base_url, "https://panel.example.com");
        assert_eq!(config.server.api_key.as_deref(), Some("ptlc_abc"));
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = resolve_config_path(Some(PathBuf::from("/tmp/hp.json")));
        assert_eq!(path, PathBuf::from("/tmp/hp.json"));
    }
}
