//! 서브커맨드 실행.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use hostpanel_core::error::CoreError;
use hostpanel_core::models::backup::{CreateBackupParams, UnifiedBackup};
use hostpanel_core::models::operation::{Operation, OperationKind};
use hostpanel_core::models::resource::ResourceSnapshot;
use hostpanel_core::models::server::PowerAction;
use hostpanel_sync::dialog::DialogState;
use hostpanel_sync::session::ServerSession;
use hostpanel_sync::stream::StreamEvent;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

use crate::lifecycle::LifecycleManager;

/// 리소스, 콘솔 출력, 전원 상태를 종료 신호가 올 때까지 출력
pub async fn watch(session: &ServerSession, lifecycle: &LifecycleManager) -> Result<()> {
    let (handle, sink) = session.debounced_resources();
    sink.on_render(|snapshot: &Arc<ResourceSnapshot>| println!("{}", format_snapshot(snapshot)));
    handle.on_event(|event| match event {
        StreamEvent::Degraded { error, retry_in } => {
            println!("⚠️  리소스 스트림 끊김: {error} ({}초 후 재연결)", retry_in.as_secs());
        }
        StreamEvent::ParseError(message) => warn!("리소스 메시지 무시: {message}"),
        _ => {}
    });

    let _status = session
        .connection_status()
        .subscribe(|status| println!("🔌 콘솔 연결: {status}"));
    let mut output = session.console_output();
    let mut power = session.power_state();
    let mut shutdown = lifecycle.subscribe();

    info!("감시 시작: {}", session.server());
    loop {
        tokio::select! {
            line = output.recv() => match line {
                Ok(line) => println!("> {line}"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("콘솔 출력 {skipped}줄 누락");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = power.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(state) = *power.borrow_and_update() {
                    println!("⚡ 전원 상태: {state}");
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("감시 종료: {}", session.server());
    Ok(())
}

/// 백업 목록 출력
pub async fn list_backups(session: &ServerSession, json: bool) -> Result<()> {
    let backups = session
        .backups()
        .refresh(session.server())
        .await
        .context("백업 목록 조회 실패")?;
    print_backups(&backups, json)
}

/// 백업 생성 후 완료까지 추적
pub async fn create_backup(
    session: &ServerSession,
    lifecycle: &LifecycleManager,
    params: CreateBackupParams,
) -> Result<()> {
    let (done_tx, done_rx) = oneshot::channel();
    let result = session
        .backups()
        .create_and_track(session.server(), &params, move |outcome| {
            let _ = done_tx.send(outcome);
        })
        .await
        .context("백업 생성 실패")?;

    println!(
        "📦 백업 생성 요청됨: {} (작업: {}, 상태: {})",
        result.backup.name,
        result.job_id.as_deref().unwrap_or("-"),
        result.status
    );
    follow_backups(session, lifecycle, done_rx).await
}

/// 실패한 백업 재시도
pub async fn retry_backup(
    session: &ServerSession,
    lifecycle: &LifecycleManager,
    backup_uuid: &str,
) -> Result<()> {
    let result = session
        .backups()
        .retry_backup(session.server(), backup_uuid)
        .await
        .context("백업 재시도 실패")?;
    println!("🔁 백업 재시도 요청됨: {} (상태: {})", backup_uuid, result.status);

    let Some(job_id) = result.job_id else {
        return Ok(());
    };
    if result.status.is_terminal() {
        return Ok(());
    }

    let dialog = session.operation_dialog();
    dialog.track(&job_id, OperationKind::BackupCreate);
    let mut state = dialog.watch();
    let mut shutdown = lifecycle.subscribe();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                match current {
                    DialogState::Open(operation) => {
                        println!("{}", format_operation(&operation));
                    }
                    DialogState::Errored { message, .. } => {
                        return Err(anyhow!("작업 추적 실패: {message}"));
                    }
                    DialogState::Closed => break,
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    Ok(())
}

async fn follow_backups(
    session: &ServerSession,
    lifecycle: &LifecycleManager,
    mut done: oneshot::Receiver<Result<Operation, CoreError>>,
) -> Result<()> {
    let mut changes = session.backups().subscribe();
    let mut shutdown = lifecycle.subscribe();
    loop {
        tokio::select! {
            outcome = &mut done => {
                let operation = outcome
                    .map_err(|_| anyhow!("작업 추적이 중단됨"))?
                    .context("작업 상태 조회 실패")?;
                println!("{}", format_operation(&operation));
                if let Some(failure) = operation.failure() {
                    return Err(failure.into());
                }
                print_backups(&session.backups().backups(session.server()), false)?;
                return Ok(());
            }
            changed = changes.recv() => match changed {
                Ok(server) if &server == session.server() => {
                    for backup in session.backups().backups(&server) {
                        if !backup.status.is_terminal() {
                            println!("  … {} {}%", backup.name, backup.progress);
                        }
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow!("백업 목록 알림 채널 닫힘"));
                }
            },
            _ = shutdown.changed() => {
                warn!("백업 추적 중단 (작업은 서버에서 계속 진행됨)");
                return Ok(());
            }
        }
    }
}

/// 전원 명령 전송
pub async fn power(session: &ServerSession, action: PowerAction) -> Result<()> {
    session
        .power(action)
        .await
        .with_context(|| format!("전원 명령 실패: {action}"))?;
    println!("⚡ 전원 명령 전송됨: {action}");
    Ok(())
}

fn print_backups(backups: &[UnifiedBackup], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(backups)?);
        return Ok(());
    }
    if backups.is_empty() {
        println!("백업 없음");
        return Ok(());
    }
    for backup in backups {
        println!("{}", format_backup(backup));
    }
    Ok(())
}

fn format_snapshot(snapshot: &ResourceSnapshot) -> String {
    let uptime = chrono::Duration::milliseconds(snapshot.resources.uptime as i64);
    format!(
        "📊 {:<9} CPU {:>6.1}%  메모리 {:>8.1} MiB  가동 {}h {:02}m{}",
        snapshot.current_state.to_string(),
        snapshot.resources.cpu_absolute,
        snapshot.memory_mib(),
        uptime.num_hours(),
        uptime.num_minutes() % 60,
        if snapshot.is_suspended { "  (정지됨)" } else { "" }
    )
}

fn format_operation(operation: &Operation) -> String {
    let detail = operation
        .error
        .as_deref()
        .or(operation.message.as_deref())
        .unwrap_or("");
    format!(
        "🔄 작업 {} {} {}% {detail}",
        operation.id, operation.status, operation.progress
    )
}

fn format_backup(backup: &UnifiedBackup) -> String {
    let uuid = if backup.uuid.is_empty() {
        "(대기 중)"
    } else {
        backup.uuid.as_str()
    };
    let mut actions = Vec::new();
    if backup.can_download {
        actions.push("download");
    }
    if backup.can_restore {
        actions.push("restore");
    }
    if backup.can_retry {
        actions.push("retry");
    }
    if backup.can_delete {
        actions.push("delete");
    }
    format!(
        "{uuid:<36}  {:<24} {:<9} {:>3}%  {:>10} B  [{}]",
        backup.name,
        backup.status.to_string(),
        backup.progress,
        backup.bytes,
        actions.join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostpanel_core::models::backup::BackupRecord;
    use hostpanel_core::models::operation::OperationStatus;
    use hostpanel_core::models::resource::{ProcessState, ResourceUsage};

    #[test]
    fn snapshot_line_shows_state_and_memory() {
        let snapshot = ResourceSnapshot {
            current_state: ProcessState::Running,
            is_suspended: false,
            resources: ResourceUsage {
                cpu_absolute: 42.0,
                memory_bytes: 512 * 1024 * 1024,
                uptime: 90 * 60 * 1000,
                ..Default::default()
            },
        };
        let line = format_snapshot(&snapshot);
        assert!(line.contains("running"));
        assert!(line.contains("512.0 MiB"));
        assert!(line.contains("1h 30m"));
    }

    #[test]
    fn placeholder_backup_has_no_uuid_column() {
        let backup = UnifiedBackup::from_listed(BackupRecord {
            uuid: String::new(),
            name: "nightly".into(),
            status: Some(OperationStatus::Running),
            ..Default::default()
        });
        let line = format_backup(&backup);
        assert!(line.starts_with("(대기 중)"));
        assert!(line.contains("nightly"));
    }

    #[test]
    fn operation_line_prefers_error_text() {
        let mut operation = Operation::new("J1", OperationKind::BackupCreate);
        operation.status = OperationStatus::Failed;
        operation.message = Some("압축 중".into());
        operation.error = Some("디스크 부족".into());
        assert!(format_operation(&operation).ends_with("디스크 부족"));
    }
}
