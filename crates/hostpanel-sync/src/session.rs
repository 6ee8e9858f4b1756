//! 서버 세션.
//!
//! 서버 하나를 보는 동안 필요한 상태 객체를 모두 소유한다.
//! 콘솔 소켓 이벤트를 연결 상태 모델과 전원 상태로 옮기는 펌프 태스크를 돌리며,
//! `shutdown()` 또는 drop 시 폴링, 스트림, 콘솔 태스크를 모두 정리한다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hostpanel_core::config::AppConfig;
use hostpanel_core::error::CoreError;
use hostpanel_core::models::connection::{ConnectionStatus, ConsoleEvent};
use hostpanel_core::models::resource::{ProcessState, ResourceSnapshot};
use hostpanel_core::models::server::{PowerAction, ServerRef};
use hostpanel_core::ports::api_client::PanelApi;
use hostpanel_core::ports::stream::{ConsoleSocket, EventStreamSource};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backup::UnifiedBackupReconciler;
use crate::connection_status::{ConnectionIndicator, ConnectionStatusModel, StatusPublisher};
use crate::debounce::DebouncedStateSink;
use crate::dialog::OperationDialog;
use crate::poller::{OperationPoller, PollerSettings};
use crate::status_override::{OverrideDuration, StatusOverrideBroadcaster};
use crate::stream::{StreamHandle, StreamRegistry};

/// 서버 세션
pub struct ServerSession {
    server: ServerRef,
    api: Arc<dyn PanelApi>,
    config: AppConfig,
    status: ConnectionStatusModel,
    overrides: StatusOverrideBroadcaster,
    poller: Arc<OperationPoller>,
    backups: Arc<UnifiedBackupReconciler>,
    streams: StreamRegistry,
    power_state: watch::Receiver<Option<ProcessState>>,
    console_output: broadcast::Sender<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl ServerSession {
    /// 세션 시작. 콘솔 소켓 연결을 바로 시작한다.
    ///
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn start(
        server: ServerRef,
        api: Arc<dyn PanelApi>,
        stream_source: Arc<dyn EventStreamSource>,
        console: Arc<dyn ConsoleSocket>,
        config: &AppConfig,
    ) -> Self {
        let capacity = config.stream.channel_capacity.max(1);
        let (status, publisher) = ConnectionStatusModel::new();
        let poller = Arc::new(OperationPoller::new(
            api.clone(),
            PollerSettings::from(&config.poller),
        ));
        let backups = Arc::new(UnifiedBackupReconciler::new(api.clone(), poller.clone()));
        let streams =
            StreamRegistry::new(stream_source, config.resource_reconnect_delay(), capacity);

        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (power_tx, power_state) = watch::channel(None);
        let (console_output, _) = broadcast::channel(capacity);

        let server_id = server.uuid.clone();
        let console_task = tokio::spawn(async move {
            if let Err(e) = console.run(&server_id, event_tx).await {
                error!("콘솔 소켓 종료: {e}");
            }
        });
        let pump_task = tokio::spawn(pump_console_events(
            event_rx,
            publisher,
            power_tx,
            console_output.clone(),
        ));

        info!("서버 세션 시작: {server}");
        Self {
            server,
            api,
            config: config.clone(),
            status,
            overrides: StatusOverrideBroadcaster::new(),
            poller,
            backups,
            streams,
            power_state,
            console_output,
            tasks: Mutex::new(vec![console_task, pump_task]),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn server(&self) -> &ServerRef {
        &self.server
    }

    /// 콘솔 연결 상태 모델
    pub fn connection_status(&self) -> &ConnectionStatusModel {
        &self.status
    }

    /// 연결 상태 표시기 (설정된 지연 후 자동 숨김)
    pub fn connection_indicator(&self) -> ConnectionIndicator {
        ConnectionIndicator::spawn(&self.status, self.config.indicator_hide_delay())
    }

    pub fn overrides(&self) -> &StatusOverrideBroadcaster {
        &self.overrides
    }

    pub fn poller(&self) -> &Arc<OperationPoller> {
        &self.poller
    }

    pub fn backups(&self) -> &Arc<UnifiedBackupReconciler> {
        &self.backups
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    /// 마지막으로 보고된 전원 상태
    pub fn power_state(&self) -> watch::Receiver<Option<ProcessState>> {
        self.power_state.clone()
    }

    /// 콘솔 출력 수신기
    pub fn console_output(&self) -> broadcast::Receiver<String> {
        self.console_output.subscribe()
    }

    /// 이 서버의 리소스 스트림 구독
    pub fn subscribe_resources(&self) -> StreamHandle {
        self.streams.subscribe(&self.server.uuid)
    }

    /// 리소스 스트림 구독 + 디바운스 싱크 연결
    ///
    /// 두 값을 함께 보관해야 한다. 어느 한쪽이 drop되면 전달이 멈춘다.
    pub fn debounced_resources(
        &self,
    ) -> (StreamHandle, DebouncedStateSink<Arc<ResourceSnapshot>>) {
        let handle = self.subscribe_resources();
        let sink = DebouncedStateSink::new(self.config.debounce_window());
        let pusher = sink.pusher();
        handle.on_snapshot(move |snapshot| pusher.push(snapshot));
        (handle, sink)
    }

    /// 작업 진행 대화상자
    pub fn operation_dialog(&self) -> OperationDialog {
        OperationDialog::new(
            self.poller.clone(),
            self.server.clone(),
            self.config.auto_close_delay(),
        )
    }

    /// 전원 명령 전송
    ///
    /// 실제 상태 변화는 스트림으로 관찰한다. 그동안 상태 표시를 잠시 덮어쓴다.
    pub async fn power(&self, action: PowerAction) -> Result<(), CoreError> {
        self.api
            .send_power_action(&self.server.uuid, action)
            .await?;
        info!("전원 명령 전송: {} {action}", self.server);

        let (text, color) = power_label(action);
        self.overrides.set_status(
            text,
            color,
            OverrideDuration::Seconds(self.config.display.power_override_secs),
        );
        Ok(())
    }

    /// 세션 종료. 여러 번 호출해도 한 번만 처리된다.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.poller.stop_all();
        self.streams.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.overrides.clear();
        info!("서버 세션 종료: {}", self.server);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn power_label(action: PowerAction) -> (&'static str, &'static str) {
    match action {
        PowerAction::Start => ("시작 중...", "green"),
        PowerAction::Stop => ("중지 중...", "yellow"),
        PowerAction::Restart => ("재시작 중...", "blue"),
        PowerAction::Kill => ("강제 종료 중...", "red"),
    }
}

/// 콘솔 이벤트 펌프. 연결 상태의 유일한 발행자를 소유한다.
async fn pump_console_events(
    mut rx: mpsc::Receiver<ConsoleEvent>,
    publisher: StatusPublisher,
    power_tx: watch::Sender<Option<ProcessState>>,
    output: broadcast::Sender<String>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            ConsoleEvent::Connection(status) => {
                publisher.set_status(status);
            }
            ConsoleEvent::PowerState(state) => {
                debug!("전원 상태: {state}");
                power_tx.send_replace(Some(state));
            }
            ConsoleEvent::Output(line) => {
                let _ = output.send(line);
            }
            ConsoleEvent::Error(message) => {
                warn!("콘솔 에러: {message}");
            }
        }
    }
    publisher.set_status(ConnectionStatus::Disconnected);
}
