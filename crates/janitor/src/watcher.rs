//! 생명주기 감시자 -- 시작 sweep, 주기 폴링, 이벤트 구독 전체 흐름 관리
//!
//! [`Watcher`]는 세 가지 트리거(시작, 타이머, 런타임 이벤트)로 정리 흐름을 반복하고,
//! 두 백그라운드 태스크의 치명적 에러를 용량 1의 채널 하나로 모아 단일 종료 경로를 만듭니다.
//!
//! # 상태 전이
//! ```text
//! Starting ──> Sweeping ──> Watching ──> Terminated
//!                  │                         ▲
//!                  └──────── (에러) ─────────┘
//! ```
//!
//! # 내부 아키텍처
//! ```text
//!                 ┌── poll task ── interval tick ──> sweep_images()
//! Watcher.run() ──┤                                        │ (fatal)
//!                 └── event task ── die / untag ──> remove │
//!                                        │ (fatal: stream) │
//!                                        ▼                 ▼
//!                                    mpsc::channel(1) ──> run() 반환
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use scour_core::metrics as m;
use scour_core::types::{EntityKind, RuntimeEvent, RuntimeEventKind};

use crate::config::RemovalPolicy;
use crate::error::JanitorError;
use crate::filter::is_ignored;
use crate::policy::restart_policy_allows_removal;
use crate::remover::RemovalReport;
use crate::runtime::{ContainerRuntime, EventStream};
use crate::sweep::Sweeper;

/// 구독하는 런타임 이벤트 종류
pub const WATCHED_EVENTS: [RuntimeEventKind; 2] =
    [RuntimeEventKind::ContainerExit, RuntimeEventKind::ImageUntag];

/// 감시자 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherState {
    /// 생성됨, 아직 시작하지 않음
    Starting,
    /// 시작 sweep 진행 중
    Sweeping,
    /// 폴링 + 이벤트 감시 중
    Watching,
    /// 종료됨
    Terminated(TerminationReason),
}

/// 종료 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// 취소 신호 수신
    Cancelled,
    /// 치명적 에러 발생 (에러 메시지)
    Failed(String),
}

impl TerminationReason {
    fn from_result(result: &Result<(), JanitorError>) -> Self {
        match result {
            Err(e) if !e.is_cancelled() => Self::Failed(e.to_string()),
            _ => Self::Cancelled,
        }
    }
}

/// 생명주기 감시자
///
/// # 사용 예시
/// ```ignore
/// use std::sync::Arc;
/// use scour_janitor::{BollardRuntime, RemovalPolicy, Watcher};
///
/// let runtime = Arc::new(BollardRuntime::connect_local()?);
/// let watcher = Watcher::new(runtime, RemovalPolicy::default())
///     .with_span(tracing::info_span!("janitor", host = "node-1"));
/// let mut state = watcher.subscribe_state();
/// watcher.run(cancel).await?;
/// ```
pub struct Watcher<R: ContainerRuntime> {
    runtime: Arc<R>,
    policy: Arc<RemovalPolicy>,
    span: Span,
    state_tx: watch::Sender<WatcherState>,
}

impl<R: ContainerRuntime> Watcher<R> {
    /// 새 감시자를 생성합니다.
    pub fn new(runtime: Arc<R>, policy: RemovalPolicy) -> Self {
        let (state_tx, _) = watch::channel(WatcherState::Starting);
        Self {
            runtime,
            policy: Arc::new(policy),
            span: info_span!("watcher"),
            state_tx,
        }
    }

    /// 모든 로그가 기록될 span을 지정합니다.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// 상태 변화를 구독합니다.
    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.state_tx.subscribe()
    }

    /// 현재 상태
    pub fn state(&self) -> WatcherState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: WatcherState) {
        debug!(state = ?state, "watcher state changed");
        self.state_tx.send_replace(state);
    }

    /// 취소되거나 치명적 에러가 날 때까지 정리 흐름을 실행합니다.
    ///
    /// 취소 시 [`JanitorError::Cancelled`]를, 그 외에는 첫 번째 치명적 에러를 반환합니다.
    /// 어떤 경우든 백그라운드 태스크를 모두 정리한 뒤 런타임 연결을 닫습니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), JanitorError> {
        let span = self.span.clone();
        self.run_inner(cancel).instrument(span).await
    }

    async fn run_inner(self, cancel: CancellationToken) -> Result<(), JanitorError> {
        let result = match self.policy.validate() {
            Ok(()) => self.drive(&cancel).await,
            Err(e) => Err(e),
        };
        let result = match result {
            Err(_) if cancel.is_cancelled() => Err(JanitorError::Cancelled),
            other => other,
        };

        if let Err(e) = self.runtime.close().await {
            warn!(error = %e, "failed to close runtime connection");
        }

        match &result {
            Err(JanitorError::Cancelled) => info!("watcher cancelled"),
            Err(e) => error!(error = %e, "watcher terminated"),
            Ok(()) => {}
        }
        self.set_state(WatcherState::Terminated(TerminationReason::from_result(
            &result,
        )));
        result
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<(), JanitorError> {
        let tasks_cancel = cancel.child_token();
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&self.runtime),
            Arc::clone(&self.policy),
            tasks_cancel.clone(),
        ));

        self.set_state(WatcherState::Sweeping);
        info!("running startup sweep");
        run_sweep(&sweeper, EntityKind::Container, "startup").await?;
        run_sweep(&sweeper, EntityKind::Image, "startup").await?;

        if cancel.is_cancelled() {
            return Err(JanitorError::Cancelled);
        }

        let (err_tx, mut err_rx) = mpsc::channel::<JanitorError>(1);
        let mut tasks = JoinSet::new();

        let period = self.policy.poll_interval();
        info!(
            interval_hours = self.policy.poll_interval_hours,
            "starting periodic image checker"
        );
        tasks.spawn(
            poll_loop(
                Arc::clone(&sweeper),
                period,
                tasks_cancel.clone(),
                err_tx.clone(),
            )
            .instrument(self.span.clone()),
        );

        info!("starting runtime event watcher");
        let events = self
            .runtime
            .subscribe_events(&WATCHED_EVENTS, tasks_cancel.clone());
        tasks.spawn(
            event_loop(Arc::clone(&sweeper), events, tasks_cancel.clone(), err_tx)
                .instrument(self.span.clone()),
        );
        self.set_state(WatcherState::Watching);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(JanitorError::Cancelled),
            received = err_rx.recv() => Err(received.unwrap_or_else(|| {
                JanitorError::EventStream("watcher tasks exited unexpectedly".to_owned())
            })),
        };

        tasks_cancel.cancel();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "watcher task panicked");
            }
        }
        debug!("watcher tasks stopped");

        result
    }
}

/// 한 종류의 sweep을 실행하고 첫 번째 삭제 실패를 에러로 반환합니다.
async fn run_sweep<R: ContainerRuntime>(
    sweeper: &Sweeper<R>,
    kind: EntityKind,
    trigger: &'static str,
) -> Result<(), JanitorError> {
    let report = match kind {
        EntityKind::Container => sweeper.sweep_containers().await,
        EntityKind::Image => sweeper.sweep_images().await,
    }?;
    report.into_result()?;

    metrics::counter!(
        m::JANITOR_SWEEPS_TOTAL,
        m::LABEL_KIND => kind.as_str(),
        m::LABEL_TRIGGER => trigger
    )
    .increment(1);
    Ok(())
}

/// 치명적 에러를 보고합니다. 이미 다른 에러가 보고되었으면 버립니다.
fn report_fatal(errors: &mpsc::Sender<JanitorError>, err: JanitorError) {
    if let Err(e) = errors.try_send(err) {
        debug!(error = %e, "fatal error dropped, another error already reported");
    }
}

async fn poll_loop<R: ContainerRuntime>(
    sweeper: Arc<Sweeper<R>>,
    period: std::time::Duration,
    cancel: CancellationToken,
    errors: mpsc::Sender<JanitorError>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 첫 tick은 즉시 완료됩니다. 시작 sweep이 이미 수행되었으므로 건너뜁니다.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("poll loop stopped");
                return;
            }
            _ = ticker.tick() => {
                debug!("checking for removable images");
                match run_sweep(&sweeper, EntityKind::Image, "poll").await {
                    Ok(()) => {}
                    Err(_) if cancel.is_cancelled() => return,
                    Err(e) => {
                        error!(error = %e, "image poller failed");
                        report_fatal(&errors, e);
                        return;
                    }
                }
            }
        }
    }
}

async fn event_loop<R: ContainerRuntime>(
    sweeper: Arc<Sweeper<R>>,
    mut events: EventStream,
    cancel: CancellationToken,
    errors: mpsc::Sender<JanitorError>,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("event loop stopped");
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => handle_event(&sweeper, event).await,
            Some(Err(_)) | None if cancel.is_cancelled() => return,
            Some(Err(e)) => {
                error!(error = %e, "error receiving event");
                report_fatal(&errors, e);
                return;
            }
            None => {
                let e = JanitorError::EventStream("event stream closed unexpectedly".to_owned());
                error!(error = %e, "event stream ended");
                report_fatal(&errors, e);
                return;
            }
        }
    }
}

/// 이벤트 하나를 처리합니다. 실패는 로그만 남기고 감시를 계속합니다.
async fn handle_event<R: ContainerRuntime>(sweeper: &Sweeper<R>, event: RuntimeEvent) {
    metrics::counter!(
        m::JANITOR_EVENTS_RECEIVED_TOTAL,
        m::LABEL_EVENT => event.kind.to_string()
    )
    .increment(1);
    debug!(event = %event.kind, id = %event.id, "event received");

    match event.kind {
        RuntimeEventKind::ImageUntag => {
            let inspection = match sweeper
                .until_cancelled(sweeper.runtime().inspect_image(&event.id))
                .await
            {
                Ok(inspection) => inspection,
                Err(e) => {
                    warn!(image_id = %event.id, error = %e, "failed to inspect untagged image");
                    return;
                }
            };

            if is_ignored(&inspection, &sweeper.policy().image_ignore_labels) {
                debug!(image_id = %event.id, "image carries an ignore label, keeping");
                return;
            }

            let report = sweeper.remove_images(vec![event.id]).await;
            log_event_removal(report);
        }
        RuntimeEventKind::ContainerExit => {
            let inspection = match sweeper
                .until_cancelled(sweeper.runtime().inspect_container(&event.id))
                .await
            {
                Ok(inspection) => inspection,
                Err(e) => {
                    warn!(
                        container_id = %event.id,
                        error = %e,
                        "failed to inspect exited container"
                    );
                    return;
                }
            };

            let policy = sweeper.policy();
            if is_ignored(&inspection, &policy.container_ignore_labels) {
                debug!(container_id = %event.id, "container carries an ignore label, keeping");
                return;
            }
            if !restart_policy_allows_removal(
                &inspection.restart_policy,
                inspection.restart_count,
                policy.max_always_restart_count,
            ) {
                debug!(
                    container_id = %event.id,
                    restart_policy = %inspection.restart_policy,
                    restart_count = inspection.restart_count,
                    "container not removable"
                );
                return;
            }

            let report = sweeper.remove_containers(vec![event.id]).await;
            log_event_removal(report);
        }
    }
}

fn log_event_removal(report: RemovalReport) {
    if let Err(e) = report.into_result() {
        warn!(error = %e, "event-triggered removal failed");
    }
}

/// 정리 흐름의 진입점
///
/// [`Watcher`]를 기본 span으로 생성하여 실행합니다.
pub async fn run_cleanup<R: ContainerRuntime>(
    cancel: CancellationToken,
    runtime: Arc<R>,
    policy: RemovalPolicy,
) -> Result<(), JanitorError> {
    Watcher::new(runtime, policy).run(cancel).await
}
