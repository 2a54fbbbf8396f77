//! Sweep 오케스트레이터
//!
//! [`Sweeper`]는 정책 평가기, 레이블 필터, 배치 삭제기를 조합하여
//! 컨테이너와 이미지에 대한 1회성 "목록 조회 → 삭제" 패스를 수행합니다.
//!
//! # 이미지 안전 규칙
//! 실행 중인 컨테이너가 사용하는 이미지는 만료되었거나 dangling이어도 절대 삭제 후보가 되지 않습니다.

use std::future::Future;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use scour_core::metrics as m;
use scour_core::types::{ContainerRecord, ContainerStatus, EntityKind, ImageRecord};

use crate::config::RemovalPolicy;
use crate::error::JanitorError;
use crate::filter::filter_ignored;
use crate::policy::{is_container_removable, is_creation_stuck, is_image_dangling, is_image_expired};
use crate::remover::{BatchRemover, RemovalReport};
use crate::runtime::{ContainerRuntime, RemoveContainerOptions};

/// 삭제 후보 조회 대상 컨테이너 상태
pub const REMOVABLE_CONTAINER_STATUSES: [ContainerStatus; 3] = [
    ContainerStatus::Dead,
    ContainerStatus::Exited,
    ContainerStatus::Created,
];

/// 컨테이너/이미지 sweep 실행기
pub struct Sweeper<R: ContainerRuntime> {
    runtime: Arc<R>,
    policy: Arc<RemovalPolicy>,
    remover: BatchRemover,
    cancel: CancellationToken,
}

impl<R: ContainerRuntime> Sweeper<R> {
    /// 새 sweeper를 생성합니다.
    pub fn new(runtime: Arc<R>, policy: Arc<RemovalPolicy>, cancel: CancellationToken) -> Self {
        let remover = BatchRemover::new(policy.concurrency_level, cancel.clone());
        Self {
            runtime,
            policy,
            remover,
            cancel,
        }
    }

    /// 적용 중인 정책
    pub fn policy(&self) -> &RemovalPolicy {
        &self.policy
    }

    /// 런타임 핸들
    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// 컨테이너 삭제 옵션
    pub fn container_removal_options(&self) -> RemoveContainerOptions {
        RemoveContainerOptions {
            remove_volumes: self.policy.force_volume_cleanup,
            remove_links: self.policy.force_link_cleanup,
        }
    }

    /// 런타임 호출을 취소 신호와 경주시킵니다.
    pub(crate) async fn until_cancelled<T>(
        &self,
        call: impl Future<Output = Result<T, JanitorError>>,
    ) -> Result<T, JanitorError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(JanitorError::Cancelled),
            result = call => result,
        }
    }

    /// 삭제 가능한 컨테이너 목록을 조회합니다.
    pub async fn list_removable_containers(&self) -> Result<Vec<ContainerRecord>, JanitorError> {
        let listed = self
            .until_cancelled(
                self.runtime
                    .list_containers(&REMOVABLE_CONTAINER_STATUSES, self.policy.concurrency_level),
            )
            .await?;
        let listed_count = listed.len();

        let now = SystemTime::now();
        let threshold = self.policy.max_always_restart_count;
        let candidates: Vec<ContainerRecord> =
            filter_ignored(listed, &self.policy.container_ignore_labels)
                .into_iter()
                .filter(|c| is_creation_stuck(c, now) || is_container_removable(c, threshold))
                .collect();

        debug!(
            listed = listed_count,
            candidates = candidates.len(),
            "evaluated containers"
        );
        metrics::gauge!(
            m::JANITOR_REMOVAL_CANDIDATES,
            m::LABEL_KIND => EntityKind::Container.as_str()
        )
        .set(candidates.len() as f64);

        Ok(candidates)
    }

    /// 삭제 가능한 이미지 목록을 조회합니다.
    pub async fn list_removable_images(&self) -> Result<Vec<ImageRecord>, JanitorError> {
        let in_use = self
            .until_cancelled(self.runtime.list_running_image_ids())
            .await
            .map_err(|e| match e {
                JanitorError::Cancelled => e,
                other => {
                    JanitorError::RuntimeApi(format!("list running containers failed: {other}"))
                }
            })?;

        let images = self.until_cancelled(self.runtime.list_images()).await?;
        let listed_count = images.len();

        let now = SystemTime::now();
        let threshold_days = self.policy.image_lifetime_threshold_days;
        let candidates: Vec<ImageRecord> = images
            .into_iter()
            .filter(|img| {
                is_image_expired(img.created_at, threshold_days, now) || is_image_dangling(img)
            })
            .filter(|img| !in_use.contains(&img.id))
            .collect();
        let candidates = filter_ignored(candidates, &self.policy.image_ignore_labels);

        debug!(
            listed = listed_count,
            in_use = in_use.len(),
            candidates = candidates.len(),
            "evaluated images"
        );
        metrics::gauge!(
            m::JANITOR_REMOVAL_CANDIDATES,
            m::LABEL_KIND => EntityKind::Image.as_str()
        )
        .set(candidates.len() as f64);

        Ok(candidates)
    }

    /// 삭제 가능한 컨테이너를 모두 삭제합니다.
    ///
    /// 목록 조회 실패는 `Err`로, 개별 삭제 실패는 보고서에 담겨 반환됩니다.
    pub async fn sweep_containers(&self) -> Result<RemovalReport, JanitorError> {
        let started = Instant::now();
        let ids: Vec<String> = self
            .list_removable_containers()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let report = self.remove_containers(ids).await;

        finish_sweep(EntityKind::Container, started, &report);
        Ok(report)
    }

    /// 삭제 가능한 이미지를 모두 삭제합니다.
    pub async fn sweep_images(&self) -> Result<RemovalReport, JanitorError> {
        let started = Instant::now();
        let ids: Vec<String> = self
            .list_removable_images()
            .await?
            .into_iter()
            .map(|img| img.id)
            .collect();

        let report = self.remove_images(ids).await;

        finish_sweep(EntityKind::Image, started, &report);
        Ok(report)
    }

    /// 주어진 컨테이너들을 정책의 삭제 옵션으로 삭제합니다.
    pub async fn remove_containers(&self, ids: Vec<String>) -> RemovalReport {
        let runtime = Arc::clone(&self.runtime);
        let options = self.container_removal_options();
        self.remover
            .remove_all(EntityKind::Container, ids, move |id| {
                let runtime = Arc::clone(&runtime);
                async move { runtime.remove_container(&id, options).await }
            })
            .await
    }

    /// 주어진 이미지들을 삭제합니다.
    pub async fn remove_images(&self, ids: Vec<String>) -> RemovalReport {
        let runtime = Arc::clone(&self.runtime);
        self.remover
            .remove_all(EntityKind::Image, ids, move |id| {
                let runtime = Arc::clone(&runtime);
                async move { runtime.remove_image(&id).await }
            })
            .await
    }
}

fn finish_sweep(kind: EntityKind, started: Instant, report: &RemovalReport) {
    let elapsed = started.elapsed();
    metrics::histogram!(m::JANITOR_SWEEP_DURATION_SECONDS, m::LABEL_KIND => kind.as_str())
        .record(elapsed.as_secs_f64());
    info!(
        kind = %kind,
        removed = report.succeeded().len(),
        failed = report.failed().len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "sweep finished"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use scour_core::types::{RESERVED_LABEL, RestartPolicy};

    use super::*;
    use crate::config::RemovalPolicyBuilder;
    use crate::policy::CREATED_TIMEOUT;
    use crate::runtime::MockRuntime;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn container(id: &str, status: ContainerStatus, policy: RestartPolicy) -> ContainerRecord {
        ContainerRecord {
            id: id.to_owned(),
            image: "app:1".to_owned(),
            image_id: format!("sha256:{id}-image"),
            labels: HashMap::new(),
            created_at: SystemTime::now(),
            status,
            restart_count: 0,
            restart_policy: policy,
        }
    }

    fn image(id: &str, age: Duration, tags: &[&str]) -> ImageRecord {
        ImageRecord {
            id: id.to_owned(),
            labels: HashMap::new(),
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            created_at: SystemTime::now() - age,
        }
    }

    fn sweeper(
        runtime: MockRuntime,
        policy: RemovalPolicy,
    ) -> (Sweeper<MockRuntime>, Arc<MockRuntime>) {
        let runtime = Arc::new(runtime);
        let sweeper = Sweeper::new(
            Arc::clone(&runtime),
            Arc::new(policy),
            CancellationToken::new(),
        );
        (sweeper, runtime)
    }

    fn policy() -> RemovalPolicy {
        RemovalPolicyBuilder::new()
            .concurrency_level(4)
            .image_lifetime_threshold_days(100)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn exited_container_without_restart_policy_is_removed() {
        let (sweeper, runtime) = sweeper(
            MockRuntime::new().with_containers(vec![container(
                "c1",
                ContainerStatus::Exited,
                RestartPolicy::Disabled,
            )]),
            policy(),
        );

        let candidates = sweeper.list_removable_containers().await.unwrap();
        assert_eq!(candidates.len(), 1);

        let report = sweeper.sweep_containers().await.unwrap();
        assert_eq!(report.succeeded(), vec!["c1"]);
        assert_eq!(runtime.removed_containers(), vec!["c1"]);
    }

    #[tokio::test]
    async fn running_always_container_is_never_listed() {
        let mut running = container("c1", ContainerStatus::Running, RestartPolicy::Always);
        running.restart_count = 5;
        let (sweeper, runtime) = sweeper(
            MockRuntime::new().with_containers(vec![running.clone()]),
            policy(),
        );

        assert!(sweeper.list_removable_containers().await.unwrap().is_empty());
        assert!(!is_container_removable(&running, 0));

        let report = sweeper.sweep_containers().await.unwrap();
        assert!(report.is_empty());
        assert!(runtime.removed_containers().is_empty());
    }

    #[tokio::test]
    async fn exited_always_container_respects_threshold() {
        let mut below = container("below", ContainerStatus::Exited, RestartPolicy::Always);
        below.restart_count = 2;
        let mut above = container("above", ContainerStatus::Exited, RestartPolicy::Always);
        above.restart_count = 3;
        let policy = RemovalPolicyBuilder::new()
            .max_always_restart_count(3)
            .build()
            .unwrap();
        let (sweeper, _) = sweeper(MockRuntime::new().with_containers(vec![below, above]), policy);

        let ids: Vec<_> = sweeper
            .list_removable_containers()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["above"]);
    }

    #[tokio::test]
    async fn stuck_created_container_is_removable_despite_policy() {
        let mut stuck = container("stuck", ContainerStatus::Created, RestartPolicy::Always);
        stuck.created_at = SystemTime::now() - CREATED_TIMEOUT - Duration::from_secs(60);
        let fresh = container("fresh", ContainerStatus::Created, RestartPolicy::Always);
        let (sweeper, _) = sweeper(
            MockRuntime::new().with_containers(vec![stuck, fresh]),
            policy(),
        );

        let ids: Vec<_> = sweeper
            .list_removable_containers()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["stuck"]);
    }

    #[tokio::test]
    async fn container_ignore_labels_and_reserved_label_are_respected() {
        let mut ignored = container("ignored", ContainerStatus::Exited, RestartPolicy::Disabled);
        ignored.labels.insert("com.example.keep".to_owned(), "1".to_owned());
        let mut reserved = container("reserved", ContainerStatus::Dead, RestartPolicy::Disabled);
        reserved.labels.insert(RESERVED_LABEL.to_owned(), "true".to_owned());
        let plain = container("plain", ContainerStatus::Dead, RestartPolicy::Disabled);

        let policy = RemovalPolicyBuilder::new()
            .container_ignore_label("com.example.keep")
            .build()
            .unwrap();
        let (sweeper, runtime) = sweeper(
            MockRuntime::new().with_containers(vec![ignored, reserved, plain]),
            policy,
        );

        sweeper.sweep_containers().await.unwrap().into_result().unwrap();
        assert_eq!(runtime.removed_containers(), vec!["plain"]);
    }

    #[tokio::test]
    async fn container_removal_uses_configured_options() {
        let policy = RemovalPolicyBuilder::new()
            .force_volume_cleanup(true)
            .force_link_cleanup(true)
            .build()
            .unwrap();
        let (sweeper, runtime) = sweeper(
            MockRuntime::new().with_containers(vec![container(
                "c1",
                ContainerStatus::Exited,
                RestartPolicy::Disabled,
            )]),
            policy,
        );

        sweeper.sweep_containers().await.unwrap();
        assert_eq!(
            runtime.container_removal_options(),
            vec![RemoveContainerOptions {
                remove_volumes: true,
                remove_links: true,
            }]
        );
    }

    #[tokio::test]
    async fn container_removal_failure_is_reported_with_id() {
        let (sweeper, _) = sweeper(
            MockRuntime::new()
                .with_containers(vec![
                    container("good", ContainerStatus::Exited, RestartPolicy::Disabled),
                    container("bad", ContainerStatus::Exited, RestartPolicy::Disabled),
                ])
                .with_failing_removal("bad"),
            policy(),
        );

        let report = sweeper.sweep_containers().await.unwrap();
        assert_eq!(report.succeeded(), vec!["good"]);
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[tokio::test]
    async fn fresh_dangling_image_is_removable() {
        let (sweeper, _) = sweeper(
            MockRuntime::new().with_images(vec![
                image("sha256:dangling", Duration::ZERO, &["<none>:<none>"]),
                image("sha256:tagged", Duration::ZERO, &["app:1"]),
            ]),
            policy(),
        );

        let ids: Vec<_> = sweeper
            .list_removable_images()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["sha256:dangling"]);
    }

    #[tokio::test]
    async fn expired_image_backing_running_container_is_protected() {
        let mut running = container("web", ContainerStatus::Running, RestartPolicy::Always);
        running.image_id = "sha256:old-in-use".to_owned();
        let (sweeper, runtime) = sweeper(
            MockRuntime::new()
                .with_containers(vec![running])
                .with_images(vec![
                    image("sha256:old-in-use", 101 * DAY, &["app:1"]),
                    image("sha256:old-unused", 101 * DAY, &["app:0"]),
                ]),
            policy(),
        );

        let report = sweeper.sweep_images().await.unwrap();
        assert_eq!(report.succeeded(), vec!["sha256:old-unused"]);
        assert_eq!(runtime.removed_images(), vec!["sha256:old-unused"]);
    }

    #[tokio::test]
    async fn image_stays_protected_when_running_container_cannot_be_inspected() {
        let mut running = container("web", ContainerStatus::Running, RestartPolicy::Always);
        running.image_id = "sha256:old-in-use".to_owned();
        let (sweeper, runtime) = sweeper(
            MockRuntime::new()
                .with_containers(vec![running])
                .with_failing_inspection("web")
                .with_images(vec![image("sha256:old-in-use", 101 * DAY, &["app:1"])]),
            policy(),
        );

        assert!(sweeper.list_removable_images().await.unwrap().is_empty());
        let report = sweeper.sweep_images().await.unwrap();
        assert!(report.is_empty());
        assert!(runtime.removed_images().is_empty());
    }

    #[tokio::test]
    async fn dangling_image_backing_running_container_is_protected() {
        let mut running = container("web", ContainerStatus::Running, RestartPolicy::Disabled);
        running.image_id = "sha256:dangling".to_owned();
        let (sweeper, _) = sweeper(
            MockRuntime::new()
                .with_containers(vec![running])
                .with_images(vec![image("sha256:dangling", Duration::ZERO, &["<none>:<none>"])]),
            policy(),
        );

        assert!(sweeper.list_removable_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_ignore_labels_are_respected() {
        let mut labeled = image("sha256:labeled", 200 * DAY, &["base:1"]);
        labeled.labels.insert("com.example.base".to_owned(), String::new());
        let policy = RemovalPolicyBuilder::new()
            .image_lifetime_threshold_days(100)
            .image_ignore_label("com.example.base")
            .build()
            .unwrap();
        let (sweeper, _) = sweeper(MockRuntime::new().with_images(vec![labeled]), policy);

        assert!(sweeper.list_removable_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn young_tagged_image_is_kept() {
        let (sweeper, runtime) = sweeper(
            MockRuntime::new().with_images(vec![image("sha256:young", 99 * DAY, &["app:2"])]),
            policy(),
        );

        let report = sweeper.sweep_images().await.unwrap();
        assert!(report.is_empty());
        assert!(runtime.removed_images().is_empty());
    }

    #[tokio::test]
    async fn list_images_failure_is_returned() {
        let (sweeper, _) = sweeper(MockRuntime::new().with_failing_list_images_from(1), policy());
        assert!(matches!(
            sweeper.sweep_images().await,
            Err(JanitorError::RuntimeApi(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_sweeper_does_not_list() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runtime = Arc::new(MockRuntime::new());
        let sweeper = Sweeper::new(Arc::clone(&runtime), Arc::new(policy()), cancel);

        assert!(matches!(
            sweeper.sweep_images().await,
            Err(JanitorError::Cancelled)
        ));
        assert_eq!(runtime.list_images_calls(), 0);
    }
}
