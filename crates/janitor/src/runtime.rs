//! Container runtime abstraction for testability.
//!
//! The [`ContainerRuntime`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardRuntime`] while tests use `MockRuntime`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Sweeper / Watcher   │
//! └──────────┬───────────┘
//!            │
//!            ▼
//!   ┌──────────────────┐
//!   │ ContainerRuntime │ (trait)
//!   └──────────────────┘
//!        │         │
//!        ▼         ▼
//!   ┌─────────┐ ┌──────┐
//!   │ Bollard │ │ Mock │
//!   └────┬────┘ └──────┘
//!        │
//!        ▼
//!   Docker Daemon
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use scour_janitor::runtime::{BollardRuntime, ContainerRuntime};
//! use scour_core::types::ContainerStatus;
//!
//! let runtime = BollardRuntime::connect_local()?;
//! let exited = runtime.list_containers(&[ContainerStatus::Exited], 10).await?;
//! # Ok::<(), scour_janitor::JanitorError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scour_core::config::DockerConfig;
use scour_core::types::{
    ContainerRecord, ContainerStatus, ImageRecord, Labeled, RestartPolicy, RuntimeEvent,
    RuntimeEventKind,
};

use crate::error::JanitorError;

/// Live event subscription.
///
/// Ends when the cancellation token passed to
/// [`ContainerRuntime::subscribe_events`] fires. A transport failure surfaces
/// as an `Err` item, after which the consumer must stop reading.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RuntimeEvent, JanitorError>> + Send>>;

/// Restart details obtained by inspecting a single container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerInspection {
    /// Number of times the runtime restarted the container.
    pub restart_count: u64,
    /// Configured restart policy.
    pub restart_policy: RestartPolicy,
    /// Container labels.
    pub labels: HashMap<String, String>,
}

impl Labeled for ContainerInspection {
    fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }
}

/// Tags and labels obtained by inspecting a single image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageInspection {
    /// Repository tags still pointing at the image.
    pub tags: Vec<String>,
    /// Image labels.
    pub labels: HashMap<String, String>,
}

impl Labeled for ImageInspection {
    fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveContainerOptions {
    /// Remove anonymous volumes attached to the container.
    pub remove_volumes: bool,
    /// Remove links associated with the container.
    pub remove_links: bool,
}

/// Validates an entity ID before it is passed to the runtime API.
///
/// Container IDs are hex strings, image IDs carry a `sha256:` digest prefix.
fn validate_id(id: &str) -> Result<(), JanitorError> {
    if id.is_empty() || id.len() > 128 {
        return Err(JanitorError::RuntimeApi(format!(
            "invalid id: length {} (must be 1-128)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ':') {
        return Err(JanitorError::RuntimeApi(format!(
            "invalid id '{id}': contains unexpected characters"
        )));
    }
    Ok(())
}

fn unix_seconds(secs: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}

/// Trait abstracting container runtime operations.
///
/// All runtime calls go through this trait, enabling testability via mocking.
/// The trait is `Send + Sync + 'static`, allowing safe sharing across async tasks.
///
/// # Error Handling
///
/// - **404 errors**: Converted to `JanitorError::ContainerNotFound` or
///   `JanitorError::ImageNotFound`
/// - **Connection errors**: Wrapped as `JanitorError::RuntimeConnection`
/// - **Removal failures**: Wrapped as `JanitorError::RuntimeApi`; the batch
///   remover attaches the entity ID
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Lists containers in any of the given statuses.
    ///
    /// Every listed container is inspected for its restart count and policy,
    /// with at most `concurrency` inspections in flight. Containers whose
    /// inspection fails are logged and left out of the result.
    fn list_containers(
        &self,
        statuses: &[ContainerStatus],
        concurrency: usize,
    ) -> impl Future<Output = Result<Vec<ContainerRecord>, JanitorError>> + Send;

    /// Returns the image IDs backing running containers.
    ///
    /// Reads the listing only and never inspects, so a container that cannot
    /// be inspected still protects its image.
    fn list_running_image_ids(
        &self,
    ) -> impl Future<Output = Result<HashSet<String>, JanitorError>> + Send;

    /// Inspects a single container.
    ///
    /// # Errors
    ///
    /// - `JanitorError::ContainerNotFound`: container does not exist (404)
    /// - `JanitorError::RuntimeApi`: invalid ID or other API errors
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerInspection, JanitorError>> + Send;

    /// Removes a container.
    fn remove_container(
        &self,
        id: &str,
        options: RemoveContainerOptions,
    ) -> impl Future<Output = Result<(), JanitorError>> + Send;

    /// Lists all images, intermediate layers included.
    fn list_images(&self) -> impl Future<Output = Result<Vec<ImageRecord>, JanitorError>> + Send;

    /// Inspects a single image.
    ///
    /// # Errors
    ///
    /// - `JanitorError::ImageNotFound`: image does not exist (404)
    /// - `JanitorError::RuntimeApi`: invalid ID or other API errors
    fn inspect_image(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ImageInspection, JanitorError>> + Send;

    /// Removes an image.
    fn remove_image(&self, id: &str) -> impl Future<Output = Result<(), JanitorError>> + Send;

    /// Subscribes to lifecycle events of the given kinds.
    ///
    /// The stream ends once `cancel` fires.
    fn subscribe_events(&self, kinds: &[RuntimeEventKind], cancel: CancellationToken)
    -> EventStream;

    /// Checks runtime daemon connectivity.
    ///
    /// # Errors
    ///
    /// Returns `JanitorError::RuntimeConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), JanitorError>> + Send;

    /// Releases the runtime connection.
    fn close(&self) -> impl Future<Output = Result<(), JanitorError>> + Send;
}

/// Production runtime implementation using `bollard`.
///
/// Communicates with the Docker daemon via a Unix socket or TCP connection.
/// Internally uses `Arc<bollard::Docker>` for safe sharing across async tasks.
///
/// # Examples
///
/// ```ignore
/// use scour_janitor::BollardRuntime;
///
/// // Connect to default Docker socket
/// let runtime = BollardRuntime::connect_local()?;
///
/// // Or connect to a specific socket with a 60 second request timeout
/// let runtime = BollardRuntime::connect_with_socket("/run/docker.sock", 60)?;
/// # Ok::<(), scour_janitor::JanitorError>(())
/// ```
#[derive(Clone)]
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// Connects to Docker using the default local socket.
    ///
    /// Honors `DOCKER_HOST` and falls back to the platform default socket.
    ///
    /// # Errors
    ///
    /// Returns `JanitorError::RuntimeConnection` if the connection fails
    /// (e.g., socket not found, permission denied).
    pub fn connect_local() -> Result<Self, JanitorError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            JanitorError::RuntimeConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    ///
    /// # Errors
    ///
    /// Returns `JanitorError::RuntimeConnection` if the connection fails.
    pub fn connect_with_socket(socket_path: &str, timeout_secs: u64) -> Result<Self, JanitorError> {
        let docker = bollard::Docker::connect_with_socket(
            socket_path,
            timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            JanitorError::RuntimeConnection(format!(
                "failed to connect to docker at {socket_path}: {e}"
            ))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects according to the `[docker]` configuration section.
    ///
    /// An empty socket path selects the local defaults.
    pub fn from_config(config: &DockerConfig) -> Result<Self, JanitorError> {
        if config.socket.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(&config.socket, config.timeout_secs)
        }
    }

    async fn record_from_summary(
        &self,
        summary: bollard::models::ContainerSummary,
    ) -> Option<ContainerRecord> {
        let id = summary.id.unwrap_or_default();
        let inspection = match self.inspect_container(&id).await {
            Ok(inspection) => inspection,
            Err(e) => {
                warn!(container_id = %id, error = %e, "failed to inspect container, skipping");
                return None;
            }
        };

        Some(ContainerRecord {
            id,
            image: summary.image.unwrap_or_default(),
            image_id: summary.image_id.unwrap_or_default(),
            labels: summary.labels.unwrap_or_default(),
            created_at: unix_seconds(summary.created.unwrap_or_default()),
            status: ContainerStatus::from_state(summary.state.as_deref().unwrap_or_default()),
            restart_count: inspection.restart_count,
            restart_policy: inspection.restart_policy,
        })
    }
}

fn event_from_message(message: bollard::models::EventMessage) -> Option<RuntimeEvent> {
    let kind = RuntimeEventKind::from_action(message.action.as_deref()?)?;
    let id = message.actor.and_then(|actor| actor.id)?;
    Some(RuntimeEvent::new(kind, id))
}

impl ContainerRuntime for BollardRuntime {
    async fn list_containers(
        &self,
        statuses: &[ContainerStatus],
        concurrency: usize,
    ) -> Result<Vec<ContainerRecord>, JanitorError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        filters.insert(
            "status".to_owned(),
            statuses.iter().map(|s| s.as_str().to_owned()).collect(),
        );
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| JanitorError::RuntimeApi(format!("list containers failed: {e}")))?;

        debug!(
            count = summaries.len(),
            concurrency, "inspecting listed containers"
        );

        let records = stream::iter(summaries)
            .map(|summary| self.record_from_summary(summary))
            .buffer_unordered(concurrency.max(1))
            .filter_map(|record| async move { record })
            .collect::<Vec<_>>()
            .await;

        Ok(records)
    }

    async fn list_running_image_ids(&self) -> Result<HashSet<String>, JanitorError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        filters.insert(
            "status".to_owned(),
            vec![ContainerStatus::Running.as_str().to_owned()],
        );
        let options = ListContainersOptions::<String> {
            filters,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| JanitorError::RuntimeApi(format!("list running containers failed: {e}")))?;

        Ok(summaries
            .into_iter()
            .filter_map(|summary| summary.image_id)
            .filter(|id| !id.is_empty())
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, JanitorError> {
        validate_id(id)?;

        let details = self.docker.inspect_container(id, None).await.map_err(|e| {
            if e.to_string().contains("404") {
                JanitorError::ContainerNotFound(id.to_owned())
            } else {
                JanitorError::RuntimeApi(format!("inspect container failed: {e}"))
            }
        })?;

        let restart_count = u64::try_from(details.restart_count.unwrap_or_default()).unwrap_or(0);
        let labels = details
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default();
        let policy = details.host_config.and_then(|h| h.restart_policy);
        let (name, max_retries) = match policy {
            Some(p) => (
                p.name.map(|n| n.to_string()).unwrap_or_default(),
                p.maximum_retry_count.unwrap_or_default(),
            ),
            None => (String::new(), 0),
        };

        Ok(ContainerInspection {
            restart_count,
            restart_policy: RestartPolicy::from_docker(&name, max_retries),
            labels,
        })
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveContainerOptions,
    ) -> Result<(), JanitorError> {
        validate_id(id)?;

        let options = bollard::container::RemoveContainerOptions {
            v: options.remove_volumes,
            link: options.remove_links,
            force: false,
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| JanitorError::RuntimeApi(format!("remove container failed: {e}")))
    }

    async fn list_images(&self) -> Result<Vec<ImageRecord>, JanitorError> {
        use bollard::image::ListImagesOptions;

        let options = ListImagesOptions::<String> {
            all: true,
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| JanitorError::RuntimeApi(format!("list images failed: {e}")))?;

        Ok(images
            .into_iter()
            .map(|image| ImageRecord {
                id: image.id,
                labels: image.labels,
                tags: image.repo_tags,
                created_at: unix_seconds(image.created),
            })
            .collect())
    }

    async fn inspect_image(&self, id: &str) -> Result<ImageInspection, JanitorError> {
        validate_id(id)?;

        let details = self.docker.inspect_image(id).await.map_err(|e| {
            if e.to_string().contains("404") {
                JanitorError::ImageNotFound(id.to_owned())
            } else {
                JanitorError::RuntimeApi(format!("inspect image failed: {e}"))
            }
        })?;

        Ok(ImageInspection {
            tags: details.repo_tags.unwrap_or_default(),
            labels: details
                .config
                .and_then(|c| c.labels)
                .unwrap_or_default(),
        })
    }

    async fn remove_image(&self, id: &str) -> Result<(), JanitorError> {
        validate_id(id)?;

        self.docker
            .remove_image(id, None, None)
            .await
            .map(|_| ())
            .map_err(|e| JanitorError::RuntimeApi(format!("remove image failed: {e}")))
    }

    fn subscribe_events(
        &self,
        kinds: &[RuntimeEventKind],
        cancel: CancellationToken,
    ) -> EventStream {
        use bollard::system::EventsOptions;

        let mut types: Vec<String> = kinds.iter().map(|k| k.event_type().to_owned()).collect();
        types.dedup();
        let actions = kinds.iter().map(|k| k.action().to_owned()).collect();

        let mut filters = HashMap::new();
        filters.insert("type".to_owned(), types);
        filters.insert("event".to_owned(), actions);

        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        let events = self
            .docker
            .events(Some(options))
            .take_until(cancel.cancelled_owned())
            .filter_map(|item| async move {
                match item {
                    Ok(message) => event_from_message(message).map(Ok),
                    Err(e) => Some(Err(JanitorError::EventStream(format!(
                        "receive event failed: {e}"
                    )))),
                }
            });

        Box::pin(events)
    }

    async fn ping(&self) -> Result<(), JanitorError> {
        self.docker
            .ping()
            .await
            .map_err(|e| JanitorError::RuntimeConnection(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), JanitorError> {
        // bollard 연결은 마지막 참조가 drop될 때 해제됩니다.
        debug!(
            handles = Arc::strong_count(&self.docker),
            "docker client closed"
        );
        Ok(())
    }
}

#[cfg(test)]
pub use mock::MockRuntime;


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn exited(id: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.to_owned(),
            image: "nginx:latest".to_owned(),
            image_id: "sha256:aaa".to_owned(),
            labels: HashMap::new(),
            created_at: SystemTime::now(),
            status: ContainerStatus::Exited,
            restart_count: 0,
            restart_policy: RestartPolicy::Disabled,
        }
    }

    #[test]
    fn validate_id_accepts_container_and_image_ids() {
        assert!(validate_id("abc123def456").is_ok());
        assert!(validate_id("sha256:0123456789abcdef").is_ok());
    }

    #[test]
    fn validate_id_rejects_empty_and_special_characters() {
        assert!(validate_id("").is_err());
        assert!(validate_id("abc; rm -rf /").is_err());
        assert!(validate_id("../etc").is_err());
        assert!(validate_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn unix_seconds_clamps_negative_values() {
        assert_eq!(unix_seconds(-5), SystemTime::UNIX_EPOCH);
        assert_eq!(
            unix_seconds(60),
            SystemTime::UNIX_EPOCH + Duration::from_secs(60)
        );
    }

    #[test]
    fn event_from_message_maps_die_and_untag() {
        use bollard::models::{EventActor, EventMessage};

        let die = EventMessage {
            action: Some("die".to_owned()),
            actor: Some(EventActor {
                id: Some("abc".to_owned()),
                attributes: None,
            }),
            ..Default::default()
        };
        assert_eq!(
            event_from_message(die),
            Some(RuntimeEvent::new(RuntimeEventKind::ContainerExit, "abc"))
        );

        let start = EventMessage {
            action: Some("start".to_owned()),
            actor: Some(EventActor {
                id: Some("abc".to_owned()),
                attributes: None,
            }),
            ..Default::default()
        };
        assert_eq!(event_from_message(start), None);

        let no_actor = EventMessage {
            action: Some("untag".to_owned()),
            ..Default::default()
        };
        assert_eq!(event_from_message(no_actor), None);
    }

    #[tokio::test]
    async fn mock_lists_by_status() {
        let mut running = exited("run1");
        running.status = ContainerStatus::Running;
        let runtime = MockRuntime::new().with_containers(vec![exited("ex1"), running]);

        let listed = runtime
            .list_containers(&[ContainerStatus::Exited], 4)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "ex1");
    }

    #[tokio::test]
    async fn mock_inspect_uses_queued_results_then_record() {
        let runtime = MockRuntime::new()
            .with_containers(vec![exited("c1")])
            .with_inspections(
                "c1",
                vec![ContainerInspection {
                    restart_count: 7,
                    restart_policy: RestartPolicy::Always,
                    ..Default::default()
                }],
            );

        let first = runtime.inspect_container("c1").await.unwrap();
        assert_eq!(first.restart_count, 7);
        let second = runtime.inspect_container("c1").await.unwrap();
        assert_eq!(second.restart_policy, RestartPolicy::Disabled);
    }

    #[tokio::test]
    async fn mock_inspect_not_found() {
        let runtime = MockRuntime::new();
        let result = runtime.inspect_container("missing").await;
        assert!(matches!(result, Err(JanitorError::ContainerNotFound(_))));
    }

    #[tokio::test]
    async fn mock_failing_inspection_hides_container_but_not_its_image() {
        let mut running = exited("run1");
        running.status = ContainerStatus::Running;
        running.image_id = "sha256:web".to_owned();
        let runtime = MockRuntime::new()
            .with_containers(vec![running])
            .with_failing_inspection("run1");

        let listed = runtime
            .list_containers(&[ContainerStatus::Running], 4)
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert!(runtime.inspect_container("run1").await.is_err());

        let in_use = runtime.list_running_image_ids().await.unwrap();
        assert!(in_use.contains("sha256:web"));
    }

    #[tokio::test]
    async fn mock_inspect_image_returns_labels() {
        let mut labels = HashMap::new();
        labels.insert("com.example.keep".to_owned(), String::new());
        let runtime = MockRuntime::new().with_images(vec![ImageRecord {
            id: "sha256:1".to_owned(),
            labels,
            tags: vec!["base:1".to_owned()],
            created_at: SystemTime::now(),
        }]);

        let inspection = runtime.inspect_image("sha256:1").await.unwrap();
        assert_eq!(inspection.tags, vec!["base:1"]);
        assert!(inspection.labels().contains_key("com.example.keep"));

        let missing = runtime.inspect_image("sha256:2").await;
        assert!(matches!(missing, Err(JanitorError::ImageNotFound(_))));
    }

    #[tokio::test]
    async fn mock_records_removals() {
        let runtime = MockRuntime::new();
        let options = RemoveContainerOptions {
            remove_volumes: true,
            remove_links: false,
        };
        runtime.remove_container("c1", options).await.unwrap();
        runtime.remove_image("sha256:1").await.unwrap();

        assert_eq!(runtime.removed_containers(), vec!["c1"]);
        assert_eq!(runtime.container_removal_options(), vec![options]);
        assert_eq!(runtime.removed_images(), vec!["sha256:1"]);
    }

    #[tokio::test]
    async fn mock_failing_removal() {
        let runtime = MockRuntime::new().with_failing_removal("c1");
        let result = runtime
            .remove_container("c1", RemoveContainerOptions::default())
            .await;
        assert!(result.is_err());
        assert!(runtime.removed_containers().is_empty());
    }

    #[tokio::test]
    async fn mock_stream_ends_on_cancel() {
        let runtime = MockRuntime::new().with_events(vec![Ok(RuntimeEvent::new(
            RuntimeEventKind::ImageUntag,
            "sha256:1",
        ))]);
        let cancel = CancellationToken::new();
        let mut events = runtime.subscribe_events(&[RuntimeEventKind::ImageUntag], cancel.clone());

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.id, "sha256:1");

        cancel.cancel();
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn mock_ending_stream_closes_after_events() {
        let runtime = MockRuntime::new().with_ending_stream();
        let mut events = runtime.subscribe_events(
            &[RuntimeEventKind::ContainerExit],
            CancellationToken::new(),
        );
        assert!(events.next().await.is_none());
        assert_eq!(
            runtime.subscribed_kinds(),
            vec![RuntimeEventKind::ContainerExit]
        );
    }

    #[tokio::test]
    async fn mock_counts_close_calls() {
        let runtime = MockRuntime::new();
        runtime.close().await.unwrap();
        assert_eq!(runtime.close_calls(), 1);
    }

    #[test]
    fn runtime_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockRuntime>();
        assert_send_sync::<BollardRuntime>();
    }
}
