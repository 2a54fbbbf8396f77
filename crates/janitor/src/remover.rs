//! 배치 삭제기
//!
//! [`BatchRemover`]는 ID 집합을 동시성 상한(`concurrency_level`) 안에서 병렬로 삭제하고,
//! 엔티티별 결과를 [`RemovalReport`]로 모읍니다.
//!
//! # 동작
//! - 빈 입력: 경고 로그만 남기고 빈 보고서(성공)를 반환
//! - `Semaphore` 허가를 얻은 ID만 `JoinSet`에 투입하므로 동시 삭제 수는 상한을 넘지 않음
//! - 실패는 해당 ID를 포함한 [`JanitorError::RemovalFailed`]로 감싸짐
//! - 취소 신호 이후 아직 투입되지 않은 ID는 시도하지 않고 [`JanitorError::Cancelled`]로 기록
//! - 이미 실행 중인 삭제는 끝까지 완료되며 재시도나 롤백은 없음

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scour_core::metrics as m;
use scour_core::types::EntityKind;

use crate::error::JanitorError;

/// 엔티티 하나의 삭제 결과
#[derive(Debug)]
pub struct RemovalOutcome {
    /// 대상 ID
    pub id: String,
    /// 엔티티 종류
    pub kind: EntityKind,
    /// 삭제 결과
    pub result: Result<(), JanitorError>,
}

impl RemovalOutcome {
    /// 삭제에 성공했는지 확인합니다.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// 배치 삭제 보고서
///
/// 결과는 완료 순서대로 저장되며, 취소로 건너뛴 ID는 마지막에 추가됩니다.
#[derive(Debug, Default)]
pub struct RemovalReport {
    outcomes: Vec<RemovalOutcome>,
}

impl RemovalReport {
    fn push(&mut self, outcome: RemovalOutcome) {
        self.outcomes.push(outcome);
    }

    /// 모든 엔티티별 결과
    pub fn outcomes(&self) -> &[RemovalOutcome] {
        &self.outcomes
    }

    /// 결과 개수
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// 결과가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// 삭제에 성공한 ID 목록
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.id.as_str())
            .collect()
    }

    /// 실패했거나 취소된 결과 목록
    pub fn failed(&self) -> Vec<&RemovalOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success()).collect()
    }

    /// 완료 순서상 첫 번째 에러
    pub fn first_error(&self) -> Option<&JanitorError> {
        self.outcomes.iter().find_map(|o| o.result.as_ref().err())
    }

    /// 첫 번째 에러를 반환하거나, 모두 성공했으면 `Ok(())`를 반환합니다.
    pub fn into_result(self) -> Result<(), JanitorError> {
        self.outcomes
            .into_iter()
            .find_map(|o| o.result.err())
            .map_or(Ok(()), Err)
    }
}

/// 동시성 상한이 있는 배치 삭제기
#[derive(Debug, Clone)]
pub struct BatchRemover {
    concurrency_level: usize,
    cancel: CancellationToken,
}

impl BatchRemover {
    /// 새 삭제기를 생성합니다. 상한이 0이면 1로 취급합니다.
    pub fn new(concurrency_level: usize, cancel: CancellationToken) -> Self {
        Self {
            concurrency_level: concurrency_level.max(1),
            cancel,
        }
    }

    /// 동시 삭제 상한
    pub fn concurrency_level(&self) -> usize {
        self.concurrency_level
    }

    /// 모든 ID를 `remove_fn`으로 삭제하고 보고서를 반환합니다.
    pub async fn remove_all<F, Fut>(
        &self,
        kind: EntityKind,
        ids: Vec<String>,
        remove_fn: F,
    ) -> RemovalReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<(), JanitorError>> + Send + 'static,
    {
        let mut report = RemovalReport::default();

        if ids.is_empty() {
            warn!(kind = %kind, "no entities to remove");
            return report;
        }

        debug!(
            kind = %kind,
            count = ids.len(),
            concurrency = self.concurrency_level,
            "removing entities"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency_level));
        let mut tasks = JoinSet::new();
        let mut task_ids = HashMap::new();
        let mut pending = ids.into_iter();
        let mut skipped = Vec::new();

        while let Some(id) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                skipped = std::iter::once(id).chain(pending.by_ref()).collect();
                warn!(kind = %kind, skipped = skipped.len(), "removal cancelled");
                break;
            };

            let removal = remove_fn(id.clone());
            let handle = tasks.spawn(async move {
                let _permit = permit;
                removal.await
            });
            task_ids.insert(handle.id(), id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, result) = match joined {
                Ok((task_id, result)) => (task_id, result),
                Err(e) => {
                    let reason = format!("removal task failed: {e}");
                    (e.id(), Err(JanitorError::RuntimeApi(reason)))
                }
            };
            let Some(id) = task_ids.remove(&task_id) else {
                continue;
            };
            let result = result.map_err(|e| match e {
                JanitorError::RemovalFailed { .. } => e,
                other => JanitorError::RemovalFailed {
                    kind,
                    id: id.clone(),
                    reason: other.to_string(),
                },
            });
            record(&mut report, kind, id, result);
        }

        // 취소로 건너뛴 ID는 실행된 삭제 결과 뒤에 기록
        for id in skipped {
            record(&mut report, kind, id, Err(JanitorError::Cancelled));
        }

        report
    }
}

fn record(
    report: &mut RemovalReport,
    kind: EntityKind,
    id: String,
    result: Result<(), JanitorError>,
) {
    let label = match &result {
        Ok(()) => {
            info!(kind = %kind, id = %id, "removed");
            "success"
        }
        Err(JanitorError::Cancelled) => "cancelled",
        Err(e) => {
            error!(kind = %kind, id = %id, error = %e, "removal failed");
            "failure"
        }
    };
    metrics::counter!(
        m::JANITOR_REMOVALS_TOTAL,
        m::LABEL_KIND => kind.as_str(),
        m::LABEL_RESULT => label
    )
    .increment(1);

    report.push(RemovalOutcome { id, kind, result });
}
