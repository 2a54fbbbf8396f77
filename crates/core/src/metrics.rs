//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `scour_`
//! - 모듈명: `janitor_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(scour_core::metrics::JANITOR_EVENTS_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 엔티티 종류 레이블 키 (container, image)
pub const LABEL_KIND: &str = "kind";

/// 결과 레이블 키 (success, failure, cancelled)
pub const LABEL_RESULT: &str = "result";

/// sweep 트리거 레이블 키 (startup, poll, once)
pub const LABEL_TRIGGER: &str = "trigger";

/// 이벤트 종류 레이블 키 (container_exit, image_untag)
pub const LABEL_EVENT: &str = "event";

// ─── Janitor 메트릭 ─────────────────────────────────────────────────

/// Janitor: 삭제 시도 수 (counter, labels: kind, result)
pub const JANITOR_REMOVALS_TOTAL: &str = "scour_janitor_removals_total";

/// Janitor: 완료된 sweep 수 (counter, labels: kind, trigger)
pub const JANITOR_SWEEPS_TOTAL: &str = "scour_janitor_sweeps_total";

/// Janitor: sweep 소요 시간 (histogram, 초, label: kind)
pub const JANITOR_SWEEP_DURATION_SECONDS: &str = "scour_janitor_sweep_duration_seconds";

/// Janitor: 마지막 sweep에서 찾은 삭제 후보 수 (gauge, label: kind)
pub const JANITOR_REMOVAL_CANDIDATES: &str = "scour_janitor_removal_candidates";

/// Janitor: 수신한 런타임 이벤트 수 (counter, label: event)
pub const JANITOR_EVENTS_RECEIVED_TOTAL: &str = "scour_janitor_events_received_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "scour_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// sweep 소요 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 300s 범위 (목록 조회 + 대량 삭제 포함)
pub const SWEEP_DURATION_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 300.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        JANITOR_REMOVALS_TOTAL,
        "Total number of container/image removal attempts by result"
    );
    describe_counter!(
        JANITOR_SWEEPS_TOTAL,
        "Total number of completed sweeps by entity kind and trigger"
    );
    describe_histogram!(
        JANITOR_SWEEP_DURATION_SECONDS,
        "Time to complete a single list-then-remove sweep in seconds"
    );
    describe_gauge!(
        JANITOR_REMOVAL_CANDIDATES,
        "Number of removal candidates found by the most recent sweep"
    );
    describe_counter!(
        JANITOR_EVENTS_RECEIVED_TOTAL,
        "Total number of runtime lifecycle events received"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
