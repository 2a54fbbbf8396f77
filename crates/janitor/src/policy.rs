//! 삭제 정책 평가기
//!
//! 컨테이너와 이미지가 삭제 대상인지 판정하는 순수 함수들입니다.
//! 런타임 호출이나 부수 효과가 없으며, 현재 시각은 항상 인자로 전달받습니다.
//!
//! # 판정 규칙
//! - 재시작 정책 `no` / `unless-stopped`: 항상 삭제 가능
//! - `always`: 임계값이 0보다 크고 재시작 횟수가 임계값 이상일 때
//! - `on-failure:N`: 재시작 횟수가 N 이상일 때
//! - 알 수 없는 정책: 삭제하지 않음
//! - `created` 상태로 [`CREATED_TIMEOUT`]을 넘긴 컨테이너는 정책과 무관하게 삭제 가능

use std::time::{Duration, SystemTime};

use scour_core::types::{
    ContainerRecord, ContainerStatus, DANGLING_IMAGE_TAG, ImageRecord, RestartPolicy,
};

/// `created` 상태로 머물 수 있는 최대 시간
pub const CREATED_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

const SECONDS_PER_HOUR: u64 = 60 * 60;
const HOURS_PER_DAY: u64 = 24;

/// 재시작 정책과 재시작 횟수로 컨테이너 삭제 가능 여부를 판정합니다.
///
/// `always_restart_threshold`가 0이면 `always` 정책 컨테이너는 절대 삭제되지 않습니다.
pub fn is_container_removable(record: &ContainerRecord, always_restart_threshold: u32) -> bool {
    restart_policy_allows_removal(
        &record.restart_policy,
        record.restart_count,
        always_restart_threshold,
    )
}

/// 재시작 정책과 횟수만으로 판정합니다. 종료 이벤트처럼 inspect 결과만 있는 경우에 사용합니다.
pub fn restart_policy_allows_removal(
    policy: &RestartPolicy,
    restart_count: u64,
    always_restart_threshold: u32,
) -> bool {
    match policy {
        RestartPolicy::Disabled | RestartPolicy::UnlessStopped => true,
        RestartPolicy::Always => {
            always_restart_threshold > 0 && restart_count >= u64::from(always_restart_threshold)
        }
        RestartPolicy::OnFailure { max_retries } => restart_count >= *max_retries,
        RestartPolicy::Unknown(_) => false,
    }
}

/// 생성 후 시작되지 못한 채 [`CREATED_TIMEOUT`]을 넘겼는지 판정합니다.
///
/// 생성 시각이 `now`보다 미래이면 멈춘 것으로 보지 않습니다.
pub fn is_creation_stuck(record: &ContainerRecord, now: SystemTime) -> bool {
    record.status == ContainerStatus::Created
        && now
            .duration_since(record.created_at)
            .is_ok_and(|age| age > CREATED_TIMEOUT)
}

/// 이미지 수명이 임계값(일)에 도달했는지 판정합니다.
///
/// 경과 시간을 시간 단위로 내림한 뒤 24로 나눈 값을 일수로 사용하며,
/// 정확히 임계값에 도달한 경우도 만료로 봅니다. 미래 생성 시각은 0일로 취급합니다.
pub fn is_image_expired(created_at: SystemTime, threshold_days: u16, now: SystemTime) -> bool {
    let age = now.duration_since(created_at).unwrap_or_default();
    let days = age.as_secs() / SECONDS_PER_HOUR / HOURS_PER_DAY;
    days >= u64::from(threshold_days)
}

/// 태그 목록에 dangling sentinel이 있는지 확인합니다.
pub fn is_image_dangling(record: &ImageRecord) -> bool {
    record.tags.iter().any(|tag| tag == DANGLING_IMAGE_TAG)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn container(policy: RestartPolicy, restart_count: u64) -> ContainerRecord {
        ContainerRecord {
            id: "abc123".to_owned(),
            image: "nginx:latest".to_owned(),
            image_id: "sha256:aaa".to_owned(),
            labels: HashMap::new(),
            created_at: SystemTime::UNIX_EPOCH,
            status: ContainerStatus::Exited,
            restart_count,
            restart_policy: policy,
        }
    }

    fn image(tags: &[&str]) -> ImageRecord {
        ImageRecord {
            id: "sha256:img".to_owned(),
            labels: HashMap::new(),
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn disabled_policy_is_removable() {
        assert!(is_container_removable(&container(RestartPolicy::Disabled, 0), 0));
        assert!(is_container_removable(&container(RestartPolicy::Disabled, 99), 5));
    }

    #[test]
    fn unless_stopped_policy_is_removable() {
        assert!(is_container_removable(
            &container(RestartPolicy::UnlessStopped, 3),
            0
        ));
    }

    #[test]
    fn always_policy_with_zero_threshold_is_never_removable() {
        assert!(!is_container_removable(&container(RestartPolicy::Always, 5), 0));
    }

    #[test]
    fn always_policy_respects_threshold() {
        assert!(!is_container_removable(&container(RestartPolicy::Always, 2), 3));
        assert!(is_container_removable(&container(RestartPolicy::Always, 3), 3));
        assert!(is_container_removable(&container(RestartPolicy::Always, 4), 3));
    }

    #[test]
    fn on_failure_policy_compares_with_max_retries() {
        let policy = RestartPolicy::OnFailure { max_retries: 3 };
        assert!(!is_container_removable(&container(policy.clone(), 2), 0));
        assert!(is_container_removable(&container(policy, 3), 0));
    }

    #[test]
    fn unknown_policy_is_not_removable() {
        let record = container(RestartPolicy::Unknown("sometimes".to_owned()), 100);
        assert!(!is_container_removable(&record, 1));
    }

    #[test]
    fn created_container_past_timeout_is_stuck() {
        let now = SystemTime::now();
        let mut record = container(RestartPolicy::Always, 0);
        record.status = ContainerStatus::Created;
        record.created_at = now - CREATED_TIMEOUT - Duration::from_secs(1);
        assert!(is_creation_stuck(&record, now));
    }

    #[test]
    fn created_container_within_timeout_is_not_stuck() {
        let now = SystemTime::now();
        let mut record = container(RestartPolicy::Always, 0);
        record.status = ContainerStatus::Created;
        record.created_at = now - Duration::from_secs(60);
        assert!(!is_creation_stuck(&record, now));

        record.created_at = now - CREATED_TIMEOUT;
        assert!(!is_creation_stuck(&record, now));
    }

    #[test]
    fn created_in_future_is_not_stuck() {
        let now = SystemTime::now();
        let mut record = container(RestartPolicy::Disabled, 0);
        record.status = ContainerStatus::Created;
        record.created_at = now + DAY;
        assert!(!is_creation_stuck(&record, now));
    }

    #[test]
    fn exited_container_is_never_stuck() {
        let now = SystemTime::now();
        let mut record = container(RestartPolicy::Disabled, 0);
        record.created_at = now - 10 * DAY;
        assert!(!is_creation_stuck(&record, now));
    }

    #[test]
    fn image_expiry_boundary_is_inclusive() {
        let now = SystemTime::now();
        assert!(is_image_expired(now - 100 * DAY, 100, now));
        assert!(!is_image_expired(
            now - 100 * DAY + Duration::from_secs(1),
            100,
            now
        ));
        assert!(is_image_expired(now - 101 * DAY, 100, now));
    }

    #[test]
    fn image_expiry_uses_whole_days() {
        let now = SystemTime::now();
        let almost_two_days = 2 * DAY - Duration::from_secs(3600);
        assert!(!is_image_expired(now - almost_two_days, 2, now));
        assert!(is_image_expired(now - almost_two_days, 1, now));
    }

    #[test]
    fn image_created_in_future_is_zero_days_old() {
        let now = SystemTime::now();
        assert!(!is_image_expired(now + DAY, 1, now));
        assert!(is_image_expired(now + DAY, 0, now));
    }

    #[test]
    fn dangling_detection_uses_sentinel_tag() {
        assert!(is_image_dangling(&image(&["<none>:<none>"])));
        assert!(!is_image_dangling(&image(&["nginx:latest"])));
        assert!(!is_image_dangling(&image(&[])));
    }

    #[test]
    fn fresh_dangling_image_is_a_candidate() {
        let now = SystemTime::now();
        let img = image(&["<none>:<none>"]);
        assert!(!is_image_expired(img.created_at, 30, now));
        assert!(is_image_dangling(&img));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn disabled_and_unless_stopped_ignore_restart_count(
                count in any::<u64>(),
                threshold in any::<u32>(),
            ) {
                let disabled = container(RestartPolicy::Disabled, count);
                let unless_stopped = container(RestartPolicy::UnlessStopped, count);
                prop_assert!(is_container_removable(&disabled, threshold));
                prop_assert!(is_container_removable(&unless_stopped, threshold));
            }

            #[test]
            fn always_with_zero_threshold_never_removable(count in any::<u64>()) {
                prop_assert!(!is_container_removable(&container(RestartPolicy::Always, count), 0));
            }

            #[test]
            fn always_removable_iff_count_reaches_threshold(
                count in 0u64..1000,
                threshold in 1u32..1000,
            ) {
                let always = container(RestartPolicy::Always, count);
                let removable = is_container_removable(&always, threshold);
                prop_assert_eq!(removable, count >= u64::from(threshold));
            }

            #[test]
            fn on_failure_removable_iff_count_reaches_max(
                count in 0u64..1000,
                max_retries in 0u64..1000,
            ) {
                let record = container(RestartPolicy::OnFailure { max_retries }, count);
                prop_assert_eq!(is_container_removable(&record, 0), count >= max_retries);
            }

            #[test]
            fn expiry_matches_floor_of_days(
                age_secs in 0u64..(400 * 24 * 3600),
                threshold in 0u16..400,
            ) {
                let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
                let created = now - Duration::from_secs(age_secs);
                let expected = age_secs / 3600 / 24 >= u64::from(threshold);
                prop_assert_eq!(is_image_expired(created, threshold, now), expected);
            }
        }
    }
}
