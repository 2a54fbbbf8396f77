//! 삭제 정책 설정
//!
//! [`RemovalPolicy`]는 core의 [`ScourConfig`](scour_core::config::ScourConfig)를
//! 기반으로 정리 엔진이 런타임에 읽기 전용으로 사용하는 정책을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use scour_core::config::ScourConfig;
//! use scour_janitor::config::RemovalPolicy;
//!
//! let core_config = ScourConfig::default();
//! let policy = RemovalPolicy::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use scour_core::config::{MAX_CONCURRENCY_LEVEL, MAX_POLL_INTERVAL_HOURS, ScourConfig};

use crate::error::JanitorError;

/// 삭제 정책
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPolicy {
    /// 동시 inspect/삭제 작업 최대 수
    pub concurrency_level: usize,
    /// 이미지 만료 검사 주기 (시간)
    pub poll_interval_hours: u64,
    /// 이미지 수명 임계값 (일)
    pub image_lifetime_threshold_days: u16,
    /// 삭제에서 제외할 이미지 레이블 키
    pub image_ignore_labels: Vec<String>,
    /// `always` 정책 컨테이너 삭제 기준 재시작 횟수 (0이면 비활성)
    pub max_always_restart_count: u32,
    /// 삭제에서 제외할 컨테이너 레이블 키
    pub container_ignore_labels: Vec<String>,
    /// 컨테이너 삭제 시 볼륨도 삭제
    pub force_volume_cleanup: bool,
    /// 컨테이너 삭제 시 링크도 삭제
    pub force_link_cleanup: bool,
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self::from_core(&ScourConfig::default())
    }
}

impl RemovalPolicy {
    /// core 설정에서 삭제 정책을 생성합니다.
    pub fn from_core(core: &ScourConfig) -> Self {
        Self {
            concurrency_level: core.cleanup.concurrency_level,
            poll_interval_hours: core.cleanup.poll_interval_hours,
            image_lifetime_threshold_days: core.images.lifetime_threshold_days,
            image_ignore_labels: core.images.ignore_labels.clone(),
            max_always_restart_count: core.containers.max_always_restart_count,
            container_ignore_labels: core.containers.ignore_labels.clone(),
            force_volume_cleanup: core.containers.force_volume_cleanup,
            force_link_cleanup: core.containers.force_link_cleanup,
        }
    }

    /// 폴링 주기를 `Duration`으로 반환합니다.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_hours.saturating_mul(3600))
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), JanitorError> {
        if self.concurrency_level == 0 || self.concurrency_level > MAX_CONCURRENCY_LEVEL {
            return Err(JanitorError::Config {
                field: "concurrency_level".to_owned(),
                reason: format!("must be 1-{MAX_CONCURRENCY_LEVEL}"),
            });
        }

        if self.poll_interval_hours == 0 || self.poll_interval_hours > MAX_POLL_INTERVAL_HOURS {
            return Err(JanitorError::Config {
                field: "poll_interval_hours".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_HOURS}"),
            });
        }

        for (field, labels) in [
            ("image_ignore_labels", &self.image_ignore_labels),
            ("container_ignore_labels", &self.container_ignore_labels),
        ] {
            if labels
                .iter()
                .any(|l| l.is_empty() || l.chars().any(char::is_whitespace))
            {
                return Err(JanitorError::Config {
                    field: field.to_owned(),
                    reason: "labels must be non-empty and contain no whitespace".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// 삭제 정책 빌더
#[derive(Default)]
pub struct RemovalPolicyBuilder {
    policy: RemovalPolicy,
}

impl RemovalPolicyBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 동시 작업 최대 수를 설정합니다.
    pub fn concurrency_level(mut self, level: usize) -> Self {
        self.policy.concurrency_level = level;
        self
    }

    /// 폴링 주기(시간)를 설정합니다.
    pub fn poll_interval_hours(mut self, hours: u64) -> Self {
        self.policy.poll_interval_hours = hours;
        self
    }

    /// 이미지 수명 임계값(일)을 설정합니다.
    pub fn image_lifetime_threshold_days(mut self, days: u16) -> Self {
        self.policy.image_lifetime_threshold_days = days;
        self
    }

    /// 이미지 무시 레이블을 추가합니다.
    pub fn image_ignore_label(mut self, label: impl Into<String>) -> Self {
        self.policy.image_ignore_labels.push(label.into());
        self
    }

    /// `always` 정책 재시작 임계값을 설정합니다.
    pub fn max_always_restart_count(mut self, count: u32) -> Self {
        self.policy.max_always_restart_count = count;
        self
    }

    /// 컨테이너 무시 레이블을 추가합니다.
    pub fn container_ignore_label(mut self, label: impl Into<String>) -> Self {
        self.policy.container_ignore_labels.push(label.into());
        self
    }

    /// 볼륨 동시 삭제 여부를 설정합니다.
    pub fn force_volume_cleanup(mut self, force: bool) -> Self {
        self.policy.force_volume_cleanup = force;
        self
    }

    /// 링크 동시 삭제 여부를 설정합니다.
    pub fn force_link_cleanup(mut self, force: bool) -> Self {
        self.policy.force_link_cleanup = force;
        self
    }

    /// 정책을 검증하고 `RemovalPolicy`를 생성합니다.
    pub fn build(self) -> Result<RemovalPolicy, JanitorError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}
