//! 설정 관리 -- scour.toml 파싱 및 런타임 설정
//!
//! [`ScourConfig`]는 모든 섹션의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SCOUR_CLEANUP_POLL_INTERVAL_HOURS=6` 형식)
//! 3. 설정 파일 (`scour.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), scour_core::error::ScourError> {
//! use scour_core::config::ScourConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ScourConfig::load("scour.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ScourConfig::parse("[images]\nlifetime_threshold_days = 7")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ScourError};

/// 설정 상한값 상수
pub const MAX_CONCURRENCY_LEVEL: usize = 255;
pub const MAX_POLL_INTERVAL_HOURS: u64 = 24 * 365;

/// scour 통합 설정
///
/// `scour.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScourConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 정리 주기/동시성 설정
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// 이미지 정책
    #[serde(default)]
    pub images: ImagesConfig,
    /// 컨테이너 정책
    #[serde(default)]
    pub containers: ContainersConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ScourConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ScourError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값을 사용하여 설정을 로드합니다.
    ///
    /// 파일이 없는 경우 경고를 남기고 기본값 + 환경변수 오버라이드로 진행합니다.
    /// 파일이 존재하지만 파싱에 실패하면 에러를 반환합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ScourError> {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(ScourError::Config(ConfigError::FileNotFound { path })) => {
                warn!(path = %path, "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ScourError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScourError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ScourError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ScourError> {
        toml::from_str(toml_str).map_err(|e| {
            ScourError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SCOUR_{SECTION}_{FIELD}`
    /// 예: `SCOUR_IMAGES_LIFETIME_THRESHOLD_DAYS=14`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SCOUR_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SCOUR_GENERAL_LOG_FORMAT");

        // Docker
        override_string(&mut self.docker.socket, "SCOUR_DOCKER_SOCKET");
        override_parsed(&mut self.docker.timeout_secs, "SCOUR_DOCKER_TIMEOUT_SECS");

        // Cleanup
        override_parsed(
            &mut self.cleanup.concurrency_level,
            "SCOUR_CLEANUP_CONCURRENCY_LEVEL",
        );
        override_parsed(
            &mut self.cleanup.poll_interval_hours,
            "SCOUR_CLEANUP_POLL_INTERVAL_HOURS",
        );

        // Images
        override_parsed(
            &mut self.images.lifetime_threshold_days,
            "SCOUR_IMAGES_LIFETIME_THRESHOLD_DAYS",
        );
        override_csv(&mut self.images.ignore_labels, "SCOUR_IMAGES_IGNORE_LABELS");

        // Containers
        override_parsed(
            &mut self.containers.max_always_restart_count,
            "SCOUR_CONTAINERS_MAX_ALWAYS_RESTART_COUNT",
        );
        override_csv(
            &mut self.containers.ignore_labels,
            "SCOUR_CONTAINERS_IGNORE_LABELS",
        );
        override_parsed(
            &mut self.containers.force_volume_cleanup,
            "SCOUR_CONTAINERS_FORCE_VOLUME_CLEANUP",
        );
        override_parsed(
            &mut self.containers.force_link_cleanup,
            "SCOUR_CONTAINERS_FORCE_LINK_CLEANUP",
        );

        // Metrics
        override_parsed(&mut self.metrics.enabled, "SCOUR_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "SCOUR_METRICS_LISTEN_ADDR");
        override_parsed(&mut self.metrics.port, "SCOUR_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ScourError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.docker.timeout_secs == 0 {
            return Err(invalid("docker.timeout_secs", "must be greater than 0"));
        }

        if self.cleanup.concurrency_level == 0
            || self.cleanup.concurrency_level > MAX_CONCURRENCY_LEVEL
        {
            return Err(invalid(
                "cleanup.concurrency_level",
                format!("must be 1-{MAX_CONCURRENCY_LEVEL}"),
            ));
        }

        if self.cleanup.poll_interval_hours == 0
            || self.cleanup.poll_interval_hours > MAX_POLL_INTERVAL_HOURS
        {
            return Err(invalid(
                "cleanup.poll_interval_hours",
                format!("must be 1-{MAX_POLL_INTERVAL_HOURS}"),
            ));
        }

        validate_labels("images.ignore_labels", &self.images.ignore_labels)?;
        validate_labels("containers.ignore_labels", &self.containers.ignore_labels)?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be greater than 0 when metrics are enabled",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ScourError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 레이블 키는 비어 있거나 공백을 포함할 수 없습니다.
fn validate_labels(field: &str, labels: &[String]) -> Result<(), ScourError> {
    for label in labels {
        if label.is_empty() {
            return Err(invalid(field, "label must not be empty"));
        }
        if label.chars().any(char::is_whitespace) {
            return Err(invalid(
                field,
                format!("label '{label}' must not contain whitespace"),
            ));
        }
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값 사용)
    pub socket: String,
    /// API 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: String::new(),
            timeout_secs: 120,
        }
    }
}

/// 정리 주기/동시성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// 동시에 진행할 inspect/삭제 작업 최대 수
    pub concurrency_level: usize,
    /// 이미지 만료 검사 주기 (시간)
    pub poll_interval_hours: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            concurrency_level: 10,
            poll_interval_hours: 24,
        }
    }
}

/// 이미지 정책
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// 이미지 수명 임계값 (일)
    pub lifetime_threshold_days: u16,
    /// 이 레이블 키를 가진 이미지는 삭제하지 않음
    pub ignore_labels: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            lifetime_threshold_days: 30,
            ignore_labels: Vec::new(),
        }
    }
}

/// 컨테이너 정책
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    /// `always` 정책 컨테이너의 삭제 기준 재시작 횟수 (0이면 비활성)
    pub max_always_restart_count: u32,
    /// 이 레이블 키를 가진 컨테이너는 삭제하지 않음
    pub ignore_labels: Vec<String>,
    /// 컨테이너 삭제 시 익명 볼륨도 함께 삭제
    pub force_volume_cleanup: bool,
    /// 컨테이너 삭제 시 링크도 함께 삭제
    pub force_link_cleanup: bool,
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9184,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = std::any::type_name::<T>(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
