//! 도메인 타입 -- 런타임 엔티티의 시점 스냅샷
//!
//! 모든 레코드는 한 번의 sweep 또는 이벤트 처리 동안만 유효한 불변 스냅샷입니다.
//! 다음 사이클에서는 런타임 상태로부터 통째로 다시 만들어지며, 절대 수정되지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 시스템 자신이 사용하는 예약 레이블
///
/// 이 레이블이 붙은 엔티티는 설정과 무관하게 항상 삭제 대상에서 제외됩니다.
pub const RESERVED_LABEL: &str = "io.scour.service";

/// 태그가 없는(dangling) 이미지를 나타내는 sentinel 태그
pub const DANGLING_IMAGE_TAG: &str = "<none>:<none>";

/// 컨테이너 생명주기 상태
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// 실행 중
    Running,
    /// 종료됨
    Exited,
    /// 부분적으로만 삭제된 상태
    Dead,
    /// 생성되었지만 시작되지 않음
    Created,
    /// 그 외 상태 (paused, restarting, removing 등)
    Other(String),
}

impl ContainerStatus {
    /// Docker 상태 문자열에서 변환합니다.
    pub fn from_state(state: &str) -> Self {
        match state {
            "running" => Self::Running,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            "created" => Self::Created,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Docker 상태 필터에 사용하는 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Created => "created",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 컨테이너 재시작 정책
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// 재시작하지 않음 (`no` 또는 빈 문자열)
    #[default]
    Disabled,
    /// 명시적으로 정지하기 전까지 재시작
    UnlessStopped,
    /// 항상 재시작
    Always,
    /// 실패 시 최대 `max_retries`회 재시작
    OnFailure {
        /// 최대 재시도 횟수
        max_retries: u64,
    },
    /// 알 수 없는 정책 이름
    Unknown(String),
}

impl RestartPolicy {
    /// Docker의 정책 이름과 최대 재시도 횟수에서 변환합니다.
    ///
    /// Docker API는 빈 문자열을 `no`와 동일하게 취급합니다.
    pub fn from_docker(name: &str, maximum_retry_count: i64) -> Self {
        match name {
            "" | "no" => Self::Disabled,
            "unless-stopped" => Self::UnlessStopped,
            "always" => Self::Always,
            "on-failure" => Self::OnFailure {
                max_retries: u64::try_from(maximum_retry_count).unwrap_or(0),
            },
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// 로그 필드용 정책 이름
    pub fn name(&self) -> &str {
        match self {
            Self::Disabled => "no",
            Self::UnlessStopped => "unless-stopped",
            Self::Always => "always",
            Self::OnFailure { .. } => "on-failure",
            Self::Unknown(name) => name.as_str(),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnFailure { max_retries } => write!(f, "on-failure:{max_retries}"),
            other => f.write_str(other.name()),
        }
    }
}

/// 레이블 집합을 가진 엔티티
///
/// 레이블 필터가 컨테이너와 이미지를 동일하게 다루기 위한 좁은 인터페이스입니다.
pub trait Labeled {
    /// 엔티티의 레이블 맵
    fn labels(&self) -> &HashMap<String, String>;
}

/// 컨테이너 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// 컨테이너 ID
    pub id: String,
    /// 이미지 참조 이름
    pub image: String,
    /// 이미지 ID
    pub image_id: String,
    /// 레이블
    pub labels: HashMap<String, String>,
    /// 생성 시각
    pub created_at: SystemTime,
    /// 생명주기 상태
    pub status: ContainerStatus,
    /// 재시작 횟수
    pub restart_count: u64,
    /// 재시작 정책
    pub restart_policy: RestartPolicy,
}

impl Labeled for ContainerRecord {
    fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }
}

/// 이미지 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 이미지 ID
    pub id: String,
    /// 레이블
    pub labels: HashMap<String, String>,
    /// 저장소 태그 목록
    pub tags: Vec<String>,
    /// 생성 시각
    pub created_at: SystemTime,
}

impl Labeled for ImageRecord {
    fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }
}

/// 삭제 대상 엔티티 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// 컨테이너
    Container,
    /// 이미지
    Image,
}

impl EntityKind {
    /// 메트릭 레이블용 고정 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 런타임 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeEventKind {
    /// 컨테이너 프로세스 종료 (`die`)
    ContainerExit,
    /// 이미지 태그 제거 (`untag`)
    ImageUntag,
}

impl RuntimeEventKind {
    /// Docker 이벤트 액션 이름
    pub fn action(&self) -> &'static str {
        match self {
            Self::ContainerExit => "die",
            Self::ImageUntag => "untag",
        }
    }

    /// Docker 이벤트 타입 이름
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContainerExit => "container",
            Self::ImageUntag => "image",
        }
    }

    /// Docker 액션 이름에서 변환합니다. 관심 없는 액션이면 `None`.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "die" => Some(Self::ContainerExit),
            "untag" => Some(Self::ImageUntag),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerExit => write!(f, "container_exit"),
            Self::ImageUntag => write!(f, "image_untag"),
        }
    }
}

/// 런타임 라이브 구독에서 수신한 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// 이벤트 종류
    pub kind: RuntimeEventKind,
    /// 대상 엔티티 ID
    pub id: String,
}

impl RuntimeEvent {
    /// 새 이벤트를 생성합니다.
    pub fn new(kind: RuntimeEventKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}
