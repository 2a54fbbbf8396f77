//! 정리 엔진 에러 타입
//!
//! [`JanitorError`]는 정리 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<JanitorError> for ScourError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use scour_core::error::{ConfigError, RuntimeError, ScourError};
use scour_core::types::EntityKind;

/// 정리 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum JanitorError {
    /// 런타임 API 호출 실패 (목록 조회, inspect)
    #[error("runtime api error: {0}")]
    RuntimeApi(String),

    /// 런타임 소켓 연결 실패
    #[error("runtime connection error: {0}")]
    RuntimeConnection(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 이미지를 찾을 수 없음
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// 엔티티 삭제 실패
    #[error("error removing {kind} with id {id}: {reason}")]
    RemovalFailed {
        /// 엔티티 종류
        kind: EntityKind,
        /// 대상 ID
        id: String,
        /// 실패 사유
        reason: String,
    },

    /// 이벤트 구독 실패 (전송 계층)
    #[error("event stream error: {0}")]
    EventStream(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 취소 신호로 중단됨
    #[error("cancelled")]
    Cancelled,
}

impl JanitorError {
    /// 취소로 인한 종료인지 확인합니다.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<JanitorError> for ScourError {
    fn from(err: JanitorError) -> Self {
        match err {
            JanitorError::RuntimeApi(msg) | JanitorError::RuntimeConnection(msg) => {
                ScourError::Runtime(RuntimeError::Api(msg))
            }
            JanitorError::ContainerNotFound(id) | JanitorError::ImageNotFound(id) => {
                ScourError::Runtime(RuntimeError::NotFound(id))
            }
            JanitorError::RemovalFailed { kind, id, reason } => {
                ScourError::Runtime(RuntimeError::RemovalFailed {
                    kind: kind.to_string(),
                    id,
                    reason,
                })
            }
            JanitorError::EventStream(msg) => ScourError::Runtime(RuntimeError::EventStream(msg)),
            JanitorError::Config { field, reason } => {
                ScourError::Config(ConfigError::InvalidValue { field, reason })
            }
            JanitorError::Cancelled => ScourError::Runtime(RuntimeError::Cancelled),
        }
    }
}
