//! 에러 타입 -- 도메인별 에러 정의

/// scour 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ScourError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 컨테이너 런타임 관련 에러
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 컨테이너 런타임 에러
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// 런타임 API 호출 실패 (목록 조회, inspect 등)
    #[error("runtime api error: {0}")]
    Api(String),

    /// 엔티티를 찾을 수 없음
    #[error("not found: {0}")]
    NotFound(String),

    /// 엔티티 삭제 실패
    #[error("failed to remove {kind} '{id}': {reason}")]
    RemovalFailed {
        kind: String,
        id: String,
        reason: String,
    },

    /// 이벤트 구독 실패
    #[error("event stream error: {0}")]
    EventStream(String),

    /// 취소됨
    #[error("cancelled")]
    Cancelled,
}
