//! 에러 타입 -- 도메인별 에러 정의

/// Outpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum OutpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 포인트 생성/파싱 에러
    #[error("point error: {0}")]
    Point(#[from] PointError),

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

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 종료 진행 중이라 새 작업을 받지 않음
    #[error("pipeline is shutting down")]
    ShuttingDown,
}

/// 포인트 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointError {
    /// 측정 이름이 비어있음
    #[error("point name must not be empty")]
    EmptyName,

    /// 필드가 없음
    #[error("point '{name}' has no fields")]
    NoFields { name: String },

    /// 잘못된 필드 값
    #[error("invalid field '{key}': {reason}")]
    InvalidField { key: String, reason: String },

    /// 잘못된 태그
    #[error("invalid tag '{key}': {reason}")]
    InvalidTag { key: String, reason: String },

    /// 텍스트 파싱 실패
    #[error("malformed point text at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: OutpostError = ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        }
        .into();
        assert!(matches!(err, OutpostError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn malformed_point_display_has_line() {
        let err = PointError::Malformed {
            line: 3,
            reason: "expected key=value".to_owned(),
        };
        assert!(err.to_string().contains("line 3"));
    }
}
