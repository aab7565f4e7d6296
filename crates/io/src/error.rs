//! IO 코어 에러 타입
//!
//! [`IoError`]는 수집, 플러시, 실패 캐시, 파일 출력에서 발생하는 에러를 표현합니다.
//! 컨슈머 루프 안의 에러는 카운터와 로그로만 기록되고 밖으로 전파되지 않습니다.
//! `From<IoError> for OutpostError` 변환으로 상위 레이어에서 `?`를 사용할 수 있습니다.

use outpost_core::error::{OutpostError, PipelineError};

/// IO 코어 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Sender가 설정되지 않음
    #[error("io sender is not configured")]
    SenderUnavailable,

    /// Sender 전송 실패 (아무것도 전달되지 않음)
    #[error("send to '{category}' failed: {reason}")]
    Send {
        /// 전송 대상 카테고리 또는 목적지
        category: String,
        /// 실패 사유
        reason: String,
    },

    /// 채널이 가득 차서 배치를 드롭함
    #[error("channel for '{category}' is full, batch dropped")]
    ChannelFull {
        /// 카테고리명
        category: String,
    },

    /// 종료 중이라 새 배치를 받지 않음
    #[error("io is shutting down")]
    ShuttingDown,

    /// 실패 캐시 용량 초과
    #[error("fail cache for '{category}' is full ({size} bytes, max {max})")]
    CacheFull {
        /// 카테고리명
        category: String,
        /// 현재 크기
        size: u64,
        /// 최대 크기
        max: u64,
    },

    /// 실패 캐시 레코드 인코딩/디코딩 실패
    #[error("fail cache record error: {0}")]
    CacheRecord(String),

    /// 파일 출력 실패
    #[error("file sink error: {path}: {reason}")]
    FileSink {
        /// 출력 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화 에러
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<IoError> for OutpostError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::ShuttingDown => OutpostError::Pipeline(PipelineError::ShuttingDown),
            IoError::Io(e) => OutpostError::Io(e),
            other => OutpostError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_display() {
        let err = IoError::Send {
            category: "logging".to_owned(),
            reason: "connection refused".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("logging"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn cache_full_display() {
        let err = IoError::CacheFull {
            category: "tracing".to_owned(),
            size: 2048,
            max: 1024,
        };
        assert!(err.to_string().contains("2048"));
    }

    #[test]
    fn shutting_down_converts_to_pipeline_error() {
        let err: OutpostError = IoError::ShuttingDown.into();
        assert!(matches!(
            err,
            OutpostError::Pipeline(PipelineError::ShuttingDown)
        ));
    }
}
