//! Outpost IO 코어 -- 카테고리별 수집, 버퍼링, 플러시, 실패 캐시 재전송
//!
//! 수집기가 제출한 배치를 카테고리 채널로 받아 컨슈머가 버퍼링하고,
//! 시간/크기 기준으로 [`Sender`]에 전송합니다. 전송에 실패한 포인트는
//! 카테고리 정책에 따라 디스크 실패 캐시에 저장되어 주기적으로 재전송됩니다.
//!
//! # 모듈 구성
//! - [`manager`]: 수집 진입점 ([`IoHandle`])과 컨슈머 감독 ([`IoManager`])
//! - `consumer`: 카테고리 파티션별 제어 루프 (내부)
//! - [`fail_cache`]: 디스크 기반 재전송 로그
//! - [`file_sink`]: 디버그 파일 출력
//! - [`stats`]: 카테고리 카운터와 소스별 상태
//! - [`sender`]: 원격 전송 경계
//! - [`config`]: 런타임 설정
//! - [`error`]: 에러 타입

pub mod config;
mod consumer;
pub mod data;
pub mod error;
pub mod fail_cache;
pub mod file_sink;
pub mod manager;
pub mod sender;
pub mod stats;

pub use config::{IoSettings, IoSettingsBuilder};
pub use data::IoData;
pub use error::IoError;
pub use fail_cache::{CacheEntry, DrainReport, FailCache, MAX_REPLAY_ENTRIES};
pub use file_sink::{FileSink, MAX_OUTPUT_FILE_BYTES};
pub use manager::{ChannelUsage, IoHandle, IoManager, IoManagerBuilder};
pub use sender::Sender;
pub use stats::{CounterSnapshot, InputStat, IoStats};
