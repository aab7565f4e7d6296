//! Outpost 공통 크레이트
//!
//! 텔레메트리 에이전트 데이터 플레인이 공유하는 타입을 제공합니다.
//!
//! - [`category`]: 고정된 텔레메트리 카테고리 목록
//! - [`point`]: 불변 측정 포인트와 라인 프로토콜 직렬화
//! - [`config`]: `outpost.toml` 설정과 환경변수 오버라이드
//! - [`error`]: 도메인 에러 타입
//! - [`metrics`]: Prometheus 메트릭 이름 상수
//! - [`pipeline`]: 생명주기 trait

pub mod category;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod point;

// --- 주요 타입 re-export ---

// 카테고리 / 포인트
pub use category::Category;
pub use point::{FieldValue, Point, PointBuilder};

// 에러
pub use error::{ConfigError, OutpostError, PipelineError, PointError};

// 설정
pub use config::{IoConfig, OutpostConfig};

// 파이프라인 trait
pub use pipeline::{BoxFuture, HealthStatus, Pipeline};
