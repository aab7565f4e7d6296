//! 파이프라인 trait -- 생명주기 관리 확장 포인트

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::OutpostError;

/// dyn-compatible trait에서 사용하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 주의 필요
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 시작/정지/상태 확인 생명주기를 갖는 모듈
pub trait Pipeline: Send {
    /// 백그라운드 태스크를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), OutpostError>> + Send;

    /// 종료 신호를 보내고 모든 태스크가 끝날 때까지 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), OutpostError>> + Send;

    /// 현재 건강 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
