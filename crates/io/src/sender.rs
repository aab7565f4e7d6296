//! 원격 전송 경계
//!
//! 실제 네트워크 전송은 이 크레이트의 범위 밖입니다. 임베더가 [`Sender`]를
//! 구현하여 [`IoManagerBuilder::sender`](crate::manager::IoManagerBuilder::sender)로
//! 주입합니다.
//!
//! # 결과 해석
//! - `Ok(failed)`: `failed`를 제외한 포인트는 전달됨 (빈 벡터면 전체 성공)
//! - `Err(_)`: 아무것도 전달되지 않음
//!
//! 같은 포인트로 재시도해도 안전해야 합니다 (실패 캐시 재전송).

use outpost_core::pipeline::BoxFuture;
use outpost_core::point::Point;

use crate::error::IoError;

/// 원격 전송기
///
/// `Arc<dyn Sender>`로 모든 컨슈머가 공유하므로 dyn-compatible하게
/// `BoxFuture`를 반환합니다.
pub trait Sender: Send + Sync {
    /// `category`(또는 동적 라우팅의 목적지)로 포인트를 전송합니다.
    fn write<'a>(
        &'a self,
        category: &'a str,
        points: Vec<Point>,
    ) -> BoxFuture<'a, Result<Vec<Point>, IoError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use outpost_core::point::PointBuilder;

    struct RejectOdd;

    impl Sender for RejectOdd {
        fn write<'a>(
            &'a self,
            _category: &'a str,
            points: Vec<Point>,
        ) -> BoxFuture<'a, Result<Vec<Point>, IoError>> {
            Box::pin(async move {
                Ok(points
                    .into_iter()
                    .filter(|p| p.timestamp() % 2 == 1)
                    .collect())
            })
        }
    }

    #[tokio::test]
    async fn dyn_sender_reports_partial_failure() {
        let sender: Arc<dyn Sender> = Arc::new(RejectOdd);
        let points = (0..4)
            .map(|i| {
                PointBuilder::new("m")
                    .field("v", i)
                    .timestamp(i)
                    .build()
                    .unwrap()
            })
            .collect();
        let failed = sender.write("logging", points).await.unwrap();
        assert_eq!(failed.len(), 2);
    }
}
