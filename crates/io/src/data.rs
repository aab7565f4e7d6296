//! 수집 배치 타입

use outpost_core::category::Category;
use outpost_core::point::Point;

/// 수집기가 제출하는 배치
///
/// 생성 후에는 변경되지 않으며, 컨슈머 버퍼로 옮겨지면 소멸합니다.
#[derive(Debug, Clone)]
pub struct IoData {
    /// 대상 카테고리
    pub category: Category,
    /// 수집기(소스) 이름
    pub source: String,
    /// 포인트 목록 (제출 순서 유지)
    pub points: Vec<Point>,
    /// 목적지 오버라이드 (동적 라우팅)
    pub route: Option<String>,
}

impl IoData {
    /// 기본 목적지로 가는 배치를 생성합니다.
    pub fn new(category: Category, source: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            category,
            source: source.into(),
            points,
            route: None,
        }
    }

    /// 목적지 오버라이드를 지정합니다.
    pub fn with_route(mut self, destination: impl Into<String>) -> Self {
        self.route = Some(destination.into());
        self
    }

    /// 포인트 수
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 포인트가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::point::PointBuilder;

    #[test]
    fn route_override_is_optional() {
        let p = PointBuilder::new("http_dial")
            .field("ok", true)
            .timestamp(1)
            .build()
            .unwrap();
        let data = IoData::new(Category::DynamicDataway, "dialtesting", vec![p]);
        assert!(data.route.is_none());
        assert_eq!(data.len(), 1);

        let routed = data.with_route("https://dw.example.com");
        assert_eq!(routed.route.as_deref(), Some("https://dw.example.com"));
    }

    #[test]
    fn empty_batch() {
        let data = IoData::new(Category::Logging, "nginx", Vec::new());
        assert!(data.is_empty());
    }
}
