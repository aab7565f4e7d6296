//! 카테고리 레지스트리 -- 텔레메트리 데이터 분류
//!
//! [`Category`]는 수집기가 생산하는 데이터의 고정된 종류를 나타냅니다.
//! 카테고리마다 별도의 수집 채널, 컨슈머, 실패 캐시가 할당됩니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 텔레메트리 카테고리
///
/// `DynamicDataway`는 목적지별 라우팅에 사용되는 합성 카테고리입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 메트릭
    Metric,
    /// 네트워크
    Network,
    /// 이벤트
    KeyEvent,
    /// 오브젝트
    Object,
    /// 사용자 정의 오브젝트
    CustomObject,
    /// 로그
    Logging,
    /// 트레이스
    Tracing,
    /// RUM (Real User Monitoring)
    Rum,
    /// 보안
    Security,
    /// 프로파일링
    Profiling,
    /// 목적지별 동적 라우팅 (합성 카테고리)
    DynamicDataway,
}

impl Category {
    /// 모든 카테고리 (컨슈머 시작 순서)
    pub const ALL: [Category; 11] = [
        Category::Metric,
        Category::Network,
        Category::KeyEvent,
        Category::Object,
        Category::CustomObject,
        Category::Logging,
        Category::Tracing,
        Category::Rum,
        Category::Security,
        Category::Profiling,
        Category::DynamicDataway,
    ];

    /// Sender에 전달되는 카테고리 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Network => "network",
            Self::KeyEvent => "keyevent",
            Self::Object => "object",
            Self::CustomObject => "custom_object",
            Self::Logging => "logging",
            Self::Tracing => "tracing",
            Self::Rum => "rum",
            Self::Security => "security",
            Self::Profiling => "profiling",
            Self::DynamicDataway => "dynamic_dataway",
        }
    }

    /// 여러 컨슈머가 같은 채널을 나눠 읽는 고처리량 카테고리인지 확인합니다.
    pub fn is_high_throughput(&self) -> bool {
        matches!(
            self,
            Self::Metric | Self::Network | Self::Logging | Self::Tracing | Self::Rum
        )
    }

    /// 전송 실패 시 실패 캐시에 보존되는 카테고리인지 확인합니다.
    ///
    /// 메트릭과 동적 라우팅 데이터는 캐시하지 않고 드롭합니다.
    pub fn is_cache_eligible(&self) -> bool {
        !matches!(self, Self::Metric | Self::DynamicDataway)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "category".to_owned(),
                reason: format!("unknown category '{s}'"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip_through_from_str() {
        for category in Category::ALL {
            let parsed: Category = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("metrics".parse::<Category>().is_err());
    }

    #[test]
    fn high_throughput_set() {
        let fan_out: Vec<_> = Category::ALL
            .iter()
            .filter(|c| c.is_high_throughput())
            .collect();
        assert_eq!(
            fan_out,
            vec![
                &Category::Metric,
                &Category::Network,
                &Category::Logging,
                &Category::Tracing,
                &Category::Rum
            ]
        );
    }

    #[test]
    fn metric_and_dynamic_are_not_cached() {
        assert!(!Category::Metric.is_cache_eligible());
        assert!(!Category::DynamicDataway.is_cache_eligible());
        assert!(Category::Logging.is_cache_eligible());
        assert!(Category::KeyEvent.is_cache_eligible());
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(Category::CustomObject.to_string(), "custom_object");
    }
}
