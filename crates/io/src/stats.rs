//! 카테고리 카운터와 소스별 상태
//!
//! [`IoStats`]는 IO 매니저 시작 시 한 번 생성되어 모든 컨슈머와 수집기 핸들이
//! 공유합니다. 프로세스 종료까지 유지됩니다.
//!
//! - 카테고리 카운터: 카테고리마다 원자적 `sent`/`failed` 쌍 (테이블 기반)
//! - 드롭 카운터: 수집 단계에서 버려진 배치 수
//! - 소스 상태: 소스 이름별 [`InputStat`], 단일 `RwLock`으로 보호
//!
//! 카운터는 원자 연산으로만 접근하며 `RwLock` 안에서 갱신하지 않습니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::Serialize;

use outpost_core::category::Category;
use outpost_core::metrics as m;

/// 회계용 카테고리 별칭 테이블
///
/// 왼쪽 카테고리의 트래픽은 오른쪽 카테고리 카운터로 집계되고, 기본 버퍼도
/// 오른쪽 카테고리 이름으로 전송됩니다. 동적 라우팅 트래픽은 현재 합성
/// 모니터링(로그 성격) 데이터뿐이므로 Logging으로 집계합니다.
pub const COUNTER_ALIASES: &[(Category, Category)] =
    &[(Category::DynamicDataway, Category::Logging)];

/// 별칭 테이블을 적용한 회계용 카테고리를 반환합니다.
pub fn accounting_category(category: Category) -> Category {
    COUNTER_ALIASES
        .iter()
        .find(|(from, _)| *from == category)
        .map(|(_, to)| *to)
        .unwrap_or(category)
}

/// 카테고리별 원자 카운터
#[derive(Debug, Default)]
pub struct CategoryCounters {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl CategoryCounters {
    /// 전달된 포인트 수
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// 실패한 포인트 수
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// 카운터 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// 전달된 포인트 수
    pub sent: u64,
    /// 실패한 포인트 수
    pub failed: u64,
}

/// 소스(수집기)별 상태
#[derive(Debug, Clone, Serialize)]
pub struct InputStat {
    /// 처음 관측된 시각
    pub first_seen: SystemTime,
    /// 마지막으로 관측된 시각
    pub last_seen: SystemTime,
    /// 누적 수집 포인트 수
    pub total_points: u64,
    /// 마지막 에러 메시지
    pub last_error: Option<String>,
    /// 마지막 에러 시각
    pub last_error_at: Option<SystemTime>,
}

impl InputStat {
    fn new(now: SystemTime) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            total_points: 0,
            last_error: None,
            last_error_at: None,
        }
    }
}

/// IO 통계 레지스트리
#[derive(Debug)]
pub struct IoStats {
    counters: HashMap<Category, CategoryCounters>,
    dropped_total: AtomicU64,
    inputs: RwLock<HashMap<String, InputStat>>,
}

impl Default for IoStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IoStats {
    /// 별칭이 아닌 모든 카테고리에 대해 카운터를 생성합니다.
    pub fn new() -> Self {
        let counters = Category::ALL
            .iter()
            .filter(|c| accounting_category(**c) == **c)
            .map(|c| (*c, CategoryCounters::default()))
            .collect();
        Self {
            counters,
            dropped_total: AtomicU64::new(0),
            inputs: RwLock::new(HashMap::new()),
        }
    }

    /// 카테고리의 카운터를 반환합니다 (별칭 적용).
    pub fn counters(&self, category: Category) -> Option<&CategoryCounters> {
        self.counters.get(&accounting_category(category))
    }

    /// 전달 성공을 기록합니다.
    pub fn record_sent(&self, category: Category, points: u64) {
        if points == 0 {
            return;
        }
        let target = accounting_category(category);
        if let Some(c) = self.counters.get(&target) {
            c.sent.fetch_add(points, Ordering::Relaxed);
        }
        metrics::counter!(m::IO_POINTS_SENT_TOTAL, m::LABEL_CATEGORY => target.as_str())
            .increment(points);
    }

    /// 전달 실패를 기록합니다.
    pub fn record_failed(&self, category: Category, points: u64) {
        if points == 0 {
            return;
        }
        let target = accounting_category(category);
        if let Some(c) = self.counters.get(&target) {
            c.failed.fetch_add(points, Ordering::Relaxed);
        }
        metrics::counter!(m::IO_POINTS_FAILED_TOTAL, m::LABEL_CATEGORY => target.as_str())
            .increment(points);
    }

    /// 수집 단계의 배치 드롭을 기록합니다.
    pub fn record_dropped(&self, category: Category) {
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::IO_BATCHES_DROPPED_TOTAL, m::LABEL_CATEGORY => category.as_str())
            .increment(1);
    }

    /// 누적 드롭 배치 수
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// 소스가 포인트를 제출했음을 기록합니다.
    pub fn observe_input(&self, source: &str, points: usize) {
        let now = SystemTime::now();
        let mut inputs = self.inputs.write().unwrap_or_else(|e| e.into_inner());
        let stat = inputs
            .entry(source.to_owned())
            .or_insert_with(|| InputStat::new(now));
        stat.last_seen = now;
        stat.total_points += points as u64;
    }

    /// 소스의 마지막 에러를 기록합니다.
    pub fn record_error(&self, source: &str, error: &str) {
        let now = SystemTime::now();
        let mut inputs = self.inputs.write().unwrap_or_else(|e| e.into_inner());
        let stat = inputs
            .entry(source.to_owned())
            .or_insert_with(|| InputStat::new(now));
        stat.last_seen = now;
        stat.last_error = Some(error.to_owned());
        stat.last_error_at = Some(now);
    }

    /// 카테고리 카운터 스냅샷 (별칭 적용)
    pub fn snapshot(&self, category: Category) -> CounterSnapshot {
        self.counters(category)
            .map(|c| CounterSnapshot {
                sent: c.sent(),
                failed: c.failed(),
            })
            .unwrap_or_default()
    }

    /// 모든 카테고리 카운터 스냅샷
    pub fn category_stats(&self) -> BTreeMap<Category, CounterSnapshot> {
        self.counters
            .keys()
            .map(|c| (*c, self.snapshot(*c)))
            .collect()
    }

    /// 소스 상태 스냅샷
    pub fn input_stats(&self) -> HashMap<String, InputStat> {
        self.inputs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 특정 소스의 상태
    pub fn input_stat(&self, source: &str) -> Option<InputStat> {
        self.inputs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_dataway_is_accounted_as_logging() {
        assert_eq!(
            accounting_category(Category::DynamicDataway),
            Category::Logging
        );
        assert_eq!(accounting_category(Category::Tracing), Category::Tracing);

        let stats = IoStats::new();
        stats.record_sent(Category::DynamicDataway, 3);
        stats.record_failed(Category::DynamicDataway, 2);
        assert_eq!(
            stats.snapshot(Category::Logging),
            CounterSnapshot { sent: 3, failed: 2 }
        );
    }

    #[test]
    fn aliased_category_has_no_own_row() {
        let stats = IoStats::new();
        let all = stats.category_stats();
        assert!(!all.contains_key(&Category::DynamicDataway));
        assert_eq!(all.len(), Category::ALL.len() - COUNTER_ALIASES.len());
    }

    #[test]
    fn zero_point_records_are_ignored() {
        let stats = IoStats::new();
        stats.record_sent(Category::Metric, 0);
        stats.record_failed(Category::Metric, 0);
        assert_eq!(stats.snapshot(Category::Metric), CounterSnapshot::default());
    }

    #[test]
    fn dropped_counter_accumulates() {
        let stats = IoStats::new();
        stats.record_dropped(Category::Rum);
        stats.record_dropped(Category::Metric);
        assert_eq!(stats.dropped_total(), 2);
    }

    #[test]
    fn input_stat_tracks_last_error() {
        let stats = IoStats::new();
        stats.observe_input("nginx", 10);
        stats.observe_input("nginx", 5);
        assert!(stats.input_stat("nginx").unwrap().last_error.is_none());

        stats.record_error("nginx", "send failed");
        let stat = stats.input_stat("nginx").unwrap();
        assert_eq!(stat.total_points, 15);
        assert_eq!(stat.last_error.as_deref(), Some("send failed"));
        assert!(stat.last_error_at.is_some());
        assert!(stat.first_seen <= stat.last_seen);
    }

    #[test]
    fn record_error_creates_unknown_source() {
        let stats = IoStats::new();
        stats.record_error("redis", "timeout");
        let all = stats.input_stats();
        assert_eq!(all.len(), 1);
        assert_eq!(all["redis"].total_points, 0);
    }
}
