//! 메트릭 상수 및 설명 등록
//!
//! IO 코어가 내보내는 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `outpost_`
//! - 모듈명: `io_`, `fail_cache_`, `file_sink_`, `daemon_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 카테고리 레이블 키 (metric, logging, ...)
pub const LABEL_CATEGORY: &str = "category";

// ─── IO 메트릭 ─────────────────────────────────────────────────────

/// IO: 전송 성공 포인트 수 (counter, label: category)
pub const IO_POINTS_SENT_TOTAL: &str = "outpost_io_points_sent_total";

/// IO: 전송 실패 포인트 수 (counter, label: category)
pub const IO_POINTS_FAILED_TOTAL: &str = "outpost_io_points_failed_total";

/// IO: 수집 단계에서 드롭된 배치 수 (counter, label: category)
pub const IO_BATCHES_DROPPED_TOTAL: &str = "outpost_io_batches_dropped_total";

/// IO: 플러시 횟수 (counter, label: category)
pub const IO_FLUSHES_TOTAL: &str = "outpost_io_flushes_total";

/// IO: 채널에 대기 중인 배치 수 (gauge, label: category)
pub const IO_CHANNEL_PENDING: &str = "outpost_io_channel_pending";

// ─── Fail Cache 메트릭 ─────────────────────────────────────────────

/// Fail Cache: 캐시된 포인트 수 (counter, label: category)
pub const FAIL_CACHE_POINTS_CACHED_TOTAL: &str = "outpost_fail_cache_points_cached_total";

/// Fail Cache: 재전송 성공 엔트리 수 (counter, label: category)
pub const FAIL_CACHE_ENTRIES_REPLAYED_TOTAL: &str = "outpost_fail_cache_entries_replayed_total";

/// Fail Cache: 손상되어 버려진 레코드 수 (counter, label: category)
pub const FAIL_CACHE_MALFORMED_TOTAL: &str = "outpost_fail_cache_malformed_total";

// ─── File Sink 메트릭 ──────────────────────────────────────────────

/// File Sink: 기록된 바이트 수 (counter)
pub const FILE_SINK_BYTES_WRITTEN_TOTAL: &str = "outpost_file_sink_bytes_written_total";

/// File Sink: 32MiB 초과로 잘라낸 횟수 (counter)
pub const FILE_SINK_TRUNCATIONS_TOTAL: &str = "outpost_file_sink_truncations_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "outpost_daemon_uptime_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        IO_POINTS_SENT_TOTAL,
        "Total number of points delivered by the sender"
    );
    describe_counter!(
        IO_POINTS_FAILED_TOTAL,
        "Total number of points the sender rejected or could not deliver"
    );
    describe_counter!(
        IO_BATCHES_DROPPED_TOTAL,
        "Total number of batches dropped at ingestion because the channel was full"
    );
    describe_counter!(IO_FLUSHES_TOTAL, "Total number of consumer flushes");
    describe_gauge!(
        IO_CHANNEL_PENDING,
        "Number of batches waiting in the category channel"
    );

    describe_counter!(
        FAIL_CACHE_POINTS_CACHED_TOTAL,
        "Total number of failed points persisted to the fail cache"
    );
    describe_counter!(
        FAIL_CACHE_ENTRIES_REPLAYED_TOTAL,
        "Total number of fail cache entries successfully replayed"
    );
    describe_counter!(
        FAIL_CACHE_MALFORMED_TOTAL,
        "Total number of unreadable fail cache records discarded during replay"
    );

    describe_counter!(
        FILE_SINK_BYTES_WRITTEN_TOTAL,
        "Total bytes written to the debug output file"
    );
    describe_counter!(
        FILE_SINK_TRUNCATIONS_TOTAL,
        "Number of times the debug output file was truncated"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        IO_POINTS_SENT_TOTAL,
        IO_POINTS_FAILED_TOTAL,
        IO_BATCHES_DROPPED_TOTAL,
        IO_FLUSHES_TOTAL,
        IO_CHANNEL_PENDING,
        FAIL_CACHE_POINTS_CACHED_TOTAL,
        FAIL_CACHE_ENTRIES_REPLAYED_TOTAL,
        FAIL_CACHE_MALFORMED_TOTAL,
        FILE_SINK_BYTES_WRITTEN_TOTAL,
        FILE_SINK_TRUNCATIONS_TOTAL,
        DAEMON_UPTIME_SECONDS,
    ];

    #[test]
    fn all_metrics_start_with_outpost_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("outpost_"),
                "Metric '{}' does not start with 'outpost_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        let gauges = [IO_CHANNEL_PENDING, DAEMON_UPTIME_SECONDS];
        for name in ALL_METRIC_NAMES.iter().filter(|n| !gauges.contains(*n)) {
            assert!(name.ends_with("_total"), "counter '{}' lacks _total", name);
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }
}
