//! 카테고리 컨슈머 -- 버퍼링과 플러시 결정
//!
//! 컨슈머 하나가 카테고리 파티션 하나의 상태를 단독으로 소유합니다.
//! 고처리량 카테고리는 여러 컨슈머가 같은 채널을 나눠 읽습니다.
//!
//! # 제어 루프
//! ```text
//!            +--> batch     -> absorb -> (크기 초과 | 목적지 버킷 존재) -> flush + 타이머 리셋
//! select! ---+--> flush tick -> flush (비어있으면 no-op)
//!            +--> WAL tick   -> fail cache drain
//!            +--> cancelled  -> 대기 배치 흡수 -> 최종 flush
//! ```
//!
//! 루프 안의 전송은 종료 신호와 경쟁하며, 종료 중의 최종 플러시는
//! [`SHUTDOWN_FLUSH_TIMEOUT`]까지만 기다립니다. 중단된 전송은 실패로 집계되고
//! 캐시 대상이면 실패 캐시에 저장됩니다.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use outpost_core::category::Category;
use outpost_core::metrics as m;
use outpost_core::point::Point;

use crate::config::IoSettings;
use crate::data::IoData;
use crate::error::IoError;
use crate::fail_cache::{CacheEntry, FailCache};
use crate::file_sink::FileSink;
use crate::sender::Sender;
use crate::stats::{IoStats, accounting_category};

/// 종료 중 최종 플러시 전송의 최대 대기 시간
pub(crate) const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// 여러 컨슈머가 나눠 읽는 수신 채널
pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<IoData>>>;

/// 모든 컨슈머가 공유하는 읽기 전용 상태
pub(crate) struct Shared {
    pub(crate) settings: IoSettings,
    pub(crate) sender: Option<Arc<dyn Sender>>,
    pub(crate) stats: Arc<IoStats>,
    pub(crate) file_sink: Option<Arc<FileSink>>,
}

/// 카테고리 파티션 컨슈머
pub(crate) struct Consumer {
    id: usize,
    category: Category,
    /// 기본 버퍼를 보낼 카테고리 (별칭 적용)
    wire_category: Category,
    rx: SharedReceiver,
    shared: Arc<Shared>,
    fail_cache: Option<Arc<FailCache>>,
    cancel: CancellationToken,
    buffer: Vec<Point>,
    buckets: BTreeMap<String, Vec<Point>>,
    /// 대기 중인 포인트를 제출한 소스
    sources: BTreeSet<String>,
    last_flush: Instant,
    shutting_down: bool,
}

impl Consumer {
    pub(crate) fn new(
        id: usize,
        category: Category,
        rx: SharedReceiver,
        shared: Arc<Shared>,
        fail_cache: Option<Arc<FailCache>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            category,
            wire_category: accounting_category(category),
            rx,
            shared,
            fail_cache,
            cancel,
            buffer: Vec::new(),
            buckets: BTreeMap::new(),
            sources: BTreeSet::new(),
            last_flush: Instant::now(),
            shutting_down: false,
        }
    }

    /// 종료 신호를 받을 때까지 제어 루프를 실행합니다.
    pub(crate) async fn run(mut self) {
        let flush_period = self.shared.settings.flush_interval;
        let wal_period = self.shared.settings.cache_clean_interval;
        let now = Instant::now();
        let mut flush_tick = interval_at(now + flush_period, flush_period);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut wal_tick = interval_at(now + wal_period, wal_period);
        wal_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            category = self.category.as_str(),
            consumer = self.id,
            "consumer started"
        );

        let rx = Arc::clone(&self.rx);
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                batch = recv_shared(&rx) => match batch {
                    Some(data) => {
                        if self.absorb(data) {
                            self.flush().await;
                            flush_tick.reset();
                        }
                    }
                    None => break,
                },
                _ = flush_tick.tick() => self.flush().await,
                _ = wal_tick.tick() => self.replay().await,
            }
        }

        self.shutdown().await;
        debug!(
            category = self.category.as_str(),
            consumer = self.id,
            "consumer stopped"
        );
    }

    /// 배치를 버퍼에 흡수합니다.
    ///
    /// 즉시 플러시가 필요하면 `true`를 반환합니다.
    fn absorb(&mut self, data: IoData) -> bool {
        let IoData {
            source,
            points,
            route,
            ..
        } = data;
        self.shared.stats.observe_input(&source, points.len());

        if let Some(sink) = self.shared.file_sink.as_ref().filter(|s| s.matches(&source)) {
            if let Err(e) = sink.write(&source, self.category.as_str(), &points) {
                warn!(
                    category = self.category.as_str(),
                    source = source.as_str(),
                    error = %e,
                    "debug output write failed, batch dropped"
                );
                self.shared
                    .stats
                    .record_failed(self.category, points.len() as u64);
                self.shared.stats.record_error(&source, &e.to_string());
            }
            return false;
        }

        self.sources.insert(source);
        match route {
            Some(destination) => self
                .buckets
                .entry(destination)
                .or_default()
                .extend(points),
            None => self.buffer.extend(points),
        }

        self.buffer.len() > self.shared.settings.max_cache_count || !self.buckets.is_empty()
    }

    /// 기본 버퍼와 목적지 버킷을 전송합니다.
    ///
    /// 결과와 관계없이 두 버퍼는 항상 비워집니다.
    async fn flush(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let buckets = std::mem::take(&mut self.buckets);
        let sources = std::mem::take(&mut self.sources);
        if buffer.is_empty() && buckets.is_empty() {
            return;
        }

        metrics::counter!(m::IO_FLUSHES_TOTAL, m::LABEL_CATEGORY => self.category.as_str())
            .increment(1);

        let mut errors = Vec::new();
        let pending = buffer.len() + buckets.values().map(Vec::len).sum::<usize>();

        if !buffer.is_empty() {
            let cacheable = self.category.is_cache_eligible();
            if let Err(e) = self
                .send(self.wire_category.as_str(), buffer, cacheable)
                .await
            {
                errors.push(e);
            }
        }
        for (destination, points) in buckets {
            if let Err(e) = self.send(&destination, points, false).await {
                errors.push(e);
            }
        }

        if !errors.is_empty() {
            let message = errors.join("; ");
            for source in &sources {
                self.shared.stats.record_error(source, &message);
            }
        }

        debug!(
            category = self.category.as_str(),
            consumer = self.id,
            points = pending,
            since_last_ms = self.last_flush.elapsed().as_millis() as u64,
            "flushed"
        );
        self.last_flush = Instant::now();
    }

    /// 포인트를 전송하고 카운터와 실패 캐시를 갱신합니다.
    ///
    /// 실패가 있었다면 소스 상태에 남길 메시지를 `Err`로 반환합니다.
    async fn send(&self, target: &str, points: Vec<Point>, cacheable: bool) -> Result<(), String> {
        let total = points.len() as u64;
        let stats = &self.shared.stats;

        let Some(sender) = &self.shared.sender else {
            warn!(
                category = self.category.as_str(),
                target,
                points = total,
                "sender not configured, flush counted as failed"
            );
            stats.record_failed(self.category, total);
            self.cache_failed(target, &points, cacheable);
            return Err(IoError::SenderUnavailable.to_string());
        };

        let backup = (cacheable && self.fail_cache.is_some()).then(|| points.clone());
        let write = sender.write(target, points);
        let outcome = if self.shutting_down {
            tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, write).await.ok()
        } else {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = write => Some(result),
            }
        };
        let Some(outcome) = outcome else {
            stats.record_failed(self.category, total);
            warn!(
                category = self.category.as_str(),
                target,
                points = total,
                "send abandoned on shutdown, counted as failed"
            );
            if let Some(points) = backup {
                self.cache_failed(target, &points, cacheable);
            }
            return Err(format!("send to {target} abandoned on shutdown"));
        };

        match outcome {
            Ok(failed) if failed.is_empty() => {
                stats.record_sent(self.category, total);
                Ok(())
            }
            Ok(failed) => {
                let rejected = failed.len() as u64;
                stats.record_sent(self.category, total.saturating_sub(rejected));
                stats.record_failed(self.category, rejected);
                warn!(
                    category = self.category.as_str(),
                    target,
                    rejected,
                    total,
                    "sender rejected points"
                );
                self.cache_failed(target, &failed, cacheable);
                Err(format!("{rejected} of {total} points rejected by {target}"))
            }
            Err(e) => {
                stats.record_failed(self.category, total);
                warn!(
                    category = self.category.as_str(),
                    target,
                    points = total,
                    error = %e,
                    "send failed"
                );
                if let Some(points) = backup {
                    self.cache_failed(target, &points, cacheable);
                }
                Err(e.to_string())
            }
        }
    }

    /// 캐시 대상이면 실패 포인트를 레코드 하나로 저장합니다.
    fn cache_failed(&self, target: &str, points: &[Point], cacheable: bool) {
        let Some(cache) = self.fail_cache.as_ref().filter(|_| cacheable) else {
            debug!(
                category = self.category.as_str(),
                points = points.len(),
                "failed points not cached, dropped"
            );
            return;
        };
        if let Err(e) = cache.put(&CacheEntry::from_points(target, points)) {
            warn!(
                category = self.category.as_str(),
                points = points.len(),
                error = %e,
                "failed to persist points to fail cache, dropped"
            );
        }
    }

    /// 실패 캐시를 재전송합니다.
    ///
    /// 종료 신호가 오면 중단하며, 완료되지 않은 레코드는 캐시에 남습니다.
    async fn replay(&self) {
        let (Some(cache), Some(sender)) = (&self.fail_cache, &self.shared.sender) else {
            return;
        };
        let sender = Arc::clone(sender);
        let drain = cache.drain(|category, points| {
            let sender = Arc::clone(&sender);
            async move { sender.write(&category, points).await }
        });

        let result = tokio::select! {
            result = drain => result,
            _ = self.cancel.cancelled() => {
                debug!(category = self.category.as_str(), "fail cache replay abandoned on shutdown");
                return;
            }
        };

        match result {
            Ok(report) => {
                self.shared
                    .stats
                    .record_sent(self.category, report.delivered_points);
                if report.replayed_entries > 0 || report.malformed > 0 {
                    info!(
                        category = self.category.as_str(),
                        replayed = report.replayed_entries,
                        requeued = report.requeued_entries,
                        malformed = report.malformed,
                        points = report.delivered_points,
                        "fail cache replayed"
                    );
                }
            }
            Err(e) => {
                warn!(
                    category = self.category.as_str(),
                    error = %e,
                    "fail cache replay failed"
                );
            }
        }
    }

    /// 워커가 모두 끝난 뒤 채널에 남은 배치를 처리합니다.
    pub(crate) async fn drain_remaining(mut self) {
        self.shutdown().await;
    }

    /// 이미 채널에 들어온 배치를 흡수한 뒤 마지막으로 플러시합니다.
    async fn shutdown(&mut self) {
        self.shutting_down = true;
        loop {
            let next = self.rx.lock().await.try_recv().ok();
            let Some(data) = next else { break };
            if self.absorb(data) {
                self.flush().await;
            }
        }
        self.flush().await;
    }
}

async fn recv_shared(rx: &Mutex<mpsc::Receiver<IoData>>) -> Option<IoData> {
    rx.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use outpost_core::pipeline::BoxFuture;
    use outpost_core::point::PointBuilder;

    use crate::config::IoSettingsBuilder;

    #[derive(Default)]
    struct RecordingSender {
        calls: StdMutex<Vec<(String, usize)>>,
        fail: bool,
    }

    impl Sender for RecordingSender {
        fn write<'a>(
            &'a self,
            category: &'a str,
            points: Vec<Point>,
        ) -> BoxFuture<'a, Result<Vec<Point>, IoError>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((category.to_owned(), points.len()));
                if self.fail {
                    Err(IoError::Send {
                        category: category.to_owned(),
                        reason: "unreachable".to_owned(),
                    })
                } else {
                    Ok(Vec::new())
                }
            })
        }
    }

    fn points(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| {
                PointBuilder::new("log")
                    .field("message", format!("line {i}"))
                    .timestamp(i as i64)
                    .build()
                    .unwrap()
            })
            .collect()
    }

    fn consumer(
        category: Category,
        sender: Option<Arc<dyn Sender>>,
        fail_cache: Option<Arc<FailCache>>,
    ) -> (Consumer, Arc<IoStats>) {
        let (_tx, rx) = mpsc::channel(8);
        let stats = Arc::new(IoStats::new());
        let shared = Arc::new(Shared {
            settings: IoSettingsBuilder::new().build().unwrap(),
            sender,
            stats: Arc::clone(&stats),
            file_sink: None,
        });
        let consumer = Consumer::new(
            0,
            category,
            Arc::new(Mutex::new(rx)),
            shared,
            fail_cache,
            CancellationToken::new(),
        );
        (consumer, stats)
    }

    #[tokio::test]
    async fn routed_batch_requests_immediate_flush() {
        let sender = Arc::new(RecordingSender::default());
        let (mut c, stats) = consumer(Category::Logging, Some(sender.clone()), None);

        assert!(!c.absorb(IoData::new(Category::Logging, "nginx", points(2))));
        assert!(c.absorb(
            IoData::new(Category::Logging, "dialtesting", points(1)).with_route("X")
        ));
        c.flush().await;

        let calls = sender.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![("logging".to_owned(), 2), ("X".to_owned(), 1)]
        );
        assert_eq!(stats.snapshot(Category::Logging).sent, 3);
        assert!(c.buffer.is_empty());
        assert!(c.buckets.is_empty());
    }

    #[tokio::test]
    async fn empty_flush_is_noop() {
        let sender = Arc::new(RecordingSender::default());
        let (mut c, _) = consumer(Category::Metric, Some(sender.clone()), None);
        c.flush().await;
        assert!(sender.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dynamic_dataway_main_buffer_uses_logging_wire_name() {
        let sender = Arc::new(RecordingSender::default());
        let (mut c, stats) = consumer(Category::DynamicDataway, Some(sender.clone()), None);
        c.absorb(IoData::new(Category::DynamicDataway, "dialtesting", points(2)));
        c.flush().await;
        assert_eq!(
            sender.calls.lock().unwrap().clone(),
            vec![("logging".to_owned(), 2)]
        );
        assert_eq!(stats.snapshot(Category::Logging).sent, 2);
    }

    #[tokio::test]
    async fn missing_sender_counts_failure_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FailCache::open(dir.path(), Category::Logging, 1 << 20).unwrap());
        let (mut c, stats) = consumer(Category::Logging, None, Some(cache.clone()));

        c.absorb(IoData::new(Category::Logging, "nginx", points(3)));
        c.flush().await;

        assert_eq!(stats.snapshot(Category::Logging).failed, 3);
        assert_eq!(cache.len(), 1);
        let stat = stats.input_stat("nginx").unwrap();
        assert!(stat.last_error.unwrap().contains("not configured"));
        assert!(c.buffer.is_empty());
    }

    struct HangingSender;

    impl Sender for HangingSender {
        fn write<'a>(
            &'a self,
            _category: &'a str,
            _points: Vec<Point>,
        ) -> BoxFuture<'a, Result<Vec<Point>, IoError>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn cancelled_send_is_abandoned_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FailCache::open(dir.path(), Category::Logging, 1 << 20).unwrap());
        let (mut c, stats) = consumer(
            Category::Logging,
            Some(Arc::new(HangingSender)),
            Some(cache.clone()),
        );

        c.absorb(IoData::new(Category::Logging, "nginx", points(3)));
        c.cancel.cancel();
        c.flush().await;

        assert_eq!(stats.snapshot(Category::Logging).failed, 3);
        assert_eq!(stats.snapshot(Category::Logging).sent, 0);
        assert_eq!(cache.len(), 1);
        let stat = stats.input_stat("nginx").unwrap();
        assert!(stat.last_error.unwrap().contains("abandoned"));
    }

    #[tokio::test(start_paused = true)]
    async fn final_flush_gives_up_after_timeout() {
        let (mut c, stats) = consumer(Category::Object, Some(Arc::new(HangingSender)), None);
        c.absorb(IoData::new(Category::Object, "host", points(2)));

        let started = Instant::now();
        c.shutdown().await;

        assert!(started.elapsed() >= SHUTDOWN_FLUSH_TIMEOUT);
        assert_eq!(stats.snapshot(Category::Object).failed, 2);
        assert!(c.buffer.is_empty());
    }

    #[tokio::test]
    async fn routed_failure_is_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FailCache::open(dir.path(), Category::Logging, 1 << 20).unwrap());
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let (mut c, stats) = consumer(Category::Logging, Some(sender), Some(cache.clone()));

        c.absorb(IoData::new(Category::Logging, "dialtesting", points(2)).with_route("X"));
        c.flush().await;

        assert_eq!(stats.snapshot(Category::Logging).failed, 2);
        assert!(cache.is_empty());
    }
}
