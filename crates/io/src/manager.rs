//! IO 매니저 -- 수집 진입점과 컨슈머 감독
//!
//! [`IoManager`]는 core의 [`Pipeline`](outpost_core::pipeline::Pipeline) trait을 구현하여
//! 데몬에서 시작/정지/상태 확인 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! collectors --IoHandle::submit--> [category channel] --> Consumer x N --> Sender
//!                                                              |  ^
//!                                                        fail  v  | replay
//!                                                            FailCache
//! ```
//!
//! # 채널이 가득 찼을 때
//! - [`IoHandle::submit`]: 자리가 날 때까지 기다립니다. `feed_timeout`이 설정되어 있으면
//!   그 시간이 지난 뒤 배치를 버리고 드롭 카운터를 올립니다.
//! - [`IoHandle::try_submit`]: 기다리지 않고 즉시 버리며 드롭 카운터를 올립니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use outpost_core::category::Category;
use outpost_core::error::{OutpostError, PipelineError};
use outpost_core::metrics as m;
use outpost_core::pipeline::{HealthStatus, Pipeline};

use crate::config::IoSettings;
use crate::consumer::{Consumer, Shared, SharedReceiver};
use crate::data::IoData;
use crate::error::IoError;
use crate::fail_cache::FailCache;
use crate::file_sink::FileSink;
use crate::sender::Sender;
use crate::stats::{CounterSnapshot, InputStat, IoStats};

/// 채널 사용률이 이 값을 넘으면 Degraded
const CHANNEL_DEGRADED_RATIO: f64 = 0.9;

/// 매니저 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 채널 점유 현황
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelUsage {
    /// 대기 중인 배치 수
    pub len: usize,
    /// 채널 용량
    pub capacity: usize,
}

impl ChannelUsage {
    /// 사용률 (0.0 ~ 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.len as f64 / self.capacity as f64
        }
    }
}

struct HandleInner {
    senders: HashMap<Category, mpsc::Sender<IoData>>,
    stats: Arc<IoStats>,
    feed_timeout: Option<Duration>,
    cancel: CancellationToken,
}

/// 수집기용 제출 핸들
///
/// 복제 비용이 작으므로 수집기마다 하나씩 나눠줍니다.
#[derive(Clone)]
pub struct IoHandle {
    inner: Arc<HandleInner>,
}

impl IoHandle {
    fn channel(&self, category: Category) -> Result<&mpsc::Sender<IoData>, IoError> {
        if self.inner.cancel.is_cancelled() {
            return Err(IoError::ShuttingDown);
        }
        self.inner
            .senders
            .get(&category)
            .ok_or_else(|| IoError::Config {
                field: "category".to_owned(),
                reason: format!("no channel for '{category}'"),
            })
    }

    fn dropped(&self, category: Category) -> IoError {
        self.inner.stats.record_dropped(category);
        warn!(
            category = category.as_str(),
            dropped_total = self.inner.stats.dropped_total(),
            "channel full, batch dropped"
        );
        IoError::ChannelFull {
            category: category.as_str().to_owned(),
        }
    }

    /// 배치를 제출합니다.
    ///
    /// 채널이 가득 차면 자리가 날 때까지 기다립니다. `feed_timeout`이 설정되어
    /// 있으면 그 시간 후 배치를 버리고 `IoError::ChannelFull`을 반환합니다.
    /// 포인트가 없는 배치는 아무 일도 하지 않습니다.
    pub async fn submit(&self, data: IoData) -> Result<(), IoError> {
        if data.is_empty() {
            return Ok(());
        }
        let category = data.category;
        let tx = self.channel(category)?;
        let cancel = &self.inner.cancel;

        let sent = match self.inner.feed_timeout {
            Some(limit) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IoError::ShuttingDown),
                result = tx.send(data) => Some(result),
                _ = tokio::time::sleep(limit) => None,
            },
            None => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IoError::ShuttingDown),
                result = tx.send(data) => Some(result),
            },
        };

        match sent {
            Some(Ok(())) => Ok(()),
            Some(Err(_)) => Err(IoError::ShuttingDown),
            None => Err(self.dropped(category)),
        }
    }

    /// 기다리지 않고 배치를 제출합니다.
    ///
    /// 채널이 가득 차면 배치를 버리고 `IoError::ChannelFull`을 반환합니다.
    pub fn try_submit(&self, data: IoData) -> Result<(), IoError> {
        if data.is_empty() {
            return Ok(());
        }
        let category = data.category;
        match self.channel(category)?.try_send(data) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(self.dropped(category)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IoError::ShuttingDown),
        }
    }

    /// 수집기 자체의 에러를 소스 상태에 기록합니다.
    pub fn report_error(&self, source: &str, error: &str) {
        self.inner.stats.record_error(source, error);
    }
}

/// IO 매니저
///
/// # 사용 예시
/// ```ignore
/// use outpost_io::{IoData, IoManagerBuilder};
///
/// let mut manager = IoManagerBuilder::new()
///     .settings(settings)
///     .sender(sender)
///     .build()?;
/// let handle = manager.handle();
///
/// manager.start().await?;
/// handle.submit(IoData::new(Category::Logging, "nginx", points)).await?;
/// manager.stop().await?;
/// ```
pub struct IoManager {
    state: ManagerState,
    shared: Arc<Shared>,
    handle: IoHandle,
    receivers: HashMap<Category, SharedReceiver>,
    fail_caches: HashMap<Category, Arc<FailCache>>,
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl IoManager {
    /// 수집기용 제출 핸들을 반환합니다.
    pub fn handle(&self) -> IoHandle {
        self.handle.clone()
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ManagerState::Initialized => "initialized",
            ManagerState::Running => "running",
            ManagerState::Stopped => "stopped",
        }
    }

    /// 런타임 설정
    pub fn settings(&self) -> &IoSettings {
        &self.shared.settings
    }

    /// 카테고리별 채널 점유 현황
    pub fn chan_usage(&self) -> BTreeMap<Category, ChannelUsage> {
        self.handle
            .inner
            .senders
            .iter()
            .map(|(category, tx)| {
                let usage = ChannelUsage {
                    len: tx.max_capacity() - tx.capacity(),
                    capacity: tx.max_capacity(),
                };
                metrics::gauge!(m::IO_CHANNEL_PENDING, m::LABEL_CATEGORY => category.as_str())
                    .set(usage.len as f64);
                (*category, usage)
            })
            .collect()
    }

    /// 수집 단계에서 버려진 누적 배치 수
    pub fn dropped_total(&self) -> u64 {
        self.shared.stats.dropped_total()
    }

    /// 카테고리별 sent/failed 카운터
    pub fn category_stats(&self) -> BTreeMap<Category, CounterSnapshot> {
        self.shared.stats.category_stats()
    }

    /// 소스별 상태
    pub fn input_stats(&self) -> HashMap<String, InputStat> {
        self.shared.stats.input_stats()
    }

    /// 통계 레지스트리에 대한 Arc 참조
    pub fn stats(&self) -> Arc<IoStats> {
        Arc::clone(&self.shared.stats)
    }

    /// 카테고리의 실패 캐시 레코드 수 (캐시가 없으면 0)
    pub fn fail_cache_len(&self, category: Category) -> usize {
        self.fail_caches.get(&category).map_or(0, |c| c.len())
    }

    /// 카테고리의 실패 캐시를 비웁니다.
    pub async fn purge_fail_cache(&self, category: Category) -> Result<(), IoError> {
        match self.fail_caches.get(&category) {
            Some(cache) => cache.purge().await,
            None => Ok(()),
        }
    }

    /// 채널을 닫고 워커 종료 이후 들어온 배치를 마지막으로 처리합니다.
    ///
    /// 닫힌 뒤의 제출은 `IoError::ShuttingDown`으로 거부됩니다.
    async fn drain_channels(&mut self) {
        for category in Category::ALL {
            let Some(rx) = self.receivers.remove(&category) else {
                continue;
            };
            rx.lock().await.close();
            Consumer::new(
                0,
                category,
                rx,
                Arc::clone(&self.shared),
                self.fail_caches.get(&category).cloned(),
                self.cancel.clone(),
            )
            .drain_remaining()
            .await;
        }
        self.receivers.clear();
    }

    fn spawn_consumers(&mut self) -> usize {
        let mut spawned = 0;
        for category in Category::ALL {
            let Some(rx) = self.receivers.get(&category) else {
                continue;
            };
            let partitions = if category.is_high_throughput() {
                self.shared.settings.consumers_per_partition
            } else {
                1
            };
            for id in 0..partitions {
                let consumer = Consumer::new(
                    id,
                    category,
                    Arc::clone(rx),
                    Arc::clone(&self.shared),
                    self.fail_caches.get(&category).cloned(),
                    self.cancel.clone(),
                );
                self.tasks.push(tokio::spawn(consumer.run()));
                spawned += 1;
            }
        }
        spawned
    }
}

impl Pipeline for IoManager {
    async fn start(&mut self) -> Result<(), OutpostError> {
        match self.state {
            ManagerState::Running => return Err(PipelineError::AlreadyRunning.into()),
            ManagerState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "io manager cannot be restarted after stop".to_owned(),
                )
                .into());
            }
            ManagerState::Initialized => {}
        }

        if self.shared.sender.is_none() {
            warn!("no sender configured, flushed points will be counted as failed");
        }

        let consumers = self.spawn_consumers();
        self.state = ManagerState::Running;
        info!(
            consumers,
            flush_interval = ?self.shared.settings.flush_interval,
            cache_enabled = self.shared.settings.enable_cache,
            "io manager started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), OutpostError> {
        if self.state != ManagerState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping io manager");
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "consumer task terminated abnormally");
            }
        }
        self.drain_channels().await;

        self.state = ManagerState::Stopped;
        info!(dropped_total = self.dropped_total(), "io manager stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ManagerState::Running => {
                let busiest = self
                    .chan_usage()
                    .into_iter()
                    .map(|(category, usage)| (category, usage.utilization()))
                    .max_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((category, ratio)) =
                    busiest.filter(|(_, ratio)| *ratio > CHANNEL_DEGRADED_RATIO)
                {
                    return HealthStatus::Degraded(format!(
                        "channel '{category}' utilization high: {:.1}%",
                        ratio * 100.0
                    ));
                }
                if self.shared.sender.is_none() {
                    return HealthStatus::Degraded("sender not configured".to_owned());
                }
                HealthStatus::Healthy
            }
            ManagerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ManagerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// IO 매니저 빌더
///
/// 채널, 실패 캐시, 파일 출력을 준비합니다.
#[derive(Default)]
pub struct IoManagerBuilder {
    settings: IoSettings,
    sender: Option<Arc<dyn Sender>>,
}

impl IoManagerBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 런타임 설정을 지정합니다.
    pub fn settings(mut self, settings: IoSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 원격 전송기를 지정합니다.
    ///
    /// 지정하지 않으면 모든 플러시가 실패로 집계됩니다.
    pub fn sender(mut self, sender: Arc<dyn Sender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// 매니저를 빌드합니다.
    ///
    /// # Errors
    /// - 설정 검증 실패
    /// - 실패 캐시 디렉토리 또는 출력 파일을 열 수 없는 경우
    pub fn build(self) -> Result<IoManager, IoError> {
        self.settings.validate()?;
        let settings = self.settings;

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for category in Category::ALL {
            let (tx, rx) = mpsc::channel(settings.feed_chan_size);
            senders.insert(category, tx);
            receivers.insert(category, Arc::new(Mutex::new(rx)));
        }

        let mut fail_caches = HashMap::new();
        if settings.enable_cache {
            for category in Category::ALL.into_iter().filter(Category::is_cache_eligible) {
                let cache = FailCache::open(&settings.cache_dir, category, settings.cache_max_bytes)?;
                fail_caches.insert(category, Arc::new(cache));
            }
            info!(
                dir = %settings.cache_dir.display(),
                categories = fail_caches.len(),
                "fail cache enabled"
            );
        }

        let file_sink = match &settings.output_file {
            Some(path) => Some(Arc::new(FileSink::open(
                path.clone(),
                settings.output_file_inputs.clone(),
            )?)),
            None => None,
        };

        let stats = Arc::new(IoStats::new());
        let cancel = CancellationToken::new();
        let handle = IoHandle {
            inner: Arc::new(HandleInner {
                senders,
                stats: Arc::clone(&stats),
                feed_timeout: settings.feed_timeout,
                cancel: cancel.clone(),
            }),
        };

        Ok(IoManager {
            state: ManagerState::Initialized,
            shared: Arc::new(Shared {
                settings,
                sender: self.sender,
                stats,
                file_sink,
            }),
            handle,
            receivers,
            fail_caches,
            cancel,
            tasks: Vec::new(),
        })
    }
}
