//! IO 코어 런타임 설정
//!
//! [`IoSettings`]는 core의 [`IoConfig`](outpost_core::config::IoConfig)를 해석한
//! 불변 스냅샷입니다. 시작 시 한 번 만들어지고 이후 변경되지 않습니다.
//!
//! 주기 문자열이 잘못되었거나 0이면 시작을 중단하지 않고 기본값으로 대체한 뒤
//! 경고를 남깁니다. `max_cache_count`는 최소 1000으로 올려 적용합니다.
//!
//! # 사용 예시
//! ```ignore
//! use outpost_core::config::OutpostConfig;
//! use outpost_io::config::IoSettings;
//!
//! let core_config = OutpostConfig::default();
//! let settings = IoSettings::from_core(&core_config);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use outpost_core::config::OutpostConfig;

use crate::error::IoError;

/// 기본 플러시 주기
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// 기본 실패 캐시 재전송 주기
pub const DEFAULT_CACHE_CLEAN_INTERVAL: Duration = Duration::from_secs(5);

/// 버퍼 최대 포인트 수의 하한
pub const MIN_MAX_CACHE_COUNT: usize = 1000;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// IO 코어 런타임 설정
#[derive(Debug, Clone)]
pub struct IoSettings {
    /// 카테고리별 수집 채널 용량
    pub feed_chan_size: usize,
    /// 버퍼 최대 포인트 수 (초과 시 즉시 플러시)
    pub max_cache_count: usize,
    /// 플러시 주기
    pub flush_interval: Duration,
    /// 실패 캐시 재전송 주기
    pub cache_clean_interval: Duration,
    /// 실패 캐시 활성화 여부
    pub enable_cache: bool,
    /// 실패 캐시 루트 디렉토리
    pub cache_dir: PathBuf,
    /// 카테고리별 실패 캐시 최대 바이트
    pub cache_max_bytes: u64,
    /// 디버그 출력 파일
    pub output_file: Option<PathBuf>,
    /// 디버그 출력 대상 소스 (비어있으면 전체)
    pub output_file_inputs: Vec<String>,
    /// 채널이 가득 찼을 때 최대 대기 시간 (None이면 무제한 대기)
    pub feed_timeout: Option<Duration>,
    /// 고처리량 카테고리의 컨슈머 수
    pub consumers_per_partition: usize,
}

impl Default for IoSettings {
    fn default() -> Self {
        Self::from_core(&OutpostConfig::default())
    }
}

impl IoSettings {
    /// core 설정에서 런타임 설정을 생성합니다.
    ///
    /// 잘못된 주기는 기본값으로 대체되고, 이 함수는 실패하지 않습니다.
    pub fn from_core(config: &OutpostConfig) -> Self {
        let io = &config.io;

        let output_file = if io.output_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&io.output_file))
        };

        let feed_timeout = if io.feed_timeout.trim().is_empty() {
            None
        } else {
            match humantime::parse_duration(io.feed_timeout.trim()) {
                Ok(d) if !d.is_zero() => Some(d),
                Ok(_) => None,
                Err(e) => {
                    warn!(
                        value = io.feed_timeout.as_str(),
                        error = %e,
                        "invalid io.feed_timeout, submissions will block"
                    );
                    None
                }
            }
        };

        Self {
            feed_chan_size: io.feed_chan_size.max(1),
            max_cache_count: clamp_max_cache_count(io.max_cache_count),
            flush_interval: parse_interval(
                "io.flush_interval",
                &io.flush_interval,
                DEFAULT_FLUSH_INTERVAL,
            ),
            cache_clean_interval: parse_interval(
                "io.cache_clean_interval",
                &io.cache_clean_interval,
                DEFAULT_CACHE_CLEAN_INTERVAL,
            ),
            enable_cache: io.enable_cache,
            cache_dir: PathBuf::from(config.cache_dir()),
            cache_max_bytes: io.cache_max_size_gb.saturating_mul(BYTES_PER_GB),
            output_file,
            output_file_inputs: io.output_file_inputs.clone(),
            feed_timeout,
            consumers_per_partition: resolve_consumers(io.consumers_per_partition),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IoError> {
        if self.feed_chan_size == 0 {
            return Err(IoError::Config {
                field: "feed_chan_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.consumers_per_partition == 0 {
            return Err(IoError::Config {
                field: "consumers_per_partition".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.flush_interval.is_zero() || self.cache_clean_interval.is_zero() {
            return Err(IoError::Config {
                field: "flush_interval".to_owned(),
                reason: "intervals must be greater than 0".to_owned(),
            });
        }
        if self.enable_cache && self.cache_dir.as_os_str().is_empty() {
            return Err(IoError::Config {
                field: "cache_dir".to_owned(),
                reason: "cache_dir must be set when caching is enabled".to_owned(),
            });
        }
        Ok(())
    }
}

fn parse_interval(field: &str, raw: &str, default: Duration) -> Duration {
    match humantime::parse_duration(raw.trim()) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) => {
            warn!(field, value = raw, ?default, "zero interval, using default");
            default
        }
        Err(e) => {
            warn!(field, value = raw, error = %e, ?default, "invalid interval, using default");
            default
        }
    }
}

fn clamp_max_cache_count(count: usize) -> usize {
    if count < MIN_MAX_CACHE_COUNT {
        warn!(
            configured = count,
            applied = MIN_MAX_CACHE_COUNT,
            "io.max_cache_count below minimum, raising"
        );
        MIN_MAX_CACHE_COUNT
    } else {
        count
    }
}

fn resolve_consumers(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus * 2 + 1
}

/// IO 설정 빌더
///
/// 테스트나 임베딩 환경에서 파일 없이 설정을 구성할 때 사용합니다.
#[derive(Default)]
pub struct IoSettingsBuilder {
    settings: IoSettings,
}

impl IoSettingsBuilder {
    /// 기본값으로 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집 채널 용량을 설정합니다.
    pub fn feed_chan_size(mut self, size: usize) -> Self {
        self.settings.feed_chan_size = size;
        self
    }

    /// 버퍼 최대 포인트 수를 설정합니다 (하한 1000 적용).
    pub fn max_cache_count(mut self, count: usize) -> Self {
        self.settings.max_cache_count = clamp_max_cache_count(count);
        self
    }

    /// 플러시 주기를 설정합니다.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.settings.flush_interval = interval;
        self
    }

    /// 실패 캐시 재전송 주기를 설정합니다.
    pub fn cache_clean_interval(mut self, interval: Duration) -> Self {
        self.settings.cache_clean_interval = interval;
        self
    }

    /// 실패 캐시를 지정한 디렉토리로 활성화합니다.
    pub fn enable_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.enable_cache = true;
        self.settings.cache_dir = dir.into();
        self
    }

    /// 카테고리별 실패 캐시 최대 바이트를 설정합니다.
    pub fn cache_max_bytes(mut self, bytes: u64) -> Self {
        self.settings.cache_max_bytes = bytes;
        self
    }

    /// 디버그 출력 파일과 대상 소스 목록을 설정합니다.
    pub fn output_file(mut self, path: impl Into<PathBuf>, inputs: Vec<String>) -> Self {
        self.settings.output_file = Some(path.into());
        self.settings.output_file_inputs = inputs;
        self
    }

    /// 채널이 가득 찼을 때의 최대 대기 시간을 설정합니다.
    pub fn feed_timeout(mut self, timeout: Duration) -> Self {
        self.settings.feed_timeout = Some(timeout);
        self
    }

    /// 고처리량 카테고리의 컨슈머 수를 설정합니다.
    pub fn consumers_per_partition(mut self, n: usize) -> Self {
        self.settings.consumers_per_partition = n;
        self
    }

    /// 설정을 검증하고 `IoSettings`를 생성합니다.
    pub fn build(self) -> Result<IoSettings, IoError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = IoSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.flush_interval, Duration::from_secs(10));
        assert_eq!(settings.cache_clean_interval, Duration::from_secs(5));
        assert!(settings.output_file.is_none());
        assert!(settings.feed_timeout.is_none());
        assert!(settings.consumers_per_partition >= 3);
    }

    #[test]
    fn invalid_durations_fall_back_to_defaults() {
        let mut config = OutpostConfig::default();
        config.io.flush_interval = "every now and then".to_owned();
        config.io.cache_clean_interval = "0s".to_owned();
        let settings = IoSettings::from_core(&config);
        assert_eq!(settings.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(settings.cache_clean_interval, DEFAULT_CACHE_CLEAN_INTERVAL);
    }

    #[test]
    fn compound_durations_are_parsed() {
        let mut config = OutpostConfig::default();
        config.io.flush_interval = "1m30s".to_owned();
        config.io.feed_timeout = "250ms".to_owned();
        let settings = IoSettings::from_core(&config);
        assert_eq!(settings.flush_interval, Duration::from_secs(90));
        assert_eq!(settings.feed_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn max_cache_count_has_floor() {
        let mut config = OutpostConfig::default();
        config.io.max_cache_count = 10;
        assert_eq!(IoSettings::from_core(&config).max_cache_count, 1000);

        config.io.max_cache_count = 4096;
        assert_eq!(IoSettings::from_core(&config).max_cache_count, 4096);
    }

    #[test]
    fn output_file_and_cache_size_are_resolved() {
        let mut config = OutpostConfig::default();
        config.io.output_file = "/tmp/outpost-debug.txt".to_owned();
        config.io.cache_max_size_gb = 2;
        let settings = IoSettings::from_core(&config);
        assert_eq!(
            settings.output_file,
            Some(PathBuf::from("/tmp/outpost-debug.txt"))
        );
        assert_eq!(settings.cache_max_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(settings.cache_dir, PathBuf::from("/var/lib/outpost/cache"));
    }

    #[test]
    fn builder_rejects_zero_consumers() {
        let result = IoSettingsBuilder::new().consumers_per_partition(0).build();
        assert!(result.is_err());
    }
}
