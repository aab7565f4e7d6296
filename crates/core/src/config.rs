//! 설정 관리 -- outpost.toml 파싱 및 런타임 설정
//!
//! [`OutpostConfig`]는 데몬과 IO 코어의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`OUTPOST_IO_FLUSH_INTERVAL=10s` 형식)
//! 3. 설정 파일 (`outpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! IO 주기(`flush_interval`, `cache_clean_interval`)는 여기서 검증하지 않습니다.
//! 잘못된 값은 IO 코어가 기본값으로 대체하고 경고를 남깁니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), outpost_core::error::OutpostError> {
//! use outpost_core::config::OutpostConfig;
//!
//! let config = OutpostConfig::load("outpost.toml").await?;
//! let config = OutpostConfig::parse("[io]\nenable_cache = true")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, OutpostError};

/// Outpost 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// IO 코어 설정
    #[serde(default)]
    pub io: IoConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl OutpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OutpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, OutpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OutpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                OutpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, OutpostError> {
        toml::from_str(toml_str).map_err(|e| {
            OutpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `OUTPOST_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "OUTPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "OUTPOST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "OUTPOST_GENERAL_DATA_DIR");

        // IO
        override_usize(&mut self.io.feed_chan_size, "OUTPOST_IO_FEED_CHAN_SIZE");
        override_usize(&mut self.io.max_cache_count, "OUTPOST_IO_MAX_CACHE_COUNT");
        override_string(&mut self.io.flush_interval, "OUTPOST_IO_FLUSH_INTERVAL");
        override_string(
            &mut self.io.cache_clean_interval,
            "OUTPOST_IO_CACHE_CLEAN_INTERVAL",
        );
        override_bool(&mut self.io.enable_cache, "OUTPOST_IO_ENABLE_CACHE");
        override_string(&mut self.io.cache_dir, "OUTPOST_IO_CACHE_DIR");
        override_u64(
            &mut self.io.cache_max_size_gb,
            "OUTPOST_IO_CACHE_MAX_SIZE_GB",
        );
        override_string(&mut self.io.output_file, "OUTPOST_IO_OUTPUT_FILE");
        override_csv(
            &mut self.io.output_file_inputs,
            "OUTPOST_IO_OUTPUT_FILE_INPUTS",
        );
        override_string(&mut self.io.feed_timeout, "OUTPOST_IO_FEED_TIMEOUT");
        override_usize(
            &mut self.io.consumers_per_partition,
            "OUTPOST_IO_CONSUMERS_PER_PARTITION",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "OUTPOST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "OUTPOST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "OUTPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), OutpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.io.feed_chan_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "io.feed_chan_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(ConfigError::InvalidValue {
                field: "metrics.endpoint".to_owned(),
                reason: "only '/metrics' is supported".to_owned(),
            }
            .into());
        }

        Ok(())
    }

    /// 실패 캐시 디렉토리를 결정합니다.
    ///
    /// `io.cache_dir`가 비어있으면 `<general.data_dir>/cache`를 사용합니다.
    pub fn cache_dir(&self) -> String {
        if self.io.cache_dir.is_empty() {
            format!("{}/cache", self.general.data_dir.trim_end_matches('/'))
        } else {
            self.io.cache_dir.clone()
        }
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/outpost".to_owned(),
        }
    }
}

/// IO 코어 설정
///
/// 시작 시 한 번 읽어 불변 스냅샷으로 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// 카테고리별 수집 채널 용량
    pub feed_chan_size: usize,
    /// 컨슈머당 버퍼 최대 포인트 수 (최소 1000)
    pub max_cache_count: usize,
    /// 플러시 주기 (예: "10s")
    pub flush_interval: String,
    /// 실패 캐시 재전송 주기 (예: "5s")
    pub cache_clean_interval: String,
    /// 실패 캐시 활성화 여부
    pub enable_cache: bool,
    /// 실패 캐시 디렉토리 (비어있으면 data_dir/cache)
    pub cache_dir: String,
    /// 카테고리별 실패 캐시 최대 크기 (GB)
    pub cache_max_size_gb: u64,
    /// 디버그 출력 파일 (비어있으면 비활성화)
    pub output_file: String,
    /// 디버그 출력 대상 소스 목록 (비어있으면 전체)
    pub output_file_inputs: Vec<String>,
    /// 채널이 가득 찼을 때 최대 대기 시간 (비어있으면 무제한 대기)
    pub feed_timeout: String,
    /// 고처리량 카테고리의 컨슈머 수 (0이면 CPU 수 기반)
    pub consumers_per_partition: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            feed_chan_size: 128,
            max_cache_count: 1000,
            flush_interval: "10s".to_owned(),
            cache_clean_interval: "5s".to_owned(),
            enable_cache: false,
            cache_dir: String::new(),
            cache_max_size_gb: 10,
            output_file: String::new(),
            output_file_inputs: Vec::new(),
            feed_timeout: String::new(),
            consumers_per_partition: 0,
        }
    }
}

/// Prometheus 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9529,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
