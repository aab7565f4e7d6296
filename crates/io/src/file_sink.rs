//! 디버그 파일 출력
//!
//! 설정되면 대상 소스의 트래픽을 네트워크 대신 로컬 파일로 보냅니다.
//! 누적 기록 바이트가 [`MAX_OUTPUT_FILE_BYTES`]를 넘으면 새 파일로 회전하지 않고
//! 같은 파일을 비운 뒤 처음부터 다시 씁니다.
//!
//! # 출력 형식
//! ```text
//! # nginx > logging
//! nginx_access,host=web-01 status=200i 1700000000000000000
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use outpost_core::metrics as m;
use outpost_core::point::Point;

use crate::error::IoError;

/// 파일을 비우는 기준 크기 (32 MiB)
pub const MAX_OUTPUT_FILE_BYTES: u64 = 32 * 1024 * 1024;

struct SinkState {
    file: File,
    written: u64,
}

/// 디버그 파일 출력기
///
/// 여러 컨슈머가 공유하며 모든 쓰기는 단일 뮤텍스 아래에서 이루어집니다.
pub struct FileSink {
    path: PathBuf,
    inputs: Vec<String>,
    limit: u64,
    state: Mutex<SinkState>,
}

impl FileSink {
    /// 출력 파일을 열거나 생성합니다.
    ///
    /// `inputs`가 비어있으면 모든 소스가 대상입니다.
    pub fn open(path: impl Into<PathBuf>, inputs: Vec<String>) -> Result<Self, IoError> {
        Self::with_limit(path, inputs, MAX_OUTPUT_FILE_BYTES)
    }

    /// 비우기 기준 크기를 지정하여 엽니다.
    pub fn with_limit(
        path: impl Into<PathBuf>,
        inputs: Vec<String>,
        limit: u64,
    ) -> Result<Self, IoError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| sink_error(&path, &e))?;
        info!(path = %path.display(), "debug output file enabled");
        Ok(Self {
            path,
            inputs,
            limit,
            state: Mutex::new(SinkState { file, written: 0 }),
        })
    }

    /// 출력 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 소스가 출력 대상인지 확인합니다.
    pub fn matches(&self, source: &str) -> bool {
        self.inputs.is_empty() || self.inputs.iter().any(|s| s == source)
    }

    /// 현재 파일에 기록된 바이트 수
    pub fn written(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).written
    }

    /// 헤더 한 줄과 포인트별 한 줄을 기록합니다.
    ///
    /// 포인트마다 누적 크기를 확인하므로 큰 배치도 중간에 파일을 비웁니다.
    /// 비운 뒤 남은 포인트 앞에는 헤더를 다시 씁니다.
    pub fn write(&self, source: &str, category: &str, points: &[Point]) -> Result<(), IoError> {
        let header = format!("# {source} > {category}\n");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut pending = header.clone();
        for p in points {
            if pending.is_empty() {
                pending.push_str(&header);
            }
            pending.push_str(&p.to_string());
            pending.push('\n');
            if state.written + pending.len() as u64 >= self.limit {
                self.append(&mut state, &pending)?;
                pending.clear();
                self.truncate(&mut state)?;
            }
        }
        if !pending.is_empty() {
            self.append(&mut state, &pending)?;
        }
        Ok(())
    }

    fn append(&self, state: &mut SinkState, text: &str) -> Result<(), IoError> {
        state
            .file
            .write_all(text.as_bytes())
            .map_err(|e| sink_error(&self.path, &e))?;
        state.written += text.len() as u64;
        metrics::counter!(m::FILE_SINK_BYTES_WRITTEN_TOTAL).increment(text.len() as u64);
        Ok(())
    }

    fn truncate(&self, state: &mut SinkState) -> Result<(), IoError> {
        let file = &mut state.file;
        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .map_err(|e| sink_error(&self.path, &e))?;
        state.written = 0;
        metrics::counter!(m::FILE_SINK_TRUNCATIONS_TOTAL).increment(1);
        debug!(path = %self.path.display(), "debug output file truncated");
        Ok(())
    }
}

fn sink_error(path: &Path, err: &std::io::Error) -> IoError {
    IoError::FileSink {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::point::PointBuilder;

    fn sample(n: i64) -> Vec<Point> {
        (0..n)
            .map(|i| {
                PointBuilder::new("cpu")
                    .tag("host", "web-01")
                    .field("usage", 0.25)
                    .timestamp(i)
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn writes_header_and_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let sink = FileSink::open(&path, Vec::new()).unwrap();
        sink.write("cpu", "metric", &sample(2)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "# cpu > metric");
        assert_eq!(lines[1], "cpu,host=web-01 usage=0.25 0");
        assert_eq!(lines[2], "cpu,host=web-01 usage=0.25 1");
        assert_eq!(sink.written(), content.len() as u64);
    }

    #[test]
    fn allow_list_filters_sources() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open(dir.path().join("out.txt"), vec!["cpu".to_owned()]).unwrap();
        assert!(sink.matches("cpu"));
        assert!(!sink.matches("nginx"));

        let all = FileSink::open(dir.path().join("all.txt"), Vec::new()).unwrap();
        assert!(all.matches("anything"));
    }

    #[test]
    fn truncates_after_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let sink = FileSink::with_limit(&path, Vec::new(), 256).unwrap();

        for _ in 0..10 {
            sink.write("cpu", "metric", &sample(3)).unwrap();
            let len = std::fs::metadata(&path).unwrap().len();
            assert!(len < 256);
            assert_eq!(sink.written(), len);
        }
    }

    #[test]
    fn large_batch_is_truncated_mid_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let sink = FileSink::with_limit(&path, Vec::new(), 256).unwrap();

        // 한 배치가 기준 크기의 두 배를 넘음
        sink.write("cpu", "metric", &sample(20)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!((content.len() as u64) < 256);
        assert_eq!(sink.written(), content.len() as u64);
        assert!(content.is_empty() || content.starts_with("# cpu > metric\n"));
    }

    #[test]
    fn full_threshold_is_32_mib() {
        assert_eq!(MAX_OUTPUT_FILE_BYTES, 33_554_432);
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSink::open(dir.path().join("missing/out.txt"), Vec::new());
        assert!(matches!(result, Err(IoError::FileSink { .. })));
    }
}
