//! 실패 캐시 -- 전송 실패 포인트의 디스크 기반 재전송 로그
//!
//! 카테고리마다 `<cache_dir>/<category>/` 아래에 추가 전용 로그 파일 하나와
//! 소비 위치를 기록하는 head 파일을 둡니다. 프로세스가 재시작되어도 남아 있으며,
//! 다음 재전송 주기에 head 위치부터 다시 시도됩니다.
//!
//! # 레코드 형식
//! ```text
//! +----------------+---------------------------------------------+
//! | len: u32 (LE)  | JSON {"category": "...", "lines": ["...", ...]} |
//! +----------------+---------------------------------------------+
//! ```
//!
//! # 재전송
//! [`FailCache::drain`]은 head부터 최대 [`MAX_REPLAY_ENTRIES`]개 레코드만 읽어
//! 하나씩 재전송합니다. 전송이 `Err`로 실패하면 그 레코드에서 멈추고 다음 주기에
//! 다시 시도합니다. 부분 실패한 포인트는 로그 끝에 새 레코드로 다시 붙습니다.
//! 로그를 모두 소비하면 파일을 비우고, 소비된 앞부분이 커지면 남은 부분만
//! 새 파일로 옮깁니다 (임시 파일 + rename). 파일 I/O는 blocking 스레드에서 실행됩니다.

use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use outpost_core::category::Category;
use outpost_core::error::PointError;
use outpost_core::metrics as m;
use outpost_core::point::Point;

use crate::error::IoError;

const LOG_FILE_NAME: &str = "fail.wal";
const HEAD_FILE_NAME: &str = "fail.wal.head";
const HEAD_TMP_FILE_NAME: &str = "fail.wal.head.tmp";
const TMP_FILE_NAME: &str = "fail.wal.tmp";
const FRAME_HEADER_LEN: u64 = 4;

/// 재전송 주기 한 번에 읽는 최대 레코드 수
pub const MAX_REPLAY_ENTRIES: usize = 64;

/// 소비된 앞부분이 이 크기 이상이고 파일의 절반을 넘으면 압축
const COMPACT_MIN_HEAD: u64 = 64 * 1024 * 1024;

/// 캐시 레코드
///
/// 포인트는 라인 프로토콜 텍스트로 보관합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 전송 대상 카테고리 이름
    pub category: String,
    /// 포인트 직렬화 라인
    pub lines: Vec<String>,
}

impl CacheEntry {
    /// 포인트 목록으로 레코드를 생성합니다.
    pub fn from_points(category: impl Into<String>, points: &[Point]) -> Self {
        Self {
            category: category.into(),
            lines: points.iter().map(ToString::to_string).collect(),
        }
    }

    /// 포인트 수
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 포인트가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 라인을 포인트로 복원합니다.
    pub fn decode_points(&self) -> Result<Vec<Point>, PointError> {
        Point::parse_lines(&self.lines.join("\n"))
    }

    fn encode(&self) -> Result<BytesMut, IoError> {
        let payload = serde_json::to_vec(self)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| IoError::CacheRecord(format!("record too large: {} bytes", payload.len())))?;
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN as usize + payload.len());
        buf.put_u32_le(len);
        buf.put_slice(&payload);
        Ok(buf)
    }
}

/// 한 번의 재전송 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 완전히 전달되어 제거된 레코드 수
    pub replayed_entries: usize,
    /// 전달된 포인트 수 (부분 성공 포함)
    pub delivered_points: u64,
    /// 다시 대기열에 남은 레코드 수
    pub requeued_entries: usize,
    /// 손상되어 버려진 레코드 수
    pub malformed: usize,
}

/// 로그에서 읽어낸 레코드
enum Frame {
    Entry(CacheEntry),
    Malformed(String),
}

struct ReadFrame {
    /// 레코드가 끝나는 파일 오프셋
    end: u64,
    frame: Frame,
}

#[derive(Default)]
struct Batch {
    frames: Vec<ReadFrame>,
    /// 잘린 레코드를 만났다면 그 시점의 파일 길이
    torn_to: Option<u64>,
}

/// 로그 파일 상태 (blocking 스레드에서만 디스크 접근)
struct LogState {
    dir: PathBuf,
    /// 추가 쓰기 핸들
    file: File,
    /// 소비된 위치
    head: u64,
}

impl LogState {
    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE_NAME)
    }

    fn file_len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn pending_bytes(&self) -> io::Result<u64> {
        Ok(self.file_len()?.saturating_sub(self.head))
    }

    /// head부터 최대 `limit`개 레코드를 읽습니다.
    fn read_batch(&self, limit: usize) -> Result<Batch, IoError> {
        let file_len = self.file_len()?;
        let mut batch = Batch::default();
        if self.head >= file_len {
            return Ok(batch);
        }

        let mut reader = BufReader::new(File::open(self.log_path())?);
        reader.seek(SeekFrom::Start(self.head))?;
        let mut offset = self.head;
        while batch.frames.len() < limit && offset < file_len {
            if offset + FRAME_HEADER_LEN > file_len {
                batch.torn_to = Some(file_len);
                break;
            }
            let mut header = [0u8; FRAME_HEADER_LEN as usize];
            reader.read_exact(&mut header)?;
            let len = u64::from(u32::from_le_bytes(header));
            let end = offset + FRAME_HEADER_LEN + len;
            if end > file_len {
                batch.torn_to = Some(file_len);
                break;
            }
            let mut payload = vec![0u8; len as usize];
            reader.read_exact(&mut payload)?;
            let frame = match serde_json::from_slice::<CacheEntry>(&payload) {
                Ok(entry) => Frame::Entry(entry),
                Err(e) => Frame::Malformed(e.to_string()),
            };
            batch.frames.push(ReadFrame { end, frame });
            offset = end;
        }
        Ok(batch)
    }

    fn append(&mut self, entry: &CacheEntry) -> Result<(), IoError> {
        self.file.write_all(&entry.encode()?)?;
        Ok(())
    }

    /// 소비 위치를 옮기고 다시 보낼 레코드를 로그 끝에 붙입니다.
    fn commit(&mut self, consumed_to: u64, requeue: &[CacheEntry]) -> Result<(), IoError> {
        for entry in requeue {
            self.append(entry)?;
        }
        self.file.flush()?;

        self.head = self.head.max(consumed_to);
        let file_len = self.file_len()?;
        if self.head >= file_len {
            self.file.set_len(0)?;
            self.head = 0;
        } else if self.head >= COMPACT_MIN_HEAD && self.head * 2 >= file_len {
            self.compact()?;
        }
        self.persist_head()
    }

    /// 소비되지 않은 부분만 새 파일로 옮깁니다.
    fn compact(&mut self) -> Result<(), IoError> {
        let tmp_path = self.dir.join(TMP_FILE_NAME);
        {
            let mut src = File::open(self.log_path())?;
            src.seek(SeekFrom::Start(self.head))?;
            let mut tmp = File::create(&tmp_path)?;
            io::copy(&mut src, &mut tmp)?;
            tmp.sync_all()?;
        }
        // rename 전에 head를 먼저 되돌려 중간에 죽어도 레코드 경계가 어긋나지 않게 함
        let reclaimed = self.head;
        self.head = 0;
        self.persist_head()?;
        fs::rename(&tmp_path, self.log_path())?;
        self.file = open_append(&self.log_path())?;
        debug!(reclaimed_bytes = reclaimed, "fail cache compacted");
        Ok(())
    }

    fn persist_head(&self) -> Result<(), IoError> {
        let tmp = self.dir.join(HEAD_TMP_FILE_NAME);
        fs::write(&tmp, self.head.to_le_bytes())?;
        fs::rename(&tmp, self.dir.join(HEAD_FILE_NAME))?;
        Ok(())
    }

    fn truncate(&mut self) -> Result<(), IoError> {
        self.file.set_len(0)?;
        self.head = 0;
        self.persist_head()
    }
}

/// 카테고리별 실패 캐시
pub struct FailCache {
    category: Category,
    dir: PathBuf,
    max_bytes: u64,
    state: Arc<Mutex<LogState>>,
    /// 대기 중인 레코드 수
    entries: AtomicUsize,
    /// 동시 drain 병합용
    draining: tokio::sync::Mutex<()>,
}

impl FailCache {
    /// 캐시 디렉토리를 열거나 생성합니다.
    ///
    /// 비정상 종료로 잘린 마지막 레코드는 잘라냅니다.
    pub fn open(root: &Path, category: Category, max_bytes: u64) -> Result<Self, IoError> {
        let dir = root.join(category.as_str());
        fs::create_dir_all(&dir)?;
        let log_path = dir.join(LOG_FILE_NAME);
        let file = open_append(&log_path)?;
        let file_len = file.metadata()?.len();
        let head = load_head(&dir, file_len, category);

        let (entries, valid_end) = scan_frames(&log_path, head, file_len)?;
        if valid_end < file_len {
            warn!(
                category = category.as_str(),
                discarded_bytes = file_len - valid_end,
                "fail cache ends with a truncated record, discarding it"
            );
            file.set_len(valid_end)?;
        }
        if entries > 0 {
            info!(
                category = category.as_str(),
                entries, "fail cache has pending entries from a previous run"
            );
        }

        Ok(Self {
            category,
            dir: dir.clone(),
            max_bytes,
            state: Arc::new(Mutex::new(LogState { dir, file, head })),
            entries: AtomicUsize::new(entries),
            draining: tokio::sync::Mutex::new(()),
        })
    }

    /// 캐시 카테고리
    pub fn category(&self) -> Category {
        self.category
    }

    /// 로그 파일 경로
    pub fn path(&self) -> PathBuf {
        self.dir.join(LOG_FILE_NAME)
    }

    /// 레코드를 로그 끝에 추가합니다.
    ///
    /// # Errors
    /// - 용량 초과 시 `IoError::CacheFull`
    /// - 직렬화/디스크 에러
    pub fn put(&self, entry: &CacheEntry) -> Result<(), IoError> {
        if entry.is_empty() {
            return Ok(());
        }
        let frame = entry.encode()?;

        let mut state = lock(&self.state);
        let size = state.pending_bytes()?;
        if size + frame.len() as u64 > self.max_bytes {
            return Err(IoError::CacheFull {
                category: self.category.as_str().to_owned(),
                size,
                max: self.max_bytes,
            });
        }
        state.file.write_all(&frame)?;
        state.file.flush()?;
        drop(state);
        self.entries.fetch_add(1, Ordering::Relaxed);

        metrics::counter!(
            m::FAIL_CACHE_POINTS_CACHED_TOTAL,
            m::LABEL_CATEGORY => self.category.as_str()
        )
        .increment(entry.len() as u64);
        debug!(
            category = self.category.as_str(),
            points = entry.len(),
            "cached failed points"
        );
        Ok(())
    }

    /// 대기 중인 레코드를 재전송합니다.
    ///
    /// `resend`는 `(카테고리 이름, 포인트)`를 받아 전달하지 못한 포인트를 반환합니다.
    /// 완전히 성공한 레코드는 제거되고, 부분 실패는 실패한 포인트만 다시 대기열에
    /// 넣으며, `Err`이면 그 레코드부터 남기고 이번 주기를 멈춥니다.
    ///
    /// 이미 다른 drain이 진행 중이면 아무것도 하지 않고 빈 결과를 반환합니다.
    pub async fn drain<F, Fut>(&self, mut resend: F) -> Result<DrainReport, IoError>
    where
        F: FnMut(String, Vec<Point>) -> Fut,
        Fut: Future<Output = Result<Vec<Point>, IoError>>,
    {
        let Ok(_guard) = self.draining.try_lock() else {
            debug!(
                category = self.category.as_str(),
                "fail cache drain already in progress"
            );
            return Ok(DrainReport::default());
        };

        let state = Arc::clone(&self.state);
        let batch = run_blocking(move || lock(&state).read_batch(MAX_REPLAY_ENTRIES)).await?;
        if batch.frames.is_empty() && batch.torn_to.is_none() {
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport::default();
        let mut requeue: Vec<CacheEntry> = Vec::new();
        let mut consumed_to = None;
        let mut consumed = 0usize;
        let mut stopped = false;

        for ReadFrame { end, frame } in batch.frames {
            match frame {
                Frame::Malformed(reason) => {
                    warn!(
                        category = self.category.as_str(),
                        reason = reason.as_str(),
                        "skipping unreadable fail cache record"
                    );
                    report.malformed += 1;
                }
                Frame::Entry(entry) => match entry.decode_points() {
                    Err(e) => {
                        warn!(
                            category = self.category.as_str(),
                            error = %e,
                            "skipping fail cache record with invalid points"
                        );
                        report.malformed += 1;
                    }
                    Ok(points) => {
                        let total = points.len() as u64;
                        match resend(entry.category.clone(), points).await {
                            Ok(failed) if failed.is_empty() => {
                                report.replayed_entries += 1;
                                report.delivered_points += total;
                            }
                            Ok(failed) => {
                                report.delivered_points +=
                                    total.saturating_sub(failed.len() as u64);
                                report.requeued_entries += 1;
                                requeue.push(CacheEntry::from_points(entry.category, &failed));
                            }
                            Err(e) => {
                                debug!(
                                    category = self.category.as_str(),
                                    error = %e,
                                    "fail cache replay failed, retrying next cycle"
                                );
                                report.requeued_entries += 1;
                                stopped = true;
                            }
                        }
                    }
                },
            }
            if stopped {
                break;
            }
            consumed_to = Some(end);
            consumed += 1;
        }

        if let Some(torn_to) = batch.torn_to.filter(|_| !stopped) {
            warn!(
                category = self.category.as_str(),
                "fail cache ends with a truncated record, discarding it"
            );
            report.malformed += 1;
            consumed_to = Some(torn_to);
        }

        if let Some(consumed_to) = consumed_to {
            let requeued = requeue.len();
            let state = Arc::clone(&self.state);
            run_blocking(move || lock(&state).commit(consumed_to, &requeue)).await?;
            let _ = self
                .entries
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    Some(n.saturating_sub(consumed) + requeued)
                });
        }

        if report.replayed_entries > 0 {
            metrics::counter!(
                m::FAIL_CACHE_ENTRIES_REPLAYED_TOTAL,
                m::LABEL_CATEGORY => self.category.as_str()
            )
            .increment(report.replayed_entries as u64);
        }
        if report.malformed > 0 {
            metrics::counter!(
                m::FAIL_CACHE_MALFORMED_TOTAL,
                m::LABEL_CATEGORY => self.category.as_str()
            )
            .increment(report.malformed as u64);
        }

        Ok(report)
    }

    /// 대기 중인 레코드 수 (손상된 레코드 포함)
    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    /// 대기 중인 레코드가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.size_bytes() == 0
    }

    /// 아직 소비되지 않은 로그 크기 (바이트)
    pub fn size_bytes(&self) -> u64 {
        lock(&self.state).pending_bytes().unwrap_or(0)
    }

    /// 모든 레코드를 삭제합니다 (관리자 작업).
    pub async fn purge(&self) -> Result<(), IoError> {
        let _guard = self.draining.lock().await;
        let state = Arc::clone(&self.state);
        run_blocking(move || lock(&state).truncate()).await?;
        self.entries.store(0, Ordering::Relaxed);
        info!(category = self.category.as_str(), "fail cache purged");
        Ok(())
    }
}

fn lock(state: &Mutex<LogState>) -> MutexGuard<'_, LogState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_blocking<T, F>(f: F) -> Result<T, IoError>
where
    F: FnOnce() -> Result<T, IoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IoError::Io(io::Error::other(e)))?
}

fn open_append(path: &Path) -> Result<File, IoError> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)?)
}

/// 저장된 소비 위치를 읽습니다. 없거나 파일보다 크면 처음부터 시작합니다.
fn load_head(dir: &Path, file_len: u64, category: Category) -> u64 {
    let Ok(raw) = fs::read(dir.join(HEAD_FILE_NAME)) else {
        return 0;
    };
    let head = <[u8; 8]>::try_from(raw.as_slice()).map_or(0, u64::from_le_bytes);
    if head > file_len {
        warn!(
            category = category.as_str(),
            head, file_len, "fail cache head beyond end of log, replaying from start"
        );
        return 0;
    }
    head
}

/// 헤더만 읽어 온전한 레코드 수와 그 끝 위치를 셉니다.
fn scan_frames(path: &Path, from: u64, file_len: u64) -> Result<(usize, u64), IoError> {
    let mut reader = BufReader::new(File::open(path)?);
    reader.seek(SeekFrom::Start(from))?;
    let mut offset = from;
    let mut count = 0;
    while offset + FRAME_HEADER_LEN <= file_len {
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        reader.read_exact(&mut header)?;
        let len = u64::from(u32::from_le_bytes(header));
        let end = offset + FRAME_HEADER_LEN + len;
        if end > file_len {
            break;
        }
        reader.seek_relative(len as i64)?;
        count += 1;
        offset = end;
    }
    Ok((count, offset))
}
