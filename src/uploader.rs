//! 파일 업로드 오케스트레이터
//!
//! - 파일 하나: 청크를 순서대로 하나씩 (이전 결과가 나와야 다음 청크)
//! - 배치: 파일끼리는 동시에, 청크 크기나 처리율 상태는 공유하지 않음
//! - 한 파일의 실패는 다른 파일에 영향 없음

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::digest::{ContentDigest, Sha256Digest};
use crate::merge::MergeCoordinator;
use crate::sender::ChunkSender;
use crate::source::{ChunkSource, FileSource, MemorySource};
use crate::stats::{BatchStats, StatsReport, TransferStats};
use crate::store::TaskStore;
use crate::task::{TaskSnapshot, TaskStatus, UploadTask};
use crate::throughput::ThroughputEstimator;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 성공 메시지
pub const SUCCESS_MESSAGE: &str = "File uploaded successfully!";

/// 업로드할 파일
#[derive(Clone)]
pub struct UploadFile {
    /// 배치 내에서 유일한 ID
    pub file_id: String,

    pub source: Arc<dyn ChunkSource>,
}

impl UploadFile {
    pub fn new(file_id: impl Into<String>, source: Arc<dyn ChunkSource>) -> Self {
        Self {
            file_id: file_id.into(),
            source,
        }
    }

    /// 메모리 데이터
    pub fn from_bytes(file_id: impl Into<String>, data: impl Into<bytes::Bytes>) -> Self {
        Self::new(file_id, Arc::new(MemorySource::new(data)))
    }

    /// 디스크 파일 (ID는 파일 이름)
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidConfig(format!("파일 이름 없음: {}", path.display())))?;
        let source = FileSource::open(path).await?;
        Ok(Self::new(file_id, Arc::new(source)))
    }
}

/// 파일 하나의 결과
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub snapshot: TaskSnapshot,
    pub stats: StatsReport,
}

impl TaskReport {
    pub fn file_id(&self) -> &str {
        &self.snapshot.file_id
    }

    pub fn status(&self) -> TaskStatus {
        self.snapshot.status
    }

    pub fn succeeded(&self) -> bool {
        self.snapshot.status == TaskStatus::Succeeded
    }
}

/// 배치 결과 (제출 순서)
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub initial_chunk_size: u64,
    pub tasks: Vec<TaskReport>,
}

impl BatchReport {
    pub fn get(&self, file_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.file_id() == file_id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.status() == TaskStatus::Failed)
    }

    pub fn all_succeeded(&self) -> bool {
        self.tasks.iter().all(|t| t.succeeded())
    }
}

struct UploaderInner {
    config: Config,
    transport: Arc<dyn Transport>,
    sender: ChunkSender,
    merger: MergeCoordinator,
    estimator: ThroughputEstimator,
    store: TaskStore,
    cancel_flags: DashMap<String, Arc<AtomicBool>>,
    stats: RwLock<BatchStats>,
}

/// 업로더 (복제해도 같은 상태를 공유)
#[derive(Clone)]
pub struct Uploader {
    inner: Arc<UploaderInner>,
}

impl Uploader {
    /// SHA-256 다이제스트로 생성
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_digest(config, transport, Arc::new(Sha256Digest))
    }

    pub fn with_digest(
        config: Config,
        transport: Arc<dyn Transport>,
        digest: Arc<dyn ContentDigest>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(UploaderInner {
                sender: ChunkSender::new(config.clone(), transport.clone(), digest),
                merger: MergeCoordinator::new(transport.clone(), config.request_timeout()),
                estimator: ThroughputEstimator::new(&config),
                store: TaskStore::new(),
                cancel_flags: DashMap::new(),
                stats: RwLock::new(BatchStats::default()),
                transport,
                config,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// 표시 계층용 상태 저장소
    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    /// 누적 통계
    pub fn get_stats(&self) -> BatchStats {
        self.inner.stats.read().clone()
    }

    /// 업로드 취소 (이후 청크를 보내지 않음)
    ///
    /// 이미 수락된 서버측 청크는 그대로 남는다.
    pub fn cancel(&self, file_id: &str) -> bool {
        match self.inner.cancel_flags.get(file_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                info!("취소 요청: {}", file_id);
                true
            }
            None => false,
        }
    }

    /// 배치 시작 시 청크 크기
    async fn initial_chunk_size(&self) -> u64 {
        if self.inner.config.probe_on_start {
            self.inner
                .estimator
                .initial_chunk_size(self.inner.transport.as_ref())
                .await
        } else {
            self.inner.config.default_chunk_size
        }
    }

    /// 배치 업로드
    ///
    /// 파일마다 독립된 태스크를 띄우고 모두 끝날 때까지 기다린다.
    pub async fn upload_batch(&self, files: Vec<UploadFile>) -> Result<BatchReport> {
        if files.is_empty() {
            warn!("업로드할 파일 없음");
            return Err(Error::NoFileSelected);
        }
        let mut seen = HashSet::new();
        for file in &files {
            if !seen.insert(file.file_id.as_str()) {
                return Err(Error::DuplicateFileId(file.file_id.clone()));
            }
        }

        // 이전 배치 표시 정리
        self.inner.store.clear();

        let initial_chunk_size = self.initial_chunk_size().await;
        info!(
            "Batch: {} files, initial chunk size {} bytes",
            files.len(),
            initial_chunk_size
        );

        for file in &files {
            let task = UploadTask::new(file.file_id.clone(), file.source.len(), initial_chunk_size);
            self.inner.store.register(task.snapshot());
            self.inner
                .cancel_flags
                .insert(file.file_id.clone(), Arc::new(AtomicBool::new(false)));
        }

        let handles: Vec<_> = files
            .into_iter()
            .map(|file| {
                let this = self.clone();
                let file_id = file.file_id.clone();
                let total_size = file.source.len();
                let handle = tokio::spawn(async move { this.upload_file(file, initial_chunk_size).await });
                (file_id, total_size, handle)
            })
            .collect();

        let mut tasks = Vec::with_capacity(handles.len());
        for (file_id, total_size, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    warn!("태스크 비정상 종료 {}: {}", file_id, e);
                    let mut task = UploadTask::new(file_id, total_size, initial_chunk_size);
                    task.fail(crate::error::UNKNOWN_ERROR);
                    self.inner.store.publish(task.snapshot());
                    TaskReport {
                        snapshot: task.snapshot(),
                        stats: StatsReport::default(),
                    }
                }
            };
            tasks.push(report);
        }

        self.inner.stats.write().batches += 1;

        Ok(BatchReport {
            initial_chunk_size,
            tasks,
        })
    }

    /// 파일 하나 업로드 (청크 순차 전송 후 병합)
    pub async fn upload_file(&self, file: UploadFile, initial_chunk_size: u64) -> TaskReport {
        let file_id = file.file_id.clone();
        let cancelled = self
            .inner
            .cancel_flags
            .entry(file_id.clone())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();

        let mut task = UploadTask::new(file_id.clone(), file.source.len(), initial_chunk_size);
        let mut stats = TransferStats::new(self.inner.config.stats_window_size);

        let result = self
            .drive(&mut task, file.source.as_ref(), &mut stats, &cancelled)
            .await;

        match result {
            Ok(()) => {
                task.succeed(SUCCESS_MESSAGE);
                info!("{} 완료 | {}", file_id, stats.summary());
                self.schedule_reset(&file_id);
            }
            Err(e) => {
                warn!("{} 실패: {}", file_id, e);
                task.fail(e.server_message());
            }
        }
        self.inner.store.publish(task.snapshot());
        self.inner.cancel_flags.remove(&file_id);

        let report = TaskReport {
            snapshot: task.snapshot(),
            stats: stats.report(),
        };
        self.inner
            .stats
            .write()
            .absorb(report.succeeded(), &report.stats);
        report
    }

    /// 청크 루프 + 병합
    async fn drive(
        &self,
        task: &mut UploadTask,
        source: &dyn ChunkSource,
        stats: &mut TransferStats,
        cancelled: &AtomicBool,
    ) -> Result<()> {
        if task.has_remaining() {
            task.begin_upload();
            self.inner.store.publish(task.snapshot());
        }

        while task.has_remaining() {
            let accepted = self
                .inner
                .sender
                .send_chunk(task, source, stats, cancelled)
                .await?;
            debug!(
                "{} chunk {} accepted ({} bytes, {} attempts, next {} bytes)",
                task.file_id(),
                accepted.index,
                accepted.size,
                accepted.attempts,
                accepted.next_chunk_size
            );
            self.inner.store.publish(task.snapshot());
        }

        if cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        task.begin_merge();
        self.inner.store.publish(task.snapshot());
        self.inner.merger.merge(task.file_id()).await
    }

    /// 성공 표시 후 일정 시간 뒤 태스크 초기화
    fn schedule_reset(&self, file_id: &str) {
        let Some(delay) = self.inner.config.reset_delay() else {
            return;
        };
        let store = self.inner.store.clone();
        let Some(generation) = store.generation(file_id) else {
            return;
        };
        let file_id = file_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // 그 사이 새 배치가 같은 ID를 다시 등록했으면 세대가 달라 건드리지 않음
            if store.reset_if_generation(&file_id, generation) {
                debug!("{} 초기화 ({:?} 후)", file_id, delay);
            }
        });
    }
}
