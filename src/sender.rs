//! 청크 전송 상태 머신
//!
//! - 청크 하나: Pending -> Sending -> {Accepted | Rejected}
//! - Rejected는 재시도 예산이 남아 있으면 Pending으로, 아니면 태스크 실패
//! - 재시도는 같은 범위, 같은 이름, 같은 다이제스트를 그대로 다시 보낸다
//! - 청크 크기 재조정은 수락된 청크의 처리율로만 한다

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::chunk::{range_at, Chunk};
use crate::digest::ContentDigest;
use crate::source::ChunkSource;
use crate::stats::TransferStats;
use crate::task::UploadTask;
use crate::throughput::ThroughputEstimator;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 청크 전송 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Sending,
    Accepted,
    Rejected,
}

/// 수락된 청크 결과
#[derive(Debug, Clone)]
pub struct ChunkAccepted {
    /// 청크 인덱스
    pub index: u64,

    /// 바이트 수
    pub size: u64,

    /// 시도 횟수 (1 = 첫 시도 성공)
    pub attempts: u32,

    /// 측정된 처리율 (bytes/sec)
    pub throughput: f64,

    /// 다음 청크에 쓸 크기
    pub next_chunk_size: u64,
}

/// 청크 송신자
pub struct ChunkSender {
    config: Config,
    transport: Arc<dyn Transport>,
    digest: Arc<dyn ContentDigest>,
    estimator: ThroughputEstimator,
}

impl ChunkSender {
    pub fn new(config: Config, transport: Arc<dyn Transport>, digest: Arc<dyn ContentDigest>) -> Self {
        Self {
            estimator: ThroughputEstimator::new(&config),
            config,
            transport,
            digest,
        }
    }

    /// 태스크의 다음 청크를 보낸다
    ///
    /// 성공하면 태스크를 전진시키고, 재시도 예산을 다 쓰면 마지막 에러를 돌려준다.
    /// 실패 시 태스크의 인덱스와 청크 크기는 바뀌지 않는다.
    pub async fn send_chunk(
        &self,
        task: &mut UploadTask,
        source: &dyn ChunkSource,
        stats: &mut TransferStats,
        cancelled: &AtomicBool,
    ) -> Result<ChunkAccepted> {
        let index = task.next_chunk_index();
        let range = range_at(task.bytes_sent(), task.chunk_size(), task.total_size())
            .ok_or_else(|| Error::InvalidConfig(format!("보낼 바이트 없음: {}", task.file_id())))?;

        // 재시도 사이에 바이트가 바뀌지 않으므로 읽기와 다이제스트는 한 번만
        let data = source.read_range(range).await?;
        let digest = self.digest.digest(&data);
        let chunk = Chunk::new(task.file_id(), index, range, data, digest);

        let timeout = self.config.request_timeout();
        let mut state = ChunkState::Pending;
        let mut retry_count: u32 = 0;

        loop {
            if cancelled.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            transition(&chunk, &mut state, ChunkState::Sending);
            stats.record_attempt(chunk.size(), retry_count > 0);

            let start = Instant::now();
            let result = match tokio::time::timeout(timeout, self.transport.send_chunk(task.file_id(), &chunk)).await {
                Ok(r) => r,
                Err(_) => {
                    stats.record_timeout();
                    Err(Error::Timeout {
                        operation: "send_chunk",
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            };
            let elapsed = start.elapsed();

            match result {
                Ok(()) => {
                    transition(&chunk, &mut state, ChunkState::Accepted);
                    stats.record_accepted(chunk.size(), elapsed);

                    let throughput = ThroughputEstimator::measure(chunk.size(), elapsed);
                    if self.config.adapt_after_chunk {
                        task.set_chunk_size(self.estimator.next_chunk_size(throughput));
                    }
                    task.record_accepted(&chunk);

                    return Ok(ChunkAccepted {
                        index,
                        size: chunk.size(),
                        attempts: retry_count + 1,
                        throughput,
                        next_chunk_size: task.chunk_size(),
                    });
                }
                Err(e) => {
                    transition(&chunk, &mut state, ChunkState::Rejected);

                    if !e.is_retryable() || retry_count >= self.config.max_retries {
                        warn!(
                            "{} 포기 ({}회 시도): {}",
                            chunk.name,
                            retry_count + 1,
                            e
                        );
                        return Err(e);
                    }

                    retry_count += 1;
                    warn!(
                        "{} 실패, 재시도 {}/{}: {}",
                        chunk.name, retry_count, self.config.max_retries, e
                    );
                    transition(&chunk, &mut state, ChunkState::Pending);
                    self.backoff(retry_count).await;
                }
            }
        }
    }

    /// 재시도 대기 (선형 증가 + 지터)
    async fn backoff(&self, retry_count: u32) {
        let base = self.config.retry_backoff_ms;
        if base == 0 {
            return;
        }
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        let delay = base * retry_count as u64 + jitter;
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

fn transition(chunk: &Chunk, state: &mut ChunkState, next: ChunkState) {
    debug!("{}: {:?} -> {:?}", chunk.name, state, next);
    *state = next;
}
