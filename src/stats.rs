//! 전송 통계

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// 수락된 청크 기록
#[derive(Debug, Clone, Copy)]
struct ThroughputSample {
    size: u64,
    elapsed: Duration,
}

/// 태스크별 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 최근 처리율 샘플
    samples: VecDeque<ThroughputSample>,

    /// 윈도우 크기
    window_size: usize,

    /// 총 전송 시도 수 (재시도 포함)
    pub attempts: u64,

    /// 수락된 청크 수
    pub accepted_chunks: u64,

    /// 재시도 수
    pub retries: u64,

    /// 타임아웃 수
    pub timeouts: u64,

    /// 수락된 바이트
    pub bytes_accepted: u64,

    /// 재시도로 다시 보낸 바이트
    pub bytes_resent: u64,
}

impl TransferStats {
    pub fn new(window_size: usize) -> Self {
        Self {
            start_time: Instant::now(),
            samples: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            attempts: 0,
            accepted_chunks: 0,
            retries: 0,
            timeouts: 0,
            bytes_accepted: 0,
            bytes_resent: 0,
        }
    }

    /// 시도 기록
    pub fn record_attempt(&mut self, size: u64, is_retry: bool) {
        self.attempts += 1;
        if is_retry {
            self.retries += 1;
            self.bytes_resent += size;
        }
    }

    /// 수락 기록
    pub fn record_accepted(&mut self, size: u64, elapsed: Duration) {
        if self.samples.len() >= self.window_size {
            self.samples.pop_front();
        }
        self.samples.push_back(ThroughputSample { size, elapsed });

        self.accepted_chunks += 1;
        self.bytes_accepted += size;
    }

    /// 타임아웃 기록
    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 마지막 청크 처리율 (bytes/sec)
    pub fn last_throughput(&self) -> Option<f64> {
        let s = self.samples.back()?;
        Some(s.size as f64 / s.elapsed.as_secs_f64().max(f64::EPSILON))
    }

    /// 윈도우 평균 처리율 (bytes/sec)
    pub fn average_throughput(&self) -> f64 {
        let total_size: u64 = self.samples.iter().map(|s| s.size).sum();
        let total_time: f64 = self.samples.iter().map(|s| s.elapsed.as_secs_f64()).sum();
        if total_time == 0.0 {
            return 0.0;
        }
        total_size as f64 / total_time
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Chunks: {} | Attempts: {} | Retries: {} | Bytes: {} | Throughput: {:.2} MB/s",
            self.elapsed().as_secs_f64(),
            self.accepted_chunks,
            self.attempts,
            self.retries,
            self.bytes_accepted,
            self.average_throughput() / 1_000_000.0,
        )
    }

    /// 보고서용 요약
    pub fn report(&self) -> StatsReport {
        StatsReport {
            attempts: self.attempts,
            accepted_chunks: self.accepted_chunks,
            retries: self.retries,
            timeouts: self.timeouts,
            bytes_accepted: self.bytes_accepted,
            average_throughput: self.average_throughput(),
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(32)
    }
}

/// 직렬화 가능한 통계 요약
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    pub attempts: u64,
    pub accepted_chunks: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub bytes_accepted: u64,
    pub average_throughput: f64,
    pub elapsed_ms: u64,
}

/// 업로더 전체 누적 통계
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// 실행한 배치 수
    pub batches: u64,

    /// 성공한 파일 수
    pub succeeded_files: u64,

    /// 실패한 파일 수
    pub failed_files: u64,

    /// 총 수락 바이트
    pub total_bytes: u64,

    /// 총 재시도 수
    pub total_retries: u64,
}

impl BatchStats {
    /// 태스크 결과 반영
    pub fn absorb(&mut self, succeeded: bool, stats: &StatsReport) {
        if succeeded {
            self.succeeded_files += 1;
        } else {
            self.failed_files += 1;
        }
        self.total_bytes += stats.bytes_accepted;
        self.total_retries += stats.retries;
    }

    pub fn summary(&self) -> String {
        format!(
            "Batches: {} | Files: {} ok / {} failed | Bytes: {} | Retries: {}",
            self.batches, self.succeeded_files, self.failed_files, self.total_bytes, self.total_retries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_and_average() {
        let mut stats = TransferStats::new(2);
        stats.record_accepted(100, Duration::from_secs(1));
        stats.record_accepted(300, Duration::from_secs(1));
        assert_eq!(stats.average_throughput(), 200.0);

        // 첫 샘플은 윈도우 밖으로
        stats.record_accepted(500, Duration::from_secs(1));
        assert_eq!(stats.average_throughput(), 400.0);
        assert_eq!(stats.last_throughput(), Some(500.0));
        assert_eq!(stats.accepted_chunks, 3);
        assert_eq!(stats.bytes_accepted, 900);
    }

    #[test]
    fn test_attempts_and_retries() {
        let mut stats = TransferStats::default();
        stats.record_attempt(10, false);
        stats.record_attempt(10, true);
        stats.record_attempt(10, true);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.bytes_resent, 20);
        assert_eq!(stats.last_throughput(), None);
        assert_eq!(stats.average_throughput(), 0.0);
    }

    #[test]
    fn test_batch_absorb() {
        let mut batch = BatchStats::default();
        let report = StatsReport {
            bytes_accepted: 10,
            retries: 2,
            ..Default::default()
        };
        batch.absorb(true, &report);
        batch.absorb(false, &report);
        assert_eq!(batch.succeeded_files, 1);
        assert_eq!(batch.failed_files, 1);
        assert_eq!(batch.total_bytes, 20);
        assert_eq!(batch.total_retries, 4);
    }
}
