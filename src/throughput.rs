//! 처리율 추정과 청크 크기 티어 결정
//!
//! - 프로브: 작은 페이로드 왕복 시간으로 연결 품질 판단
//! - 재조정: 수락된 청크의 처리율로 다음 청크 크기 결정

use std::time::Duration;

use bytes::Bytes;
use rand::RngCore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::Transport;
use crate::Config;

/// 연결 품질
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Good,
    Poor,
}

/// 처리율 추정기
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    lower_tier: u64,
    upper_tier: u64,
    probe_threshold: Duration,
    probe_payload_size: usize,
    request_timeout: Duration,
    throughput_threshold: f64,
}

impl ThroughputEstimator {
    pub fn new(config: &Config) -> Self {
        Self {
            lower_tier: config.lower_tier,
            upper_tier: config.upper_tier,
            probe_threshold: config.probe_threshold(),
            probe_payload_size: config.probe_payload_size,
            request_timeout: config.request_timeout(),
            throughput_threshold: config.throughput_threshold,
        }
    }

    /// 네트워크 프로브 (true = 좋은 연결)
    ///
    /// 실패, 타임아웃 등 애매한 경우는 모두 느린 연결로 본다.
    pub async fn probe(&self, transport: &dyn Transport) -> bool {
        let mut payload = vec![0u8; self.probe_payload_size];
        rand::thread_rng().fill_bytes(&mut payload);

        let start = Instant::now();
        let result = tokio::time::timeout(self.request_timeout, transport.probe(Bytes::from(payload))).await;
        let elapsed = start.elapsed();

        let good = match result {
            Ok(Ok(())) => elapsed < self.probe_threshold,
            Ok(Err(e)) => {
                warn!("프로브 실패, 느린 연결로 간주: {}", e);
                false
            }
            Err(_) => {
                warn!("프로브 타임아웃 ({:?}), 느린 연결로 간주", self.request_timeout);
                false
            }
        };

        info!(
            "Probe: {:?} -> {}",
            elapsed,
            if good { "good" } else { "poor" }
        );
        good
    }

    /// 품질 -> 청크 크기
    pub fn tier_for(&self, quality: ConnectionQuality) -> u64 {
        match quality {
            ConnectionQuality::Good => self.upper_tier,
            ConnectionQuality::Poor => self.lower_tier,
        }
    }

    /// 프로브 결과로 초기 청크 크기 결정
    pub async fn initial_chunk_size(&self, transport: &dyn Transport) -> u64 {
        let quality = if self.probe(transport).await {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Poor
        };
        self.tier_for(quality)
    }

    /// 처리율 계산 (bytes/sec)
    ///
    /// 경과 시간이 0이면 무한대로 취급한다.
    pub fn measure(bytes: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return f64::INFINITY;
        }
        bytes as f64 / secs
    }

    /// 처리율 -> 품질 (임계값 초과만 Good)
    pub fn classify(&self, throughput: f64) -> ConnectionQuality {
        if throughput > self.throughput_threshold {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Poor
        }
    }

    /// 다음 청크 크기
    pub fn next_chunk_size(&self, throughput: f64) -> u64 {
        let size = self.tier_for(self.classify(throughput));
        debug!(
            "처리율 {:.2} MiB/s -> 다음 청크 {} MiB",
            throughput / (1024.0 * 1024.0),
            size / (1024 * 1024)
        );
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::SimulatedTransport;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_next_chunk_size_tiers() {
        let est = ThroughputEstimator::new(&Config::default());
        let threshold = 10.0 * MIB as f64;

        assert_eq!(est.next_chunk_size(threshold * 2.0), 50 * MIB);
        assert_eq!(est.next_chunk_size(threshold), 10 * MIB);
        assert_eq!(est.next_chunk_size(threshold / 4.0), 10 * MIB);
        assert_eq!(est.next_chunk_size(f64::INFINITY), 50 * MIB);
    }

    #[test]
    fn test_measure() {
        assert_eq!(ThroughputEstimator::measure(10 * MIB, Duration::from_secs(2)), 5.0 * MIB as f64);
        assert!(ThroughputEstimator::measure(1, Duration::ZERO).is_infinite());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_fast_is_good() {
        let est = ThroughputEstimator::new(&Config::default());
        let sim = SimulatedTransport::new().with_probe_latency(Duration::from_millis(200));
        assert!(est.probe(&sim).await);
        assert_eq!(est.initial_chunk_size(&sim).await, 50 * MIB);
        assert_eq!(sim.probe_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_slow_is_poor() {
        let est = ThroughputEstimator::new(&Config::default());
        let sim = SimulatedTransport::new().with_probe_latency(Duration::from_millis(1500));
        assert!(!est.probe(&sim).await);
        assert_eq!(est.initial_chunk_size(&sim).await, 10 * MIB);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_is_poor() {
        let mut config = Config::default();
        config.request_timeout_ms = 100;
        let est = ThroughputEstimator::new(&config);
        let sim = SimulatedTransport::new().with_probe_latency(Duration::from_secs(10));
        assert!(!est.probe(&sim).await);
        assert_eq!(sim.probe_count(), 0);
    }
}
