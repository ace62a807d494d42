//! 프로세스 내 가상 서버
//!
//! accept-chunk / merge 계약을 흉내낸다.
//! - 받은 바이트의 다이제스트를 다시 계산해서 불일치면 거절
//! - 파일별로 수락된 청크를 인덱스 순으로 보관, 병합 시 이어붙임
//! - 지연, 대역폭, 청크별 실패 횟수, 병합 실패를 스크립트로 지정

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::debug;

use crate::chunk::{Chunk, ChunkIndex, ChunkRange};
use crate::digest::{ContentDigest, Sha256Digest};
use crate::transport::Transport;
use crate::{Error, Result};

/// 스크립트된 실패 종류
#[derive(Debug, Clone)]
pub enum FailureKind {
    /// 에러 응답 (메시지 선택)
    Reject(Option<String>),
    /// 응답 없음 (타임아웃 유도)
    Stall,
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    remaining: u32,
    kind: FailureKind,
}

/// 청크 전송 시도 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAttempt {
    pub file_id: String,
    pub index: ChunkIndex,
    pub name: String,
    pub range: ChunkRange,
    pub digest: String,
    pub size: u64,
    pub accepted: bool,
}

#[derive(Default)]
struct ServerState {
    /// file_id -> (index -> data)
    parts: HashMap<String, BTreeMap<ChunkIndex, Bytes>>,
    attempts: Vec<ChunkAttempt>,
    chunk_failures: HashMap<(String, ChunkIndex), ScriptedFailure>,
    merge_failures: HashMap<String, Option<String>>,
    merged: HashMap<String, Bytes>,
    merge_calls: Vec<String>,
    probes: u32,
}

/// 가상 서버 전송
pub struct SimulatedTransport {
    /// 요청당 고정 지연
    latency: Duration,

    /// 프로브 지연
    probe_latency: Duration,

    /// 대역폭 (bytes/sec), None이면 무한
    bandwidth: Option<f64>,

    /// 서버측 검증용 다이제스트
    verifier: Box<dyn ContentDigest>,

    state: Mutex<ServerState>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            probe_latency: Duration::ZERO,
            bandwidth: None,
            verifier: Box::new(Sha256Digest),
            state: Mutex::new(ServerState::default()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_probe_latency(mut self, latency: Duration) -> Self {
        self.probe_latency = latency;
        self
    }

    pub fn with_bandwidth(mut self, bytes_per_sec: f64) -> Self {
        self.bandwidth = Some(bytes_per_sec);
        self
    }

    /// 청크 `index`의 처음 `times`번 시도를 실패시킴
    pub fn fail_chunk(&self, file_id: &str, index: ChunkIndex, times: u32, kind: FailureKind) {
        self.state.lock().chunk_failures.insert(
            (file_id.to_string(), index),
            ScriptedFailure {
                remaining: times,
                kind,
            },
        );
    }

    /// 병합 요청을 실패시킴
    pub fn fail_merge(&self, file_id: &str, message: Option<&str>) {
        self.state
            .lock()
            .merge_failures
            .insert(file_id.to_string(), message.map(str::to_string));
    }

    /// 모든 전송 시도 (시간순)
    pub fn attempts(&self) -> Vec<ChunkAttempt> {
        self.state.lock().attempts.clone()
    }

    /// 특정 파일의 전송 시도
    pub fn attempts_for(&self, file_id: &str) -> Vec<ChunkAttempt> {
        self.state
            .lock()
            .attempts
            .iter()
            .filter(|a| a.file_id == file_id)
            .cloned()
            .collect()
    }

    /// 병합 호출 기록
    pub fn merge_calls(&self) -> Vec<String> {
        self.state.lock().merge_calls.clone()
    }

    /// 병합된 파일 내용
    pub fn merged(&self, file_id: &str) -> Option<Bytes> {
        self.state.lock().merged.get(file_id).cloned()
    }

    pub fn probe_count(&self) -> u32 {
        self.state.lock().probes
    }

    fn transfer_delay(&self, size: u64) -> Duration {
        let wire = match self.bandwidth {
            Some(bw) if bw > 0.0 => Duration::from_secs_f64(size as f64 / bw),
            _ => Duration::ZERO,
        };
        self.latency + wire
    }

    /// 스크립트된 실패가 남아 있으면 하나 소모
    fn take_failure(&self, file_id: &str, index: ChunkIndex) -> Option<FailureKind> {
        let mut state = self.state.lock();
        let key = (file_id.to_string(), index);
        let failure = state.chunk_failures.get_mut(&key)?;
        if failure.remaining == 0 {
            return None;
        }
        failure.remaining -= 1;
        Some(failure.kind.clone())
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn probe(&self, _payload: Bytes) -> Result<()> {
        tokio::time::sleep(self.probe_latency).await;
        self.state.lock().probes += 1;
        Ok(())
    }

    async fn send_chunk(&self, file_id: &str, chunk: &Chunk) -> Result<()> {
        tokio::time::sleep(self.transfer_delay(chunk.size())).await;

        let failure = self.take_failure(file_id, chunk.index);
        if let Some(FailureKind::Stall) = failure {
            // 호출측 타임아웃이 먼저 끝난다
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }

        let verified = self.verifier.digest(&chunk.data) == chunk.digest;
        let result = match failure {
            Some(FailureKind::Reject(message)) => Err(Error::Transport {
                status: Some(500),
                message,
            }),
            _ if !verified => Err(Error::Transport {
                status: Some(422),
                message: Some("checksum mismatch".to_string()),
            }),
            _ => Ok(()),
        };

        let mut state = self.state.lock();
        state.attempts.push(ChunkAttempt {
            file_id: file_id.to_string(),
            index: chunk.index,
            name: chunk.name.clone(),
            range: chunk.range,
            digest: chunk.digest.clone(),
            size: chunk.size(),
            accepted: result.is_ok(),
        });
        if result.is_ok() {
            state
                .parts
                .entry(file_id.to_string())
                .or_default()
                .insert(chunk.index, chunk.data.clone());
            debug!("[sim] {} 수락", chunk.name);
        }
        result
    }

    async fn merge(&self, file_id: &str) -> Result<()> {
        tokio::time::sleep(self.latency).await;

        let mut state = self.state.lock();
        state.merge_calls.push(file_id.to_string());

        if let Some(message) = state.merge_failures.get(file_id).cloned() {
            return Err(Error::Transport {
                status: Some(500),
                message,
            });
        }

        let parts = state.parts.remove(file_id).unwrap_or_default();
        let mut out = BytesMut::new();
        for data in parts.values() {
            out.extend_from_slice(data);
        }
        state.merged.insert(file_id.to_string(), out.freeze());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(file_id: &str, index: u64, data: &'static [u8]) -> Chunk {
        let range = ChunkRange {
            start: 0,
            end: data.len() as u64,
        };
        Chunk::new(
            file_id,
            index,
            range,
            Bytes::from_static(data),
            Sha256Digest.digest(data),
        )
    }

    #[tokio::test]
    async fn test_accepts_and_merges_in_index_order() {
        let sim = SimulatedTransport::new();
        sim.send_chunk("f", &chunk("f", 1, b"world")).await.unwrap();
        sim.send_chunk("f", &chunk("f", 0, b"hello ")).await.unwrap();
        sim.merge("f").await.unwrap();

        assert_eq!(sim.merged("f").unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(sim.merge_calls(), vec!["f".to_string()]);
        assert_eq!(sim.attempts_for("f").len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_digest_mismatch() {
        let sim = SimulatedTransport::new();
        let mut c = chunk("f", 0, b"data");
        c.digest = "00".repeat(32);

        let err = sim.send_chunk("f", &c).await.unwrap_err();
        assert_eq!(err.server_message(), "checksum mismatch");
        assert!(!sim.attempts()[0].accepted);
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed() {
        let sim = SimulatedTransport::new();
        sim.fail_chunk("f", 0, 2, FailureKind::Reject(Some("busy".into())));
        let c = chunk("f", 0, b"x");

        assert!(sim.send_chunk("f", &c).await.is_err());
        assert!(sim.send_chunk("f", &c).await.is_err());
        assert!(sim.send_chunk("f", &c).await.is_ok());
    }

    #[tokio::test]
    async fn test_merge_failure_and_empty_merge() {
        let sim = SimulatedTransport::new();
        sim.fail_merge("bad", Some("disk full"));
        let err = sim.merge("bad").await.unwrap_err();
        assert_eq!(err.server_message(), "disk full");

        sim.merge("empty").await.unwrap();
        assert_eq!(sim.merged("empty").unwrap().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bandwidth_delay() {
        let sim = SimulatedTransport::new().with_bandwidth(1000.0);
        let start = tokio::time::Instant::now();
        sim.send_chunk("f", &chunk("f", 0, b"0123456789")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
