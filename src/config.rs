//! 업로드 엔진 설정

use std::time::Duration;

use crate::{Error, Result, LOWER_TIER_CHUNK_SIZE, UPPER_TIER_CHUNK_SIZE};

/// 업로드 엔진 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 느린 연결용 청크 크기 (바이트)
    pub lower_tier: u64,

    /// 빠른 연결용 청크 크기 (바이트)
    pub upper_tier: u64,

    /// 프로브를 하지 않을 때 쓰는 고정 청크 크기
    pub default_chunk_size: u64,

    /// 배치 시작 시 네트워크 프로브 수행 여부
    /// false면 `default_chunk_size`를 그대로 사용
    pub probe_on_start: bool,

    /// 프로브 왕복 시간 임계값 (밀리초)
    /// 이보다 짧으면 좋은 연결로 판단
    pub probe_threshold_ms: u64,

    /// 프로브 페이로드 크기 (바이트)
    pub probe_payload_size: usize,

    /// 청크 수락 후마다 처리율 기반으로 청크 크기 재조정 여부
    pub adapt_after_chunk: bool,

    /// 처리율 임계값 (bytes/sec)
    /// 초과하면 다음 청크는 upper tier
    pub throughput_threshold: f64,

    /// 청크당 추가 재시도 횟수 (총 시도 = max_retries + 1)
    pub max_retries: u32,

    /// 재시도 간 기본 대기 (밀리초), 0이면 즉시 재시도
    pub retry_backoff_ms: u64,

    /// 네트워크 호출당 타임아웃 (밀리초)
    pub request_timeout_ms: u64,

    /// 성공 표시 후 태스크 상태 초기화까지 대기 (밀리초)
    /// None이면 초기화하지 않음
    pub reset_delay_ms: Option<u64>,

    /// 태스크별 처리율 샘플 윈도우 크기
    pub stats_window_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::adaptive()
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 프로브 + 청크마다 재조정 (기본)
    pub fn adaptive() -> Self {
        Self {
            lower_tier: LOWER_TIER_CHUNK_SIZE,
            upper_tier: UPPER_TIER_CHUNK_SIZE,
            default_chunk_size: LOWER_TIER_CHUNK_SIZE,
            probe_on_start: true,
            probe_threshold_ms: 1000,         // 1초
            probe_payload_size: 4,
            adapt_after_chunk: true,
            throughput_threshold: 10.0 * 1024.0 * 1024.0, // 10 MiB/s
            max_retries: 3,
            retry_backoff_ms: 250,
            request_timeout_ms: 60_000,       // 60초
            reset_delay_ms: Some(1000),
            stats_window_size: 32,
        }
    }

    /// 배치 시작 시 한 번만 프로브, 이후 크기 고정
    pub fn probe_once() -> Self {
        Self {
            adapt_after_chunk: false,
            ..Self::adaptive()
        }
    }

    /// 프로브도 재조정도 없이 10 MiB 고정
    pub fn static_default() -> Self {
        Self {
            probe_on_start: false,
            adapt_after_chunk: false,
            ..Self::adaptive()
        }
    }

    /// 고정 청크 크기 지정
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.default_chunk_size = chunk_size;
        self
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 프로브 임계값
    pub fn probe_threshold(&self) -> Duration {
        Duration::from_millis(self.probe_threshold_ms)
    }

    /// 성공 후 초기화 대기
    pub fn reset_delay(&self) -> Option<Duration> {
        self.reset_delay_ms.map(Duration::from_millis)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.lower_tier == 0 || self.upper_tier == 0 || self.default_chunk_size == 0 {
            return Err(Error::InvalidConfig("청크 크기는 0보다 커야 함".into()));
        }
        if self.lower_tier > self.upper_tier {
            return Err(Error::InvalidConfig(format!(
                "lower_tier({}) > upper_tier({})",
                self.lower_tier, self.upper_tier
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms는 0일 수 없음".into()));
        }
        if self.stats_window_size == 0 {
            return Err(Error::InvalidConfig("stats_window_size는 0일 수 없음".into()));
        }
        Ok(())
    }
}
