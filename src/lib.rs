//! # chunkup
//!
//! 대용량 파일 청크 업로드 엔진
//!
//! ## 핵심 특징
//! - **순차 청크**: 파일 하나의 청크는 앞 청크가 수락된 뒤에만 전송
//! - **적응형 청크 크기**: 프로브와 청크별 처리율로 10 MiB / 50 MiB 티어 선택
//! - **청크 다이제스트**: 청크마다 SHA-256을 함께 보내 서버측 무결성 검증
//! - **제한된 재시도**: 청크당 최대 3회 재시도, 타임아웃도 실패로 계산
//! - **서버측 병합**: 마지막 청크 수락 후 병합 요청
//! - **다중 파일**: 파일끼리는 동시에, 실패는 파일 단위로 격리
//! - **관찰 가능한 상태**: 표시 계층은 스냅샷 조회/구독만

pub mod chunk;
pub mod config;
pub mod digest;
pub mod error;
pub mod merge;
pub mod sender;
pub mod simulate;
pub mod source;
pub mod stats;
pub mod store;
pub mod task;
pub mod throughput;
pub mod transport;
pub mod uploader;

pub use chunk::{chunk_name, split, Chunk, ChunkIndex, ChunkRange};
pub use config::Config;
pub use digest::{ContentDigest, Sha256Digest};
pub use error::{Error, Result};
pub use simulate::SimulatedTransport;
pub use source::{ChunkSource, FileSource, MemorySource};
pub use stats::TransferStats;
pub use store::{TaskEvent, TaskStore};
pub use task::{MessageKind, TaskMessage, TaskSnapshot, TaskStatus, UploadTask};
pub use throughput::ThroughputEstimator;
pub use transport::{Endpoints, HttpTransport, Transport};
pub use uploader::{BatchReport, TaskReport, UploadFile, Uploader};

/// 1 MiB
pub const MIB: u64 = 1024 * 1024;

/// 느린 연결 / 기본 청크 크기 (10 MiB)
pub const LOWER_TIER_CHUNK_SIZE: u64 = 10 * MIB;

/// 빠른 연결 청크 크기 (50 MiB)
pub const UPPER_TIER_CHUNK_SIZE: u64 = 50 * MIB;
