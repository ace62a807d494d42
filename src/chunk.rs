//! 청크 정의와 분할
//!
//! - 파일은 순서대로 번호 붙은 청크로 나뉜다
//! - 청크 크기는 청크 사이에 바뀔 수 있으므로 총 청크 수는 미리 정해지지 않는다

use std::ops::Range;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 청크 인덱스 (0부터 시작)
pub type ChunkIndex = u64;

/// 청크 바이트 범위 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    /// 범위 길이
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// 메모리 슬라이싱용 범위
    pub fn as_usize(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// 인덱스 기반 분할: `start = from_index * chunk_size`
///
/// `start >= total_size`면 None (더 보낼 청크 없음).
pub fn split(total_size: u64, chunk_size: u64, from_index: ChunkIndex) -> Option<ChunkRange> {
    if chunk_size == 0 {
        return None;
    }
    let start = from_index.checked_mul(chunk_size)?;
    range_at(start, chunk_size, total_size)
}

/// 오프셋 기반 분할
///
/// 청크 크기가 고정이면 `split`과 같은 범위를 만든다.
/// 업로더는 청크 크기가 바뀌어도 틈이나 겹침이 없도록 이쪽을 쓴다.
pub fn range_at(offset: u64, chunk_size: u64, total_size: u64) -> Option<ChunkRange> {
    if chunk_size == 0 || offset >= total_size {
        return None;
    }
    let end = offset.saturating_add(chunk_size).min(total_size);
    Some(ChunkRange { start: offset, end })
}

/// 고정 크기로 전체 범위 나열
pub fn split_all(total_size: u64, chunk_size: u64) -> impl Iterator<Item = ChunkRange> {
    (0..).map_while(move |idx| split(total_size, chunk_size, idx))
}

/// 고정 크기일 때의 청크 수 (`ceil(total / chunk)`)
pub fn chunk_count(total_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size)
}

/// 청크 이름: `{file_id}.part{index}`
pub fn chunk_name(file_id: &str, index: ChunkIndex) -> String {
    format!("{}.part{}", file_id, index)
}

/// 전송 단위 청크 (저장되지 않는 파생 값)
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 파일 내 위치 인덱스
    pub index: ChunkIndex,

    /// 바이트 범위
    pub range: ChunkRange,

    /// `{file_id}.part{index}`, 재시도 간 고정
    pub name: String,

    /// 내용 다이제스트 (hex)
    pub digest: String,

    /// 실제 데이터
    pub data: Bytes,
}

impl Chunk {
    pub fn new(file_id: &str, index: ChunkIndex, range: ChunkRange, data: Bytes, digest: String) -> Self {
        Self {
            index,
            range,
            name: chunk_name(file_id, index),
            digest,
            data,
        }
    }

    /// 청크 바이트 수
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
