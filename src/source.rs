//! 업로드 대상 바이트 소스
//!
//! 같은 범위를 다시 읽으면 항상 같은 바이트를 돌려줘야 한다 (재시도 시 페이로드 동일).

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::chunk::ChunkRange;
use crate::{Error, Result};

/// 청크를 읽어올 수 있는 소스
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// 총 바이트 수
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 범위 읽기
    async fn read_range(&self, range: ChunkRange) -> Result<Bytes>;
}

/// 메모리 소스
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: ChunkRange) -> Result<Bytes> {
        if range.end > self.len() || range.start > range.end {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("범위 초과: {}..{} (len={})", range.start, range.end, self.len()),
            )));
        }
        // Bytes::slice는 복사 없이 참조만 나눈다
        Ok(self.data.slice(range.as_usize()))
    }
}

/// 디스크 파일 소스
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<tokio::fs::File>,
    len: u64,
}

impl FileSource {
    /// 파일 열기 (크기는 여기서 고정)
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, range: ChunkRange) -> Result<Bytes> {
        let mut buf = vec![0u8; range.len() as usize];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(range.start)).await?;
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
