//! 업로드 태스크 상태
//!
//! 파일 하나당 하나. 소유한 업로더만 변경하고, 표시 계층은 스냅샷만 읽는다.

use serde::Serialize;

use crate::chunk::{Chunk, ChunkIndex};

/// 태스크 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Idle,
    Uploading,
    Merging,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// 메시지 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
}

/// 사용자 표시용 메시지 `{text, type}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskMessage {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl TaskMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: MessageKind::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: MessageKind::Error,
        }
    }
}

/// 표시 계층이 읽는 읽기 전용 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub file_id: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub next_chunk_index: ChunkIndex,
    pub bytes_sent: u64,
    pub uploaded_chunk_names: Vec<String>,
    pub progress_percent: u8,
    pub status: TaskStatus,
    pub message: Option<TaskMessage>,
}

/// 업로드 태스크
#[derive(Debug, Clone)]
pub struct UploadTask {
    file_id: String,
    total_size: u64,
    chunk_size: u64,
    next_chunk_index: ChunkIndex,
    bytes_sent: u64,
    uploaded_chunk_names: Vec<String>,
    progress_percent: u8,
    status: TaskStatus,
    message: Option<TaskMessage>,
}

impl UploadTask {
    pub fn new(file_id: impl Into<String>, total_size: u64, chunk_size: u64) -> Self {
        Self {
            file_id: file_id.into(),
            total_size,
            chunk_size,
            next_chunk_index: 0,
            bytes_sent: 0,
            uploaded_chunk_names: Vec::new(),
            progress_percent: 0,
            status: TaskStatus::Idle,
            message: None,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn next_chunk_index(&self) -> ChunkIndex {
        self.next_chunk_index
    }

    /// 지금까지 수락된 바이트 (다음 청크 시작 오프셋)
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn uploaded_chunk_names(&self) -> &[String] {
        &self.uploaded_chunk_names
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn message(&self) -> Option<&TaskMessage> {
        self.message.as_ref()
    }

    /// 아직 보낼 바이트가 남았는지
    pub fn has_remaining(&self) -> bool {
        self.bytes_sent < self.total_size
    }

    /// 다음 청크부터 적용할 크기 (실패한 시도로는 바꾸지 않는다)
    pub fn set_chunk_size(&mut self, chunk_size: u64) {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
    }

    /// 첫 전송 시작
    pub fn begin_upload(&mut self) {
        if self.status == TaskStatus::Idle {
            self.status = TaskStatus::Uploading;
        }
    }

    /// 청크 수락 반영
    ///
    /// 인덱스 전진, 이름 추가, 진행률 재계산 (감소하지 않음).
    pub fn record_accepted(&mut self, chunk: &Chunk) {
        debug_assert_eq!(chunk.index, self.next_chunk_index);
        self.next_chunk_index += 1;
        self.bytes_sent = chunk.range.end.min(self.total_size);
        self.uploaded_chunk_names.push(chunk.name.clone());
        self.progress_percent = self.progress_percent.max(self.compute_progress());
    }

    /// `floor(bytes_sent / total_size * 100)`, 빈 파일은 100
    fn compute_progress(&self) -> u8 {
        if self.total_size == 0 {
            return 100;
        }
        let pct = (self.bytes_sent as u128 * 100) / self.total_size as u128;
        pct.min(100) as u8
    }

    /// 모든 바이트 전송 완료, 병합 대기
    pub fn begin_merge(&mut self) {
        self.progress_percent = self.progress_percent.max(self.compute_progress());
        self.status = TaskStatus::Merging;
    }

    pub fn succeed(&mut self, text: impl Into<String>) {
        self.status = TaskStatus::Succeeded;
        self.message = Some(TaskMessage::success(text));
    }

    pub fn fail(&mut self, text: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.message = Some(TaskMessage::error(text));
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            file_id: self.file_id.clone(),
            total_size: self.total_size,
            chunk_size: self.chunk_size,
            next_chunk_index: self.next_chunk_index,
            bytes_sent: self.bytes_sent,
            uploaded_chunk_names: self.uploaded_chunk_names.clone(),
            progress_percent: self.progress_percent,
            status: self.status,
            message: self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::range_at;
    use bytes::Bytes;

    fn accept_next(task: &mut UploadTask) {
        let range = range_at(task.bytes_sent(), task.chunk_size(), task.total_size()).unwrap();
        let chunk = Chunk::new(
            task.file_id(),
            task.next_chunk_index(),
            range,
            Bytes::from(vec![0u8; range.len() as usize]),
            String::new(),
        );
        task.record_accepted(&chunk);
    }

    #[test]
    fn test_progress_is_floored_and_monotonic() {
        let mut task = UploadTask::new("f", 3, 1);
        task.begin_upload();
        assert_eq!(task.status(), TaskStatus::Uploading);

        let mut seen = Vec::new();
        while task.has_remaining() {
            accept_next(&mut task);
            seen.push(task.progress_percent());
        }
        assert_eq!(seen, vec![33, 66, 100]);
        assert_eq!(task.uploaded_chunk_names(), &["f.part0", "f.part1", "f.part2"]);
        assert_eq!(task.next_chunk_index(), 3);
    }

    #[test]
    fn test_empty_file_merge_ready() {
        let mut task = UploadTask::new("empty", 0, 10);
        assert!(!task.has_remaining());
        task.begin_merge();
        assert_eq!(task.progress_percent(), 100);
        assert_eq!(task.status(), TaskStatus::Merging);
    }

    #[test]
    fn test_snapshot_serializes_message_type() {
        let mut task = UploadTask::new("a", 1, 1);
        task.fail("Unknown error");
        let json = serde_json::to_value(task.snapshot()).unwrap();
        assert_eq!(json["status"], "Failed");
        assert_eq!(json["message"]["type"], "error");
        assert_eq!(json["progressPercent"], 0);
        assert!(task.status().is_terminal());
    }

    #[test]
    fn test_chunk_size_ignores_zero() {
        let mut task = UploadTask::new("a", 1, 5);
        task.set_chunk_size(0);
        assert_eq!(task.chunk_size(), 5);
        task.set_chunk_size(9);
        assert_eq!(task.chunk_size(), 9);
    }
}
