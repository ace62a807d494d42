//! 에러 타입 정의

use thiserror::Error;

/// 서버가 메시지를 주지 않았을 때 사용자에게 보여줄 기본 문구
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// 업로드 엔진 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP 에러: {0}")]
    Http(#[from] reqwest::Error),

    #[error("전송 실패 (status={status:?}): {}", .message.as_deref().unwrap_or(UNKNOWN_ERROR))]
    Transport {
        status: Option<u16>,
        message: Option<String>,
    },

    #[error("타임아웃: {operation} ({timeout_ms}ms)")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("선택된 파일 없음")]
    NoFileSelected,

    #[error("중복된 파일 ID: {0}")]
    DuplicateFileId(String),

    #[error("병합 실패: {}", .message.as_deref().unwrap_or(UNKNOWN_ERROR))]
    Merge { message: Option<String> },

    #[error("업로드 취소됨")]
    Cancelled,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 전송 실패 생성 헬퍼
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            status: None,
            message: Some(message.into()),
        }
    }

    /// 같은 청크를 다시 보내볼 가치가 있는 에러인지
    ///
    /// 네트워크/서버 실패와 타임아웃은 재시도 예산을 소모한다.
    /// 로컬 IO, 취소, 설정 오류, 병합 실패는 재시도하지 않는다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::Timeout { .. } | Error::Http(_)
        )
    }

    /// 사용자에게 보여줄 메시지 (서버의 `error.message` 또는 기본 문구)
    pub fn server_message(&self) -> String {
        match self {
            Error::Transport {
                message: Some(m), ..
            }
            | Error::Merge { message: Some(m) } => m.clone(),
            Error::Cancelled => "Upload cancelled".to_string(),
            Error::NoFileSelected => "Please select a file first!".to_string(),
            _ => UNKNOWN_ERROR.to_string(),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
