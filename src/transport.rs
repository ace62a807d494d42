//! 서버 엔드포인트 전송 계층
//!
//! 코어는 전송을 "바이트를 보내고 성공/실패를 받는" 기능으로만 다룬다.
//! - accept-chunk: multipart POST (`file`, `fileName`, `chunkIndex`, `chunkHash`)
//! - merge: POST `?fileName=`
//! - probe: 작은 고정 페이로드 POST (연결 품질 측정용)

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::chunk::Chunk;
use crate::{Error, Result};

/// 서버 엔드포인트 기능
#[async_trait]
pub trait Transport: Send + Sync {
    /// 프로브 페이로드 전송 (왕복 시간 측정용)
    async fn probe(&self, payload: Bytes) -> Result<()>;

    /// 청크 하나 전송
    async fn send_chunk(&self, file_id: &str, chunk: &Chunk) -> Result<()>;

    /// 서버측 병합 요청
    async fn merge(&self, file_id: &str) -> Result<()>;
}

/// HTTP 엔드포인트 주소
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub chunk_url: Url,
    pub merge_url: Url,
    pub probe_url: Option<Url>,
}

impl Endpoints {
    pub fn new(chunk_url: &str, merge_url: &str) -> Result<Self> {
        Ok(Self {
            chunk_url: parse_url(chunk_url)?,
            merge_url: parse_url(merge_url)?,
            probe_url: None,
        })
    }

    pub fn with_probe(mut self, probe_url: &str) -> Result<Self> {
        self.probe_url = Some(parse_url(probe_url)?);
        Ok(self)
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::InvalidConfig(format!("잘못된 URL {}: {}", raw, e)))
}

/// 서버 에러 응답 본문 `{"error": {"message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// 에러 본문에서 `error.message` 추출
pub fn parse_error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.is_empty())
}

/// reqwest 기반 HTTP 전송
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoints: Endpoints,
}

impl HttpTransport {
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(Client::new(), endpoints)
    }

    pub fn with_client(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// 응답 상태 확인, 실패면 본문에서 메시지 추출
    async fn check(resp: reqwest::Response) -> Result<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.bytes().await.unwrap_or_default();
        Err(Error::Transport {
            status: Some(status.as_u16()),
            message: parse_error_message(&body),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, payload: Bytes) -> Result<()> {
        let url = self
            .endpoints
            .probe_url
            .clone()
            .ok_or_else(|| Error::InvalidConfig("프로브 URL 없음".into()))?;
        let resp = self.client.post(url).body(payload).send().await?;
        Self::check(resp).await
    }

    async fn send_chunk(&self, file_id: &str, chunk: &Chunk) -> Result<()> {
        let part = Part::bytes(chunk.data.to_vec()).file_name(chunk.name.clone());
        let form = Form::new()
            .part("file", part)
            .text("fileName", file_id.to_string())
            .text("chunkIndex", chunk.index.to_string())
            .text("chunkHash", chunk.digest.clone());

        debug!("POST {} ({} bytes)", chunk.name, chunk.size());
        let resp = self
            .client
            .post(self.endpoints.chunk_url.clone())
            .multipart(form)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn merge(&self, file_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.endpoints.merge_url.clone())
            .query(&[("fileName", file_id)])
            .send()
            .await?;
        Self::check(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkRange;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// 요청 하나를 받아 원문을 돌려주는 로컬 HTTP 서버
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];
            while !request_complete(&buf) {
                let n = sock.read(&mut tmp).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&tmp[..n]);
            }
            let resp = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{}", addr), handle)
    }

    /// 헤더 + 본문을 다 받았는지
    fn request_complete(buf: &[u8]) -> bool {
        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let body = &buf[head_end + 4..];
        if let Some(len) = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            return body.len() >= len;
        }
        if head.contains("transfer-encoding: chunked") {
            return body.ends_with(b"0\r\n\r\n");
        }
        true
    }

    fn chunk(file_id: &str) -> Chunk {
        Chunk::new(
            file_id,
            3,
            ChunkRange { start: 30, end: 35 },
            Bytes::from_static(b"hello"),
            "abc123".to_string(),
        )
    }

    #[tokio::test]
    async fn test_send_chunk_multipart_fields() {
        let (base, server) = serve_once("200 OK", "{}").await;
        let t = HttpTransport::new(
            Endpoints::new(&format!("{}/upload", base), &format!("{}/merge", base)).unwrap(),
        );

        t.send_chunk("movie.mp4", &chunk("movie.mp4")).await.unwrap();

        let req = server.await.unwrap();
        assert!(req.starts_with("POST /upload HTTP/1.1"));
        assert!(req.contains("name=\"file\"; filename=\"movie.mp4.part3\""));
        assert!(req.contains("name=\"fileName\"\r\n\r\nmovie.mp4\r\n"));
        assert!(req.contains("name=\"chunkIndex\"\r\n\r\n3\r\n"));
        assert!(req.contains("name=\"chunkHash\"\r\n\r\nabc123\r\n"));
        assert!(req.contains("hello"));
    }

    #[tokio::test]
    async fn test_merge_sends_file_name_query() {
        let (base, server) = serve_once("200 OK", "{}").await;
        let t = HttpTransport::new(
            Endpoints::new(&format!("{}/upload", base), &format!("{}/merge", base)).unwrap(),
        );

        t.merge("a b.bin").await.unwrap();

        let req = server.await.unwrap();
        assert!(req.starts_with("POST /merge?fileName=a+b.bin HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_error_status_carries_server_message() {
        let (base, server) = serve_once(
            "507 Insufficient Storage",
            r#"{"error":{"message":"disk full"}}"#,
        )
        .await;
        let t = HttpTransport::new(
            Endpoints::new(&format!("{}/upload", base), &format!("{}/merge", base)).unwrap(),
        );

        let err = t.send_chunk("movie.mp4", &chunk("movie.mp4")).await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, Error::Transport { status: Some(507), .. }));
        assert!(err.is_retryable());
        assert_eq!(err.server_message(), "disk full");
    }

    #[tokio::test]
    async fn test_error_status_without_body_uses_default_message() {
        let (base, server) = serve_once("500 Internal Server Error", "").await;
        let t = HttpTransport::new(
            Endpoints::new(&format!("{}/upload", base), &format!("{}/merge", base)).unwrap(),
        );

        let err = t.merge("x").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, Error::Transport { status: Some(500), message: None }));
        assert_eq!(err.server_message(), "Unknown error");
    }

    #[test]
    fn test_parse_error_message() {
        assert_eq!(
            parse_error_message(br#"{"error":{"message":"checksum mismatch"}}"#),
            Some("checksum mismatch".to_string())
        );
        assert_eq!(parse_error_message(br#"{"error":{}}"#), None);
        assert_eq!(parse_error_message(br#"{"error":{"message":""}}"#), None);
        assert_eq!(parse_error_message(b"<html>502</html>"), None);
        assert_eq!(parse_error_message(b""), None);
    }

    #[test]
    fn test_endpoints() {
        let ep = Endpoints::new("http://localhost:3000/upload", "http://localhost:3000/merge")
            .unwrap()
            .with_probe("http://localhost:3000/probe")
            .unwrap();
        assert_eq!(ep.chunk_url.path(), "/upload");
        assert!(ep.probe_url.is_some());

        assert!(matches!(
            Endpoints::new("not a url", "http://x/merge"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_without_url_fails() {
        let t = HttpTransport::new(Endpoints::new("http://127.0.0.1:9/u", "http://127.0.0.1:9/m").unwrap());
        assert!(t.probe(Bytes::from_static(b"test")).await.is_err());
    }
}
