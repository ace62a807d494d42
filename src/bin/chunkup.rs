//! chunkup - 청크 업로드 클라이언트
//!
//! 파일을 청크로 나눠 서버에 올리고 병합을 요청한다.
//!
//! 사용법:
//!   cargo run --release --bin chunkup -- [OPTIONS] <FILE>...
//!
//! 예시:
//!   # HTTP 서버로 업로드
//!   cargo run --release --bin chunkup -- --url http://localhost:3000/upload --merge-url http://localhost:3000/merge big.iso
//!
//!   # 가상 서버로 동작 확인
//!   cargo run --release --bin chunkup -- --simulate --latency 50 a.bin b.bin

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chunkup::{
    Config, Endpoints, HttpTransport, SimulatedTransport, TaskEvent, Transport, UploadFile,
    Uploader,
};

/// 클라이언트 설정
struct ClientConfig {
    chunk_url: Option<String>,
    merge_url: Option<String>,
    probe_url: Option<String>,
    simulate: bool,
    latency_ms: u64,
    bandwidth_mbps: Option<f64>,
    json: bool,
    files: Vec<PathBuf>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_url: None,
            merge_url: None,
            probe_url: None,
            simulate: false,
            latency_ms: 500,
            bandwidth_mbps: None,
            json: false,
            files: Vec::new(),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

fn parse_args_from(args: &[String]) -> ClientConfig {
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" | "-u" => {
                if i + 1 < args.len() {
                    config.chunk_url = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--merge-url" | "-m" => {
                if i + 1 < args.len() {
                    config.merge_url = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--probe-url" => {
                if i + 1 < args.len() {
                    config.probe_url = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--chunk-size" | "-c" => {
                if i + 1 < args.len() {
                    config.config.default_chunk_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            // 모드 플래그는 프로브/재조정만 바꾸고 다른 옵션은 유지
            "--static" => {
                config.config.probe_on_start = false;
                config.config.adapt_after_chunk = false;
            }
            "--probe-once" => {
                config.config.probe_on_start = true;
                config.config.adapt_after_chunk = false;
            }
            "--retries" | "-r" => {
                if i + 1 < args.len() {
                    config.config.max_retries = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout" | "-t" => {
                if i + 1 < args.len() {
                    config.config.request_timeout_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--simulate" | "-s" => {
                config.simulate = true;
            }
            "--latency" => {
                if i + 1 < args.len() {
                    config.latency_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--bandwidth" => {
                if i + 1 < args.len() {
                    config.bandwidth_mbps = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--json" => {
                config.json = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"chunkup - 적응형 청크 업로드 클라이언트

파일을 청크로 나눠 순서대로 업로드하고 서버에 병합을 요청한다.
- 프로브와 청크별 처리율로 10 MiB / 50 MiB 청크 크기 선택
- 청크마다 SHA-256 다이제스트 전송
- 청크당 최대 3회 재시도

사용법:
  cargo run --release --bin chunkup -- [OPTIONS] <FILE>...

옵션:
  -u, --url <URL>          청크 업로드 엔드포인트 (multipart POST)
  -m, --merge-url <URL>    병합 엔드포인트 (POST ?fileName=)
  --probe-url <URL>        프로브 엔드포인트 (없으면 느린 연결로 간주)
  -c, --chunk-size <BYTES> 고정 청크 크기 (기본: 10485760)
  --static                 프로브/재조정 없이 고정 크기 사용
  --probe-once             시작 시 한 번만 프로브, 이후 고정
  -r, --retries <N>        청크당 재시도 횟수 (기본: 3)
  -t, --timeout <MS>       요청 타임아웃 (기본: 60000)
  -s, --simulate           가상 서버 사용 (네트워크 없음)
  --latency <MS>           [가상] 요청 지연 (기본: 500)
  --bandwidth <MB/s>       [가상] 대역폭
  --json                   결과를 JSON으로 출력
  -h, --help               이 도움말 출력

예시:
  # 고정 10 MiB 청크로 업로드
  cargo run --release --bin chunkup -- --static -u http://localhost:3000/upload -m http://localhost:3000/merge movie.mp4

  # 가상 서버, 느린 링크
  cargo run --release --bin chunkup -- --simulate --bandwidth 2 a.bin b.bin
"#
                );
                std::process::exit(0);
            }
            other => {
                config.files.push(PathBuf::from(other));
            }
        }
        i += 1;
    }

    config
}

fn build_transport(client: &ClientConfig) -> Result<Arc<dyn Transport>, Box<dyn std::error::Error>> {
    if client.simulate {
        let mut sim = SimulatedTransport::new()
            .with_latency(Duration::from_millis(client.latency_ms))
            .with_probe_latency(Duration::from_millis(client.latency_ms));
        if let Some(mbps) = client.bandwidth_mbps {
            sim = sim.with_bandwidth(mbps * 1_000_000.0);
        }
        return Ok(Arc::new(sim));
    }

    let chunk_url = client.chunk_url.as_deref().ok_or("--url 필요 (또는 --simulate)")?;
    let merge_url = client.merge_url.as_deref().ok_or("--merge-url 필요")?;
    let mut endpoints = Endpoints::new(chunk_url, merge_url)?;
    if let Some(probe_url) = client.probe_url.as_deref() {
        endpoints = endpoints.with_probe(probe_url)?;
    }
    Ok(Arc::new(HttpTransport::new(endpoints)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = parse_args();
    let transport = build_transport(&client)?;
    let uploader = Uploader::new(client.config.clone(), transport)?;

    let mut files = Vec::with_capacity(client.files.len());
    for path in &client.files {
        files.push(UploadFile::open(path).await?);
    }

    // 진행률 로깅
    let mut events = uploader.store().subscribe();
    let progress_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let TaskEvent::Updated(s) = event {
                info!(
                    "[{}] {:>3}% {:?} (chunk {}, {} bytes/chunk)",
                    s.file_id, s.progress_percent, s.status, s.next_chunk_index, s.chunk_size
                );
            }
        }
    });

    let report = match uploader.upload_batch(files).await {
        Ok(report) => report,
        Err(e) => {
            warn!("{}", e);
            eprintln!("{}", e.server_message());
            std::process::exit(1);
        }
    };
    progress_task.abort();

    if client.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for task in &report.tasks {
            let text = task
                .snapshot
                .message
                .as_ref()
                .map(|m| m.text.as_str())
                .unwrap_or("");
            println!(
                "{}: {:?} {}% - {} ({} chunks, {} retries)",
                task.file_id(),
                task.status(),
                task.snapshot.progress_percent,
                text,
                task.stats.accepted_chunks,
                task.stats.retries
            );
        }
        println!("{}", uploader.get_stats().summary());
    }

    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
