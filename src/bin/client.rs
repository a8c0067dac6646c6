//! RFT 클라이언트 (송신자) - Resumable File Transfer
//!
//! 파일 하나를 서버로 업로드한다. 연결이 끊기면 고정 간격으로 재시도하고,
//! 서버가 알려준 오프셋부터 이어서 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin rft-client -- (--file <FILE> | --path <DIR>) [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin rft-client -- -f data.bin
//!   cargo run --release --bin rft-client -- --ip 10.0.0.5:59999 -f data.bin --retries 10
//!
//!   # 디렉터리는 zip으로 묶어서 전송
//!   cargo run --release --bin rft-client -- --path ./photos --output photos-2024.zip

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use rft::logging::init_logging;
use rft::{compress_directory, Config, Sender, DEFAULT_MAX_RETRIES};

#[derive(Parser, Debug)]
#[command(name = "rft-client", about = "Resumable file transfer sender", version)]
struct Args {
    /// 서버 주소 (host:port)
    #[arg(long, default_value = "localhost:59999")]
    ip: String,

    /// 보낼 파일 (`--path`보다 우선)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// zip으로 묶어 보낼 디렉터리
    #[arg(long)]
    path: Option<PathBuf>,

    /// 압축 결과 파일 이름 (기본: <디렉터리 이름>.zip)
    #[arg(long)]
    output: Option<PathBuf>,

    /// 송신 청크 크기 (바이트)
    #[arg(long, default_value_t = rft::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// 최대 시도 횟수
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// 재시도 간격 (밀리초)
    #[arg(long, default_value_t = 2000)]
    retry_interval_ms: u64,

    /// 연결/오프셋 응답 타임아웃 (초, 0이면 없음)
    #[arg(long, default_value_t = 0)]
    timeout_secs: u64,

    /// 로그 파일 (append, 없으면 stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// 로그 상세도 (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            server_addr: self.ip,
            chunk_size: self.chunk_size.max(1),
            max_retries: self.retries,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            read_timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose.saturating_add(2), args.log_file.as_deref())?;

    let target = args
        .file
        .clone()
        .or_else(|| args.path.clone())
        .ok_or("전송할 파일이 지정되지 않았습니다 (--file 또는 --path)")?;
    let file = prepare_source(target, args.output.clone()).await?;

    let sender = Sender::new(args.into_config());
    println!("전송 시작: {} → {}", file.display(), sender.config().server_addr);

    match sender.send_with_retry(&file).await {
        Ok(report) => {
            println!("\n=== 전송 완료 ===");
            println!("  파일 크기: {} bytes", report.file_size);
            println!("  재개 오프셋: {}", report.offset);
            println!("  이번 전송: {} bytes", report.bytes_sent);
            println!("  SHA-256: {}", report.hash);
            Ok(())
        }
        Err(e) => {
            eprintln!("전송 실패: {}", e);
            Err(e.into())
        }
    }
}

/// 디렉터리면 먼저 zip으로 묶고, 그 결과 파일을 전송 대상으로 쓴다
async fn prepare_source(
    target: PathBuf,
    output: Option<PathBuf>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if !target.is_dir() {
        return Ok(target);
    }

    let archived =
        tokio::task::spawn_blocking(move || compress_directory(&target, output.as_deref()))
            .await??;
    println!("디렉터리 압축 완료: {}", archived.display());
    Ok(archived)
}
