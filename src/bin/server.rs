//! RFT 서버 (수신자) - Resumable File Transfer
//!
//! 단일 파일 TCP 업로드를 받아 저장하고, 끊긴 전송은 마지막 오프셋부터 이어받는다.
//!
//! 사용법:
//!   cargo run --release --bin rft-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트(59999), ./uploads 에 저장
//!   cargo run --release --bin rft-server
//!
//!   # 포트 변경 + 읽기 타임아웃 + 동시 세션 상한
//!   cargo run --release --bin rft-server -- -p 6000 --read-timeout-secs 30 --max-sessions 8

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use rft::logging::init_logging;
use rft::{Config, Receiver, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "rft-server", about = "Resumable file transfer receiver", version)]
struct Args {
    /// 리슨 포트
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 수신 파일 저장 디렉터리
    #[arg(short, long, default_value = "./uploads")]
    storage: PathBuf,

    /// 수신 청크 크기 (바이트)
    #[arg(long, default_value_t = rft::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// 소켓 읽기 타임아웃 (초, 0이면 없음)
    #[arg(long, default_value_t = 0)]
    read_timeout_secs: u64,

    /// 동시 세션 상한
    #[arg(long)]
    max_sessions: Option<usize>,

    /// 상태판 출력 주기 (밀리초)
    #[arg(long, default_value_t = 500)]
    status_interval_ms: u64,

    /// 상태판을 JSON으로 출력
    #[arg(long)]
    json: bool,

    /// 로그 파일 (append)
    #[arg(long, default_value = "server.log")]
    log_file: PathBuf,

    /// 로그를 파일 대신 stderr로
    #[arg(long)]
    stderr: bool,

    /// 로그 상세도 (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            chunk_size: self.chunk_size.max(1),
            storage_dir: self.storage,
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)),
            read_timeout: (self.read_timeout_secs > 0)
                .then(|| Duration::from_secs(self.read_timeout_secs)),
            max_sessions: self.max_sessions,
            status_interval: Duration::from_millis(self.status_interval_ms.max(1)),
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_file = (!args.stderr).then(|| args.log_file.clone());
    init_logging(args.verbose.saturating_add(2), log_file.as_deref())?;

    let json = args.json;
    let config = args.into_config();
    let status_interval = config.status_interval;

    let receiver = Receiver::bind(config).await?;
    let addr = receiver.local_addr()?;
    println!("RFT 서버 시작: {} (Ctrl+C로 종료)", addr);

    let reporter = receiver
        .state()
        .reporter()
        .with_json(json)
        .spawn(status_interval);

    receiver
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    reporter.abort();
    info!("서버 종료");

    Ok(())
}
