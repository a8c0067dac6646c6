//! 프로토콜 설정

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::sender::RetryPolicy;
use crate::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_PORT, DEFAULT_RETRY_INTERVAL,
    MAX_OFFSET_ACK_LEN,
};

/// RFT 설정 (서버/클라이언트 공용)
#[derive(Debug, Clone)]
pub struct Config {
    /// 한 번에 읽고 쓰는 최대 바이트 수
    pub chunk_size: usize,

    /// 서버 저장 루트. 수신 파일은 항상 이 디렉터리의 직속 자식이다.
    pub storage_dir: PathBuf,

    /// 서버 바인드 주소
    pub listen_addr: SocketAddr,

    /// 클라이언트가 접속할 서버 주소 (호스트명 허용)
    pub server_addr: String,

    /// 최대 시도 횟수
    pub max_retries: u32,

    /// 재시도 간격 (고정)
    pub retry_interval: Duration,

    /// 소켓 읽기 타임아웃.
    /// None이면 멈춘 클라이언트가 세션을 무기한 점유한다.
    pub read_timeout: Option<Duration>,

    /// 동시 세션 상한 (None = 무제한)
    pub max_sessions: Option<usize>,

    /// 상태 리포트 주기
    pub status_interval: Duration,

    /// 오프셋 응답 읽기 버퍼 크기
    pub offset_ack_buf: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            storage_dir: PathBuf::from("./uploads"),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            server_addr: format!("localhost:{DEFAULT_PORT}"),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            read_timeout: None,
            max_sessions: None,
            status_interval: Duration::from_millis(500),
            offset_ack_buf: MAX_OFFSET_ACK_LEN,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 루프백 테스트용 설정
    ///
    /// 에페메럴 포트에 바인드하고, 작은 청크와 짧은 재시도 간격을 쓴다.
    pub fn local_test(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunk_size: 4096,
            storage_dir: storage_dir.into(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            retry_interval: Duration::from_millis(50),
            read_timeout: Some(Duration::from_secs(5)),
            status_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// 클라이언트 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            interval: self.retry_interval,
        }
    }

    /// 저장 루트 아래의 대상 경로 (이름은 이미 정제되어 있어야 한다)
    pub fn storage_path(&self, sanitized_name: &str) -> PathBuf {
        self.storage_dir.join(sanitized_name)
    }
}
