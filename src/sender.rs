//! 송신자 (클라이언트측)
//!
//! - 한 번의 시도 = 연결 → 핸드셰이크 → 스트리밍 → 트레일러
//! - 시도 내부에서는 재시도하지 않음
//! - 재시도는 고정 간격 컨트롤러가 전체 프로토콜을 다시 수행

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::hasher::hash_file;
use crate::message::{
    read_offset_ack, with_deadline, write_request, write_trailer, HandshakeState, Role,
    TransferRequest,
};
use crate::{Config, Error, Result, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL, FIELD_SEPARATOR};

/// 재시도 정책 (고정 간격, 지터 없음)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,

    /// 시도 사이 대기 시간
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// `op`를 최대 `max_attempts`번 실행
///
/// 어떤 에러든 시도 하나를 소모하고, 실패 사이에만 `interval`만큼 대기한다.
/// 모두 실패하면 개별 원인 대신 시도 횟수만 담은 `RetriesExhausted`를 반환한다.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                if attempt < attempts {
                    info!("Retrying in {:?}...", policy.interval);
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }

    Err(Error::RetriesExhausted { attempts })
}

/// 한 번의 시도 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    /// 서버가 알려준 재개 오프셋
    pub offset: u64,

    /// 이번 시도에서 보낸 페이로드 바이트
    pub bytes_sent: u64,

    pub file_size: u64,

    pub hash: String,
}

/// 파일 송신 드라이버
pub struct Sender {
    config: Config,
}

impl Sender {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 재시도 포함 전송
    ///
    /// 이름 검사는 재시도 전에 한 번만 한다. 파일 열기 실패를 포함한 나머지는 모두 시도를 소모한다.
    pub async fn send_with_retry(&self, path: &Path) -> Result<AttemptReport> {
        source_name(path)?;
        let policy = self.config.retry_policy();
        retry(&policy, |attempt| {
            debug!(attempt, path = %path.display(), "starting attempt");
            self.attempt(path)
        })
        .await
    }

    /// 프로토콜 1회 수행
    pub async fn attempt(&self, path: &Path) -> Result<AttemptReport> {
        let file_name = source_name(path)?;

        let mut file = File::open(path)
            .await
            .map_err(|e| Error::InvalidSource(format!("{}: {}", path.display(), e)))?;
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(Error::InvalidSource(format!(
                "{} is a directory",
                path.display()
            )));
        }
        let file_size = metadata.len();
        let hash = hash_file(path).await?;

        let read_timeout = self.config.read_timeout;
        let addr = self.config.server_addr.as_str();
        let mut stream = with_deadline(read_timeout, async {
            TcpStream::connect(addr)
                .await
                .map_err(|source| Error::ConnectFailure {
                    addr: addr.to_string(),
                    source,
                })
        })
        .await?;
        let _ = stream.set_nodelay(true);
        info!("Connected to {}", addr);

        let mut phase = HandshakeState::AwaitLength;
        let request = TransferRequest::new(file_name, file_size, hash.as_str(), true);
        write_request(&mut stream, &request).await?;
        phase = phase.advance(Role::Client).advance(Role::Client);
        debug!(state = ?phase, "request sent");

        let offset = with_deadline(
            read_timeout,
            read_offset_ack(&mut stream, self.config.offset_ack_buf, file_size),
        )
        .await?;
        phase = phase.advance(Role::Client);
        debug!(state = ?phase, offset, "offset acknowledged");

        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(Error::ReadFault)?;

        info!(
            "Transfer started: {} from {} / {} bytes",
            file_name, offset, file_size
        );
        let bytes_sent = stream_chunks(&mut file, &mut stream, self.config.chunk_size).await?;

        write_trailer(&mut stream, &hash).await?;
        if let Err(e) = stream.shutdown().await {
            debug!("shutdown after trailer failed: {}", e);
        }
        phase = phase.advance(Role::Client);
        debug!(state = ?phase, bytes_sent, "attempt finished");

        Ok(AttemptReport {
            offset,
            bytes_sent,
            file_size,
            hash,
        })
    }
}

/// 핸드셰이크에 실을 기본 이름. 구분자가 들어간 이름은 보낼 수 없다.
fn source_name(path: &Path) -> Result<&str> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidSource(format!("no usable file name: {}", path.display())))?;
    if file_name.contains(FIELD_SEPARATOR) {
        return Err(Error::InvalidSource(format!(
            "file name must not contain {:?}: {}",
            FIELD_SEPARATOR, file_name
        )));
    }
    Ok(file_name)
}

/// 파일 끝까지 고정 크기 청크로 전송
async fn stream_chunks<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;

    loop {
        let n = reader.read(&mut buf).await.map_err(Error::ReadFault)?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(Error::WriteFault)?;
        sent += n as u64;
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn refused() -> Error {
        Error::ConnectFailure {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_last_attempt() {
        let policy = RetryPolicy::default();
        let mut calls = 0u32;
        let start = Instant::now();

        let result = retry(&policy, |attempt| {
            calls += 1;
            async move {
                if attempt < 5 {
                    Err(refused())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls, 5);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(8), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_after_ceiling() {
        let policy = RetryPolicy::default();
        let mut calls = 0u32;
        let start = Instant::now();

        let result: Result<()> = retry(&policy, |_| {
            calls += 1;
            async { Err(refused()) }
        })
        .await;

        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 5 })));
        assert_eq!(calls, 5);
        // 대기는 시도 사이에만: 4 × 2s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(8), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_spends_attempts_on_source_errors() {
        let policy = RetryPolicy::default();
        let mut calls = 0u32;

        let result: Result<()> = retry(&policy, |_| {
            calls += 1;
            async { Err(Error::InvalidSource("missing".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 5 })));
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn test_missing_source_exhausts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let sender = Sender::new(Config {
            max_retries: 5,
            retry_interval: Duration::from_millis(10),
            ..Config::local_test(dir.path())
        });

        let result = sender.send_with_retry(&dir.path().join("nope")).await;
        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 5 })));
    }

    #[tokio::test]
    async fn test_stream_chunks_sends_everything() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let mut reader = &data[..];
        let mut out = Vec::new();

        let sent = stream_chunks(&mut reader, &mut out, 4096).await.unwrap();
        assert_eq!(sent, 10_000);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_send_rejects_separator_in_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a|b.txt");
        tokio::fs::write(&path, b"x").await.unwrap();

        // 재시도 루프에 들어가기 전에 거절된다
        let sender = Sender::new(Config::local_test(dir.path()));
        assert!(matches!(
            sender.send_with_retry(&path).await,
            Err(Error::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_attempt_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sender = Sender::new(Config::local_test(dir.path()));
        assert!(matches!(
            sender.attempt(dir.path()).await,
            Err(Error::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_attempt_connect_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        // 바인드 후 바로 닫은 포트
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Config {
            server_addr: addr.to_string(),
            ..Config::local_test(dir.path())
        };
        let result = Sender::new(config).attempt(&path).await;
        assert!(matches!(result, Err(Error::ConnectFailure { .. })));
    }
}
