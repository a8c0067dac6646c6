//! 수신자 (서버측)
//!
//! - 연결마다 태스크 하나
//! - 핸드셰이크로 재개 오프셋 협상
//! - 오프셋부터 덧붙여 쓰기 (절대 truncate 하지 않음)
//! - 완료 시 디스크의 파일 전체를 다시 해시

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::hasher::hash_file;
use crate::message::{
    read_request, read_trailer, resolve_offset, with_deadline, write_offset, HandshakeState,
    Role, TransferRequest,
};
use crate::offset::OffsetStore;
use crate::registry::{SessionRegistry, SessionStatus};
use crate::stats::{SpeedEstimator, TransferCounters};
use crate::status::StatusReporter;
use crate::{Config, Error, Result};

/// 읽기 타임아웃이 없을 때 트레일러를 기다리는 최대 시간
const TRAILER_GRACE: Duration = Duration::from_secs(5);

/// 서버 공유 상태
///
/// 오프셋 저장소, 레지스트리, 카운터는 각자 독립된 락을 가진다.
pub struct ServerState {
    pub config: Config,
    pub offsets: Arc<OffsetStore>,
    pub registry: Arc<SessionRegistry>,
    pub counters: Arc<TransferCounters>,
    gate: Option<Arc<Semaphore>>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let gate = config
            .max_sessions
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        Self {
            config,
            offsets: Arc::new(OffsetStore::new()),
            registry: Arc::new(SessionRegistry::new()),
            counters: Arc::new(TransferCounters::new()),
            gate,
        }
    }

    /// 상태 리포터 생성
    pub fn reporter(&self) -> StatusReporter {
        StatusReporter::new(self.registry.clone(), self.counters.clone())
    }

    /// 동시 세션 상한이 설정되어 있으면 자리가 날 때까지 대기
    async fn admit(&self) -> Option<OwnedSemaphorePermit> {
        match &self.gate {
            Some(gate) => gate.clone().acquire_owned().await.ok(),
            None => None,
        }
    }
}

/// 한 연결의 최종 결과
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub session_id: u64,
    pub file_name: String,
    pub status: SessionStatus,
    pub received_bytes: u64,
    pub computed_hash: Option<String>,
}

/// TCP 수신 서버
pub struct Receiver {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Receiver {
    /// 저장 루트 생성 후 리스너 바인딩
    pub async fn bind(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage_dir)
            .await
            .map_err(|source| Error::StorageFault {
                path: config.storage_dir.clone(),
                source,
            })?;

        let listener = TcpListener::bind(config.listen_addr).await?;
        info!(
            "RFT Receiver listening on {}, storage: {:?}",
            listener.local_addr()?,
            config.storage_dir
        );

        Ok(Self {
            listener,
            state: Arc::new(ServerState::new(config)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// 연결 수락 루프 (종료하지 않음)
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// `shutdown`이 완료될 때까지 연결 수락
    ///
    /// 세션 상한에 걸려 자리를 기다리는 중에도 `shutdown`에 반응한다.
    /// 이미 시작된 세션 태스크는 계속 진행된다.
    pub async fn run_until<F: Future>(self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            // 자리가 난 뒤에만 accept. 그 사이 연결은 listen backlog에서 대기한다.
            let permit = tokio::select! {
                _ = &mut shutdown => {
                    info!("RFT Receiver shutting down");
                    return Ok(());
                }
                permit = self.state.admit() => permit,
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("RFT Receiver shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("연결 수락 에러: {}", e);
                    continue;
                }
            };

            let state = self.state.clone();

            tokio::spawn(async move {
                let _permit = permit;
                info!(%peer, "client connected");
                match serve_connection(stream, peer, &state).await {
                    Ok(outcome) => info!(
                        %peer,
                        session = outcome.session_id,
                        file = %outcome.file_name,
                        status = %outcome.status,
                        received = outcome.received_bytes,
                        "connection closed"
                    ),
                    Err(e) => warn!(%peer, "connection aborted: {}", e),
                }
            });
        }
    }
}

/// 한 연결 처리: 핸드셰이크 → 수신 루프 → 마무리
///
/// 세션 등록 이전의 실패(잘못된 핸드셰이크, 저장소 에러)만 `Err`로 돌아온다.
/// 등록 이후에는 항상 종료 상태와 함께 `Ok`.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: &ServerState,
) -> Result<TransferOutcome> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();
    let read_timeout = state.config.read_timeout;

    let mut phase = HandshakeState::AwaitLength;
    let request = with_deadline(read_timeout, read_request(&mut reader)).await?;
    phase = advance(phase.advance(Role::Server), peer);

    let name = request.sanitized_name()?;
    let offset = resolve_offset(state.offsets.get(&name), &request);
    info!(
        %peer,
        file = %name,
        size = request.file_size,
        resume = request.resume,
        offset,
        "handshake received"
    );

    let path = state.config.storage_path(&name);
    let file = open_destination(&path, offset).await?;

    write_offset(&mut writer, offset).await?;
    phase = advance(phase.advance(Role::Server), peer);

    let session_id = state
        .registry
        .register(peer, &name, request.file_size, offset);
    state.counters.connection_opened();

    let session = TransferSession {
        id: session_id,
        peer,
        name,
        path,
        request,
        received: offset,
        phase,
    };
    let outcome = session.run(&mut reader, file, state).await;

    state.counters.connection_closed();
    Ok(outcome)
}

fn advance(next: HandshakeState, peer: SocketAddr) -> HandshakeState {
    debug!(%peer, state = ?next, "handshake state");
    next
}

/// 대상 파일을 열고(없으면 생성) 오프셋으로 이동
async fn open_destination(path: &Path, offset: u64) -> Result<File> {
    let storage_fault = |source: std::io::Error| Error::StorageFault {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(storage_fault)?;
    file.seek(std::io::SeekFrom::Start(offset))
        .await
        .map_err(storage_fault)?;
    Ok(file)
}

/// 등록된 세션 하나 (해당 세션 태스크만 변경)
struct TransferSession {
    id: u64,
    peer: SocketAddr,
    name: String,
    path: PathBuf,
    request: TransferRequest,
    received: u64,
    phase: HandshakeState,
}

impl TransferSession {
    async fn run<R>(mut self, reader: &mut R, file: File, state: &ServerState) -> TransferOutcome
    where
        R: AsyncRead + Unpin,
    {
        info!(
            "Client {}: Started transferring file {} ({} bytes, from {})",
            self.peer, self.name, self.request.file_size, self.received
        );

        let mut status = self.receive(reader, file, state).await;
        let mut computed_hash = None;

        if status == SessionStatus::Completed {
            self.phase = advance(self.phase.advance(Role::Server), self.peer);
            self.check_trailer(reader, state.config.read_timeout).await;
            self.phase = advance(self.phase.advance(Role::Server), self.peer);

            // 이전 세션에서 받은 부분까지 포함해 처음부터 다시 해시
            match hash_file(&self.path).await {
                Ok(actual) => {
                    if !actual.eq_ignore_ascii_case(&self.request.source_hash) {
                        let mismatch = Error::HashMismatch {
                            expected: self.request.source_hash.clone(),
                            actual: actual.clone(),
                        };
                        warn!("Client {}: {} ({} kept)", self.peer, mismatch, self.name);
                        status = SessionStatus::HashError;
                    } else {
                        info!(
                            "Client {}: File {} received successfully ({} bytes). Hash: {}",
                            self.peer, self.name, self.received, actual
                        );
                    }
                    computed_hash = Some(actual);
                }
                Err(e) => {
                    error!("Client {}: 해시 계산 실패: {}", self.peer, e);
                    status = SessionStatus::HashError;
                }
            }
        }

        state
            .registry
            .finish(self.id, status, computed_hash.clone());

        TransferOutcome {
            session_id: self.id,
            file_name: self.name,
            status,
            received_bytes: self.received,
            computed_hash,
        }
    }

    /// 수신 루프. 반환값은 `Completed`(모든 바이트 수신), `Interrupted`, `WriteError` 중 하나.
    async fn receive<R>(&mut self, reader: &mut R, mut file: File, state: &ServerState) -> SessionStatus
    where
        R: AsyncRead + Unpin,
    {
        let file_size = self.request.file_size;
        let remaining = file_size.saturating_sub(self.received);
        let buf_len = (state.config.chunk_size as u64).min(remaining).max(1) as usize;
        let mut buf = vec![0u8; buf_len];
        let mut speed = SpeedEstimator::new();

        let status = loop {
            if self.received >= file_size {
                break SessionStatus::Completed;
            }

            // 트레일러가 파일에 섞이지 않도록 남은 크기까지만 읽는다
            let to_read = (buf.len() as u64).min(file_size - self.received) as usize;
            let read = with_deadline(state.config.read_timeout, async {
                reader.read(&mut buf[..to_read]).await.map_err(Error::ReadFault)
            })
            .await;

            let n = match read {
                Ok(0) => {
                    info!(
                        "Client {}: stream ended at {}/{} bytes of {}",
                        self.peer, self.received, file_size, self.name
                    );
                    break SessionStatus::Interrupted;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!("Client {}: 청크 수신 실패: {}", self.peer, e);
                    break SessionStatus::Interrupted;
                }
            };

            let written = async {
                file.write_all(&buf[..n]).await?;
                file.flush().await
            };
            if let Err(e) = written.await {
                error!("Client {}: 파일 쓰기 실패: {}", self.peer, Error::WriteFault(e));
                break SessionStatus::WriteError;
            }

            self.received += n as u64;
            state.counters.add_bytes(n as u64);
            state.offsets.set(&self.name, self.received);

            let current = speed.record(n);
            let received = self.received;
            state.registry.update(self.id, |info| {
                info.received_bytes = received;
                info.speed = current;
            });
        };

        if let Err(e) = file.flush().await {
            warn!("Client {}: flush 실패: {}", self.peer, e);
        }
        status
    }

    /// 트레일러 확인. 핸드셰이크에서 선언된 해시가 기준이므로 불일치는 경고만.
    async fn check_trailer<R>(&self, reader: &mut R, read_timeout: Option<Duration>)
    where
        R: AsyncRead + Unpin,
    {
        let deadline = Some(read_timeout.unwrap_or(TRAILER_GRACE));
        match with_deadline(deadline, read_trailer(reader)).await {
            Ok(Some(trailer)) if !trailer.eq_ignore_ascii_case(&self.request.source_hash) => {
                warn!(
                    "Client {}: trailer {} differs from declared hash {}",
                    self.peer, trailer, self.request.source_hash
                );
            }
            Ok(Some(_)) => {}
            Ok(None) => debug!(peer = %self.peer, "no trailer received"),
            Err(e) => debug!(peer = %self.peer, "trailer read failed: {}", e),
        }
    }
}
