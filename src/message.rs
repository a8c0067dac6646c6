//! 핸드셰이크 메시지 정의
//!
//! ```text
//! 요청 (클라이언트 → 서버):  [4 bytes BE: L][L bytes: fileName|fileSize|sourceHash|resume]
//! 응답 (서버 → 클라이언트):  십진수 ASCII 오프셋 (길이 프리픽스 없음)
//! 페이로드:                  오프셋부터 파일 끝까지의 원시 바이트 (프레이밍 없음)
//! 트레일러:                  hex 다이제스트 ASCII (구분자 없음)
//! ```
//!
//! 페이로드와 트레일러의 경계는 수신측이 핸드셰이크의 fileSize로만 판단한다.

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::hasher::HASH_HEX_LEN;
use crate::{Error, Result, FIELD_SEPARATOR, MAX_INFO_LEN};

/// 프로토콜상의 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// 핸드셰이크 상태
///
/// `AwaitOffsetAck`는 클라이언트만, `AwaitTrailer`는 서버만 거친다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitLength,
    AwaitInfo,
    AwaitOffsetAck,
    Streaming,
    AwaitTrailer,
    Done,
}

impl HandshakeState {
    /// 역할에 맞는 다음 상태
    pub fn advance(self, role: Role) -> Self {
        match (self, role) {
            (HandshakeState::AwaitLength, _) => HandshakeState::AwaitInfo,
            (HandshakeState::AwaitInfo, Role::Client) => HandshakeState::AwaitOffsetAck,
            (HandshakeState::AwaitInfo, Role::Server) => HandshakeState::Streaming,
            (HandshakeState::AwaitOffsetAck, _) => HandshakeState::Streaming,
            (HandshakeState::Streaming, Role::Client) => HandshakeState::Done,
            (HandshakeState::Streaming, Role::Server) => HandshakeState::AwaitTrailer,
            (HandshakeState::AwaitTrailer, _) => HandshakeState::Done,
            (HandshakeState::Done, _) => HandshakeState::Done,
        }
    }
}

/// 전송 요청 (클라이언트 → 서버)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// 클라이언트가 보낸 이름 그대로. 파일시스템에 쓰기 전 반드시 정제한다.
    pub file_name: String,
    pub file_size: u64,
    pub source_hash: String,
    pub resume: bool,
}

impl TransferRequest {
    pub fn new(
        file_name: impl Into<String>,
        file_size: u64,
        source_hash: impl Into<String>,
        resume: bool,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
            source_hash: source_hash.into(),
            resume,
        }
    }

    /// `fileName|fileSize|sourceHash|resume` 텍스트
    pub fn info_string(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.file_name,
            self.file_size,
            self.source_hash,
            self.resume,
            sep = FIELD_SEPARATOR
        )
    }

    /// 길이 프리픽스 포함 프레임
    pub fn encode(&self) -> Bytes {
        let info = self.info_string();
        let mut buf = BytesMut::with_capacity(4 + info.len());
        buf.put_u32(info.len() as u32);
        buf.put_slice(info.as_bytes());
        buf.freeze()
    }

    /// 정보 텍스트 파싱
    pub fn parse(info: &str) -> Result<Self> {
        let fields: Vec<&str> = info.split(FIELD_SEPARATOR).collect();
        if fields.len() < 4 {
            return Err(Error::MalformedHandshake(format!(
                "expected 4 fields, got {}",
                fields.len()
            )));
        }

        let file_size = fields[1].parse::<u64>().map_err(|e| {
            Error::MalformedHandshake(format!("invalid file size {:?}: {}", fields[1], e))
        })?;

        Ok(Self {
            file_name: fields[0].to_string(),
            file_size,
            source_hash: fields[2].to_string(),
            resume: fields[3] == "true",
        })
    }

    /// 저장소에 쓸 수 있는 이름
    pub fn sanitized_name(&self) -> Result<String> {
        let name = sanitize_file_name(&self.file_name);
        if name.is_empty() || name == "." {
            return Err(Error::MalformedHandshake(format!(
                "unusable file name {:?}",
                self.file_name
            )));
        }
        Ok(name)
    }
}

/// 디렉터리 성분을 버리고 `..`를 제거한 기본 이름
///
/// 결과에는 경로 구분자와 `..`가 남지 않는다.
pub fn sanitize_file_name(file_name: &str) -> String {
    let trimmed = file_name.trim_end_matches(['/', '\\']);
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut name = base.to_string();
    while name.contains("..") {
        name = name.replace("..", "");
    }
    name
}

/// 재개 오프셋 결정
///
/// resume이 아니거나 저장 상태가 없으면 0, 저장값이 fileSize를 넘으면 0.
pub fn resolve_offset(stored: Option<u64>, request: &TransferRequest) -> u64 {
    if !request.resume {
        return 0;
    }
    stored
        .filter(|&offset| offset <= request.file_size)
        .unwrap_or(0)
}

/// 선택적 타임아웃 적용. 만료 시 `Error::Timeout`.
pub async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout)?,
        None => fut.await,
    }
}

/// 요청 프레임 전송
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &TransferRequest,
) -> Result<()> {
    writer
        .write_all(&request.encode())
        .await
        .map_err(Error::WriteFault)?;
    writer.flush().await.map_err(Error::WriteFault)?;
    Ok(())
}

/// 요청 프레임 수신
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<TransferRequest> {
    let info_len = reader.read_u32().await.map_err(truncated("length"))?;
    if info_len == 0 || info_len > MAX_INFO_LEN {
        return Err(Error::MalformedHandshake(format!(
            "info length {} out of range (1..={})",
            info_len, MAX_INFO_LEN
        )));
    }

    let mut info_buf = vec![0u8; info_len as usize];
    reader
        .read_exact(&mut info_buf)
        .await
        .map_err(truncated("info"))?;

    let info = String::from_utf8(info_buf)
        .map_err(|e| Error::MalformedHandshake(format!("info is not UTF-8: {e}")))?;

    TransferRequest::parse(&info)
}

fn truncated(what: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::MalformedHandshake(format!("connection closed while reading {what}"))
        } else {
            Error::ReadFault(e)
        }
    }
}

/// 재개 오프셋 응답 전송
pub async fn write_offset<W: AsyncWrite + Unpin>(writer: &mut W, offset: u64) -> Result<()> {
    writer
        .write_all(offset.to_string().as_bytes())
        .await
        .map_err(Error::WriteFault)?;
    writer.flush().await.map_err(Error::WriteFault)?;
    Ok(())
}

/// 재개 오프셋 응답 수신
///
/// 한 번의 제한된 읽기로 받는다. fileSize를 넘는 값은 0으로 고정한다.
pub async fn read_offset_ack<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf_len: usize,
    file_size: u64,
) -> Result<u64> {
    let mut buf = vec![0u8; buf_len.max(1)];
    let n = reader.read(&mut buf).await.map_err(Error::ReadFault)?;
    if n == 0 {
        return Err(Error::InvalidOffsetAck("connection closed".into()));
    }

    let text = String::from_utf8_lossy(&buf[..n]);
    let offset = text
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidOffsetAck(text.trim().to_string()))?;

    Ok(if offset > file_size { 0 } else { offset })
}

/// 트레일러 전송
pub async fn write_trailer<W: AsyncWrite + Unpin>(writer: &mut W, hash: &str) -> Result<()> {
    writer
        .write_all(hash.as_bytes())
        .await
        .map_err(Error::WriteFault)?;
    writer.flush().await.map_err(Error::WriteFault)?;
    Ok(())
}

/// 트레일러 수신 (최대 hex 다이제스트 길이, EOF까지)
pub async fn read_trailer<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::with_capacity(HASH_HEX_LEN);
    reader
        .take(HASH_HEX_LEN as u64)
        .read_to_end(&mut buf)
        .await
        .map_err(Error::ReadFault)?;

    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).trim().to_string()))
}
