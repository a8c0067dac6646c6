//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// RFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 길이/필드 수/파일 크기 파싱 실패. 서버는 즉시 연결을 끊는다.
    #[error("잘못된 핸드셰이크: {0}")]
    MalformedHandshake(String),

    /// 서버 오프셋 응답 파싱 실패 (클라이언트측)
    #[error("유효하지 않은 오프셋 응답: {0:?}")]
    InvalidOffsetAck(String),

    #[error("서버 연결 실패: {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("읽기 실패: {0}")]
    ReadFault(#[source] std::io::Error),

    #[error("쓰기 실패: {0}")]
    WriteFault(#[source] std::io::Error),

    /// 저장 파일 생성/열기 실패
    #[error("저장소 에러: {path:?}: {source}")]
    StorageFault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("해시 불일치: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("읽기 타임아웃")]
    Timeout,

    #[error("전송할 수 없는 파일: {0}")]
    InvalidSource(String),

    #[error("all {attempts} attempts failed")]
    RetriesExhausted { attempts: u32 },

    /// 디렉터리 압축 실패
    #[error("압축 실패: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("로깅 초기화 실패: {0}")]
    Logging(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = Error::RetriesExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "all 5 attempts failed");
    }
}
