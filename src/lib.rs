//! # RFT (Resumable File Transfer)
//!
//! TCP 기반 단일 파일 이어받기 전송 프로토콜
//!
//! ## 핵심 특징
//! - **오프셋 협상**: 매 시도마다 서버가 실제로 기록한 위치를 알려준다
//! - **이어받기**: 중단된 전송은 저장된 오프셋부터 재개
//! - **무결성 검증**: 완료 시 디스크의 파일 전체를 SHA-256으로 재계산
//! - **재시도**: 클라이언트는 고정 간격으로 전체 프로토콜을 다시 수행
//! - **동시 세션**: 연결당 태스크 하나, 세션 레지스트리로 상태 관찰

pub mod archive;
pub mod config;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod message;
pub mod offset;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod stats;
pub mod status;

pub use archive::compress_directory;
pub use config::Config;
pub use error::{Error, Result};
pub use message::{sanitize_file_name, HandshakeState, Role, TransferRequest};
pub use offset::OffsetStore;
pub use receiver::{Receiver, ServerState, TransferOutcome};
pub use registry::{SessionInfo, SessionRegistry, SessionStatus};
pub use sender::{retry, AttemptReport, RetryPolicy, Sender};
pub use stats::{CounterSnapshot, SpeedEstimator, TransferCounters};
pub use status::StatusReporter;

use std::time::Duration;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024; // 4MB

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 59999;

/// 기본 최대 시도 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// 기본 재시도 간격
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// 오프셋 응답 최대 길이 (바이트)
pub const MAX_OFFSET_ACK_LEN: usize = 256;

/// 핸드셰이크 정보 최대 길이 (바이트)
pub const MAX_INFO_LEN: u32 = 64 * 1024;

/// 핸드셰이크 필드 구분자
pub const FIELD_SEPARATOR: char = '|';
