//! 파일 해시 (SHA-256, 소문자 hex)

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::Result;

/// hex 다이제스트 길이
pub const HASH_HEX_LEN: usize = 64;

/// 해시 계산 시 읽기 버퍼 크기
pub const HASH_BUF_SIZE: usize = 1024 * 1024;

/// 파일 전체를 처음부터 끝까지 읽어 hex 다이제스트를 반환
pub async fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path.as_ref()).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// 메모리 데이터의 hex 다이제스트
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
