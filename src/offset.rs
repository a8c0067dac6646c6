//! 파일별 수신 오프셋 저장소
//!
//! 서버 프로세스 수명 동안만 유지된다 (디스크에 저장하지 않음).
//! 같은 이름으로 동시에 두 세션이 쓰면 마지막 `set`이 이긴다.

use dashmap::DashMap;

/// 정제된 파일 이름 → 디스크에 기록 완료된 바이트 오프셋
#[derive(Debug, Default)]
pub struct OffsetStore {
    offsets: DashMap<String, u64>,
}

impl OffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.offsets.get(name).map(|entry| *entry.value())
    }

    pub fn set(&self, name: &str, offset: u64) {
        self.offsets.insert(name.to_string(), offset);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
