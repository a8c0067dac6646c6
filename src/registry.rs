//! 세션 레지스트리
//!
//! 진행 중 세션 맵과 완료 목록을 각각 별도 락으로 보호한다.
//! 두 락을 함께 잡을 때는 항상 active → completed 순서.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    /// 파일 크기에 도달하기 전에 스트림이 끝남 (재개 가능)
    Interrupted,
    WriteError,
    /// 다이제스트 불일치 또는 계산 실패. 받은 바이트는 보존한다.
    HashError,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Interrupted => "interrupted",
            SessionStatus::WriteError => "write-error",
            SessionStatus::HashError => "hash-error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 세션 기록
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: u64,
    pub peer_address: SocketAddr,
    pub file_name: String,
    pub file_size: u64,
    pub received_bytes: u64,
    pub status: SessionStatus,
    /// 평활화된 속도 (MB/s)
    pub speed: f64,
    pub start_time: SystemTime,
    pub computed_hash: Option<String>,
}

/// 레지스트리 스냅샷 (id 순 정렬)
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySnapshot {
    pub active: Vec<SessionInfo>,
    pub completed: Vec<SessionInfo>,
}

/// 진행 중/완료 세션 레지스트리
#[derive(Debug)]
pub struct SessionRegistry {
    active: Mutex<HashMap<u64, SessionInfo>>,
    completed: Mutex<Vec<SessionInfo>>,
    next_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 진행 중 세션 등록, 새 세션 ID 반환
    pub fn register(
        &self,
        peer_address: SocketAddr,
        file_name: &str,
        file_size: u64,
        offset: u64,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let info = SessionInfo {
            id,
            peer_address,
            file_name: file_name.to_string(),
            file_size,
            received_bytes: offset,
            status: SessionStatus::InProgress,
            speed: 0.0,
            start_time: SystemTime::now(),
            computed_hash: None,
        };
        self.active.lock().insert(id, info);
        id
    }

    /// 진행 중 세션 갱신. 이미 완료된 세션이면 false.
    pub fn update<F>(&self, id: u64, f: F) -> bool
    where
        F: FnOnce(&mut SessionInfo),
    {
        match self.active.lock().get_mut(&id) {
            Some(info) => {
                f(info);
                true
            }
            None => false,
        }
    }

    /// 종료 상태로 전환하고 완료 목록으로 이동
    ///
    /// 두 락을 함께 잡은 채 옮기므로 관찰자는 세션을 정확히 한 곳에서만 본다.
    pub fn finish(
        &self,
        id: u64,
        status: SessionStatus,
        computed_hash: Option<String>,
    ) -> Option<SessionInfo> {
        debug_assert!(status.is_terminal());

        let mut active = self.active.lock();
        let mut completed = self.completed.lock();

        let mut info = active.remove(&id)?;
        info.status = status;
        if computed_hash.is_some() {
            info.computed_hash = computed_hash;
        }
        completed.push(info.clone());
        Some(info)
    }

    pub fn get(&self, id: u64) -> Option<SessionInfo> {
        let active = self.active.lock();
        let completed = self.completed.lock();
        active
            .get(&id)
            .cloned()
            .or_else(|| completed.iter().find(|info| info.id == id).cloned())
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.lock().len()
    }

    /// 진행 중 세션 (id 순)
    pub fn active(&self) -> Vec<SessionInfo> {
        let mut active: Vec<SessionInfo> = self.active.lock().values().cloned().collect();
        active.sort_by_key(|info| info.id);
        active
    }

    /// 종료된 세션 (종료 순)
    pub fn completed(&self) -> Vec<SessionInfo> {
        self.completed.lock().clone()
    }

    /// 두 컬렉션의 일관된 스냅샷
    pub fn snapshot(&self) -> RegistrySnapshot {
        let active = self.active.lock();
        let completed = self.completed.lock();

        let mut active: Vec<SessionInfo> = active.values().cloned().collect();
        active.sort_by_key(|info| info.id);

        RegistrySnapshot {
            active,
            completed: completed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let registry = SessionRegistry::new();
        let a = registry.register(peer(), "a.txt", 10, 0);
        let b = registry.register(peer(), "a.txt", 10, 6);
        assert_ne!(a, b);
        assert_eq!(registry.active_count(), 2);
        assert_eq!(registry.get(b).unwrap().received_bytes, 6);
    }

    #[test]
    fn test_finish_moves_to_completed() {
        let registry = SessionRegistry::new();
        let id = registry.register(peer(), "a.txt", 10, 0);
        assert!(registry.update(id, |info| info.received_bytes = 10));

        let info = registry
            .finish(id, SessionStatus::Completed, Some("H".into()))
            .unwrap();
        assert_eq!(info.status, SessionStatus::Completed);
        assert_eq!(info.computed_hash.as_deref(), Some("H"));

        assert!(registry.active().is_empty());
        assert_eq!(registry.completed()[0].id, id);
        // 완료된 세션은 더 이상 갱신되지 않음
        assert!(!registry.update(id, |info| info.received_bytes = 0));
        assert!(registry.finish(id, SessionStatus::Interrupted, None).is_none());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::InProgress.to_string(), "in-progress");
        assert_eq!(SessionStatus::HashError.to_string(), "hash-error");
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::WriteError.is_terminal());
        assert_eq!(
            serde_json::to_string(&SessionStatus::WriteError).unwrap(),
            "\"write-error\""
        );
    }

    #[test]
    fn test_session_seen_in_exactly_one_collection() {
        let registry = Arc::new(SessionRegistry::new());
        let ids: Vec<u64> = (0..200)
            .map(|i| registry.register(peer(), &format!("f{i}"), 1, 0))
            .collect();

        let finisher = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for id in ids {
                    registry.finish(id, SessionStatus::Completed, None);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = registry.snapshot();
            assert_eq!(snapshot.active.len() + snapshot.completed.len(), 200);
        }
        finisher.join().unwrap();
        assert_eq!(registry.completed_count(), 200);
    }
}
