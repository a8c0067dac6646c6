//! 서버 상태 리포터
//!
//! 레지스트리와 카운터를 읽기만 하는 소비자. 주기적으로 상태판을 로그로 남긴다.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::registry::{SessionRegistry, SessionStatus};
use crate::stats::{format_bytes, TransferCounters};

const SEPARATOR: &str = "------------------------------------------------------------";

/// 상태판 렌더러
#[derive(Clone)]
pub struct StatusReporter {
    registry: Arc<SessionRegistry>,
    counters: Arc<TransferCounters>,
    json: bool,
}

impl StatusReporter {
    pub fn new(registry: Arc<SessionRegistry>, counters: Arc<TransferCounters>) -> Self {
        Self {
            registry,
            counters,
            json: false,
        }
    }

    /// 주기 리포트를 JSON 한 줄로 출력
    pub fn with_json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    /// 주기 리포트에 쓰는 상태판
    pub fn board(&self) -> String {
        if self.json {
            self.render_json().to_string()
        } else {
            self.render()
        }
    }

    /// 현재 상태판 텍스트
    pub fn render(&self) -> String {
        let counters = self.counters.snapshot();
        let sessions = self.registry.snapshot();

        let mut lines = vec![counters.summary(), SEPARATOR.to_string()];

        if sessions.active.is_empty() && sessions.completed.is_empty() {
            lines.push("No active clients.".to_string());
        }

        for session in sessions
            .active
            .iter()
            .filter(|s| s.status == SessionStatus::InProgress)
        {
            lines.push(format!(
                "Client {}: {} | File: {} | Size: {} | Received: {} | Speed: {:.2} MB/s",
                session.peer_address,
                session.status,
                session.file_name,
                format_bytes(session.file_size),
                format_bytes(session.received_bytes),
                session.speed,
            ));
        }

        for session in &sessions.completed {
            lines.push(format!(
                "Client {}: {} | File: {} | Size: {} | Hash: {}",
                session.peer_address,
                session.status,
                session.file_name,
                format_bytes(session.file_size),
                session.computed_hash.as_deref().unwrap_or("-"),
            ));
        }

        lines.join("\n")
    }

    /// 기계 판독용 상태 (JSON)
    pub fn render_json(&self) -> serde_json::Value {
        serde_json::json!({
            "counters": self.counters.snapshot(),
            "sessions": self.registry.snapshot(),
        })
    }

    /// 주기적 리포트 태스크 시작
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last = String::new();

            loop {
                ticker.tick().await;
                let board = self.board();
                // 변화가 없으면 같은 상태판을 반복해서 남기지 않음
                if board != last {
                    info!(target: "rft::status", "\n{}", board);
                    last = board;
                }
            }
        })
    }
}
