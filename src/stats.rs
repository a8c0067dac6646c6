//! 전송 통계

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const MB: f64 = 1024.0 * 1024.0;

/// 속도 지수이동평균 가중치
const SPEED_ALPHA: f64 = 0.3;

#[derive(Debug, Default)]
struct Counters {
    active_connections: u64,
    total_bytes: u64,
}

/// 프로세스 전체 카운터
///
/// 리포터가 주기적으로 읽는 스냅샷 용도이며 프로토콜 정확성에는 쓰이지 않는다.
#[derive(Debug)]
pub struct TransferCounters {
    counters: Mutex<Counters>,
    start_time: Instant,
}

/// 카운터 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub active_connections: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    /// 서버 시작 이후 평균 처리율 (MB/s)
    pub average_speed: f64,
}

impl CounterSnapshot {
    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Active Connections: {} | Total Bytes Transferred: {:.2} MB | Current Speed: {:.2} MB/s",
            self.active_connections,
            self.total_bytes as f64 / MB,
            self.average_speed,
        )
    }
}

impl Default for TransferCounters {
    fn default() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            start_time: Instant::now(),
        }
    }
}

impl TransferCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.counters.lock().active_connections += 1;
    }

    pub fn connection_closed(&self) {
        let mut counters = self.counters.lock();
        counters.active_connections = counters.active_connections.saturating_sub(1);
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.counters.lock().total_bytes += bytes;
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let (active_connections, total_bytes) = {
            let counters = self.counters.lock();
            (counters.active_connections, counters.total_bytes)
        };

        let elapsed = self.start_time.elapsed();
        let secs = elapsed.as_secs_f64();
        let average_speed = if secs > 0.0 {
            total_bytes as f64 / secs / MB
        } else {
            0.0
        };

        CounterSnapshot {
            active_connections,
            total_bytes,
            elapsed,
            average_speed,
        }
    }
}

/// 읽기 단위 속도 추정기 (MB/s, 지수이동평균)
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    last_read: Instant,
    speed: f64,
    samples: u64,
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self {
            last_read: Instant::now(),
            speed: 0.0,
            samples: 0,
        }
    }

    /// 직전 읽기 이후 경과 시간 기준으로 갱신
    pub fn record(&mut self, bytes: usize) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_read);
        self.last_read = now;
        self.record_elapsed(bytes, elapsed)
    }

    /// 경과 시간을 직접 지정해 갱신
    pub fn record_elapsed(&mut self, bytes: usize, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return self.speed;
        }

        let sample = bytes as f64 / secs / MB;
        self.speed = if self.samples == 0 {
            sample
        } else {
            SPEED_ALPHA * sample + (1.0 - SPEED_ALPHA) * self.speed
        };
        self.samples += 1;
        self.speed
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

/// 사람이 읽기 쉬운 바이트 표기
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    let unit = b"KMGTPE"[exp] as char;
    format!("{:.2} {}B", bytes as f64 / div as f64, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let counters = TransferCounters::new();
        counters.connection_opened();
        counters.connection_opened();
        counters.add_bytes(1024 * 1024);
        counters.connection_closed();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.total_bytes, 1024 * 1024);
        assert!(snapshot.summary().contains("Total Bytes Transferred: 1.00 MB"));
    }

    #[test]
    fn test_connection_closed_saturates() {
        let counters = TransferCounters::new();
        counters.connection_closed();
        assert_eq!(counters.snapshot().active_connections, 0);
    }

    #[test]
    fn test_speed_smoothing() {
        let mut speed = SpeedEstimator::new();
        let first = speed.record_elapsed(1024 * 1024, Duration::from_secs(1));
        assert!((first - 1.0).abs() < 1e-9);

        // 0.3 * 11 + 0.7 * 1 = 4.0
        let second = speed.record_elapsed(11 * 1024 * 1024, Duration::from_secs(1));
        assert!((second - 4.0).abs() < 1e-9);

        // 경과 시간 0은 무시
        assert_eq!(speed.record_elapsed(1, Duration::ZERO), second);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.00 MB");
        assert_eq!(format_bytes(u64::MAX), "16.00 EB");
    }
}
