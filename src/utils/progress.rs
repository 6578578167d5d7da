use std::time::{Duration, Instant};

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

const MIB: f64 = 1024.0 * 1024.0;

/// 傳輸進度記錄器：累計位元組數，並以固定間隔輸出 info 日誌
#[derive(Debug)]
pub struct TransferProgress {
    name: String,
    interval: Duration,
    started_at: Instant,
    last_log: Instant,
    total_bytes: u64,
    reports: usize,
}

impl TransferProgress {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            interval,
            started_at: now,
            last_log: now,
            total_bytes: 0,
            reports: 0,
        }
    }

    /// 記錄新傳輸的位元組；回傳這次是否輸出了進度日誌
    pub fn record(&mut self, bytes: u64) -> bool {
        self.total_bytes += bytes;

        if self.last_log.elapsed() >= self.interval {
            tracing::info!(
                "📤 {}: transferred {:.2} MiB to Azure Blob",
                self.name,
                self.total_bytes as f64 / MIB
            );
            self.last_log = Instant::now();
            self.reports += 1;
            return true;
        }

        false
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn reports(&self) -> usize {
        self.reports
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 完成摘要；沒有傳輸任何資料時不輸出
    pub fn log_summary(&self) {
        if self.total_bytes == 0 {
            return;
        }

        tracing::info!(
            "✅ {}: transferred {:.2} MiB to Azure Blob in {:.3} seconds.",
            self.name,
            self.total_bytes as f64 / MIB,
            self.elapsed().as_secs_f64()
        );
    }
}
