// ── Upload history – records of successful and failed attempts ────────────────

use crate::sftp::service::UploadSession;
use crate::sftp::types::*;

const MAX_HISTORY_SIZE: usize = 500;

/// Append `record`, dropping the oldest entries beyond the size cap.
pub(crate) fn record_upload(history: &mut Vec<UploadRecord>, record: UploadRecord) {
    history.push(record);
    if history.len() > MAX_HISTORY_SIZE {
        let excess = history.len() - MAX_HISTORY_SIZE;
        history.drain(0..excess);
    }
}

impl UploadSession {
    /// Newest first, at most `limit` entries (default 100).
    pub fn history(&self, limit: Option<usize>) -> Vec<UploadRecord> {
        let limit = limit.unwrap_or(100);
        self.history.iter().rev().take(limit).cloned().collect()
    }

    /// Forget all recorded attempts. The success counter is unaffected.
    pub fn clear_history(&mut self) -> usize {
        let count = self.history.len();
        self.history.clear();
        count
    }

    pub fn history_stats(&self) -> HistoryStats {
        let succeeded = self.history.iter().filter(|r| r.is_success()).count();
        HistoryStats {
            attempts: self.history.len(),
            succeeded,
            failed: self.history.len() - succeeded,
            total_bytes_sent: self
                .history
                .iter()
                .filter(|r| r.is_success())
                .map(|r| r.size_bytes)
                .sum(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            successful_uploads: self.successful_uploads(),
            stats: self.history_stats(),
        }
    }
}
