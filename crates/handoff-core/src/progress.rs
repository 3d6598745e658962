/// Byte accounting for the one active payload transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub payload_id: Option<i64>,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn new(payload_id: Option<i64>, total_bytes: u64) -> Self {
        Self {
            payload_id,
            bytes_transferred: 0,
            total_bytes,
        }
    }

    /// Record a new byte count. Counts never go backwards; a smaller value is
    /// ignored and `false` is returned.
    pub fn advance(&mut self, bytes_transferred: u64, total_bytes: u64) -> bool {
        if total_bytes > 0 {
            self.total_bytes = total_bytes;
        }
        if bytes_transferred < self.bytes_transferred {
            return false;
        }
        self.bytes_transferred = bytes_transferred;
        true
    }

    /// Percentage in 0..=100. An empty payload counts as done.
    pub fn percentage(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let pct = self.bytes_transferred.saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_transferred >= self.total_bytes
    }

    pub fn transferred_kb(&self) -> u64 {
        self.bytes_transferred / 1024
    }

    pub fn total_kb(&self) -> u64 {
        self.total_bytes / 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let mut p = TransferProgress::new(Some(1), 4096);
        assert!(p.advance(2048, 4096));
        assert!(!p.advance(1024, 4096));
        assert_eq!(p.bytes_transferred, 2048);
        assert_eq!(p.percentage(), 50);
        assert!(p.advance(4096, 4096));
        assert!(p.is_complete());
        assert_eq!(p.percentage(), 100);
    }

    #[test]
    fn test_kilobytes() {
        let mut p = TransferProgress::new(None, 10 * 1024 + 500);
        p.advance(3 * 1024 + 1023, 0);
        assert_eq!(p.transferred_kb(), 3);
        assert_eq!(p.total_kb(), 10);
    }

    #[test]
    fn test_empty_payload_is_complete() {
        let p = TransferProgress::new(None, 0);
        assert!(p.is_complete());
        assert_eq!(p.percentage(), 100);
    }
}
