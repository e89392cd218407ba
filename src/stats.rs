//! Running counters
//!
//! Lock-free statistics shared across all tasks; a reporter task logs a
//! snapshot on a fixed cadence.

use std::sync::atomic::{AtomicU64, Ordering};

/// Bot-wide counters
#[derive(Debug, Default)]
pub struct BotStats {
    pairs_seen: AtomicU64,
    pairs_analyzed: AtomicU64,
    trades_attempted: AtomicU64,
    trades_succeeded: AtomicU64,
    trades_failed: AtomicU64,
    honeypots_detected: AtomicU64,
    safety_rejections: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pairs_seen: u64,
    pub pairs_analyzed: u64,
    pub trades_attempted: u64,
    pub trades_succeeded: u64,
    pub trades_failed: u64,
    pub honeypots_detected: u64,
    pub safety_rejections: u64,
}

impl BotStats {
    pub fn pair_seen(&self) {
        self.pairs_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pair_analyzed(&self) {
        self.pairs_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_attempted(&self) {
        self.trades_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_succeeded(&self) {
        self.trades_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_failed(&self) {
        self.trades_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn honeypot_detected(&self) {
        self.honeypots_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn safety_rejection(&self) {
        self.safety_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pairs_seen: self.pairs_seen.load(Ordering::Relaxed),
            pairs_analyzed: self.pairs_analyzed.load(Ordering::Relaxed),
            trades_attempted: self.trades_attempted.load(Ordering::Relaxed),
            trades_succeeded: self.trades_succeeded.load(Ordering::Relaxed),
            trades_failed: self.trades_failed.load(Ordering::Relaxed),
            honeypots_detected: self.honeypots_detected.load(Ordering::Relaxed),
            safety_rejections: self.safety_rejections.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pairs seen: {}, analyzed: {}, trades attempted: {}, succeeded: {}, failed: {}, honeypots: {}, rejections: {}",
            self.pairs_seen,
            self.pairs_analyzed,
            self.trades_attempted,
            self.trades_succeeded,
            self.trades_failed,
            self.honeypots_detected,
            self.safety_rejections,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = BotStats::default();

        stats.pair_seen();
        stats.pair_seen();
        stats.pair_analyzed();
        stats.trade_attempted();
        stats.trade_succeeded();
        stats.honeypot_detected();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.pairs_seen, 2);
        assert_eq!(snapshot.pairs_analyzed, 1);
        assert_eq!(snapshot.trades_attempted, 1);
        assert_eq!(snapshot.trades_succeeded, 1);
        assert_eq!(snapshot.trades_failed, 0);
        assert_eq!(snapshot.honeypots_detected, 1);
    }
}
