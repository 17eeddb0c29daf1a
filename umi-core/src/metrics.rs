//! Dialogue counters.
//!
//! Lock-free `AtomicU64`s incremented on the turn path and read on export.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for dialogue events.
#[derive(Debug)]
pub struct DialogueCounters {
    /// Completed dialogue turns.
    pub turns: AtomicU64,
    /// Turns answered by the mock fallback after a generator failure.
    pub generator_fallbacks: AtomicU64,
    /// UPDATED_STATS blocks that failed to parse.
    pub stat_parse_failures: AtomicU64,
    /// Generated fish-level writes discarded.
    pub corruption_updates_dropped: AtomicU64,
    /// Tokens considered for masking.
    pub tokens_seen: AtomicU64,
    /// Tokens replaced by the marker.
    pub tokens_masked: AtomicU64,
}

impl DialogueCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            turns: AtomicU64::new(0),
            generator_fallbacks: AtomicU64::new(0),
            stat_parse_failures: AtomicU64::new(0),
            corruption_updates_dropped: AtomicU64::new(0),
            tokens_seen: AtomicU64::new(0),
            tokens_masked: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            turns: self.turns.load(Ordering::Relaxed),
            generator_fallbacks: self.generator_fallbacks.load(Ordering::Relaxed),
            stat_parse_failures: self.stat_parse_failures.load(Ordering::Relaxed),
            corruption_updates_dropped: self.corruption_updates_dropped.load(Ordering::Relaxed),
            tokens_seen: self.tokens_seen.load(Ordering::Relaxed),
            tokens_masked: self.tokens_masked.load(Ordering::Relaxed),
        }
    }
}

impl Default for DialogueCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Completed turns.
    pub turns: u64,
    /// Mock fallbacks.
    pub generator_fallbacks: u64,
    /// Unreadable stat blocks.
    pub stat_parse_failures: u64,
    /// Discarded fish-level writes.
    pub corruption_updates_dropped: u64,
    /// Tokens considered for masking.
    pub tokens_seen: u64,
    /// Tokens masked.
    pub tokens_masked: u64,
}

impl CounterSnapshot {
    /// Share of considered tokens that were masked.
    #[must_use]
    pub fn masked_ratio(&self) -> f64 {
        if self.tokens_seen == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.tokens_masked as f64 / self.tokens_seen as f64;
        ratio
    }

    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("umi_turns_total", "Completed dialogue turns", self.turns),
            ("umi_generator_fallbacks_total", "Turns answered by the mock fallback", self.generator_fallbacks),
            ("umi_stat_parse_failures_total", "Unreadable UPDATED_STATS blocks", self.stat_parse_failures),
            (
                "umi_corruption_updates_dropped_total",
                "Generated fish-level writes discarded",
                self.corruption_updates_dropped,
            ),
            ("umi_tokens_seen_total", "Tokens considered for masking", self.tokens_seen),
            ("umi_tokens_masked_total", "Tokens replaced by the marker", self.tokens_masked),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_adds() {
        let counters = DialogueCounters::new();
        DialogueCounters::add(&counters.turns, 2);
        DialogueCounters::add(&counters.tokens_seen, 10);
        DialogueCounters::add(&counters.tokens_masked, 9);

        let snap = counters.snapshot();
        assert_eq!(snap.turns, 2);
        assert!((snap.masked_ratio() - 0.9).abs() < 1e-9);
        assert!(snap.to_prometheus().contains("umi_turns_total 2"));
    }

    #[test]
    fn empty_ratio_is_zero() {
        assert!(CounterSnapshot::default().masked_ratio().abs() < f64::EPSILON);
    }
}
