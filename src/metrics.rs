use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Labelled counters incremented while tests are parsed and buffered.
///
/// All updates are relaxed atomics so counting never blocks the parse path;
/// the counters are advisory inputs to the surrounding failure-rate policy,
/// not synchronization points.
#[derive(Debug, Default)]
pub struct Metrics {
    pub corrupted_first_line: AtomicU64,
    pub corrupted_json_content: AtomicU64,
    pub discarded_hops: AtomicU64,
    pub not_reach_destination: AtomicU64,
    pub reached_destination_mid_path: AtomicU64,
    pub polluted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            corrupted_first_line: self.corrupted_first_line.load(Ordering::Relaxed),
            corrupted_json_content: self.corrupted_json_content.load(Ordering::Relaxed),
            discarded_hops: self.discarded_hops.load(Ordering::Relaxed),
            not_reach_destination: self.not_reach_destination.load(Ordering::Relaxed),
            reached_destination_mid_path: self.reached_destination_mid_path.load(Ordering::Relaxed),
            polluted: self.polluted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters, used for summaries and assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub corrupted_first_line: u64,
    pub corrupted_json_content: u64,
    pub discarded_hops: u64,
    pub not_reach_destination: u64,
    pub reached_destination_mid_path: u64,
    pub polluted: u64,
}

impl MetricsSnapshot {
    /// Labelled view for log output.
    pub fn labelled(&self) -> [(&'static str, u64); 6] {
        [
            ("corrupted_first_line", self.corrupted_first_line),
            ("corrupted_json_content", self.corrupted_json_content),
            ("discarded_hops", self.discarded_hops),
            ("not_reach_destination", self.not_reach_destination),
            (
                "reached_destination_mid_path",
                self.reached_destination_mid_path,
            ),
            ("polluted", self.polluted),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = Metrics::new();
        metrics.polluted.fetch_add(2, Ordering::Relaxed);
        metrics.discarded_hops.fetch_add(17, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.polluted, 2);
        assert_eq!(snap.discarded_hops, 17);
        assert_eq!(snap.corrupted_first_line, 0);
    }

    #[test]
    fn test_labelled_covers_every_counter() {
        let snap = MetricsSnapshot {
            corrupted_first_line: 1,
            corrupted_json_content: 2,
            discarded_hops: 3,
            not_reach_destination: 4,
            reached_destination_mid_path: 5,
            polluted: 6,
        };
        let labels = snap.labelled();
        assert_eq!(labels.len(), 6);
        assert!(labels.iter().any(|(name, v)| *name == "polluted" && *v == 6));
    }
}
