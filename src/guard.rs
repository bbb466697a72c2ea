//! Pollution buffer: holds back tests whose traceroute stopped short of
//! its destination, so a neighboring test's stray trailing hops can be
//! caught before the result is committed.
//!
//! A test that ended exactly on its destination cannot be polluted and is
//! committed immediately. Everything else waits in a small FIFO window and
//! is checked against each later arrival; a buffered test is discarded when
//! the newcomer's destination shows up inside it.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;

use log::info;

use crate::error::SinkError;
use crate::metrics::Metrics;
use crate::model::CachedTestResult;
use crate::sink::Sink;

pub const DEFAULT_CAPACITY: usize = 2;

/// FIFO window of suspect results. Every admitted test is either committed
/// exactly once or discarded exactly once; nothing is dropped silently.
pub struct PollutionGuard {
    buffer: VecDeque<CachedTestResult>,
    capacity: usize,
}

impl Default for PollutionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl PollutionGuard {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True when `held` carries hops that belong to a test aimed at
    /// `incoming_dest`. Two signals, either one convicts: the held test's
    /// first-hop link already points at the newcomer's destination, or the
    /// newcomer's destination appears verbatim in the held test's last
    /// parsed hop line.
    fn is_polluted_by(held: &CachedTestResult, incoming_dest: &str) -> bool {
        if held.test.destination_ip == incoming_dest {
            return false;
        }
        let first_hop_hit = held
            .test
            .hops
            .first()
            .and_then(|hop| hop.links.first())
            .map(|link| link.destination_ip == incoming_dest)
            .unwrap_or(false);
        first_hop_hit || held.last_valid_hop_text.contains(incoming_dest)
    }

    /// Admit one finished test. Runs the pollution scan against the buffer,
    /// evicts the oldest entry if the window is full, then either commits
    /// the newcomer (destination reached) or buffers it.
    pub fn admit<S: Sink>(
        &mut self,
        result: CachedTestResult,
        sink: &mut S,
        metrics: &Metrics,
    ) -> Result<(), SinkError> {
        let incoming_dest = result.test.destination_ip.clone();
        let before = self.buffer.len();
        let mut discarded_hops = 0u64;
        self.buffer.retain(|held| {
            if Self::is_polluted_by(held, &incoming_dest) {
                discarded_hops += held.test.hops.len() as u64;
                info!(
                    "discarding polluted test {} (stray hops toward {})",
                    held.test.test_id, incoming_dest
                );
                false
            } else {
                true
            }
        });
        let dropped = (before - self.buffer.len()) as u64;
        if dropped > 0 {
            metrics.polluted.fetch_add(dropped, Ordering::Relaxed);
            metrics
                .discarded_hops
                .fetch_add(discarded_hops, Ordering::Relaxed);
        }

        if result.reached_destination() {
            return sink.commit(result.into_test());
        }

        if self.buffer.len() >= self.capacity {
            if let Some(oldest) = self.buffer.pop_front() {
                sink.commit(oldest.into_test())?;
            }
        }
        self.buffer.push_back(result);
        Ok(())
    }

    /// Drain the window into the sink, oldest first. Anything still held at
    /// end of input is presumed clean.
    pub fn flush<S: Sink>(&mut self, sink: &mut S) -> Result<(), SinkError> {
        while let Some(held) = self.buffer.pop_front() {
            sink.commit(held.into_test())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AssembledTest, Hop, HopLink, HopSource, EXPECTED_DEST_MARKER, SINGLE_FLOW,
    };
    use crate::sink::VecSink;

    fn hop(source_ip: &str, dest_ip: &str) -> Hop {
        Hop {
            source: HopSource {
                ip: source_ip.to_string(),
                hostname: String::new(),
            },
            links: vec![HopLink {
                destination_ip: dest_ip.to_string(),
                round_trip_samples: vec![1.0],
                flow_id: SINGLE_FLOW,
            }],
        }
    }

    fn result(id: &str, dest: &str, hops: Vec<Hop>, last_line: &str) -> CachedTestResult {
        CachedTestResult {
            test: AssembledTest::new(
                id.to_string(),
                hops,
                1490053990,
                "64.86.132.76".to_string(),
                dest.to_string(),
            ),
            last_valid_hop_text: last_line.to_string(),
            metro: "acc".to_string(),
        }
    }

    fn reached(id: &str, dest: &str) -> CachedTestResult {
        result(id, dest, vec![hop("10.0.0.1", dest)], EXPECTED_DEST_MARKER)
    }

    #[test]
    fn test_reached_destination_bypasses_buffer() {
        let mut guard = PollutionGuard::new();
        let mut sink = VecSink::new();
        let metrics = Metrics::new();

        guard
            .admit(reached("a", "98.162.212.214"), &mut sink, &metrics)
            .unwrap();

        assert!(guard.is_empty());
        assert_eq!(sink.tests.len(), 1);
        assert_eq!(sink.tests[0].test_id, "a");
    }

    #[test]
    fn test_unreached_test_is_held() {
        let mut guard = PollutionGuard::new();
        let mut sink = VecSink::new();
        let metrics = Metrics::new();

        let held = result(
            "a",
            "98.162.212.214",
            vec![hop("10.0.0.1", "10.0.0.2")],
            "5  host (10.0.0.2)  1.0 ms",
        );
        guard.admit(held, &mut sink, &metrics).unwrap();

        assert_eq!(guard.len(), 1);
        assert!(sink.tests.is_empty());
    }

    #[test]
    fn test_capacity_eviction_commits_oldest_first() {
        let mut guard = PollutionGuard::new();
        let mut sink = VecSink::new();
        let metrics = Metrics::new();

        for id in ["a", "b", "c", "d"] {
            let dest = format!("203.0.113.{}", id.as_bytes()[0]);
            let held = result(id, &dest, vec![hop("10.0.0.1", "10.0.0.2")], "no match here");
            guard.admit(held, &mut sink, &metrics).unwrap();
        }

        // Window holds the two newest; the two oldest were evicted in order.
        assert_eq!(guard.len(), 2);
        let ids: Vec<&str> = sink.tests.iter().map(|t| t.test_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_pollution_by_last_hop_text_discards() {
        let mut guard = PollutionGuard::new();
        let mut sink = VecSink::new();
        let metrics = Metrics::new();

        // The held test's trailing hop line mentions the newcomer's
        // destination: those hops belonged to the newcomer's test.
        let held = result(
            "victim",
            "198.51.100.9",
            vec![hop("10.0.0.1", "10.0.0.2"), hop("10.0.0.2", "10.0.0.3")],
            "9  host (203.0.113.50)  1.2 ms",
        );
        guard.admit(held, &mut sink, &metrics).unwrap();

        guard
            .admit(reached("next", "203.0.113.50"), &mut sink, &metrics)
            .unwrap();

        assert!(guard.is_empty());
        assert_eq!(sink.tests.len(), 1);
        assert_eq!(sink.tests[0].test_id, "next");
        let snap = metrics.snapshot();
        assert_eq!(snap.polluted, 1);
        assert_eq!(snap.discarded_hops, 2);
    }

    #[test]
    fn test_pollution_by_first_hop_link_discards() {
        let mut guard = PollutionGuard::new();
        let mut sink = VecSink::new();
        let metrics = Metrics::new();

        let held = result(
            "victim",
            "198.51.100.9",
            vec![hop("10.0.0.1", "203.0.113.50")],
            "no textual match",
        );
        guard.admit(held, &mut sink, &metrics).unwrap();
        guard
            .admit(reached("next", "203.0.113.50"), &mut sink, &metrics)
            .unwrap();

        assert!(guard.is_empty());
        assert_eq!(metrics.snapshot().polluted, 1);
    }

    #[test]
    fn test_same_destination_is_never_pollution() {
        let mut guard = PollutionGuard::new();
        let mut sink = VecSink::new();
        let metrics = Metrics::new();

        let held = result(
            "a",
            "203.0.113.50",
            vec![hop("10.0.0.1", "203.0.113.50")],
            "9  host (203.0.113.50)  1.2 ms",
        );
        guard.admit(held, &mut sink, &metrics).unwrap();
        guard
            .admit(reached("b", "203.0.113.50"), &mut sink, &metrics)
            .unwrap();

        assert_eq!(guard.len(), 1);
        assert_eq!(metrics.snapshot().polluted, 0);
    }

    #[test]
    fn test_flush_drains_in_fifo_order() {
        let mut guard = PollutionGuard::new();
        let mut sink = VecSink::new();
        let metrics = Metrics::new();

        for id in ["a", "b"] {
            let dest = format!("203.0.113.{}", id.as_bytes()[0]);
            let held = result(id, &dest, vec![hop("10.0.0.1", "10.0.0.2")], "no match");
            guard.admit(held, &mut sink, &metrics).unwrap();
        }
        guard.flush(&mut sink).unwrap();

        assert!(guard.is_empty());
        let ids: Vec<&str> = sink.tests.iter().map(|t| t.test_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
