//! Per-file driver: detect the format, parse one test, classify the result
//! and route it through the pollution buffer into the sink.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::debug;

use crate::error::{FormatError, ProcessError, SinkError};
use crate::filename::{metro_code, synthetic_test_id, LegacyFileName};
use crate::guard::PollutionGuard;
use crate::legacy::{build_hops, parse_header, process_tuple, split_hop_line};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::model::{normalize_ip, AssembledTest, CachedTestResult, Node, EXPECTED_DEST_MARKER};
use crate::scamper::{hops_from_tracelb, parse_structured};
use crate::sink::Sink;

/// Test file format, decided by the member name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFormat {
    LegacyParis,
    StructuredJsonl,
}

impl TestFormat {
    pub fn from_test_name(name: &str) -> Result<Self, FormatError> {
        if name.ends_with(".paris") {
            Ok(TestFormat::LegacyParis)
        } else if name.ends_with(".jsonl") || name.ends_with(".json") {
            Ok(TestFormat::StructuredJsonl)
        } else {
            Err(FormatError::UnsupportedTest(name.to_string()))
        }
    }
}

/// Processes the members of one task archive in order. Owns the pollution
/// buffer, so call [`TestAssembler::finish`] after the last member to drain
/// it into the sink.
pub struct TestAssembler<S: Sink> {
    task_file_name: String,
    metro: String,
    guard: PollutionGuard,
    metrics: Arc<Metrics>,
    sink: S,
}

impl<S: Sink> TestAssembler<S> {
    pub fn new(task_file_name: impl Into<String>, sink: S) -> Self {
        let task_file_name = task_file_name.into();
        let metro = metro_code(&task_file_name);
        Self {
            task_file_name,
            metro,
            guard: PollutionGuard::new(),
            metrics: Arc::new(Metrics::new()),
            sink,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn metrics_handle(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Parse and route one member file. Format errors reject that member
    /// only; sink errors are fatal to the run.
    pub fn process_test(&mut self, test_name: &str, raw: &[u8]) -> Result<(), ProcessError> {
        match TestFormat::from_test_name(test_name)? {
            TestFormat::LegacyParis => self.process_legacy(test_name, raw),
            TestFormat::StructuredJsonl => self.process_structured(test_name, raw),
        }
    }

    /// Drain the pollution buffer and flush the sink.
    pub fn finish(mut self) -> Result<S, SinkError> {
        self.guard.flush(&mut self.sink)?;
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn process_legacy(&mut self, test_name: &str, raw: &[u8]) -> Result<(), ProcessError> {
        let content = String::from_utf8_lossy(raw);
        let mut lines = content
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

        let first = match lines.next() {
            Some(line) => line,
            None => return Ok(()),
        };
        let header = match parse_header(first) {
            Ok(header) => header,
            Err(err) => {
                self.metrics
                    .corrupted_first_line
                    .fetch_add(1, Ordering::Relaxed);
                return Err(err.into());
            }
        };

        let mut all_nodes: Vec<Node> = Vec::new();
        let mut current_leaves: Vec<Node> = Vec::new();
        let mut last_valid_hop_text = String::new();
        let mut dest_seen_mid_path = false;

        for line in lines {
            let tuples = match split_hop_line(line)? {
                Some(tuples) => tuples,
                None => continue,
            };
            if line.contains(&header.destination_ip) {
                dest_seen_mid_path = true;
            }
            let mut new_leaves: Vec<Node> = Vec::new();
            for tuple in &tuples {
                process_tuple(
                    tuple,
                    header.protocol,
                    &current_leaves,
                    &mut all_nodes,
                    &mut new_leaves,
                )?;
            }
            current_leaves = new_leaves;
            last_valid_hop_text = line.to_string();
        }

        if all_nodes.is_empty() {
            debug!("empty test {}", test_name);
            return Ok(());
        }

        let reached = all_nodes
            .last()
            .map(|n| n.ip == header.destination_ip)
            .unwrap_or(false);
        if reached {
            last_valid_hop_text = EXPECTED_DEST_MARKER.to_string();
        } else {
            self.metrics
                .not_reach_destination
                .fetch_add(1, Ordering::Relaxed);
            if dest_seen_mid_path {
                self.metrics
                    .reached_destination_mid_path
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        let hops = build_hops(&all_nodes, &header.server_ip);
        let log_time = LegacyFileName::parse(test_name)
            .map(|f| f.log_time())
            .unwrap_or(0);
        let test = AssembledTest::new(
            synthetic_test_id(&self.task_file_name, test_name),
            hops,
            log_time,
            header.server_ip,
            header.destination_ip,
        );
        self.admit(test, last_valid_hop_text)
    }

    fn process_structured(&mut self, test_name: &str, raw: &[u8]) -> Result<(), ProcessError> {
        let output = match parse_structured(raw) {
            Ok(output) => output,
            Err(err) => {
                self.metrics
                    .corrupted_json_content
                    .fetch_add(1, Ordering::Relaxed);
                return Err(err.into());
            }
        };

        let mut hops = hops_from_tracelb(&output.tracelb);
        if hops.is_empty() {
            debug!("empty test {}", test_name);
            return Ok(());
        }
        // Deepest hop first, same orientation as the legacy path.
        hops.reverse();

        let destination_ip = normalize_ip(&output.tracelb.dst);
        let deepest = &hops[0];
        let reached = deepest
            .links
            .iter()
            .any(|link| link.destination_ip == destination_ip);
        let last_valid_hop_text = if reached {
            EXPECTED_DEST_MARKER.to_string()
        } else {
            self.metrics
                .not_reach_destination
                .fetch_add(1, Ordering::Relaxed);
            deepest
                .links
                .first()
                .map(|link| link.destination_ip.clone())
                .unwrap_or_default()
        };

        let mut test = AssembledTest::new(
            synthetic_test_id(&self.task_file_name, test_name),
            hops,
            output.cycle_start.start_time,
            normalize_ip(&output.tracelb.src),
            destination_ip,
        );
        test.uuid = Some(output.metadata.uuid);
        test.start_time = Some(output.cycle_start.start_time);
        test.stop_time = Some(output.cycle_stop.stop_time);
        test.scamper_version = Some(output.tracelb.version);

        self.admit(test, last_valid_hop_text)
    }

    fn admit(
        &mut self,
        test: AssembledTest,
        last_valid_hop_text: String,
    ) -> Result<(), ProcessError> {
        let cached = CachedTestResult {
            test,
            last_valid_hop_text,
            metro: self.metro.clone(),
        };
        self.guard
            .admit(cached, &mut self.sink, &self.metrics)
            .map_err(ProcessError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecSink;

    const TASK: &str = "20170320T000000Z-mlab1-acc02-paris-traceroute-0000.tgz";
    const MEMBER: &str = "20170320T23:53:10Z-98.162.212.214-53849-64.86.132.75-42677.paris";

    fn reached_legacy() -> String {
        [
            "traceroute [(64.86.132.76:33461) -> (98.162.212.214:53849)], \
             protocol icmp, algo exhaustive, duration 19 s",
            " 1  P(6, 6) gw.example.net (172.25.252.166)  0.364/0.382/0.398/0.011 ms",
            " 2  P(6, 6) edge.example.net (98.162.212.214)  9.0/9.1/9.2/0.1 ms",
        ]
        .join("\n")
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            TestFormat::from_test_name("x.paris").unwrap(),
            TestFormat::LegacyParis
        );
        assert_eq!(
            TestFormat::from_test_name("x.jsonl").unwrap(),
            TestFormat::StructuredJsonl
        );
        assert!(matches!(
            TestFormat::from_test_name("x.pcap").unwrap_err(),
            FormatError::UnsupportedTest(_)
        ));
    }

    #[test]
    fn test_legacy_reached_destination_emits_immediately() {
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler
            .process_test(MEMBER, reached_legacy().as_bytes())
            .unwrap();

        // Reached tests skip the buffer entirely.
        assert_eq!(assembler.sink().tests.len(), 1);
        let test = &assembler.sink().tests[0];
        assert_eq!(test.source_ip, "64.86.132.76");
        assert_eq!(test.destination_ip, "98.162.212.214");
        assert_eq!(test.log_time, 1490053990);
        assert_eq!(test.test_id, format!("2017/03/20/{}", MEMBER));
        // Deepest hop first.
        assert_eq!(test.hops[0].links[0].destination_ip, "98.162.212.214");
        assert_eq!(assembler.metrics().not_reach_destination, 0);
    }

    #[test]
    fn test_legacy_unreached_is_buffered_and_counted() {
        let content = [
            "traceroute [(64.86.132.76:33461) -> (98.162.212.214:53849)], \
             protocol icmp, algo exhaustive, duration 19 s",
            " 1  P(6, 6) gw.example.net (172.25.252.166)  0.364/0.382/0.398/0.011 ms",
        ]
        .join("\n");
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler.process_test(MEMBER, content.as_bytes()).unwrap();

        assert!(assembler.sink().tests.is_empty());
        assert_eq!(assembler.metrics().not_reach_destination, 1);
        assert_eq!(assembler.metrics().reached_destination_mid_path, 0);

        let sink = assembler.finish().unwrap();
        assert_eq!(sink.tests.len(), 1);
    }

    #[test]
    fn test_legacy_destination_mid_path_is_counted() {
        let content = [
            "traceroute [(64.86.132.76:33461) -> (98.162.212.214:53849)], \
             protocol icmp, algo exhaustive, duration 19 s",
            " 1  P(6, 6) edge.example.net (98.162.212.214)  9.0/9.1/9.2/0.1 ms",
            " 2  P(6, 6) beyond.example.net (203.0.113.7)  11.0/11.1/11.2/0.1 ms",
        ]
        .join("\n");
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler.process_test(MEMBER, content.as_bytes()).unwrap();

        assert_eq!(assembler.metrics().not_reach_destination, 1);
        assert_eq!(assembler.metrics().reached_destination_mid_path, 1);
    }

    #[test]
    fn test_legacy_multibyte_member_name_yields_zero_log_time() {
        // Filename metadata is best effort; a member name with a
        // multibyte timestamp segment must parse fine with log_time 0.
        let member = "日日日日日日-98.162.212.214-53849-64.86.132.75-42677.paris";
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler
            .process_test(member, reached_legacy().as_bytes())
            .unwrap();

        assert_eq!(assembler.sink().tests.len(), 1);
        assert_eq!(assembler.sink().tests[0].log_time, 0);
    }

    #[test]
    fn test_legacy_bad_header_rejects_and_counts() {
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        let err = assembler
            .process_test(MEMBER, b"this is not a traceroute header\n")
            .unwrap_err();
        assert!(matches!(err, ProcessError::Format(_)));
        assert_eq!(assembler.metrics().corrupted_first_line, 1);
        assert!(assembler.sink().tests.is_empty());
    }

    #[test]
    fn test_legacy_empty_body_is_silently_skipped() {
        let content = "traceroute [(64.86.132.76:33461) -> (98.162.212.214:53849)], \
                       protocol icmp, algo exhaustive, duration 19 s\n";
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler.process_test(MEMBER, content.as_bytes()).unwrap();
        assert!(assembler.sink().tests.is_empty());
        assert_eq!(assembler.metrics().not_reach_destination, 0);
    }

    #[test]
    fn test_legacy_comment_lines_skipped() {
        let content = format!("# produced by paris-traceroute\n{}", reached_legacy());
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler.process_test(MEMBER, content.as_bytes()).unwrap();
        assert_eq!(assembler.sink().tests.len(), 1);
    }

    fn structured_jsonl(dst: &str, final_addr: &str) -> String {
        [
            r#"{"UUID":"ndt-4c6fb_1566050090_000000000004D64D","TracerouteCallerVersion":"bc092be","CachedResult":false,"CachedUUID":""}"#.to_string(),
            r#"{"type":"cycle-start","list_name":"l","id":1,"hostname":"h","start_time":1566691298}"#.to_string(),
            format!(
                r#"{{"type":"tracelb","version":"0.1","userid":0,"method":"icmp-echo","src":"180.87.97.101","dst":"{dst}","start":{{"sec":1566691298,"usec":0}},"probe_size":60,"firsthop":1,"attempts":3,"confidence":95,"tos":0,"gaplimit":3,"wait_timeout":5,"wait_probe":250,"probec":2,"probec_max":3000,"nodec":2,"linkc":2,"nodes":[{{"addr":"10.0.0.1","name":"gw","q_ttl":1,"linkc":1,"links":[[{{"addr":"{final_addr}","probes":[{{"tx":{{"sec":1,"usec":0}},"replyc":1,"ttl":2,"attempt":0,"flowid":1,"replies":[{{"rx":{{"sec":1,"usec":1}},"ttl":63,"rtt":2.5,"icmp_type":11,"icmp_code":0}}]}}]}}]]}}]}}"#
            ),
            r#"{"type":"cycle-stop","list_name":"l","id":1,"hostname":"h","stop_time":1566691541}"#.to_string(),
        ]
        .join("\n")
    }

    #[test]
    fn test_structured_reached_destination() {
        let content = structured_jsonl("203.0.113.9", "203.0.113.9");
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler
            .process_test("test.jsonl", content.as_bytes())
            .unwrap();

        assert_eq!(assembler.sink().tests.len(), 1);
        let test = &assembler.sink().tests[0];
        assert_eq!(test.uuid.as_deref(), Some("ndt-4c6fb_1566050090_000000000004D64D"));
        assert_eq!(test.start_time, Some(1566691298));
        assert_eq!(test.stop_time, Some(1566691541));
        assert_eq!(test.scamper_version.as_deref(), Some("0.1"));
        assert_eq!(test.log_time, 1566691298);
        assert_eq!(test.source_ip, "180.87.97.101");
        assert_eq!(assembler.metrics().not_reach_destination, 0);
    }

    #[test]
    fn test_structured_unreached_is_buffered() {
        let content = structured_jsonl("203.0.113.9", "10.0.0.77");
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        assembler
            .process_test("test.jsonl", content.as_bytes())
            .unwrap();

        assert!(assembler.sink().tests.is_empty());
        assert_eq!(assembler.metrics().not_reach_destination, 1);
        let sink = assembler.finish().unwrap();
        assert_eq!(sink.tests.len(), 1);
    }

    #[test]
    fn test_structured_corrupted_json_counts() {
        let mut assembler = TestAssembler::new(TASK, VecSink::new());
        let err = assembler
            .process_test("test.jsonl", b"%%%\n%%%\n%%%\n%%%\n")
            .unwrap_err();
        assert!(matches!(err, ProcessError::Format(_)));
        assert_eq!(assembler.metrics().corrupted_json_content, 1);
    }
}
