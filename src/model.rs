use serde::{Deserialize, Serialize};

/// Flow id for a node discovered before any multi-path split.
pub const SINGLE_FLOW: i32 = -1;

/// Marker stored in `last_valid_hop_text` when a test's final hop landed on
/// its declared destination. Such results can never pollute (or be polluted
/// by) a neighboring test, so the buffer skips them entirely.
pub const EXPECTED_DEST_MARKER: &str = "ExpectedDestIP";

/// Collapse the triple-colon artifact some producers emit in IPv6 addresses
/// (e.g. `2001:db8:::1`). Applied wherever an address string enters the model.
pub fn normalize_ip(raw: &str) -> String {
    if raw.contains(":::") {
        raw.replace(":::", "::")
    } else {
        raw.to_string()
    }
}

/// One discovered node in a test's hop graph.
///
/// Nodes are append-only: the history is grown one hop line at a time and
/// never mutated after a node is pushed. Parent linkage is by copied
/// identifying fields, not by reference, so the history is trivially
/// cloneable and serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: String,
    pub ip: String,
    pub round_trip_samples: Vec<f64>,
    /// `None` only for the root node attached directly to the server.
    pub parent_ip: Option<String>,
    pub parent_hostname: Option<String>,
    /// `SINGLE_FLOW` (-1) for an unflowed lineage; non-negative values
    /// identify one of several parallel paths at a multi-path hop.
    pub flow: i32,
}

/// The near end of a hop: the router (or server) the links depart from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopSource {
    pub ip: String,
    pub hostname: String,
}

/// One observed path segment out of a hop source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopLink {
    pub destination_ip: String,
    pub round_trip_samples: Vec<f64>,
    pub flow_id: i32,
}

/// A storage-ready hop: a source endpoint plus the links observed from it.
/// Produced only at emission time; never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub source: HopSource,
    pub links: Vec<HopLink>,
}

/// The final record handed to the sink, one per successfully parsed test.
///
/// `hops[0]` is the deepest (most recently discovered) hop. The optional
/// fields are populated only by the structured scamper format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledTest {
    pub test_id: String,
    pub hops: Vec<Hop>,
    pub log_time: i64,
    pub source_ip: String,
    pub destination_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scamper_version: Option<String>,
}

impl AssembledTest {
    pub fn new(
        test_id: String,
        hops: Vec<Hop>,
        log_time: i64,
        source_ip: String,
        destination_ip: String,
    ) -> Self {
        Self {
            test_id,
            hops,
            log_time,
            source_ip,
            destination_ip,
            uuid: None,
            start_time: None,
            stop_time: None,
            scamper_version: None,
        }
    }
}

/// A completed test held back by the pollution buffer.
///
/// Owned exclusively by the buffer until it is either emitted (exactly once)
/// or discarded (exactly once).
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTestResult {
    pub test: AssembledTest,
    /// Either `EXPECTED_DEST_MARKER` or the literal last hop line that
    /// parsed successfully; the buffer's substring check runs against it.
    pub last_valid_hop_text: String,
    pub metro: String,
}

impl CachedTestResult {
    pub fn reached_destination(&self) -> bool {
        self.last_valid_hop_text == EXPECTED_DEST_MARKER
    }

    pub fn into_test(self) -> AssembledTest {
        self.test
    }
}
