//! Structured scamper output: exactly four newline-delimited JSON records
//! per test, in fixed order — metadata, cycle-start, tracelb, cycle-stop.
//!
//! Each record is decoded strictly first; on failure the relaxed reader
//! retries before the record (and with it the file) is rejected.

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::model::{normalize_ip, Hop, HopLink, HopSource};
use crate::scamper::relaxed;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "TracerouteCallerVersion")]
    pub traceroute_caller_version: String,
    #[serde(rename = "CachedResult")]
    pub cached_result: bool,
    #[serde(rename = "CachedUUID")]
    pub cached_uuid: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleStart {
    #[serde(rename = "type")]
    pub kind: String,
    pub list_name: String,
    pub id: f64,
    pub hostname: String,
    pub start_time: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleStop {
    #[serde(rename = "type")]
    pub kind: String,
    pub list_name: String,
    pub id: f64,
    pub hostname: String,
    pub stop_time: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reply {
    pub rx: TimeVal,
    pub ttl: i64,
    pub rtt: f64,
    pub icmp_type: i64,
    pub icmp_code: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub tx: TimeVal,
    pub replyc: i64,
    pub ttl: i64,
    pub attempt: i64,
    pub flowid: i64,
    pub replies: Vec<Reply>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub addr: String,
    pub probes: Vec<Probe>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracelbNode {
    pub addr: String,
    pub name: String,
    pub q_ttl: i64,
    pub linkc: i64,
    /// Outer index is the flow (parallel path) discovered at this node.
    pub links: Vec<Vec<Link>>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tracelb {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub userid: f64,
    pub method: String,
    pub src: String,
    pub dst: String,
    pub start: TimeVal,
    pub probe_size: f64,
    pub firsthop: f64,
    pub attempts: f64,
    pub confidence: f64,
    pub tos: f64,
    pub gaplimit: f64,
    pub wait_timeout: f64,
    pub wait_probe: f64,
    pub probec: f64,
    pub probec_max: f64,
    pub nodec: f64,
    pub linkc: f64,
    pub nodes: Vec<TracelbNode>,
}

/// The four records of one structured test.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutput {
    pub metadata: Metadata,
    pub cycle_start: CycleStart,
    pub tracelb: Tracelb,
    pub cycle_stop: CycleStop,
}

/// Decode one record: strict first, relaxed retry on failure.
fn decode_record<T: DeserializeOwned>(line: &str, label: &str) -> Result<T, FormatError> {
    match serde_json::from_str::<T>(line) {
        Ok(record) => Ok(record),
        Err(strict_err) => {
            debug!("strict decode of {} failed ({}), retrying relaxed", label, strict_err);
            let value = relaxed::parse_value(line).map_err(|relaxed_err| {
                FormatError::CorruptedJson(format!("{}: {}; relaxed: {}", label, strict_err, relaxed_err))
            })?;
            serde_json::from_value(value).map_err(|err| {
                FormatError::CorruptedJson(format!("{}: {}", label, err))
            })
        }
    }
}

/// Parse a whole structured test file. A missing or empty uuid rejects the
/// file outright: no partial result is ever produced.
pub fn parse_structured(raw: &[u8]) -> Result<StructuredOutput, FormatError> {
    let content = String::from_utf8_lossy(raw);
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let mut next = |label: &str| -> Result<String, FormatError> {
        lines
            .next()
            .map(str::to_string)
            .ok_or_else(|| FormatError::CorruptedJson(format!("missing {} record", label)))
    };

    let metadata: Metadata = decode_record(&next("metadata")?, "metadata")?;
    let cycle_start: CycleStart = decode_record(&next("cycle-start")?, "cycle-start")?;
    let tracelb: Tracelb = decode_record(&next("tracelb")?, "tracelb")?;
    let cycle_stop: CycleStop = decode_record(&next("cycle-stop")?, "cycle-stop")?;

    if metadata.uuid.is_empty() {
        return Err(FormatError::MissingUuid);
    }

    Ok(StructuredOutput {
        metadata,
        cycle_start,
        tracelb,
        cycle_stop,
    })
}

/// Map tracelb nodes straight into hops; the structured format already
/// expresses parent/child through nesting, so no tree walk is needed.
/// A link's flow id is its first probe's `flowid`, falling back to the
/// enclosing links-array index.
pub fn hops_from_tracelb(tracelb: &Tracelb) -> Vec<Hop> {
    let mut hops = Vec::with_capacity(tracelb.nodes.len());
    for node in &tracelb.nodes {
        if node.links.is_empty() {
            continue;
        }
        let mut links = Vec::new();
        for (flow_index, flow_links) in node.links.iter().enumerate() {
            for link in flow_links {
                let rtts: Vec<f64> = link
                    .probes
                    .iter()
                    .flat_map(|p| p.replies.iter().map(|r| r.rtt))
                    .collect();
                let flow_id = link
                    .probes
                    .first()
                    .map(|p| p.flowid as i32)
                    .unwrap_or(flow_index as i32);
                links.push(HopLink {
                    destination_ip: normalize_ip(&link.addr),
                    round_trip_samples: rtts,
                    flow_id,
                });
            }
        }
        hops.push(Hop {
            source: HopSource {
                ip: normalize_ip(&node.addr),
                hostname: node.name.clone(),
            },
            links,
        });
    }
    hops
}
