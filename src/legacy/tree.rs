//! Hop emission: turn a finished node history into an ordered hop sequence.

use crate::model::{Hop, HopLink, HopSource, Node};

/// Walk the completed node history in reverse insertion order and emit one
/// hop per node. Nodes are appended breadth-first per hop line, so the
/// reverse walk visits deeper hops first, which is the order the output
/// expects (index 0 = deepest hop). The walk stops at the first node with
/// no parent, which is attached directly to the measurement server.
pub fn build_hops(all_nodes: &[Node], server_ip: &str) -> Vec<Hop> {
    let mut hops = Vec::with_capacity(all_nodes.len());
    for node in all_nodes.iter().rev() {
        let link = HopLink {
            destination_ip: node.ip.clone(),
            round_trip_samples: node.round_trip_samples.clone(),
            flow_id: node.flow,
        };
        match &node.parent_ip {
            Some(parent_ip) => {
                hops.push(Hop {
                    source: HopSource {
                        ip: parent_ip.clone(),
                        hostname: node.parent_hostname.clone().unwrap_or_default(),
                    },
                    links: vec![link],
                });
            }
            None => {
                hops.push(Hop {
                    source: HopSource {
                        ip: server_ip.to_string(),
                        hostname: String::new(),
                    },
                    links: vec![link],
                });
                break;
            }
        }
    }
    hops
}
