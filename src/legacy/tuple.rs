//! Tuple processing: one 4-field hop tuple grows the node history.
//!
//! A tuple is `(hostname, ip_field, rtt_field, "ms")`. The ip field is
//! either a single address like `(172.25.252.166)` or a multi-flow form
//! like `(72.14.218.190):0,2,3,4` naming the flows that traversed it.

use crate::error::FormatError;
use crate::legacy::line::Protocol;
use crate::model::{Node, SINGLE_FLOW};

/// True when no node with the same (hostname, ip, flow) triple is already
/// in the list. The leaf frontier never holds duplicates; the full history
/// keeps every discovered path.
pub fn is_unique(node: &Node, list: &[Node]) -> bool {
    !list.iter().any(|existing| {
        existing.hostname == node.hostname && existing.ip == node.ip && existing.flow == node.flow
    })
}

fn parse_rtts(field: &str, protocol: Protocol) -> Result<Vec<f64>, FormatError> {
    let expected = match protocol {
        Protocol::Icmp => 4,
        Protocol::Udp | Protocol::Tcp => 1,
    };
    let tokens: Vec<&str> = field.split('/').collect();
    if tokens.len() != expected {
        return Err(FormatError::MalformedTuple(format!(
            "expected {} rtt value(s) for {}, got {:?}",
            expected,
            protocol.as_str(),
            field
        )));
    }
    tokens
        .iter()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| FormatError::MalformedTuple(format!("non-numeric rtt: {}", t)))
        })
        .collect()
}

/// Consume one tuple against the current leaf frontier, appending zero or
/// more child nodes to `all_nodes` and the deduplicated frontier being
/// built in `new_leaves`.
///
/// The very first tuple of a test creates the root node (no parent, flow
/// -1) regardless of any flow list on it.
pub fn process_tuple(
    tuple: &[&str; 4],
    protocol: Protocol,
    current_leaves: &[Node],
    all_nodes: &mut Vec<Node>,
    new_leaves: &mut Vec<Node>,
) -> Result<(), FormatError> {
    if tuple[3] != "ms" {
        return Err(FormatError::MalformedTuple(format!(
            "expected trailing 'ms', got {:?}",
            tuple[3]
        )));
    }
    let rtts = parse_rtts(tuple[2], protocol)?;

    let segments: Vec<&str> = tuple[1].split(':').collect();
    let ip = segments[0]
        .trim_start_matches('(')
        .trim_end_matches(')')
        .to_string();

    if all_nodes.is_empty() {
        let root = Node {
            hostname: tuple[0].to_string(),
            ip,
            round_trip_samples: rtts,
            parent_ip: None,
            parent_hostname: None,
            flow: SINGLE_FLOW,
        };
        all_nodes.push(root.clone());
        new_leaves.push(root);
        return Ok(());
    }

    match segments.len() {
        1 => {
            // Single-flow hop: one child under every current leaf.
            for leaf in current_leaves {
                let child = Node {
                    hostname: tuple[0].to_string(),
                    ip: ip.clone(),
                    round_trip_samples: rtts.clone(),
                    parent_ip: Some(leaf.ip.clone()),
                    parent_hostname: Some(leaf.hostname.clone()),
                    flow: SINGLE_FLOW,
                };
                if is_unique(&child, new_leaves) {
                    new_leaves.push(child.clone());
                }
                all_nodes.push(child);
            }
        }
        2 => {
            // Multi-flow hop: one child per listed flow, attached to every
            // leaf that is unconstrained (-1) or already on that flow.
            let flows = segments[1]
                .split(',')
                .map(|f| {
                    f.parse::<i32>().map_err(|_| {
                        FormatError::MalformedTuple(format!("non-numeric flow id: {}", f))
                    })
                })
                .collect::<Result<Vec<i32>, FormatError>>()?;
            for flow in flows {
                for leaf in current_leaves {
                    if leaf.flow == SINGLE_FLOW || leaf.flow == flow {
                        let child = Node {
                            hostname: tuple[0].to_string(),
                            ip: ip.clone(),
                            round_trip_samples: rtts.clone(),
                            parent_ip: Some(leaf.ip.clone()),
                            parent_hostname: Some(leaf.hostname.clone()),
                            flow,
                        };
                        if is_unique(&child, new_leaves) {
                            new_leaves.push(child.clone());
                        }
                        all_nodes.push(child);
                    }
                }
            }
        }
        _ => {
            return Err(FormatError::MalformedTuple(format!(
                "bad ip field: {}",
                tuple[1]
            )));
        }
    }
    Ok(())
}
