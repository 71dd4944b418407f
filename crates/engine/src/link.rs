//! A directed edge between two node ports.

use serde::{Deserialize, Serialize};

use crate::node::LinkType;

/// A directed edge from `(source_node, source_port)` to
/// `(target_node, target_port)`, carrying the link-type tag of the
/// source port.
///
/// Endpoints are stored by node-name string rather than by pointer —
/// the `Graph` owns all nodes, and links are two flat maps keyed by
/// strings, which sidesteps any ownership-cycle concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source_node: String,
    pub source_port: String,
    pub target_node: String,
    pub target_port: String,
    pub link_type: LinkType,
}
