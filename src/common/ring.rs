//! Fixed node membership
//!
//! The ring is defined at deployment time and never changes while a process
//! runs. Its order matters: index 0 is the initial primary and failover walks
//! the ring forward.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One ledger node as seen by the coordination layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Identifier published in the primary pointer
    pub name: String,
    /// Base URL of the write/read API
    pub api_url: String,
    /// Full URL of the liveness probe
    pub health_url: String,
}

impl NodeDescriptor {
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        health_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_url: api_url.into(),
            health_url: health_url.into(),
        }
    }

    /// URL of the write endpoint
    pub fn record_url(&self) -> String {
        format!("{}/record", self.api_url.trim_end_matches('/'))
    }

    /// URL of the read endpoint
    pub fn ledger_url(&self) -> String {
        format!("{}/ledger", self.api_url.trim_end_matches('/'))
    }
}

impl std::fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.api_url)
    }
}

/// Ordered, immutable node membership. Cheap to clone.
///
/// A ring always holds at least one node with a unique, non-blank name.
#[derive(Debug, Clone)]
pub struct NodeRing {
    nodes: Arc<[NodeDescriptor]>,
}

impl NodeRing {
    pub fn new(nodes: Vec<NodeDescriptor>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::InvalidConfig("cluster.nodes is empty".into()));
        }
        let mut seen = HashSet::new();
        for node in &nodes {
            if node.name.trim().is_empty() {
                return Err(Error::InvalidConfig("node name must not be empty".into()));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate node name: {}",
                    node.name
                )));
            }
        }
        Ok(Self {
            nodes: nodes.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeDescriptor> {
        self.nodes.get(index)
    }

    /// The node a reader falls back to when no primary was published.
    pub fn default_primary(&self) -> &NodeDescriptor {
        &self.nodes[0]
    }

    pub fn find(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Every member except `name`, in ring order.
    pub fn peers_of(&self, name: &str) -> Vec<NodeDescriptor> {
        self.nodes
            .iter()
            .filter(|n| n.name != name)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> NodeRing {
        NodeRing::new(vec![
            NodeDescriptor::new("A", "http://a:1/", "http://a:2/health"),
            NodeDescriptor::new("B", "http://b:1", "http://b:2/health"),
            NodeDescriptor::new("C", "http://c:1", "http://c:2/health"),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_ring_rejected() {
        assert!(matches!(
            NodeRing::new(vec![]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_duplicate_or_blank_names_rejected() {
        let dup = NodeRing::new(vec![
            NodeDescriptor::new("A", "http://a:1", "http://a:2/health"),
            NodeDescriptor::new("A", "http://b:1", "http://b:2/health"),
        ]);
        assert!(dup.is_err());
        let blank = NodeRing::new(vec![NodeDescriptor::new(" ", "http://a:1", "http://a:2")]);
        assert!(blank.is_err());
    }

    #[test]
    fn test_lookup() {
        let ring = ring();
        assert_eq!(ring.default_primary().name, "A");
        assert_eq!(ring.index_of("C"), Some(2));
        assert!(ring.find("D").is_none());
    }

    #[test]
    fn test_peers_exclude_self() {
        let peers = ring().peers_of("B");
        let names: Vec<_> = peers.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let ring = ring();
        assert_eq!(ring.get(0).unwrap().record_url(), "http://a:1/record");
        assert_eq!(ring.get(1).unwrap().ledger_url(), "http://b:1/ledger");
    }
}
