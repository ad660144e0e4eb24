//! Verify replica convergence
//!
//! Eventual replication is fire-and-forget, so a replica can miss records
//! without anyone noticing. This reads every ledger and reports, per node,
//! the records some other node holds more copies of.

use crate::client::NodeApi;
use crate::common::{NodeRing, TransactionRecord};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub node: String,
    pub records: usize,
    /// Records this node lacks, one entry per missing copy
    pub missing: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub nodes: Vec<NodeReport>,
    /// Nodes whose ledger could not be read, with the error
    pub unreachable: Vec<(String, String)>,
}

impl VerifyReport {
    pub fn is_converged(&self) -> bool {
        self.unreachable.is_empty() && self.nodes.iter().all(|n| n.missing.is_empty())
    }

    pub fn total_missing(&self) -> usize {
        self.nodes.iter().map(|n| n.missing.len()).sum()
    }
}

fn count(entries: &[TransactionRecord]) -> HashMap<&TransactionRecord, usize> {
    let mut counts = HashMap::new();
    for entry in entries {
        *counts.entry(entry).or_insert(0) += 1;
    }
    counts
}

pub async fn verify_cluster(ring: &NodeRing, api: &dyn NodeApi) -> VerifyReport {
    tracing::info!("Starting cluster verification across {} nodes", ring.len());

    let fetches = ring.iter().map(|node| async move {
        (node.name.clone(), api.ledger(node).await)
    });

    let mut ledgers = Vec::new();
    let mut unreachable = Vec::new();
    for (name, result) in join_all(fetches).await {
        match result {
            Ok(data) => ledgers.push((name, data.entries)),
            Err(e) => {
                tracing::warn!(node = %name, "Could not read ledger: {}", e);
                unreachable.push((name, e.to_string()));
            }
        }
    }

    let counts: Vec<_> = ledgers.iter().map(|(_, entries)| count(entries)).collect();

    // Highest copy count of each record across reachable nodes, in first-seen order
    let mut expected: Vec<(&TransactionRecord, usize)> = Vec::new();
    let mut index: HashMap<&TransactionRecord, usize> = HashMap::new();
    for (_, entries) in &ledgers {
        for entry in entries {
            if !index.contains_key(entry) {
                index.insert(entry, expected.len());
                expected.push((entry, 0));
            }
        }
    }
    for node_counts in &counts {
        for (record, n) in node_counts {
            let slot = &mut expected[index[record]];
            slot.1 = slot.1.max(*n);
        }
    }

    let nodes = ledgers
        .iter()
        .zip(&counts)
        .map(|((name, entries), local)| {
            let mut missing = Vec::new();
            for (record, want) in &expected {
                let have = local.get(record).copied().unwrap_or(0);
                for _ in have..*want {
                    missing.push((*record).clone());
                }
            }
            if !missing.is_empty() {
                tracing::warn!(node = %name, "{} records missing", missing.len());
            }
            NodeReport {
                node: name.clone(),
                records: entries.len(),
                missing,
            }
        })
        .collect();

    let report = VerifyReport { nodes, unreachable };
    tracing::info!(
        converged = report.is_converged(),
        "Verification complete: {} missing records",
        report.total_missing()
    );
    report
}
