//! Wire types shared by nodes, router and clients

use serde::{Deserialize, Serialize};

/// Header set on writes pushed by a primary's replication propagator.
/// Its value is the name of the sending node.
pub const REPLICATED_FROM_HEADER: &str = "x-custody-replicated-from";

/// One custody hand-off of a shipment batch.
///
/// Records are immutable and never deduplicated: submitting the same record
/// twice stores it twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub batch_id: String,
    pub sender: String,
    pub receiver: String,
    pub status: String,
}

impl TransactionRecord {
    pub fn new(
        batch_id: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            status: status.into(),
        }
    }
}

impl std::fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {} [{}]",
            self.batch_id, self.sender, self.receiver, self.status
        )
    }
}

/// Acknowledgment returned by a node's write RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAck {
    pub message: String,
}

/// Full contents of one node's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerData {
    pub node: String,
    pub entries: Vec<TransactionRecord>,
}

/// Router reply for an accepted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAccepted {
    pub message: String,
    pub node_used: String,
    pub epoch: u64,
}

/// Router reply for a rejected or failed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRejected {
    pub error: String,
    pub node_used: String,
}
