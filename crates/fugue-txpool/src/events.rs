//! Broadcast events emitted by the pool

use std::sync::Arc;

use fugue_types::BlockHeader;

use crate::tx::PooledTransaction;

/// New executable transactions became available (freshly admitted into
/// pending or promoted out of queued).
#[derive(Clone, Debug)]
pub struct PendingEvent {
    /// The newly executable transactions
    pub txs: Vec<Arc<PooledTransaction>>,
}

/// A chain-head reset finished and the pool is consistent with `head`.
#[derive(Clone, Debug)]
pub struct ReorgEvent {
    /// The head the pool was reset against
    pub head: BlockHeader,
}

/// Where a transaction currently sits, as reported by status queries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Not tracked by the pool
    Unknown,
    /// Tracked but not yet executable (nonce gap)
    Queued,
    /// Executable against the current account nonce
    Pending,
}
