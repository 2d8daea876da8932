//! Collaborator seams: chain state, sender recovery, address reservation
//!
//! The pool never touches the state trie or signature cryptography directly;
//! it consumes these traits, and tests supply deterministic implementations.

use std::sync::Arc;

use dashmap::DashMap;
use fugue_primitives::{Address, H256, U256};
use fugue_types::{BlockHeader, SignedTransaction};
use tokio::sync::mpsc;

/// Nonce and balance of an account as read from state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountInfo {
    /// Account nonce
    pub nonce: u64,
    /// Account balance in wei
    pub balance: U256,
}

/// Read access to account state at one fixed state root
pub trait AccountReader: Send + Sync {
    /// Account info for `addr`; absent accounts read as zero.
    fn account(&self, addr: &Address) -> AccountInfo;
}

/// Read-only view of the chain the pool validates against
pub trait ChainState: Send + Sync {
    /// Currently accepted head
    fn latest_header(&self) -> BlockHeader;

    /// Account reader pinned to the given state root
    fn state_at(&self, root: H256) -> Arc<dyn AccountReader>;

    /// Stream of newly accepted heads; each receiver gets every head
    /// accepted after the call.
    fn subscribe_heads(&self) -> mpsc::Receiver<BlockHeader>;

    /// Projected base fee for a child of `parent`, `None` before fee-market
    /// activation.
    fn next_base_fee(&self, parent: &BlockHeader) -> Option<u128>;
}

/// Black-box signature-to-sender derivation
pub trait SenderRecoverer: Send + Sync {
    /// Derive the sender, `None` when the signature is invalid.
    fn recover(&self, tx: &SignedTransaction) -> Option<Address>;
}

/// Hash-keyed cache in front of a [`SenderRecoverer`]
///
/// Recovery is the most expensive part of admission; batches are warmed
/// through here before the pool takes its lock, so the locked path only
/// does map lookups.
pub struct SenderCache {
    recoverer: Arc<dyn SenderRecoverer>,
    cache: DashMap<H256, Address>,
}

impl SenderCache {
    /// Wrap a recoverer with an empty cache.
    pub fn new(recoverer: Arc<dyn SenderRecoverer>) -> Self {
        Self {
            recoverer,
            cache: DashMap::new(),
        }
    }

    /// Cached sender for `tx`, deriving and caching on a miss.
    pub fn recover(&self, hash: H256, tx: &SignedTransaction) -> Option<Address> {
        if let Some(cached) = self.cache.get(&hash) {
            return Some(*cached);
        }
        let sender = self.recoverer.recover(tx)?;
        self.cache.insert(hash, sender);
        Some(sender)
    }

    /// Derive and cache senders for a whole batch.
    pub fn warm(&self, txs: &[(H256, SignedTransaction)]) {
        for (hash, tx) in txs {
            let _ = self.recover(*hash, tx);
        }
    }

    /// Drop a cached entry once its transaction leaves the pool.
    pub fn forget(&self, hash: &H256) {
        self.cache.remove(hash);
    }

    /// Number of cached senders
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Exclusivity callback: at most one sub-pool tracks a given sender.
///
/// `hold` is invoked when an address first gains a tracked transaction and
/// may refuse it; `release` when its last transaction leaves.
pub trait AddressReserver: Send + Sync {
    /// Try to claim `addr` for this pool.
    fn hold(&self, addr: Address) -> bool;
    /// Give `addr` back.
    fn release(&self, addr: Address);
}
