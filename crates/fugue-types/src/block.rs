//! Block header type (the slice of it the execution layer shares)

use fugue_primitives::{BlockHeight, Gas, H256};
use serde::{Deserialize, Serialize};

/// Block header
///
/// Only the fields consumed outside the consensus core are carried here:
/// chain linkage, the state root for account lookups, and the gas/fee
/// envelope the transaction pool validates against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Parent block hash
    pub parent_hash: H256,
    /// State trie root after executing this block
    pub state_root: H256,
    /// Block number
    pub number: BlockHeight,
    /// Block gas limit
    pub gas_limit: Gas,
    /// Gas used by all transactions in the block
    pub gas_used: Gas,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    /// Base fee per gas (EIP-1559), None before activation
    pub base_fee_per_gas: Option<u128>,
}

impl BlockHeader {
    /// Genesis header (block 0)
    pub fn genesis() -> Self {
        Self {
            parent_hash: H256::ZERO,
            state_root: H256::ZERO,
            number: 0,
            gas_limit: 30_000_000,
            gas_used: 0,
            timestamp: 0,
            base_fee_per_gas: Some(1_000_000_000), // 1 gwei
        }
    }

    /// Content hash over the deterministic encoding
    pub fn hash(&self) -> H256 {
        crate::codec::header_hash(self)
    }

    /// Build the next header in the chain, inheriting limits
    pub fn child(&self, state_root: H256) -> Self {
        Self {
            parent_hash: self.hash(),
            state_root,
            number: self.number + 1,
            gas_limit: self.gas_limit,
            gas_used: 0,
            timestamp: self.timestamp + 12,
            base_fee_per_gas: self.base_fee_per_gas,
        }
    }
}
