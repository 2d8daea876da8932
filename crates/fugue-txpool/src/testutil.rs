//! Deterministic collaborators and fixtures for tests
//!
//! The recoverer reads the sender address straight out of the signature's
//! `r` field, so tests can mint transactions for arbitrary accounts without
//! any cryptography. The mock chain keeps one global account table and
//! serves snapshots of it per state root, which is exactly the contract the
//! pool relies on across resets.

#![doc(hidden)]

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use fugue_primitives::{Address, H256, U256};
use fugue_types::{BlockHeader, DynamicFeeTx, LegacyTx, SignedTransaction, TxSignature};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::chain::{AccountInfo, AccountReader, ChainState, SenderRecoverer};

/// Deterministic test address from a single seed byte
pub fn test_addr(seed: u8) -> Address {
    Address::from_bytes([seed; 20])
}

fn signature_for(sender: Address) -> TxSignature {
    // Sender embedded in r; the tail kept non-zero so is_valid() holds.
    let mut r = [0xffu8; 32];
    r[..20].copy_from_slice(sender.as_bytes());
    TxSignature::new(27, H256::from_bytes(r), H256::from_bytes([0x5a; 32]))
}

/// Legacy transfer signed (in the mock sense) by `sender`
pub fn legacy_tx(sender: Address, nonce: u64, gas_price: u128, value: u128) -> SignedTransaction {
    SignedTransaction::new_legacy(
        LegacyTx {
            nonce,
            gas_price,
            gas_limit: 21000,
            to: Some(test_addr(0xee)),
            value,
            data: Bytes::new(),
        },
        signature_for(sender),
    )
}

/// Dynamic-fee transfer signed by `sender`
pub fn dynamic_tx(
    sender: Address,
    nonce: u64,
    tip_cap: u128,
    fee_cap: u128,
    value: u128,
) -> SignedTransaction {
    SignedTransaction::new_dynamic_fee(
        DynamicFeeTx {
            chain_id: 1,
            nonce,
            max_priority_fee_per_gas: tip_cap,
            max_fee_per_gas: fee_cap,
            gas_limit: 21000,
            to: Some(test_addr(0xee)),
            value,
            data: Bytes::new(),
            access_list: vec![],
        },
        signature_for(sender),
    )
}

/// Recoverer decoding the sender from the signature's `r` field
pub struct MockRecoverer;

impl SenderRecoverer for MockRecoverer {
    fn recover(&self, tx: &SignedTransaction) -> Option<Address> {
        if !tx.signature.is_valid() {
            return None;
        }
        Address::from_slice(&tx.signature.r.as_bytes()[..20]).ok()
    }
}

#[derive(Clone)]
struct Snapshot {
    accounts: HashMap<Address, AccountInfo>,
}

impl AccountReader for Snapshot {
    fn account(&self, addr: &Address) -> AccountInfo {
        self.accounts.get(addr).copied().unwrap_or_default()
    }
}

/// In-memory chain with a single mutable account table
pub struct MockChain {
    head: RwLock<BlockHeader>,
    accounts: RwLock<HashMap<Address, AccountInfo>>,
    head_subs: Mutex<Vec<mpsc::Sender<BlockHeader>>>,
}

impl MockChain {
    /// Chain at genesis with the given base fee
    pub fn new(base_fee: Option<u128>) -> Self {
        let mut head = BlockHeader::genesis();
        head.base_fee_per_gas = base_fee;
        Self {
            head: RwLock::new(head),
            accounts: RwLock::new(HashMap::new()),
            head_subs: Mutex::new(Vec::new()),
        }
    }

    /// Set an account's balance (creating it as needed)
    pub fn fund(&self, addr: Address, balance: U256) {
        self.accounts.write().entry(addr).or_default().balance = balance;
    }

    /// Set an account's nonce
    pub fn set_nonce(&self, addr: Address, nonce: u64) {
        self.accounts.write().entry(addr).or_default().nonce = nonce;
    }

    /// Build the next head over the current one
    pub fn next_header(&self) -> BlockHeader {
        self.head.read().child(H256::from_bytes([0xab; 32]))
    }

    /// Accept `header` as the new head and notify subscribers
    pub async fn accept(&self, header: BlockHeader) {
        *self.head.write() = header.clone();
        let subs = self.head_subs.lock().clone();
        for sub in subs {
            let _ = sub.send(header.clone()).await;
        }
    }
}

impl ChainState for MockChain {
    fn latest_header(&self) -> BlockHeader {
        self.head.read().clone()
    }

    fn state_at(&self, _root: H256) -> Arc<dyn AccountReader> {
        Arc::new(Snapshot {
            accounts: self.accounts.read().clone(),
        })
    }

    fn subscribe_heads(&self) -> mpsc::Receiver<BlockHeader> {
        let (tx, rx) = mpsc::channel(16);
        self.head_subs.lock().push(tx);
        rx
    }

    fn next_base_fee(&self, parent: &BlockHeader) -> Option<u128> {
        // Flat fee market: the projected base fee is the parent's.
        parent.base_fee_per_gas
    }
}
