//! Pooled transaction wrapper

use fugue_primitives::{Address, H256, U256};
use fugue_types::SignedTransaction;

/// Capacity unit: one slot is 32 KiB of encoded transaction
pub const TX_SLOT_SIZE: usize = 32 * 1024;

/// Admission ceiling on the encoded size of a single transaction
pub const MAX_TX_SIZE: usize = 4 * TX_SLOT_SIZE;

/// Number of capacity slots a transaction of `size` bytes occupies
pub fn num_slots(size: usize) -> usize {
    (size + TX_SLOT_SIZE - 1) / TX_SLOT_SIZE
}

/// A transaction admitted to the pool, with its derived metadata computed
/// once at admission time.
///
/// Immutable after construction; the pool passes these around as
/// `Arc<PooledTransaction>` and replaces rather than mutates.
#[derive(Clone, Debug)]
pub struct PooledTransaction {
    /// The signed transaction itself
    pub tx: SignedTransaction,
    /// Recovered sender address
    pub sender: Address,
    /// Content hash
    pub hash: H256,
    /// Encoded byte size
    pub size: usize,
    /// Capacity slots occupied
    pub slots: usize,
    /// Worst-case cost: gas limit * fee cap + value
    pub cost: U256,
}

impl PooledTransaction {
    /// Wrap a signed transaction with its derived metadata.
    pub fn new(tx: SignedTransaction, sender: Address) -> Self {
        let hash = tx.hash();
        let size = tx.encoded_size();
        let cost = tx.cost();
        Self {
            tx,
            sender,
            hash,
            size,
            slots: num_slots(size),
            cost,
        }
    }

    /// Transaction nonce
    pub fn nonce(&self) -> u64 {
        self.tx.nonce()
    }

    /// Declared gas limit
    pub fn gas_limit(&self) -> u64 {
        self.tx.gas_limit()
    }

    /// Maximum fee per gas
    pub fn fee_cap(&self) -> u128 {
        self.tx.fee_cap()
    }

    /// Maximum priority fee per gas
    pub fn tip_cap(&self) -> u128 {
        self.tx.tip_cap()
    }

    /// Tip the producer actually receives at `base_fee`, zero when the fee
    /// cap cannot even cover the base fee.
    pub fn effective_tip_or_zero(&self, base_fee: u128) -> u128 {
        self.tx.effective_tip(base_fee).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fugue_types::{LegacyTx, TxSignature};

    #[test]
    fn test_num_slots() {
        assert_eq!(num_slots(1), 1);
        assert_eq!(num_slots(TX_SLOT_SIZE), 1);
        assert_eq!(num_slots(TX_SLOT_SIZE + 1), 2);
        assert_eq!(num_slots(MAX_TX_SIZE), 4);
    }

    #[test]
    fn test_metadata_cached() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                nonce: 3,
                gas_price: 5,
                gas_limit: 21000,
                to: Some(Address::from_bytes([0x42; 20])),
                value: 17,
                data: Bytes::new(),
            },
            TxSignature::new(27, H256::from_bytes([1; 32]), H256::from_bytes([2; 32])),
        );
        let pooled = PooledTransaction::new(tx.clone(), Address::from_bytes([0x11; 20]));

        assert_eq!(pooled.hash, tx.hash());
        assert_eq!(pooled.size, tx.encoded_size());
        assert_eq!(pooled.slots, 1);
        assert_eq!(pooled.cost, U256::from(5u64 * 21000 + 17));
        assert_eq!(pooled.nonce(), 3);
        assert_eq!(pooled.fee_cap(), 5);
        assert_eq!(pooled.tip_cap(), 5);
    }

    #[test]
    fn test_effective_tip_or_zero() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                gas_price: 10,
                ..Default::default()
            },
            TxSignature::new(27, H256::from_bytes([1; 32]), H256::from_bytes([2; 32])),
        );
        let pooled = PooledTransaction::new(tx, Address::from_bytes([0x11; 20]));
        assert_eq!(pooled.effective_tip_or_zero(0), 10);
        assert_eq!(pooled.effective_tip_or_zero(10), 0);
        assert_eq!(pooled.effective_tip_or_zero(11), 0);
    }
}
