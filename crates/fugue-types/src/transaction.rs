//! Transaction types for FugueLedger

use bytes::Bytes;
use fugue_primitives::{Address, Gas, Nonce, H256, U256};
use serde::{Deserialize, Serialize};

/// Transaction type identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    /// Legacy transaction (pre-EIP-2718)
    #[default]
    Legacy = 0,
    /// EIP-2930 access list transaction
    AccessList = 1,
    /// EIP-1559 dynamic fee transaction
    DynamicFee = 2,
}

/// Legacy transaction (Type 0)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTx {
    /// Transaction nonce
    pub nonce: Nonce,
    /// Gas price in wei
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: Gas,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Value to transfer in wei
    pub value: u128,
    /// Input data
    pub data: Bytes,
}

/// EIP-1559 dynamic fee transaction (Type 2)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicFeeTx {
    /// Chain ID
    pub chain_id: u64,
    /// Transaction nonce
    pub nonce: Nonce,
    /// Max priority fee per gas (tip)
    pub max_priority_fee_per_gas: u128,
    /// Max fee per gas
    pub max_fee_per_gas: u128,
    /// Gas limit
    pub gas_limit: Gas,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Value to transfer in wei
    pub value: u128,
    /// Input data
    pub data: Bytes,
    /// Access list
    pub access_list: Vec<AccessListItem>,
}

/// Access list item (address + storage keys)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessListItem {
    /// Account address
    pub address: Address,
    /// Storage keys
    pub storage_keys: Vec<H256>,
}

/// Signature components
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    /// Recovery ID (v value)
    pub v: u64,
    /// R component
    pub r: H256,
    /// S component
    pub s: H256,
}

impl TxSignature {
    /// Create a new signature
    pub fn new(v: u64, r: H256, s: H256) -> Self {
        Self { v, r, s }
    }

    /// Check if signature is valid (non-zero r and s)
    pub fn is_valid(&self) -> bool {
        !self.r.is_zero() && !self.s.is_zero()
    }
}

/// Transaction body (unsigned)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionBody {
    /// Legacy transaction
    Legacy(LegacyTx),
    /// EIP-1559 transaction
    DynamicFee(DynamicFeeTx),
}

/// Signed transaction
///
/// Treated as an immutable value everywhere: the content hash and encoded
/// size are derived on demand (`hash()`, `encoded_size()`) and cached by
/// whoever needs them repeatedly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Transaction type
    pub tx_type: TxType,
    /// Transaction body
    pub tx: TransactionBody,
    /// Signature
    pub signature: TxSignature,
}

impl SignedTransaction {
    /// Create a new signed legacy transaction
    pub fn new_legacy(tx: LegacyTx, signature: TxSignature) -> Self {
        Self {
            tx_type: TxType::Legacy,
            tx: TransactionBody::Legacy(tx),
            signature,
        }
    }

    /// Create a new signed EIP-1559 transaction
    pub fn new_dynamic_fee(tx: DynamicFeeTx, signature: TxSignature) -> Self {
        Self {
            tx_type: TxType::DynamicFee,
            tx: TransactionBody::DynamicFee(tx),
            signature,
        }
    }

    /// Get transaction nonce
    pub fn nonce(&self) -> Nonce {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.nonce,
            TransactionBody::DynamicFee(tx) => tx.nonce,
        }
    }

    /// Get gas limit
    pub fn gas_limit(&self) -> Gas {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.gas_limit,
            TransactionBody::DynamicFee(tx) => tx.gas_limit,
        }
    }

    /// Get recipient address
    pub fn to(&self) -> Option<&Address> {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.to.as_ref(),
            TransactionBody::DynamicFee(tx) => tx.to.as_ref(),
        }
    }

    /// Get transfer value
    pub fn value(&self) -> u128 {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.value,
            TransactionBody::DynamicFee(tx) => tx.value,
        }
    }

    /// Get input data
    pub fn data(&self) -> &Bytes {
        match &self.tx {
            TransactionBody::Legacy(tx) => &tx.data,
            TransactionBody::DynamicFee(tx) => &tx.data,
        }
    }

    /// Get the access list (empty for legacy transactions)
    pub fn access_list(&self) -> &[AccessListItem] {
        match &self.tx {
            TransactionBody::Legacy(_) => &[],
            TransactionBody::DynamicFee(tx) => &tx.access_list,
        }
    }

    /// Check if this is a contract creation transaction
    pub fn is_contract_creation(&self) -> bool {
        self.to().is_none()
    }

    /// Maximum fee per gas the sender is willing to pay.
    ///
    /// Legacy transactions pay exactly their gas price, so that is both the
    /// cap and the tip.
    pub fn fee_cap(&self) -> u128 {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.gas_price,
            TransactionBody::DynamicFee(tx) => tx.max_fee_per_gas,
        }
    }

    /// Maximum priority fee (tip) per gas.
    pub fn tip_cap(&self) -> u128 {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.gas_price,
            TransactionBody::DynamicFee(tx) => tx.max_priority_fee_per_gas,
        }
    }

    /// Get effective gas price for the given base fee
    ///
    /// Returns `None` if `base_fee > fee_cap` (transaction cannot be
    /// included in a block with this base fee).
    pub fn effective_gas_price(&self, base_fee: u128) -> Option<u128> {
        let fee_cap = self.fee_cap();
        if base_fee > fee_cap {
            return None;
        }
        let priority_fee = self.tip_cap().min(fee_cap - base_fee);
        Some(base_fee + priority_fee)
    }

    /// Miner tip actually received at the given base fee
    ///
    /// `None` when the fee cap does not reach the base fee.
    pub fn effective_tip(&self, base_fee: u128) -> Option<u128> {
        let fee_cap = self.fee_cap();
        if base_fee > fee_cap {
            return None;
        }
        Some(self.tip_cap().min(fee_cap - base_fee))
    }

    /// Upper bound on the funds this transaction can consume:
    /// `gas_limit * fee_cap + value`, in 256-bit arithmetic so the
    /// multiplication cannot overflow.
    pub fn cost(&self) -> U256 {
        U256::from(self.gas_limit()) * U256::from(self.fee_cap()) + U256::from(self.value())
    }

    /// Total encoded byte size (deterministic codec, not RLP)
    pub fn encoded_size(&self) -> usize {
        crate::codec::encode_tx(self).len()
    }

    /// Content hash over the deterministic encoding
    pub fn hash(&self) -> H256 {
        crate::codec::tx_hash(self)
    }
}

impl Default for LegacyTx {
    fn default() -> Self {
        Self {
            nonce: 0,
            gas_price: 0,
            gas_limit: 21000,
            to: None,
            value: 0,
            data: Bytes::new(),
        }
    }
}
