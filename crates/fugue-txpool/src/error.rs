//! Transaction pool error types

use fugue_primitives::{H256, U256};
use thiserror::Error;

/// Transaction pool errors
///
/// Every admission failure is one of these variants; they are returned to
/// the submitter and never treated as a fault of the pool itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxPoolError {
    /// Transaction already tracked by the pool
    #[error("transaction already known: {0:?}")]
    AlreadyKnown(H256),

    /// Encoded size above the admission ceiling
    #[error("oversized data: {size} > {limit}")]
    OversizedData {
        /// Encoded transaction size
        size: usize,
        /// Maximum allowed size
        limit: usize,
    },

    /// Sender could not be derived from the signature
    #[error("invalid sender")]
    InvalidSender,

    /// Tip below the pool's configured floor, or cheaper than everything
    /// evictable while the pool is full
    #[error("transaction underpriced: tip {tip} < floor {floor}")]
    Underpriced {
        /// Offered tip
        tip: u128,
        /// Current minimum accepted tip
        floor: u128,
    },

    /// Replacement at an occupied nonce without a sufficient price bump
    #[error("replacement transaction underpriced: fee cap {old_fee_cap} -> {new_fee_cap}, tip {old_tip} -> {new_tip}")]
    ReplaceUnderpriced {
        /// Fee cap of the resident transaction
        old_fee_cap: u128,
        /// Fee cap of the incoming transaction
        new_fee_cap: u128,
        /// Tip cap of the resident transaction
        old_tip: u128,
        /// Tip cap of the incoming transaction
        new_tip: u128,
    },

    /// A future-nonce transaction tried to displace an executable one
    #[error("future transaction attempts to replace pending")]
    FutureReplacePending,

    /// Fee cap below the tip cap
    #[error("tip above fee cap: tip {tip} > fee cap {fee_cap}")]
    TipAboveFeeCap {
        /// Tip cap
        tip: u128,
        /// Fee cap
        fee_cap: u128,
    },

    /// Tip cap beyond the sanity ceiling
    #[error("tip cap absurdly high: {0}")]
    TipVeryHigh(u128),

    /// Fee cap beyond the sanity ceiling
    #[error("fee cap absurdly high: {0}")]
    FeeCapVeryHigh(u128),

    /// Declared gas below the intrinsic cost of the payload
    #[error("intrinsic gas too low: need {need}, have {have}")]
    IntrinsicGas {
        /// Intrinsic gas of the transaction
        need: u64,
        /// Declared gas limit
        have: u64,
    },

    /// Declared gas above the block gas limit
    #[error("exceeds block gas limit: {gas_limit} > {block_limit}")]
    GasLimit {
        /// Transaction gas limit
        gas_limit: u64,
        /// Block gas limit
        block_limit: u64,
    },

    /// Nonce below the account's current state nonce
    #[error("nonce too low: state {state}, tx {tx}")]
    NonceTooLow {
        /// Account nonce in state
        state: u64,
        /// Transaction nonce
        tx: u64,
    },

    /// Balance below the worst-case cost of the transaction
    #[error("insufficient funds: cost {cost} > balance {balance}")]
    InsufficientFunds {
        /// Worst-case cost (gas * fee cap + value)
        cost: U256,
        /// Account balance
        balance: U256,
    },

    /// Sender address is held by another sub-pool
    #[error("address already reserved")]
    AlreadyReserved,

    /// Journal I/O failure (construction and shutdown paths only)
    #[error("journal error: {0}")]
    Journal(String),
}

/// Result type for transaction pool operations
pub type TxPoolResult<T> = Result<T, TxPoolError>;
