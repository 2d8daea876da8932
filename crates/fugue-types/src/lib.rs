//! # fugue-types
//!
//! Core types for FugueLedger: signed transactions (legacy and EIP-1559
//! dynamic-fee), block headers, and the deterministic binary codec used for
//! content hashing and byte-size accounting.
//!
//! The codec is intentionally independent of any wire-level (RLP) encoding;
//! it exists so every component derives identical hashes and sizes for the
//! same transaction value.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod block;
mod codec;
mod transaction;

pub use block::BlockHeader;
pub use codec::{encode_header, encode_tx, header_hash, tx_hash};
pub use transaction::{
    AccessListItem, DynamicFeeTx, LegacyTx, SignedTransaction, TransactionBody, TxSignature,
    TxType,
};
