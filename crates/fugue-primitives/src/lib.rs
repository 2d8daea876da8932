//! # fugue-primitives
//!
//! Primitive types for the FugueLedger blockchain.
//!
//! This crate provides the fundamental data types shared by every other
//! crate in the workspace: fixed-size hashes, addresses, and the scalar
//! aliases used for nonces, gas and block heights.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod hash;

pub use address::{Address, AddressError};
pub use hash::{Hash, HashError, H256};

// Re-export primitive-types for U256
pub use primitive_types::U256;

/// Block height type
pub type BlockHeight = u64;

/// Transaction nonce type
pub type Nonce = u64;

/// Gas type
pub type Gas = u64;
