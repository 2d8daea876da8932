//! # fugue-txpool
//!
//! Transaction admission and ordering for FugueLedger: validates incoming
//! transactions against chain state, keeps them partitioned per account
//! into executable (pending) and nonce-gapped (queued) sets, evicts the
//! cheapest remotes under capacity pressure, and persists local
//! transactions across restarts through an append-only journal.
//!
//! The [`TxPool`] front door is thread-safe; admission and queries run
//! against a shared store under a read/write lock, while chain-head resets
//! and gap promotion are serialized on a dedicated worker task.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod config;
mod error;
mod events;
mod journal;
mod list;
mod lookup;
mod pool;
mod priced;
mod tx;
mod validation;

pub mod testutil;

pub use chain::{
    AccountInfo, AccountReader, AddressReserver, ChainState, SenderCache, SenderRecoverer,
};
pub use config::PoolConfig;
pub use error::{TxPoolError, TxPoolResult};
pub use events::{PendingEvent, ReorgEvent, TxStatus};
pub use journal::TxJournal;
pub use pool::TxPool;
pub use tx::{num_slots, PooledTransaction, MAX_TX_SIZE, TX_SLOT_SIZE};
pub use validation::{intrinsic_gas, validate_basic, FEE_CEILING};
