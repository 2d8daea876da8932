//! Stateless admission checks and intrinsic gas

use fugue_types::SignedTransaction;

use crate::error::{TxPoolError, TxPoolResult};
use crate::tx::MAX_TX_SIZE;

/// Sanity ceiling on fee fields: no sane transaction prices gas anywhere
/// near 2^96 wei, and staying under it keeps `gas * fee_cap + value`
/// comfortably inside 256-bit cost arithmetic.
pub const FEE_CEILING: u128 = 1 << 96;

/// Intrinsic gas cost constants
pub mod cost {
    /// Base cost of any transaction
    pub const TX: u64 = 21000;
    /// Base cost of a contract-creation transaction
    pub const TX_CREATE: u64 = 53000;
    /// Per zero byte of payload
    pub const TX_DATA_ZERO: u64 = 4;
    /// Per non-zero byte of payload
    pub const TX_DATA_NONZERO: u64 = 16;
    /// Per access-list address
    pub const ACCESS_LIST_ADDRESS: u64 = 2400;
    /// Per access-list storage key
    pub const ACCESS_LIST_STORAGE_KEY: u64 = 1900;
}

/// Gas consumed before a single EVM opcode runs: base cost, payload bytes,
/// and access-list entries.
pub fn intrinsic_gas(tx: &SignedTransaction) -> u64 {
    let mut gas = if tx.is_contract_creation() {
        cost::TX_CREATE
    } else {
        cost::TX
    };
    for byte in tx.data().iter() {
        gas = gas.saturating_add(if *byte == 0 {
            cost::TX_DATA_ZERO
        } else {
            cost::TX_DATA_NONZERO
        });
    }
    for item in tx.access_list() {
        gas = gas.saturating_add(cost::ACCESS_LIST_ADDRESS);
        gas = gas
            .saturating_add(cost::ACCESS_LIST_STORAGE_KEY.saturating_mul(item.storage_keys.len() as u64));
    }
    gas
}

/// Stateless admission checks, in fixed order: size, price floor (remote
/// only), fee-field ordering and sanity, intrinsic gas, block gas limit.
///
/// Nonce and balance checks need account state and run inside the pool's
/// lock.
pub fn validate_basic(
    tx: &SignedTransaction,
    size: usize,
    block_gas_limit: u64,
    min_tip: u128,
    local: bool,
) -> TxPoolResult<()> {
    if size > MAX_TX_SIZE {
        return Err(TxPoolError::OversizedData {
            size,
            limit: MAX_TX_SIZE,
        });
    }
    if !local && tx.tip_cap() < min_tip {
        return Err(TxPoolError::Underpriced {
            tip: tx.tip_cap(),
            floor: min_tip,
        });
    }
    if tx.fee_cap() < tx.tip_cap() {
        return Err(TxPoolError::TipAboveFeeCap {
            tip: tx.tip_cap(),
            fee_cap: tx.fee_cap(),
        });
    }
    if tx.tip_cap() > FEE_CEILING {
        return Err(TxPoolError::TipVeryHigh(tx.tip_cap()));
    }
    if tx.fee_cap() > FEE_CEILING {
        return Err(TxPoolError::FeeCapVeryHigh(tx.fee_cap()));
    }
    let need = intrinsic_gas(tx);
    if need > tx.gas_limit() {
        return Err(TxPoolError::IntrinsicGas {
            need,
            have: tx.gas_limit(),
        });
    }
    if tx.gas_limit() > block_gas_limit {
        return Err(TxPoolError::GasLimit {
            gas_limit: tx.gas_limit(),
            block_limit: block_gas_limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{legacy_tx, test_addr};
    use bytes::Bytes;
    use fugue_primitives::H256;
    use fugue_types::{AccessListItem, DynamicFeeTx, LegacyTx, TxSignature};

    const BLOCK_GAS: u64 = 30_000_000;

    fn sig() -> TxSignature {
        TxSignature::new(27, H256::from_bytes([1; 32]), H256::from_bytes([2; 32]))
    }

    // ==================== Intrinsic gas ====================

    #[test]
    fn test_intrinsic_gas_plain_transfer() {
        let tx = legacy_tx(test_addr(1), 0, 1, 0);
        assert_eq!(intrinsic_gas(&tx), cost::TX);
    }

    #[test]
    fn test_intrinsic_gas_creation_and_data() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                gas_limit: 100_000,
                to: None,
                data: Bytes::from(vec![0x00, 0x01, 0x02]),
                ..Default::default()
            },
            sig(),
        );
        assert_eq!(
            intrinsic_gas(&tx),
            cost::TX_CREATE + cost::TX_DATA_ZERO + 2 * cost::TX_DATA_NONZERO
        );
    }

    #[test]
    fn test_intrinsic_gas_access_list() {
        let tx = SignedTransaction::new_dynamic_fee(
            DynamicFeeTx {
                chain_id: 1,
                nonce: 0,
                max_priority_fee_per_gas: 1,
                max_fee_per_gas: 1,
                gas_limit: 100_000,
                to: Some(test_addr(2)),
                value: 0,
                data: Bytes::new(),
                access_list: vec![AccessListItem {
                    address: test_addr(2),
                    storage_keys: vec![H256::ZERO, H256::from_bytes([1; 32])],
                }],
            },
            sig(),
        );
        assert_eq!(
            intrinsic_gas(&tx),
            cost::TX + cost::ACCESS_LIST_ADDRESS + 2 * cost::ACCESS_LIST_STORAGE_KEY
        );
    }

    // ==================== validate_basic ====================

    #[test]
    fn test_accepts_plain_transfer() {
        let tx = legacy_tx(test_addr(1), 0, 5, 0);
        validate_basic(&tx, tx.encoded_size(), BLOCK_GAS, 1, false).unwrap();
    }

    #[test]
    fn test_size_boundary() {
        let tx = legacy_tx(test_addr(1), 0, 5, 0);
        validate_basic(&tx, MAX_TX_SIZE, BLOCK_GAS, 1, false).unwrap();
        let err = validate_basic(&tx, MAX_TX_SIZE + 1, BLOCK_GAS, 1, false).unwrap_err();
        assert!(matches!(err, TxPoolError::OversizedData { .. }));
    }

    #[test]
    fn test_price_floor_remote_only() {
        let tx = legacy_tx(test_addr(1), 0, 5, 0);
        let err = validate_basic(&tx, tx.encoded_size(), BLOCK_GAS, 10, false).unwrap_err();
        assert_eq!(err, TxPoolError::Underpriced { tip: 5, floor: 10 });
        // Locals bypass the floor entirely.
        validate_basic(&tx, tx.encoded_size(), BLOCK_GAS, 10, true).unwrap();
    }

    #[test]
    fn test_fee_field_ordering() {
        let tx = SignedTransaction::new_dynamic_fee(
            DynamicFeeTx {
                chain_id: 1,
                nonce: 0,
                max_priority_fee_per_gas: 10,
                max_fee_per_gas: 5,
                gas_limit: 21000,
                to: Some(test_addr(2)),
                value: 0,
                data: Bytes::new(),
                access_list: vec![],
            },
            sig(),
        );
        let err = validate_basic(&tx, tx.encoded_size(), BLOCK_GAS, 1, true).unwrap_err();
        assert_eq!(err, TxPoolError::TipAboveFeeCap { tip: 10, fee_cap: 5 });
    }

    #[test]
    fn test_fee_sanity_ceilings() {
        let absurd = FEE_CEILING + 1;
        let tx = legacy_tx(test_addr(1), 0, absurd, 0);
        let err = validate_basic(&tx, tx.encoded_size(), BLOCK_GAS, 1, true).unwrap_err();
        // Legacy price is both tip and cap; the tip check fires first.
        assert_eq!(err, TxPoolError::TipVeryHigh(absurd));

        let tx = SignedTransaction::new_dynamic_fee(
            DynamicFeeTx {
                chain_id: 1,
                nonce: 0,
                max_priority_fee_per_gas: 1,
                max_fee_per_gas: absurd,
                gas_limit: 21000,
                to: Some(test_addr(2)),
                value: 0,
                data: Bytes::new(),
                access_list: vec![],
            },
            sig(),
        );
        let err = validate_basic(&tx, tx.encoded_size(), BLOCK_GAS, 1, true).unwrap_err();
        assert_eq!(err, TxPoolError::FeeCapVeryHigh(absurd));
    }

    #[test]
    fn test_intrinsic_gas_rejection() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                gas_price: 1,
                gas_limit: 20_000,
                to: Some(test_addr(2)),
                ..Default::default()
            },
            sig(),
        );
        let err = validate_basic(&tx, tx.encoded_size(), BLOCK_GAS, 1, true).unwrap_err();
        assert_eq!(
            err,
            TxPoolError::IntrinsicGas {
                need: cost::TX,
                have: 20_000
            }
        );
    }

    #[test]
    fn test_block_gas_limit_rejection() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                gas_price: 1,
                gas_limit: 50_000,
                to: Some(test_addr(2)),
                ..Default::default()
            },
            sig(),
        );
        let err = validate_basic(&tx, tx.encoded_size(), 40_000, 1, true).unwrap_err();
        assert_eq!(
            err,
            TxPoolError::GasLimit {
                gas_limit: 50_000,
                block_limit: 40_000
            }
        );
    }
}
