//! Deterministic binary encoding for transactions and headers.
//!
//! Little-endian, length-prefixed, and independent of any wire-level (RLP)
//! format. Content hashes (`tx_hash`, `header_hash`) are keccak-256 over
//! this encoding, and a transaction's byte size for capacity accounting is
//! the length of its encoding.

use bytes::Bytes;
use fugue_primitives::{Address, H256};
use sha3::{Digest, Keccak256};

use crate::block::BlockHeader;
use crate::transaction::{SignedTransaction, TransactionBody};

fn keccak256(data: &[u8]) -> H256 {
    H256::from_bytes(Keccak256::digest(data).into())
}

fn put_opt_address(buf: &mut Vec<u8>, to: Option<&Address>) {
    match to {
        Some(addr) => {
            buf.push(1);
            buf.extend_from_slice(addr.as_bytes());
        }
        None => buf.push(0),
    }
}

fn put_bytes(buf: &mut Vec<u8>, data: &Bytes) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

/// Encode a signed transaction to bytes.
pub fn encode_tx(tx: &SignedTransaction) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + tx.data().len());
    buf.push(tx.tx_type as u8);
    match &tx.tx {
        TransactionBody::Legacy(body) => {
            buf.extend_from_slice(&body.nonce.to_le_bytes()); // 8
            buf.extend_from_slice(&body.gas_price.to_le_bytes()); // 16
            buf.extend_from_slice(&body.gas_limit.to_le_bytes()); // 8
            put_opt_address(&mut buf, body.to.as_ref()); // 1 (+20)
            buf.extend_from_slice(&body.value.to_le_bytes()); // 16
            put_bytes(&mut buf, &body.data); // 4 + len
        }
        TransactionBody::DynamicFee(body) => {
            buf.extend_from_slice(&body.chain_id.to_le_bytes()); // 8
            buf.extend_from_slice(&body.nonce.to_le_bytes()); // 8
            buf.extend_from_slice(&body.max_priority_fee_per_gas.to_le_bytes()); // 16
            buf.extend_from_slice(&body.max_fee_per_gas.to_le_bytes()); // 16
            buf.extend_from_slice(&body.gas_limit.to_le_bytes()); // 8
            put_opt_address(&mut buf, body.to.as_ref()); // 1 (+20)
            buf.extend_from_slice(&body.value.to_le_bytes()); // 16
            put_bytes(&mut buf, &body.data); // 4 + len
            buf.extend_from_slice(&(body.access_list.len() as u32).to_le_bytes());
            for item in &body.access_list {
                buf.extend_from_slice(item.address.as_bytes()); // 20
                buf.extend_from_slice(&(item.storage_keys.len() as u32).to_le_bytes());
                for key in &item.storage_keys {
                    buf.extend_from_slice(key.as_bytes()); // 32
                }
            }
        }
    }
    buf.extend_from_slice(&tx.signature.v.to_le_bytes()); // 8
    buf.extend_from_slice(tx.signature.r.as_bytes()); // 32
    buf.extend_from_slice(tx.signature.s.as_bytes()); // 32
    buf
}

/// Content hash of a signed transaction.
pub fn tx_hash(tx: &SignedTransaction) -> H256 {
    keccak256(&encode_tx(tx))
}

/// Encode a block header to bytes.
pub fn encode_header(header: &BlockHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(header.parent_hash.as_bytes()); // 32
    buf.extend_from_slice(header.state_root.as_bytes()); // 32
    buf.extend_from_slice(&header.number.to_le_bytes()); // 8
    buf.extend_from_slice(&header.gas_limit.to_le_bytes()); // 8
    buf.extend_from_slice(&header.gas_used.to_le_bytes()); // 8
    buf.extend_from_slice(&header.timestamp.to_le_bytes()); // 8
    match header.base_fee_per_gas {
        Some(base_fee) => {
            buf.push(1);
            buf.extend_from_slice(&base_fee.to_le_bytes()); // 16
        }
        None => buf.push(0),
    }
    buf
}

/// Content hash of a block header.
pub fn header_hash(header: &BlockHeader) -> H256 {
    keccak256(&encode_header(header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{DynamicFeeTx, LegacyTx, TxSignature};

    fn sig() -> TxSignature {
        TxSignature::new(27, H256::from_bytes([1u8; 32]), H256::from_bytes([2u8; 32]))
    }

    // ==================== Encoding tests ====================

    #[test]
    fn test_encode_legacy_length() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                to: Some(Address::from_bytes([0x42; 20])),
                data: Bytes::from(vec![0xaa; 10]),
                ..Default::default()
            },
            sig(),
        );
        // type 1 + nonce 8 + price 16 + gas 8 + to 21 + value 16 + data 14 + sig 72
        assert_eq!(encode_tx(&tx).len(), 1 + 8 + 16 + 8 + 21 + 16 + 14 + 72);
        assert_eq!(tx.encoded_size(), encode_tx(&tx).len());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let tx = SignedTransaction::new_dynamic_fee(
            DynamicFeeTx {
                chain_id: 1,
                nonce: 9,
                max_priority_fee_per_gas: 2,
                max_fee_per_gas: 20,
                gas_limit: 21000,
                to: None,
                value: 5,
                data: Bytes::from(vec![1, 2, 3]),
                access_list: vec![],
            },
            sig(),
        );
        assert_eq!(encode_tx(&tx), encode_tx(&tx.clone()));
        assert_eq!(tx_hash(&tx), tx_hash(&tx.clone()));
    }

    #[test]
    fn test_type_byte_distinguishes_bodies() {
        let legacy = SignedTransaction::new_legacy(LegacyTx::default(), sig());
        let dynamic = SignedTransaction::new_dynamic_fee(
            DynamicFeeTx {
                chain_id: 1,
                nonce: 0,
                max_priority_fee_per_gas: 0,
                max_fee_per_gas: 0,
                gas_limit: 21000,
                to: None,
                value: 0,
                data: Bytes::new(),
                access_list: vec![],
            },
            sig(),
        );
        assert_eq!(encode_tx(&legacy)[0], 0);
        assert_eq!(encode_tx(&dynamic)[0], 2);
        assert_ne!(tx_hash(&legacy), tx_hash(&dynamic));
    }

    // ==================== Hash tests ====================

    #[test]
    fn test_hash_sensitive_to_every_field() {
        let base = LegacyTx {
            nonce: 1,
            gas_price: 10,
            gas_limit: 21000,
            to: Some(Address::from_bytes([0x42; 20])),
            value: 100,
            data: Bytes::from(vec![0x01]),
        };
        let h0 = tx_hash(&SignedTransaction::new_legacy(base.clone(), sig()));

        let mut bumped = base.clone();
        bumped.nonce += 1;
        assert_ne!(h0, tx_hash(&SignedTransaction::new_legacy(bumped, sig())));

        let mut repriced = base.clone();
        repriced.gas_price += 1;
        assert_ne!(h0, tx_hash(&SignedTransaction::new_legacy(repriced, sig())));

        let resigned = SignedTransaction::new_legacy(
            base,
            TxSignature::new(28, H256::from_bytes([1u8; 32]), H256::from_bytes([2u8; 32])),
        );
        assert_ne!(h0, tx_hash(&resigned));
    }

    #[test]
    fn test_access_list_feeds_the_hash() {
        let body = DynamicFeeTx {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 10,
            gas_limit: 21000,
            to: None,
            value: 0,
            data: Bytes::new(),
            access_list: vec![],
        };
        let without = SignedTransaction::new_dynamic_fee(body.clone(), sig());
        let mut listed = body;
        listed.access_list.push(crate::transaction::AccessListItem {
            address: Address::from_bytes([0x0a; 20]),
            storage_keys: vec![H256::from_bytes([0x0b; 32])],
        });
        let with = SignedTransaction::new_dynamic_fee(listed, sig());
        assert_ne!(tx_hash(&without), tx_hash(&with));
    }

    #[test]
    fn test_header_encoding_roundtrip_stability() {
        let header = BlockHeader::genesis();
        assert_eq!(encode_header(&header), encode_header(&header.clone()));
        let no_base_fee = BlockHeader {
            base_fee_per_gas: None,
            ..BlockHeader::genesis()
        };
        assert_ne!(header_hash(&header), header_hash(&no_base_fee));
    }
}
