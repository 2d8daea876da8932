//! Per-account nonce-ordered transaction list
//!
//! One `TxList` backs one partition (pending or queued) of one account.
//! Pending lists are *strict*: removing a transaction invalidates every
//! higher nonce, which keeps "contiguous from the account nonce" a
//! structural property instead of an emergent one.

use std::collections::BTreeMap;
use std::sync::Arc;

use fugue_primitives::U256;

use crate::tx::PooledTransaction;

/// Nonce-sorted container of one account's transactions
pub struct TxList {
    /// Whether nonce continuity is enforced on removal
    strict: bool,
    /// Transactions keyed by nonce
    txs: BTreeMap<u64, Arc<PooledTransaction>>,
    /// Highest worst-case cost seen; lets `filter` short-circuit
    cost_cap: U256,
    /// Highest gas limit seen; lets `filter` short-circuit
    gas_cap: u64,
}

/// Result of a replacement-aware insert
pub type InsertResult =
    Result<Option<Arc<PooledTransaction>>, Arc<PooledTransaction>>;

impl TxList {
    /// Create a list; `strict` for pending partitions.
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            txs: BTreeMap::new(),
            cost_cap: U256::zero(),
            gas_cap: 0,
        }
    }

    /// Number of transactions held
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the list holds nothing
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Whether a transaction occupies `nonce`
    pub fn overlaps(&self, nonce: u64) -> bool {
        self.txs.contains_key(&nonce)
    }

    /// Transaction at `nonce`, if any
    pub fn get(&self, nonce: u64) -> Option<&Arc<PooledTransaction>> {
        self.txs.get(&nonce)
    }

    /// Lowest nonce held
    pub fn first_nonce(&self) -> Option<u64> {
        self.txs.keys().next().copied()
    }

    /// Highest nonce held
    pub fn last_nonce(&self) -> Option<u64> {
        self.txs.keys().next_back().copied()
    }

    /// Insert a transaction, applying the percentage price-bump rule when
    /// the nonce is occupied.
    ///
    /// `Ok(Some(old))` is a successful replacement, `Ok(None)` a plain
    /// insert, `Err(old)` a rejected underpriced replacement. The incoming
    /// transaction must raise both fee cap and tip cap to at least
    /// `old * (100 + price_bump) / 100`.
    pub fn insert(&mut self, tx: Arc<PooledTransaction>, price_bump: u128) -> InsertResult {
        let nonce = tx.nonce();
        let old = self.txs.get(&nonce).cloned();
        if let Some(ref old) = old {
            // Fee fields are capped well below u128::MAX at validation, so
            // the threshold arithmetic cannot overflow.
            let cap_threshold = old.fee_cap() * (100 + price_bump) / 100;
            let tip_threshold = old.tip_cap() * (100 + price_bump) / 100;
            if tx.fee_cap() < cap_threshold || tx.tip_cap() < tip_threshold {
                return Err(old.clone());
            }
        }
        if tx.cost > self.cost_cap {
            self.cost_cap = tx.cost;
        }
        if tx.gas_limit() > self.gas_cap {
            self.gas_cap = tx.gas_limit();
        }
        self.txs.insert(nonce, tx);
        Ok(old)
    }

    /// Remove every transaction with a nonce below `nonce` (mined or stale
    /// entries after a head change), returning them.
    pub fn forward(&mut self, nonce: u64) -> Vec<Arc<PooledTransaction>> {
        let kept = self.txs.split_off(&nonce);
        std::mem::replace(&mut self.txs, kept).into_values().collect()
    }

    /// Drop transactions no longer affordable under `balance` or fitting
    /// under `gas_limit`.
    ///
    /// Returns `(drops, invalids)`: `drops` leave the pool entirely; in
    /// strict mode `invalids` is every transaction after the lowest drop,
    /// to be demoted back to the queued partition.
    pub fn filter(
        &mut self,
        balance: U256,
        gas_limit: u64,
    ) -> (Vec<Arc<PooledTransaction>>, Vec<Arc<PooledTransaction>>) {
        if self.cost_cap <= balance && self.gas_cap <= gas_limit {
            return (Vec::new(), Vec::new());
        }
        // Lower the caps to the new ceilings; they rise again on insert.
        self.cost_cap = balance;
        self.gas_cap = gas_limit;

        let doomed: Vec<u64> = self
            .txs
            .iter()
            .filter(|(_, tx)| tx.cost > balance || tx.gas_limit() > gas_limit)
            .map(|(nonce, _)| *nonce)
            .collect();
        let mut drops = Vec::with_capacity(doomed.len());
        for nonce in &doomed {
            if let Some(tx) = self.txs.remove(nonce) {
                drops.push(tx);
            }
        }
        let mut invalids = Vec::new();
        if self.strict {
            if let Some(lowest) = doomed.first() {
                invalids = self.txs.split_off(lowest).into_values().collect();
            }
        }
        (drops, invalids)
    }

    /// Pop the contiguous run of transactions beginning at (or below)
    /// `start`, for promotion into pending.
    pub fn ready(&mut self, start: u64) -> Vec<Arc<PooledTransaction>> {
        let mut next = match self.first_nonce() {
            Some(first) if first <= start => first,
            _ => return Vec::new(),
        };
        let mut out = Vec::new();
        while let Some(tx) = self.txs.remove(&next) {
            out.push(tx);
            next += 1;
        }
        out
    }

    /// Trim the list down to `keep` transactions, dropping the highest
    /// nonces (furthest from executability) first.
    pub fn cap(&mut self, keep: usize) -> Vec<Arc<PooledTransaction>> {
        if self.txs.len() <= keep {
            return Vec::new();
        }
        let excess = self.txs.len() - keep;
        let mut dropped = Vec::with_capacity(excess);
        for _ in 0..excess {
            if let Some((&nonce, _)) = self.txs.iter().next_back() {
                if let Some(tx) = self.txs.remove(&nonce) {
                    dropped.push(tx);
                }
            }
        }
        dropped
    }

    /// Remove the transaction at `nonce`.
    ///
    /// In strict mode also detaches every higher nonce (now gapped) and
    /// returns them for demotion.
    pub fn remove(
        &mut self,
        nonce: u64,
    ) -> Option<(Arc<PooledTransaction>, Vec<Arc<PooledTransaction>>)> {
        let tx = self.txs.remove(&nonce)?;
        let invalids = if self.strict {
            self.txs.split_off(&nonce).into_values().collect()
        } else {
            Vec::new()
        };
        Some((tx, invalids))
    }

    /// All transactions in nonce order
    pub fn flatten(&self) -> Vec<Arc<PooledTransaction>> {
        self.txs.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{legacy_tx, test_addr};

    fn pooled(nonce: u64, gas_price: u128) -> Arc<PooledTransaction> {
        let sender = test_addr(1);
        Arc::new(PooledTransaction::new(legacy_tx(sender, nonce, gas_price, 0), sender))
    }

    // ==================== Insert and replacement ====================

    #[test]
    fn test_insert_and_order() {
        let mut list = TxList::new(false);
        list.insert(pooled(3, 10), 10).unwrap();
        list.insert(pooled(1, 10), 10).unwrap();
        list.insert(pooled(2, 10), 10).unwrap();

        assert_eq!(list.len(), 3);
        assert_eq!(list.first_nonce(), Some(1));
        assert_eq!(list.last_nonce(), Some(3));
        let nonces: Vec<u64> = list.flatten().iter().map(|tx| tx.nonce()).collect();
        assert_eq!(nonces, vec![1, 2, 3]);
    }

    #[test]
    fn test_replacement_bump_boundaries() {
        let mut list = TxList::new(false);
        list.insert(pooled(0, 100), 10).unwrap();

        // One unit below the 10% threshold fails
        let err = list.insert(pooled(0, 109), 10);
        assert!(err.is_err());
        assert_eq!(err.unwrap_err().fee_cap(), 100);

        // Exactly the threshold passes and hands back the old entry
        let old = list.insert(pooled(0, 110), 10).unwrap().unwrap();
        assert_eq!(old.fee_cap(), 100);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().fee_cap(), 110);
    }

    #[test]
    fn test_zero_bump_accepts_equal() {
        let mut list = TxList::new(true);
        list.insert(pooled(0, 100), 0).unwrap();
        assert!(list.insert(pooled(0, 100), 0).is_ok());
        assert!(list.insert(pooled(0, 99), 0).is_err());
    }

    // ==================== Forward / ready / cap ====================

    #[test]
    fn test_forward_removes_stale() {
        let mut list = TxList::new(false);
        for n in 0..5 {
            list.insert(pooled(n, 10), 10).unwrap();
        }
        let removed = list.forward(3);
        assert_eq!(removed.len(), 3);
        assert!(removed.iter().all(|tx| tx.nonce() < 3));
        assert_eq!(list.first_nonce(), Some(3));
    }

    #[test]
    fn test_ready_stops_at_gap() {
        let mut list = TxList::new(false);
        for n in [0u64, 1, 2, 4, 5] {
            list.insert(pooled(n, 10), 10).unwrap();
        }
        let ready = list.ready(0);
        let nonces: Vec<u64> = ready.iter().map(|tx| tx.nonce()).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
        assert_eq!(list.first_nonce(), Some(4));
    }

    #[test]
    fn test_ready_ignores_future_start() {
        let mut list = TxList::new(false);
        list.insert(pooled(5, 10), 10).unwrap();
        assert!(list.ready(3).is_empty());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_cap_drops_furthest_nonces() {
        let mut list = TxList::new(false);
        for n in 0..6 {
            list.insert(pooled(n, 10), 10).unwrap();
        }
        let dropped = list.cap(4);
        assert_eq!(dropped.len(), 2);
        assert!(dropped.iter().all(|tx| tx.nonce() >= 4));
        assert_eq!(list.last_nonce(), Some(3));
        assert!(list.cap(4).is_empty());
    }

    // ==================== Filter ====================

    #[test]
    fn test_filter_short_circuits_when_caps_hold() {
        let mut list = TxList::new(true);
        list.insert(pooled(0, 1), 10).unwrap();
        let (drops, invalids) = list.filter(U256::from(u64::MAX), 30_000_000);
        assert!(drops.is_empty() && invalids.is_empty());
    }

    #[test]
    fn test_filter_strict_demotes_suffix() {
        let mut list = TxList::new(true);
        list.insert(pooled(0, 1), 10).unwrap();
        list.insert(pooled(1, 1_000_000), 10).unwrap(); // unaffordable
        list.insert(pooled(2, 1), 10).unwrap();

        let balance = U256::from(21000u64 * 100); // affords gas price 100
        let (drops, invalids) = list.filter(balance, 30_000_000);
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].nonce(), 1);
        assert_eq!(invalids.len(), 1);
        assert_eq!(invalids[0].nonce(), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_filter_non_strict_keeps_suffix() {
        let mut list = TxList::new(false);
        list.insert(pooled(0, 1_000_000), 10).unwrap();
        list.insert(pooled(5, 1), 10).unwrap();

        let balance = U256::from(21000u64 * 100);
        let (drops, invalids) = list.filter(balance, 30_000_000);
        assert_eq!(drops.len(), 1);
        assert!(invalids.is_empty());
        assert_eq!(list.first_nonce(), Some(5));
    }

    #[test]
    fn test_filter_by_gas_limit() {
        let mut list = TxList::new(false);
        list.insert(pooled(0, 1), 10).unwrap();
        let (drops, _) = list.filter(U256::from(u64::MAX), 20_000);
        assert_eq!(drops.len(), 1);
        assert!(list.is_empty());
    }

    // ==================== Remove ====================

    #[test]
    fn test_strict_remove_invalidates_suffix() {
        let mut list = TxList::new(true);
        for n in 0..4 {
            list.insert(pooled(n, 10), 10).unwrap();
        }
        let (removed, invalids) = list.remove(1).unwrap();
        assert_eq!(removed.nonce(), 1);
        let nonces: Vec<u64> = invalids.iter().map(|tx| tx.nonce()).collect();
        assert_eq!(nonces, vec![2, 3]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_non_strict_remove_keeps_rest() {
        let mut list = TxList::new(false);
        for n in 0..4 {
            list.insert(pooled(n, 10), 10).unwrap();
        }
        let (_, invalids) = list.remove(1).unwrap();
        assert!(invalids.is_empty());
        assert_eq!(list.len(), 3);
        assert!(list.remove(9).is_none());
    }
}
