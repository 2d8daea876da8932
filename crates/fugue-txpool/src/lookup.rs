//! Global hash index over all admitted transactions

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fugue_primitives::{Address, H256};

use crate::tx::PooledTransaction;

/// Hash-to-transaction index, split into local and remote subsets
///
/// Source of truth for total pool size and slot consumption. The
/// structural invariant `locals + remotes == everything tracked` is what
/// the per-account lists are audited against.
#[derive(Default)]
pub struct TxLookup {
    locals: HashMap<H256, Arc<PooledTransaction>>,
    remotes: HashMap<H256, Arc<PooledTransaction>>,
    slots: usize,
}

impl TxLookup {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Total transactions tracked
    pub fn count(&self) -> usize {
        self.locals.len() + self.remotes.len()
    }

    /// Locally-submitted transactions tracked
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Remote transactions tracked
    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Capacity slots currently consumed
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Whether `hash` is tracked at all
    pub fn contains(&self, hash: &H256) -> bool {
        self.locals.contains_key(hash) || self.remotes.contains_key(hash)
    }

    /// Whether `hash` is tracked as remote
    pub fn contains_remote(&self, hash: &H256) -> bool {
        self.remotes.contains_key(hash)
    }

    /// Transaction by hash
    pub fn get(&self, hash: &H256) -> Option<&Arc<PooledTransaction>> {
        self.locals.get(hash).or_else(|| self.remotes.get(hash))
    }

    /// Track a transaction in the given subset.
    pub fn add(&mut self, tx: Arc<PooledTransaction>, local: bool) {
        self.slots += tx.slots;
        if local {
            self.locals.insert(tx.hash, tx);
        } else {
            self.remotes.insert(tx.hash, tx);
        }
    }

    /// Stop tracking `hash`; returns the transaction and whether it was
    /// local.
    pub fn remove(&mut self, hash: &H256) -> Option<(Arc<PooledTransaction>, bool)> {
        if let Some(tx) = self.locals.remove(hash) {
            self.slots -= tx.slots;
            return Some((tx, true));
        }
        if let Some(tx) = self.remotes.remove(hash) {
            self.slots -= tx.slots;
            return Some((tx, false));
        }
        None
    }

    /// Iterate the remote subset.
    pub fn remotes(&self) -> impl Iterator<Item = &Arc<PooledTransaction>> {
        self.remotes.values()
    }

    /// Remote transactions whose tip cap sits below `tip` (repricing
    /// victims).
    pub fn remotes_below_tip(&self, tip: u128) -> Vec<Arc<PooledTransaction>> {
        self.remotes
            .values()
            .filter(|tx| tx.tip_cap() < tip)
            .cloned()
            .collect()
    }

    /// Migrate every remote transaction of `sender` into the local subset
    /// (the address just turned local), returning the moved transactions.
    pub fn remote_to_local(&mut self, sender: &Address) -> Vec<Arc<PooledTransaction>> {
        let hashes: Vec<H256> = self
            .remotes
            .values()
            .filter(|tx| tx.sender == *sender)
            .map(|tx| tx.hash)
            .collect();
        let mut moved = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(tx) = self.remotes.remove(&hash) {
                self.locals.insert(hash, tx.clone());
                moved.push(tx);
            }
        }
        moved
    }

    /// Snapshot of the local subset grouped by sender, nonce-sorted within
    /// each account (journal rotation input).
    pub fn locals_by_sender(&self) -> BTreeMap<Address, Vec<Arc<PooledTransaction>>> {
        let mut grouped: BTreeMap<Address, BTreeMap<u64, Arc<PooledTransaction>>> =
            BTreeMap::new();
        for tx in self.locals.values() {
            grouped
                .entry(tx.sender)
                .or_default()
                .insert(tx.nonce(), tx.clone());
        }
        grouped
            .into_iter()
            .map(|(addr, by_nonce)| (addr, by_nonce.into_values().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{legacy_tx, test_addr};

    fn pooled(sender_seed: u8, nonce: u64, gas_price: u128) -> Arc<PooledTransaction> {
        let sender = test_addr(sender_seed);
        Arc::new(PooledTransaction::new(
            legacy_tx(sender, nonce, gas_price, 0),
            sender,
        ))
    }

    #[test]
    fn test_add_remove_counts() {
        let mut lookup = TxLookup::new();
        let a = pooled(1, 0, 10);
        let b = pooled(2, 0, 10);
        lookup.add(a.clone(), true);
        lookup.add(b.clone(), false);

        assert_eq!(lookup.count(), 2);
        assert_eq!(lookup.local_count(), 1);
        assert_eq!(lookup.remote_count(), 1);
        assert_eq!(lookup.slots(), 2);
        assert!(lookup.contains(&a.hash));
        assert!(!lookup.contains_remote(&a.hash));
        assert!(lookup.contains_remote(&b.hash));

        let (removed, local) = lookup.remove(&a.hash).unwrap();
        assert!(local);
        assert_eq!(removed.hash, a.hash);
        assert_eq!(lookup.count(), 1);
        assert_eq!(lookup.slots(), 1);
        assert!(lookup.remove(&a.hash).is_none());
    }

    #[test]
    fn test_remote_to_local_migration() {
        let mut lookup = TxLookup::new();
        let sender = test_addr(1);
        for nonce in 0..3 {
            lookup.add(pooled(1, nonce, 10), false);
        }
        lookup.add(pooled(2, 0, 10), false);

        let moved = lookup.remote_to_local(&sender);
        assert_eq!(moved.len(), 3);
        assert_eq!(lookup.local_count(), 3);
        assert_eq!(lookup.remote_count(), 1);
        assert_eq!(lookup.count(), 4);
    }

    #[test]
    fn test_remotes_below_tip() {
        let mut lookup = TxLookup::new();
        lookup.add(pooled(1, 0, 5), false);
        lookup.add(pooled(2, 0, 50), false);
        lookup.add(pooled(3, 0, 5), true); // local: never a victim

        let victims = lookup.remotes_below_tip(10);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].tip_cap(), 5);
    }

    #[test]
    fn test_locals_by_sender_sorted() {
        let mut lookup = TxLookup::new();
        lookup.add(pooled(1, 2, 10), true);
        lookup.add(pooled(1, 0, 10), true);
        lookup.add(pooled(1, 1, 10), true);

        let grouped = lookup.locals_by_sender();
        let txs = grouped.get(&test_addr(1)).unwrap();
        let nonces: Vec<u64> = txs.iter().map(|tx| tx.nonce()).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }
}
