//! Price-ordered eviction index over remote transactions
//!
//! Two min-heaps cover the remote subset: the *urgent* heap orders by
//! effective tip at the current base fee, the *floating* heap by absolute
//! fee cap. Capacity eviction pops from urgent first and rebalances into
//! floating at a 4:1 ratio, so high-cap/low-tip transactions are not
//! starved. Local transactions never enter this index.
//!
//! Removals are lazy: dropped transactions stay in the heaps as stale
//! entries until the next rebuild, and a base-fee change only marks the
//! index dirty since it invalidates every urgent ordering key.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use fugue_primitives::H256;
use tracing::debug;

use crate::lookup::TxLookup;
use crate::tx::PooledTransaction;

/// Share of pops served from the urgent heap
const URGENT_RATIO: usize = 4;
/// Share of pops served from the floating heap
const FLOATING_RATIO: usize = 1;

struct UrgentEntry {
    /// Effective tip snapshot at the base fee current when pushed
    tip: u128,
    fee_cap: u128,
    hash: H256,
    tx: Arc<PooledTransaction>,
}

impl UrgentEntry {
    fn new(tx: Arc<PooledTransaction>, base_fee: u128) -> Self {
        Self {
            tip: tx.effective_tip_or_zero(base_fee),
            fee_cap: tx.fee_cap(),
            hash: tx.hash,
            tx,
        }
    }

    fn key(&self) -> (u128, u128, H256) {
        (self.tip, self.fee_cap, self.hash)
    }
}

impl PartialEq for UrgentEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for UrgentEntry {}
impl PartialOrd for UrgentEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for UrgentEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

struct FloatingEntry {
    fee_cap: u128,
    tip_cap: u128,
    hash: H256,
    tx: Arc<PooledTransaction>,
}

impl FloatingEntry {
    fn new(tx: Arc<PooledTransaction>) -> Self {
        Self {
            fee_cap: tx.fee_cap(),
            tip_cap: tx.tip_cap(),
            hash: tx.hash,
            tx,
        }
    }

    fn key(&self) -> (u128, u128, H256) {
        (self.fee_cap, self.tip_cap, self.hash)
    }
}

impl PartialEq for FloatingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for FloatingEntry {}
impl PartialOrd for FloatingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FloatingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Dual-heap priced list over the remote subset
pub struct PricedList {
    urgent: BinaryHeap<Reverse<UrgentEntry>>,
    floating: BinaryHeap<Reverse<FloatingEntry>>,
    /// Entries still heaped but no longer tracked by the lookup
    stales: usize,
    /// Base fee the urgent ordering keys were computed against
    base_fee: u128,
    /// Ordering keys invalidated; rebuild before the next query
    dirty: bool,
}

impl PricedList {
    /// Empty index keyed to `base_fee`.
    pub fn new(base_fee: u128) -> Self {
        Self {
            urgent: BinaryHeap::new(),
            floating: BinaryHeap::new(),
            stales: 0,
            base_fee,
            dirty: false,
        }
    }

    /// Index a newly admitted remote transaction.
    pub fn put(&mut self, tx: Arc<PooledTransaction>) {
        self.urgent.push(Reverse(UrgentEntry::new(tx, self.base_fee)));
    }

    /// Note that `count` indexed transactions left the pool. The heaps are
    /// rebuilt once stales outnumber a quarter of the population.
    pub fn removed(&mut self, count: usize) {
        self.stales += count;
        if self.stales * 4 > self.urgent.len() + self.floating.len() {
            self.dirty = true;
        }
    }

    /// The base fee changed; every urgent ordering key is invalid.
    pub fn set_base_fee(&mut self, base_fee: u128) {
        if self.base_fee != base_fee {
            self.base_fee = base_fee;
            self.dirty = true;
        }
    }

    /// Tracked entries net of stales
    pub fn len(&self) -> usize {
        (self.urgent.len() + self.floating.len()).saturating_sub(self.stales)
    }

    /// Whether nothing evictable is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Urgent heap population (meaningful right after [`reheap`])
    pub fn urgent_len(&self) -> usize {
        self.urgent.len()
    }

    /// Floating heap population (meaningful right after [`reheap`])
    pub fn floating_len(&self) -> usize {
        self.floating.len()
    }

    /// Rebuild both heaps from the lookup's remote subset and rebalance
    /// them to the configured ratio.
    pub fn reheap(&mut self, lookup: &TxLookup) {
        self.stales = 0;
        self.dirty = false;
        self.urgent = lookup
            .remotes()
            .map(|tx| Reverse(UrgentEntry::new(tx.clone(), self.base_fee)))
            .collect();
        // Seed the floating heap with the cheapest share so the first
        // eviction after a rebuild already has both orderings available.
        let share = self.urgent.len() / (URGENT_RATIO + FLOATING_RATIO);
        let mut floating = BinaryHeap::with_capacity(share);
        for _ in 0..share {
            if let Some(Reverse(entry)) = self.urgent.pop() {
                floating.push(Reverse(FloatingEntry::new(entry.tx)));
            }
        }
        self.floating = floating;
        debug!(
            urgent = self.urgent.len(),
            floating = self.floating.len(),
            base_fee = self.base_fee,
            "Reheaped priced index"
        );
    }

    fn ensure(&mut self, lookup: &TxLookup) {
        if self.dirty {
            self.reheap(lookup);
        }
    }

    /// Whether `tx` is priced at or below the cheapest evictable remote
    /// under both orderings; such a transaction must not displace anything.
    pub fn underpriced(&mut self, tx: &PooledTransaction, lookup: &TxLookup) -> bool {
        self.ensure(lookup);
        self.clean_urgent_head(lookup);
        self.clean_floating_head(lookup);

        let under_urgent = match self.urgent.peek() {
            Some(Reverse(min)) => {
                min.key() >= (tx.effective_tip_or_zero(self.base_fee), tx.fee_cap(), tx.hash)
            }
            None => false,
        };
        let under_floating = match self.floating.peek() {
            Some(Reverse(min)) => min.key() >= (tx.fee_cap(), tx.tip_cap(), tx.hash),
            None => false,
        };
        match (self.urgent.is_empty(), self.floating.is_empty()) {
            (true, true) => false,
            (false, true) => under_urgent,
            (true, false) => under_floating,
            (false, false) => under_urgent && under_floating,
        }
    }

    /// Pop the cheapest remote transactions worth at least `slots` capacity
    /// slots, or put everything back and return `None` when the index
    /// cannot free that much.
    pub fn discard(
        &mut self,
        slots: usize,
        lookup: &TxLookup,
    ) -> Option<Vec<Arc<PooledTransaction>>> {
        self.ensure(lookup);
        let mut need = slots;
        let mut drop = Vec::new();
        while need > 0 {
            let from_urgent = self.floating.is_empty()
                || self.urgent.len() * FLOATING_RATIO > self.floating.len() * URGENT_RATIO;
            if from_urgent {
                match self.urgent.pop() {
                    Some(Reverse(entry)) => {
                        if !lookup.contains_remote(&entry.hash) {
                            self.stales = self.stales.saturating_sub(1);
                            continue;
                        }
                        // Fresh minimum: rebalance it into the floating heap
                        // rather than evicting outright.
                        self.floating.push(Reverse(FloatingEntry::new(entry.tx)));
                    }
                    None => break,
                }
            } else {
                match self.floating.pop() {
                    Some(Reverse(entry)) => {
                        if !lookup.contains_remote(&entry.hash) {
                            self.stales = self.stales.saturating_sub(1);
                            continue;
                        }
                        need = need.saturating_sub(entry.tx.slots);
                        drop.push(entry.tx);
                    }
                    None => break,
                }
            }
        }
        if need > 0 {
            // Not enough evictable weight; restore the candidates.
            for tx in drop {
                self.put(tx);
            }
            self.dirty = true;
            return None;
        }
        Some(drop)
    }

    fn clean_urgent_head(&mut self, lookup: &TxLookup) {
        while let Some(Reverse(entry)) = self.urgent.peek() {
            if lookup.contains_remote(&entry.hash) {
                break;
            }
            self.urgent.pop();
            self.stales = self.stales.saturating_sub(1);
        }
    }

    fn clean_floating_head(&mut self, lookup: &TxLookup) {
        while let Some(Reverse(entry)) = self.floating.peek() {
            if lookup.contains_remote(&entry.hash) {
                break;
            }
            self.floating.pop();
            self.stales = self.stales.saturating_sub(1);
        }
    }
}
