//! Transaction pool orchestration
//!
//! One shared state store (`PoolInner`) behind a read/write lock serves the
//! fast paths: admission, membership, stats, iteration. Order-sensitive
//! recomputation — chain-head resets and nonce-gap promotion — is funneled
//! through a single serialized worker task so there is never more than one
//! in-flight mutation pass over the per-account nonce structures. A
//! maintenance task drives head subscriptions, time eviction and journal
//! rotation.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use fugue_metrics::Metrics;
use fugue_primitives::{Address, H256};
use fugue_types::{BlockHeader, SignedTransaction};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::chain::{AddressReserver, ChainState, SenderCache, SenderRecoverer};
use crate::config::PoolConfig;
use crate::error::{TxPoolError, TxPoolResult};
use crate::events::{PendingEvent, ReorgEvent, TxStatus};
use crate::journal::TxJournal;
use crate::list::TxList;
use crate::lookup::TxLookup;
use crate::priced::PricedList;
use crate::tx::PooledTransaction;
use crate::validation::validate_basic;

/// Per-account "next expected pending nonce", falling back to chain state
/// for unseen accounts.
struct NonceTracker {
    nonces: HashMap<Address, u64>,
}

impl NonceTracker {
    fn new() -> Self {
        Self {
            nonces: HashMap::new(),
        }
    }

    fn get(&mut self, state: &dyn crate::chain::AccountReader, addr: &Address) -> u64 {
        *self
            .nonces
            .entry(*addr)
            .or_insert_with(|| state.account(addr).nonce)
    }

    fn set(&mut self, addr: Address, nonce: u64) {
        self.nonces.insert(addr, nonce);
    }

    fn set_if_lower(&mut self, addr: Address, nonce: u64) {
        if let Some(current) = self.nonces.get_mut(&addr) {
            if *current > nonce {
                *current = nonce;
            }
        }
    }

    fn forget(&mut self, addr: &Address) {
        self.nonces.remove(addr);
    }

    fn peek(&self, addr: &Address) -> Option<u64> {
        self.nonces.get(addr).copied()
    }

    fn clear(&mut self) {
        self.nonces.clear();
    }
}

/// Work items for the serialized reorg worker
enum ReorgRequest {
    /// Revalidate the whole pool against a new accepted head
    Reset {
        head: BlockHeader,
        done: Option<oneshot::Sender<()>>,
    },
    /// Fill nonce gaps for the given candidate accounts
    Promote {
        accounts: Vec<Address>,
        done: Option<oneshot::Sender<()>>,
    },
}

struct AddOutcome {
    /// Landed in (or replaced within) the pending partition
    pending: bool,
    /// Tracked as local (journaling, eviction exemptions)
    is_local: bool,
    tx: Arc<PooledTransaction>,
}

/// The shared state store. Mutated only under the pool's write lock or on
/// the serialized worker; readers get snapshots, never live references.
struct PoolInner {
    config: PoolConfig,
    pending: HashMap<Address, TxList>,
    queued: HashMap<Address, TxList>,
    beats: HashMap<Address, Instant>,
    nonces: NonceTracker,
    lookup: TxLookup,
    priced: PricedList,
    locals: HashSet<Address>,
    state: Arc<dyn crate::chain::AccountReader>,
    head: BlockHeader,
    base_fee: u128,
    min_tip: u128,
    senders: Arc<SenderCache>,
    reserver: Option<Arc<dyn AddressReserver>>,
}

impl PoolInner {
    fn pending_count(&self) -> usize {
        self.pending.values().map(|l| l.len()).sum()
    }

    fn queued_count(&self) -> usize {
        self.queued.values().map(|l| l.len()).sum()
    }

    /// Drop a transaction from the lookup after it left its account list.
    fn finalize_drop(&mut self, tx: &Arc<PooledTransaction>) {
        if let Some((_, local)) = self.lookup.remove(&tx.hash) {
            if !local {
                self.priced.removed(1);
            }
            self.senders.forget(&tx.hash);
        }
    }

    /// Move a transaction into the queued partition without bump checks
    /// (internal demotion; both sides are already admitted).
    fn requeue(&mut self, addr: Address, tx: Arc<PooledTransaction>) {
        let list = self.queued.entry(addr).or_insert_with(|| TxList::new(false));
        match list.insert(tx.clone(), 0) {
            Ok(Some(old)) => self.finalize_drop(&old),
            Ok(None) => {}
            // The resident entry is better priced; the demoted one loses.
            Err(_) => self.finalize_drop(&tx),
        }
    }

    /// Release per-account bookkeeping once both partitions are empty.
    fn maybe_release(&mut self, addr: Address) {
        if self.pending.contains_key(&addr) || self.queued.contains_key(&addr) {
            return;
        }
        self.beats.remove(&addr);
        self.nonces.forget(&addr);
        if let Some(reserver) = &self.reserver {
            reserver.release(addr);
        }
    }

    /// Drop a speculative nonce entry left behind when a rejected
    /// transaction touched an otherwise untracked account.
    fn forget_idle_nonce(&mut self, addr: &Address) {
        if !self.pending.contains_key(addr) && !self.queued.contains_key(addr) {
            self.nonces.forget(addr);
        }
    }

    fn note_activity(&mut self, sender: Address, is_local: bool) {
        self.beats.insert(sender, Instant::now());
        if is_local && !self.config.no_locals && self.locals.insert(sender) {
            info!(address = %sender, "Setting new local account");
            let moved = self.lookup.remote_to_local(&sender);
            if !moved.is_empty() {
                self.priced.removed(moved.len());
            }
        }
    }

    /// Validate and insert one recovered transaction. All-or-nothing: a
    /// rejection leaves the store untouched.
    fn add_validated(
        &mut self,
        tx: Arc<PooledTransaction>,
        local: bool,
    ) -> TxPoolResult<AddOutcome> {
        let hash = tx.hash;
        let sender = tx.sender;
        let nonce = tx.nonce();

        if self.lookup.contains(&hash) {
            return Err(TxPoolError::AlreadyKnown(hash));
        }
        let is_local = local || self.locals.contains(&sender);
        validate_basic(&tx.tx, tx.size, self.head.gas_limit, self.min_tip, is_local)?;

        let account = self.state.account(&sender);
        if account.nonce > nonce {
            return Err(TxPoolError::NonceTooLow {
                state: account.nonce,
                tx: nonce,
            });
        }
        if account.balance < tx.cost {
            return Err(TxPoolError::InsufficientFunds {
                cost: tx.cost,
                balance: account.balance,
            });
        }

        // Capacity: make room by evicting the cheapest remotes, or reject.
        let budget = self.config.global_slots + self.config.global_queue;
        if self.lookup.slots() + tx.slots > budget {
            if !is_local && self.priced.underpriced(&tx, &self.lookup) {
                trace!(hash = %hash, "Discarding underpriced transaction at capacity");
                return Err(TxPoolError::Underpriced {
                    tip: tx.tip_cap(),
                    floor: self.min_tip,
                });
            }
            let need = self.lookup.slots() + tx.slots - budget;
            match self.priced.discard(need, &self.lookup) {
                Some(victims) => {
                    let state = self.state.clone();
                    let future = nonce > self.nonces.get(state.as_ref(), &sender);
                    let churns_pending = victims.iter().any(|victim| {
                        self.pending
                            .get(&victim.sender)
                            .is_some_and(|list| list.overlaps(victim.nonce()))
                    });
                    if !is_local && future && churns_pending {
                        for victim in victims {
                            self.priced.put(victim);
                        }
                        return Err(TxPoolError::FutureReplacePending);
                    }
                    for victim in victims {
                        trace!(hash = %victim.hash, "Evicting transaction for capacity");
                        self.remove_tx(victim.hash, false);
                    }
                }
                None if !is_local => {
                    return Err(TxPoolError::Underpriced {
                        tip: tx.tip_cap(),
                        floor: self.min_tip,
                    });
                }
                // Locals are admitted even when nothing could be evicted.
                None => {}
            }
        }

        // First transaction of an unseen sender claims the reservation.
        let known =
            self.pending.contains_key(&sender) || self.queued.contains_key(&sender);
        if !known {
            if let Some(reserver) = &self.reserver {
                if !reserver.hold(sender) {
                    return Err(TxPoolError::AlreadyReserved);
                }
            }
        }

        // Replacement of an executable slot stays pending.
        let mut pending_slot: Option<Option<Arc<PooledTransaction>>> = None;
        if let Some(list) = self.pending.get_mut(&sender) {
            if list.overlaps(nonce) {
                match list.insert(tx.clone(), self.config.price_bump) {
                    Err(old) => return Err(replace_underpriced(&old, &tx)),
                    Ok(old) => pending_slot = Some(old),
                }
            }
        }
        if let Some(old) = pending_slot {
            if let Some(old) = old {
                self.finalize_drop(&old);
            }
            self.lookup.add(tx.clone(), is_local);
            if !is_local {
                self.priced.put(tx.clone());
            }
            self.note_activity(sender, is_local);
            return Ok(AddOutcome {
                pending: true,
                is_local,
                tx,
            });
        }

        let state = self.state.clone();
        let next = self.nonces.get(state.as_ref(), &sender);
        if nonce == next {
            // Immediately executable. A queued occupant at the same nonce
            // must first lose under the bump rules.
            let mut displaced: Option<Arc<PooledTransaction>> = None;
            if let Some(qlist) = self.queued.get_mut(&sender) {
                if let Some(occupant) = qlist.get(nonce).cloned() {
                    match qlist.insert(tx.clone(), self.config.price_bump) {
                        Err(old) => return Err(replace_underpriced(&old, &tx)),
                        Ok(_) => {
                            qlist.remove(nonce);
                            displaced = Some(occupant);
                        }
                    }
                }
            }
            if let Some(occupant) = displaced {
                self.finalize_drop(&occupant);
                if self.queued.get(&sender).is_some_and(|l| l.is_empty()) {
                    self.queued.remove(&sender);
                }
            }
            let list = self
                .pending
                .entry(sender)
                .or_insert_with(|| TxList::new(true));
            // The slot is free by construction of `next`.
            let _ = list.insert(tx.clone(), 0);
            self.nonces.set(sender, nonce + 1);
            self.lookup.add(tx.clone(), is_local);
            if !is_local {
                self.priced.put(tx.clone());
            }
            self.note_activity(sender, is_local);
            return Ok(AddOutcome {
                pending: true,
                is_local,
                tx,
            });
        }

        // Nonce gap: park in the queued partition.
        let list = self
            .queued
            .entry(sender)
            .or_insert_with(|| TxList::new(false));
        match list.insert(tx.clone(), self.config.price_bump) {
            Err(old) => Err(replace_underpriced(&old, &tx)),
            Ok(old) => {
                if let Some(old) = old {
                    self.finalize_drop(&old);
                }
                self.lookup.add(tx.clone(), is_local);
                if !is_local {
                    self.priced.put(tx.clone());
                }
                self.note_activity(sender, is_local);
                Ok(AddOutcome {
                    pending: false,
                    is_local,
                    tx,
                })
            }
        }
    }

    /// Remove one transaction wherever it sits, demoting any now-gapped
    /// pending suffix. `track_priced` is false when the caller already
    /// popped it off the priced heaps.
    fn remove_tx(&mut self, hash: H256, track_priced: bool) {
        let Some((tx, local)) = self.lookup.remove(&hash) else {
            return;
        };
        if track_priced && !local {
            self.priced.removed(1);
        }
        self.senders.forget(&hash);
        let addr = tx.sender;
        let nonce = tx.nonce();

        if let Some(mut list) = self.pending.remove(&addr) {
            if let Some((_, invalids)) = list.remove(nonce) {
                for demoted in invalids {
                    self.requeue(addr, demoted);
                }
                self.nonces.set_if_lower(addr, nonce);
                if list.is_empty() {
                    self.maybe_release(addr);
                } else {
                    self.pending.insert(addr, list);
                }
                return;
            }
            self.pending.insert(addr, list);
        }
        if let Some(mut list) = self.queued.remove(&addr) {
            list.remove(nonce);
            if list.is_empty() {
                self.maybe_release(addr);
            } else {
                self.queued.insert(addr, list);
            }
        }
    }

    /// Move one transaction into the pending partition, returning whether
    /// it actually landed there (a better resident wins otherwise).
    fn promote_tx(&mut self, addr: Address, tx: Arc<PooledTransaction>) -> bool {
        let nonce = tx.nonce();
        let list = self
            .pending
            .entry(addr)
            .or_insert_with(|| TxList::new(true));
        match list.insert(tx.clone(), 0) {
            Err(_) => {
                // An equal-or-better transaction already holds the slot;
                // the incoming one is stale.
                self.finalize_drop(&tx);
                false
            }
            Ok(old) => {
                if let Some(old) = old {
                    self.finalize_drop(&old);
                }
                self.nonces.set(addr, nonce + 1);
                self.beats.insert(addr, Instant::now());
                true
            }
        }
    }

    /// Promotion pass over candidate accounts: drop queued entries that
    /// turned stale or unaffordable, move the contiguous prefix into
    /// pending, and cap the non-local queued remainder.
    fn promote_executables(&mut self, accounts: &[Address]) -> Vec<Arc<PooledTransaction>> {
        let mut promoted = Vec::new();
        let state = self.state.clone();
        let gas_limit = self.head.gas_limit;
        for addr in accounts {
            let Some(mut list) = self.queued.remove(addr) else {
                continue;
            };
            let account = state.account(addr);
            for tx in list.forward(account.nonce) {
                trace!(hash = %tx.hash, "Removed stale queued transaction");
                self.finalize_drop(&tx);
            }
            let (drops, _) = list.filter(account.balance, gas_limit);
            for tx in drops {
                trace!(hash = %tx.hash, "Removed unpayable queued transaction");
                self.finalize_drop(&tx);
            }
            let start = self.nonces.get(state.as_ref(), addr);
            for tx in list.ready(start) {
                let hash = tx.hash;
                if self.promote_tx(*addr, tx.clone()) {
                    trace!(hash = %hash, "Promoted queued transaction");
                    promoted.push(tx);
                }
            }
            if !self.locals.contains(addr) {
                for tx in list.cap(self.config.account_queue) {
                    trace!(hash = %tx.hash, "Removed cap-exceeding queued transaction");
                    self.finalize_drop(&tx);
                }
            }
            if list.is_empty() {
                self.maybe_release(*addr);
            } else {
                self.queued.insert(*addr, list);
            }
        }
        promoted
    }

    /// Demotion pass after a reset: drop mined/stale/unpayable pending
    /// entries and push every transaction behind an invalidation back into
    /// queued.
    fn demote_unexecutables(&mut self, metrics: &Metrics) {
        let state = self.state.clone();
        let gas_limit = self.head.gas_limit;
        let addrs: Vec<Address> = self.pending.keys().copied().collect();
        let mut demoted = 0u64;
        for addr in addrs {
            let Some(mut list) = self.pending.remove(&addr) else {
                continue;
            };
            let account = state.account(&addr);
            for tx in list.forward(account.nonce) {
                self.finalize_drop(&tx);
            }
            let (drops, invalids) = list.filter(account.balance, gas_limit);
            for tx in drops {
                trace!(hash = %tx.hash, "Removed unpayable pending transaction");
                self.finalize_drop(&tx);
            }
            let mut to_queue = invalids;
            if let Some(first) = list.first_nonce() {
                // A gap at the front means nothing left is executable.
                if first > account.nonce {
                    to_queue.extend(list.forward(u64::MAX));
                }
            }
            demoted += to_queue.len() as u64;
            for tx in to_queue {
                self.requeue(addr, tx);
            }
            if let Some(last) = list.last_nonce() {
                self.nonces.set(addr, last + 1);
                self.pending.insert(addr, list);
            } else {
                self.nonces.set(addr, account.nonce);
                self.maybe_release(addr);
            }
        }
        if demoted > 0 {
            debug!(count = demoted, "Demoted pending transactions");
            metrics.counter("txpool/demoted", demoted);
        }
    }

    /// Enforce the global pending ceiling by trimming the largest
    /// non-local offenders above their guaranteed slots.
    fn truncate_pending(&mut self, metrics: &Metrics) {
        let mut total = self.pending_count();
        let mut dropped = 0u64;
        while total > self.config.global_slots {
            let offender = self
                .pending
                .iter()
                .filter(|(addr, list)| {
                    !self.locals.contains(*addr) && list.len() > self.config.account_slots
                })
                .max_by_key(|(_, list)| list.len())
                .map(|(addr, _)| *addr);
            let Some(addr) = offender else {
                break;
            };
            let Some(mut list) = self.pending.remove(&addr) else {
                break;
            };
            let victims = list.cap(list.len() - 1);
            for tx in &victims {
                self.finalize_drop(tx);
                self.nonces.set_if_lower(addr, tx.nonce());
            }
            total -= victims.len();
            dropped += victims.len() as u64;
            if list.is_empty() {
                self.maybe_release(addr);
            } else {
                self.pending.insert(addr, list);
            }
        }
        if dropped > 0 {
            debug!(count = dropped, "Truncated pending above global ceiling");
            metrics.counter("txpool/pending/rate_limited", dropped);
        }
    }

    /// Enforce the global queued ceiling by dropping whole non-local
    /// queues, oldest account activity first.
    fn truncate_queue(&mut self, metrics: &Metrics) {
        let mut total = self.queued_count();
        if total <= self.config.global_queue {
            return;
        }
        let mut by_beat: Vec<(Address, Instant)> = self
            .queued
            .keys()
            .filter(|addr| !self.locals.contains(*addr))
            .map(|addr| {
                (
                    *addr,
                    self.beats.get(addr).copied().unwrap_or_else(Instant::now),
                )
            })
            .collect();
        by_beat.sort_by_key(|(_, beat)| *beat);

        let mut dropped = 0u64;
        for (addr, _) in by_beat {
            if total <= self.config.global_queue {
                break;
            }
            let Some(mut list) = self.queued.remove(&addr) else {
                continue;
            };
            let excess = total - self.config.global_queue;
            if list.len() <= excess {
                total -= list.len();
                dropped += list.len() as u64;
                for tx in list.flatten() {
                    self.finalize_drop(&tx);
                }
                self.maybe_release(addr);
            } else {
                let victims = list.cap(list.len() - excess);
                total -= victims.len();
                dropped += victims.len() as u64;
                for tx in victims {
                    self.finalize_drop(&tx);
                }
                self.queued.insert(addr, list);
            }
        }
        if dropped > 0 {
            debug!(count = dropped, "Truncated queued above global ceiling");
            metrics.counter("txpool/queued/rate_limited", dropped);
        }
    }

    /// Drop all queued transactions of remote accounts idle beyond the
    /// configured lifetime. Returns the eviction count.
    fn evict_stale(&mut self) -> u64 {
        let now = Instant::now();
        let lifetime = self.config.lifetime;
        let stale: Vec<Address> = self
            .queued
            .keys()
            .filter(|addr| !self.locals.contains(*addr))
            .filter(|addr| {
                self.beats
                    .get(*addr)
                    .map_or(true, |beat| now.duration_since(*beat) > lifetime)
            })
            .copied()
            .collect();
        let mut evicted = 0u64;
        for addr in stale {
            let Some(list) = self.queued.remove(&addr) else {
                continue;
            };
            for tx in list.flatten() {
                trace!(hash = %tx.hash, "Evicted transaction past lifetime");
                self.finalize_drop(&tx);
                evicted += 1;
            }
            self.maybe_release(addr);
        }
        evicted
    }

    /// Raise the tip floor and drop every remote below it; locals stay.
    fn reprice(&mut self, min_tip: u128) -> u64 {
        self.min_tip = min_tip;
        let victims = self.lookup.remotes_below_tip(min_tip);
        let count = victims.len() as u64;
        for tx in victims {
            self.remove_tx(tx.hash, true);
        }
        info!(tip = min_tip, dropped = count, "Transaction pool tip threshold updated");
        count
    }

    /// Refresh the head snapshot for a reset; demotion/promotion follow.
    fn reset(&mut self, head: BlockHeader, chain: &dyn ChainState) {
        self.state = chain.state_at(head.state_root);
        self.base_fee = chain
            .next_base_fee(&head)
            .or(head.base_fee_per_gas)
            .unwrap_or(0);
        self.priced.set_base_fee(self.base_fee);
        self.head = head;
        self.nonces.clear();
    }

    fn update_gauges(&self, metrics: &Metrics) {
        metrics.gauge("txpool/pending", self.pending_count() as i64);
        metrics.gauge("txpool/queued", self.queued_count() as i64);
        metrics.gauge("txpool/local", self.lookup.local_count() as i64);
        metrics.gauge("txpool/remote", self.lookup.remote_count() as i64);
        metrics.gauge("txpool/slots", self.lookup.slots() as i64);
    }

    /// Audit the structural invariants; panics on violation. Test and
    /// debugging aid, not part of normal operation.
    fn verify_integrity(&mut self) {
        let pending = self.pending_count();
        let queued = self.queued_count();
        assert_eq!(
            pending + queued,
            self.lookup.count(),
            "account lists out of sync with lookup"
        );
        for (addr, list) in &self.pending {
            let first = list.first_nonce().unwrap();
            let last = list.last_nonce().unwrap();
            assert_eq!(
                last - first + 1,
                list.len() as u64,
                "pending list has a nonce gap for {addr}"
            );
            assert_eq!(
                self.nonces.peek(addr),
                Some(last + 1),
                "nonce tracker out of sync for {addr}"
            );
            if let Some(qlist) = self.queued.get(addr) {
                for tx in qlist.flatten() {
                    assert!(
                        !list.overlaps(tx.nonce()),
                        "nonce {} of {addr} in both partitions",
                        tx.nonce()
                    );
                }
            }
        }
        for addr in self.nonces.nonces.keys() {
            assert!(
                self.pending.contains_key(addr) || self.queued.contains_key(addr),
                "nonce tracker entry for untracked account {addr}"
            );
        }
        self.priced.reheap(&self.lookup);
        assert_eq!(
            self.priced.urgent_len() + self.priced.floating_len(),
            self.lookup.remote_count(),
            "priced index out of sync with remote set"
        );
    }
}

fn replace_underpriced(old: &PooledTransaction, new: &PooledTransaction) -> TxPoolError {
    TxPoolError::ReplaceUnderpriced {
        old_fee_cap: old.fee_cap(),
        new_fee_cap: new.fee_cap(),
        old_tip: old.tip_cap(),
        new_tip: new.tip_cap(),
    }
}

/// The transaction pool
///
/// Construct with [`TxPool::new`] inside a tokio runtime; the constructor
/// spawns the serialized reorg worker and the maintenance task and replays
/// the journal when one is configured.
pub struct TxPool {
    config: PoolConfig,
    chain: Arc<dyn ChainState>,
    senders: Arc<SenderCache>,
    inner: Arc<RwLock<PoolInner>>,
    journal: Mutex<Option<TxJournal>>,
    reorg_tx: mpsc::UnboundedSender<ReorgRequest>,
    pending_events: broadcast::Sender<PendingEvent>,
    reorg_events: broadcast::Sender<ReorgEvent>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl TxPool {
    /// Build and start a pool against the given chain view.
    pub fn new(
        config: PoolConfig,
        chain: Arc<dyn ChainState>,
        recoverer: Arc<dyn SenderRecoverer>,
    ) -> TxPoolResult<Arc<Self>> {
        let config = config.sanitize();
        let head = chain.latest_header();
        let state = chain.state_at(head.state_root);
        let base_fee = chain
            .next_base_fee(&head)
            .or(head.base_fee_per_gas)
            .unwrap_or(0);
        let senders = Arc::new(SenderCache::new(recoverer));
        let locals: HashSet<Address> = if config.no_locals {
            HashSet::new()
        } else {
            config.locals.iter().copied().collect()
        };

        let inner = PoolInner {
            config: config.clone(),
            pending: HashMap::new(),
            queued: HashMap::new(),
            beats: HashMap::new(),
            nonces: NonceTracker::new(),
            lookup: TxLookup::new(),
            priced: PricedList::new(base_fee),
            locals,
            state,
            head: head.clone(),
            base_fee,
            min_tip: config.price_limit,
            senders: senders.clone(),
            reserver: None,
        };

        let (reorg_tx, reorg_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (pending_events, _) = broadcast::channel(1024);
        let (reorg_events, _) = broadcast::channel(64);

        let pool = Arc::new(Self {
            config: config.clone(),
            chain: chain.clone(),
            senders,
            inner: Arc::new(RwLock::new(inner)),
            journal: Mutex::new(None),
            reorg_tx,
            pending_events,
            reorg_events,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            metrics: Arc::new(Metrics::new()),
        });

        info!(
            head = head.number,
            price_limit = config.price_limit,
            "Transaction pool starting"
        );

        // Replay the journal through the normal admission path, then
        // rotate it down to what actually survived.
        if let (Some(path), false) = (&config.journal, config.no_locals) {
            let mut journal = TxJournal::new(path.clone());
            let replay_pool = pool.clone();
            journal.load(move |tx| {
                let mut results = replay_pool.add_batch(vec![tx], true);
                results
                    .pop()
                    .unwrap_or(Err(TxPoolError::InvalidSender))
                    .map(|_| ())
            })?;
            pool.metrics.counter("txpool/journal/loaded", 1);
            let locals_snapshot = pool.inner.read().lookup.locals_by_sender();
            journal.rotate(&locals_snapshot)?;
            *pool.journal.lock() = Some(journal);
            // Out-of-order replay can leave gaps that are fillable right
            // away; queue one promotion pass over everything replayed.
            let replayed: Vec<Address> = pool.inner.read().queued.keys().copied().collect();
            if !replayed.is_empty() {
                let _ = pool.reorg_tx.send(ReorgRequest::Promote {
                    accounts: replayed,
                    done: None,
                });
            }
        }

        let heads = chain.subscribe_heads();
        let worker = tokio::spawn(Self::run_reorg_loop(
            pool.clone(),
            reorg_rx,
            shutdown_rx.clone(),
        ));
        let maintenance = tokio::spawn(Self::run_maintenance(pool.clone(), heads, shutdown_rx));
        pool.tasks.lock().push(worker);
        pool.tasks.lock().push(maintenance);

        Ok(pool)
    }

    // ── Admission ───────────────────────────────────────────────────────

    /// Submit remote transactions; errors preserve input order.
    pub fn add_remotes(&self, txs: Vec<SignedTransaction>) -> Vec<TxPoolResult<()>> {
        let results = self.add_batch(txs, false);
        self.schedule_promotion(&results, None);
        results.into_iter().map(|r| r.map(|_| ())).collect()
    }

    /// Submit local transactions; errors preserve input order.
    pub fn add_locals(&self, txs: Vec<SignedTransaction>) -> Vec<TxPoolResult<()>> {
        let results = self.add_batch(txs, true);
        self.schedule_promotion(&results, None);
        results.into_iter().map(|r| r.map(|_| ())).collect()
    }

    /// Submit one remote transaction.
    pub fn add_remote(&self, tx: SignedTransaction) -> TxPoolResult<()> {
        self.add_remotes(vec![tx])
            .pop()
            .unwrap_or(Err(TxPoolError::InvalidSender))
    }

    /// Submit one local transaction.
    pub fn add_local(&self, tx: SignedTransaction) -> TxPoolResult<()> {
        self.add_locals(vec![tx])
            .pop()
            .unwrap_or(Err(TxPoolError::InvalidSender))
    }

    /// Like [`add_remotes`](Self::add_remotes), but wait until the
    /// follow-up promotion pass has run.
    pub async fn add_remotes_sync(&self, txs: Vec<SignedTransaction>) -> Vec<TxPoolResult<()>> {
        let results = self.add_batch(txs, false);
        self.promote_and_wait(&results).await;
        results.into_iter().map(|r| r.map(|_| ())).collect()
    }

    /// Like [`add_locals`](Self::add_locals), but wait until the follow-up
    /// promotion pass has run.
    pub async fn add_locals_sync(&self, txs: Vec<SignedTransaction>) -> Vec<TxPoolResult<()>> {
        let results = self.add_batch(txs, true);
        self.promote_and_wait(&results).await;
        results.into_iter().map(|r| r.map(|_| ())).collect()
    }

    fn add_batch(
        &self,
        txs: Vec<SignedTransaction>,
        local: bool,
    ) -> Vec<TxPoolResult<Address>> {
        // Downgrade the local flag wholesale when local handling is off.
        let local = local && !self.config.no_locals;

        // Warm the sender cache outside the lock; recovery dominates
        // admission cost, so the locked loop below only does map lookups.
        let batch: Vec<(H256, SignedTransaction)> = txs
            .into_iter()
            .map(|tx| (tx.hash(), tx))
            .collect();
        self.senders.warm(&batch);

        let mut results = Vec::with_capacity(batch.len());
        let mut executable = Vec::new();
        {
            let mut inner = self.inner.write();
            for (hash, tx) in batch {
                let Some(sender) = self.senders.recover(hash, &tx) else {
                    results.push(Err(TxPoolError::InvalidSender));
                    self.metrics.counter("txpool/invalid", 1);
                    continue;
                };
                let pooled = Arc::new(PooledTransaction::new(tx, sender));
                match inner.add_validated(pooled, local) {
                    Ok(outcome) => {
                        if outcome.pending {
                            executable.push(outcome.tx.clone());
                        }
                        if outcome.is_local {
                            self.journal_tx(&outcome.tx.tx);
                        }
                        self.metrics.counter("txpool/valid", 1);
                        results.push(Ok(sender));
                    }
                    Err(err) => {
                        trace!(%err, "Rejected transaction");
                        self.metrics.counter("txpool/invalid", 1);
                        inner.forget_idle_nonce(&sender);
                        results.push(Err(err));
                    }
                }
            }
            inner.update_gauges(&self.metrics);
        }
        if !executable.is_empty() {
            let _ = self.pending_events.send(PendingEvent { txs: executable });
        }
        results
    }

    fn journal_tx(&self, tx: &SignedTransaction) {
        if let Some(journal) = self.journal.lock().as_mut() {
            if let Err(err) = journal.insert(tx) {
                warn!("Failed to journal local transaction: {}", err);
            }
        }
    }

    fn schedule_promotion(
        &self,
        results: &[TxPoolResult<Address>],
        done: Option<oneshot::Sender<()>>,
    ) {
        let mut accounts: Vec<Address> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().copied())
            .collect();
        accounts.sort();
        accounts.dedup();
        if accounts.is_empty() && done.is_none() {
            return;
        }
        let _ = self.reorg_tx.send(ReorgRequest::Promote { accounts, done });
    }

    async fn promote_and_wait(&self, results: &[TxPoolResult<Address>]) {
        let (done_tx, done_rx) = oneshot::channel();
        self.schedule_promotion(results, Some(done_tx));
        let _ = done_rx.await;
    }

    // ── Reset ───────────────────────────────────────────────────────────

    /// Request a reset against `head` without waiting for it.
    pub fn schedule_reset(&self, head: BlockHeader) {
        let _ = self.reorg_tx.send(ReorgRequest::Reset { head, done: None });
    }

    /// Reset against `head` and wait until the pool is consistent with it.
    pub async fn reset_and_wait(&self, head: BlockHeader) {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self.reorg_tx.send(ReorgRequest::Reset {
            head,
            done: Some(done_tx),
        });
        let _ = done_rx.await;
    }

    // ── Serialized worker ───────────────────────────────────────────────

    async fn run_reorg_loop(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<ReorgRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                req = rx.recv() => {
                    let Some(first) = req else { break };
                    let mut reset: Option<BlockHeader> = None;
                    let mut accounts: Vec<Address> = Vec::new();
                    let mut acks: Vec<oneshot::Sender<()>> = Vec::new();
                    merge_request(first, &mut reset, &mut accounts, &mut acks);
                    // Coalesce everything already queued: one pass serves
                    // all of it, and a newer reset supersedes an older one.
                    while let Ok(req) = rx.try_recv() {
                        merge_request(req, &mut reset, &mut accounts, &mut acks);
                    }
                    self.run_reorg(reset, accounts);
                    for ack in acks {
                        let _ = ack.send(());
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Drain pending requests so no caller waits forever.
                        while let Ok(req) = rx.try_recv() {
                            let (ReorgRequest::Reset { done, .. }
                                | ReorgRequest::Promote { done, .. }) = req;
                            if let Some(done) = done {
                                let _ = done.send(());
                            }
                        }
                        break;
                    }
                }
            }
        }
        debug!("Transaction pool reorg worker stopped");
    }

    fn run_reorg(&self, reset: Option<BlockHeader>, mut dirty: Vec<Address>) {
        let started = Instant::now();
        let (promoted, reset_head) = {
            let mut inner = self.inner.write();
            let mut reset_head = None;
            if let Some(head) = reset {
                debug!(number = head.number, "Resetting transaction pool to new head");
                inner.reset(head.clone(), self.chain.as_ref());
                inner.demote_unexecutables(&self.metrics);
                // After a reset every queued account may have become
                // executable.
                dirty = inner.queued.keys().copied().collect();
                reset_head = Some(head);
            } else {
                dirty.sort();
                dirty.dedup();
            }
            let promoted = inner.promote_executables(&dirty);
            if reset_head.is_some() {
                inner.truncate_pending(&self.metrics);
                inner.truncate_queue(&self.metrics);
            }
            inner.update_gauges(&self.metrics);
            (promoted, reset_head)
        };
        self.metrics
            .histogram("txpool/reorg_us", started.elapsed().as_micros() as f64);
        if !promoted.is_empty() {
            self.metrics.counter("txpool/promoted", promoted.len() as u64);
            let _ = self.pending_events.send(PendingEvent { txs: promoted });
        }
        if let Some(head) = reset_head {
            let _ = self.reorg_events.send(ReorgEvent { head });
        }
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    async fn run_maintenance(
        self: Arc<Self>,
        mut heads: mpsc::Receiver<BlockHeader>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut evict = tokio::time::interval(self.config.eviction_interval);
        let mut rejournal = tokio::time::interval(self.config.rejournal);
        // Both intervals fire immediately once; consume that so the first
        // real sweep happens one full period in.
        evict.tick().await;
        rejournal.tick().await;
        loop {
            tokio::select! {
                Some(head) = heads.recv() => {
                    self.schedule_reset(head);
                }
                _ = evict.tick() => {
                    self.evict_stale();
                }
                _ = rejournal.tick() => {
                    if let Err(err) = self.rotate_journal() {
                        warn!("Failed to rotate transaction journal: {}", err);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Transaction pool maintenance stopped");
    }

    fn evict_stale(&self) {
        let evicted = {
            let mut inner = self.inner.write();
            let evicted = inner.evict_stale();
            inner.update_gauges(&self.metrics);
            evicted
        };
        if evicted > 0 {
            debug!(count = evicted, "Evicted transactions past lifetime");
            self.metrics.counter("txpool/evicted/time", evicted);
        }
    }

    fn rotate_journal(&self) -> TxPoolResult<()> {
        // Snapshot before touching the journal mutex. Admission holds the
        // pool lock and then takes the journal mutex; acquiring them here
        // in the opposite order deadlocks against a concurrent submitter.
        let locals_snapshot = self.inner.read().lookup.locals_by_sender();
        let mut guard = self.journal.lock();
        let Some(journal) = guard.as_mut() else {
            return Ok(());
        };
        journal.rotate(&locals_snapshot)?;
        self.metrics.counter("txpool/journal/rotated", 1);
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Pending and queued transaction counts.
    pub fn stats(&self) -> (usize, usize) {
        let inner = self.inner.read();
        (inner.pending_count(), inner.queued_count())
    }

    /// Pending and queued contents per account.
    #[allow(clippy::type_complexity)]
    pub fn content(
        &self,
    ) -> (
        HashMap<Address, Vec<Arc<PooledTransaction>>>,
        HashMap<Address, Vec<Arc<PooledTransaction>>>,
    ) {
        let inner = self.inner.read();
        let pending = inner
            .pending
            .iter()
            .map(|(addr, list)| (*addr, list.flatten()))
            .collect();
        let queued = inner
            .queued
            .iter()
            .map(|(addr, list)| (*addr, list.flatten()))
            .collect();
        (pending, queued)
    }

    /// Pending and queued contents of one account.
    #[allow(clippy::type_complexity)]
    pub fn content_from(
        &self,
        addr: &Address,
    ) -> (Vec<Arc<PooledTransaction>>, Vec<Arc<PooledTransaction>>) {
        let inner = self.inner.read();
        (
            inner.pending.get(addr).map(|l| l.flatten()).unwrap_or_default(),
            inner.queued.get(addr).map(|l| l.flatten()).unwrap_or_default(),
        )
    }

    /// Where a transaction currently sits.
    pub fn status(&self, hash: &H256) -> TxStatus {
        let inner = self.inner.read();
        let Some(tx) = inner.lookup.get(hash) else {
            return TxStatus::Unknown;
        };
        let in_pending = inner
            .pending
            .get(&tx.sender)
            .is_some_and(|list| list.overlaps(tx.nonce()));
        if in_pending {
            TxStatus::Pending
        } else {
            TxStatus::Queued
        }
    }

    /// Transaction by hash.
    pub fn get(&self, hash: &H256) -> Option<Arc<PooledTransaction>> {
        self.inner.read().lookup.get(hash).cloned()
    }

    /// Next nonce for `addr` including the pool's executable transactions.
    pub fn pending_nonce(&self, addr: &Address) -> u64 {
        let inner = self.inner.read();
        match inner.pending.get(addr).and_then(|list| list.last_nonce()) {
            Some(last) => last + 1,
            None => inner.state.account(addr).nonce,
        }
    }

    /// Executable transactions per account, nonce-sorted.
    pub fn pending(&self) -> HashMap<Address, Vec<Arc<PooledTransaction>>> {
        let inner = self.inner.read();
        inner
            .pending
            .iter()
            .map(|(addr, list)| (*addr, list.flatten()))
            .collect()
    }

    /// Executable transactions ordered for block construction: globally by
    /// effective tip at `base_fee` (descending), nonce order preserved per
    /// account, accounts priced below the base fee skipped.
    pub fn pending_ordered(&self, base_fee: u128) -> Vec<Arc<PooledTransaction>> {
        let mut queues: Vec<VecDeque<Arc<PooledTransaction>>> = {
            let inner = self.inner.read();
            inner
                .pending
                .values()
                .map(|list| {
                    let mut queue = VecDeque::new();
                    for tx in list.flatten() {
                        if tx.fee_cap() < base_fee {
                            // An unincludable transaction gaps everything
                            // behind it.
                            break;
                        }
                        queue.push_back(tx);
                    }
                    queue
                })
                .filter(|queue| !queue.is_empty())
                .collect()
        };

        #[derive(PartialEq, Eq)]
        struct Head {
            tip: u128,
            hash: H256,
            idx: usize,
        }
        impl PartialOrd for Head {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for Head {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                (self.tip, self.hash).cmp(&(other.tip, other.hash))
            }
        }

        let mut heap = BinaryHeap::with_capacity(queues.len());
        for (idx, queue) in queues.iter().enumerate() {
            if let Some(tx) = queue.front() {
                heap.push(Head {
                    tip: tx.effective_tip_or_zero(base_fee),
                    hash: tx.hash,
                    idx,
                });
            }
        }
        let mut ordered = Vec::new();
        while let Some(head) = heap.pop() {
            if let Some(tx) = queues[head.idx].pop_front() {
                ordered.push(tx);
            }
            if let Some(next) = queues[head.idx].front() {
                heap.push(Head {
                    tip: next.effective_tip_or_zero(base_fee),
                    hash: next.hash,
                    idx: head.idx,
                });
            }
        }
        ordered
    }

    // ── Subscriptions and administration ────────────────────────────────

    /// Subscribe to new-executable-transaction events.
    pub fn subscribe_pending(&self) -> broadcast::Receiver<PendingEvent> {
        self.pending_events.subscribe()
    }

    /// Subscribe to reorg-completed events.
    pub fn subscribe_reorgs(&self) -> broadcast::Receiver<ReorgEvent> {
        self.reorg_events.subscribe()
    }

    /// Raise or lower the minimum tip enforced on remote transactions.
    pub fn set_min_tip(&self, min_tip: u128) {
        let dropped = {
            let mut inner = self.inner.write();
            let dropped = inner.reprice(min_tip);
            inner.update_gauges(&self.metrics);
            dropped
        };
        if dropped > 0 {
            self.metrics.counter("txpool/underpriced", dropped);
        }
    }

    /// Install the address-reservation callback shared with other
    /// sub-pools.
    pub fn set_reserver(&self, reserver: Arc<dyn AddressReserver>) {
        self.inner.write().reserver = Some(reserver);
    }

    /// The pool's metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Stop the worker and maintenance tasks, flush and close the journal.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        if let Err(err) = self.rotate_journal() {
            warn!("Final journal rotation failed: {}", err);
        }
        if let Some(journal) = self.journal.lock().as_mut() {
            journal.close();
        }
        info!("Transaction pool stopped");
    }

    /// Audit every structural invariant, panicking on violation.
    #[doc(hidden)]
    pub fn verify_integrity(&self) {
        self.inner.write().verify_integrity();
    }
}

fn merge_request(
    req: ReorgRequest,
    reset: &mut Option<BlockHeader>,
    accounts: &mut Vec<Address>,
    acks: &mut Vec<oneshot::Sender<()>>,
) {
    match req {
        ReorgRequest::Reset { head, done } => {
            // Newest head wins; the superseded reset's waiters complete
            // with the merged run.
            *reset = Some(head);
            if let Some(done) = done {
                acks.push(done);
            }
        }
        ReorgRequest::Promote { accounts: more, done } => {
            accounts.extend(more);
            if let Some(done) = done {
                acks.push(done);
            }
        }
    }
}
