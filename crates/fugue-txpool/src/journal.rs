//! Crash-recovery journal for local transactions
//!
//! Newline-delimited JSON, one transaction per line, appended on admission
//! and replayed through the normal admission path at startup. Rotation
//! rewrites the file from the live local set through a temp file and an
//! atomic rename, bounding growth from replaced and evicted entries.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use fugue_primitives::Address;
use fugue_types::SignedTransaction;
use tracing::{debug, info, warn};

use crate::error::{TxPoolError, TxPoolResult};
use crate::tx::PooledTransaction;

/// Append-only journal of local transactions
pub struct TxJournal {
    path: PathBuf,
    /// Active append handle; `None` until the first rotation, so replayed
    /// entries are not re-appended during load.
    writer: Option<BufWriter<File>>,
}

impl TxJournal {
    /// Journal backed by `path`; the file is not touched until `load` or
    /// `rotate`.
    pub fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }

    /// Replay the journal through `add`, one transaction at a time.
    ///
    /// Unparseable lines and admission failures are tolerated: replayed
    /// state may be stale (mined, superseded) and partial recovery beats
    /// none.
    pub fn load<F>(&mut self, mut add: F) -> TxPoolResult<()>
    where
        F: FnMut(SignedTransaction) -> TxPoolResult<()>,
    {
        if !self.path.exists() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(|e| TxPoolError::Journal(e.to_string()))?;
        let mut total = 0usize;
        let mut dropped = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| TxPoolError::Journal(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            total += 1;
            match serde_json::from_str::<SignedTransaction>(&line) {
                Ok(tx) => {
                    if let Err(err) = add(tx) {
                        debug!("Skipping journaled transaction: {}", err);
                        dropped += 1;
                    }
                }
                Err(err) => {
                    debug!("Skipping corrupted journal line: {}", err);
                    dropped += 1;
                }
            }
        }
        info!(
            transactions = total,
            dropped = dropped,
            path = %self.path.display(),
            "Loaded local transaction journal"
        );
        Ok(())
    }

    /// Append one transaction. A no-op while no writer is active (i.e.
    /// during replay, before the first rotation).
    pub fn insert(&mut self, tx: &SignedTransaction) -> TxPoolResult<()> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => return Ok(()),
        };
        let line =
            serde_json::to_string(tx).map_err(|e| TxPoolError::Journal(e.to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| TxPoolError::Journal(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TxPoolError::Journal(e.to_string()))?;
        Ok(())
    }

    /// Rewrite the journal to exactly `all` (the current local set) via a
    /// temp file and rename, then reopen for appending.
    pub fn rotate(
        &mut self,
        all: &BTreeMap<Address, Vec<Arc<PooledTransaction>>>,
    ) -> TxPoolResult<()> {
        self.writer = None;

        let tmp = self.path.with_extension("new");
        let mut written = 0usize;
        {
            let file = File::create(&tmp).map_err(|e| TxPoolError::Journal(e.to_string()))?;
            let mut out = BufWriter::new(file);
            for txs in all.values() {
                for tx in txs {
                    let line = serde_json::to_string(&tx.tx)
                        .map_err(|e| TxPoolError::Journal(e.to_string()))?;
                    writeln!(out, "{}", line).map_err(|e| TxPoolError::Journal(e.to_string()))?;
                    written += 1;
                }
            }
            out.flush().map_err(|e| TxPoolError::Journal(e.to_string()))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| TxPoolError::Journal(e.to_string()))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| TxPoolError::Journal(e.to_string()))?;
        self.writer = Some(BufWriter::new(file));

        debug!(
            transactions = written,
            accounts = all.len(),
            path = %self.path.display(),
            "Regenerated local transaction journal"
        );
        Ok(())
    }

    /// Flush and drop the writer.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                warn!("Failed to flush transaction journal: {}", err);
            }
        }
    }
}

impl Drop for TxJournal {
    fn drop(&mut self) {
        self.close();
    }
}
