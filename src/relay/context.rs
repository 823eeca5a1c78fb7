//! Per-batch relay state
//!
//! Created at the start of one relay invocation and dropped at its end.
//! Nothing here is shared between invocations.

use serde::Serialize;
use std::collections::HashSet;

use super::decoder::DedupKey;

/// A request that got a transaction on chain in this batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub key: DedupKey,
    pub nonce: u64,
}

/// Dedup set plus the local nonce counter for one batch
#[derive(Debug)]
pub struct BatchContext {
    base_nonce: u64,
    next_nonce: u64,
    seen: HashSet<DedupKey>,
    records: Vec<SubmissionRecord>,
}

impl BatchContext {
    /// `base_nonce` is the signer's transaction count read once at batch start
    pub fn new(base_nonce: u64) -> Self {
        Self {
            base_nonce,
            next_nonce: base_nonce,
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }

    /// True the first time `key` is seen in this batch
    pub fn first_seen(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    /// Nonce the next transaction will be signed with
    pub fn peek_nonce(&self) -> u64 {
        self.next_nonce
    }

    /// Record a sent transaction and advance the counter
    pub fn commit(&mut self, key: DedupKey) -> u64 {
        let nonce = self.next_nonce;
        self.records.push(SubmissionRecord { key, nonce });
        self.next_nonce += 1;
        nonce
    }

    pub fn base_nonce(&self) -> u64 {
        self.base_nonce
    }

    pub fn records(&self) -> &[SubmissionRecord] {
        &self.records
    }
}
