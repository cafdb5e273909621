//! Elimination map: per hint, one flag per candidate in the current candidate
//! ordering, `true` meaning the hint rules that candidate out.
//!
//! Invariant: every vector has exactly one entry per candidate. Candidate
//! insertion/removal resizes all vectors in lockstep; anything that cannot be
//! resized (a replaced candidate list) drops the vectors instead.
//!
//! Evaluation batches claim the hints they cover. A second batch claiming an
//! already-claimed hint is rejected, and a batch that finishes after the map was
//! invalidated is discarded rather than written over fresh state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::HintId;
use crate::error::ConsoleError;

/// Per-candidate compatibility flags as returned by the evaluation service, keyed by candidate text.
pub type CompatibilityRow = Map<String, Value>;

/// Only the number `1` keeps a candidate; strings, booleans and absent flags eliminate it.
pub fn is_kept(flag: Option<&Value>) -> bool {
  matches!(flag, Some(Value::Number(n)) if n.as_f64() == Some(1.0))
}

/// Elimination vector for `candidate_order` from one compatibility row.
pub fn vector_from_row<S: AsRef<str>>(candidate_order: &[S], row: &CompatibilityRow) -> Vec<bool> {
  candidate_order.iter().map(|c| !is_kept(row.get(c.as_ref()))).collect()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EliminationMap {
  vectors: BTreeMap<HintId, Vec<bool>>,
  #[serde(default)]
  version: u64,
  #[serde(skip)]
  epoch: u64,
  #[serde(skip)]
  claims: BTreeMap<u64, BTreeSet<HintId>>,
  #[serde(skip)]
  next_batch: u64,
}

impl PartialEq for EliminationMap {
  fn eq(&self, other: &Self) -> bool { self.vectors == other.vectors }
}

/// Claim on a set of hints held by one in-flight evaluation batch.
#[derive(Debug)]
pub struct BatchTicket {
  id: u64,
  epoch: u64,
  hints: BTreeSet<HintId>,
}

impl EliminationMap {
  pub fn new() -> Self { Self::default() }

  /// Monotonic change counter; bumps on every mutation.
  pub fn version(&self) -> u64 { self.version }

  fn touch(&mut self) { self.version = self.version.wrapping_add(1); }

  pub fn len(&self) -> usize { self.vectors.len() }
  pub fn is_empty(&self) -> bool { self.vectors.is_empty() }

  pub fn vector(&self, hint: HintId) -> Option<&[bool]> {
    self.vectors.get(&hint).map(Vec::as_slice)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&HintId, &Vec<bool>)> { self.vectors.iter() }

  pub fn is_eliminated(&self, hint: HintId, position: usize) -> bool {
    self.vectors.get(&hint).and_then(|v| v.get(position)).copied().unwrap_or(false)
  }

  pub fn set_vector(&mut self, hint: HintId, flags: Vec<bool>) {
    self.vectors.insert(hint, flags);
    self.touch();
  }

  /// Replace the vector for `hint` with one flag per entry of `candidate_order`.
  /// Other hints keep their vectors.
  pub fn record_evaluation<S: AsRef<str>>(&mut self, hint: HintId, candidate_order: &[S], row: &CompatibilityRow) {
    let v = vector_from_row(candidate_order, row);
    debug!(target: "elimination", %hint, eliminated = v.iter().filter(|e| **e).count(), total = v.len(), "Recorded evaluation");
    self.set_vector(hint, v);
  }

  /// Rebuild from raw per-hint records. Hints outside `known` are skipped.
  pub fn from_records<S: AsRef<str>>(
    records: &[(HintId, CompatibilityRow)],
    candidate_order: &[S],
    known: &BTreeSet<HintId>,
  ) -> Self {
    let mut map = Self::new();
    for (hint, row) in records {
      if !known.contains(hint) {
        warn!(target: "elimination", %hint, "Dropping compatibility record for unknown hint");
        continue;
      }
      map.vectors.insert(*hint, vector_from_row(candidate_order, row));
    }
    map.touch();
    map
  }

  /// A new candidate at `position` starts not-eliminated in every vector.
  pub fn insert_candidate(&mut self, position: usize) {
    for v in self.vectors.values_mut() {
      let at = position.min(v.len());
      v.insert(at, false);
    }
    self.touch();
  }

  pub fn append_candidate(&mut self) {
    for v in self.vectors.values_mut() {
      v.push(false);
    }
    self.touch();
  }

  pub fn remove_candidate(&mut self, position: usize) {
    for v in self.vectors.values_mut() {
      if position < v.len() {
        v.remove(position);
      }
    }
    self.touch();
  }

  pub fn remove_hint(&mut self, hint: HintId) {
    if self.vectors.remove(&hint).is_some() {
      self.touch();
    }
  }

  /// Keep only vectors of hints in `known`.
  pub fn retain_hints(&mut self, known: &BTreeSet<HintId>) {
    let before = self.vectors.len();
    self.vectors.retain(|h, _| known.contains(h));
    if self.vectors.len() != before {
      self.touch();
    }
  }

  /// Drop every vector whose length disagrees with `candidate_count`.
  /// Returns how many were dropped.
  pub fn drop_stale(&mut self, candidate_count: usize) -> usize {
    let before = self.vectors.len();
    self.vectors.retain(|_, v| v.len() == candidate_count);
    let dropped = before - self.vectors.len();
    if dropped > 0 {
      warn!(target: "elimination", dropped, candidate_count, "Dropped stale elimination vectors");
      self.touch();
    }
    dropped
  }

  pub fn is_consistent(&self, candidate_count: usize) -> bool {
    self.vectors.values().all(|v| v.len() == candidate_count)
  }

  /// Invalidate all vectors. In-flight batches started before this call will be discarded on commit.
  pub fn clear(&mut self) {
    self.vectors.clear();
    self.epoch = self.epoch.wrapping_add(1);
    self.touch();
  }

  /// Claim `hints` for one evaluation batch.
  pub fn begin_batch(&mut self, hints: &[HintId]) -> Result<BatchTicket, ConsoleError> {
    let wanted: BTreeSet<HintId> = hints.iter().copied().collect();
    if let Some(taken) = self.claims.values().flat_map(|s| s.iter()).find(|h| wanted.contains(h)) {
      return Err(ConsoleError::BatchConflict { hint: *taken });
    }
    self.next_batch = self.next_batch.wrapping_add(1);
    let id = self.next_batch;
    self.claims.insert(id, wanted.clone());
    Ok(BatchTicket { id, epoch: self.epoch, hints: wanted })
  }

  /// Write a batch's results and release its claim. `rows` pairs each hint with its
  /// compatibility row. Returns `false` when the map was invalidated since the batch
  /// began; nothing is written in that case.
  pub fn commit_batch<S: AsRef<str>>(
    &mut self,
    ticket: BatchTicket,
    candidate_order: &[S],
    rows: &[(HintId, CompatibilityRow)],
  ) -> bool {
    self.claims.remove(&ticket.id);
    if ticket.epoch != self.epoch {
      warn!(target: "elimination", batch = ticket.id, "Discarding evaluation batch started before invalidation");
      return false;
    }
    for (hint, row) in rows {
      if !ticket.hints.contains(hint) {
        continue;
      }
      self.record_evaluation(*hint, candidate_order, row);
    }
    true
  }

  /// Release a claim without writing.
  pub fn abandon_batch(&mut self, ticket: BatchTicket) {
    self.claims.remove(&ticket.id);
  }

  /// Whether `ticket` was issued since the last invalidation.
  pub fn is_current(&self, ticket: &BatchTicket) -> bool { ticket.epoch == self.epoch }

  /// Drop every vector while leaving in-flight batches valid. Used when the
  /// candidate list is replaced by the batch that is about to commit.
  pub fn drop_vectors(&mut self) {
    self.vectors.clear();
    self.touch();
  }

  /// Take the vectors of a freshly rebuilt map, keeping batch bookkeeping.
  /// Counts as an invalidation for batches already in flight.
  pub fn replace_vectors(&mut self, fresh: EliminationMap) {
    self.vectors = fresh.vectors;
    self.epoch = self.epoch.wrapping_add(1);
    self.touch();
  }
}
