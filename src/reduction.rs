//! Candidate-pool reduction: how the set of plausible answers shrinks as hints
//! are revealed in order, plus the per-candidate status shown next to the list.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::{Candidate, CandidateId, ElimMode, Hint, HintId};
use crate::elimination::EliminationMap;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReductionStep {
  pub label: String,
  pub remaining_count: usize,
  pub eliminated_this_step: Vec<String>,
}

/// Hints that feed the reduction under `mode`.
///
/// Sequential takes the first `step` hints by position; per-hint takes the
/// revealed hints in their stored order and ignores `step`.
pub fn revealed_hints<'a>(
  hints: &'a [Hint],
  mode: ElimMode,
  step: usize,
  revealed: &BTreeSet<HintId>,
) -> Vec<&'a Hint> {
  match mode {
    ElimMode::Sequential => hints.iter().take(step.min(hints.len())).collect(),
    ElimMode::PerHint => hints.iter().filter(|h| revealed.contains(&h.id)).collect(),
  }
}

/// Pool sizes as hints are applied in order. The first entry is the full pool.
///
/// The pool only ever shrinks: a candidate dropped at step i is gone for every
/// later step, whatever later hints say about it. Candidates are tracked by
/// position, so duplicate texts are counted separately.
pub fn reduce(hints: &[&Hint], candidates: &[String], map: &EliminationMap) -> Vec<ReductionStep> {
  let mut pool: Vec<usize> = (0..candidates.len()).collect();
  let mut steps = Vec::with_capacity(hints.len() + 1);
  steps.push(ReductionStep {
    label: "Start".into(),
    remaining_count: pool.len(),
    eliminated_this_step: Vec::new(),
  });

  for (i, hint) in hints.iter().enumerate() {
    let (gone, kept): (Vec<usize>, Vec<usize>) =
      pool.iter().partition(|&&p| map.is_eliminated(hint.id, p));
    pool = kept;
    steps.push(ReductionStep {
      label: format!("Hint {}", i + 1),
      remaining_count: pool.len(),
      eliminated_this_step: gone.into_iter().map(|p| candidates[p].clone()).collect(),
    });
  }
  steps
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidateStatus {
  pub id: CandidateId,
  pub position: usize,
  pub text: String,
  pub is_ground_truth: bool,
  pub eliminated: bool,
  /// Colors of the revealed hints that rule this candidate out. Sequential
  /// mode stops at the first one.
  pub eliminated_by: Vec<String>,
}

pub fn candidate_statuses(
  candidates: &[Candidate],
  hints: &[Hint],
  mode: ElimMode,
  step: usize,
  revealed: &BTreeSet<HintId>,
  map: &EliminationMap,
) -> Vec<CandidateStatus> {
  let active = revealed_hints(hints, mode, step, revealed);
  candidates
    .iter()
    .enumerate()
    .map(|(pos, c)| {
      let mut colors = Vec::new();
      for h in &active {
        if map.is_eliminated(h.id, pos) {
          colors.push(h.display_color.clone());
          if mode == ElimMode::Sequential { break; }
        }
      }
      CandidateStatus {
        id: c.id,
        position: pos,
        text: c.text.clone(),
        is_ground_truth: c.is_ground_truth,
        eliminated: !colors.is_empty(),
        eliminated_by: colors,
      }
    })
    .collect()
}
