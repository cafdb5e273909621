//! Pairwise similarity between hints: lexical token overlap, overlap of
//! eliminated/kept candidate sets, and the service's embedding similarities.
//! Analytics only; nothing here drives control flow.

use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::domain::{Candidate, Hint, HintId};
use crate::elimination::EliminationMap;

/// Lowercased word set; every char that is neither alphanumeric, `_`, nor whitespace is dropped.
pub fn tokenize(text: &str) -> HashSet<String> {
  let cleaned: String = text
    .to_lowercase()
    .chars()
    .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
    .collect();
  cleaned.split_whitespace().map(str::to_string).collect()
}

/// `|A ∩ B| / |A ∪ B|`, with `both_empty` returned when both sets are empty.
fn set_jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>, both_empty: f64) -> f64 {
  if a.is_empty() && b.is_empty() {
    return both_empty;
  }
  let inter = a.intersection(b).count();
  let union = a.len() + b.len() - inter;
  if union == 0 { both_empty } else { inter as f64 / union as f64 }
}

/// Token-set Jaccard similarity. Two empty texts are identical (1); one empty text shares nothing (0).
pub fn jaccard(a: &str, b: &str) -> f64 {
  set_jaccard(&tokenize(a), &tokenize(b), 1.0)
}

/// Symmetric N×N matrix with `diagonal` forced; each off-diagonal pair is computed once.
pub fn pairwise_matrix<T, F>(items: &[T], diagonal: f64, mut score: F) -> Vec<Vec<f64>>
where
  F: FnMut(&T, &T) -> f64,
{
  let n = items.len();
  let mut m = vec![vec![0.0; n]; n];
  for i in 0..n {
    m[i][i] = diagonal;
    for j in (i + 1)..n {
      let s = score(&items[i], &items[j]);
      m[i][j] = s;
      m[j][i] = s;
    }
  }
  m
}

pub fn lexical_matrix(hints: &[Hint]) -> Vec<Vec<f64>> {
  let tokens: Vec<HashSet<String>> = hints.iter().map(|h| tokenize(&h.text)).collect();
  pairwise_matrix(&tokens, 1.0, |a, b| set_jaccard(a, b, 1.0))
}

/// Candidate positions a hint eliminates (`true`) or keeps (`false`).
fn position_sets(hints: &[Hint], candidates: &[Candidate], map: &EliminationMap, eliminated: bool) -> Vec<HashSet<usize>> {
  hints
    .iter()
    .map(|h| match map.vector(h.id) {
      Some(v) => (0..candidates.len()).filter(|&i| v.get(i).copied() == Some(eliminated)).collect(),
      None => HashSet::new(),
    })
    .collect()
}

/// Jaccard over each pair of hints' eliminated-candidate sets. Empty pool or two
/// empty sets count as identical.
pub fn eliminated_overlap_matrix(hints: &[Hint], candidates: &[Candidate], map: &EliminationMap) -> Vec<Vec<f64>> {
  if candidates.is_empty() {
    return pairwise_matrix(hints, 1.0, |_, _| 1.0);
  }
  let sets = position_sets(hints, candidates, map, true);
  pairwise_matrix(&sets, 1.0, |a, b| set_jaccard(a, b, 1.0))
}

/// Jaccard over each pair of hints' kept-candidate sets.
pub fn kept_overlap_matrix(hints: &[Hint], candidates: &[Candidate], map: &EliminationMap) -> Vec<Vec<f64>> {
  if candidates.is_empty() {
    return pairwise_matrix(hints, 1.0, |_, _| 1.0);
  }
  let sets = position_sets(hints, candidates, map, false);
  pairwise_matrix(&sets, 1.0, |a, b| set_jaccard(a, b, 1.0))
}

/// Embedding similarities as computed upstream, rows and columns in `ids` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
  ids: Vec<HintId>,
  rows: Vec<Vec<f64>>,
}

impl EmbeddingMatrix {
  /// `None` unless `rows` is square and has one row per id.
  pub fn new(ids: Vec<HintId>, rows: Vec<Vec<f64>>) -> Option<Self> {
    let n = ids.len();
    if n == 0 || rows.len() != n || rows.iter().any(|r| r.len() != n) {
      return None;
    }
    Some(Self { ids, rows })
  }

  pub fn ids(&self) -> &[HintId] {
    &self.ids
  }

  /// The sub-matrix for `hints` in their order, diagonal forced to 1. `None`
  /// when any of the hints is not covered.
  pub fn for_hints(&self, hints: &[Hint]) -> Option<Vec<Vec<f64>>> {
    // a cached matrix skips `new`
    let n = self.ids.len();
    if self.rows.len() != n || self.rows.iter().any(|r| r.len() != n) {
      return None;
    }
    let idx: Vec<usize> = hints
      .iter()
      .map(|h| self.ids.iter().position(|id| *id == h.id))
      .collect::<Option<_>>()?;
    Some(pairwise_matrix(&idx, 1.0, |&a, &b| self.rows[a][b]))
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct SimilarityReport {
  pub hint_ids: Vec<HintId>,
  pub lexical: Vec<Vec<f64>>,
  pub eliminated_overlap: Vec<Vec<f64>>,
  pub kept_overlap: Vec<Vec<f64>>,
  /// Absent until the service has embedded every displayed hint.
  pub embedding: Option<Vec<Vec<f64>>>,
}

pub fn similarity_report(
  hints: &[Hint],
  candidates: &[Candidate],
  map: &EliminationMap,
  embedding: Option<&EmbeddingMatrix>,
) -> SimilarityReport {
  SimilarityReport {
    hint_ids: hints.iter().map(|h| h.id).collect(),
    lexical: lexical_matrix(hints),
    eliminated_overlap: eliminated_overlap_matrix(hints, candidates, map),
    kept_overlap: kept_overlap_matrix(hints, candidates, map),
    embedding: embedding.and_then(|e| e.for_hints(hints)),
  }
}
