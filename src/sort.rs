//! Stable hint ordering by a metric.
//!
//! Finite values compare numerically (reversed for `Desc`). Hints without a
//! finite value always sink below every finite one, in both directions, and
//! keep their relative order.

use std::cmp::Ordering;

use crate::domain::{Hint, MetricKey, SortDirection};
use crate::metrics::{metric_score, MetricsByHint};

fn compare(a: f64, b: f64, dir: SortDirection) -> Ordering {
  match (a.is_finite(), b.is_finite()) {
    (false, false) => Ordering::Equal,
    (false, true) => Ordering::Greater,
    (true, false) => Ordering::Less,
    (true, true) => match dir {
      SortDirection::Asc => a.total_cmp(&b),
      SortDirection::Desc => b.total_cmp(&a),
    },
  }
}

/// Pure, non-mutating stable sort.
pub fn sort_hints(
  hints: &[Hint],
  metrics: &MetricsByHint,
  key: MetricKey,
  dir: SortDirection,
) -> Vec<Hint> {
  let mut keyed: Vec<(f64, &Hint)> = hints
    .iter()
    .map(|h| (metric_score(metrics, h.id, key), h))
    .collect();
  keyed.sort_by(|(a, _), (b, _)| compare(*a, *b, dir));
  keyed.into_iter().map(|(_, h)| h.clone()).collect()
}
