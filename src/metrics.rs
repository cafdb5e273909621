//! Metric rows and the spelling-tolerant metric accessor.
//!
//! Upstream services spell metric keys either `answer-leakage` or `answer_leakage`.
//! Rows store whatever spelling arrived; lookups try the exact key, then the
//! underscore form, then the hyphen form. Non-finite values never enter a row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{HintId, MetricKey};
use crate::util::to_finite;

const LEAKAGE: &str = "answer-leakage";
const LEAKAGE_AVOIDANCE: &str = "leakage-avoidance";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, f64>")]
pub struct MetricRow(BTreeMap<String, f64>);

pub type MetricsByHint = BTreeMap<HintId, MetricRow>;

impl MetricRow {
  pub fn new() -> Self { Self::default() }

  /// Insert a value; non-finite values are ignored.
  pub fn insert(&mut self, key: impl Into<String>, value: f64) {
    if value.is_finite() {
      self.0.insert(key.into(), value);
    }
  }

  /// Build a row from loosely typed pairs, dropping anything that is not a finite number.
  pub fn from_pairs<'a, I>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
  {
    let mut row = Self::new();
    for (k, v) in pairs {
      if let Some(n) = to_finite(v) {
        row.insert(k, n);
      }
    }
    row
  }

  /// Build a row from an evaluation metric list: names are normalised to the
  /// hyphen spelling and `leakage-avoidance` is derived when only leakage arrived.
  pub fn from_metric_list<'a, I>(metrics: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
  {
    let mut row = Self::new();
    for (name, value) in metrics {
      let name = name.trim();
      if name.is_empty() { continue; }
      if let Some(n) = to_finite(value) {
        row.insert(name.replace('_', "-"), n);
      }
    }
    row.derive_leakage_avoidance();
    row
  }

  pub fn derive_leakage_avoidance(&mut self) {
    let explicit = read_metric(Some(self), LEAKAGE_AVOIDANCE);
    if explicit.is_finite() { return; }
    let leak = read_metric(Some(self), LEAKAGE);
    if leak.is_finite() {
      self.insert(LEAKAGE_AVOIDANCE, 1.0 - leak);
    }
  }

  pub fn raw(&self, key: &str) -> Option<f64> { self.0.get(key).copied() }
  pub fn is_empty(&self) -> bool { self.0.is_empty() }
  pub fn len(&self) -> usize { self.0.len() }
  pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> { self.0.iter() }
}

impl From<BTreeMap<String, Value>> for MetricRow {
  fn from(map: BTreeMap<String, Value>) -> Self {
    Self::from_pairs(map.iter().map(|(k, v)| (k.as_str(), v)))
  }
}

impl From<MetricRow> for BTreeMap<String, f64> {
  fn from(row: MetricRow) -> Self { row.0 }
}

/// Spellings tried for `key`, in lookup order.
fn spellings(key: &str) -> [String; 3] {
  [key.to_string(), key.replace('-', "_"), key.replace('_', "-")]
}

/// Scalar value for `key`, or NaN when the row is absent or no spelling holds a finite value.
pub fn read_metric(row: Option<&MetricRow>, key: &str) -> f64 {
  let Some(row) = row else { return f64::NAN };
  spellings(key)
    .iter()
    .filter_map(|k| row.raw(k))
    .find(|v| v.is_finite())
    .unwrap_or(f64::NAN)
}

/// Like [`read_metric`], but derives `leakage-avoidance = 1 - answer-leakage`
/// when the avoidance score is not present itself.
pub fn metric_value(row: Option<&MetricRow>, key: &str) -> f64 {
  let direct = read_metric(row, key);
  if direct.is_finite() {
    return direct;
  }
  if key.replace('_', "-") == LEAKAGE_AVOIDANCE {
    let leak = read_metric(row, LEAKAGE);
    if leak.is_finite() {
      return 1.0 - leak;
    }
  }
  f64::NAN
}

pub fn metric_score(metrics: &MetricsByHint, hint: HintId, key: MetricKey) -> f64 {
  metric_value(metrics.get(&hint), key.as_str())
}

pub fn convergence_of(metrics: &MetricsByHint, hint: HintId) -> f64 {
  metric_score(metrics, hint, MetricKey::Convergence)
}

/// A hint counts as evaluated once it has a non-empty row.
pub fn has_metrics(metrics: &MetricsByHint, hint: HintId) -> bool {
  metrics.get(&hint).map(|r| !r.is_empty()).unwrap_or(false)
}
