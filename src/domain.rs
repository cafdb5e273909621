//! Domain models: hints, candidates, metric keys, run configuration and view settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned hint identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HintId(pub i64);

impl fmt::Display for HintId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Candidate identifier. Position is derived from the candidate ordering at render time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub i64);

impl fmt::Display for CandidateId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hint {
  pub id: HintId,
  pub text: String,
  /// `#rrggbb`, derived from the id unless restored from a trusted cache.
  pub display_color: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  pub id: CandidateId,
  pub text: String,
  #[serde(default)]
  pub is_ground_truth: bool,
}

/// Metrics the console knows how to display and sort by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKey {
  #[serde(rename = "convergence")]
  Convergence,
  #[serde(rename = "relevance")]
  Relevance,
  #[serde(rename = "familiarity")]
  Familiarity,
  #[serde(rename = "readability")]
  Readability,
  #[serde(rename = "answer-leakage", alias = "answer_leakage")]
  AnswerLeakage,
  #[serde(rename = "leakage-avoidance", alias = "leakage_avoidance")]
  LeakageAvoidance,
}

impl MetricKey {
  pub const ALL: [MetricKey; 6] = [
    MetricKey::Convergence,
    MetricKey::Relevance,
    MetricKey::Familiarity,
    MetricKey::Readability,
    MetricKey::AnswerLeakage,
    MetricKey::LeakageAvoidance,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      MetricKey::Convergence => "convergence",
      MetricKey::Relevance => "relevance",
      MetricKey::Familiarity => "familiarity",
      MetricKey::Readability => "readability",
      MetricKey::AnswerLeakage => "answer-leakage",
      MetricKey::LeakageAvoidance => "leakage-avoidance",
    }
  }
}

impl Default for MetricKey {
  fn default() -> Self { MetricKey::Convergence }
}

impl fmt::Display for MetricKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
  Asc,
  Desc,
}

impl Default for SortDirection {
  fn default() -> Self { SortDirection::Desc }
}

/// Which hints feed the candidate-pool reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElimMode {
  /// First N hints by position, N = step counter.
  #[serde(alias = "sequence")]
  Sequential,
  /// Only hints explicitly toggled revealed.
  #[serde(alias = "manual")]
  PerHint,
}

impl Default for ElimMode {
  fn default() -> Self { ElimMode::PerHint }
}

/// Per-run generation/evaluation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
  pub model_name: String,
  pub small_model_name: String,
  pub temperature: f32,
  pub num_hints: usize,
  pub hint_max_tokens: u32,
  pub num_candidates: usize,
  pub candidate_max_tokens: u32,
  pub answer_enabled: bool,
}

pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo";
pub const DEFAULT_SMALL_MODEL: &str = "moonshotai/Kimi-K2-Instruct-0905";

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      model_name: DEFAULT_MODEL.into(),
      small_model_name: DEFAULT_SMALL_MODEL.into(),
      temperature: 0.3,
      num_hints: 5,
      hint_max_tokens: 512,
      num_candidates: 11,
      candidate_max_tokens: 256,
      answer_enabled: false,
    }
  }
}

/// A named entity found in a hint's text by the evaluation service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub text: String,
  #[serde(rename = "type", default)]
  pub kind: String,
  #[serde(default)]
  pub start: usize,
  #[serde(default)]
  pub end: usize,
  #[serde(default)]
  pub metadata: serde_json::Value,
}
