//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::console::{EvaluationSummary, HintView, Phase};
use crate::domain::{Candidate, CandidateId, ElimMode, HintId, MetricKey, RunConfig, SortDirection};
use crate::metrics::MetricsByHint;
use crate::reduction::{CandidateStatus, ReductionStep};
use crate::similarity::SimilarityReport;

// --- HTTP inputs ---

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
  pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct TextIn {
  pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct HintUpdateIn {
  pub id: HintId,
  pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct HintIdIn {
  pub id: HintId,
}

#[derive(Debug, Deserialize)]
pub struct RevealIn {
  pub id: HintId,
  /// Omit to toggle.
  #[serde(default)]
  pub revealed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderIn {
  pub from: usize,
  pub to: usize,
}

#[derive(Debug, Deserialize)]
pub struct CandidateUpdateIn {
  pub id: CandidateId,
  pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CandidateIdIn {
  pub id: CandidateId,
}

#[derive(Debug, Deserialize)]
pub struct GroundTruthIn {
  #[serde(default)]
  pub id: Option<CandidateId>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
  pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct PresetIn {
  pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct StepIn {
  pub step: usize,
}

#[derive(Debug, Deserialize)]
pub struct ModeIn {
  pub mode: ElimMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct SortQuery {
  #[serde(default)]
  pub metric: Option<MetricKey>,
  #[serde(default)]
  pub dir: Option<SortDirection>,
}

#[derive(Debug, Deserialize)]
pub struct SortIn {
  #[serde(default)]
  pub metric: MetricKey,
  #[serde(default)]
  pub dir: SortDirection,
}

// --- HTTP outputs ---

#[derive(Debug, Serialize)]
pub struct HealthOut {
  pub ok: bool,
  pub phase: Phase,
  pub busy: bool,
  pub version: u64,
}

/// The reconciled session as the rendering layer sees it.
#[derive(Debug, Serialize)]
pub struct SnapshotOut {
  pub phase: Phase,
  pub busy: bool,
  pub version: u64,
  pub question: String,
  pub ground_truth: String,
  pub hints: Vec<HintView>,
  pub candidates: Vec<Candidate>,
  pub metrics: MetricsByHint,
  pub hint_step: usize,
  pub elim_mode: ElimMode,
  pub sort_metric: MetricKey,
  pub sort_dir: SortDirection,
  pub run: RunConfig,
}

#[derive(Debug, Serialize)]
pub struct OkOut {
  pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ChangedOut {
  pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct StepOut {
  pub step: usize,
}

#[derive(Debug, Serialize)]
pub struct RevealOut {
  pub id: HintId,
  pub revealed: bool,
}

#[derive(Debug, Serialize)]
pub struct AnswerOut {
  pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct CountOut {
  pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct PresetOut {
  pub key: &'static str,
  pub ground_truth: &'static str,
  pub hints: usize,
  pub candidates: usize,
}

#[derive(Debug, Serialize)]
pub struct QuestionsOut {
  pub questions: Vec<&'static str>,
}

// --- WebSocket ---

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  Snapshot,
  Generate { question: String },
  Evaluate,
  Reduction,
  CandidateStatus,
  Similarity,
  ToggleReveal { id: HintId },
  SetStep { step: usize },
  SetMode { mode: ElimMode },
  ApplySort {
    #[serde(default)]
    metric: MetricKey,
    #[serde(default)]
    dir: SortDirection,
  },
  Resync,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  Snapshot { snapshot: Box<SnapshotOut> },
  /// Pushed whenever the session settles after a change.
  Changed { version: u64 },
  Evaluated { summary: EvaluationSummary },
  Reduction { steps: Vec<ReductionStep> },
  CandidateStatus { candidates: Vec<CandidateStatus> },
  Similarity { report: SimilarityReport },
  Revealed { id: HintId, revealed: bool },
  Step { step: usize },
  Sorted { changed: bool },
  Ok,
  Error { message: String },
}
