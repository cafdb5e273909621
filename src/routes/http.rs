//! HTTP endpoint handlers. These are thin wrappers that forward to the console.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Query, State},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::console::Console;
use crate::domain::RunConfig;
use crate::error::ConsoleResult;
use crate::protocol::*;
use crate::seeds::{presets, suggested_questions};

pub(crate) async fn snapshot_out(console: &Console) -> SnapshotOut {
  let view = console.session_view().await;
  let s = view.snapshot;
  SnapshotOut {
    phase: view.phase,
    busy: view.busy,
    version: view.version,
    hints: view.hints,
    question: s.question,
    ground_truth: s.ground_truth,
    candidates: s.candidates,
    metrics: s.metrics,
    hint_step: s.hint_step,
    elim_mode: s.elim_mode,
    sort_metric: s.sort_metric,
    sort_dir: s.sort_dir,
    run: s.run,
  }
}

#[instrument(level = "info", skip(console))]
pub async fn http_health(State(console): State<Arc<Console>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, phase: console.phase().await, busy: console.is_busy(), version: console.version() })
}

#[instrument(level = "info", skip(console))]
pub async fn http_get_snapshot(State(console): State<Arc<Console>>) -> impl IntoResponse {
  Json(snapshot_out(&console).await)
}

#[instrument(level = "info", skip(console))]
pub async fn http_get_sorted(State(console): State<Arc<Console>>, Query(q): Query<SortQuery>) -> impl IntoResponse {
  let snap = console.snapshot().await;
  let metric = q.metric.unwrap_or(snap.sort_metric);
  let dir = q.dir.unwrap_or(snap.sort_dir);
  Json(console.sorted_hints(metric, dir).await)
}

#[instrument(level = "info", skip(console, body), fields(metric = %body.metric, dir = ?body.dir))]
pub async fn http_post_sort(State(console): State<Arc<Console>>, Json(body): Json<SortIn>) -> impl IntoResponse {
  let changed = console.apply_sort(body.metric, body.dir).await;
  Json(ChangedOut { changed })
}

#[instrument(level = "info", skip(console))]
pub async fn http_get_reduction(State(console): State<Arc<Console>>) -> impl IntoResponse {
  Json(console.reduction().await)
}

#[instrument(level = "info", skip(console))]
pub async fn http_get_candidate_status(State(console): State<Arc<Console>>) -> impl IntoResponse {
  Json(console.candidate_statuses().await)
}

#[instrument(level = "info", skip(console))]
pub async fn http_get_similarity(State(console): State<Arc<Console>>) -> impl IntoResponse {
  Json(console.similarity().await)
}

#[instrument(level = "info", skip(console))]
pub async fn http_get_entities(State(console): State<Arc<Console>>) -> impl IntoResponse {
  Json(console.entities().await)
}

// --- long operations ---

#[instrument(level = "info", skip(console, body), fields(question_len = body.question.len()))]
pub async fn http_post_generate(
  State(console): State<Arc<Console>>,
  Json(body): Json<GenerateIn>,
) -> ConsoleResult<Json<SnapshotOut>> {
  console.generate(&body.question).await?;
  Ok(Json(snapshot_out(&console).await))
}

#[instrument(level = "info", skip(console))]
pub async fn http_post_evaluate(State(console): State<Arc<Console>>) -> ConsoleResult<Json<crate::console::EvaluationSummary>> {
  let summary = console.evaluate().await?;
  info!(target: "hinteval_console", evaluated = summary.evaluated, applied = summary.applied, "HTTP evaluate done");
  Ok(Json(summary))
}

// --- hints ---

#[instrument(level = "info", skip(console, body), fields(text_len = body.text.len()))]
pub async fn http_post_hint_add(
  State(console): State<Arc<Console>>,
  Json(body): Json<TextIn>,
) -> ConsoleResult<Json<crate::domain::Hint>> {
  Ok(Json(console.add_hint(&body.text).await?))
}

#[instrument(level = "info", skip(console, body), fields(id = %body.id, text_len = body.text.len()))]
pub async fn http_post_hint_update(
  State(console): State<Arc<Console>>,
  Json(body): Json<HintUpdateIn>,
) -> ConsoleResult<Json<OkOut>> {
  console.update_hint(body.id, &body.text).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(console, body), fields(id = %body.id))]
pub async fn http_post_hint_delete(
  State(console): State<Arc<Console>>,
  Json(body): Json<HintIdIn>,
) -> ConsoleResult<Json<OkOut>> {
  console.delete_hint(body.id).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(console))]
pub async fn http_post_hint_delete_all(State(console): State<Arc<Console>>) -> ConsoleResult<Json<OkOut>> {
  console.delete_all_hints().await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(console, body), fields(from = body.from, to = body.to))]
pub async fn http_post_hint_reorder(
  State(console): State<Arc<Console>>,
  Json(body): Json<ReorderIn>,
) -> ConsoleResult<Json<ChangedOut>> {
  let changed = console.reorder_hints(body.from, body.to).await?;
  Ok(Json(ChangedOut { changed }))
}

#[instrument(level = "info", skip(console, body), fields(id = %body.id))]
pub async fn http_post_hint_reveal(
  State(console): State<Arc<Console>>,
  Json(body): Json<RevealIn>,
) -> ConsoleResult<Json<RevealOut>> {
  let revealed = console.set_revealed(body.id, body.revealed).await?;
  Ok(Json(RevealOut { id: body.id, revealed }))
}

// --- candidates ---

#[instrument(level = "info", skip(console, body), fields(text_len = body.text.len()))]
pub async fn http_post_candidate_add(
  State(console): State<Arc<Console>>,
  Json(body): Json<TextIn>,
) -> ConsoleResult<Json<SnapshotOut>> {
  console.add_candidate(&body.text).await?;
  Ok(Json(snapshot_out(&console).await))
}

#[instrument(level = "info", skip(console, body), fields(id = %body.id, text_len = body.text.len()))]
pub async fn http_post_candidate_update(
  State(console): State<Arc<Console>>,
  Json(body): Json<CandidateUpdateIn>,
) -> ConsoleResult<Json<OkOut>> {
  console.update_candidate(body.id, &body.text).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(console, body), fields(id = %body.id))]
pub async fn http_post_candidate_delete(
  State(console): State<Arc<Console>>,
  Json(body): Json<CandidateIdIn>,
) -> ConsoleResult<Json<SnapshotOut>> {
  console.delete_candidate(body.id).await?;
  Ok(Json(snapshot_out(&console).await))
}

#[instrument(level = "info", skip(console))]
pub async fn http_post_candidate_delete_all(State(console): State<Arc<Console>>) -> ConsoleResult<Json<SnapshotOut>> {
  console.delete_all_candidates().await?;
  Ok(Json(snapshot_out(&console).await))
}

#[instrument(level = "info", skip(console, body), fields(id = ?body.id))]
pub async fn http_post_ground_truth(
  State(console): State<Arc<Console>>,
  Json(body): Json<GroundTruthIn>,
) -> ConsoleResult<Json<SnapshotOut>> {
  console.set_ground_truth(body.id).await?;
  Ok(Json(snapshot_out(&console).await))
}

#[instrument(level = "info", skip(console))]
pub async fn http_post_candidates_regenerate(State(console): State<Arc<Console>>) -> ConsoleResult<Json<CountOut>> {
  let count = console.regenerate_candidates().await?;
  Ok(Json(CountOut { count }))
}

// --- answer ---

#[instrument(level = "info", skip(console, body), fields(answer_len = body.answer.len()))]
pub async fn http_post_answer_update(
  State(console): State<Arc<Console>>,
  Json(body): Json<AnswerIn>,
) -> ConsoleResult<Json<OkOut>> {
  console.update_answer(&body.answer).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(console))]
pub async fn http_post_answer_regenerate(State(console): State<Arc<Console>>) -> ConsoleResult<Json<AnswerOut>> {
  let answer = console.regenerate_answer().await?;
  Ok(Json(AnswerOut { answer }))
}

// --- session, presets, view, config ---

#[instrument(level = "info", skip(console))]
pub async fn http_post_reset(State(console): State<Arc<Console>>) -> ConsoleResult<Json<OkOut>> {
  console.reset().await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(console))]
pub async fn http_post_resync(State(console): State<Arc<Console>>) -> ConsoleResult<Json<SnapshotOut>> {
  console.resync().await?;
  Ok(Json(snapshot_out(&console).await))
}

#[instrument(level = "info")]
pub async fn http_get_presets() -> impl IntoResponse {
  let out: Vec<PresetOut> = presets()
    .into_iter()
    .map(|p| PresetOut { key: p.question, ground_truth: p.ground_truth, hints: p.hints.len(), candidates: p.candidates.len() })
    .collect();
  Json(out)
}

#[instrument(level = "info", skip(console, body), fields(key = %body.key))]
pub async fn http_post_preset_load(
  State(console): State<Arc<Console>>,
  Json(body): Json<PresetIn>,
) -> ConsoleResult<Json<SnapshotOut>> {
  console.load_preset(&body.key).await?;
  info!(target: "hinteval_console", key = %body.key, "Preset loaded");
  Ok(Json(snapshot_out(&console).await))
}

#[instrument(level = "info")]
pub async fn http_get_suggestions() -> impl IntoResponse {
  Json(QuestionsOut { questions: suggested_questions() })
}

#[instrument(level = "info", skip(console, body), fields(step = body.step))]
pub async fn http_post_step(State(console): State<Arc<Console>>, Json(body): Json<StepIn>) -> impl IntoResponse {
  Json(StepOut { step: console.set_step(body.step).await })
}

#[instrument(level = "info", skip(console, body), fields(mode = ?body.mode))]
pub async fn http_post_mode(State(console): State<Arc<Console>>, Json(body): Json<ModeIn>) -> impl IntoResponse {
  console.set_mode(body.mode).await;
  Json(OkOut { ok: true })
}

#[instrument(level = "info", skip(console, body), fields(model = %body.model_name, num_hints = body.num_hints))]
pub async fn http_post_run_config(
  State(console): State<Arc<Console>>,
  Json(body): Json<RunConfig>,
) -> ConsoleResult<Json<RunConfig>> {
  Ok(Json(console.update_run_config(body).await?))
}
