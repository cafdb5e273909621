//! Client for the upstream hint-evaluation service.
//!
//! The upstream keeps one session per cookie, so the reqwest client carries a
//! cookie store. Every call is instrumented with its path, latency and response
//! size; hint and answer texts are never logged.
//!
//! Response parsing is tolerant of shape drift: hint ids may arrive as `id` or
//! `hint_id` (number or numeric string), texts as `text` or `hint_text`. Items
//! whose id cannot be coerced to a whole number are dropped.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use crate::config::ServiceCfg;
use crate::domain::{Entity, HintId, RunConfig};
use crate::elimination::CompatibilityRow;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::MetricRow;
use crate::util::{coerce_id, coerce_to_plain_text, to_finite, trunc_for_log};

/// Authoritative session descriptor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionInfo {
  pub question: String,
  pub answer: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteHint {
  pub id: HintId,
  pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GenerateRequest {
  pub question: String,
  pub num_hints: usize,
  pub temperature: f32,
  pub max_tokens: u32,
  pub model_name: String,
  pub answer: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Generated {
  pub hints: Vec<RemoteHint>,
  pub answer: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvaluateRequest {
  pub question: String,
  pub hints: Vec<String>,
  pub hint_ids: Vec<i64>,
  pub answer: String,
  pub temperature: f32,
  pub max_tokens: u32,
  pub model_name: String,
  pub num_candidates: usize,
}

/// Evaluation results; `metrics` and `compatibility` are parallel to the hints sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evaluation {
  pub metrics: Vec<MetricRow>,
  pub compatibility: Vec<CompatibilityRow>,
  pub candidates: Vec<String>,
}

#[async_trait]
pub trait SessionService: Send + Sync {
  async fn get_session(&self) -> ServiceResult<SessionInfo>;
  async fn reset_session(&self) -> ServiceResult<()>;
  /// Mark the candidate at `position` as ground truth; `None` unmarks.
  async fn set_ground_truth(&self, position: Option<usize>) -> ServiceResult<()>;
  async fn update_answer(&self, answer: &str) -> ServiceResult<()>;
  async fn load_preset(&self, preset: &Value) -> ServiceResult<()>;
}

#[async_trait]
pub trait GenerationService: Send + Sync {
  async fn generate(&self, req: &GenerateRequest) -> ServiceResult<Generated>;
  async fn regenerate_answer(&self, run: &RunConfig, question: &str, hints: &[String]) -> ServiceResult<String>;
  async fn regenerate_candidates(&self, run: &RunConfig, hints: &[String]) -> ServiceResult<Vec<String>>;
}

#[async_trait]
pub trait EvaluationService: Send + Sync {
  async fn evaluate(&self, req: &EvaluateRequest) -> ServiceResult<Evaluation>;
  async fn fetch_metrics(&self) -> ServiceResult<Vec<(HintId, MetricRow)>>;
  /// Raw per-hint compatibility records (`candidate text -> 0/1`).
  async fn fetch_compatibility(&self) -> ServiceResult<Vec<(HintId, CompatibilityRow)>>;
  /// Embedding similarity matrix over the session's hints in ascending id order.
  async fn fetch_embedding_similarities(&self) -> ServiceResult<Vec<Vec<f64>>>;
  async fn fetch_entities(&self) -> ServiceResult<BTreeMap<HintId, Vec<Entity>>>;
}

#[async_trait]
pub trait CrudService: Send + Sync {
  async fn list_hints(&self) -> ServiceResult<Vec<RemoteHint>>;
  async fn create_hint(&self, text: &str) -> ServiceResult<RemoteHint>;
  async fn update_hint(&self, id: HintId, text: &str) -> ServiceResult<()>;
  async fn delete_hint(&self, id: HintId) -> ServiceResult<()>;
  async fn delete_all_hints(&self) -> ServiceResult<()>;
  async fn list_candidates(&self) -> ServiceResult<Vec<String>>;
  async fn create_candidate(&self, text: &str) -> ServiceResult<()>;
  async fn update_candidate(&self, position: usize, text: &str) -> ServiceResult<()>;
  async fn delete_candidate(&self, position: usize) -> ServiceResult<()>;
  async fn delete_all_candidates(&self) -> ServiceResult<()>;
}

/// Everything the console needs from upstream.
pub trait Backend: SessionService + GenerationService + EvaluationService + CrudService {}

impl<T> Backend for T where T: SessionService + GenerationService + EvaluationService + CrudService {}

// --- Response parsing (shape-drift tolerant) ---

fn field<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a Value> {
  names.iter().find_map(|n| obj.get(*n).filter(|v| !v.is_null()))
}

fn text_of(v: Option<&Value>) -> String {
  v.map(coerce_to_plain_text).unwrap_or_default()
}

/// Hints from a list of `{id|hint_id, text|hint_text}` objects.
pub fn parse_hints(items: &[Value]) -> Vec<RemoteHint> {
  items
    .iter()
    .filter_map(|item| {
      let raw = field(item, &["id", "hint_id"]);
      match raw.and_then(coerce_id) {
        Some(id) => Some(RemoteHint { id: HintId(id), text: text_of(field(item, &["text", "hint_text"])) }),
        None => {
          debug!(target: "service", id = ?raw, "Dropping hint without a usable id");
          None
        }
      }
    })
    .collect()
}

fn array_at<'a>(body: &'a Value, key: &str) -> &'a [Value] {
  body.get(key).and_then(Value::as_array).map(Vec::as_slice)
    .or_else(|| body.as_array().map(Vec::as_slice))
    .unwrap_or(&[])
}

pub fn parse_session(body: &Value) -> SessionInfo {
  SessionInfo {
    question: text_of(field(body, &["question"])).trim().to_string(),
    answer: text_of(field(body, &["answer", "ground_truth"])).trim().to_string(),
  }
}

pub fn parse_generated(body: &Value) -> Generated {
  Generated { hints: parse_hints(array_at(body, "hints")), answer: text_of(field(body, &["answer"])) }
}

pub fn parse_candidates(items: &[Value]) -> Vec<String> {
  items.iter().map(coerce_to_plain_text).filter(|s| !s.trim().is_empty()).collect()
}

/// A compatibility record is either the flat map or wrapped as `{ "scores": {...} }`.
fn compat_row(v: &Value) -> CompatibilityRow {
  let inner = v.get("scores").filter(|s| s.is_object()).unwrap_or(v);
  inner.as_object().cloned().unwrap_or_default()
}

pub fn parse_evaluation(body: &Value) -> Evaluation {
  let metrics = array_at(body, "metrics")
    .iter()
    .map(|list| {
      let pairs = list.as_array().map(Vec::as_slice).unwrap_or(&[]).iter().filter_map(|m| {
        let name = m.get("name")?.as_str()?;
        Some((name, m.get("value")?))
      });
      MetricRow::from_metric_list(pairs)
    })
    .collect();
  let compatibility: Vec<CompatibilityRow> = array_at(body, "scores_convergence").iter().map(compat_row).collect();
  let mut candidates = parse_candidates(array_at(body, "candidate_answers"));
  if candidates.is_empty() {
    if let Some(first) = compatibility.first() {
      candidates = first.keys().cloned().collect();
    }
  }
  Evaluation { metrics, compatibility, candidates }
}

const METRIC_FIELDS: [&str; 5] = ["convergence", "relevance", "answer_leakage", "readability", "familiarity"];

/// Rows from `/metrics/get_metrics`. Hints with no finite metric are unevaluated and skipped.
pub fn parse_metric_rows(items: &[Value]) -> Vec<(HintId, MetricRow)> {
  items
    .iter()
    .filter_map(|item| {
      let id = field(item, &["id", "hint_id"]).and_then(coerce_id)?;
      let row = MetricRow::from_metric_list(METRIC_FIELDS.iter().filter_map(|k| item.get(*k).map(|v| (*k, v))));
      (!row.is_empty()).then_some((HintId(id), row))
    })
    .collect()
}

/// Rows from `/metrics/get_convergence_scores`. Hints with an empty record were never evaluated.
pub fn parse_compatibility(items: &[Value]) -> Vec<(HintId, CompatibilityRow)> {
  items
    .iter()
    .filter_map(|item| {
      let id = field(item, &["id", "hint_id"]).and_then(coerce_id)?;
      let row = item.get("candidates").map(compat_row).unwrap_or_default();
      (!row.is_empty()).then_some((HintId(id), row))
    })
    .collect()
}

/// Body of `/metrics/get_embedding_similarities`. A non-numeric cell voids the whole matrix.
pub fn parse_embedding(body: &Value) -> Vec<Vec<f64>> {
  let rows: Option<Vec<Vec<f64>>> = body
    .as_array()
    .map(Vec::as_slice)
    .unwrap_or(&[])
    .iter()
    .map(|row| -> Option<Vec<f64>> { row.as_array()?.iter().map(to_finite).collect() })
    .collect();
  rows.unwrap_or_default()
}

/// Body of `/metrics/get_entities`: `{ "<hint id>": [entity, ...] }`. Keys that
/// are not ids and entries that do not parse are dropped.
pub fn parse_entities(body: &Value) -> BTreeMap<HintId, Vec<Entity>> {
  let Some(obj) = body.as_object() else { return BTreeMap::new() };
  obj
    .iter()
    .filter_map(|(key, items)| {
      let id = coerce_id(&Value::String(key.clone()))?;
      let entities: Vec<Entity> = items
        .as_array()?
        .iter()
        .filter_map(|e| serde_json::from_value(e.clone()).ok())
        .collect();
      Some((HintId(id), entities))
    })
    .collect()
}

// --- HTTP client ---

#[derive(Clone)]
pub struct HintEvalClient {
  client: reqwest::Client,
  base_url: String,
  timeout: Duration,
}

impl HintEvalClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> ServiceResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .cookie_store(true)
      .build()?;
    let base_url = base_url.into().trim_end_matches('/').to_string();
    Ok(Self { client, base_url, timeout })
  }

  pub fn from_config(cfg: &ServiceCfg) -> ServiceResult<Self> {
    Self::new(&cfg.base_url, cfg.request_timeout())
  }

  pub fn base_url(&self) -> &str { &self.base_url }

  fn classify(&self, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() { ServiceError::Timeout { after: self.timeout } } else { e.into() }
  }

  async fn read(&self, path: &str, started: Instant, res: reqwest::Response) -> ServiceResult<Value> {
    let status = res.status();
    let body = res.text().await.map_err(|e| self.classify(e))?;
    let elapsed = started.elapsed();
    if !status.is_success() {
      error!(target: "service", %path, status = status.as_u16(), ?elapsed, body = %trunc_for_log(&body, 300), "Upstream call failed");
      return Err(ServiceError::Status { status: status.as_u16(), body: detail_of(&body) });
    }
    debug!(target: "service", %path, ?elapsed, bytes = body.len(), "Upstream call ok");
    if body.trim().is_empty() {
      return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| ServiceError::Decode(format!("{path}: {e}")))
  }

  #[instrument(level = "debug", skip(self), target = "service")]
  async fn get_json(&self, path: &str) -> ServiceResult<Value> {
    let started = Instant::now();
    let res = self.client.get(format!("{}{}", self.base_url, path))
      .header(USER_AGENT, "hinteval-console/0.1")
      .send().await.map_err(|e| self.classify(e))?;
    self.read(path, started, res).await
  }

  #[instrument(level = "debug", skip(self, body), target = "service")]
  async fn post_json<B: Serialize + ?Sized + Sync>(&self, path: &str, body: &B) -> ServiceResult<Value> {
    let started = Instant::now();
    let res = self.client.post(format!("{}{}", self.base_url, path))
      .header(USER_AGENT, "hinteval-console/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(body)
      .send().await.map_err(|e| self.classify(e))?;
    self.read(path, started, res).await
  }
}

/// FastAPI-style `{"detail": ...}` error bodies, else the raw body.
fn detail_of(body: &str) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("detail").map(coerce_to_plain_text))
    .unwrap_or_else(|| trunc_for_log(body, 300))
}

#[async_trait]
impl SessionService for HintEvalClient {
  async fn get_session(&self) -> ServiceResult<SessionInfo> {
    Ok(parse_session(&self.get_json("/hinteval/session_state").await?))
  }

  async fn reset_session(&self) -> ServiceResult<()> {
    self.post_json("/hinteval/reset_all", &json!({})).await.map(|_| ())
  }

  /// Assumes a `/hinteval/set_groundtruth` route; the stock backend answers 404.
  async fn set_ground_truth(&self, position: Option<usize>) -> ServiceResult<()> {
    self.post_json("/hinteval/set_groundtruth", &json!({ "candidate_index": position })).await.map(|_| ())
  }

  async fn update_answer(&self, answer: &str) -> ServiceResult<()> {
    self.post_json("/hinteval/update_answer", &json!({ "answer": answer })).await.map(|_| ())
  }

  async fn load_preset(&self, preset: &Value) -> ServiceResult<()> {
    self.post_json("/hinteval/load_preset", &json!({ "data": preset })).await.map(|_| ())
  }
}

#[async_trait]
impl GenerationService for HintEvalClient {
  #[instrument(level = "info", skip(self, req), target = "service", fields(num_hints = req.num_hints, model = %req.model_name))]
  async fn generate(&self, req: &GenerateRequest) -> ServiceResult<Generated> {
    let body = self.post_json("/hinteval/generate", req).await?;
    Ok(parse_generated(&body))
  }

  #[instrument(level = "info", skip(self, run, question, hints), target = "service", fields(hints = hints.len(), model = %run.model_name))]
  async fn regenerate_answer(&self, run: &RunConfig, question: &str, hints: &[String]) -> ServiceResult<String> {
    let body = self.post_json("/hinteval/regenerate_answer", &json!({
      "question": question,
      "model_name": run.model_name,
      "temperature": run.temperature,
      "max_tokens": run.hint_max_tokens,
      "hints": hints,
    })).await?;
    Ok(text_of(field(&body, &["answer"])))
  }

  #[instrument(level = "info", skip(self, run, hints), target = "service", fields(n = run.num_candidates, model = %run.small_model_name))]
  async fn regenerate_candidates(&self, run: &RunConfig, hints: &[String]) -> ServiceResult<Vec<String>> {
    let body = self.post_json("/hinteval/regenerate_candidates", &json!({
      "num_candidates": run.num_candidates,
      "model_name": run.small_model_name,
      "temperature": run.temperature,
      "max_tokens": run.candidate_max_tokens,
      "hints": hints,
    })).await?;
    Ok(parse_candidates(array_at(&body, "candidates")))
  }
}

#[async_trait]
impl EvaluationService for HintEvalClient {
  #[instrument(level = "info", skip(self, req), target = "service", fields(hints = req.hints.len(), model = %req.model_name))]
  async fn evaluate(&self, req: &EvaluateRequest) -> ServiceResult<Evaluation> {
    let body = self.post_json("/hinteval/evaluate", req).await?;
    Ok(parse_evaluation(&body))
  }

  async fn fetch_metrics(&self) -> ServiceResult<Vec<(HintId, MetricRow)>> {
    let body = self.get_json("/metrics/get_metrics").await?;
    Ok(parse_metric_rows(array_at(&body, "metrics")))
  }

  async fn fetch_compatibility(&self) -> ServiceResult<Vec<(HintId, CompatibilityRow)>> {
    let body = self.get_json("/metrics/get_convergence_scores").await?;
    Ok(parse_compatibility(array_at(&body, "scores")))
  }

  async fn fetch_embedding_similarities(&self) -> ServiceResult<Vec<Vec<f64>>> {
    Ok(parse_embedding(&self.get_json("/metrics/get_embedding_similarities").await?))
  }

  async fn fetch_entities(&self) -> ServiceResult<BTreeMap<HintId, Vec<Entity>>> {
    Ok(parse_entities(&self.get_json("/metrics/get_entities").await?))
  }
}

#[async_trait]
impl CrudService for HintEvalClient {
  async fn list_hints(&self) -> ServiceResult<Vec<RemoteHint>> {
    let body = self.get_json("/hinteval/get-hints").await?;
    Ok(parse_hints(array_at(&body, "hints")))
  }

  async fn create_hint(&self, text: &str) -> ServiceResult<RemoteHint> {
    let body = self.post_json("/hinteval/save_hint", &json!({ "hint_text": text })).await?;
    parse_hints(std::slice::from_ref(&body))
      .into_iter()
      .next()
      .ok_or_else(|| ServiceError::Decode("save_hint: response carries no usable hint id".into()))
  }

  async fn update_hint(&self, id: HintId, text: &str) -> ServiceResult<()> {
    self.post_json("/hinteval/update_hint", &json!({ "hint_id": id, "hint_text": text })).await.map(|_| ())
  }

  async fn delete_hint(&self, id: HintId) -> ServiceResult<()> {
    self.post_json("/hinteval/delete_hint", &json!({ "hint_id": id })).await.map(|_| ())
  }

  async fn delete_all_hints(&self) -> ServiceResult<()> {
    self.post_json("/hinteval/delete_all_hints", &json!({})).await.map(|_| ())
  }

  async fn list_candidates(&self) -> ServiceResult<Vec<String>> {
    let body = self.get_json("/hinteval/get_candidates").await?;
    Ok(parse_candidates(array_at(&body, "candidates")))
  }

  async fn create_candidate(&self, text: &str) -> ServiceResult<()> {
    self.post_json("/hinteval/save_candidate", &json!({ "candidate_text": text })).await.map(|_| ())
  }

  async fn update_candidate(&self, position: usize, text: &str) -> ServiceResult<()> {
    self.post_json("/hinteval/save_candidate", &json!({ "candidate_text": text, "candidate_index": position }))
      .await
      .map(|_| ())
  }

  async fn delete_candidate(&self, position: usize) -> ServiceResult<()> {
    self.post_json("/hinteval/delete_candidate", &json!({ "candidate_index": position })).await.map(|_| ())
  }

  async fn delete_all_candidates(&self) -> ServiceResult<()> {
    self.post_json("/hinteval/delete_all_candidates", &json!({})).await.map(|_| ())
  }
}
