#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use hinteval_console::cache::MemoryStore;
use hinteval_console::console::Console;
use hinteval_console::domain::{Entity, HintId, RunConfig};
use hinteval_console::elimination::CompatibilityRow;
use hinteval_console::error::{ServiceError, ServiceResult};
use hinteval_console::metrics::MetricRow;
use hinteval_console::service::{
  CrudService, EvaluateRequest, Evaluation, EvaluationService, GenerateRequest, Generated, GenerationService,
  RemoteHint, SessionInfo, SessionService,
};

#[derive(Default)]
pub struct FakeState {
  pub session: SessionInfo,
  pub hints: Vec<RemoteHint>,
  pub candidates: Vec<String>,
  pub metrics: Vec<(HintId, MetricRow)>,
  pub compatibility: Vec<(HintId, CompatibilityRow)>,
  pub next_hint_id: i64,
  pub evaluation: Evaluation,
  pub generated: Generated,
  pub regenerated: Vec<String>,
  pub embedding: Vec<Vec<f64>>,
  pub entities: BTreeMap<HintId, Vec<Entity>>,
  pub fail_analytics: bool,
}

/// In-memory upstream that records every call.
#[derive(Default)]
pub struct FakeBackend {
  pub state: Mutex<FakeState>,
  calls: Mutex<BTreeMap<&'static str, usize>>,
  pub fail_session: Mutex<bool>,
  pub delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
  pub fn with_session(question: &str, answer: &str) -> Self {
    let b = Self::default();
    {
      let mut s = b.state.lock().unwrap();
      s.session = SessionInfo { question: question.into(), answer: answer.into() };
      s.next_hint_id = 100;
    }
    b
  }

  fn hit(&self, name: &'static str) {
    *self.calls.lock().unwrap().entry(name).or_default() += 1;
  }

  pub fn calls(&self, name: &str) -> usize {
    self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
  }

  async fn maybe_wait(&self) {
    let d = *self.delay.lock().unwrap();
    if let Some(d) = d {
      tokio::time::sleep(d).await;
    }
  }

  pub fn set_hints(&self, hints: &[(i64, &str)]) {
    self.state.lock().unwrap().hints =
      hints.iter().map(|(id, t)| RemoteHint { id: HintId(*id), text: t.to_string() }).collect();
  }

  pub fn set_candidates(&self, cands: &[&str]) {
    self.state.lock().unwrap().candidates = cands.iter().map(|c| c.to_string()).collect();
  }
}

pub fn row(v: Value) -> CompatibilityRow {
  v.as_object().cloned().unwrap_or_default()
}

pub fn metric_row(pairs: &[(&str, f64)]) -> MetricRow {
  let mut r = MetricRow::new();
  for (k, v) in pairs {
    r.insert(*k, *v);
  }
  r
}

pub fn console_with(backend: Arc<FakeBackend>, store: Arc<MemoryStore>) -> Console {
  Console::new(backend, store, RunConfig::default(), Duration::from_secs(5))
}

#[async_trait]
impl SessionService for FakeBackend {
  async fn get_session(&self) -> ServiceResult<SessionInfo> {
    self.hit("get_session");
    if *self.fail_session.lock().unwrap() {
      return Err(ServiceError::Transport("connection refused".into()));
    }
    Ok(self.state.lock().unwrap().session.clone())
  }

  async fn reset_session(&self) -> ServiceResult<()> {
    self.hit("reset_session");
    let mut s = self.state.lock().unwrap();
    let next = s.next_hint_id;
    let evaluation = std::mem::take(&mut s.evaluation);
    let generated = std::mem::take(&mut s.generated);
    *s = FakeState { next_hint_id: next, evaluation, generated, ..FakeState::default() };
    Ok(())
  }

  async fn set_ground_truth(&self, position: Option<usize>) -> ServiceResult<()> {
    self.hit("set_ground_truth");
    let mut s = self.state.lock().unwrap();
    let answer = position.and_then(|p| s.candidates.get(p).cloned()).unwrap_or_default();
    s.session.answer = answer;
    s.metrics.clear();
    s.compatibility.clear();
    Ok(())
  }

  async fn update_answer(&self, answer: &str) -> ServiceResult<()> {
    self.hit("update_answer");
    self.state.lock().unwrap().session.answer = answer.to_string();
    Ok(())
  }

  async fn load_preset(&self, preset: &Value) -> ServiceResult<()> {
    self.hit("load_preset");
    let mut s = self.state.lock().unwrap();
    s.session.question = preset["question"].as_str().unwrap_or_default().to_string();
    s.session.answer = preset["groundTruth"].as_str().unwrap_or_default().to_string();
    let mut id = s.next_hint_id;
    let mut hints = Vec::new();
    for h in preset["hints"].as_array().cloned().unwrap_or_default() {
      hints.push(RemoteHint { id: HintId(id), text: h["hint_text"].as_str().unwrap_or_default().to_string() });
      id += 1;
    }
    s.hints = hints;
    s.next_hint_id = id;
    s.candidates = preset["candidates"]
      .as_array()
      .cloned()
      .unwrap_or_default()
      .iter()
      .filter_map(|c| c.as_str().map(str::to_string))
      .collect();
    s.metrics.clear();
    s.compatibility.clear();
    Ok(())
  }
}

#[async_trait]
impl GenerationService for FakeBackend {
  async fn generate(&self, req: &GenerateRequest) -> ServiceResult<Generated> {
    self.hit("generate");
    self.maybe_wait().await;
    let mut s = self.state.lock().unwrap();
    s.session.question = req.question.clone();
    let out = s.generated.clone();
    s.session.answer = out.answer.clone();
    s.hints = out.hints.clone();
    Ok(out)
  }

  async fn regenerate_answer(&self, _run: &RunConfig, _question: &str, _hints: &[String]) -> ServiceResult<String> {
    self.hit("regenerate_answer");
    self.maybe_wait().await;
    let mut s = self.state.lock().unwrap();
    s.session.answer = "Brasília".into();
    Ok("Brasília".into())
  }

  async fn regenerate_candidates(&self, _run: &RunConfig, _hints: &[String]) -> ServiceResult<Vec<String>> {
    self.hit("regenerate_candidates");
    self.maybe_wait().await;
    let mut s = self.state.lock().unwrap();
    let fresh = s.regenerated.clone();
    s.candidates = fresh;
    s.metrics.clear();
    s.compatibility.clear();
    Ok(s.candidates.clone())
  }
}

#[async_trait]
impl EvaluationService for FakeBackend {
  async fn evaluate(&self, _req: &EvaluateRequest) -> ServiceResult<Evaluation> {
    self.hit("evaluate");
    self.maybe_wait().await;
    Ok(self.state.lock().unwrap().evaluation.clone())
  }

  async fn fetch_metrics(&self) -> ServiceResult<Vec<(HintId, MetricRow)>> {
    self.hit("fetch_metrics");
    Ok(self.state.lock().unwrap().metrics.clone())
  }

  async fn fetch_compatibility(&self) -> ServiceResult<Vec<(HintId, CompatibilityRow)>> {
    self.hit("fetch_compatibility");
    Ok(self.state.lock().unwrap().compatibility.clone())
  }

  async fn fetch_embedding_similarities(&self) -> ServiceResult<Vec<Vec<f64>>> {
    self.hit("fetch_embedding_similarities");
    let s = self.state.lock().unwrap();
    if s.fail_analytics {
      return Err(ServiceError::Status { status: 500, body: "embedding model unavailable".into() });
    }
    Ok(s.embedding.clone())
  }

  async fn fetch_entities(&self) -> ServiceResult<BTreeMap<HintId, Vec<Entity>>> {
    self.hit("fetch_entities");
    let s = self.state.lock().unwrap();
    if s.fail_analytics {
      return Err(ServiceError::Status { status: 500, body: "entity model unavailable".into() });
    }
    Ok(s.entities.clone())
  }
}

#[async_trait]
impl CrudService for FakeBackend {
  async fn list_hints(&self) -> ServiceResult<Vec<RemoteHint>> {
    self.hit("list_hints");
    Ok(self.state.lock().unwrap().hints.clone())
  }

  async fn create_hint(&self, text: &str) -> ServiceResult<RemoteHint> {
    self.hit("create_hint");
    let mut s = self.state.lock().unwrap();
    let h = RemoteHint { id: HintId(s.next_hint_id), text: text.to_string() };
    s.next_hint_id += 1;
    s.hints.push(h.clone());
    s.metrics.clear();
    Ok(h)
  }

  async fn update_hint(&self, id: HintId, text: &str) -> ServiceResult<()> {
    self.hit("update_hint");
    let mut s = self.state.lock().unwrap();
    if let Some(h) = s.hints.iter_mut().find(|h| h.id == id) {
      h.text = text.to_string();
    }
    Ok(())
  }

  async fn delete_hint(&self, id: HintId) -> ServiceResult<()> {
    self.hit("delete_hint");
    self.state.lock().unwrap().hints.retain(|h| h.id != id);
    Ok(())
  }

  async fn delete_all_hints(&self) -> ServiceResult<()> {
    self.hit("delete_all_hints");
    self.state.lock().unwrap().hints.clear();
    Ok(())
  }

  async fn list_candidates(&self) -> ServiceResult<Vec<String>> {
    self.hit("list_candidates");
    Ok(self.state.lock().unwrap().candidates.clone())
  }

  async fn create_candidate(&self, text: &str) -> ServiceResult<()> {
    self.hit("create_candidate");
    let mut s = self.state.lock().unwrap();
    s.candidates.push(text.to_string());
    s.metrics.clear();
    s.compatibility.clear();
    Ok(())
  }

  async fn update_candidate(&self, position: usize, text: &str) -> ServiceResult<()> {
    self.hit("update_candidate");
    let mut s = self.state.lock().unwrap();
    match s.candidates.get_mut(position) {
      Some(c) => {
        *c = text.to_string();
        Ok(())
      }
      None => Err(ServiceError::Status { status: 400, body: "Candidate index out of range".into() }),
    }
  }

  async fn delete_candidate(&self, position: usize) -> ServiceResult<()> {
    self.hit("delete_candidate");
    let mut s = self.state.lock().unwrap();
    if position >= s.candidates.len() {
      return Err(ServiceError::Status { status: 400, body: "Candidate index out of range".into() });
    }
    s.candidates.remove(position);
    s.metrics.clear();
    s.compatibility.clear();
    Ok(())
  }

  async fn delete_all_candidates(&self) -> ServiceResult<()> {
    self.hit("delete_all_candidates");
    let mut s = self.state.lock().unwrap();
    s.candidates.clear();
    s.compatibility.clear();
    Ok(())
  }
}

/// Upstream evaluation result for the Brazil session with two hints.
pub fn brazil_evaluation() -> Evaluation {
  Evaluation {
    metrics: vec![
      metric_row(&[("convergence", 0.4), ("answer-leakage", 0.1)]),
      metric_row(&[("convergence", 0.9), ("answer-leakage", 0.3)]),
    ],
    compatibility: vec![
      row(json!({"Rio de Janeiro": 0, "São Paulo": 1, "Brasília": 1})),
      row(json!({"Rio de Janeiro": 0, "São Paulo": 0, "Brasília": 1})),
    ],
    candidates: vec!["Rio de Janeiro".into(), "São Paulo".into(), "Brasília".into()],
  }
}
