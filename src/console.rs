//! The session reconciler.
//!
//! `Console` owns the reconciled snapshot. At startup it fetches the
//! authoritative session, then either adopts the cached snapshot (same question)
//! or rebuilds everything from upstream. Afterwards every mutation goes to the
//! upstream service first; on success the local snapshot is patched (text edits)
//! or resynced (anything touching candidate identity), and the result persisted.
//!
//! Phases: Uninitialized -> Reconciling -> Ready. Persistence only runs in Ready.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::SnapshotStore;
use crate::color::{color_from_id, color_with_convergence};
use crate::config::ConsoleConfig;
use crate::domain::{Candidate, CandidateId, ElimMode, Entity, Hint, HintId, MetricKey, RunConfig, SortDirection};
use crate::elimination::{CompatibilityRow, EliminationMap};
use crate::error::{ConsoleError, ConsoleResult, ServiceError, ServiceResult};
use crate::metrics::{convergence_of, has_metrics, MetricRow, MetricsByHint};
use crate::reduction::{candidate_statuses, reduce, revealed_hints, CandidateStatus, ReductionStep};
use crate::seeds::find_preset;
use crate::service::{Backend, EvaluateRequest, GenerateRequest, RemoteHint, SessionInfo};
use crate::similarity::{similarity_report, EmbeddingMatrix, SimilarityReport};
use crate::snapshot::SessionSnapshot;
use crate::sort::sort_hints;
use crate::util::shortify;

const HINT_TEXT_MAX: usize = 160;
const ANSWER_TEXT_MAX: usize = 320;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Uninitialized,
  Reconciling,
  Ready,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
  AdoptedCache,
  Resynced,
  AlreadyReady,
}

/// A hint as displayed: base color plus the convergence-blended color.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HintView {
  pub id: HintId,
  pub text: String,
  pub base_color: String,
  pub color: String,
  pub convergence: Option<f64>,
  pub evaluated: bool,
  pub revealed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
  pub evaluated: usize,
  pub candidates: usize,
  /// `false` when the session changed while the batch was in flight.
  pub applied: bool,
}

/// Everything fetched from upstream for a full resync.
#[derive(Clone, Debug, Default)]
pub struct RemoteState {
  pub session: SessionInfo,
  pub hints: Vec<RemoteHint>,
  pub candidates: Vec<String>,
  pub metrics: Vec<(HintId, MetricRow)>,
  pub compatibility: Vec<(HintId, CompatibilityRow)>,
  pub embedding: Vec<Vec<f64>>,
  pub entities: BTreeMap<HintId, Vec<Entity>>,
}

/// One consistent read of everything the rendering layer shows.
#[derive(Clone, Debug)]
pub struct SessionView {
  pub phase: Phase,
  pub busy: bool,
  pub version: u64,
  pub snapshot: SessionSnapshot,
  pub hints: Vec<HintView>,
}

/// Hints with deterministic colors; duplicate ids keep the first occurrence.
fn hints_from_remote(remote: Vec<RemoteHint>, max_len: Option<usize>) -> Vec<Hint> {
  let mut seen = BTreeSet::new();
  remote
    .into_iter()
    .filter(|h| seen.insert(h.id))
    .map(|h| Hint {
      id: h.id,
      display_color: color_from_id(h.id.0),
      text: match max_len {
        Some(n) => shortify(&h.text, n),
        None => h.text,
      },
    })
    .collect()
}

fn answer_position(texts: &[String], answer: &str) -> Option<usize> {
  let answer = answer.trim().to_lowercase();
  if answer.is_empty() {
    return None;
  }
  texts.iter().position(|t| t.trim().to_lowercase() == answer)
}

/// Candidates in upstream order; the first one matching the answer text is ground truth.
fn candidates_from_texts(texts: Vec<String>, answer: &str) -> Vec<Candidate> {
  let gt = answer_position(&texts, answer);
  texts
    .into_iter()
    .enumerate()
    .map(|(i, text)| Candidate { id: CandidateId(i as i64), text, is_ground_truth: gt == Some(i) })
    .collect()
}

/// Upstream embeds the session's hints in ascending id order.
fn embedding_for(hints: &[Hint], rows: Vec<Vec<f64>>) -> Option<EmbeddingMatrix> {
  if rows.is_empty() {
    return None;
  }
  let mut ids: Vec<HintId> = hints.iter().map(|h| h.id).collect();
  ids.sort();
  let matrix = EmbeddingMatrix::new(ids, rows);
  if matrix.is_none() {
    debug!(target: "reconcile", hints = hints.len(), "Embedding matrix does not match the hint list; ignoring it");
  }
  matrix
}

fn hint_views_of(s: &SessionSnapshot) -> Vec<HintView> {
  s.hints
    .iter()
    .map(|h| {
      let conv = convergence_of(&s.metrics, h.id);
      HintView {
        id: h.id,
        text: h.text.clone(),
        base_color: h.display_color.clone(),
        color: color_with_convergence(Some(&h.display_color), conv),
        convergence: conv.is_finite().then_some(conv),
        evaluated: has_metrics(&s.metrics, h.id),
        revealed: s.revealed.contains(&h.id),
      }
    })
    .collect()
}

fn remark_ground_truth(s: &mut SessionSnapshot) {
  let gt = answer_position(&s.candidate_texts(), &s.ground_truth).map(|p| s.candidates[p].id);
  s.mark_ground_truth(gt);
}

/// Build a snapshot from upstream data. Colors come from ids, derived data is
/// restricted to known hints and current candidates. Run configuration and view
/// preferences carry over from `prefs`; reveal state only when the question is unchanged.
pub fn rebuild(remote: RemoteState, prefs: &SessionSnapshot) -> SessionSnapshot {
  let hints = hints_from_remote(remote.hints, None);
  let known: BTreeSet<HintId> = hints.iter().map(|h| h.id).collect();
  let candidates = candidates_from_texts(remote.candidates, &remote.session.answer);
  let order: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();

  let mut elimination = prefs.elimination.clone();
  elimination.replace_vectors(EliminationMap::from_records(&remote.compatibility, &order, &known));

  let metrics: MetricsByHint = remote
    .metrics
    .into_iter()
    .filter(|(id, row)| known.contains(id) && !row.is_empty())
    .collect();

  let embedding = embedding_for(&hints, remote.embedding);
  let same_question = prefs.question == remote.session.question;
  let mut s = SessionSnapshot {
    question: remote.session.question,
    ground_truth: remote.session.answer,
    hints,
    candidates,
    metrics,
    elimination,
    embedding,
    entities: remote.entities,
    revealed: if same_question { prefs.revealed.clone() } else { BTreeSet::new() },
    hint_step: if same_question { prefs.hint_step } else { 0 },
    elim_mode: prefs.elim_mode,
    sort_metric: prefs.sort_metric,
    sort_dir: prefs.sort_dir,
    run: prefs.run.clone(),
  };
  s.prune_stale();
  s
}

/// Hints for the next evaluation: everything when there are no candidates yet,
/// else the unevaluated hints, else everything again.
pub fn evaluation_batch(s: &SessionSnapshot) -> Vec<HintId> {
  let all: Vec<HintId> = s.hints.iter().map(|h| h.id).collect();
  if s.candidates.is_empty() {
    return all;
  }
  let pending: Vec<HintId> = all.iter().copied().filter(|id| !has_metrics(&s.metrics, *id)).collect();
  if pending.is_empty() { all } else { pending }
}

fn non_empty(text: &str, what: &str) -> ConsoleResult<String> {
  let t = text.trim();
  if t.is_empty() {
    return Err(ConsoleError::InvalidInput(format!("{what} must not be empty")));
  }
  Ok(t.to_string())
}

struct Inner {
  phase: Phase,
  snapshot: SessionSnapshot,
}

/// Clears the busy flag when the long operation ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct Console {
  inner: RwLock<Inner>,
  backend: Arc<dyn Backend>,
  store: Arc<dyn SnapshotStore>,
  busy: AtomicBool,
  persist_lock: Mutex<()>,
  mutation_timeout: Duration,
  changes: watch::Sender<u64>,
}

impl Console {
  pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn SnapshotStore>, run: RunConfig, mutation_timeout: Duration) -> Self {
    let (changes, _) = watch::channel(0);
    Self {
      inner: RwLock::new(Inner { phase: Phase::Uninitialized, snapshot: SessionSnapshot::empty(run) }),
      backend,
      store,
      busy: AtomicBool::new(false),
      persist_lock: Mutex::new(()),
      mutation_timeout,
      changes,
    }
  }

  pub fn from_config(backend: Arc<dyn Backend>, store: Arc<dyn SnapshotStore>, cfg: &ConsoleConfig) -> Self {
    Self::new(backend, store, cfg.run.clone(), cfg.service.mutation_timeout())
  }

  /// Change counter; bumps after every settled state change.
  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.changes.subscribe()
  }

  pub fn version(&self) -> u64 {
    *self.changes.borrow()
  }

  pub async fn phase(&self) -> Phase {
    self.inner.read().await.phase
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  pub async fn snapshot(&self) -> SessionSnapshot {
    self.inner.read().await.snapshot.clone()
  }

  // --- plumbing ---

  fn begin_long(&self) -> ConsoleResult<BusyGuard<'_>> {
    self.busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .map(|_| BusyGuard(&self.busy))
      .map_err(|_| ConsoleError::Busy)
  }

  async fn ensure_settled(&self) -> ConsoleResult<()> {
    match self.inner.read().await.phase {
      Phase::Reconciling => Err(ConsoleError::AlreadyReconciling),
      _ => Ok(()),
    }
  }

  fn ensure_idle(&self) -> ConsoleResult<()> {
    if self.is_busy() { Err(ConsoleError::Busy) } else { Ok(()) }
  }

  /// Edits wait for reconciliation and for any long operation in flight.
  async fn ensure_editable(&self) -> ConsoleResult<()> {
    self.ensure_settled().await?;
    self.ensure_idle()
  }

  async fn require_question(&self) -> ConsoleResult<()> {
    if self.inner.read().await.snapshot.has_question() { Ok(()) } else { Err(ConsoleError::NoActiveQuestion) }
  }

  /// Run one upstream mutation under the mutation timeout.
  async fn bounded<T, F>(&self, action: &'static str, fut: F) -> ConsoleResult<T>
  where
    F: Future<Output = ServiceResult<T>>,
  {
    match tokio::time::timeout(self.mutation_timeout, fut).await {
      Ok(res) => res.map_err(ConsoleError::service(action)),
      Err(_) => {
        warn!(target: "reconcile", action, after = ?self.mutation_timeout, "Upstream call timed out");
        Err(ConsoleError::Service { action, source: ServiceError::Timeout { after: self.mutation_timeout } })
      }
    }
  }

  /// Write the latest snapshot. Saves are serialized and each one reads the
  /// snapshot after taking the lock, so the last save always sees the last change.
  async fn persist(&self) {
    let _order = self.persist_lock.lock().await;
    let snapshot = {
      let g = self.inner.read().await;
      if g.phase != Phase::Ready {
        debug!(target: "reconcile", phase = ?g.phase, "Skipping persistence before ready");
        return;
      }
      g.snapshot.clone()
    };
    if let Err(e) = self.store.save(&snapshot).await {
      error!(target: "reconcile", error = %e, "Failed to persist snapshot");
    }
  }

  fn notify(&self) {
    self.changes.send_modify(|v| *v = v.wrapping_add(1));
  }

  async fn settle(&self) {
    self.persist().await;
    self.notify();
  }

  async fn patch<T>(&self, f: impl FnOnce(&mut SessionSnapshot) -> T) -> T {
    let mut g = self.inner.write().await;
    f(&mut g.snapshot)
  }

  async fn fetch_content(&self, session: SessionInfo) -> ServiceResult<RemoteState> {
    let b = &self.backend;
    let (core, (embedding, entities)) = tokio::join!(
      async { tokio::try_join!(b.list_hints(), b.list_candidates(), b.fetch_metrics(), b.fetch_compatibility()) },
      self.fetch_analytics(),
    );
    let (hints, candidates, metrics, compatibility) = core?;
    Ok(RemoteState { session, hints, candidates, metrics, compatibility, embedding, entities })
  }

  /// Embedding similarities and entities. A failed fetch is logged and left empty.
  async fn fetch_analytics(&self) -> (Vec<Vec<f64>>, BTreeMap<HintId, Vec<Entity>>) {
    let (embedding, entities) =
      tokio::join!(self.backend.fetch_embedding_similarities(), self.backend.fetch_entities());
    let embedding = embedding.unwrap_or_else(|e| {
      warn!(target: "reconcile", error = %e, "Embedding similarities unavailable");
      Vec::new()
    });
    let entities = entities.unwrap_or_else(|e| {
      warn!(target: "reconcile", error = %e, "Hint entities unavailable");
      BTreeMap::new()
    });
    (embedding, entities)
  }

  /// The canonical resync: refetch everything, keep the user's hint order.
  async fn resync_now(&self, action: &'static str) -> ConsoleResult<()> {
    let remote = self
      .bounded(action, async {
        let session = self.backend.get_session().await?;
        self.fetch_content(session).await
      })
      .await?;
    {
      let mut g = self.inner.write().await;
      let inner = &mut *g;
      let order: Vec<HintId> = inner.snapshot.hints.iter().map(|h| h.id).collect();
      let mut fresh = rebuild(remote, &inner.snapshot);
      fresh.apply_hint_order(&order);
      info!(target: "reconcile", action, hints = fresh.hints.len(), candidates = fresh.candidates.len(), "Resynced from upstream");
      inner.snapshot = fresh;
      if inner.phase == Phase::Uninitialized {
        inner.phase = Phase::Ready;
      }
    }
    self.settle().await;
    Ok(())
  }

  /// Resync after an identity-changing mutation; on failure the optimistic patch is kept.
  async fn resync_after(&self, action: &'static str) -> ConsoleResult<()> {
    match self.resync_now(action).await {
      Ok(()) => Ok(()),
      Err(e) => {
        warn!(target: "reconcile", action, error = %e, "Resync after mutation failed; keeping local patch");
        self.settle().await;
        Err(e)
      }
    }
  }

  // --- reconciliation ---

  /// Decide between the cached snapshot and a full resync. Runs once; a failed
  /// attempt returns to Uninitialized so it can be retried.
  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn reconcile(&self) -> ConsoleResult<ReconcileOutcome> {
    {
      let mut g = self.inner.write().await;
      match g.phase {
        Phase::Reconciling => return Err(ConsoleError::AlreadyReconciling),
        Phase::Ready => return Ok(ReconcileOutcome::AlreadyReady),
        Phase::Uninitialized => g.phase = Phase::Reconciling,
      }
    }
    match self.reconcile_inner().await {
      Ok(outcome) => {
        self.inner.write().await.phase = Phase::Ready;
        info!(target: "reconcile", ?outcome, "Session ready");
        self.settle().await;
        Ok(outcome)
      }
      Err(e) => {
        error!(target: "reconcile", error = %e, "Reconciliation failed; console stays uninitialized");
        self.inner.write().await.phase = Phase::Uninitialized;
        Err(e)
      }
    }
  }

  async fn reconcile_inner(&self) -> ConsoleResult<ReconcileOutcome> {
    let session = self.backend.get_session().await.map_err(ConsoleError::service("fetch session"))?;
    match self.store.load().await {
      Some(cached) if cached.question == session.question => {
        info!(target: "reconcile", hints = cached.hints.len(), candidates = cached.candidates.len(), "Cache matches session; adopting it");
        self.inner.write().await.snapshot = cached;
        Ok(ReconcileOutcome::AdoptedCache)
      }
      cached => {
        info!(target: "reconcile", cached = cached.is_some(), "Cache absent or stale; full resync");
        let remote = self.fetch_content(session).await.map_err(ConsoleError::service("resync"))?;
        let mut g = self.inner.write().await;
        let prefs = cached.unwrap_or_else(|| g.snapshot.clone());
        g.snapshot = rebuild(remote, &prefs);
        Ok(ReconcileOutcome::Resynced)
      }
    }
  }

  /// Force a full resync from upstream.
  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn resync(&self) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    self.resync_now("resync").await
  }

  // --- generation and evaluation ---

  #[instrument(level = "info", skip(self, question), target = "reconcile", fields(question_len = question.len()))]
  pub async fn generate(&self, question: &str) -> ConsoleResult<()> {
    self.ensure_settled().await?;
    let question = non_empty(question, "question")?;
    let _busy = self.begin_long()?;
    let run = self.inner.read().await.snapshot.run.clone();

    self.bounded("reset session", self.backend.reset_session()).await?;
    self.patch(|s| s.clear_session()).await;

    let req = GenerateRequest {
      question: question.clone(),
      num_hints: run.num_hints,
      temperature: run.temperature,
      max_tokens: run.hint_max_tokens,
      model_name: run.model_name.clone(),
      answer: run.answer_enabled,
    };
    let generated = match self.bounded("generate", self.backend.generate(&req)).await {
      Ok(g) => g,
      Err(e) => {
        self.settle().await;
        return Err(e);
      }
    };

    let mut hints = hints_from_remote(generated.hints, Some(HINT_TEXT_MAX));
    hints.truncate(run.num_hints);
    info!(target: "reconcile", hints = hints.len(), has_answer = !generated.answer.trim().is_empty(), "Generated hints");
    {
      let mut g = self.inner.write().await;
      let inner = &mut *g;
      inner.snapshot.question = question;
      inner.snapshot.ground_truth = shortify(generated.answer.trim(), ANSWER_TEXT_MAX);
      inner.snapshot.hints = hints;
      if inner.phase == Phase::Uninitialized {
        inner.phase = Phase::Ready;
      }
    }
    self.settle().await;
    Ok(())
  }

  /// Evaluate the pending hint batch and fold the results into the snapshot.
  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn evaluate(&self) -> ConsoleResult<EvaluationSummary> {
    self.ensure_settled().await?;
    let _busy = self.begin_long()?;

    let (req, ids, ticket) = {
      let mut g = self.inner.write().await;
      let s = &mut g.snapshot;
      if !s.has_question() {
        return Err(ConsoleError::NoActiveQuestion);
      }
      if s.hints.is_empty() {
        return Err(ConsoleError::InvalidInput("add at least one hint before evaluating".into()));
      }
      let ids = evaluation_batch(s);
      let ticket = s.elimination.begin_batch(&ids)?;
      let req = EvaluateRequest {
        question: s.question.clone(),
        hints: ids.iter().filter_map(|id| s.hint(*id)).map(|h| h.text.clone()).collect(),
        hint_ids: ids.iter().map(|id| id.0).collect(),
        answer: s.ground_truth.clone(),
        temperature: s.run.temperature,
        max_tokens: s.run.hint_max_tokens,
        model_name: s.run.model_name.clone(),
        num_candidates: s.run.num_candidates,
      };
      (req, ids, ticket)
    };
    debug!(target: "reconcile", batch = ids.len(), "Evaluation batch claimed");

    let result = self.bounded("evaluate", self.backend.evaluate(&req)).await;

    let summary = {
      let mut g = self.inner.write().await;
      let s = &mut g.snapshot;
      let ev = match result {
        Ok(ev) => ev,
        Err(e) => {
          s.elimination.abandon_batch(ticket);
          return Err(e);
        }
      };
      if !s.elimination.is_current(&ticket) {
        warn!(target: "reconcile", "Session changed during evaluation; discarding results");
        s.elimination.abandon_batch(ticket);
        return Ok(EvaluationSummary { evaluated: 0, candidates: s.candidates.len(), applied: false });
      }

      if !ev.candidates.is_empty() && ev.candidates != s.candidate_texts() {
        debug!(target: "reconcile", before = s.candidates.len(), after = ev.candidates.len(), "Candidate list replaced by evaluation");
        s.candidates = candidates_from_texts(ev.candidates, &s.ground_truth);
        s.elimination.drop_vectors();
      }
      for (id, row) in ids.iter().zip(ev.metrics) {
        if !row.is_empty() {
          s.metrics.insert(*id, row);
        }
      }
      let rows: Vec<(HintId, CompatibilityRow)> = ids.iter().copied().zip(ev.compatibility).collect();
      let order = s.candidate_texts();
      s.elimination.commit_batch(ticket, &order, &rows);

      s.hints = sort_hints(&s.hints, &s.metrics, MetricKey::Convergence, SortDirection::Desc);
      s.sort_metric = MetricKey::Convergence;
      s.sort_dir = SortDirection::Desc;
      EvaluationSummary { evaluated: ids.len(), candidates: s.candidates.len(), applied: true }
    };
    let (rows, entities) = self.fetch_analytics().await;
    self.patch(|s| {
      s.embedding = embedding_for(&s.hints, rows);
      s.entities = entities;
      s.prune_stale();
    })
    .await;
    info!(target: "reconcile", evaluated = summary.evaluated, candidates = summary.candidates, "Evaluation applied");
    self.settle().await;
    Ok(summary)
  }

  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn regenerate_answer(&self) -> ConsoleResult<String> {
    self.ensure_settled().await?;
    self.require_question().await?;
    let _busy = self.begin_long()?;
    let (run, question, hints) = {
      let g = self.inner.read().await;
      let s = &g.snapshot;
      (s.run.clone(), s.question.clone(), s.hints.iter().map(|h| h.text.clone()).collect::<Vec<_>>())
    };
    let answer = self.bounded("regenerate answer", self.backend.regenerate_answer(&run, &question, &hints)).await?;
    let answer = shortify(answer.trim(), ANSWER_TEXT_MAX);
    self.patch(|s| {
      s.ground_truth = answer.clone();
      s.invalidate_derived();
      remark_ground_truth(s);
    })
    .await;
    self.settle().await;
    Ok(answer)
  }

  /// Replace the candidate list upstream; candidate identity changes, so this resyncs.
  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn regenerate_candidates(&self) -> ConsoleResult<usize> {
    self.ensure_settled().await?;
    self.require_question().await?;
    let _busy = self.begin_long()?;
    let (run, hints) = {
      let g = self.inner.read().await;
      (g.snapshot.run.clone(), g.snapshot.hints.iter().map(|h| h.text.clone()).collect::<Vec<_>>())
    };
    let fresh = self.bounded("regenerate candidates", self.backend.regenerate_candidates(&run, &hints)).await?;
    debug!(target: "reconcile", count = fresh.len(), "Candidates regenerated upstream");
    self.patch(|s| s.invalidate_derived()).await;
    self.resync_after("regenerate candidates").await?;
    Ok(self.inner.read().await.snapshot.candidates.len())
  }

  #[instrument(level = "info", skip(self, answer), target = "reconcile", fields(answer_len = answer.len()))]
  pub async fn update_answer(&self, answer: &str) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    self.require_question().await?;
    let answer = non_empty(answer, "answer")?;
    self.bounded("update answer", self.backend.update_answer(&answer)).await?;
    self.patch(|s| {
      s.ground_truth = answer;
      s.invalidate_derived();
      remark_ground_truth(s);
    })
    .await;
    self.settle().await;
    Ok(())
  }

  // --- hints ---

  #[instrument(level = "info", skip(self, text), target = "reconcile", fields(text_len = text.len()))]
  pub async fn add_hint(&self, text: &str) -> ConsoleResult<Hint> {
    self.ensure_editable().await?;
    self.require_question().await?;
    let text = non_empty(text, "hint text")?;
    let remote = self.bounded("save hint", self.backend.create_hint(&text)).await?;
    let hint = Hint {
      id: remote.id,
      display_color: color_from_id(remote.id.0),
      text: if remote.text.trim().is_empty() { text } else { remote.text },
    };
    self.patch(|s| {
      if s.hint(hint.id).is_none() {
        s.hints.push(hint.clone());
      }
      s.invalidate_derived();
    })
    .await;
    self.settle().await;
    Ok(hint)
  }

  #[instrument(level = "info", skip(self, text), target = "reconcile", fields(%id, text_len = text.len()))]
  pub async fn update_hint(&self, id: HintId, text: &str) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    let text = non_empty(text, "hint text")?;
    if self.inner.read().await.snapshot.hint(id).is_none() {
      return Err(ConsoleError::UnknownHint(id));
    }
    self.bounded("update hint", self.backend.update_hint(id, &text)).await?;
    self.patch(|s| {
      if let Some(h) = s.hints.iter_mut().find(|h| h.id == id) {
        h.text = text;
      }
      s.invalidate_derived();
    })
    .await;
    self.settle().await;
    Ok(())
  }

  #[instrument(level = "info", skip(self), target = "reconcile", fields(%id))]
  pub async fn delete_hint(&self, id: HintId) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    if self.inner.read().await.snapshot.hint(id).is_none() {
      return Err(ConsoleError::UnknownHint(id));
    }
    self.bounded("delete hint", self.backend.delete_hint(id)).await?;
    self.patch(|s| {
      s.remove_hint(id);
      s.invalidate_derived();
      s.prune_stale();
    })
    .await;
    self.settle().await;
    Ok(())
  }

  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn delete_all_hints(&self) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    self.bounded("delete all hints", self.backend.delete_all_hints()).await?;
    self.patch(|s| {
      s.hints.clear();
      s.invalidate_derived();
      s.hint_step = 0;
    })
    .await;
    self.settle().await;
    Ok(())
  }

  // --- candidates ---

  async fn position_of(&self, id: CandidateId) -> ConsoleResult<usize> {
    self.inner.read().await.snapshot.candidate_position(id).ok_or(ConsoleError::UnknownCandidate(id))
  }

  #[instrument(level = "info", skip(self, text), target = "reconcile", fields(text_len = text.len()))]
  pub async fn add_candidate(&self, text: &str) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    self.require_question().await?;
    let text = non_empty(text, "candidate text")?;
    self.bounded("save candidate", self.backend.create_candidate(&text)).await?;
    self.patch(|s| {
      let id = s.next_candidate_id();
      s.push_candidate(Candidate { id, text, is_ground_truth: false });
      s.invalidate_derived();
    })
    .await;
    self.resync_after("save candidate").await
  }

  /// Text-only edit: position and identity are unchanged, so no resync.
  #[instrument(level = "info", skip(self, text), target = "reconcile", fields(%id, text_len = text.len()))]
  pub async fn update_candidate(&self, id: CandidateId, text: &str) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    let text = non_empty(text, "candidate text")?;
    let pos = self.position_of(id).await?;
    self.bounded("update candidate", self.backend.update_candidate(pos, &text)).await?;
    self.patch(|s| {
      if let Some(c) = s.candidates.iter_mut().find(|c| c.id == id) {
        c.text = text;
      }
      s.invalidate_derived();
    })
    .await;
    self.settle().await;
    Ok(())
  }

  #[instrument(level = "info", skip(self), target = "reconcile", fields(%id))]
  pub async fn delete_candidate(&self, id: CandidateId) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    let pos = self.position_of(id).await?;
    self.bounded("delete candidate", self.backend.delete_candidate(pos)).await?;
    self.patch(|s| {
      s.remove_candidate(id);
      s.invalidate_derived();
    })
    .await;
    self.resync_after("delete candidate").await
  }

  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn delete_all_candidates(&self) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    self.bounded("delete all candidates", self.backend.delete_all_candidates()).await?;
    self.patch(|s| {
      s.candidates.clear();
      s.invalidate_derived();
    })
    .await;
    self.resync_after("delete all candidates").await
  }

  /// Mark one candidate as ground truth, or unmark all with `None`.
  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn set_ground_truth(&self, id: Option<CandidateId>) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    let pos = match id {
      Some(id) => Some(self.position_of(id).await?),
      None => None,
    };
    self.bounded("set ground truth", self.backend.set_ground_truth(pos)).await?;
    self.patch(|s| {
      s.mark_ground_truth(id);
      s.ground_truth = pos.and_then(|p| s.candidates.get(p)).map(|c| c.text.clone()).unwrap_or_default();
      s.invalidate_derived();
    })
    .await;
    self.resync_after("set ground truth").await
  }

  // --- session ---

  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn reset(&self) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    self.bounded("reset session", self.backend.reset_session()).await?;
    {
      let mut g = self.inner.write().await;
      let inner = &mut *g;
      inner.snapshot.clear_session();
      if inner.phase == Phase::Uninitialized {
        inner.phase = Phase::Ready;
      }
    }
    self.settle().await;
    Ok(())
  }

  /// Load a built-in preset upstream (ids are assigned there) and resync.
  #[instrument(level = "info", skip(self), target = "reconcile")]
  pub async fn load_preset(&self, key: &str) -> ConsoleResult<()> {
    self.ensure_editable().await?;
    let preset = find_preset(key).ok_or_else(|| ConsoleError::UnknownPreset(key.to_string()))?;
    self.bounded("load preset", self.backend.load_preset(&preset.to_payload())).await?;
    self.patch(|s| s.clear_session()).await;
    self.resync_after("load preset").await
  }

  pub async fn update_run_config(&self, run: RunConfig) -> ConsoleResult<RunConfig> {
    self.ensure_idle()?;
    if !run.temperature.is_finite() || run.temperature < 0.0 {
      return Err(ConsoleError::InvalidInput("temperature must be a non-negative number".into()));
    }
    if run.num_hints == 0 || run.num_candidates == 0 {
      return Err(ConsoleError::InvalidInput("hint and candidate counts must be at least 1".into()));
    }
    if run.model_name.trim().is_empty() {
      return Err(ConsoleError::InvalidInput("model name must not be empty".into()));
    }
    self.patch(|s| s.run = run.clone()).await;
    self.settle().await;
    Ok(run)
  }

  // --- view state ---

  pub async fn reorder_hints(&self, from: usize, to: usize) -> ConsoleResult<bool> {
    self.ensure_idle()?;
    let moved = {
      let mut g = self.inner.write().await;
      let len = g.snapshot.hints.len();
      if from >= len || to >= len {
        return Err(ConsoleError::InvalidInput(format!("hint position out of range (0..{len})")));
      }
      g.snapshot.move_hint(from, to)
    };
    if moved {
      self.settle().await;
    }
    Ok(moved)
  }

  /// Reorder hints by `metric`. Nothing changes when no hint has metrics or the
  /// order would stay the same.
  pub async fn apply_sort(&self, metric: MetricKey, dir: SortDirection) -> bool {
    let changed = {
      let mut g = self.inner.write().await;
      let s = &mut g.snapshot;
      if !s.hints.iter().any(|h| has_metrics(&s.metrics, h.id)) {
        false
      } else {
        let sorted = sort_hints(&s.hints, &s.metrics, metric, dir);
        if sorted.iter().map(|h| h.id).eq(s.hints.iter().map(|h| h.id)) {
          false
        } else {
          s.hints = sorted;
          s.sort_metric = metric;
          s.sort_dir = dir;
          true
        }
      }
    };
    if changed {
      self.settle().await;
    }
    changed
  }

  /// Sequential step counter, clamped to the hint count.
  pub async fn set_step(&self, step: usize) -> usize {
    let step = self.patch(|s| {
      s.hint_step = step.min(s.hints.len());
      s.hint_step
    })
    .await;
    self.settle().await;
    step
  }

  pub async fn set_mode(&self, mode: ElimMode) {
    self.patch(|s| s.elim_mode = mode).await;
    self.settle().await;
  }

  /// Set (or toggle, when `revealed` is `None`) a hint's reveal flag. Returns the new flag.
  pub async fn set_revealed(&self, id: HintId, revealed: Option<bool>) -> ConsoleResult<bool> {
    self.ensure_idle()?;
    let now = {
      let mut g = self.inner.write().await;
      let s = &mut g.snapshot;
      if s.hint(id).is_none() {
        return Err(ConsoleError::UnknownHint(id));
      }
      let want = revealed.unwrap_or(!s.revealed.contains(&id));
      if want { s.revealed.insert(id); } else { s.revealed.remove(&id); }
      want
    };
    self.settle().await;
    Ok(now)
  }

  // --- derived reads ---

  pub async fn sorted_hints(&self, metric: MetricKey, dir: SortDirection) -> Vec<Hint> {
    let g = self.inner.read().await;
    sort_hints(&g.snapshot.hints, &g.snapshot.metrics, metric, dir)
  }

  pub async fn hint_views(&self) -> Vec<HintView> {
    hint_views_of(&self.inner.read().await.snapshot)
  }

  pub async fn session_view(&self) -> SessionView {
    let g = self.inner.read().await;
    SessionView {
      phase: g.phase,
      busy: self.is_busy(),
      version: self.version(),
      snapshot: g.snapshot.clone(),
      hints: hint_views_of(&g.snapshot),
    }
  }

  pub async fn entities(&self) -> BTreeMap<HintId, Vec<Entity>> {
    self.inner.read().await.snapshot.entities.clone()
  }

  /// Candidate-pool reduction for the hints the current mode reveals.
  pub async fn reduction(&self) -> Vec<ReductionStep> {
    let g = self.inner.read().await;
    let s = &g.snapshot;
    let active = revealed_hints(&s.hints, s.elim_mode, s.hint_step, &s.revealed);
    reduce(&active, &s.candidate_texts(), &s.elimination)
  }

  pub async fn candidate_statuses(&self) -> Vec<CandidateStatus> {
    let g = self.inner.read().await;
    let s = &g.snapshot;
    candidate_statuses(&s.candidates, &s.hints, s.elim_mode, s.hint_step, &s.revealed, &s.elimination)
  }

  pub async fn similarity(&self) -> SimilarityReport {
    let g = self.inner.read().await;
    let s = &g.snapshot;
    similarity_report(&s.hints, &s.candidates, &s.elimination, s.embedding.as_ref())
  }
}
