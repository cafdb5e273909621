mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{brazil_evaluation, console_with, row, FakeBackend};
use hinteval_console::cache::MemoryStore;
use hinteval_console::console::Console;
use hinteval_console::domain::{CandidateId, ElimMode, Entity, HintId, MetricKey, RunConfig, SortDirection};
use hinteval_console::error::{ConsoleError, ServiceError};
use hinteval_console::service::{Generated, RemoteHint};

async fn ready_brazil() -> (Arc<FakeBackend>, Arc<MemoryStore>, Arc<Console>) {
  let backend = Arc::new(FakeBackend::with_session("What is the capital of Brazil?", "Brasília"));
  backend.set_hints(&[(1, "A planned city"), (2, "Far from the coast")]);
  backend.state.lock().unwrap().evaluation = brazil_evaluation();
  let store = Arc::new(MemoryStore::default());
  let console = Arc::new(console_with(backend.clone(), store.clone()));
  console.reconcile().await.unwrap();
  (backend, store, console)
}

#[tokio::test]
async fn evaluate_folds_results_and_sorts_by_convergence() {
  let (backend, store, console) = ready_brazil().await;
  let writes_before = store.writes();

  let summary = console.evaluate().await.unwrap();
  assert!(summary.applied);
  assert_eq!(summary.evaluated, 2);
  assert_eq!(summary.candidates, 3);
  assert_eq!(backend.calls("evaluate"), 1);

  let s = console.snapshot().await;
  assert_eq!(s.hints.iter().map(|h| h.id).collect::<Vec<_>>(), [HintId(2), HintId(1)]);
  assert_eq!(s.sort_metric, MetricKey::Convergence);
  assert_eq!(s.sort_dir, SortDirection::Desc);
  assert!(s.candidates[2].is_ground_truth);
  assert_eq!(s.elimination.vector(HintId(1)), Some(&[true, false, false][..]));
  assert_eq!(s.elimination.vector(HintId(2)), Some(&[true, true, false][..]));
  assert!(store.writes() > writes_before);

  let views = console.hint_views().await;
  assert!(views.iter().all(|v| v.evaluated));
  assert_eq!(views[0].convergence, Some(0.9));
}

#[tokio::test]
async fn evaluate_without_question_is_rejected() {
  let backend = Arc::new(FakeBackend::with_session("", ""));
  let console = console_with(backend.clone(), Arc::new(MemoryStore::default()));
  console.reconcile().await.unwrap();
  assert!(matches!(console.evaluate().await, Err(ConsoleError::NoActiveQuestion)));
  assert_eq!(backend.calls("evaluate"), 0);
}

#[tokio::test]
async fn only_one_long_operation_runs_at_a_time() {
  let (backend, _store, console) = ready_brazil().await;
  *backend.delay.lock().unwrap() = Some(Duration::from_millis(200));

  let running = {
    let console = console.clone();
    tokio::spawn(async move { console.evaluate().await })
  };
  tokio::time::sleep(Duration::from_millis(30)).await;
  assert!(console.is_busy());
  assert!(matches!(console.regenerate_answer().await, Err(ConsoleError::Busy)));
  assert!(matches!(console.generate("Another question").await, Err(ConsoleError::Busy)));

  assert!(running.await.unwrap().unwrap().applied);
  assert!(!console.is_busy());
}

#[tokio::test]
async fn edits_are_rejected_while_evaluating() {
  let (backend, store, console) = ready_brazil().await;
  *backend.delay.lock().unwrap() = Some(Duration::from_millis(200));

  let running = {
    let console = console.clone();
    tokio::spawn(async move { console.evaluate().await })
  };
  tokio::time::sleep(Duration::from_millis(30)).await;
  assert!(console.is_busy());

  assert!(matches!(console.add_hint("Home of the Congress").await, Err(ConsoleError::Busy)));
  assert!(matches!(console.update_hint(HintId(1), "edited").await, Err(ConsoleError::Busy)));
  assert!(matches!(console.delete_hint(HintId(2)).await, Err(ConsoleError::Busy)));
  assert!(matches!(console.delete_all_hints().await, Err(ConsoleError::Busy)));
  assert!(matches!(console.add_candidate("Salvador").await, Err(ConsoleError::Busy)));
  assert!(matches!(console.update_candidate(CandidateId(0), "Rio").await, Err(ConsoleError::Busy)));
  assert!(matches!(console.delete_candidate(CandidateId(0)).await, Err(ConsoleError::Busy)));
  assert!(matches!(console.delete_all_candidates().await, Err(ConsoleError::Busy)));
  assert!(matches!(console.set_ground_truth(Some(CandidateId(0))).await, Err(ConsoleError::Busy)));
  assert!(matches!(console.update_answer("Rio").await, Err(ConsoleError::Busy)));
  assert!(matches!(console.reorder_hints(0, 1).await, Err(ConsoleError::Busy)));
  assert!(matches!(console.set_revealed(HintId(1), Some(true)).await, Err(ConsoleError::Busy)));
  assert!(matches!(console.update_run_config(RunConfig::default()).await, Err(ConsoleError::Busy)));
  assert!(matches!(console.resync().await, Err(ConsoleError::Busy)));
  assert!(matches!(console.reset().await, Err(ConsoleError::Busy)));
  let key = hinteval_console::seeds::presets()[0].question.clone();
  assert!(matches!(console.load_preset(&key).await, Err(ConsoleError::Busy)));

  for call in ["create_hint", "update_hint", "delete_hint", "create_candidate", "reset_session", "load_preset"] {
    assert_eq!(backend.calls(call), 0, "{call} reached upstream");
  }
  let writes = store.writes();

  let summary = running.await.unwrap().unwrap();
  assert!(summary.applied);
  assert!(store.writes() > writes);
  let s = console.snapshot().await;
  assert_eq!(s.hints.len(), 2);
  assert!(s.revealed.is_empty());

  // Edits resume once the batch lands.
  console.add_hint("Home of the Congress").await.unwrap();
  assert_eq!(backend.calls("create_hint"), 1);
}

#[tokio::test]
async fn analytics_feeds_follow_the_display_order() {
  let (backend, _store, console) = ready_brazil().await;
  {
    let mut s = backend.state.lock().unwrap();
    s.embedding = vec![vec![1.0, 0.25], vec![0.25, 1.0]];
    s.entities = [
      (HintId(1), vec![Entity { text: "city".into(), kind: "LOC".into(), start: 10, end: 14, metadata: json!({}) }]),
      (HintId(8), Vec::new()),
    ]
    .into_iter()
    .collect();
  }

  console.evaluate().await.unwrap();
  // Sorted by convergence, hint 2 now shows first.
  let report = console.similarity().await;
  assert_eq!(report.hint_ids, [HintId(2), HintId(1)]);
  assert_eq!(report.embedding, Some(vec![vec![1.0, 0.25], vec![0.25, 1.0]]));
  let entities = console.entities().await;
  assert_eq!(entities.keys().copied().collect::<Vec<_>>(), [HintId(1)]);
  assert_eq!(entities[&HintId(1)][0].text, "city");

  console.add_hint("Home of the Congress").await.unwrap();
  assert_eq!(console.similarity().await.embedding, None, "a new hint invalidates the embedding");
}

#[tokio::test]
async fn failing_analytics_do_not_block_a_resync() {
  let (backend, _store, console) = ready_brazil().await;
  backend.state.lock().unwrap().fail_analytics = true;
  console.resync().await.unwrap();
  assert_eq!(console.snapshot().await.hints.len(), 2);
  assert_eq!(console.similarity().await.embedding, None);
  assert!(console.entities().await.is_empty());
  assert!(backend.calls("fetch_embedding_similarities") >= 2);
}

#[tokio::test]
async fn timed_out_operation_releases_the_busy_flag() {
  let backend = Arc::new(FakeBackend::with_session("What is the capital of Brazil?", "Brasília"));
  backend.set_hints(&[(1, "A planned city")]);
  backend.state.lock().unwrap().evaluation = brazil_evaluation();
  *backend.delay.lock().unwrap() = Some(Duration::from_millis(300));
  let console = Console::new(backend.clone(), Arc::new(MemoryStore::default()), RunConfig::default(), Duration::from_millis(50));
  console.reconcile().await.unwrap();

  let err = console.evaluate().await.unwrap_err();
  assert!(matches!(err, ConsoleError::Service { source: ServiceError::Timeout { .. }, .. }));
  assert!(!console.is_busy());

  // The abandoned batch no longer holds its claim.
  *backend.delay.lock().unwrap() = None;
  assert!(console.evaluate().await.unwrap().applied);
}

#[tokio::test]
async fn adding_a_candidate_resyncs_from_upstream() {
  let (backend, _store, console) = ready_brazil().await;
  let lists_before = backend.calls("list_candidates");

  console.add_candidate("  Salvador ").await.unwrap();
  assert_eq!(backend.calls("create_candidate"), 1);
  assert_eq!(backend.calls("list_candidates"), lists_before + 1);

  let s = console.snapshot().await;
  assert_eq!(s.candidate_texts(), ["Salvador"]);
  assert_eq!(s.candidates[0].id, CandidateId(0));

  assert!(matches!(console.add_candidate("   ").await, Err(ConsoleError::InvalidInput(_))));
  assert_eq!(backend.calls("create_candidate"), 1);
}

#[tokio::test]
async fn hint_edits_patch_locally_and_clear_derived_state() {
  let (backend, _store, console) = ready_brazil().await;
  console.evaluate().await.unwrap();
  let hint_lists = backend.calls("list_hints");

  let added = console.add_hint("Home of the Congress").await.unwrap();
  assert_eq!(added.id, HintId(100));
  assert_eq!(backend.calls("list_hints"), hint_lists);

  let s = console.snapshot().await;
  assert_eq!(s.hints.len(), 3);
  assert!(s.metrics.is_empty());
  assert!(s.elimination.is_empty());

  console.update_hint(HintId(1), "Designed by Lúcio Costa").await.unwrap();
  console.delete_hint(HintId(2)).await.unwrap();
  let s = console.snapshot().await;
  assert_eq!(s.hints.iter().map(|h| h.id).collect::<Vec<_>>(), [HintId(1), HintId(100)]);
  assert_eq!(s.hints[0].text, "Designed by Lúcio Costa");

  assert!(matches!(console.delete_hint(HintId(2)).await, Err(ConsoleError::UnknownHint(HintId(2)))));
}

#[tokio::test]
async fn ground_truth_follows_the_selected_candidate() {
  let (backend, _store, console) = ready_brazil().await;
  backend.set_candidates(&["Rio de Janeiro", "Brasília"]);
  console.resync().await.unwrap();
  assert!(console.snapshot().await.candidates[1].is_ground_truth);

  console.set_ground_truth(Some(CandidateId(0))).await.unwrap();
  let s = console.snapshot().await;
  assert_eq!(s.ground_truth, "Rio de Janeiro");
  assert!(s.candidates[0].is_ground_truth);
  assert!(!s.candidates[1].is_ground_truth);

  console.set_ground_truth(None).await.unwrap();
  assert!(console.snapshot().await.candidates.iter().all(|c| !c.is_ground_truth));
  assert!(matches!(
    console.set_ground_truth(Some(CandidateId(9))).await,
    Err(ConsoleError::UnknownCandidate(CandidateId(9)))
  ));
}

#[tokio::test]
async fn elimination_persists_through_the_sequence() {
  let backend = Arc::new(FakeBackend::with_session("What is the capital of France?", "Paris"));
  backend.set_hints(&[(1, "Not on the Seine"), (2, "A large French city")]);
  backend.set_candidates(&["Paris", "Lyon", "Marseille"]);
  backend.state.lock().unwrap().compatibility = vec![
    (HintId(1), row(json!({"Paris": 0, "Lyon": 1, "Marseille": 1}))),
    (HintId(2), row(json!({"Paris": 1, "Lyon": 1, "Marseille": 1}))),
  ];
  let console = console_with(backend, Arc::new(MemoryStore::default()));
  console.reconcile().await.unwrap();
  console.set_mode(ElimMode::Sequential).await;

  assert_eq!(console.set_step(1).await, 1);
  let paris = &console.candidate_statuses().await[0];
  assert!(paris.eliminated);

  assert_eq!(console.set_step(5).await, 2, "step is clamped to the hint count");
  let statuses = console.candidate_statuses().await;
  assert!(statuses[0].eliminated);
  assert_eq!(statuses[0].eliminated_by.len(), 1);
  assert!(!statuses[1].eliminated);

  let steps = console.reduction().await;
  assert_eq!(steps.iter().map(|s| s.remaining_count).collect::<Vec<_>>(), [3, 2, 2]);
  assert_eq!(steps[1].eliminated_this_step, ["Paris"]);
  assert!(steps[2].eliminated_this_step.is_empty());
}

#[tokio::test]
async fn generate_replaces_the_session() {
  let (backend, _store, console) = ready_brazil().await;
  backend.state.lock().unwrap().generated = Generated {
    hints: vec![
      RemoteHint { id: HintId(40), text: "Red planet".into() },
      RemoteHint { id: HintId(41), text: "Fourth from the sun".into() },
    ],
    answer: "Mars ".into(),
  };

  console.generate("Which planet is known as the Red Planet?").await.unwrap();
  assert_eq!(backend.calls("reset_session"), 1);
  let s = console.snapshot().await;
  assert_eq!(s.question, "Which planet is known as the Red Planet?");
  assert_eq!(s.ground_truth, "Mars");
  assert_eq!(s.hints.len(), 2);
  assert!(s.candidates.is_empty());
  assert!(!console.is_busy());
}

#[tokio::test]
async fn presets_load_through_upstream() {
  let (backend, _store, console) = ready_brazil().await;
  let key = hinteval_console::seeds::presets()[0].question.clone();
  console.load_preset(&key).await.unwrap();
  assert_eq!(backend.calls("load_preset"), 1);
  let s = console.snapshot().await;
  assert_eq!(s.question, key);
  assert!(!s.hints.is_empty());

  assert!(matches!(console.load_preset("no such preset").await, Err(ConsoleError::UnknownPreset(_))));
}

#[tokio::test]
async fn sorting_without_metrics_changes_nothing() {
  let (_backend, _store, console) = ready_brazil().await;
  let version = console.version();
  assert!(!console.apply_sort(MetricKey::Relevance, SortDirection::Asc).await);
  assert_eq!(console.version(), version);
}
