//! The reconciled session: content, derived evaluation data and view settings,
//! persisted as one record.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Candidate, CandidateId, ElimMode, Entity, Hint, HintId, MetricKey, RunConfig, SortDirection};
use crate::elimination::EliminationMap;
use crate::metrics::MetricsByHint;
use crate::similarity::EmbeddingMatrix;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    pub question: String,
    pub ground_truth: String,
    pub hints: Vec<Hint>,
    pub candidates: Vec<Candidate>,
    pub metrics: MetricsByHint,
    pub elimination: EliminationMap,
    pub embedding: Option<EmbeddingMatrix>,
    pub entities: BTreeMap<HintId, Vec<Entity>>,
    pub revealed: BTreeSet<HintId>,
    pub hint_step: usize,
    pub elim_mode: ElimMode,
    pub sort_metric: MetricKey,
    pub sort_dir: SortDirection,
    pub run: RunConfig,
}

impl SessionSnapshot {
    pub fn empty(run: RunConfig) -> Self {
        Self { run, ..Self::default() }
    }

    pub fn has_question(&self) -> bool {
        !self.question.trim().is_empty()
    }

    pub fn hint(&self, id: HintId) -> Option<&Hint> {
        self.hints.iter().find(|h| h.id == id)
    }

    pub fn hint_ids(&self) -> BTreeSet<HintId> {
        self.hints.iter().map(|h| h.id).collect()
    }

    /// Render-time position of a candidate in the current ordering.
    pub fn candidate_position(&self, id: CandidateId) -> Option<usize> {
        self.candidates.iter().position(|c| c.id == id)
    }

    pub fn candidate_texts(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.text.clone()).collect()
    }

    /// Drop metrics, elimination data and reveal toggles. Called whenever hint
    /// text, candidate text, ground truth or set membership changes.
    pub fn invalidate_derived(&mut self) {
        self.metrics.clear();
        self.elimination.clear();
        self.embedding = None;
        self.entities.clear();
        self.revealed.clear();
    }

    /// Back to an empty session, keeping run configuration and view preferences.
    pub fn clear_session(&mut self) {
        let run = std::mem::take(&mut self.run);
        let (mode, metric, dir) = (self.elim_mode, self.sort_metric, self.sort_dir);
        // keep the epoch moving so in-flight batches notice
        self.elimination.clear();
        let elimination = std::mem::take(&mut self.elimination);
        *self = Self { run, elim_mode: mode, sort_metric: metric, sort_dir: dir, elimination, ..Self::default() };
    }

    /// Append a candidate, growing every elimination vector in lockstep.
    pub fn push_candidate(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
        self.elimination.append_candidate();
    }

    /// Remove a candidate, shrinking every elimination vector in lockstep.
    pub fn remove_candidate(&mut self, id: CandidateId) -> Option<Candidate> {
        let pos = self.candidate_position(id)?;
        self.elimination.remove_candidate(pos);
        Some(self.candidates.remove(pos))
    }

    pub fn remove_hint(&mut self, id: HintId) -> Option<Hint> {
        let pos = self.hints.iter().position(|h| h.id == id)?;
        self.elimination.remove_hint(id);
        self.metrics.remove(&id);
        self.revealed.remove(&id);
        Some(self.hints.remove(pos))
    }

    /// At most one ground truth; `None` unmarks all.
    pub fn mark_ground_truth(&mut self, id: Option<CandidateId>) {
        for c in &mut self.candidates {
            c.is_ground_truth = Some(c.id) == id;
        }
    }

    pub fn next_candidate_id(&self) -> CandidateId {
        CandidateId(self.candidates.iter().map(|c| c.id.0 + 1).max().unwrap_or(0))
    }

    /// Move the hint at `from` to `to` (drag-reorder). Out-of-range indices are ignored.
    pub fn move_hint(&mut self, from: usize, to: usize) -> bool {
        if from >= self.hints.len() || to >= self.hints.len() || from == to {
            return false;
        }
        let h = self.hints.remove(from);
        self.hints.insert(to, h);
        true
    }

    /// Reorder `self.hints` following `previous` id order; unknown ids keep their
    /// relative order at the end.
    pub fn apply_hint_order(&mut self, previous: &[HintId]) {
        let rank = |id: HintId| previous.iter().position(|p| *p == id).unwrap_or(usize::MAX);
        self.hints.sort_by_key(|h| rank(h.id));
    }

    /// Remove derived data that refers to hints or candidate positions that no longer exist.
    pub fn prune_stale(&mut self) {
        let known = self.hint_ids();
        self.metrics.retain(|id, _| known.contains(id));
        self.entities.retain(|id, _| known.contains(id));
        self.revealed.retain(|id| known.contains(id));
        self.elimination.retain_hints(&known);
        self.elimination.drop_stale(self.candidates.len());
        self.hint_step = self.hint_step.min(self.hints.len());
    }
}
