//! Local snapshot persistence: a scoped key-value store holding the whole
//! session as one serialized record.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::{ConsoleError, ConsoleResult};
use crate::snapshot::SessionSnapshot;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the cached snapshot. A missing or unreadable record is `None`.
    async fn load(&self) -> Option<SessionSnapshot>;
    async fn save(&self, snapshot: &SessionSnapshot) -> ConsoleResult<()>;
}

/// One JSON file per scope under `dir`. Writes go to a temp file first and are renamed into place.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>, scope: &str) -> Self {
        let file = format!("{}.json", sanitize_scope(scope));
        Self { path: dir.as_ref().join(file) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn sanitize_scope(scope: &str) -> String {
    let s: String = scope
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if s.is_empty() { "default".into() } else { s }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Option<SessionSnapshot> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(target: "reconcile", error = %e, "Failed to read snapshot cache");
                return None;
            }
        };
        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(target: "reconcile", error = %e, "Snapshot cache is corrupt; ignoring it");
                None
            }
        }
    }

    #[instrument(level = "debug", skip(self, snapshot), fields(path = %self.path.display(), hints = snapshot.hints.len()))]
    async fn save(&self, snapshot: &SessionSnapshot) -> ConsoleResult<()> {
        let body = serde_json::to_vec(snapshot).map_err(|e| ConsoleError::Persistence(e.to_string()))?;
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ConsoleError::Persistence(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| ConsoleError::Persistence(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ConsoleError::Persistence(e.to_string()))?;
        debug!(target: "reconcile", bytes = body.len(), "Snapshot cache written");
        Ok(())
    }
}

/// In-process store; counts writes so callers can observe persistence.
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<SessionSnapshot>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self { record: Mutex::new(Some(snapshot)), writes: Mutex::new(0) }
    }

    pub fn current(&self) -> Option<SessionSnapshot> {
        self.record.lock().map(|g| g.clone()).unwrap_or(None)
    }

    pub fn writes(&self) -> usize {
        self.writes.lock().map(|g| *g).unwrap_or(0)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Option<SessionSnapshot> {
        self.current()
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> ConsoleResult<()> {
        let mut rec = self.record.lock().map_err(|e| ConsoleError::Persistence(e.to_string()))?;
        *rec = Some(snapshot.clone());
        if let Ok(mut w) = self.writes.lock() {
            *w += 1;
        }
        Ok(())
    }
}
