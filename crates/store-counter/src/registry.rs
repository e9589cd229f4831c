//! Session registry: starts, looks up and ends counting sessions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::EngineConfig;
use crate::session::{IngestReceipt, OccupancySession, SessionInfo, SessionSummary};
use crate::storage::BucketLogWriter;
use crate::types::{
    CounterError, CounterResult, DetectionEvent, SceneState, SessionId, SessionTotals, SourceKind,
};

/// All sessions of one process, sharing one [`EngineConfig`].
///
/// Sessions are independent; the registry lock is only held to find or
/// insert them. Ended sessions stay readable until [`SessionRegistry::forget`].
pub struct SessionRegistry {
    config: EngineConfig,
    sessions: RwLock<HashMap<SessionId, Arc<OccupancySession>>>,
}

impl SessionRegistry {
    pub fn new(config: EngineConfig) -> CounterResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a session for a new video source.
    pub fn start_session(&self, source: SourceKind) -> CounterResult<Arc<OccupancySession>> {
        let id = SessionId::new();
        let log = match self.log_path(id) {
            Some(path) => Some(BucketLogWriter::create(&path, id, self.config.window_ms)?),
            None => None,
        };

        let session = Arc::new(OccupancySession::with_id(id, source, &self.config, log)?);
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&session));

        tracing::info!("Started {source} session {id}");
        Ok(session)
    }

    pub fn end_session(&self, id: SessionId) -> CounterResult<SessionSummary> {
        Ok(self.get(id)?.end())
    }

    pub fn get(&self, id: SessionId) -> CounterResult<Arc<OccupancySession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(CounterError::SessionNotFound(id))
    }

    /// Every known session, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<OccupancySession>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        infos
    }

    /// Drop a session and its in-memory history. A live session is ended first.
    pub fn forget(&self, id: SessionId) -> CounterResult<SessionSummary> {
        let session = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(CounterError::SessionNotFound(id))?;
        Ok(session.end())
    }

    /// End every live session, e.g. on server shutdown.
    pub fn end_all(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<OccupancySession>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| !s.is_closed())
            .cloned()
            .collect();
        sessions.iter().map(|s| s.end()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ingest(&self, id: SessionId, event: &DetectionEvent) -> CounterResult<IngestReceipt> {
        Ok(self.get(id)?.ingest(event)?)
    }

    pub fn current_scene(&self, id: SessionId) -> CounterResult<SceneState> {
        Ok(self.get(id)?.current_scene())
    }

    pub fn totals(&self, id: SessionId) -> CounterResult<SessionTotals> {
        Ok(self.get(id)?.totals())
    }

    pub fn timeline(&self, id: SessionId, from_ms: i64, to_ms: i64) -> CounterResult<Vec<SceneState>> {
        Ok(self.get(id)?.query().state_in_range(from_ms, to_ms)?)
    }

    pub fn state_at(&self, id: SessionId, timestamp_ms: i64) -> CounterResult<SceneState> {
        Ok(self.get(id)?.query().state_at(timestamp_ms)?)
    }

    fn log_path(&self, id: SessionId) -> Option<PathBuf> {
        self.config
            .log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{id}.occl")))
    }
}
