//! Session bootstrap and persistence handles.
//!
//! A session row ties a stream of runs to a user; the handle passed to the
//! agent runtime lets it persist conversation memory under that key. An
//! absent handle is a valid degraded mode: the run proceeds without
//! durable memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{Result, SwitchboardError};

/// Resolve the session key for a run: the client-provided id wins,
/// otherwise a fresh key is derived from the user and current time.
pub fn resolve_session_key(provided: Option<&str>, user_id: &str) -> String {
    match provided {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => format!("session_{}_{}", user_id, Utc::now().timestamp_millis()),
    }
}

/// Opaque persistence handle for one session, handed to the agent runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_key: String,
}

/// Storage collaborator for session rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Ensure a row exists for `(session_key, user_id)`. Idempotent.
    async fn ensure_session(&self, session_key: &str, user_id: &str) -> Result<()>;

    /// Open a persistence handle for the session, or `None` when durable
    /// memory is unavailable (degraded mode).
    async fn open_handle(&self, session_key: &str) -> Option<SessionHandle>;
}

#[derive(Debug, Clone)]
struct SessionRow {
    user_id: String,
    created_at: DateTime<Utc>,
}

/// In-memory session store. Per-process only; a deployment wanting
/// durable sessions supplies its own [`SessionStore`].
#[derive(Default)]
pub struct MemorySessionStore {
    rows: Arc<Mutex<HashMap<String, SessionRow>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known sessions, for health reporting.
    pub async fn session_count(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Owner and creation time of a session row, if present.
    pub async fn session_info(&self, session_key: &str) -> Option<(String, DateTime<Utc>)> {
        let rows = self.rows.lock().await;
        rows.get(session_key)
            .map(|row| (row.user_id.clone(), row.created_at))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn ensure_session(&self, session_key: &str, user_id: &str) -> Result<()> {
        if session_key.trim().is_empty() {
            return Err(SwitchboardError::Session(
                "session key must not be empty".to_string(),
            ));
        }
        let mut rows = self.rows.lock().await;
        rows.entry(session_key.to_string())
            .or_insert_with(|| SessionRow {
                user_id: user_id.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn open_handle(&self, session_key: &str) -> Option<SessionHandle> {
        let rows = self.rows.lock().await;
        rows.get(session_key).map(|_| SessionHandle {
            session_key: session_key.to_string(),
        })
    }
}

/// Store used when no persistence backend is configured; every run is
/// served in degraded mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSessionStore;

#[async_trait]
impl SessionStore for NullSessionStore {
    async fn ensure_session(&self, _session_key: &str, _user_id: &str) -> Result<()> {
        Ok(())
    }

    async fn open_handle(&self, _session_key: &str) -> Option<SessionHandle> {
        None
    }
}
