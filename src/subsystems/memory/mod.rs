//! Memory subsystem: in-process per-user session store.
//!
//! # Ownership
//!
//! [`SessionStore`] owns every [`Session`]. Callers get a [`SessionHandle`]
//! (an `Arc` around an async mutex) and must lock it for each access; no
//! session reference outlives a single event.
//!
//! # Serialisation
//!
//! The outer map lock is synchronous and held only for lookup/insert, so a
//! user's session is created at most once. The per-session lock is a
//! `tokio::sync::Mutex` and may be held across an inference call: every
//! operation for one user is serialised, users never contend with each
//! other.
//!
//! Nothing is persisted; a restart forgets all sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::debug;

use crate::catalog::ModelCatalog;

/// Default number of stored history entries per session.
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// Telegram user id.
pub type UserId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown model: {0}")]
    InvalidModel(String),
}

/// Per-user conversation state.
#[derive(Debug)]
pub struct Session {
    selected_model_key: String,
    history: VecDeque<Turn>,
    message_count: u64,
    history_cap: usize,
}

impl Session {
    fn new(default_key: &str, history_cap: usize) -> Self {
        Self {
            selected_model_key: default_key.to_string(),
            history: VecDeque::new(),
            message_count: 0,
            history_cap,
        }
    }

    pub fn selected_model_key(&self) -> &str {
        &self.selected_model_key
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn history(&self) -> &VecDeque<Turn> {
        &self.history
    }

    /// The last `n` entries, oldest first. This is what gets forwarded to a
    /// provider whose history window is `n`.
    pub fn history_window(&self, n: usize) -> Vec<Turn> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Select `key`; an unknown key leaves the current selection untouched.
    pub fn select_model(&mut self, key: &str, catalog: &ModelCatalog) -> Result<(), SessionError> {
        if !catalog.contains(key) {
            return Err(SessionError::InvalidModel(key.to_string()));
        }
        self.selected_model_key = key.to_string();
        Ok(())
    }

    /// Record one completed exchange.
    pub fn append_turn(&mut self, user_text: &str, assistant_text: &str) {
        self.history.push_back(Turn::user(user_text));
        self.history.push_back(Turn::assistant(assistant_text));
        self.message_count += 1;

        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
        // Never start the stored history on a dangling reply.
        if self.history.front().is_some_and(|t| t.role == Role::Assistant) {
            self.history.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.message_count = 0;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            model_key: self.selected_model_key.clone(),
            message_count: self.message_count,
            history_len: self.history.len(),
        }
    }
}

/// Point-in-time copy of a session's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub model_key: String,
    pub message_count: u64,
    pub history_len: usize,
}

/// Shared handle to one user's session.
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<AsyncMutex<Session>>);

impl SessionHandle {
    /// Wait for exclusive access to the session.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }

    /// `true` if both handles refer to the same stored session.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
    catalog: Arc<ModelCatalog>,
    history_cap: usize,
}

impl SessionStore {
    pub fn new(catalog: Arc<ModelCatalog>, history_cap: Option<usize>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            catalog,
            history_cap: history_cap.unwrap_or(DEFAULT_HISTORY_CAP),
        }
    }

    /// Return the user's session, creating it with the default model.
    pub fn get_or_create(&self, user_id: UserId) -> SessionHandle {
        // A panic while holding this lock cannot leave the map half-written.
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(user_id)
            .or_insert_with(|| {
                debug!(user_id, default_model = %self.catalog.default_key(), "session created");
                SessionHandle(Arc::new(AsyncMutex::new(Session::new(
                    self.catalog.default_key(),
                    self.history_cap,
                ))))
            })
            .clone()
    }

    pub async fn set_model(&self, user_id: UserId, key: &str) -> Result<(), SessionError> {
        let handle = self.get_or_create(user_id);
        let mut session = handle.lock().await;
        session.select_model(key, &self.catalog)
    }

    pub async fn append_turn(&self, user_id: UserId, user_text: &str, assistant_text: &str) {
        let handle = self.get_or_create(user_id);
        handle.lock().await.append_turn(user_text, assistant_text);
    }

    pub async fn clear(&self, user_id: UserId) {
        let handle = self.get_or_create(user_id);
        handle.lock().await.clear();
    }

    pub async fn status(&self, user_id: UserId) -> SessionStatus {
        let handle = self.get_or_create(user_id);
        let session = handle.lock().await;
        session.status()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Number of sessions created so far.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
