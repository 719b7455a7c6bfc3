//! Quarry Sessions
//!
//! Per-login session context and the token-keyed store that holds it. Each
//! session carries its own selected table, analytics dataset, last query
//! result and query history; nothing is shared between sessions and
//! nothing is persisted.
//!
//! Key Features:
//! - Random bearer tokens with a fixed lifetime
//! - Lazy sweep of expired sessions
//! - One mutex per session context
//! - In-memory analytics filtering over the loaded dataset
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::auth::generate_token;
use chrono::{Local, NaiveDateTime};
use parking_lot::{Mutex, RwLock};
use quarry_analytics::{apply_filters, Filter};
use quarry_common::{Result, ResultSet};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifetime of a session token.
pub const SESSION_DURATION: Duration = Duration::from_secs(12 * 60 * 60);

// =============================================================================
// Query History
// =============================================================================

/// Outcome recorded for a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Success,
    Error,
    Saved,
}

/// One executed or saved query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub query: String,
    pub timestamp: NaiveDateTime,
    pub status: HistoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    fn new(query: &str, status: HistoryStatus) -> Self {
        Self {
            query: query.to_string(),
            timestamp: Local::now().naive_local(),
            status,
            row_count: None,
            affected_rows: None,
            error: None,
        }
    }

    pub fn rows(query: &str, row_count: usize) -> Self {
        Self {
            row_count: Some(row_count),
            ..Self::new(query, HistoryStatus::Success)
        }
    }

    pub fn affected(query: &str, affected_rows: u64) -> Self {
        Self {
            affected_rows: Some(affected_rows),
            ..Self::new(query, HistoryStatus::Success)
        }
    }

    pub fn failed(query: &str, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(query, HistoryStatus::Error)
        }
    }

    pub fn saved(query: &str) -> Self {
        Self::new(query, HistoryStatus::Saved)
    }
}

// =============================================================================
// Analytics Dataset
// =============================================================================

/// A table sample loaded for analysis plus the filters applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsDataset {
    pub table: String,
    pub limit: usize,
    pub original: ResultSet,
    pub filters: Vec<Filter>,
    filtered: Option<ResultSet>,
}

impl AnalyticsDataset {
    pub fn new(table: impl Into<String>, limit: usize, original: ResultSet) -> Self {
        Self {
            table: table.into(),
            limit,
            original,
            filters: Vec::new(),
            filtered: None,
        }
    }

    /// The rows every analysis runs on: the filtered view if any.
    pub fn view(&self) -> &ResultSet {
        self.filtered.as_ref().unwrap_or(&self.original)
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered.is_some()
    }

    /// "Original" or "Filtered".
    pub fn status(&self) -> &'static str {
        if self.is_filtered() {
            "Filtered"
        } else {
            "Original"
        }
    }

    /// Replace the active filters. The view is recomputed from the original
    /// rows; on error the previous view is kept.
    pub fn apply(&mut self, filters: Vec<Filter>) -> Result<()> {
        if filters.is_empty() {
            self.reset();
            return Ok(());
        }
        let filtered = apply_filters(&self.original, &filters)?;
        self.filters = filters;
        self.filtered = Some(filtered);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.filters.clear();
        self.filtered = None;
    }
}

// =============================================================================
// Session Context
// =============================================================================

/// The last custom query result, kept for export.
#[derive(Debug, Clone, PartialEq)]
pub struct LastResult {
    pub result: ResultSet,
    pub executed_at: NaiveDateTime,
}

/// Everything one logged-in user has selected, loaded and run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub username: String,
    pub selected_table: Option<String>,
    pub analytics: Option<AnalyticsDataset>,
    pub last_result: Option<LastResult>,
    pub history: Vec<HistoryEntry>,
}

impl SessionContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            selected_table: None,
            analytics: None,
            last_result: None,
            history: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// Remove one history entry by position.
    pub fn remove_history(&mut self, index: usize) -> Option<HistoryEntry> {
        (index < self.history.len()).then(|| self.history.remove(index))
    }

    /// Drop the whole history. Returns the number of entries removed.
    pub fn clear_history(&mut self) -> usize {
        let removed = self.history.len();
        self.history.clear();
        removed
    }
}

/// A session context shared between the store and in-flight requests.
pub type SharedSession = Arc<Mutex<SessionContext>>;

/// The authenticated session of a request, set by the auth middleware.
#[derive(Clone)]
pub struct CurrentSession {
    pub token: String,
    pub context: SharedSession,
}

// =============================================================================
// Session Store
// =============================================================================

struct SessionEntry {
    context: SharedSession,
    expires_at: Instant,
}

impl SessionEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Live sessions keyed by bearer token.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    duration: Duration,
}

impl SessionStore {
    pub fn new(duration: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start a session for an authenticated user and return its token.
    pub fn create(&self, username: &str) -> String {
        self.cleanup_expired();
        let token = generate_token();
        let entry = SessionEntry {
            context: Arc::new(Mutex::new(SessionContext::new(username))),
            expires_at: Instant::now() + self.duration,
        };
        self.sessions.write().insert(token.clone(), entry);
        token
    }

    /// Resolve a token. Expired sessions are dropped on sight.
    pub fn get(&self, token: &str) -> Option<SharedSession> {
        {
            let sessions = self.sessions.read();
            match sessions.get(token) {
                Some(entry) if !entry.is_expired() => return Some(entry.context.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().remove(token);
        None
    }

    /// End a session. Returns false for unknown tokens.
    pub fn remove(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    /// Drop expired sessions. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired());
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_DURATION)
    }
}

// =============================================================================
// Tests
// =============================================================================
