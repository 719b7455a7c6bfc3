//! Quarry Server State
//!
//! Application state shared across request handlers: the data service, the
//! session store, the configured login and the login rate limiter.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::config::ServerConfig;
use crate::middleware::RateLimiter;
use crate::session::SessionStore;
use quarry_common::config::{AppCredentials, DashboardConfig, QuarryConfig};
use quarry_db::{DataService, DatabaseBackend};
use std::sync::Arc;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub dashboard: Arc<DashboardConfig>,
    pub data: Arc<DataService>,
    pub sessions: Arc<SessionStore>,
    pub credentials: Option<Arc<AppCredentials>>,
    pub login_rate_limiter: RateLimiter,
}

impl AppState {
    /// Create application state over a database backend.
    pub fn new(
        config: ServerConfig,
        quarry: &QuarryConfig,
        backend: Arc<dyn DatabaseBackend>,
    ) -> Self {
        let credentials = quarry.auth.credentials().map(Arc::new);
        if credentials.is_none() {
            tracing::warn!("No login credentials configured, every login will be refused");
        }

        let data = DataService::new(backend, quarry.database.schema.clone(), &quarry.dashboard);

        Self {
            config: Arc::new(config),
            dashboard: Arc::new(quarry.dashboard.clone()),
            data: Arc::new(data),
            sessions: Arc::new(SessionStore::default()),
            credentials,
            login_rate_limiter: RateLimiter::new(quarry.dashboard.login_rate_limit),
        }
    }

    /// Replace the session store, e.g. to shorten the session lifetime.
    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Arc::new(sessions);
        self
    }
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use quarry_db::MemoryBackend;

    pub const USERNAME: &str = "analyst";
    pub const PASSWORD: &str = "hunter2";

    /// State over an in-memory backend with a plaintext test login.
    pub fn state_with(backend: Arc<MemoryBackend>) -> AppState {
        let mut quarry = QuarryConfig::default();
        quarry.auth.username = Some(USERNAME.to_string());
        quarry.auth.password = Some(PASSWORD.to_string());
        AppState::new(ServerConfig::default(), &quarry, backend)
    }

    pub fn state() -> AppState {
        state_with(Arc::new(MemoryBackend::default()))
    }
}
