//! Application state: in-memory session registry, configuration, the AI
//! gateway, and the upstream client used by the relay endpoint.
//!
//! Each session sits behind its own `tokio::sync::Mutex`. The lock is held
//! only for synchronous controller transitions, never across a model call,
//! so a `restart` or paste can always get through while a request is in flight.
//!
//! The registry remembers when each session was last looked up; a sweeper
//! drops sessions idle for longer than `[session] idle_timeout_secs`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{load_app_config_from_env, AppConfig};
use crate::gateway::Gateway;
use crate::gemini::Gemini;
use crate::session::{SessionController, SessionError};
use crate::timer::TickOutcome;

pub type SharedSession = Arc<Mutex<SessionController>>;

/// Registry entry: the session plus when a request last touched it.
pub struct SessionSlot {
    pub session: SharedSession,
    pub last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,
    pub config: Arc<AppConfig>,
    pub gateway: Gateway,
    /// Upstream client for `/api/relay`. `None` when no API key is configured.
    pub upstream: Option<Gemini>,
}

impl AppState {
    /// Build state from env: load config, init the upstream client and gateway.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_app_config_from_env().unwrap_or_default();

        let upstream = Gemini::from_env();
        if let Some(g) = &upstream {
            info!(target: "codekata_backend", base_url = %g.base_url, model = %g.model, "Upstream AI enabled.");
        } else {
            info!(target: "codekata_backend", "Upstream AI disabled (no GEMINI_API_KEY).");
        }

        let gateway = Gateway::from_env(upstream.clone());
        info!(target: "codekata_backend", transport = gateway.transport_name(), "AI gateway ready");

        Self::with_parts(config, gateway, upstream)
    }

    pub fn with_parts(config: AppConfig, gateway: Gateway, upstream: Option<Gemini>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            gateway,
            upstream,
        }
    }

    /// Register a fresh session in the setup phase.
    #[instrument(level = "info", skip(self))]
    pub async fn create_session(&self) -> SharedSession {
        let id = Uuid::new_v4().to_string();
        let controller = Arc::new(Mutex::new(SessionController::new(id.clone(), self.config.clone())));
        let slot = SessionSlot { session: controller.clone(), last_seen: Instant::now() };
        self.sessions.write().await.insert(id.clone(), slot);
        info!(target: "session", %id, "Session created");
        controller
    }

    /// Look a session up and mark it as recently used.
    pub async fn get_session(&self, id: &str) -> Result<SharedSession, SessionError> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        slot.last_seen = Instant::now();
        Ok(slot.session.clone())
    }

    /// Drop sessions idle for at least `max_idle`. Sessions whose lock is held
    /// (a transition or model result is being applied) are kept for the next
    /// sweep. Returns how many were removed.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| slot.last_seen.elapsed() < max_idle || slot.session.try_lock().is_err());
        let removed = before - sessions.len();
        if removed > 0 {
            info!(target: "session", removed, remaining = sessions.len(), "Swept idle sessions");
        }
        removed
    }

    /// Run `sweep_idle` periodically, as configured under `[session]`.
    pub fn spawn_sweeper(&self) {
        let state = self.clone();
        let every = Duration::from_secs(self.config.session.sweep_interval_secs.max(1));
        let max_idle = Duration::from_secs(self.config.session.idle_timeout_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                state.sweep_idle(max_idle).await;
            }
        });
    }
}

/// What a ticker does when the countdown runs out.
pub type ExpiryHandler = Box<dyn FnOnce(SharedSession) + Send>;

/// Drive one timer run: tick every second until the run stops or expires.
///
/// The task ends on its own once the timer is stopped, reset, or restarted,
/// since the controller reports `Inactive` for any run but the current one.
pub fn spawn_ticker(session: SharedSession, run: u64, on_expiry: ExpiryHandler) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        // First tick completes immediately; skip it so a second really passes.
        interval.tick().await;
        loop {
            interval.tick().await;
            let outcome = session.lock().await.tick(run);
            match outcome {
                TickOutcome::Ticked => continue,
                TickOutcome::Expired => {
                    on_expiry(session);
                    return;
                }
                TickOutcome::Inactive => {
                    debug!(target: "session", run, "Ticker finished");
                    return;
                }
            }
        }
    });
}
