//! services/server/src/web/state.rs
//!
//! Defines the application's shared state and the registry of visitor sessions.

use crate::web::view::Views;
use chatbot_core::controller::{Services, Session};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub services: Services,
    pub sessions: SessionRegistry,
    pub views: Views,
}

//=========================================================================================
// SessionRegistry (One Entry Per Browser Session)
//=========================================================================================

/// A session behind its own lock. Holding it for a whole request keeps two
/// actions of the same visitor from interleaving.
pub type SessionHandle = Arc<Mutex<Session>>;

/// The session attached to the current request by the session middleware.
#[derive(Clone)]
pub struct CurrentSession(pub SessionHandle);

/// The outcome of looking up a session cookie.
pub struct ResolvedSession {
    pub id: Uuid,
    pub handle: SessionHandle,
    /// True when no live session matched and a fresh one was created.
    pub created: bool,
}

/// Sessions that never logged in are dropped after this long, or after the
/// configured limit if that is shorter.
const ANONYMOUS_IDLE_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, SessionHandle>>>,
    max_idle: Duration,
}

impl SessionRegistry {
    pub fn new(max_idle: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            max_idle,
        }
    }

    fn idle_limit(&self, session: &Session) -> Duration {
        if session.is_authenticated() {
            self.max_idle
        } else {
            self.max_idle.min(Duration::minutes(ANONYMOUS_IDLE_MINUTES))
        }
    }

    /// Returns the live session for `id`, or a new anonymous one when the id is
    /// missing, unknown, or has gone idle.
    pub async fn resolve(&self, id: Option<Uuid>) -> ResolvedSession {
        let now = Utc::now();

        if let Some(id) = id {
            let existing = self.sessions.lock().await.get(&id).cloned();
            if let Some(handle) = existing {
                let mut session = handle.lock().await;
                if !session.is_idle(now, self.idle_limit(&session)) {
                    session.touch(now);
                    drop(session);
                    return ResolvedSession {
                        id,
                        handle,
                        created: false,
                    };
                }
                drop(session);
                self.remove(id).await;
                info!("Session {} expired", id);
            }
        }

        let session = Session::new();
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.lock().await.insert(id, handle.clone());
        info!("Created session {}", id);
        ResolvedSession {
            id,
            handle,
            created: true,
        }
    }

    pub async fn remove(&self, id: Uuid) {
        self.sessions.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Drops every session idle for longer than the configured limit and returns
    /// how many were removed. Sessions busy with a request are left alone.
    pub async fn sweep(&self, now: chrono::DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => !session.is_idle(now, self.idle_limit(&session)),
            Err(_) => true,
        });
        before - sessions.len()
    }

    /// Runs `sweep` once a minute until `token` is cancelled.
    pub fn spawn_sweeper(&self, token: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = registry.sweep(Utc::now()).await;
                        if removed > 0 {
                            info!("Expired {} idle sessions", removed);
                        }
                    }
                }
            }
        })
    }
}
