// Session Store
// Server-side session values keyed by the session cookie id. Sessions idle
// longer than the TTL are dropped on load and by a periodic sweep.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::request_context::Session;

/// Host session cookie carrying the session id
pub const SESSION_COOKIE: &str = "shopinvader_session";

#[derive(Debug)]
struct StoredSession {
    values: Map<String, Value>,
    last_seen: Instant,
}

impl StoredSession {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() >= ttl
    }
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: Arc<DashMap<Uuid, StoredSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Restore the session for a cookie value, or start a fresh one
    pub fn load(&self, cookie_value: Option<&str>) -> Session {
        let Some(id) = cookie_value.and_then(|raw| Uuid::parse_str(raw).ok()) else {
            return Session::new();
        };

        // drop a stale entry before the lookup so it cannot be restored
        self.sessions.remove_if(&id, |_, stored| stored.is_stale(self.ttl));

        self.sessions
            .get_mut(&id)
            .map(|mut stored| {
                stored.last_seen = Instant::now();
                Session::restore(id, stored.values.clone())
            })
            .unwrap_or_default()
    }

    /// Persist a session; empty sessions are dropped
    pub fn save(&self, session: &Session) {
        if session.is_empty() {
            self.sessions.remove(&session.id());
        } else {
            self.sessions.insert(
                session.id(),
                StoredSession {
                    values: session.values().clone(),
                    last_seen: Instant::now(),
                },
            );
        }
    }

    /// Remove every session idle for at least the TTL; returns how many went
    pub fn sweep(&self) -> usize {
        sweep_stale(&self.sessions, self.ttl)
    }

    /// Sweep stale sessions every `interval` for the life of the runtime
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        let ttl = self.ttl;

        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let removed = sweep_stale(&sessions, ttl);
                if removed > 0 {
                    tracing::debug!(removed, remaining = sessions.len(), "Stale sessions evicted");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn sweep_stale(sessions: &DashMap<Uuid, StoredSession>, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, stored| !stored.is_stale(ttl));
    before.saturating_sub(sessions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SessionStore {
        SessionStore::with_ttl(Duration::from_secs(3600))
    }

    fn saved(store: &SessionStore) -> Session {
        let mut session = Session::new();
        session.insert("store_cart", json!({"id": 1}));
        store.save(&session);
        session
    }

    #[test]
    fn test_round_trip() {
        let store = store();
        let mut session = store.load(None);
        assert!(session.is_fresh());

        session.insert("store_cart", json!({"id": 1}));
        store.save(&session);

        let restored = store.load(Some(&session.id().to_string()));
        assert!(!restored.is_fresh());
        assert_eq!(restored.get("store_cart"), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_unknown_or_invalid_cookie_starts_fresh() {
        let store = store();
        assert!(store.load(Some("not-a-uuid")).is_fresh());
        assert!(store.load(Some(&Uuid::new_v4().to_string())).is_fresh());
    }

    #[test]
    fn test_empty_session_is_dropped() {
        let store = store();
        let mut session = saved(&store);
        assert_eq!(store.len(), 1);

        session.clear();
        store.save(&session);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_evicts_idle_sessions() {
        let store = SessionStore::with_ttl(Duration::from_millis(30));
        let idle = saved(&store);
        std::thread::sleep(Duration::from_millis(50));
        let active = saved(&store);

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.load(Some(&idle.id().to_string())).is_fresh());
        assert!(!store.load(Some(&active.id().to_string())).is_fresh());
    }

    #[test]
    fn test_idle_session_is_not_restored() {
        let store = SessionStore::with_ttl(Duration::from_millis(10));
        let session = saved(&store);
        std::thread::sleep(Duration::from_millis(30));

        assert!(store.load(Some(&session.id().to_string())).is_fresh());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_task_evicts_in_background() {
        let store = SessionStore::with_ttl(Duration::from_millis(10));
        saved(&store);
        saved(&store);

        let task = store.spawn_cleanup(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        task.abort();

        assert!(store.is_empty());
    }
}
