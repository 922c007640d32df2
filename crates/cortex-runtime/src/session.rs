use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use cortex_core::config::SessionConfig;
use cortex_core::conversation::MemoryConversationLog;
use cortex_core::hub::EventHub;
use cortex_core::state::SharedState;
use cortex_core::types::ConversationId;

/// Everything one conversation keeps between messages.
pub struct Session {
    cid: ConversationId,
    /// Held for the whole of a run, which serializes runs per conversation.
    state: tokio::sync::Mutex<SharedState>,
    log: Arc<MemoryConversationLog>,
    pub started_at: DateTime<Utc>,
    last_active: Mutex<Instant>,
}

impl Session {
    fn new(cid: ConversationId) -> Self {
        let log = Arc::new(MemoryConversationLog::new());
        let mut state = SharedState::for_conversation(&cid);
        state.attach_log(log.clone());
        Self {
            cid,
            state: tokio::sync::Mutex::new(state),
            log,
            started_at: Utc::now(),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.cid
    }

    pub fn log(&self) -> &Arc<MemoryConversationLog> {
        &self.log
    }

    /// Wait for exclusive access to the conversation state.
    pub async fn lock_state(&self) -> tokio::sync::MutexGuard<'_, SharedState> {
        self.state.lock().await
    }

    /// True while a run holds the state.
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }
}

/// Live sessions keyed by conversation id.
///
/// Sessions are created on first contact and evicted once idle past the
/// configured timeout. Eviction also drops the conversation's hub channel.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConversationId, Arc<Session>>>,
    hub: Arc<EventHub>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(hub: Arc<EventHub>, config: &SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            hub,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConversationId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the session for `cid`, creating it on first contact.
    pub fn get_or_create(&self, cid: &ConversationId) -> Arc<Session> {
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get(cid) {
            session.touch();
            return session.clone();
        }

        debug!(conversation = %cid, "Creating session");
        let session = Arc::new(Session::new(cid.clone()));
        sessions.insert(cid.clone(), session.clone());
        session
    }

    pub fn get(&self, cid: &ConversationId) -> Option<Arc<Session>> {
        self.sessions().get(cid).cloned()
    }

    /// Drop a session and its event channel.
    pub fn remove(&self, cid: &ConversationId) -> bool {
        let removed = self.sessions().remove(cid).is_some();
        if removed {
            self.hub.remove(cid);
        }
        removed
    }

    /// Evict sessions idle for at least the configured timeout.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_for(self.idle_timeout)
    }

    /// Evict sessions idle for at least `max_idle`. Busy sessions are kept.
    pub fn evict_idle_for(&self, max_idle: Duration) -> usize {
        let evicted: Vec<ConversationId> = {
            let mut sessions = self.sessions();
            let stale: Vec<ConversationId> = sessions
                .iter()
                .filter(|(_, s)| !s.is_busy() && s.idle_for() >= max_idle)
                .map(|(cid, _)| cid.clone())
                .collect();
            for cid in &stale {
                sessions.remove(cid);
            }
            stale
        };

        for cid in &evicted {
            self.hub.remove(cid);
            debug!(conversation = %cid, "Evicted idle session");
        }
        evicted.len()
    }

    /// Active conversation ids.
    pub fn list(&self) -> Vec<ConversationId> {
        self.sessions().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `evict_idle` every `interval` until `cancel` fires.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                idle_timeout_secs = registry.idle_timeout.as_secs(),
                "Session reaper started"
            );
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => {
                        info!("Session reaper shutting down");
                        break;
                    }
                }
                let evicted = registry.evict_idle();
                if evicted > 0 {
                    info!(evicted, remaining = registry.len(), "Evicted idle sessions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::event::Event;
    use cortex_core::state::keys;

    fn registry(idle_timeout_secs: u64) -> (Arc<EventHub>, Arc<SessionRegistry>) {
        let hub = Arc::new(EventHub::new());
        let config = SessionConfig {
            idle_timeout_secs,
            reaper_interval_secs: 1,
        };
        let sessions = Arc::new(SessionRegistry::new(hub.clone(), &config));
        (hub, sessions)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses() {
        let (_hub, sessions) = registry(60);
        let cid = ConversationId::from_str("c1");

        let a = sessions.get_or_create(&cid);
        let b = sessions.get_or_create(&cid);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sessions.len(), 1);

        let state = a.lock_state().await;
        assert_eq!(state.get_str(keys::CONVERSATION_ID), Some("c1"));
        assert!(state.conversation_log().is_some());
    }

    #[tokio::test]
    async fn test_evict_idle_drops_hub_channel() {
        let (hub, sessions) = registry(60);
        let cid = ConversationId::from_str("c1");
        sessions.get_or_create(&cid);
        hub.publish(&cid, Event::user("hi"));
        assert_eq!(hub.len(), 1);

        assert_eq!(sessions.evict_idle(), 0);
        assert_eq!(sessions.evict_idle_for(Duration::ZERO), 1);
        assert!(sessions.is_empty());
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_busy_session_survives_eviction() {
        let (_hub, sessions) = registry(0);
        let cid = ConversationId::from_str("busy");
        let session = sessions.get_or_create(&cid);

        let guard = session.lock_state().await;
        assert!(session.is_busy());
        assert_eq!(sessions.evict_idle(), 0);
        drop(guard);

        assert_eq!(sessions.evict_idle(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let (_hub, sessions) = registry(60);
        let cid = ConversationId::from_str("c1");
        sessions.get_or_create(&cid);
        assert!(sessions.remove(&cid));
        assert!(!sessions.remove(&cid));
        assert!(sessions.get(&cid).is_none());
    }

    #[tokio::test]
    async fn test_reaper_stops_on_cancel() {
        let (_hub, sessions) = registry(0);
        sessions.get_or_create(&ConversationId::from_str("old"));

        let cancel = CancellationToken::new();
        let handle = sessions.spawn_reaper(Duration::from_millis(10), cancel.clone());

        for _ in 0..100 {
            if sessions.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(sessions.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
