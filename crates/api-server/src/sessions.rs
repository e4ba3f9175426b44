use chrono::{DateTime, Utc};
use dashmap::DashMap;
use llm_client::DocumentContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-user chat state, keyed by a web session id or a WhatsApp number.
#[derive(Debug, Clone)]
pub struct Session {
    pub document: Option<DocumentContext>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            document: None,
            updated_at: Utc::now(),
        }
    }
}

/// Shared session map owned by the app state. Cloning shares the map.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, id: &str) -> Option<DocumentContext> {
        self.sessions.get(id).and_then(|s| s.document.clone())
    }

    /// Attach a document, replacing any previous one.
    pub fn set_document(&self, id: &str, document: DocumentContext) {
        let mut session = self.sessions.entry(id.to_string()).or_default();
        session.document = Some(document);
        session.updated_at = Utc::now();
    }

    /// Mark an existing session as active. Unknown ids are not created.
    pub fn touch(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.updated_at = Utc::now();
        }
    }

    /// Drop sessions idle for longer than `max_idle`; returns how many went.
    pub fn expire_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.updated_at >= cutoff);
        before.saturating_sub(self.sessions.len())
    }

    /// Background task expiring idle sessions until the runtime shuts down.
    pub fn spawn_idle_sweeper(&self, max_idle: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let every = max_idle.min(MAX_SWEEP_INTERVAL).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let expired = store.expire_idle(max_idle);
                if expired > 0 {
                    tracing::debug!("Expired {} idle sessions", expired);
                }
            }
        })
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
