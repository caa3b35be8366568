use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{SearchSession, SessionKey, SessionStore};

/// Process-local session map. The outer lock only guards map shape; each
/// session carries its own mutex, so work on one conversation never blocks
/// another.
#[derive(Default)]
pub struct InMemorySessions {
    map: RwLock<HashMap<SessionKey, Arc<Mutex<SearchSession>>>>,
}

impl SessionStore for InMemorySessions {
    fn get(&self, key: &SessionKey) -> Option<Arc<Mutex<SearchSession>>> {
        self.map.read().get(key).cloned()
    }

    fn set(&self, key: SessionKey, session: SearchSession) {
        self.map.write().insert(key, Arc::new(Mutex::new(session)));
    }

    fn remove(&self, key: &SessionKey) {
        self.map.write().remove(key);
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|_, entry| !entry.lock().expired(now));
        let reclaimed = before - map.len();
        if reclaimed > 0 {
            debug!(reclaimed, remaining = map.len(), "swept expired sessions");
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session(expires_in: Duration) -> SearchSession {
        SearchSession {
            query: "q".into(),
            owner: 0,
            superset: Arc::new(Vec::new()),
            filters: Default::default(),
            view: Vec::new(),
            cursor: 0,
            expires_at: Instant::now() + expires_in,
        }
    }

    #[test]
    fn purge_keeps_live_sessions() {
        let store = InMemorySessions::default();
        let live = SessionKey { chat_id: 1, message_id: 1 };
        let dead = SessionKey { chat_id: 1, message_id: 2 };
        store.set(live, session(Duration::from_secs(600)));
        store.set(dead, session(Duration::ZERO));

        assert_eq!(store.purge_expired(Instant::now()), 1);
        assert!(store.get(&live).is_some());
        assert!(store.get(&dead).is_none());
    }
}
