//! Per-user conversational session storage.
//!
//! Sessions are volatile: a process restart discards any in-flight flow and
//! the user starts over with /sell. The store is reached only through the
//! `SessionStore` trait so a multi-instance deployment can swap the map for
//! an external backing without touching the handlers.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::bot::flow::Session;

pub trait SessionStore: Send + Sync {
    fn get(&self, telegram_id: i64) -> Option<Session>;
    fn set(&self, telegram_id: i64, session: Session);
    fn clear(&self, telegram_id: i64);
}

/// In-memory store for single-instance deployments.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<i64, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, telegram_id: i64) -> Option<Session> {
        self.sessions
            .read()
            .expect("session store lock poisoned")
            .get(&telegram_id)
            .cloned()
    }

    fn set(&self, telegram_id: i64, session: Session) {
        self.sessions
            .write()
            .expect("session store lock poisoned")
            .insert(telegram_id, session);
    }

    fn clear(&self, telegram_id: i64) {
        self.sessions
            .write()
            .expect("session store lock poisoned")
            .remove(&telegram_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::flow::{Session, Step};

    #[test]
    fn set_get_clear_roundtrip() {
        let store = MemorySessionStore::new();
        assert!(store.get(1).is_none());

        store.set(1, Session::new(Step::Category));
        assert!(matches!(store.get(1).unwrap().step, Step::Category));

        store.clear(1);
        assert!(store.get(1).is_none());

        // clearing an absent session is a no-op
        store.clear(1);
    }
}
