// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Result};
use concerto_events::{ConcertoError, SessionId};
use std::{collections::HashMap, sync::Arc, sync::RwLock};
use tracing::info;

use crate::Session;

/// All sessions this party participates in. Created once per session,
/// torn down once.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, session: Session) -> Result<Arc<Session>> {
        let id = session.id().clone();
        let mut map = self.sessions.write().expect("session map poisoned");
        if map.contains_key(&id) {
            bail!("Session {} already exists", id);
        }
        let session = Arc::new(session);
        map.insert(id.clone(), session.clone());
        info!(session = %id, "Session created");
        Ok(session)
    }

    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>, ConcertoError> {
        self.sessions
            .read()
            .expect("session map poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConcertoError::NotFound(format!("session {id}")))
    }

    /// Close and drop a session. Every ciphertext id this party owns in
    /// it becomes unresolvable.
    pub fn teardown(&self, id: &SessionId) -> Result<(), ConcertoError> {
        let session = self
            .sessions
            .write()
            .expect("session map poisoned")
            .remove(id)
            .ok_or_else(|| ConcertoError::NotFound(format!("session {id}")))?;
        session.close();
        info!(session = %id, "Session torn down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concerto_events::PartyId;

    fn session(id: &str) -> Session {
        let me = PartyId::new("p0", b"k".to_vec());
        Session::new(
            SessionId::new(id),
            me.clone(),
            vec![me],
            vec![],
            b"share".to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn create_then_get() {
        let store = SessionStore::new();
        store.create(session("s1")).unwrap();
        assert!(store.get(&SessionId::new("s1")).is_ok());
        assert!(store.get(&SessionId::new("s2")).is_err());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = SessionStore::new();
        store.create(session("s1")).unwrap();
        assert!(store.create(session("s1")).is_err());
    }

    #[test]
    fn teardown_invalidates_session() {
        let store = SessionStore::new();
        store.create(session("s1")).unwrap();
        store.teardown(&SessionId::new("s1")).unwrap();
        assert!(store.get(&SessionId::new("s1")).is_err());
    }
}
