use super::TlsVersion;
use crate::util::hex::to_hex;
use openssl::ssl::SslSession;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub id: String,
    pub version: Option<TlsVersion>,
}

impl SessionState {
    pub fn from_session(session: &SslSession) -> Self {
        Self {
            id: to_hex(session.id()),
            version: TlsVersion::from_ssl_version(session.protocol_version()),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = if self.id.is_empty() {
            "(no id)"
        } else {
            self.id.as_str()
        };
        match self.version {
            Some(version) => write!(f, "{id} ({version})"),
            None => write!(f, "{id}"),
        }
    }
}

#[derive(Default)]
struct Slot {
    stored: Vec<(SessionState, Option<SslSession>)>,
    retrievals: usize,
}

#[derive(Default)]
pub struct SessionCache {
    slots: Mutex<BTreeMap<String, Slot>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self, key: &str, session: SslSession) {
        let state = SessionState::from_session(&session);
        tracing::debug!(key, session = %state, "session stored");
        self.slots()
            .entry(key.to_string())
            .or_default()
            .stored
            .push((state, Some(session)));
    }

    pub fn store_state(&self, key: &str, state: SessionState) {
        self.slots()
            .entry(key.to_string())
            .or_default()
            .stored
            .push((state, None));
    }

    pub fn retrieve(&self, key: &str) -> Option<SslSession> {
        let mut slots = self.slots();
        let slot = slots.entry(key.to_string()).or_default();
        slot.retrievals += 1;
        slot.stored
            .iter()
            .rev()
            .find_map(|(_, session)| session.clone())
    }

    pub fn stored_count(&self, key: &str) -> usize {
        self.slots().get(key).map(|slot| slot.stored.len()).unwrap_or(0)
    }

    pub fn retrieval_count(&self, key: &str) -> usize {
        self.slots()
            .get(key)
            .map(|slot| slot.retrievals)
            .unwrap_or(0)
    }

    pub fn populated_keys(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| !slot.stored.is_empty())
            .count()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<SessionState>> {
        self.slots()
            .iter()
            .filter(|(_, slot)| !slot.stored.is_empty())
            .map(|(key, slot)| {
                let states = slot.stored.iter().map(|(state, _)| state.clone()).collect();
                (key.clone(), states)
            })
            .collect()
    }
}
