//! Session identity: one id per browsing session, reused for every tracking
//! call made within it. The id is the deduplication key for funnel counts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

pub const SESSION_KEY: &str = "analytics_session_id";

/// Session-scoped, non-durable key-value storage.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

#[derive(Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        // a poisoned map still holds valid strings
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
    }
}

pub struct SessionIdentity {
    store: Arc<dyn SessionStore>,
    // serializes get-or-create so two callers never mint different ids
    create_lock: Mutex<()>,
}

impl SessionIdentity {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get_or_create_session_id(&self) -> String {
        let _guard = self.create_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = self.store.get(SESSION_KEY) {
            return existing;
        }
        let session_id = generate_session_id();
        self.store.set(SESSION_KEY, session_id.clone());
        tracing::debug!(session_id = %session_id, "new analytics session");
        session_id
    }
}

pub fn generate_session_id() -> String {
    format!("session_{}_{}", Utc::now().timestamp_millis(), random_suffix())
}

/// `{unix_millis}_{suffix}`; millis keep ids roughly creation-ordered.
pub fn generate_event_id() -> String {
    format!("{}_{}", Utc::now().timestamp_millis(), random_suffix())
}

/// Nine lowercase base-36 characters drawn from a v4 uuid.
fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = Uuid::new_v4().as_u128();
    let mut out = String::with_capacity(9);
    for _ in 0..9 {
        out.push(ALPHABET[(n % 36) as usize] as char);
        n /= 36;
    }
    out
}
