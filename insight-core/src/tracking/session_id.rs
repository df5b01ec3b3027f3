//! Per-tab session identity.
//!
//! A session id is minted once per browser tab and cached in tab-scoped
//! storage, so every event from that tab joins to the same session row.
//! When storage is unavailable the provider degrades to a fresh id per call
//! rather than failing the caller.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Storage key the session id is cached under.
pub const SESSION_STORAGE_KEY: &str = "analytics_session_id";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_SUFFIX_LEN: usize = 9;

/// Something that can hand out the current session id.
pub trait SessionIdProvider: Send + Sync {
    fn session_id(&self) -> String;
}

/// Tab-scoped key-value storage (the browser's `sessionStorage`).
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// In-process storage that lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let values = self.values.lock().map_err(|e| e.to_string())?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut values = self.values.lock().map_err(|e| e.to_string())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Get-or-create session id backed by [`SessionStorage`].
pub struct TabSessionId<S> {
    storage: S,
}

impl<S: SessionStorage> TabSessionId<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Cached id, or a newly generated one that is cached for next time.
    pub fn get_or_create(&self) -> String {
        match self.storage.get(SESSION_STORAGE_KEY) {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                let id = generate_session_id();
                if let Err(e) = self.storage.set(SESSION_STORAGE_KEY, &id) {
                    warn!(error = %e, "Session storage write failed, id will not persist");
                }
                id
            }
            Err(e) => {
                warn!(error = %e, "Session storage unavailable, using a fresh session id");
                generate_session_id()
            }
        }
    }
}

impl<S: SessionStorage> SessionIdProvider for TabSessionId<S> {
    fn session_id(&self) -> String {
        self.get_or_create()
    }
}

/// Always the same id. Used when the caller already knows the session.
#[derive(Debug, Clone)]
pub struct FixedSessionId(pub String);

impl SessionIdProvider for FixedSessionId {
    fn session_id(&self) -> String {
        self.0.clone()
    }
}

/// `session_{unix_millis}_{9 base36 chars}`.
pub fn generate_session_id() -> String {
    let mut bits = uuid::Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(RANDOM_SUFFIX_LEN);
    for _ in 0..RANDOM_SUFFIX_LEN {
        suffix.push(BASE36[(bits % 36) as usize] as char);
        bits /= 36;
    }
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}
