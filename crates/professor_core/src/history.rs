//! crates/professor_core/src/history.rs
//!
//! The per-user history of analyses and chat sessions.
//!
//! Each list lives in durable storage under `{domain}:{uid}` as one JSON array,
//! newest first. Every mutation rewrites the whole array, so a write costs
//! O(history size). Storage problems are logged and never reach the user: a
//! corrupt list is replaced with an empty one, and a failed write leaves the
//! in-memory view authoritative until the next successful write. A list whose
//! read failed is never written back, since its in-memory view is partial.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{AnalysisSession, ChatSession};
use crate::ports::KeyValueStorage;

pub const ANALYSIS_DOMAIN: &str = "analysis";
pub const CHAT_DOMAIN: &str = "chat";

/// Builds the storage key for one user's list.
pub fn storage_key(domain: &str, uid: &str) -> String {
    format!("{}:{}", domain, uid)
}

/// Anything that can be kept in a history list.
pub trait HistoryEntry: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Creation instant, doubling as the entry's id.
    fn timestamp(&self) -> i64;
}

impl HistoryEntry for AnalysisSession {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl HistoryEntry for ChatSession {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

//=========================================================================================
// HistoryList (one ordered list of one domain)
//=========================================================================================

#[derive(Debug)]
struct HistoryList<T> {
    domain: &'static str,
    entries: VecDeque<T>,
    // False after a failed read; the stored list must not be overwritten.
    writable: bool,
}

impl<T: HistoryEntry> HistoryList<T> {
    fn new(domain: &'static str) -> Self {
        Self { domain, entries: VecDeque::new(), writable: true }
    }

    async fn load(&mut self, storage: &dyn KeyValueStorage, uid: &str) {
        let key = storage_key(self.domain, uid);
        self.writable = true;
        self.entries = match storage.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<VecDeque<T>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Discarding corrupt history under '{}': {}", key, e);
                    self.entries.clear();
                    self.persist(storage, Some(uid)).await;
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                error!("Failed to read history '{}': {}", key, e);
                self.writable = false;
                VecDeque::new()
            }
        };
        debug!("Loaded {} entries from '{}'", self.entries.len(), key);
    }

    async fn persist(&self, storage: &dyn KeyValueStorage, uid: Option<&str>) {
        let Some(uid) = uid else {
            debug!("No active user; '{}' history kept in memory only.", self.domain);
            return;
        };
        let key = storage_key(self.domain, uid);
        if !self.writable {
            warn!("Skipping write of '{}': the stored list could not be read.", key);
            return;
        }
        let json = match serde_json::to_string(&self.entries) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize history '{}': {}", key, e);
                return;
            }
        };
        if let Err(e) = storage.set(&key, &json).await {
            error!("Failed to persist history '{}': {}", key, e);
        }
    }

    fn prepend(&mut self, entry: T) {
        self.entries.push_front(entry);
    }

    fn remove(&mut self, timestamp: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp() != timestamp);
        before - self.entries.len()
    }

    fn find(&self, timestamp: i64) -> Option<&T> {
        self.entries.iter().find(|e| e.timestamp() == timestamp)
    }

    fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

//=========================================================================================
// HistoryStore
//=========================================================================================

/// Both history lists of the active user.
pub struct HistoryStore {
    storage: Arc<dyn KeyValueStorage>,
    uid: Option<String>,
    analyses: HistoryList<AnalysisSession>,
    chats: HistoryList<ChatSession>,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            uid: None,
            analyses: HistoryList::new(ANALYSIS_DOMAIN),
            chats: HistoryList::new(CHAT_DOMAIN),
        }
    }

    /// Makes `uid` the active scope and reads both of its lists.
    pub async fn load(&mut self, uid: &str) {
        info!("Loading history for user {}", uid);
        self.uid = Some(uid.to_string());
        self.analyses.load(self.storage.as_ref(), uid).await;
        self.chats.load(self.storage.as_ref(), uid).await;
    }

    /// Drops the in-memory view. Nothing in storage is touched.
    pub fn unload(&mut self) {
        self.uid = None;
        self.analyses.entries.clear();
        self.analyses.writable = true;
        self.chats.entries.clear();
        self.chats.writable = true;
    }

    pub fn active_uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    // --- Analysis history ---

    pub async fn append_analysis(&mut self, session: AnalysisSession) {
        self.analyses.prepend(session);
        self.analyses.persist(self.storage.as_ref(), self.uid.as_deref()).await;
    }

    /// Removes every analysis stamped `timestamp`, returning how many went.
    pub async fn remove_analysis(&mut self, timestamp: i64) -> usize {
        let removed = self.analyses.remove(timestamp);
        self.analyses.persist(self.storage.as_ref(), self.uid.as_deref()).await;
        removed
    }

    pub async fn clear_analyses(&mut self) {
        self.analyses.entries.clear();
        self.analyses.persist(self.storage.as_ref(), self.uid.as_deref()).await;
    }

    pub fn analyses(&self) -> Vec<AnalysisSession> {
        self.analyses.snapshot()
    }

    pub fn find_analysis(&self, timestamp: i64) -> Option<&AnalysisSession> {
        self.analyses.find(timestamp)
    }

    // --- Chat history ---

    pub async fn append_chat(&mut self, session: ChatSession) {
        self.chats.prepend(session);
        self.chats.persist(self.storage.as_ref(), self.uid.as_deref()).await;
    }

    pub async fn remove_chat(&mut self, timestamp: i64) -> usize {
        let removed = self.chats.remove(timestamp);
        self.chats.persist(self.storage.as_ref(), self.uid.as_deref()).await;
        removed
    }

    pub async fn clear_chats(&mut self) {
        self.chats.entries.clear();
        self.chats.persist(self.storage.as_ref(), self.uid.as_deref()).await;
    }

    pub fn chats(&self) -> Vec<ChatSession> {
        self.chats.snapshot()
    }
}
