//! Conversation and long-term memory stores.
//!
//! Two scopes: [`ThreadStore`] holds the latest [`ConversationState`] per
//! thread id, and [`PreferenceStore`] holds per-user key-value memory that
//! survives thread boundaries. Each store is the sole authority for its
//! scope; retention policy belongs to the implementation, not to the
//! router or facade.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::state::ConversationState;

/// Error from the store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
}

/// Persistence for [`ConversationState`], keyed by thread id.
///
/// Concurrent turns on the same thread are not serialized: each reads a
/// snapshot and the later `save` wins.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Latest state for the thread, or `None` for an unseen thread id.
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError>;

    /// Replaces the stored state for `state.thread_id` with a full snapshot.
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;
}

/// In-memory store for dev and tests. States live until process exit.
#[derive(Debug, Default)]
pub struct MemoryThreadStore {
    threads: DashMap<String, ConversationState>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads currently held.
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.threads.get(thread_id).map(|s| s.clone()))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.threads
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }
}

/// Long-term key-value memory scoped per user, not per thread: a
/// preference saved in one conversation is visible in every later one for
/// the same user.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn put(&self, user_id: &str, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, StoreError>;

    /// All stored (key, value) pairs for the user, in key order.
    async fn list(&self, user_id: &str) -> Result<Vec<(String, String)>, StoreError>;
}

/// In-memory preference store for dev and tests.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    users: DashMap<String, BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn put(&self, user_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.users
            .entry(user_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .users
            .get(user_id)
            .and_then(|prefs| prefs.get(key).cloned()))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .users
            .get(user_id)
            .map(|prefs| {
                prefs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
