//! # In-Memory User Store
//!
//! Keeps user records for the lifetime of the process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::traits::UserStore;
use crate::domain::types::UserRecord;

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn exists(&self, user_id: &str) -> bool {
        self.users.read().await.contains_key(user_id)
    }

    async fn find(&self, user_id: &str) -> Option<UserRecord> {
        self.users.read().await.get(user_id).cloned()
    }

    async fn add(&self, user_id: &str, record: UserRecord) -> anyhow::Result<()> {
        self.users.write().await.insert(user_id.to_string(), record);
        Ok(())
    }

    async fn mark_active(&self, user_id: &str) {
        if let Some(record) = self.users.write().await.get_mut(user_id) {
            record.last_active = Utc::now();
        }
    }
}
