//! # Access Gate
//!
//! Runs before any dispatch. Unknown users are checked against the configured access
//! mode and registered; known users are marked active.
//!
//! In private mode a user without an access key must be on the username allow-list.
//! A `/start key=<value>` payload is checked against the access keys instead. A numeric
//! `/start` payload is stored as the referrer id.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::config::{AccessMode, BotConfig};
use crate::domain::traits::UserStore;
use crate::domain::types::{Role, Sender, UserRecord};
use crate::strings::messages;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Granted(UserRecord),
    /// Carries the reply shown to the user
    Denied(&'static str),
}

pub struct AccessGate {
    config: BotConfig,
    store: Arc<dyn UserStore>,
}

impl AccessGate {
    pub fn new(config: BotConfig, store: Arc<dyn UserStore>) -> Self {
        Self { config, store }
    }

    pub async fn admit(&self, sender: &Sender, start_payload: Option<&str>) -> Result<Admission> {
        let Some(username) = sender.username.as_deref().filter(|u| !u.is_empty()) else {
            tracing::info!("Rejected {}: no username", sender.user_id);
            return Ok(Admission::Denied(messages::USERNAME_REQUIRED));
        };

        if !self.store.exists(&sender.user_id).await {
            if let Some(reason) = self.check_new_user(username, start_payload) {
                tracing::info!("Rejected {} (@{}): {}", sender.user_id, username, reason);
                return Ok(Admission::Denied(reason));
            }

            let now = Utc::now();
            let record = UserRecord {
                user_id: sender.user_id.clone(),
                username: username.to_string(),
                first_name: sender.first_name.clone().unwrap_or_else(|| username.to_string()),
                last_name: sender.last_name.clone(),
                role: Role::User,
                language: sender.language.clone().unwrap_or_else(|| "en".to_string()),
                referrer_id: start_payload.and_then(|p| p.parse::<i64>().ok()),
                registered_at: now,
                last_active: now,
            };
            self.store
                .add(&sender.user_id, record)
                .await
                .with_context(|| format!("Failed to register user {}", sender.user_id))?;
            tracing::info!("Registered user {} (@{})", sender.user_id, username);
        }

        self.store.mark_active(&sender.user_id).await;
        let record = self
            .store
            .find(&sender.user_id)
            .await
            .with_context(|| format!("User {} missing after registration", sender.user_id))?;
        Ok(Admission::Granted(record))
    }

    fn check_new_user(&self, username: &str, start_payload: Option<&str>) -> Option<&'static str> {
        let access_key = start_payload.and_then(|p| p.split_once("key=")).map(|(_, key)| key);

        if self.config.access == AccessMode::Private && access_key.is_none() {
            let listed = self.config.access_usernames.is_empty()
                || self
                    .config
                    .access_usernames
                    .iter()
                    .any(|u| u.eq_ignore_ascii_case(username));
            return (!listed).then_some(messages::ACCESS_DENIED_USERNAME);
        }

        if let Some(key) = access_key {
            let valid = self.config.access_keys.is_empty()
                || self
                    .config
                    .access_keys
                    .iter()
                    .any(|k| k.eq_ignore_ascii_case(key));
            return (!valid).then_some(messages::ACCESS_DENIED_KEY);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::InMemoryUserStore;

    fn gate(config: BotConfig) -> (AccessGate, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        (AccessGate::new(config, store.clone()), store)
    }

    fn private(usernames: &[&str], keys: &[&str]) -> BotConfig {
        BotConfig {
            access: AccessMode::Private,
            access_usernames: usernames.iter().map(|s| s.to_string()).collect(),
            access_keys: keys.iter().map(|s| s.to_string()).collect(),
            ..BotConfig::default()
        }
    }

    #[tokio::test]
    async fn test_username_is_required() {
        let (gate, store) = gate(BotConfig::default());
        let sender = Sender {
            user_id: "1".into(),
            ..Sender::default()
        };
        let admission = gate.admit(&sender, None).await.unwrap();
        assert_eq!(admission, Admission::Denied(messages::USERNAME_REQUIRED));
        assert!(!store.exists("1").await);
    }

    #[tokio::test]
    async fn test_public_mode_registers_with_referrer() {
        let (gate, store) = gate(BotConfig::default());
        let admission = gate.admit(&Sender::new("1", "alice"), Some("777")).await.unwrap();

        let Admission::Granted(record) = admission else {
            panic!("expected access");
        };
        assert_eq!(record.username, "alice");
        assert_eq!(record.referrer_id, Some(777));
        assert!(store.exists("1").await);
    }

    #[tokio::test]
    async fn test_private_mode_checks_usernames() {
        let (gate, _) = gate(private(&["Alice"], &[]));
        assert!(matches!(
            gate.admit(&Sender::new("1", "alice"), None).await.unwrap(),
            Admission::Granted(_)
        ));
        assert_eq!(
            gate.admit(&Sender::new("2", "mallory"), None).await.unwrap(),
            Admission::Denied(messages::ACCESS_DENIED_USERNAME)
        );
    }

    #[tokio::test]
    async fn test_access_key_bypasses_username_list() {
        let (gate, _) = gate(private(&["alice"], &["SECRET"]));
        assert!(matches!(
            gate.admit(&Sender::new("2", "bob"), Some("key=secret")).await.unwrap(),
            Admission::Granted(_)
        ));
        assert_eq!(
            gate.admit(&Sender::new("3", "eve"), Some("key=guess")).await.unwrap(),
            Admission::Denied(messages::ACCESS_DENIED_KEY)
        );
    }

    #[tokio::test]
    async fn test_known_user_skips_checks() {
        let (gate, _) = gate(private(&["alice"], &[]));
        gate.admit(&Sender::new("1", "alice"), None).await.unwrap();

        // Same user id with a changed username is already registered
        assert!(matches!(
            gate.admit(&Sender::new("1", "renamed"), None).await.unwrap(),
            Admission::Granted(_)
        ));
    }
}
