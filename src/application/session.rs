//! # Session Store
//!
//! Per-user conversational state: stored values, the single pending-input slot, the
//! previously dispatched section and the cached section instances.
//!
//! Sessions are created on first contact and evicted after a period of inactivity.
//! Each session sits behind its own mutex, so events of different users never contend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

use crate::application::input::{AwaitingContinuation, AwaitingPromise, InputRequest, PendingInput};
use crate::application::section::SharedSection;
use crate::domain::errors::{DispatchError, InputError};
use crate::domain::route::RouteDescriptor;
use crate::domain::types::InputValue;

pub type SessionHandle = Arc<Mutex<UserSession>>;

/// A section instance living in a session, with the route that last reached it.
#[derive(Clone)]
pub struct RunnedSection {
    pub handler_id: String,
    pub instance: SharedSection,
    pub route: RouteDescriptor,
}

impl RunnedSection {
    pub fn new(handler_id: impl Into<String>, instance: SharedSection, route: RouteDescriptor) -> Self {
        Self {
            handler_id: handler_id.into(),
            instance,
            route,
        }
    }
}

impl std::fmt::Debug for RunnedSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnedSection")
            .field("handler_id", &self.handler_id)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

pub struct UserSession {
    user_id: String,
    values: HashMap<String, Value>,
    pending: PendingInput,
    previous_section: Option<RunnedSection>,
    sections: Vec<RunnedSection>,
    sent_message_ids: VecDeque<String>,
    message_id_limit: usize,
    request_serial: u64,
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("user_id", &self.user_id)
            .field("values", &self.values)
            .field("pending", &self.pending)
            .field("previous_section", &self.previous_section)
            .field("sections", &self.sections.len())
            .finish_non_exhaustive()
    }
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, message_id_limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            values: HashMap::new(),
            pending: PendingInput::None,
            previous_section: None,
            sections: Vec::new(),
            sent_message_ids: VecDeque::new(),
            message_id_limit: message_id_limit.max(1),
            request_serial: 0,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // --- Values ---

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// A collected input answer, if one is stored under `key`.
    pub fn answer(&self, key: &str) -> Option<InputValue> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn store_answer(&mut self, key: impl Into<String>, value: &InputValue) {
        match serde_json::to_value(value) {
            Ok(json) => {
                self.values.insert(key.into(), json);
            }
            Err(e) => tracing::warn!("Failed to store answer for {}: {}", self.user_id, e),
        }
    }

    // --- Pending input ---

    pub fn pending(&self) -> &PendingInput {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut PendingInput {
        &mut self.pending
    }

    pub fn is_awaiting_input(&self) -> bool {
        !matches!(self.pending, PendingInput::None)
    }

    /// Arms a continuation-style request. Replaces whatever was pending.
    pub fn await_continuation(&mut self, key: impl Into<String>, request: InputRequest) {
        let next = PendingInput::Continuation(AwaitingContinuation {
            serial: self.next_serial(),
            key: key.into(),
            request,
            retry_count: 0,
        });
        self.replace_pending(next);
    }

    /// Arms an awaitable request and returns the receiving end of its deferred result.
    pub fn await_promise(
        &mut self,
        key: impl Into<String>,
        request: InputRequest,
    ) -> oneshot::Receiver<Result<InputValue, InputError>> {
        let (tx, rx) = oneshot::channel();
        let next = PendingInput::Promise(AwaitingPromise {
            serial: self.next_serial(),
            key: key.into(),
            request,
            retry_count: 0,
            responder: tx,
        });
        self.replace_pending(next);
        rx
    }

    fn next_serial(&mut self) -> u64 {
        self.request_serial += 1;
        self.request_serial
    }

    fn replace_pending(&mut self, next: PendingInput) {
        let previous = std::mem::replace(&mut self.pending, next);
        if let PendingInput::Promise(promise) = previous {
            tracing::debug!("Input request '{}' superseded for {}", promise.key, self.user_id);
            let _ = promise.responder.send(Err(InputError::Superseded));
        }
    }

    /// Empties the pending slot without resolving anything.
    pub fn take_pending(&mut self) -> PendingInput {
        std::mem::take(&mut self.pending)
    }

    /// Clears the pending slot. An awaiting caller is rejected with `Cancelled`.
    /// Returns whether anything was pending.
    pub fn cancel_pending(&mut self) -> bool {
        match self.take_pending() {
            PendingInput::None => false,
            PendingInput::Continuation(_) => true,
            PendingInput::Promise(promise) => {
                let _ = promise.responder.send(Err(InputError::Cancelled));
                true
            }
        }
    }

    /// Rejects an awaiting caller with `error` and clears the slot. A pending continuation
    /// stays. Returns whether a caller was rejected.
    pub fn reject_awaiting(&mut self, error: InputError) -> bool {
        if !matches!(self.pending, PendingInput::Promise(_)) {
            return false;
        }
        if let PendingInput::Promise(promise) = self.take_pending() {
            tracing::debug!("Input request '{}' rejected for {}: {}", promise.key, self.user_id, error);
            let _ = promise.responder.send(Err(error));
        }
        true
    }

    // --- Sections ---

    pub fn find_section_mut(&mut self, handler_id: &str) -> Option<&mut RunnedSection> {
        self.sections.iter_mut().find(|s| s.handler_id == handler_id)
    }

    pub fn register_section(&mut self, section: RunnedSection) {
        self.sections.retain(|s| s.handler_id != section.handler_id);
        self.sections.push(section);
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn previous_section(&self) -> Option<&RunnedSection> {
        self.previous_section.as_ref()
    }

    pub fn set_previous_section(&mut self, section: RunnedSection) {
        self.previous_section = Some(section);
    }

    // --- Sent messages ---

    pub fn record_sent_message(&mut self, message_id: impl Into<String>) {
        self.sent_message_ids.push_back(message_id.into());
        while self.sent_message_ids.len() > self.message_id_limit {
            self.sent_message_ids.pop_front();
        }
    }

    pub fn last_sent_message(&self) -> Option<&str> {
        self.sent_message_ids.back().map(String::as_str)
    }

    pub fn forget_message(&mut self, message_id: &str) {
        self.sent_message_ids.retain(|id| id != message_id);
    }
}

struct SessionEntry {
    handle: SessionHandle,
    last_active: DateTime<Utc>,
}

/// All live sessions, keyed by user id.
pub struct SessionStore {
    entries: Mutex<HashMap<String, SessionEntry>>,
    message_id_limit: usize,
}

impl SessionStore {
    pub fn new(message_id_limit: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            message_id_limit,
        }
    }

    pub async fn get(&self, user_id: &str) -> Result<SessionHandle, DispatchError> {
        let entries = self.entries.lock().await;
        entries
            .get(user_id)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| DispatchError::SessionNotFound(user_id.to_string()))
    }

    /// Returns the user's session, creating it on first contact, and marks it active.
    pub async fn get_or_create(&self, user_id: &str) -> SessionHandle {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(user_id.to_string()).or_insert_with(|| {
            tracing::info!("Creating session for {}", user_id);
            SessionEntry {
                handle: Arc::new(Mutex::new(UserSession::new(user_id, self.message_id_limit))),
                last_active: Utc::now(),
            }
        });
        entry.last_active = Utc::now();
        entry.handle.clone()
    }

    pub async fn remove(&self, user_id: &str) -> bool {
        self.entries.lock().await.remove(user_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drops sessions idle for longer than `idle`. Returns the evicted user ids.
    ///
    /// A caller still awaiting input on an evicted session sees `SessionExpired`, even
    /// while its own context keeps the session alive.
    pub async fn evict_idle_since(&self, idle: Duration) -> Vec<String> {
        self.evict_idle_at(Utc::now(), idle).await
    }

    pub(crate) async fn evict_idle_at(&self, now: DateTime<Utc>, idle: Duration) -> Vec<String> {
        let threshold = TimeDelta::from_std(idle).unwrap_or(TimeDelta::MAX);
        let evicted: Vec<(String, SessionHandle)> = {
            let mut entries = self.entries.lock().await;
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.signed_duration_since(entry.last_active) > threshold)
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry.handle)))
                .collect()
        };

        let mut ids = Vec::with_capacity(evicted.len());
        for (id, handle) in evicted {
            let mut session = handle.lock().await;
            session.reject_awaiting(InputError::SessionExpired);
            session.take_pending();
            tracing::info!("Evicted idle session {}", id);
            ids.push(id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_unknown_user_is_session_not_found() {
        let store = SessionStore::new(10);
        let err = store.get("42").await.unwrap_err();
        assert!(matches!(err, DispatchError::SessionNotFound(id) if id == "42"));

        store.get_or_create("42").await;
        assert!(store.get("42").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let store = SessionStore::new(10);
        let a = store.get_or_create("1").await;
        a.lock().await.set_value("k", Value::from(5));

        let b = store.get_or_create("1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.lock().await.get_value("k"), Some(&Value::from(5)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_evict_idle_sessions() {
        let store = SessionStore::new(10);
        store.get_or_create("old").await;
        store.get_or_create("fresh").await;

        let later = Utc::now() + TimeDelta::minutes(31);
        {
            // Keep "fresh" active at the simulated time
            let mut entries = store.entries.lock().await;
            if let Some(entry) = entries.get_mut("fresh") {
                entry.last_active = later;
            }
        }

        let evicted = store.evict_idle_at(later, Duration::from_secs(30 * 60)).await;
        assert_eq!(evicted, vec!["old".to_string()]);
        assert!(store.get("old").await.is_err());
        assert!(store.get("fresh").await.is_ok());
    }

    #[tokio::test]
    async fn test_eviction_expires_awaiting_caller() {
        let store = SessionStore::new(10);
        // Held the way a suspended section context holds it
        let session = store.get_or_create("1").await;
        let rx = session.lock().await.await_promise("phone", InputRequest::default());

        let later = Utc::now() + TimeDelta::hours(2);
        let evicted = store.evict_idle_at(later, Duration::from_secs(60)).await;

        assert_eq!(evicted, vec!["1".to_string()]);
        assert_eq!(rx.await.unwrap(), Err(InputError::SessionExpired));
        assert!(!session.lock().await.is_awaiting_input());
    }

    #[tokio::test]
    async fn test_reject_awaiting_leaves_continuations() {
        let mut session = UserSession::new("1", 10);
        session.await_continuation("a", InputRequest::default());
        assert!(!session.reject_awaiting(InputError::Cancelled));
        assert!(session.is_awaiting_input());

        let rx = session.await_promise("b", InputRequest::default());
        assert!(session.reject_awaiting(InputError::Cancelled));
        assert_eq!(rx.await.unwrap(), Err(InputError::Cancelled));
        assert!(!session.is_awaiting_input());
    }

    #[tokio::test]
    async fn test_new_request_supersedes_pending_promise() {
        let mut session = UserSession::new("1", 10);
        let first = session.await_promise("a", InputRequest::default());
        session.await_continuation("b", InputRequest::default());

        assert_eq!(first.await.unwrap(), Err(InputError::Superseded));
        match session.pending() {
            PendingInput::Continuation(c) => assert_eq!(c.key, "b"),
            _ => panic!("expected continuation"),
        }
    }

    #[tokio::test]
    async fn test_cancel_clears_the_single_slot() {
        let mut session = UserSession::new("1", 10);
        assert!(!session.cancel_pending());

        let rx = session.await_promise("a", InputRequest::default());
        assert!(session.is_awaiting_input());
        assert!(session.cancel_pending());
        assert!(!session.is_awaiting_input());
        assert_eq!(rx.await.unwrap(), Err(InputError::Cancelled));

        session.await_continuation("b", InputRequest::default());
        assert!(session.cancel_pending());
        assert!(!session.is_awaiting_input());
    }

    #[test]
    fn test_sent_message_ids_are_bounded() {
        let mut session = UserSession::new("1", 3);
        for id in 1..=5 {
            session.record_sent_message(id.to_string());
        }
        assert_eq!(session.sent_message_ids.len(), 3);
        assert_eq!(session.last_sent_message(), Some("5"));
        session.forget_message("5");
        assert_eq!(session.last_sent_message(), Some("4"));
    }

    #[test]
    fn test_answers_round_trip_through_values() {
        let mut session = UserSession::new("1", 3);
        session.store_answer("age", &InputValue::Text("42".into()));
        assert_eq!(session.answer("age"), Some(InputValue::Text("42".into())));
        assert_eq!(session.answer("missing"), None);
    }
}
