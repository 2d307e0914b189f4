//! # Domain Traits
//!
//! Abstract interfaces for the collaborators the dispatcher talks to (chat transport,
//! user store). Platform bindings live in the Infrastructure layer.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::keyboard::InlineKeyboard;
use crate::domain::types::UserRecord;

/// Outbound side of a chat transport (e.g. Telegram, Matrix, console).
///
/// Retries and rate limiting belong to the implementation.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a message to the chat, returns the new message id
    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<String, String>;

    /// Replace the text (and buttons) of a message
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), String>;

    /// Acknowledge a button press
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), String>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), String>;

    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<String, String>;

    async fn send_photo(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<String, String>;
}

/// Persistent user records, consulted before any dispatch.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn exists(&self, user_id: &str) -> bool;

    async fn find(&self, user_id: &str) -> Option<UserRecord>;

    async fn add(&self, user_id: &str, record: UserRecord) -> anyhow::Result<()>;

    /// Refresh the user's last-activity timestamp
    async fn mark_active(&self, user_id: &str);
}
