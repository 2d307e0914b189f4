//! # Recording Chat
//!
//! An in-memory `ChatProvider` that keeps every outbound call. Used for headless runs and
//! for asserting on what the bot said.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::keyboard::InlineKeyboard;
use crate::domain::traits::ChatProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: String,
    pub message_id: String,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
    /// Set when the message replaced an earlier one in place
    pub edited: bool,
}

#[derive(Default)]
pub struct RecordingChat {
    next_id: AtomicU64,
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<String>>,
    answered: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|m| m.text.clone()).collect()
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }

    pub async fn answered(&self) -> Vec<String> {
        self.answered.lock().await.clone()
    }

    fn allocate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl ChatProvider for RecordingChat {
    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<String, String> {
        let message_id = self.allocate_id();
        self.sent.lock().await.push(SentMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.clone(),
            text: content.to_string(),
            keyboard: keyboard.cloned(),
            edited: false,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), String> {
        self.sent.lock().await.push(SentMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            text: content.to_string(),
            keyboard: keyboard.cloned(),
            edited: true,
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, _text: Option<&str>) -> Result<(), String> {
        self.answered.lock().await.push(callback_id.to_string());
        Ok(())
    }

    async fn delete_message(&self, _chat_id: &str, message_id: &str) -> Result<(), String> {
        self.deleted.lock().await.push(message_id.to_string());
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<String, String> {
        let text = format!("[document {}] {}", path.display(), caption.unwrap_or_default());
        self.send_message(chat_id, text.trim_end(), None).await
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<String, String> {
        let text = format!("[photo {}] {}", path.display(), caption.unwrap_or_default());
        self.send_message(chat_id, text.trim_end(), None).await
    }
}
