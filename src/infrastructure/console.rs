//! # Console Transport
//!
//! A `ChatProvider` that prints to stdout, plus the parser turning typed lines into events:
//! - `/name args` → command
//! - `!cb <payload>` → button press on the last bot message
//! - `#file <name> <mime> <bytes>` → document upload
//! - `#photo <bytes>` → photo upload
//! - anything else → text

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::keyboard::InlineKeyboard;
use crate::domain::traits::ChatProvider;
use crate::domain::types::{EventKind, FileInfo, InboundEvent, Sender};

#[derive(Default)]
pub struct ConsoleChat {
    next_id: AtomicU64,
    last_message: Mutex<Option<String>>,
}

impl ConsoleChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the most recent bot message, used as the target of `!cb`.
    pub async fn last_message_id(&self) -> Option<String> {
        self.last_message.lock().await.clone()
    }

    fn print(&self, header: &str, content: &str, keyboard: Option<&InlineKeyboard>) {
        println!("{header}");
        for line in content.lines() {
            println!("  {line}");
        }
        if let Some(keyboard) = keyboard {
            for row in keyboard.as_rows() {
                let buttons: Vec<String> = row
                    .iter()
                    .map(|b| format!("[{} → {}]", b.text, b.data))
                    .collect();
                println!("  {}", buttons.join(" "));
            }
        }
    }
}

#[async_trait]
impl ChatProvider for ConsoleChat {
    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<String, String> {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        self.print(&format!("bot → {chat_id} #{id}"), content, keyboard);
        *self.last_message.lock().await = Some(id.clone());
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), String> {
        self.print(&format!("bot ✎ {chat_id} #{message_id}"), content, keyboard);
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str, text: Option<&str>) -> Result<(), String> {
        if let Some(text) = text {
            println!("  ({text})");
        }
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), String> {
        println!("bot ✗ {chat_id} #{message_id}");
        let mut last = self.last_message.lock().await;
        if last.as_deref() == Some(message_id) {
            *last = None;
        }
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<String, String> {
        let content = format!("📎 {} {}", path.display(), caption.unwrap_or_default());
        self.send_message(chat_id, content.trim_end(), None).await
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<String, String> {
        let content = format!("🖼 {} {}", path.display(), caption.unwrap_or_default());
        self.send_message(chat_id, content.trim_end(), None).await
    }
}

/// Parses one typed line. Returns `None` for blank lines and malformed uploads.
pub fn parse_line(line: &str, sender: &Sender, last_message_id: Option<&str>) -> Option<InboundEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(payload) = line.strip_prefix("!cb ") {
        let mut event = InboundEvent::callback(sender.clone(), payload.trim());
        if let EventKind::Callback { message_id, .. } = &mut event.kind {
            *message_id = last_message_id.map(str::to_string);
        }
        return Some(event);
    }

    if let Some(rest) = line.strip_prefix("#file ") {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let [name, mime, size] = parts.as_slice() else {
            return None;
        };
        let file = FileInfo {
            file_id: format!("console-{name}"),
            file_name: Some(name.to_string()),
            mime_type: Some(mime.to_string()),
            file_size: size.parse().ok()?,
        };
        return Some(InboundEvent::new(sender.clone(), EventKind::Document(file)));
    }

    if let Some(rest) = line.strip_prefix("#photo ") {
        let file = FileInfo {
            file_id: "console-photo".to_string(),
            file_name: None,
            mime_type: Some("image/jpeg".to_string()),
            file_size: rest.trim().parse().ok()?,
        };
        return Some(InboundEvent::new(sender.clone(), EventKind::Photo(file)));
    }

    if let Some(command) = line.strip_prefix('/') {
        let (name, args) = command.split_once(' ').unwrap_or((command, ""));
        return Some(InboundEvent::command(sender.clone(), name, args.trim()));
    }

    Some(InboundEvent::text(sender.clone(), line))
}
