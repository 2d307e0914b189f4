//! # Domain Types
//!
//! Inbound platform events, input values and user records shared across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of an uploaded document or photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: u64,
}

/// Who sent an inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sender {
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language: Option<String>,
}

impl Sender {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: Some(username.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `/name args`
    Command { name: String, args: String },
    /// Inline button press. `message_id` is the message carrying the button.
    Callback {
        callback_id: String,
        data: String,
        message_id: Option<String>,
    },
    Text(String),
    Document(FileInfo),
    /// The transport picks the largest available size.
    Photo(FileInfo),
}

/// An event delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: Sender,
    pub kind: EventKind,
    pub message_id: Option<String>,
}

impl InboundEvent {
    pub fn new(sender: Sender, kind: EventKind) -> Self {
        Self {
            sender,
            kind,
            message_id: None,
        }
    }

    pub fn text(sender: Sender, text: impl Into<String>) -> Self {
        Self::new(sender, EventKind::Text(text.into()))
    }

    pub fn command(sender: Sender, name: impl Into<String>, args: impl Into<String>) -> Self {
        Self::new(
            sender,
            EventKind::Command {
                name: name.into(),
                args: args.into(),
            },
        )
    }

    pub fn callback(sender: Sender, data: impl Into<String>) -> Self {
        Self::new(
            sender,
            EventKind::Callback {
                callback_id: uuid::Uuid::new_v4().simple().to_string(),
                data: data.into(),
                message_id: None,
            },
        )
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn user_id(&self) -> &str {
        &self.sender.user_id
    }

    /// The free-form value carried by text, document and photo events.
    pub fn input_value(&self) -> Option<InputValue> {
        match &self.kind {
            EventKind::Text(text) => Some(InputValue::Text(text.clone())),
            EventKind::Document(file) => Some(InputValue::File(file.clone())),
            EventKind::Photo(file) => Some(InputValue::Photo(file.clone())),
            EventKind::Command { .. } | EventKind::Callback { .. } => None,
        }
    }

    /// The `/start` payload, if this is a start command with arguments.
    pub fn start_payload(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Command { name, args } if name == "start" => {
                args.split_whitespace().next()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    File,
    Photo,
}

/// A value collected by the input subsystem and stored in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum InputValue {
    Text(String),
    File(FileInfo),
    Photo(FileInfo),
}

impl InputValue {
    pub fn kind(&self) -> InputKind {
        match self {
            InputValue::Text(_) => InputKind::Text,
            InputValue::File(_) => InputKind::File,
            InputValue::Photo(_) => InputKind::Photo,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            InputValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileInfo> {
        match self {
            InputValue::File(file) | InputValue::Photo(file) => Some(file),
            InputValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A registered bot user as kept by the user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub language: String,
    #[serde(default)]
    pub referrer_id: Option<i64>,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}
