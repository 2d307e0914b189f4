//! # Input Awaiting
//!
//! Lets a section ask the user for a value and pick it up from the next free-form event.
//! Two styles share one pending slot per session:
//! - continuation: the answer is stored under a key and an optional follow-up route runs
//! - awaitable: the requesting method suspends until the answer (or a rejection) arrives
//!
//! Free-form events pass through [`intercept`] before any catch-all handler.

use std::future::Future;
use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use tokio::sync::oneshot;

use crate::application::session::SessionHandle;
use crate::domain::errors::InputError;
use crate::domain::keyboard::{Button, InlineKeyboard};
use crate::domain::route::RouteDescriptor;
use crate::domain::traits::ChatProvider;
use crate::domain::types::InputValue;
use crate::strings::messages;

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+?\d{1,3})?[0-9]{6,12}$").expect("phone pattern should compile")
});

pub type PredicateFn = Arc<dyn Fn(InputValue) -> BoxFuture<'static, bool> + Send + Sync>;

#[derive(Clone)]
pub enum InputValidator {
    /// Non-empty text that parses as a finite decimal number
    Number,
    /// Text whose digits form a phone number
    Phone,
    /// Five or six digits
    Code,
    /// A document or photo, checked against [`FileValidation`]
    File,
    Custom(PredicateFn),
}

impl InputValidator {
    pub fn predicate<F>(check: F) -> Self
    where
        F: Fn(&InputValue) -> bool + Send + Sync + 'static,
    {
        let custom: PredicateFn = Arc::new(move |value: InputValue| {
            let ok = check(&value);
            futures::future::ready(ok).boxed()
        });
        Self::Custom(custom)
    }

    pub fn async_predicate<F, Fut>(check: F) -> Self
    where
        F: Fn(InputValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let custom: PredicateFn = Arc::new(move |value: InputValue| check(value).boxed());
        Self::Custom(custom)
    }
}

impl std::fmt::Debug for InputValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number => write!(f, "Number"),
            Self::Phone => write!(f, "Phone"),
            Self::Code => write!(f, "Code"),
            Self::File => write!(f, "File"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Rules applied to uploads by [`InputValidator::File`].
#[derive(Debug, Clone, Default)]
pub struct FileValidation {
    pub allowed_types: Vec<String>,
    pub max_size: Option<u64>,
    pub min_size: Option<u64>,
}

impl FileValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, mime_type: impl Into<String>) -> Self {
        self.allowed_types.push(mime_type.into());
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn min_size(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }
}

/// Options of a single input request.
#[derive(Debug, Clone)]
pub struct InputRequest {
    pub validator: Option<InputValidator>,
    pub error_message: String,
    pub allow_cancel: bool,
    pub cancel_button_text: String,
    pub cancel_action: String,
    pub file_validation: Option<FileValidation>,
    /// Continuation style only: route dispatched once the answer is stored
    pub on_success: Option<RouteDescriptor>,
}

impl Default for InputRequest {
    fn default() -> Self {
        Self {
            validator: None,
            error_message: messages::DEFAULT_INPUT_ERROR.to_string(),
            allow_cancel: true,
            cancel_button_text: messages::DEFAULT_CANCEL_TEXT.to_string(),
            cancel_action: messages::DEFAULT_CANCEL_ACTION.to_string(),
            file_validation: None,
            on_success: None,
        }
    }
}

impl InputRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validator(mut self, validator: InputValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn allow_cancel(mut self, allow: bool) -> Self {
        self.allow_cancel = allow;
        self
    }

    pub fn cancel_text(mut self, text: impl Into<String>) -> Self {
        self.cancel_button_text = text.into();
        self
    }

    pub fn cancel_action(mut self, action: impl Into<String>) -> Self {
        self.cancel_action = action.into();
        self
    }

    pub fn file_validation(mut self, rules: FileValidation) -> Self {
        self.file_validation = Some(rules);
        self
    }

    pub fn on_success(mut self, route: RouteDescriptor) -> Self {
        self.on_success = Some(route);
        self
    }

    /// The cancel button row shown under prompts and retry messages.
    pub fn cancel_row(&self) -> Vec<Button> {
        vec![Button::callback(
            messages::cancel_button_label(&self.cancel_button_text),
            self.cancel_action.clone(),
        )]
    }
}

#[derive(Debug)]
pub struct AwaitingContinuation {
    /// Distinguishes this request from a later one armed under the same key
    pub serial: u64,
    pub key: String,
    pub request: InputRequest,
    pub retry_count: u32,
}

#[derive(Debug)]
pub struct AwaitingPromise {
    pub serial: u64,
    pub key: String,
    pub request: InputRequest,
    pub retry_count: u32,
    pub responder: oneshot::Sender<Result<InputValue, InputError>>,
}

/// The per-session pending-input slot. At most one request is active at a time.
#[derive(Debug, Default)]
pub enum PendingInput {
    #[default]
    None,
    Continuation(AwaitingContinuation),
    Promise(AwaitingPromise),
}

impl PendingInput {
    fn parts(&self) -> Option<(u64, &str, &InputRequest)> {
        match self {
            PendingInput::None => None,
            PendingInput::Continuation(c) => Some((c.serial, &c.key, &c.request)),
            PendingInput::Promise(p) => Some((p.serial, &p.key, &p.request)),
        }
    }

    fn bump_retry(&mut self) -> u32 {
        match self {
            PendingInput::None => 0,
            PendingInput::Continuation(c) => {
                c.retry_count += 1;
                c.retry_count
            }
            PendingInput::Promise(p) => {
                p.retry_count += 1;
                p.retry_count
            }
        }
    }
}

/// Checks a value against a validator.
///
/// `Ok(false)` is a plain mismatch; `Err(Rejected)` carries a descriptive reason from the
/// file rules. No validator accepts everything.
pub async fn validate(
    value: &InputValue,
    validator: Option<&InputValidator>,
    file_rules: Option<&FileValidation>,
) -> Result<bool, InputError> {
    let Some(validator) = validator else {
        return Ok(true);
    };

    match validator {
        InputValidator::Number => Ok(value.as_text().is_some_and(is_number)),
        InputValidator::Phone => Ok(value.as_text().is_some_and(is_phone)),
        InputValidator::Code => Ok(value.as_text().is_some_and(is_code)),
        InputValidator::File => validate_file(value, file_rules),
        InputValidator::Custom(check) => Ok(check(value.clone()).await),
    }
}

fn is_number(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
}

fn is_phone(text: &str) -> bool {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    PHONE_PATTERN.is_match(&digits)
}

fn is_code(text: &str) -> bool {
    (5..=6).contains(&text.len()) && text.chars().all(|c| c.is_ascii_digit())
}

fn validate_file(value: &InputValue, rules: Option<&FileValidation>) -> Result<bool, InputError> {
    let Some(file) = value.as_file() else {
        return Ok(false);
    };
    let Some(rules) = rules else {
        return Ok(true);
    };

    if !rules.allowed_types.is_empty() {
        let mime = file.mime_type.as_deref().unwrap_or_default();
        if !rules.allowed_types.iter().any(|t| t == mime) {
            return Err(InputError::Rejected(messages::unsupported_file_type(
                &rules.allowed_types,
            )));
        }
    }
    if let Some(max) = rules.max_size
        && file.file_size > max
    {
        return Err(InputError::Rejected(messages::file_too_large(max)));
    }
    if let Some(min) = rules.min_size
        && file.file_size < min
    {
        return Err(InputError::Rejected(messages::file_too_small(min)));
    }
    Ok(true)
}

/// What happened to a free-form event offered to the input subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// Nothing was pending; the event goes on to the catch-all handlers.
    Unclaimed,
    /// The value was accepted. A continuation may name a follow-up route.
    Accepted { next: Option<RouteDescriptor> },
    /// The value was rejected and the user was asked again.
    Retry { attempt: u32 },
}

/// Offers a free-form value to the session's pending request.
pub async fn intercept(
    session: &SessionHandle,
    value: InputValue,
    chat: &dyn ChatProvider,
    chat_id: &str,
) -> InputOutcome {
    let (serial, key, request) = {
        let session = session.lock().await;
        match session.pending().parts() {
            Some((serial, key, request)) => (serial, key.to_string(), request.clone()),
            None => return InputOutcome::Unclaimed,
        }
    };

    // Validators may be slow; the session is not held while they run
    let verdict = validate(
        &value,
        request.validator.as_ref(),
        request.file_validation.as_ref(),
    )
    .await;

    let mut guard = session.lock().await;
    match guard.pending().parts() {
        Some((current, _, _)) if current == serial => {}
        _ => {
            tracing::debug!("Input request '{}' changed during validation", key);
            return InputOutcome::Unclaimed;
        }
    }

    let reason = match verdict {
        Ok(true) => {
            let pending = guard.take_pending();
            guard.store_answer(key.clone(), &value);
            tracing::info!("Input '{}' accepted for {}", key, guard.user_id());
            return match pending {
                PendingInput::Promise(promise) => {
                    let _ = promise.responder.send(Ok(value));
                    let prompt = guard.last_sent_message().map(str::to_string);
                    drop(guard);
                    if let Some(message_id) = prompt {
                        delete_prompt(session, chat, chat_id, &message_id).await;
                    }
                    InputOutcome::Accepted { next: None }
                }
                PendingInput::Continuation(continuation) => InputOutcome::Accepted {
                    next: continuation.request.on_success,
                },
                PendingInput::None => InputOutcome::Accepted { next: None },
            };
        }
        Ok(false) => request.error_message.clone(),
        Err(InputError::Rejected(reason)) => reason,
        Err(other) => other.to_string(),
    };

    let attempt = guard.pending_mut().bump_retry();
    drop(guard);
    tracing::info!("Input '{}' rejected (attempt {}): {}", key, attempt, reason);

    let mut text = if attempt > 1 {
        messages::input_attempt(&reason, attempt)
    } else {
        reason
    };
    let keyboard = if request.allow_cancel {
        text.push_str("\n\n");
        text.push_str(messages::CANCEL_HINT);
        Some(InlineKeyboard::new().row(request.cancel_row()))
    } else {
        None
    };

    if let Err(e) = chat.send_message(chat_id, &text, keyboard.as_ref()).await {
        tracing::warn!("Failed to send input error to {}: {}", chat_id, e);
    }

    InputOutcome::Retry { attempt }
}

async fn delete_prompt(session: &SessionHandle, chat: &dyn ChatProvider, chat_id: &str, message_id: &str) {
    match chat.delete_message(chat_id, message_id).await {
        Ok(()) => session.lock().await.forget_message(message_id),
        Err(e) => tracing::debug!("Could not delete prompt {}: {}", message_id, e),
    }
}
