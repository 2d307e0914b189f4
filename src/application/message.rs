//! # Outgoing Messages
//!
//! Builder returned by `SectionContext::message`. A message sent while handling a
//! callback-style route edits the pressed message; everything else is sent as new.
//! Attaching an input request prepends the cancel button and arms the session's
//! pending-input slot before the prompt goes out.

use crate::application::input::InputRequest;
use crate::application::lifecycle::SectionContext;
use crate::domain::errors::InputError;
use crate::domain::keyboard::{Button, InlineKeyboard};
use crate::domain::types::InputValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendMode {
    Auto,
    New,
    Update,
}

pub struct OutgoingMessage<'a> {
    ctx: &'a SectionContext,
    text: String,
    keyboard: Option<InlineKeyboard>,
    mode: SendMode,
    input: Option<(String, InputRequest)>,
}

impl<'a> OutgoingMessage<'a> {
    pub(crate) fn new(ctx: &'a SectionContext, text: impl Into<String>) -> Self {
        Self {
            ctx,
            text: text.into(),
            keyboard: None,
            mode: SendMode::Auto,
            input: None,
        }
    }

    pub fn keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Appends rows of buttons, e.g. from `paginate`.
    pub fn rows(mut self, rows: Vec<Vec<Button>>) -> Self {
        let keyboard = self.keyboard.take().unwrap_or_default();
        self.keyboard = Some(keyboard.rows(rows));
        self
    }

    /// Always send a new message.
    pub fn new_message(mut self) -> Self {
        self.mode = SendMode::New;
        self
    }

    /// Edit the pressed message even if the route is not callback-style.
    pub fn update_message(mut self) -> Self {
        self.mode = SendMode::Update;
        self
    }

    /// Asks for input with the continuation style; the answer lands under `key`.
    pub fn request_input(mut self, key: impl Into<String>, request: InputRequest) -> Self {
        self.input = Some((key.into(), request));
        self
    }

    /// Sends the message and returns its id.
    pub async fn send(mut self) -> anyhow::Result<String> {
        if let Some((key, request)) = self.input.take() {
            self.attach_cancel(&request);
            self.ctx.session().lock().await.await_continuation(key, request);
        }
        self.deliver().await
    }

    /// Sends the message as a prompt and suspends until the answer arrives.
    ///
    /// Resolves with `Cancelled` when the user presses cancel, `Superseded` when another
    /// request replaces this one and `SessionExpired` when the session is evicted.
    pub async fn request_input_with_await(
        mut self,
        key: impl Into<String>,
        request: InputRequest,
    ) -> Result<InputValue, InputError> {
        self.input = None;
        self.attach_cancel(&request);
        let receiver = self.ctx.session().lock().await.await_promise(key, request);

        if let Err(e) = self.deliver().await {
            tracing::warn!("Failed to send input prompt: {:#}", e);
        }

        receiver.await.unwrap_or(Err(InputError::SessionExpired))
    }

    fn attach_cancel(&mut self, request: &InputRequest) {
        if request.allow_cancel {
            let mut keyboard = self.keyboard.take().unwrap_or_default();
            keyboard.prepend_row(request.cancel_row());
            self.keyboard = Some(keyboard);
        }
    }

    fn edit_target(&self) -> Option<String> {
        let wants_update = match self.mode {
            SendMode::New => false,
            SendMode::Update => true,
            SendMode::Auto => self.ctx.route().is_callback_style(),
        };
        if wants_update {
            self.ctx.callback_message_id().map(str::to_string)
        } else {
            None
        }
    }

    async fn deliver(self) -> anyhow::Result<String> {
        let chat = self.ctx.chat();
        let chat_id = self.ctx.chat_id();
        let keyboard = self.keyboard.as_ref().filter(|k| !k.is_empty());

        let message_id = match self.edit_target() {
            Some(message_id) => {
                match chat.edit_message(chat_id, &message_id, &self.text, keyboard).await {
                    Ok(()) => message_id,
                    Err(e) => {
                        tracing::warn!("Edit of {} failed, sending new: {}", message_id, e);
                        chat.send_message(chat_id, &self.text, keyboard)
                            .await
                            .map_err(anyhow::Error::msg)?
                    }
                }
            }
            None => chat
                .send_message(chat_id, &self.text, keyboard)
                .await
                .map_err(anyhow::Error::msg)?,
        };

        self.ctx.session().lock().await.record_sent_message(message_id.clone());
        Ok(message_id)
    }
}
