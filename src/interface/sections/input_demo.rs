//! # Input Examples
//!
//! Shows both input styles: a continuation that stores the answer and routes to a
//! follow-up method, and awaited questions that suspend the method until the user replies.

use anyhow::Result;
use async_trait::async_trait;

use crate::application::input::{FileValidation, InputRequest, InputValidator};
use crate::application::lifecycle::SectionContext;
use crate::application::section::{Section, SectionDefinition, SectionDescriptor};
use crate::domain::errors::InputError;
use crate::domain::keyboard::{Button, InlineKeyboard};
use crate::domain::route::RouteDescriptor;
use crate::domain::types::InputValue;
use crate::strings::screens;

pub const ID: &str = "input_demo";

const TEXT_KEY: &str = "input_demo.text";
const MAX_UPLOAD: u64 = 5 * 1024 * 1024;

pub struct InputDemoSection;

pub fn definition() -> SectionDefinition {
    SectionDefinition::new(
        SectionDescriptor::new(ID)
            .command("input")
            .description("Input examples")
            .method("index")
            .method("ask_text")
            .method("show_text")
            .method("ask_awaiting")
            .method("ask_number")
            .method("ask_phone")
            .method("ask_file"),
        || InputDemoSection,
    )
}

fn menu() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![Button::callback(screens::BTN_ASK_TEXT, "input_demo.ask_text")])
        .row(vec![Button::callback(screens::BTN_ASK_AWAIT, "input_demo.ask_awaiting")])
        .row(vec![
            Button::callback(screens::BTN_ASK_NUMBER, "input_demo.ask_number"),
            Button::callback(screens::BTN_ASK_PHONE, "input_demo.ask_phone"),
            Button::callback(screens::BTN_ASK_FILE, "input_demo.ask_file"),
        ])
        .row(vec![Button::callback(screens::BTN_HOME, "home.index")])
}

/// Reply for an awaited question that ended without a value.
fn failure_text(error: &InputError) -> String {
    match error {
        InputError::Cancelled => screens::INPUT_CANCELLED.to_string(),
        InputError::Superseded => screens::INPUT_SUPERSEDED.to_string(),
        InputError::SessionExpired => screens::INPUT_EXPIRED.to_string(),
        InputError::Rejected(reason) => reason.clone(),
    }
}

impl InputDemoSection {
    async fn index(&self, ctx: &SectionContext) -> Result<()> {
        ctx.message(screens::INPUT_MENU).keyboard(menu()).send().await?;
        Ok(())
    }

    async fn ask_text(&self, ctx: &SectionContext) -> Result<()> {
        ctx.message(screens::INPUT_ASK_TEXT)
            .new_message()
            .request_input(
                TEXT_KEY,
                InputRequest::new().on_success(RouteDescriptor::to(ID, "show_text")),
            )
            .send()
            .await?;
        Ok(())
    }

    async fn show_text(&self, ctx: &SectionContext) -> Result<()> {
        let answer = ctx.answer(TEXT_KEY).await;
        let text = answer.as_ref().and_then(InputValue::as_text).unwrap_or_default();
        ctx.message(screens::input_echo(text)).keyboard(menu()).send().await?;
        Ok(())
    }

    async fn ask_awaiting(&self, ctx: &SectionContext) -> Result<()> {
        let reply = match ctx
            .message(screens::INPUT_ASK_AWAIT)
            .new_message()
            .request_input_with_await("input_demo.awaited", InputRequest::new())
            .await
        {
            Ok(value) => screens::input_echo_awaited(value.as_text().unwrap_or_default()),
            Err(e) => failure_text(&e),
        };
        ctx.message(reply).new_message().keyboard(menu()).send().await?;
        Ok(())
    }

    async fn ask_number(&self, ctx: &SectionContext) -> Result<()> {
        let request = InputRequest::new()
            .validator(InputValidator::Number)
            .error_message(screens::INPUT_NOT_A_NUMBER);
        let reply = match ctx.ask(screens::INPUT_ASK_NUMBER, "input_demo.number", request).await {
            Ok(value) => {
                let number: f64 = value.as_text().unwrap_or_default().trim().parse()?;
                screens::input_number(number)
            }
            Err(e) => failure_text(&e),
        };
        ctx.message(reply).new_message().keyboard(menu()).send().await?;
        Ok(())
    }

    async fn ask_phone(&self, ctx: &SectionContext) -> Result<()> {
        let request = InputRequest::new()
            .validator(InputValidator::Phone)
            .error_message(screens::INPUT_BAD_PHONE);
        let reply = match ctx.ask(screens::INPUT_ASK_PHONE, "input_demo.phone", request).await {
            Ok(value) => screens::input_phone(value.as_text().unwrap_or_default()),
            Err(e) => failure_text(&e),
        };
        ctx.message(reply).new_message().keyboard(menu()).send().await?;
        Ok(())
    }

    async fn ask_file(&self, ctx: &SectionContext) -> Result<()> {
        let request = InputRequest::new()
            .validator(InputValidator::File)
            .file_validation(
                FileValidation::new()
                    .allow("application/pdf")
                    .allow("image/png")
                    .max_size(MAX_UPLOAD),
            );
        let reply = match ctx.ask(screens::INPUT_ASK_FILE, "input_demo.file", request).await {
            Ok(value) => match value.as_file() {
                Some(file) => screens::input_file(
                    file.file_name.as_deref().unwrap_or(&file.file_id),
                    file.file_size,
                ),
                None => screens::INPUT_CANCELLED.to_string(),
            },
            Err(e) => failure_text(&e),
        };
        ctx.message(reply).new_message().keyboard(menu()).send().await?;
        Ok(())
    }
}

#[async_trait]
impl Section for InputDemoSection {
    async fn call(&mut self, method: &str, ctx: &SectionContext) -> Result<()> {
        match method {
            "index" => self.index(ctx).await,
            "ask_text" => self.ask_text(ctx).await,
            "show_text" => self.show_text(ctx).await,
            "ask_awaiting" => self.ask_awaiting(ctx).await,
            "ask_number" => self.ask_number(ctx).await,
            "ask_phone" => self.ask_phone(ctx).await,
            "ask_file" => self.ask_file(ctx).await,
            other => anyhow::bail!("input_demo has no method {other}"),
        }
    }
}
