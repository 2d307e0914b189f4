//! # Home Section
//!
//! Handles `/start`. Shows the main menu and the help screen. It is also the target of the
//! default cancel button, so it must stay registered.

use anyhow::Result;
use async_trait::async_trait;

use crate::application::lifecycle::SectionContext;
use crate::application::section::{Section, SectionDefinition, SectionDescriptor};
use crate::domain::keyboard::{Button, InlineKeyboard};
use crate::strings::screens;

pub const ID: &str = "home";

#[derive(Default)]
pub struct HomeSection {
    visits: u32,
}

pub fn definition() -> SectionDefinition {
    SectionDefinition::new(
        SectionDescriptor::new(ID)
            .command("start")
            .description("Main menu")
            .method("index")
            .method("help"),
        HomeSection::default,
    )
}

impl HomeSection {
    async fn index(&mut self, ctx: &SectionContext) -> Result<()> {
        self.visits += 1;

        let mut keyboard = InlineKeyboard::new()
            .row(vec![Button::callback(screens::BTN_INPUT, "input_demo.index")])
            .row(vec![Button::callback(screens::BTN_TASKS, "tasker.index")])
            .row(vec![Button::callback(screens::BTN_HELP, "home.help")]);

        // Configured menu labels become buttons for their hears targets
        for labels in &ctx.config().bot.main_menu {
            let row: Vec<Button> = labels
                .iter()
                .filter_map(|label| {
                    ctx.config()
                        .hears
                        .get(label)
                        .map(|target| Button::callback(label.clone(), target.clone()))
                })
                .collect();
            if !row.is_empty() {
                keyboard = keyboard.row(row);
            }
        }

        ctx.message(screens::home_welcome(&ctx.user().display_name(), self.visits))
            .keyboard(keyboard)
            .send()
            .await?;
        Ok(())
    }

    async fn help(&mut self, ctx: &SectionContext) -> Result<()> {
        ctx.message(screens::HOME_HELP)
            .keyboard(InlineKeyboard::new().row(vec![Button::callback(screens::BTN_HOME, "home.index")]))
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Section for HomeSection {
    async fn call(&mut self, method: &str, ctx: &SectionContext) -> Result<()> {
        match method {
            "index" => self.index(ctx).await,
            "help" => self.help(ctx).await,
            other => anyhow::bail!("home has no method {other}"),
        }
    }
}
