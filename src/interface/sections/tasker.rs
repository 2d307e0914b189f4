//! # Background Task Example
//!
//! Starts a stepped job, stops it, reports its status and pings it with an external message
//! the job answers. The current task id lives in the session.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::application::lifecycle::SectionContext;
use crate::application::section::{Section, SectionDefinition, SectionDescriptor};
use crate::application::tasks::{MessageOrigin, TaskController, TaskOptions, TaskStatus};
use crate::domain::errors::TaskError;
use crate::domain::keyboard::{Button, InlineKeyboard, paginate};
use crate::strings::screens;

pub const ID: &str = "tasker";

const TASK_KEY: &str = "tasker.task_id";
const TOTAL_STEPS: u32 = 5;
const STEP_DELAY: Duration = Duration::from_secs(3);
const PER_PAGE: u32 = 5;

pub struct TaskerSection;

pub fn definition() -> SectionDefinition {
    SectionDefinition::new(
        SectionDescriptor::new(ID)
            .command("tasks")
            .description("Background tasks")
            .method("index")
            .method("run")
            .method("stop")
            .method("status")
            .method("ping")
            .method("list"),
        || TaskerSection,
    )
}

fn menu() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![
            Button::callback(screens::BTN_RUN, "tasker.run"),
            Button::callback(screens::BTN_STOP, "tasker.stop"),
        ])
        .row(vec![
            Button::callback(screens::BTN_STATUS, "tasker.status"),
            Button::callback(screens::BTN_PING, "tasker.ping"),
        ])
        .row(vec![Button::callback(screens::BTN_LIST, "tasker.list")])
        .row(vec![Button::callback(screens::BTN_HOME, "home.index")])
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

/// Works through a fixed number of steps, answering external messages between them.
async fn stepped_job(controller: TaskController) -> Result<(), TaskError> {
    let mut inbox = controller.subscribe().await;
    let mut step = 0;
    let mut deadline = Instant::now() + STEP_DELAY;

    while step < TOTAL_STEPS {
        tokio::select! {
            _ = controller.cancelled() => return Err(TaskError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                step += 1;
                controller.send_message(screens::task_step(step, TOTAL_STEPS)).await;
                deadline = Instant::now() + STEP_DELAY;
            }
            Some(message) = inbox.recv() => {
                if message.origin == MessageOrigin::External {
                    controller.send_message(screens::task_pong(&message.text)).await;
                }
            }
        }
    }
    Ok(())
}

impl TaskerSection {
    async fn current_task(&self, ctx: &SectionContext) -> Option<String> {
        ctx.value(TASK_KEY)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    async fn index(&self, ctx: &SectionContext) -> Result<()> {
        ctx.message(screens::TASKS_MENU).keyboard(menu()).send().await?;
        Ok(())
    }

    async fn run(&self, ctx: &SectionContext) -> Result<()> {
        let id = ctx.run_task(stepped_job, TaskOptions::new()).await;
        ctx.set_value(TASK_KEY, Value::String(id.clone())).await;
        ctx.message(screens::task_started(&id)).keyboard(menu()).send().await?;
        Ok(())
    }

    async fn stop(&self, ctx: &SectionContext) -> Result<()> {
        let text = match self.current_task(ctx).await {
            Some(id) => {
                if ctx.tasks().cancel(&id).await {
                    screens::task_stopping(&id)
                } else {
                    screens::TASK_NOT_RUNNING.to_string()
                }
            }
            None => screens::TASKS_NONE.to_string(),
        };
        ctx.message(text).keyboard(menu()).send().await?;
        Ok(())
    }

    async fn status(&self, ctx: &SectionContext) -> Result<()> {
        let info = match self.current_task(ctx).await {
            Some(id) => ctx.tasks().info(&id).await,
            None => None,
        };
        let text = match info {
            Some(info) => screens::task_status(
                &info.id,
                status_label(info.status),
                info.messages.len(),
                info.error.as_deref(),
            ),
            None => screens::TASKS_NONE.to_string(),
        };
        ctx.message(text).keyboard(menu()).send().await?;
        Ok(())
    }

    async fn ping(&self, ctx: &SectionContext) -> Result<()> {
        let delivered = match self.current_task(ctx).await {
            Some(id) => ctx.tasks().send_message(&id, screens::TASK_PING).await,
            None => false,
        };
        if !delivered {
            ctx.message(screens::TASK_NOT_RUNNING).keyboard(menu()).send().await?;
        }
        Ok(())
    }

    async fn list(&self, ctx: &SectionContext) -> Result<()> {
        let mut tasks = ctx.tasks().user_tasks(&ctx.user().user_id).await;
        if tasks.is_empty() {
            ctx.message(screens::TASKS_EMPTY_LIST).keyboard(menu()).send().await?;
            return Ok(());
        }
        tasks.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let page = ctx
            .params()
            .get("page")
            .and_then(|p| p.parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        let text = tasks
            .iter()
            .skip(((page - 1) * PER_PAGE) as usize)
            .take(PER_PAGE as usize)
            .map(|t| screens::task_list_line(&t.id, status_label(t.status)))
            .collect::<Vec<_>>()
            .join("\n");

        let pages = paginate("tasker.list", ctx.params(), page, tasks.len() as u32, PER_PAGE);
        ctx.message(text)
            .keyboard(InlineKeyboard::new().rows(pages).rows(menu().as_rows().to_vec()))
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Section for TaskerSection {
    async fn call(&mut self, method: &str, ctx: &SectionContext) -> Result<()> {
        match method {
            "index" => self.index(ctx).await,
            "run" => self.run(ctx).await,
            "stop" => self.stop(ctx).await,
            "status" => self.status(ctx).await,
            "ping" => self.ping(ctx).await,
            "list" => self.list(ctx).await,
            other => anyhow::bail!("tasker has no method {other}"),
        }
    }
}
