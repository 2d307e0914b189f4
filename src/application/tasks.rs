//! # Background Tasks
//!
//! `TaskSupervisor` runs long jobs outside the event flow and keeps a record per task:
//! status, timestamps, error and a replayable message channel between the job and the
//! outside world.
//!
//! A job receives a [`TaskController`]: its cancellation signal, a way to report progress,
//! and a subscription to externally sent messages. Messages sent before anyone subscribed
//! are replayed in order to each new subscriber.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::TaskError;
use crate::domain::traits::ChatProvider;
use crate::strings::messages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    /// Sent by the job itself
    Job,
    /// Delivered to the job from outside
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskMessage {
    pub text: String,
    pub origin: MessageOrigin,
}

#[derive(Default)]
struct ChannelState {
    queue: Vec<TaskMessage>,
    subscribers: Vec<mpsc::UnboundedSender<TaskMessage>>,
}

/// Message log of a task with replay for late subscribers.
#[derive(Clone, Default)]
pub struct TaskChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl TaskChannel {
    async fn publish(&self, message: TaskMessage) {
        let mut state = self.state.lock().await;
        state.queue.push(message.clone());
        state.subscribers.retain(|tx| tx.send(message.clone()).is_ok());
    }

    /// Everything sent so far, then every later message, in order.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<TaskMessage> {
        let mut state = self.state.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();
        for message in &state.queue {
            let _ = tx.send(message.clone());
        }
        state.subscribers.push(tx);
        rx
    }

    pub async fn history(&self) -> Vec<TaskMessage> {
        self.state.lock().await.queue.clone()
    }
}

/// Where task notifications are sent.
#[derive(Clone)]
pub struct TaskNotifier {
    chat: Arc<dyn ChatProvider>,
    chat_id: String,
}

impl TaskNotifier {
    pub fn new(chat: Arc<dyn ChatProvider>, chat_id: impl Into<String>) -> Self {
        Self {
            chat,
            chat_id: chat_id.into(),
        }
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.chat.send_message(&self.chat_id, text, None).await {
            tracing::warn!("Failed to send task notification to {}: {}", self.chat_id, e);
        }
    }
}

/// Handle given to a running job.
#[derive(Clone)]
pub struct TaskController {
    id: String,
    token: CancellationToken,
    channel: TaskChannel,
    notifier: Option<TaskNotifier>,
    silent: bool,
}

impl TaskController {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the task is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// `Err(TaskError::Cancelled)` once cancellation was requested, for use with `?`.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.token.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Reports progress to the user and appends to the task's message log.
    pub async fn send_message(&self, text: impl Into<String>) {
        let text = text.into();
        if !self.silent
            && let Some(notifier) = &self.notifier
        {
            notifier.notify(&messages::task_message(&self.id, &text)).await;
        }
        self.channel
            .publish(TaskMessage {
                text,
                origin: MessageOrigin::Job,
            })
            .await;
    }

    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<TaskMessage> {
        self.channel.subscribe().await
    }

    /// Calls `handler` for every message, queued ones first. Cancellation does not stop it, so
    /// a job's closing messages still arrive; it ends when the message channel closes.
    pub async fn on_message<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(TaskMessage) + Send + 'static,
    {
        let mut rx = self.subscribe().await;
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                handler(message);
            }
        })
    }

    async fn receive_external(&self, text: String) {
        if !self.silent
            && let Some(notifier) = &self.notifier
        {
            notifier
                .notify(&messages::task_external_message(&self.id, &text))
                .await;
        }
        self.channel
            .publish(TaskMessage {
                text,
                origin: MessageOrigin::External,
            })
            .await;
    }
}

#[derive(Clone)]
pub struct TaskOptions {
    task_id: Option<String>,
    owner: Option<String>,
    notifier: Option<TaskNotifier>,
    notify_start: bool,
    notify_complete: bool,
    start_message: String,
    complete_message: String,
    error_message: String,
    silent: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            task_id: None,
            owner: None,
            notifier: None,
            notify_start: true,
            notify_complete: true,
            start_message: messages::TASK_STARTED.to_string(),
            complete_message: messages::TASK_COMPLETED.to_string(),
            error_message: messages::TASK_FAILED.to_string(),
            silent: false,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn notify_to(mut self, chat: Arc<dyn ChatProvider>, chat_id: impl Into<String>) -> Self {
        self.notifier = Some(TaskNotifier::new(chat, chat_id));
        self
    }

    pub fn notify_start(mut self, enabled: bool) -> Self {
        self.notify_start = enabled;
        self
    }

    pub fn notify_complete(mut self, enabled: bool) -> Self {
        self.notify_complete = enabled;
        self
    }

    pub fn start_message(mut self, text: impl Into<String>) -> Self {
        self.start_message = text.into();
        self
    }

    pub fn complete_message(mut self, text: impl Into<String>) -> Self {
        self.complete_message = text.into();
        self
    }

    pub fn error_message(mut self, text: impl Into<String>) -> Self {
        self.error_message = text.into();
        self
    }

    /// Suppresses every notification, including progress messages.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

/// Snapshot of a task record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub owner: Option<String>,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub messages: Vec<TaskMessage>,
}

struct TaskEntry {
    generation: u64,
    owner: Option<String>,
    status: TaskStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    error: Option<String>,
    controller: TaskController,
}

impl TaskEntry {
    async fn snapshot(&self) -> TaskInfo {
        TaskInfo {
            id: self.controller.id.clone(),
            owner: self.owner.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            error: self.error.clone(),
            messages: self.controller.channel.history().await,
        }
    }
}

#[derive(Clone, Default)]
pub struct TaskSupervisor {
    tasks: Arc<Mutex<HashMap<String, TaskEntry>>>,
    generation: Arc<AtomicU64>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `job` in the background and returns its task id immediately.
    ///
    /// The job's outcome decides the final status: `Ok` → Completed, `TaskError::Cancelled`
    /// → Cancelled, any other error or a panic → Failed.
    pub async fn start<F, Fut>(&self, job: F, options: TaskOptions) -> String
    where
        F: FnOnce(TaskController) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let id = options
            .task_id
            .clone()
            .unwrap_or_else(|| format!("task_{}", Uuid::new_v4().simple()));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        let controller = TaskController {
            id: id.clone(),
            token: CancellationToken::new(),
            channel: TaskChannel::default(),
            notifier: options.notifier.clone(),
            silent: options.silent,
        };

        {
            let mut tasks = self.tasks.lock().await;
            if let Some(existing) = tasks.get(&id)
                && existing.status == TaskStatus::Running
            {
                tracing::warn!("Task id {} reused while still running; cancelling the old job", id);
                existing.controller.token.cancel();
            }
            tasks.insert(
                id.clone(),
                TaskEntry {
                    generation,
                    owner: options.owner.clone(),
                    status: TaskStatus::Running,
                    started_at: Utc::now(),
                    ended_at: None,
                    error: None,
                    controller: controller.clone(),
                },
            );
        }
        tracing::info!("Task {} started", id);

        let tasks = self.tasks.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let notifier = if options.silent { None } else { options.notifier.clone() };

            if options.notify_start
                && let Some(notifier) = &notifier
            {
                notifier.notify(&options.start_message).await;
            }

            let outcome = tokio::spawn(job(controller)).await;
            let (status, error) = match outcome {
                Ok(Ok(())) => (TaskStatus::Completed, None),
                Ok(Err(e)) if e.is_cancellation() => (TaskStatus::Cancelled, Some(e.to_string())),
                Ok(Err(e)) => (TaskStatus::Failed, Some(format!("{e:#}"))),
                Err(join_error) => (TaskStatus::Failed, Some(format!("job panicked: {join_error}"))),
            };

            finish(&tasks, &task_id, generation, status, error.clone()).await;

            match (status, &notifier) {
                (TaskStatus::Completed, Some(notifier)) if options.notify_complete => {
                    notifier.notify(&options.complete_message).await;
                }
                (TaskStatus::Failed, Some(notifier)) => {
                    let detail = error.unwrap_or_default();
                    notifier
                        .notify(&messages::task_failed(&options.error_message, &detail))
                        .await;
                }
                _ => {}
            }
        });

        id
    }

    /// Requests cancellation. False if the task is unknown or already finished.
    pub async fn cancel(&self, id: &str) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(id) {
            Some(entry) if entry.status == TaskStatus::Running => {
                tracing::info!("Cancelling task {}", id);
                entry.controller.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Delivers a message to a running task. False if the task is unknown or finished.
    pub async fn send_message(&self, id: &str, text: impl Into<String>) -> bool {
        let controller = {
            let tasks = self.tasks.lock().await;
            match tasks.get(id) {
                Some(entry) if entry.status == TaskStatus::Running => entry.controller.clone(),
                _ => return false,
            }
        };
        controller.receive_external(text.into()).await;
        true
    }

    pub async fn info(&self, id: &str) -> Option<TaskInfo> {
        let tasks = self.tasks.lock().await;
        match tasks.get(id) {
            Some(entry) => Some(entry.snapshot().await),
            None => None,
        }
    }

    /// Tasks started on behalf of `owner`, oldest first.
    pub async fn user_tasks(&self, owner: &str) -> Vec<TaskInfo> {
        let tasks = self.tasks.lock().await;
        let mut owned = Vec::new();
        for entry in tasks.values().filter(|e| e.owner.as_deref() == Some(owner)) {
            owned.push(entry.snapshot().await);
        }
        owned.sort_by_key(|info| info.started_at);
        owned
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Removes finished tasks that ended more than `max_age` ago. Running tasks stay.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        self.sweep_at(Utc::now(), max_age).await
    }

    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, entry| match (entry.status, entry.ended_at) {
            (TaskStatus::Running, _) => true,
            (_, Some(ended)) => now.signed_duration_since(ended) <= max_age,
            (_, None) => true,
        });
        before - tasks.len()
    }
}

async fn finish(
    tasks: &Mutex<HashMap<String, TaskEntry>>,
    id: &str,
    generation: u64,
    status: TaskStatus,
    error: Option<String>,
) {
    let mut tasks = tasks.lock().await;
    let Some(entry) = tasks.get_mut(id) else {
        return;
    };
    // Status moves forward only, and only for the job that owns this record
    if entry.generation != generation || entry.status.is_terminal() {
        return;
    }
    entry.status = status;
    entry.ended_at = Some(Utc::now());
    entry.error = error;
    match status {
        TaskStatus::Failed => tracing::error!(
            "Task {} failed: {}",
            id,
            entry.error.as_deref().unwrap_or_default()
        ),
        _ => tracing::info!("Task {} finished: {:?}", id, status),
    }
}
