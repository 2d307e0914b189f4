//! # Section Lifecycle
//!
//! `SectionRunner` turns a route into a section method call. Per dispatch it:
//! 1. validates the route (section id and method present)
//! 2. clears the pending input when the route carries `cancel_wait`; any other route
//!    rejects a method still awaiting input with `Cancelled`, so its instance is released
//! 3. resolves the section and checks the method is declared
//! 4. reuses the session's cached instance or creates one (running `install` once)
//! 5. runs `activate` → method → `deactivate` while holding the instance
//! 6. records the instance as previous and runs `uninstall` on the old one if the section changed
//!
//! `SectionContext` is what a section method sees: the event, the route, the user, the
//! session and the collaborators it can use to reply or start background work.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::application::input::InputRequest;
use crate::application::message::OutgoingMessage;
use crate::application::resolver::HandlerResolver;
use crate::application::session::{RunnedSection, SessionHandle};
use crate::application::tasks::{TaskController, TaskOptions, TaskSupervisor};
use crate::domain::config::AppConfig;
use crate::domain::errors::{DispatchError, InputError, TaskError};
use crate::domain::route::{CallbackParams, RouteDescriptor};
use crate::domain::traits::ChatProvider;
use crate::domain::types::{EventKind, InboundEvent, InputValue, UserRecord};
use crate::strings::messages;

/// Everything a section method can reach during one dispatch.
#[derive(Clone)]
pub struct SectionContext {
    chat: Arc<dyn ChatProvider>,
    event: InboundEvent,
    route: RouteDescriptor,
    user: UserRecord,
    session: SessionHandle,
    tasks: TaskSupervisor,
    config: Arc<AppConfig>,
}

impl SectionContext {
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        event: InboundEvent,
        user: UserRecord,
        session: SessionHandle,
        tasks: TaskSupervisor,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            chat,
            event,
            route: RouteDescriptor::new(),
            user,
            session,
            tasks,
            config,
        }
    }

    pub fn with_route(&self, route: RouteDescriptor) -> Self {
        Self {
            route,
            ..self.clone()
        }
    }

    pub fn chat(&self) -> &Arc<dyn ChatProvider> {
        &self.chat
    }

    pub fn chat_id(&self) -> &str {
        self.event.user_id()
    }

    pub fn event(&self) -> &InboundEvent {
        &self.event
    }

    pub fn route(&self) -> &RouteDescriptor {
        &self.route
    }

    pub fn params(&self) -> &CallbackParams {
        self.route.callback_params_ref()
    }

    pub fn user(&self) -> &UserRecord {
        &self.user
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn tasks(&self) -> &TaskSupervisor {
        &self.tasks
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The id of the message whose button triggered this dispatch.
    pub fn callback_message_id(&self) -> Option<&str> {
        match &self.event.kind {
            EventKind::Callback { message_id, .. } => message_id.as_deref(),
            _ => None,
        }
    }

    /// Starts an outgoing message. Callback routes edit the pressed message in place.
    pub fn message(&self, text: impl Into<String>) -> OutgoingMessage<'_> {
        OutgoingMessage::new(self, text)
    }

    /// Sends a plain message, logging transport failures.
    pub async fn reply(&self, text: &str) {
        if let Err(e) = self.chat.send_message(self.chat_id(), text, None).await {
            tracing::warn!("Failed to reply to {}: {}", self.chat_id(), e);
        }
    }

    pub async fn answer(&self, key: &str) -> Option<InputValue> {
        self.session.lock().await.answer(key)
    }

    pub async fn value(&self, key: &str) -> Option<Value> {
        self.session.lock().await.get_value(key).cloned()
    }

    pub async fn set_value(&self, key: &str, value: Value) {
        self.session.lock().await.set_value(key, value);
    }

    /// Arms a continuation request without sending a prompt.
    pub async fn request_input(&self, key: &str, request: InputRequest) {
        self.session.lock().await.await_continuation(key, request);
    }

    /// Sends `prompt` and suspends until the user answers.
    pub async fn ask(&self, prompt: &str, key: &str, request: InputRequest) -> Result<InputValue, InputError> {
        self.message(prompt).request_input_with_await(key, request).await
    }

    /// Runs a job in the background on behalf of this user. Notifications go to this chat.
    pub async fn run_task<F, Fut>(&self, job: F, options: TaskOptions) -> String
    where
        F: FnOnce(TaskController) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let options = options
            .owner(self.user.user_id.clone())
            .notify_to(self.chat.clone(), self.chat_id());
        self.tasks.start(job, options).await
    }
}

/// Drives section instances through their lifecycle for each dispatched route.
pub struct SectionRunner {
    resolver: Arc<dyn HandlerResolver>,
    keep_instances: bool,
}

impl SectionRunner {
    pub fn new(resolver: Arc<dyn HandlerResolver>, keep_instances: bool) -> Self {
        Self {
            resolver,
            keep_instances,
        }
    }

    pub fn resolver(&self) -> &Arc<dyn HandlerResolver> {
        &self.resolver
    }

    pub async fn dispatch(&self, base: &SectionContext, route: RouteDescriptor) -> Result<(), DispatchError> {
        let section_id = route
            .handler_id()
            .filter(|id| !id.is_empty())
            .ok_or(DispatchError::MissingHandler)?
            .to_string();
        let method = route
            .method_name()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| DispatchError::MissingMethod(section_id.clone()))?
            .to_string();

        tracing::info!(
            "Dispatching {}.{} ({}) for {}",
            section_id,
            method,
            route.trigger_kind(),
            base.chat_id()
        );

        {
            let mut session = base.session.lock().await;
            if route.is_cancel_request() {
                if session.cancel_pending() {
                    tracing::info!("Pending input cancelled for {}", base.chat_id());
                }
            } else if session.reject_awaiting(InputError::Cancelled) {
                tracing::info!("Awaited input abandoned by navigation for {}", base.chat_id());
            }
        }

        let definition = self.resolver.resolve(&section_id).await?;
        if !definition.descriptor().has_method(&method) {
            return Err(DispatchError::MethodNotFound {
                section: section_id,
                method,
            });
        }

        let ctx = base.with_route(route.clone());

        let (current, created, previous) = {
            let mut session = base.session.lock().await;
            let previous = session.previous_section().cloned();
            let cached = if self.keep_instances {
                session.find_section_mut(&section_id).map(|cached| {
                    cached.route = route.clone();
                    cached.clone()
                })
            } else {
                None
            };
            let (current, created) = match cached {
                Some(cached) => (cached, false),
                None => {
                    let fresh = RunnedSection::new(&section_id, definition.create(), route.clone());
                    if self.keep_instances {
                        session.register_section(fresh.clone());
                    }
                    (fresh, true)
                }
            };
            (current, created, previous)
        };

        {
            let mut instance = current.instance.lock().await;

            if created {
                tracing::debug!("Installing section {}", section_id);
                instance.install(&ctx).await.map_err(|e| hook_error(&section_id, "install", e))?;
            }
            instance
                .activate(&ctx)
                .await
                .map_err(|e| hook_error(&section_id, "activate", e))?;

            if let Err(e) = instance.call(&method, &ctx).await {
                tracing::error!("Section {}.{} failed: {:#}", section_id, method, e);
                ctx.reply(messages::GENERIC_FAILURE).await;
            }

            if let Err(e) = instance.deactivate(&ctx).await {
                tracing::warn!("deactivate hook of {} failed: {:#}", section_id, e);
            }
        }

        base.session.lock().await.set_previous_section(current.clone());

        if let Some(previous) = previous
            && previous.handler_id != current.handler_id
        {
            tracing::debug!("Uninstalling section {}", previous.handler_id);
            let mut instance = match previous.instance.try_lock() {
                Ok(instance) => instance,
                Err(_) => {
                    // Busy: possibly suspended on a question armed after this dispatch began
                    base.session.lock().await.reject_awaiting(InputError::Cancelled);
                    previous.instance.lock().await
                }
            };
            if let Err(e) = instance.uninstall(&ctx).await {
                tracing::warn!("uninstall hook of {} failed: {:#}", previous.handler_id, e);
            }
        }

        Ok(())
    }
}

fn hook_error(section: &str, hook: &'static str, e: anyhow::Error) -> DispatchError {
    tracing::error!("{} hook of {} failed: {:#}", hook, section, e);
    DispatchError::Hook {
        section: section.to_string(),
        hook,
        reason: format!("{e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resolver::{CachedResolver, SectionRegistry};
    use crate::application::section::{Section, SectionDefinition, SectionDescriptor};
    use crate::domain::types::{Role, Sender};
    use crate::infrastructure::recording::RecordingChat;
    use crate::application::session::UserSession;
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    type Journal = Arc<std::sync::Mutex<Vec<String>>>;

    /// Writes every hook and method call into a shared journal.
    struct Recorder {
        name: &'static str,
        journal: Journal,
        fail_install: bool,
        fail_method: bool,
    }

    impl Recorder {
        fn log(&self, entry: &str) {
            if let Ok(mut journal) = self.journal.lock() {
                journal.push(format!("{}:{}", self.name, entry));
            }
        }
    }

    #[async_trait]
    impl Section for Recorder {
        async fn install(&mut self, _ctx: &SectionContext) -> anyhow::Result<()> {
            self.log("install");
            if self.fail_install {
                anyhow::bail!("install refused");
            }
            Ok(())
        }

        async fn activate(&mut self, _ctx: &SectionContext) -> anyhow::Result<()> {
            self.log("activate");
            Ok(())
        }

        async fn deactivate(&mut self, _ctx: &SectionContext) -> anyhow::Result<()> {
            self.log("deactivate");
            Ok(())
        }

        async fn uninstall(&mut self, _ctx: &SectionContext) -> anyhow::Result<()> {
            self.log("uninstall");
            Ok(())
        }

        async fn call(&mut self, method: &str, _ctx: &SectionContext) -> anyhow::Result<()> {
            self.log(method);
            if self.fail_method {
                anyhow::bail!("method blew up");
            }
            Ok(())
        }
    }

    fn recorder(name: &'static str, journal: &Journal) -> SectionDefinition {
        recorder_with(name, journal, false, false)
    }

    fn recorder_with(
        name: &'static str,
        journal: &Journal,
        fail_install: bool,
        fail_method: bool,
    ) -> SectionDefinition {
        let journal = journal.clone();
        SectionDefinition::new(
            SectionDescriptor::new(name).method("index").method("other"),
            move || Recorder {
                name,
                journal: journal.clone(),
                fail_install,
                fail_method,
            },
        )
    }

    fn runner(registry: SectionRegistry, keep: bool) -> SectionRunner {
        let resolver = CachedResolver::load(&registry, &AppConfig::default()).unwrap();
        SectionRunner::new(Arc::new(resolver), keep)
    }

    fn context(chat: Arc<RecordingChat>) -> SectionContext {
        let sender = Sender::new("1", "alice");
        let user = UserRecord {
            user_id: "1".into(),
            username: "alice".into(),
            first_name: "Alice".into(),
            last_name: None,
            role: Role::User,
            language: "en".into(),
            referrer_id: None,
            registered_at: Utc::now(),
            last_active: Utc::now(),
        };
        SectionContext::new(
            chat,
            InboundEvent::text(sender, "hi"),
            user,
            Arc::new(Mutex::new(UserSession::new("1", 10))),
            TaskSupervisor::new(),
            Arc::new(AppConfig::default()),
        )
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_precondition_errors_run_no_hooks() {
        let journal = Journal::default();
        let runner = runner(SectionRegistry::new().definition(recorder("a", &journal)), true);
        let ctx = context(Arc::new(RecordingChat::new()));

        let err = runner.dispatch(&ctx, RouteDescriptor::new().method("index")).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingHandler));

        let err = runner.dispatch(&ctx, RouteDescriptor::new().section("a")).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingMethod(_)));

        let err = runner.dispatch(&ctx, RouteDescriptor::to("nope", "index")).await.unwrap_err();
        assert!(matches!(err, DispatchError::HandlerNotFound(_)));

        let err = runner.dispatch(&ctx, RouteDescriptor::to("a", "missing")).await.unwrap_err();
        assert!(matches!(err, DispatchError::MethodNotFound { .. }));

        assert!(entries(&journal).is_empty());
    }

    #[tokio::test]
    async fn test_install_runs_once_for_cached_instance() {
        let journal = Journal::default();
        let runner = runner(SectionRegistry::new().definition(recorder("a", &journal)), true);
        let ctx = context(Arc::new(RecordingChat::new()));

        for _ in 0..3 {
            runner.dispatch(&ctx, RouteDescriptor::to("a", "index")).await.unwrap();
        }

        let log = entries(&journal);
        assert_eq!(log.iter().filter(|e| *e == "a:install").count(), 1);
        assert_eq!(log.iter().filter(|e| *e == "a:activate").count(), 3);
        assert_eq!(log.iter().filter(|e| *e == "a:deactivate").count(), 3);
        assert_eq!(&log[..4], &["a:install", "a:activate", "a:index", "a:deactivate"]);
        assert!(!log.contains(&"a:uninstall".to_string()));
    }

    #[tokio::test]
    async fn test_fresh_instances_install_every_time() {
        let journal = Journal::default();
        let runner = runner(SectionRegistry::new().definition(recorder("a", &journal)), false);
        let ctx = context(Arc::new(RecordingChat::new()));

        runner.dispatch(&ctx, RouteDescriptor::to("a", "index")).await.unwrap();
        runner.dispatch(&ctx, RouteDescriptor::to("a", "index")).await.unwrap();

        let log = entries(&journal);
        assert_eq!(log.iter().filter(|e| *e == "a:install").count(), 2);
        assert_eq!(ctx.session().lock().await.section_count(), 0);
    }

    #[tokio::test]
    async fn test_uninstall_only_when_section_changes() {
        let journal = Journal::default();
        let registry = SectionRegistry::new()
            .definition(recorder("a", &journal))
            .definition(recorder("b", &journal));
        let runner = runner(registry, true);
        let ctx = context(Arc::new(RecordingChat::new()));

        runner.dispatch(&ctx, RouteDescriptor::to("a", "index")).await.unwrap();
        runner.dispatch(&ctx, RouteDescriptor::to("a", "other")).await.unwrap();
        assert!(!entries(&journal).contains(&"a:uninstall".to_string()));

        runner.dispatch(&ctx, RouteDescriptor::to("b", "index")).await.unwrap();
        let log = entries(&journal);
        assert_eq!(log.last().map(String::as_str), Some("a:uninstall"));
        assert_eq!(log.iter().filter(|e| *e == "a:uninstall").count(), 1);
        assert!(!log.contains(&"b:uninstall".to_string()));
    }

    #[tokio::test]
    async fn test_install_failure_aborts_before_method() {
        let journal = Journal::default();
        let registry = SectionRegistry::new().definition(recorder_with("a", &journal, true, false));
        let runner = runner(registry, true);
        let ctx = context(Arc::new(RecordingChat::new()));

        let err = runner.dispatch(&ctx, RouteDescriptor::to("a", "index")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Hook { hook: "install", .. }));
        assert_eq!(entries(&journal), vec!["a:install"]);
    }

    #[tokio::test]
    async fn test_method_failure_still_deactivates_and_replies() {
        let journal = Journal::default();
        let registry = SectionRegistry::new().definition(recorder_with("a", &journal, false, true));
        let runner = runner(registry, true);
        let chat = Arc::new(RecordingChat::new());
        let ctx = context(chat.clone());

        runner.dispatch(&ctx, RouteDescriptor::to("a", "index")).await.unwrap();
        assert_eq!(entries(&journal).last().map(String::as_str), Some("a:deactivate"));
        assert_eq!(chat.texts().await, vec![messages::GENERIC_FAILURE.to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_wait_clears_pending_input() {
        let journal = Journal::default();
        let runner = runner(SectionRegistry::new().definition(recorder("a", &journal)), true);
        let ctx = context(Arc::new(RecordingChat::new()));
        let rx = ctx.session().lock().await.await_promise("phone", InputRequest::default());

        let route = RouteDescriptor::from_callback_payload("a.index[cancel_wait=1]").unwrap();
        runner.dispatch(&ctx, route).await.unwrap();

        assert_eq!(rx.await.unwrap(), Err(InputError::Cancelled));
        assert!(!ctx.session().lock().await.is_awaiting_input());
    }

    #[tokio::test]
    async fn test_cached_instance_sees_latest_route() {
        let journal = Journal::default();
        let runner = runner(SectionRegistry::new().definition(recorder("a", &journal)), true);
        let ctx = context(Arc::new(RecordingChat::new()));

        runner.dispatch(&ctx, RouteDescriptor::to("a", "index")).await.unwrap();
        runner
            .dispatch(&ctx, RouteDescriptor::to("a", "other").param("page", "2"))
            .await
            .unwrap();

        let mut session = ctx.session().lock().await;
        let cached = session.find_section_mut("a").unwrap();
        assert_eq!(cached.route.method_name(), Some("other"));
        assert_eq!(cached.route.callback_params_ref().get("page"), Some("2"));
    }
}
