//! # Bot
//!
//! Entry point for inbound events. For every event it:
//! 1. admits (or registers) the sender
//! 2. fetches the sender's session
//! 3. routes by event kind:
//!    - `/command` → bound command route
//!    - button press → matching callback binding
//!    - text → hears keyword, else pending input, else catch-all handlers
//!    - document / photo → pending input, else catch-all handlers
//!
//! Commands and hears keywords win over a pending input request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::access::{AccessGate, Admission};
use crate::application::input::{self, InputOutcome};
use crate::application::lifecycle::{SectionContext, SectionRunner};
use crate::application::resolver::{self, SectionRegistry};
use crate::application::router::{MessageHandler, RouteTable};
use crate::application::services::{BackgroundService, SessionEvictionService, TaskSweepService};
use crate::application::session::SessionStore;
use crate::application::tasks::TaskSupervisor;
use crate::domain::config::AppConfig;
use crate::domain::errors::DispatchError;
use crate::domain::route::RouteDescriptor;
use crate::domain::traits::{ChatProvider, UserStore};
use crate::domain::types::{EventKind, InboundEvent};
use crate::strings::messages;

/// Pattern of the catch-all binding that routes payloads by their action path.
const ACTION_PATTERN: &str = "(.+)";

pub struct BotBuilder {
    config: AppConfig,
    chat: Arc<dyn ChatProvider>,
    users: Arc<dyn UserStore>,
    registry: SectionRegistry,
    routes: RouteTable,
}

impl BotBuilder {
    pub fn sections(mut self, registry: SectionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Extra bindings, matched before the ones derived from sections and config.
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn build(self) -> Result<Bot> {
        let config = Arc::new(self.config);
        let resolver = resolver::for_config(self.registry, &config)?;

        let mut routes = self.routes;
        for definition in resolver.definitions()? {
            if let Some(command) = definition.descriptor().command_name() {
                if routes.has_command(command) {
                    continue;
                }
                tracing::info!("Binding /{} to {}", command, definition.id());
                routes = routes.command(command, definition.id(), "index");
            }
        }
        for (keyword, target) in &config.hears {
            let route = RouteDescriptor::from_callback_payload(target)
                .with_context(|| format!("Invalid hears target '{target}' for '{keyword}'"))?;
            let (Some(section), Some(method)) = (route.handler_id(), route.method_name()) else {
                continue;
            };
            routes = routes.hears(keyword, section, method);
        }
        let routes = routes.action_callbacks(ACTION_PATTERN)?;

        let runner = SectionRunner::new(resolver, config.bot.keep_section_instances);
        let sessions = Arc::new(SessionStore::new(config.session.message_id_limit));
        let access = AccessGate::new(config.bot.clone(), self.users);

        Ok(Bot {
            config,
            chat: self.chat,
            routes,
            runner,
            sessions,
            tasks: TaskSupervisor::new(),
            access,
        })
    }
}

pub struct Bot {
    config: Arc<AppConfig>,
    chat: Arc<dyn ChatProvider>,
    routes: RouteTable,
    runner: SectionRunner,
    sessions: Arc<SessionStore>,
    tasks: TaskSupervisor,
    access: AccessGate,
}

impl Bot {
    pub fn builder(config: AppConfig, chat: Arc<dyn ChatProvider>, users: Arc<dyn UserStore>) -> BotBuilder {
        BotBuilder {
            config,
            chat,
            users,
            registry: SectionRegistry::new(),
            routes: RouteTable::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn tasks(&self) -> &TaskSupervisor {
        &self.tasks
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The eviction and sweep services configured for this bot.
    pub fn background_services(&self) -> Vec<Arc<dyn BackgroundService>> {
        let session = &self.config.session;
        let tasks = &self.config.tasks;
        vec![
            Arc::new(SessionEvictionService::new(
                self.sessions.clone(),
                Duration::from_secs(session.idle_eviction_minutes * 60),
                Duration::from_secs(session.eviction_interval_secs.max(1)),
            )),
            Arc::new(TaskSweepService::new(
                self.tasks.clone(),
                Duration::from_secs(tasks.retention_minutes * 60),
                Duration::from_secs(tasks.sweep_interval_secs.max(1)),
            )),
        ]
    }

    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        tracing::debug!("Inbound event from {}: {:?}", event.user_id(), event.kind);

        let user = match self.access.admit(&event.sender, event.start_payload()).await? {
            Admission::Granted(user) => user,
            Admission::Denied(reply) => {
                if let Err(e) = self.chat.send_message(event.user_id(), reply, None).await {
                    tracing::warn!("Failed to send access denial: {}", e);
                }
                return Ok(());
            }
        };

        let session = self.sessions.get_or_create(event.user_id()).await;
        let base = SectionContext::new(
            self.chat.clone(),
            event.clone(),
            user,
            session,
            self.tasks.clone(),
            self.config.clone(),
        );

        match &event.kind {
            EventKind::Command { name, .. } => match self.routes.match_command(name) {
                Some(route) => self.run(&base, route).await,
                None => {
                    tracing::info!("Unknown command /{} from {}", name, event.user_id());
                    base.reply(messages::UNKNOWN_COMMAND).await;
                    Ok(())
                }
            },
            EventKind::Callback { callback_id, data, .. } => {
                if let Err(e) = self.chat.answer_callback(callback_id, None).await {
                    tracing::debug!("Failed to answer callback {}: {}", callback_id, e);
                }
                let route = self.resolve_callback(data).await;
                match route {
                    Ok(Some(route)) => self.run(&base, route).await,
                    Ok(None) => {
                        tracing::warn!("No binding for callback '{}'", data);
                        Ok(())
                    }
                    Err(e) => {
                        base.reply(messages::GENERIC_FAILURE).await;
                        Err(e.into())
                    }
                }
            }
            EventKind::Text(text) => match self.routes.match_hears(text) {
                Some(route) => self.run(&base, route).await,
                None => self.handle_free_form(&base).await,
            },
            EventKind::Document(_) | EventKind::Photo(_) => self.handle_free_form(&base).await,
        }
    }

    /// Matches a callback payload and maps its action path through the section's action routes.
    async fn resolve_callback(&self, payload: &str) -> Result<Option<RouteDescriptor>, DispatchError> {
        let Some(route) = self.routes.match_callback(payload)? else {
            return Ok(None);
        };
        let (Some(section), Some(action)) = (route.handler_id(), route.action_path_ref()) else {
            return Ok(Some(route));
        };
        // Only payload-routed bindings name their section in the action path
        if !action.starts_with(&format!("{section}.")) {
            return Ok(Some(route));
        }
        let definition = self.runner.resolver().resolve(section).await?;
        match definition.descriptor().resolve_action(action) {
            Some(method) => Ok(Some(route.method(method))),
            None => Ok(Some(route)),
        }
    }

    async fn handle_free_form(&self, base: &SectionContext) -> Result<()> {
        let Some(value) = base.event().input_value() else {
            return Ok(());
        };

        match input::intercept(base.session(), value, self.chat.as_ref(), base.chat_id()).await {
            InputOutcome::Accepted { next: Some(route) } => return self.run(base, route).await,
            InputOutcome::Accepted { next: None } | InputOutcome::Retry { .. } => return Ok(()),
            InputOutcome::Unclaimed => {}
        }

        for handler in self.routes.message_handlers() {
            match handler {
                MessageHandler::Route(route) => return self.run(base, route.clone()).await,
                MessageHandler::Func(func) => {
                    if func(base.clone()).await? {
                        return Ok(());
                    }
                }
            }
        }
        tracing::debug!("Free-form message from {} not handled", base.chat_id());
        Ok(())
    }

    async fn run(&self, base: &SectionContext, route: RouteDescriptor) -> Result<()> {
        if let Err(e) = self.runner.dispatch(base, route).await {
            tracing::error!("Dispatch failed for {}: {}", base.chat_id(), e);
            base.reply(messages::GENERIC_FAILURE).await;
            return Err(e.into());
        }
        Ok(())
    }
}
