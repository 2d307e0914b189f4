//! # Route Table
//!
//! Binds inbound triggers to section routes: `/commands`, callback payload patterns,
//! exact-text "hears" keywords and catch-all message handlers.
//!
//! Callback payloads may carry a bracketed query (`section.method[key=value]`). The query is
//! split off before dispatch and becomes the route's params.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use crate::application::lifecycle::SectionContext;
use crate::domain::errors::RouteError;
use crate::domain::route::{RouteDescriptor, TriggerKind, split_callback_payload};

/// A catch-all handler for free-form messages. Returns whether it consumed the event.
pub type MessageHandlerFn =
    Arc<dyn Fn(SectionContext) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

#[derive(Clone)]
pub enum MessageHandler {
    /// Dispatch a fixed route; always consumes the event
    Route(RouteDescriptor),
    Func(MessageHandlerFn),
}

#[derive(Clone)]
enum CallbackTarget {
    Fixed(RouteDescriptor),
    /// Section and method come from the payload's action path
    ActionPath,
}

#[derive(Clone)]
struct CallbackBinding {
    pattern: Regex,
    target: CallbackTarget,
}

#[derive(Clone, Default)]
pub struct RouteTable {
    commands: HashMap<String, RouteDescriptor>,
    callbacks: Vec<CallbackBinding>,
    hears: Vec<(String, RouteDescriptor)>,
    message_handlers: Vec<MessageHandler>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generic binding: `matcher` is a command name, callback regex or hears keyword.
    /// It is ignored for `TriggerKind::Message`.
    pub fn bind(
        self,
        kind: TriggerKind,
        matcher: &str,
        handler_id: &str,
        method: &str,
    ) -> Result<Self, RouteError> {
        match kind {
            TriggerKind::Command => Ok(self.command(matcher, handler_id, method)),
            TriggerKind::Callback => self.callback(matcher, handler_id, method),
            TriggerKind::Hears => Ok(self.hears(matcher, handler_id, method)),
            TriggerKind::Message => {
                Ok(self.on_message_route(RouteDescriptor::to(handler_id, method)))
            }
        }
    }

    pub fn command(mut self, name: &str, handler_id: &str, method: &str) -> Self {
        let name = name.trim_start_matches('/').to_string();
        let route = RouteDescriptor::to(handler_id, method)
            .trigger(TriggerKind::Command)
            .as_command();
        if self.commands.insert(name.clone(), route).is_some() {
            tracing::warn!("Command /{} rebound to {}.{}", name, handler_id, method);
        }
        self
    }

    pub fn callback(mut self, pattern: &str, handler_id: &str, method: &str) -> Result<Self, RouteError> {
        let route = RouteDescriptor::to(handler_id, method)
            .trigger(TriggerKind::Callback)
            .as_callback(true);
        self.callbacks.push(CallbackBinding {
            pattern: compile(pattern)?,
            target: CallbackTarget::Fixed(route),
        });
        Ok(self)
    }

    /// Payloads matching `pattern` are routed by their own `section.method` action path.
    pub fn action_callbacks(mut self, pattern: &str) -> Result<Self, RouteError> {
        self.callbacks.push(CallbackBinding {
            pattern: compile(pattern)?,
            target: CallbackTarget::ActionPath,
        });
        Ok(self)
    }

    pub fn hears(mut self, keyword: &str, handler_id: &str, method: &str) -> Self {
        let route = RouteDescriptor::to(handler_id, method)
            .trigger(TriggerKind::Hears)
            .hears_key(keyword);
        self.hears.push((keyword.to_string(), route));
        self
    }

    pub fn on_message_route(mut self, route: RouteDescriptor) -> Self {
        self.message_handlers
            .push(MessageHandler::Route(route.trigger(TriggerKind::Message)));
        self
    }

    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(SectionContext) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync + 'static,
    {
        self.message_handlers.push(MessageHandler::Func(Arc::new(handler)));
        self
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn match_command(&self, name: &str) -> Option<RouteDescriptor> {
        self.commands.get(name.trim_start_matches('/')).cloned()
    }

    pub fn match_hears(&self, text: &str) -> Option<RouteDescriptor> {
        self.hears
            .iter()
            .find(|(keyword, _)| keyword == text)
            .map(|(_, route)| route.clone())
    }

    /// First binding whose pattern matches the payload, in binding order.
    pub fn match_callback(&self, payload: &str) -> Result<Option<RouteDescriptor>, RouteError> {
        let Some(binding) = self.callbacks.iter().find(|b| b.pattern.is_match(payload)) else {
            return Ok(None);
        };
        match &binding.target {
            CallbackTarget::Fixed(route) => {
                let (action_path, params) = split_callback_payload(payload);
                Ok(Some(route.clone().callback_params(action_path, params)))
            }
            CallbackTarget::ActionPath => RouteDescriptor::from_callback_payload(payload).map(Some),
        }
    }

    pub fn message_handlers(&self) -> &[MessageHandler] {
        &self.message_handlers
    }
}

fn compile(pattern: &str) -> Result<Regex, RouteError> {
    Regex::new(pattern).map_err(|e| RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_commands_and_hears() {
        let table = RouteTable::new()
            .command("/start", "home", "index")
            .hears("📋 Tasks", "tasker", "index");

        let route = table.match_command("start").unwrap();
        assert_eq!(route.handler_id(), Some("home"));
        assert_eq!(route.trigger_kind(), TriggerKind::Command);
        assert!(!route.is_callback_style());
        assert!(table.match_command("stop").is_none());

        let route = table.match_hears("📋 Tasks").unwrap();
        assert_eq!(route.method_name(), Some("index"));
        assert_eq!(route.hears_key_ref(), Some("📋 Tasks"));
        assert!(table.match_hears("📋 tasks").is_none());
    }

    #[test]
    fn test_fixed_callback_keeps_payload_params() {
        let table = RouteTable::new()
            .callback(r"^shop\.", "catalog", "show")
            .unwrap();

        let route = table.match_callback("shop.list[page=3&sort=asc]").unwrap().unwrap();
        assert_eq!(route.handler_id(), Some("catalog"));
        assert_eq!(route.method_name(), Some("show"));
        assert_eq!(route.action_path_ref(), Some("shop.list"));
        assert_eq!(route.callback_params_ref().get("page"), Some("3"));
        assert!(route.is_callback_style());
        assert!(table.match_callback("other.x").unwrap().is_none());
    }

    #[test]
    fn test_action_callbacks_route_by_payload() {
        let table = RouteTable::new()
            .callback(r"^special$", "home", "special")
            .unwrap()
            .action_callbacks("(.+)")
            .unwrap();

        let route = table.match_callback("special").unwrap().unwrap();
        assert_eq!(route.method_name(), Some("special"));

        let route = table.match_callback("tasker.stop[id=task_1]").unwrap().unwrap();
        assert_eq!(route.handler_id(), Some("tasker"));
        assert_eq!(route.method_name(), Some("stop"));
        assert_eq!(route.callback_params_ref().get("id"), Some("task_1"));

        let err = table.match_callback("nodot").unwrap_err();
        assert_eq!(err, RouteError::MalformedAction("nodot".into()));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = RouteTable::new()
            .bind(TriggerKind::Callback, "(unclosed", "a", "b")
            .err()
            .unwrap();
        assert!(matches!(err, RouteError::InvalidPattern { .. }));
    }

    #[test]
    fn test_message_handlers_keep_order() {
        let table = RouteTable::new()
            .bind(TriggerKind::Message, "", "fallback", "index")
            .unwrap()
            .on_message(|_ctx| async { Ok::<_, anyhow::Error>(false) }.boxed());

        let handlers = table.message_handlers();
        assert_eq!(handlers.len(), 2);
        match &handlers[0] {
            MessageHandler::Route(route) => {
                assert_eq!(route.handler_id(), Some("fallback"));
                assert_eq!(route.trigger_kind(), TriggerKind::Message);
            }
            MessageHandler::Func(_) => panic!("expected route handler"),
        }
        assert!(matches!(handlers[1], MessageHandler::Func(_)));
    }
}
