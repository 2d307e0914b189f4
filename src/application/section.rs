//! # Sections
//!
//! A section is a stateful handler object grouping related bot screens. The dispatcher
//! drives it through `install` → `activate` → method → `deactivate`, and `uninstall` once the
//! user navigates to a different section.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::lifecycle::SectionContext;

#[async_trait]
pub trait Section: Send + Sync {
    /// Runs once, right after the instance is created
    async fn install(&mut self, _ctx: &SectionContext) -> Result<()> {
        Ok(())
    }

    /// Runs before every method call
    async fn activate(&mut self, _ctx: &SectionContext) -> Result<()> {
        Ok(())
    }

    /// Runs after every method call, even a failed one
    async fn deactivate(&mut self, _ctx: &SectionContext) -> Result<()> {
        Ok(())
    }

    /// Runs when the user has moved on to another section
    async fn uninstall(&mut self, _ctx: &SectionContext) -> Result<()> {
        Ok(())
    }

    /// Invokes the named method. Only names listed in the descriptor reach this call.
    async fn call(&mut self, method: &str, ctx: &SectionContext) -> Result<()>;
}

pub type SharedSection = Arc<Mutex<Box<dyn Section>>>;

/// Static description of a section: its id, bot command, methods and action routes.
#[derive(Debug, Clone, Default)]
pub struct SectionDescriptor {
    id: String,
    command: Option<String>,
    description: String,
    methods: Vec<String>,
    action_routes: HashMap<String, String>,
}

impl SectionDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares a callable method, reachable as `<id>.<name>`.
    pub fn method(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.action_routes
            .entry(format!("{}.{}", self.id, name))
            .or_insert_with(|| name.clone());
        if !self.methods.contains(&name) {
            self.methods.push(name);
        }
        self
    }

    /// Maps an action path to a method under a different name.
    pub fn action(mut self, action_path: impl Into<String>, method: impl Into<String>) -> Self {
        let method = method.into();
        if !self.methods.contains(&method) {
            self.methods.push(method.clone());
        }
        self.action_routes.insert(action_path.into(), method);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command_name(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn description_text(&self) -> &str {
        &self.description
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m == name)
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Method for an action path: the explicit route, else the second path segment.
    pub fn resolve_action(&self, action_path: &str) -> Option<String> {
        if let Some(method) = self.action_routes.get(action_path) {
            return Some(method.clone());
        }
        action_path.split('.').nth(1).map(str::to_string)
    }
}

type Constructor = Arc<dyn Fn() -> Box<dyn Section> + Send + Sync>;

/// A loaded section "class": its descriptor plus a constructor for fresh instances.
#[derive(Clone)]
pub struct SectionDefinition {
    descriptor: SectionDescriptor,
    constructor: Constructor,
}

impl SectionDefinition {
    pub fn new<S, F>(descriptor: SectionDescriptor, make: F) -> Self
    where
        S: Section + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            descriptor,
            constructor: Arc::new(move || Box::new(make()) as Box<dyn Section>),
        }
    }

    pub fn descriptor(&self) -> &SectionDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> &str {
        self.descriptor.id()
    }

    pub fn create(&self) -> SharedSection {
        Arc::new(Mutex::new((self.constructor)()))
    }
}

impl std::fmt::Debug for SectionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionDefinition")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
