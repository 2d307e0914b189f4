//! # Section Resolver
//!
//! Maps a section id to its loaded definition. Two strategies:
//! - [`CachedResolver`] loads every enabled section once at startup
//! - [`FreshResolver`] calls the loader on every resolve, so edited sections are picked up
//!   without a restart (development mode)

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::section::SectionDefinition;
use crate::domain::config::AppConfig;
use crate::domain::errors::DispatchError;

pub type SectionLoader = Arc<dyn Fn() -> anyhow::Result<SectionDefinition> + Send + Sync>;

/// Every section the binary knows how to load, keyed by id.
#[derive(Clone, Default)]
pub struct SectionRegistry {
    loaders: BTreeMap<String, SectionLoader>,
}

impl SectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, id: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<SectionDefinition> + Send + Sync + 'static,
    {
        self.loaders.insert(id.into(), Arc::new(loader));
        self
    }

    /// Registers an already built definition.
    pub fn definition(self, definition: SectionDefinition) -> Self {
        let id = definition.id().to_string();
        self.register(id, move || Ok(definition.clone()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.loaders.contains_key(id)
    }

    pub fn load(&self, id: &str) -> Result<SectionDefinition, DispatchError> {
        let loader = self
            .loaders
            .get(id)
            .ok_or_else(|| DispatchError::HandlerNotFound(id.to_string()))?;
        let definition = loader().map_err(|e| DispatchError::LoadFailed {
            section: id.to_string(),
            reason: format!("{e:#}"),
        })?;
        if definition.id() != id {
            return Err(DispatchError::LoadFailed {
                section: id.to_string(),
                reason: format!("loader produced section '{}'", definition.id()),
            });
        }
        Ok(definition)
    }
}

#[async_trait]
pub trait HandlerResolver: Send + Sync {
    async fn resolve(&self, id: &str) -> Result<Arc<SectionDefinition>, DispatchError>;

    /// All enabled definitions, used to bind commands at startup.
    fn definitions(&self) -> Result<Vec<Arc<SectionDefinition>>, DispatchError>;
}

fn enabled_ids(registry: &SectionRegistry, config: &AppConfig) -> Vec<String> {
    for id in &config.sections {
        if !registry.contains(id) {
            tracing::warn!("Section '{}' is enabled in config but not registered", id);
        }
    }
    registry
        .ids()
        .filter(|id| config.section_enabled(id))
        .map(str::to_string)
        .collect()
}

pub struct CachedResolver {
    table: BTreeMap<String, Arc<SectionDefinition>>,
}

impl CachedResolver {
    /// Loads every enabled section. Any load failure aborts startup.
    pub fn load(registry: &SectionRegistry, config: &AppConfig) -> Result<Self, DispatchError> {
        let mut table = BTreeMap::new();
        for id in enabled_ids(registry, config) {
            let definition = registry.load(&id)?;
            tracing::info!("Loaded section '{}'", id);
            table.insert(id, Arc::new(definition));
        }
        Ok(Self { table })
    }
}

#[async_trait]
impl HandlerResolver for CachedResolver {
    async fn resolve(&self, id: &str) -> Result<Arc<SectionDefinition>, DispatchError> {
        self.table
            .get(id)
            .cloned()
            .ok_or_else(|| DispatchError::HandlerNotFound(id.to_string()))
    }

    fn definitions(&self) -> Result<Vec<Arc<SectionDefinition>>, DispatchError> {
        Ok(self.table.values().cloned().collect())
    }
}

pub struct FreshResolver {
    registry: SectionRegistry,
    enabled: Vec<String>,
}

impl FreshResolver {
    pub fn new(registry: SectionRegistry, config: &AppConfig) -> Self {
        let enabled = enabled_ids(&registry, config);
        Self { registry, enabled }
    }
}

#[async_trait]
impl HandlerResolver for FreshResolver {
    async fn resolve(&self, id: &str) -> Result<Arc<SectionDefinition>, DispatchError> {
        if !self.enabled.iter().any(|e| e == id) {
            return Err(DispatchError::HandlerNotFound(id.to_string()));
        }
        tracing::debug!("Reloading section '{}'", id);
        self.registry.load(id).map(Arc::new)
    }

    fn definitions(&self) -> Result<Vec<Arc<SectionDefinition>>, DispatchError> {
        self.enabled
            .iter()
            .map(|id| self.registry.load(id).map(Arc::new))
            .collect()
    }
}

/// Picks the strategy named by `bot.dev_hot_reload_sections`.
pub fn for_config(
    registry: SectionRegistry,
    config: &AppConfig,
) -> Result<Arc<dyn HandlerResolver>, DispatchError> {
    if config.bot.dev_hot_reload_sections {
        tracing::info!("Sections are reloaded on every dispatch");
        Ok(Arc::new(FreshResolver::new(registry, config)))
    } else {
        Ok(Arc::new(CachedResolver::load(&registry, config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::SectionContext;
    use crate::application::section::{Section, SectionDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl Section for Noop {
        async fn call(&mut self, _method: &str, _ctx: &SectionContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noop(id: &str) -> SectionDefinition {
        SectionDefinition::new(SectionDescriptor::new(id).method("index"), || Noop)
    }

    #[tokio::test]
    async fn test_cached_resolver_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let registry = SectionRegistry::new().register("home", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(noop("home"))
        });

        let resolver = CachedResolver::load(&registry, &AppConfig::default()).unwrap();
        resolver.resolve("home").await.unwrap();
        resolver.resolve("home").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let err = resolver.resolve("missing").await.unwrap_err();
        assert!(matches!(err, DispatchError::HandlerNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_fresh_resolver_reloads_every_time() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let registry = SectionRegistry::new().register("home", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(noop("home"))
        });

        let resolver = FreshResolver::new(registry, &AppConfig::default());
        resolver.resolve("home").await.unwrap();
        resolver.resolve("home").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_sections_are_not_found() {
        let registry = SectionRegistry::new()
            .definition(noop("home"))
            .definition(noop("extra"));
        let config = AppConfig::parse("sections: [home]").unwrap();

        let cached = CachedResolver::load(&registry, &config).unwrap();
        assert!(cached.resolve("extra").await.is_err());
        assert_eq!(cached.definitions().unwrap().len(), 1);

        let fresh = FreshResolver::new(registry, &config);
        assert!(fresh.resolve("extra").await.is_err());
    }

    #[test]
    fn test_load_failure_is_named() {
        let registry = SectionRegistry::new()
            .register("broken", || Err(anyhow::anyhow!("syntax error")))
            .register("liar", || Ok(noop("other")));

        let err = registry.load("broken").unwrap_err();
        assert!(matches!(err, DispatchError::LoadFailed { ref section, .. } if section == "broken"));
        assert!(err.to_string().contains("syntax error"));

        assert!(matches!(registry.load("liar"), Err(DispatchError::LoadFailed { .. })));
        assert!(CachedResolver::load(&registry, &AppConfig::default()).is_err());
    }
}
