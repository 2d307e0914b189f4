//! # Background Services
//!
//! Long-running companions of the bot, started after the route table is built and stopped
//! on shutdown. Each service gets `setup`, a cancellable `run` loop and `teardown`.
//!
//! Two services ship with the crate: idle-session eviction and finished-task sweeping.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::session::SessionStore;
use crate::application::tasks::TaskSupervisor;

#[async_trait]
pub trait BackgroundService: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Runs until `shutdown` fires.
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;

    async fn teardown(&self) -> Result<()> {
        Ok(())
    }
}

pub struct ServiceManager {
    services: Vec<Arc<dyn BackgroundService>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn register(&mut self, service: Arc<dyn BackgroundService>) {
        tracing::debug!("Registered service {}", service.name());
        self.services.push(service);
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    /// Sets up every service, then spawns their run loops.
    pub async fn start_all(&mut self) -> Result<()> {
        for service in &self.services {
            service
                .setup()
                .await
                .with_context(|| format!("Failed to set up service {}", service.name()))?;
            tracing::info!("Service {} set up", service.name());
        }

        for service in &self.services {
            let service = service.clone();
            let shutdown = self.shutdown.child_token();
            self.handles.push(tokio::spawn(async move {
                tracing::info!("Service {} running", service.name());
                if let Err(e) = service.run(shutdown).await {
                    tracing::error!("Service {} stopped with error: {:#}", service.name(), e);
                }
            }));
        }
        Ok(())
    }

    /// Signals shutdown, waits for the run loops and tears every service down.
    pub async fn stop_all(&mut self) {
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!("Service task ended abnormally: {}", e);
            }
        }
        for service in &self.services {
            if let Err(e) = service.teardown().await {
                tracing::warn!("Teardown of {} failed: {:#}", service.name(), e);
            }
        }
        tracing::info!("All services stopped");
    }
}

/// Evicts sessions idle for longer than the configured threshold.
pub struct SessionEvictionService {
    sessions: Arc<SessionStore>,
    idle: Duration,
    interval: Duration,
}

impl SessionEvictionService {
    pub fn new(sessions: Arc<SessionStore>, idle: Duration, interval: Duration) -> Self {
        Self {
            sessions,
            idle,
            interval,
        }
    }
}

#[async_trait]
impl BackgroundService for SessionEvictionService {
    fn name(&self) -> &str {
        "session-eviction"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    let evicted = self.sessions.evict_idle_since(self.idle).await;
                    if !evicted.is_empty() {
                        tracing::info!("Evicted {} idle sessions", evicted.len());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Drops finished task records past their retention period.
pub struct TaskSweepService {
    tasks: TaskSupervisor,
    retention: Duration,
    interval: Duration,
}

impl TaskSweepService {
    pub fn new(tasks: TaskSupervisor, retention: Duration, interval: Duration) -> Self {
        Self {
            tasks,
            retention,
            interval,
        }
    }
}

#[async_trait]
impl BackgroundService for TaskSweepService {
    fn name(&self) -> &str {
        "task-sweep"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    let removed = self.tasks.sweep(self.retention).await;
                    if removed > 0 {
                        tracing::info!("Swept {} finished tasks", removed);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tasks::{TaskOptions, TaskStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        setups: AtomicUsize,
        runs: AtomicUsize,
        teardowns: AtomicUsize,
    }

    #[async_trait]
    impl BackgroundService for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn setup(&self) -> Result<()> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn run(&self, shutdown: CancellationToken) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            shutdown.cancelled().await;
            Ok(())
        }

        async fn teardown(&self) -> Result<()> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_manager_lifecycle() {
        let service = Arc::new(Counting::default());
        let mut manager = ServiceManager::new();
        manager.register(service.clone());
        assert_eq!(manager.names(), vec!["counting"]);

        manager.start_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.stop_all().await;

        assert_eq!(service.setups.load(Ordering::SeqCst), 1);
        assert_eq!(service.runs.load(Ordering::SeqCst), 1);
        assert_eq!(service.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eviction_service_removes_idle_sessions() {
        let sessions = Arc::new(SessionStore::new(10));
        sessions.get_or_create("1").await;

        let mut manager = ServiceManager::new();
        manager.register(Arc::new(SessionEvictionService::new(
            sessions.clone(),
            Duration::ZERO,
            Duration::from_millis(10),
        )));
        manager.start_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.stop_all().await;

        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_service_removes_finished_tasks() {
        let tasks = TaskSupervisor::new();
        let id = tasks.start(|_ctl| async { Ok(()) }, TaskOptions::new()).await;
        for _ in 0..100 {
            if tasks.info(&id).await.is_some_and(|i| i.status == TaskStatus::Completed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut manager = ServiceManager::new();
        manager.register(Arc::new(TaskSweepService::new(
            tasks.clone(),
            Duration::ZERO,
            Duration::from_millis(10),
        )));
        manager.start_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.stop_all().await;

        assert!(tasks.is_empty().await);
    }
}
