//! Orchestrator facade - the public entry point
//!
//! Owns the session registry and the scheduler. `initiate` validates and
//! persists a new ceremony, `load` re-attaches to an existing ledger, and
//! `start`/`stop` control the background loop.

use crate::apprentice::Apprentice;
use crate::scheduler::{Scheduler, SchedulerConfig, SessionMap};
use crate::session::SessionHandle;
use atelier_core::{
    AtelierConfig, AtelierError, CeremonySession, CeremonyStatus, Priority, Result, Task,
    TaskStatus,
};
use atelier_ledger::{ledger_filename, load_ledger};
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Declaration of one task in a ceremony to be initiated
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskSpec {
    pub fn new(task_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            description: String::new(),
            priority: Priority::default(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    fn into_task(self) -> Task {
        Task::new(self.task_id, self.name)
            .with_description(self.description)
            .with_priority(self.priority)
            .with_dependencies(self.dependencies)
    }
}

/// Validate a task list before anything is persisted
pub fn validate_specs(specs: &[TaskSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(AtelierError::Validation(
            "A ceremony requires at least one task".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for spec in specs {
        if spec.task_id.trim().is_empty() {
            return Err(AtelierError::Validation(
                "Task id must not be empty".to_string(),
            ));
        }
        if !seen.insert(spec.task_id.as_str()) {
            return Err(AtelierError::Validation(format!(
                "Duplicate task id: {}",
                spec.task_id
            )));
        }
    }

    // A dependency on an unknown id is allowed; the task will simply never
    // become eligible and the ceremony will report blocked. Flag it early.
    for spec in specs {
        for dep in &spec.dependencies {
            if !seen.contains(dep.as_str()) {
                warn!(
                    "Task {} depends on unknown task {}; it will never run",
                    spec.task_id, dep
                );
            }
        }
    }

    Ok(())
}

/// The ceremony orchestrator
pub struct Orchestrator {
    config: AtelierConfig,
    sessions: SessionMap,
    scheduler: Scheduler,
}

impl Orchestrator {
    pub fn new(config: AtelierConfig, dispatcher: Arc<dyn Apprentice>) -> Self {
        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
        let scheduler = Scheduler::new(SchedulerConfig::from(&config), dispatcher, sessions.clone());
        Self {
            config,
            sessions,
            scheduler,
        }
    }

    pub fn config(&self) -> &AtelierConfig {
        &self.config
    }

    /// Create a ceremony, write its initial ledger, and register it.
    ///
    /// Fails with a validation error, before anything is persisted, if the
    /// task list is empty or contains a duplicate or empty id.
    pub async fn initiate(
        &self,
        name: impl Into<String>,
        initiator: impl Into<String>,
        intention: impl Into<String>,
        specs: Vec<TaskSpec>,
    ) -> Result<SessionHandle> {
        validate_specs(&specs)?;

        let tasks: Vec<Task> = specs.into_iter().map(TaskSpec::into_task).collect();
        let mut session = CeremonySession::new(name, initiator, intention, tasks, "");
        session.ledger_path = self
            .config
            .ceremonies_dir
            .join(ledger_filename(&session.ceremony_id));

        let ceremony_id = session.ceremony_id.clone();
        let handle = SessionHandle::new(session);

        // First persist: the ceremony leaves Initiated the moment it has a
        // durable ledger.
        handle
            .apply(|s| s.status = CeremonyStatus::InProgress)
            .await?;

        self.scheduler.register(handle.clone()).await;
        info!("Initiated ceremony {}", ceremony_id);
        Ok(handle)
    }

    /// Re-attach to an existing ledger.
    ///
    /// Returns `None` when the file cannot be parsed into a usable session.
    /// Tasks recorded in progress have no live apprentice in this process;
    /// they are reset to pending and the repaired ledger is persisted before
    /// the session is registered for scheduling.
    pub async fn load(&self, path: &Path) -> Option<SessionHandle> {
        let mut session = load_ledger(path).await?;

        let mut orphaned = 0;
        for task in &mut session.tasks {
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Pending;
                task.assigned_to = None;
                task.started_at = None;
                orphaned += 1;
            }
        }

        let ceremony_id = session.ceremony_id.clone();
        let handle = SessionHandle::new(session);

        if orphaned > 0 {
            warn!(
                "Ceremony {} had {} orphaned in-progress task(s); reset to pending",
                ceremony_id, orphaned
            );
            if let Err(e) = handle.apply(|_| ()).await {
                warn!("Cannot persist repaired ledger for {}: {}", ceremony_id, e);
                return None;
            }
        }

        self.scheduler.register(handle.clone()).await;
        info!("Loaded ceremony {} from {}", ceremony_id, path.display());
        Some(handle)
    }

    /// Start the scheduler loop
    pub fn start(&mut self) {
        self.scheduler.start();
    }

    /// Stop the scheduler loop, waiting out any ledger write in flight
    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Handle for a registered ceremony
    pub async fn session(&self, ceremony_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(ceremony_id).cloned()
    }

    /// Ids of every registered ceremony
    pub async fn ceremony_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
