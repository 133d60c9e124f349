//! Core type definitions for Atelier ceremonies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Task priority levels, used only as a tie-break among eligible tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High = 0,
    #[default]
    Medium = 1,
    Low = 2,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "0" => Ok(Self::High),
            "medium" | "1" => Ok(Self::Medium),
            "low" | "2" => Ok(Self::Low),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Task status
///
/// `Complete` and `Failed` are terminal; a retry is a new task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl TaskStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "complete" | "completed" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Ceremony status
///
/// `Blocked` is terminal-but-incomplete: no task is running and none can ever
/// become eligible, yet not every task is complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyStatus {
    #[default]
    Initiated,
    InProgress,
    Complete,
    Blocked,
    Failed,
}

impl CeremonyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Blocked | Self::Failed)
    }
}

impl std::fmt::Display for CeremonyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiated => write!(f, "initiated"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
            Self::Blocked => write!(f, "blocked"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CeremonyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initiated" => Ok(Self::Initiated),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "complete" | "completed" => Ok(Self::Complete),
            "blocked" => Ok(Self::Blocked),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid ceremony status: {}", s)),
        }
    }
}

/// A single task within a ceremony
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the ceremony, immutable after creation
    pub task_id: String,
    /// Human-readable display name
    pub name: String,
    /// Free-text description of the work (handed to the apprentice)
    pub description: String,
    /// Dispatch tie-break hint
    pub priority: Priority,
    /// Task ids that must reach `Complete` before this task is eligible.
    /// May reference ids that do not exist; such a task never becomes eligible.
    pub dependencies: Vec<String>,
    /// Current lifecycle state
    pub status: TaskStatus,
    /// Apprentice currently executing the task
    pub assigned_to: Option<String>,
    /// Set on the transition to `InProgress`
    pub started_at: Option<DateTime<Utc>>,
    /// Set on the transition to `Complete` or `Failed`
    pub completed_at: Option<DateTime<Utc>>,
    /// Result payload, set on `Complete`
    pub output: Option<String>,
    /// Failure description, set on `Failed`
    pub error: Option<String>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            description: String::new(),
            priority: Priority::default(),
            dependencies: Vec::new(),
            status: TaskStatus::default(),
            assigned_to: None,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
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
}

/// Generate a ceremony identifier (`cer-` + 8 hex chars)
pub fn new_ceremony_id() -> String {
    format!("cer-{}", &Uuid::new_v4().simple().to_string()[..8])
}

/// Generate an apprentice identifier (`app-` + 8 hex chars)
pub fn new_apprentice_id() -> String {
    format!("app-{}", &Uuid::new_v4().simple().to_string()[..8])
}

/// In-memory representation of one ceremony
///
/// Tasks are kept in insertion order; ids are unique within the session.
/// The ledger file at `ledger_path` is the durable record of this state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeremonySession {
    /// Unique identifier, immutable after creation
    pub ceremony_id: String,
    /// Human-readable ceremony name
    pub name: String,
    /// Master weaver who initiated the ceremony
    pub initiator: String,
    /// Free-text purpose statement
    pub intention: String,
    /// Current lifecycle state
    pub status: CeremonyStatus,
    /// Tasks in insertion order
    pub tasks: Vec<Task>,
    /// Location of the durable ledger for this session
    pub ledger_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CeremonySession {
    pub fn new(
        name: impl Into<String>,
        initiator: impl Into<String>,
        intention: impl Into<String>,
        tasks: Vec<Task>,
        ledger_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ceremony_id: new_ceremony_id(),
            name: name.into(),
            initiator: initiator.into(),
            intention: intention.into(),
            status: CeremonyStatus::Initiated,
            tasks,
            ledger_path: ledger_path.into(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Look up a task by id
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Look up a task by id, mutably
    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.task_id == task_id)
    }

    /// Number of tasks currently running
    pub fn in_progress_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count()
    }

    /// Whether every task has reached `Complete`
    pub fn all_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Complete)
    }

    /// Whether any task has not yet reached a terminal state
    pub fn has_open_tasks(&self) -> bool {
        self.tasks.iter().any(|t| !t.status.is_terminal())
    }
}
