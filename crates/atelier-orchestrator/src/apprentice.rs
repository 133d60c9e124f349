//! Apprentice dispatch contract
//!
//! The orchestrator's only contract with a worker: given a task, eventually
//! report exactly one terminal outcome. How the work happens (subprocess,
//! container, RPC) is the implementor's concern; the scheduler handles the
//! third possibility, silence, by failing the task once `worker_timeout`
//! elapses.

use async_trait::async_trait;
use atelier_core::Task;
use tokio::process::Command;
use tracing::debug;

/// Terminal outcome reported by an apprentice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprenticeOutcome {
    Success { output: String },
    Failure { error: String },
}

/// External worker that executes one dispatched task
#[async_trait]
pub trait Apprentice: Send + Sync {
    /// Execute the task to a terminal outcome. Called once per dispatch.
    async fn execute(&self, task: &Task) -> ApprenticeOutcome;
}

/// Apprentice that runs a task's description as a shell command
///
/// stdout becomes the task output; a non-zero exit or spawn failure becomes
/// the task error.
pub struct ProcessApprentice {
    shell: String,
}

impl ProcessApprentice {
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for ProcessApprentice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Apprentice for ProcessApprentice {
    async fn execute(&self, task: &Task) -> ApprenticeOutcome {
        if task.description.trim().is_empty() {
            return ApprenticeOutcome::Failure {
                error: "Task has no command to run".to_string(),
            };
        }

        debug!("Running task {} via {}", task.task_id, self.shell);
        let result = Command::new(&self.shell)
            .arg("-c")
            .arg(&task.description)
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => ApprenticeOutcome::Success {
                output: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            },
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
                let error = if stderr.is_empty() {
                    format!("Command exited with {}", output.status)
                } else {
                    stderr
                };
                ApprenticeOutcome::Failure { error }
            }
            Err(e) => ApprenticeOutcome::Failure {
                error: format!("Failed to spawn {}: {}", self.shell, e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_captures_stdout() {
        let apprentice = ProcessApprentice::new();
        let task = Task::new("echo", "Echo").with_description("echo woven");

        match apprentice.execute(&task).await {
            ApprenticeOutcome::Success { output } => assert_eq!(output, "woven"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failing_command_captures_stderr() {
        let apprentice = ProcessApprentice::new();
        let task = Task::new("fail", "Fail").with_description("echo torn >&2; exit 3");

        match apprentice.execute(&task).await {
            ApprenticeOutcome::Failure { error } => assert_eq!(error, "torn"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_description_fails() {
        let apprentice = ProcessApprentice::new();
        let task = Task::new("empty", "Empty");

        assert!(matches!(
            apprentice.execute(&task).await,
            ApprenticeOutcome::Failure { .. }
        ));
    }
}
