//! Scheduler loop - background dispatch, timeout, and reconciliation
//!
//! One long-lived tokio task per orchestrator. Each tick it scans the active
//! sessions, fails dispatches that overran `worker_timeout`, hands eligible
//! tasks to apprentices up to the concurrency cap, and folds apprentice
//! outcomes back into session state. All session mutation goes through
//! [`SessionHandle::apply`], so a `stop()` can never interrupt a ledger write.

use crate::apprentice::{Apprentice, ApprenticeOutcome};
use crate::resolver;
use crate::session::SessionHandle;
use atelier_core::{new_apprentice_id, AtelierConfig, CeremonyStatus, Result, TaskStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Registry of active sessions, shared between the facade and the loop
pub(crate) type SessionMap = Arc<RwLock<HashMap<String, SessionHandle>>>;

/// Scheduler tuning knobs
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrency cap per orchestrator instance
    pub max_concurrent_workers: usize,
    /// Per-task deadline; an apprentice silent past this is failed
    pub worker_timeout: Duration,
    /// Tick period
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&AtelierConfig::default())
    }
}

impl From<&AtelierConfig> for SchedulerConfig {
    fn from(config: &AtelierConfig) -> Self {
        Self {
            max_concurrent_workers: config.max_concurrent_workers,
            worker_timeout: config.worker_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Outcome of one dispatched apprentice, reported back to the loop
struct WorkerReport {
    ceremony_id: String,
    task_id: String,
    outcome: ApprenticeOutcome,
}

/// Background scheduler for registered sessions
pub struct Scheduler {
    config: SchedulerConfig,
    dispatcher: Arc<dyn Apprentice>,
    sessions: SessionMap,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub(crate) fn new(
        config: SchedulerConfig,
        dispatcher: Arc<dyn Apprentice>,
        sessions: SessionMap,
    ) -> Self {
        Self {
            config,
            dispatcher,
            sessions,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Add a session to the scheduling scan
    pub async fn register(&self, handle: SessionHandle) {
        let ceremony_id = handle.ceremony_id().await;
        self.sessions.write().await.insert(ceremony_id.clone(), handle);
        debug!("Registered ceremony {}", ceremony_id);
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start the background loop
    pub fn start(&mut self) {
        if self.handle.is_some() {
            warn!("Scheduler already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(tokio::spawn(run_loop(
            self.config.clone(),
            self.dispatcher.clone(),
            self.sessions.clone(),
            shutdown_rx,
        )));
    }

    /// Stop the background loop.
    ///
    /// Waits for the loop to finish its current step, so any ledger write in
    /// flight completes before this returns. Already-dispatched apprentices
    /// keep running; their late outcomes are discarded.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn run_loop(
    config: SchedulerConfig,
    dispatcher: Arc<dyn Apprentice>,
    sessions: SessionMap,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let (report_tx, mut report_rx) = mpsc::channel::<WorkerReport>(64);
    let mut inflight: HashMap<(String, String), Instant> = HashMap::new();
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        "Scheduler started (cap {}, timeout {}s, tick {}ms)",
        config.max_concurrent_workers,
        config.worker_timeout.as_secs(),
        config.poll_interval.as_millis()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick(&config, &dispatcher, &sessions, &report_tx, &mut inflight).await;
            }
            Some(report) = report_rx.recv() => {
                reconcile(&sessions, report, &mut inflight).await;
            }
            _ = shutdown_rx.recv() => {
                info!("Scheduler received shutdown signal");
                break;
            }
        }
    }

    info!("Scheduler stopped");
}

/// One scheduling pass over every active session
///
/// The concurrency cap is per orchestrator instance: freed and occupied
/// slots are counted across all sessions before any dispatch.
async fn tick(
    config: &SchedulerConfig,
    dispatcher: &Arc<dyn Apprentice>,
    sessions: &SessionMap,
    report_tx: &mpsc::Sender<WorkerReport>,
    inflight: &mut HashMap<(String, String), Instant>,
) {
    let handles: Vec<SessionHandle> = sessions.read().await.values().cloned().collect();

    // Fail dispatches that overran their deadline first, so the slots they
    // held are free for this pass.
    for handle in &handles {
        if let Err(e) = expire_overdue(config, handle, inflight).await {
            // Abort this session's step; last-known-good ledger is intact.
            error!("Timeout sweep aborted: {}", e);
        }
    }

    let mut in_progress = 0;
    for handle in &handles {
        in_progress += handle.snapshot().await.in_progress_count();
    }
    let mut slots = config.max_concurrent_workers.saturating_sub(in_progress);

    for handle in &handles {
        if let Err(e) = tick_session(dispatcher, handle, report_tx, inflight, &mut slots).await {
            error!("Scheduling pass aborted: {}", e);
        }
    }
}

/// Fail a session's dispatches that overran the deadline
async fn expire_overdue(
    config: &SchedulerConfig,
    handle: &SessionHandle,
    inflight: &mut HashMap<(String, String), Instant>,
) -> Result<()> {
    let ceremony_id = handle.ceremony_id().await;

    let overdue: Vec<String> = inflight
        .iter()
        .filter(|((cid, _), at)| *cid == ceremony_id && at.elapsed() >= config.worker_timeout)
        .map(|((_, tid), _)| tid.clone())
        .collect();
    for task_id in overdue {
        warn!(
            "Task {} of {} exceeded the {}s deadline; failing it",
            task_id,
            ceremony_id,
            config.worker_timeout.as_secs()
        );
        handle
            .apply(|s| {
                if let Some(task) = s.task_mut(&task_id) {
                    if task.status == TaskStatus::InProgress {
                        task.status = TaskStatus::Failed;
                        task.completed_at = Some(Utc::now());
                        task.error = Some(format!(
                            "Apprentice timed out after {} seconds",
                            config.worker_timeout.as_secs()
                        ));
                    }
                }
            })
            .await?;
        inflight.remove(&(ceremony_id.clone(), task_id));
    }
    Ok(())
}

/// Dispatch a session's eligible tasks into the remaining slots
async fn tick_session(
    dispatcher: &Arc<dyn Apprentice>,
    handle: &SessionHandle,
    report_tx: &mpsc::Sender<WorkerReport>,
    inflight: &mut HashMap<(String, String), Instant>,
    slots: &mut usize,
) -> Result<()> {
    let snap = handle.snapshot().await;
    if snap.status.is_terminal() {
        return Ok(());
    }
    let ceremony_id = snap.ceremony_id.clone();

    let ready: Vec<String> = resolver::eligible(&snap.tasks)
        .into_iter()
        .take(*slots)
        .map(String::from)
        .collect();
    for task_id in ready {
        dispatch_task(dispatcher, handle, &ceremony_id, &task_id, report_tx, inflight).await?;
        *slots = slots.saturating_sub(1);
    }

    evaluate_session(handle).await
}

/// Mark a task in progress and hand it to an apprentice
async fn dispatch_task(
    dispatcher: &Arc<dyn Apprentice>,
    handle: &SessionHandle,
    ceremony_id: &str,
    task_id: &str,
    report_tx: &mpsc::Sender<WorkerReport>,
    inflight: &mut HashMap<(String, String), Instant>,
) -> Result<()> {
    let apprentice = new_apprentice_id();
    let dispatched = handle
        .apply(|s| {
            if s.status == CeremonyStatus::Initiated {
                s.status = CeremonyStatus::InProgress;
            }
            let task = s.task_mut(task_id)?;
            if task.status != TaskStatus::Pending {
                return None;
            }
            task.status = TaskStatus::InProgress;
            task.assigned_to = Some(apprentice.clone());
            task.started_at = Some(Utc::now());
            Some(task.clone())
        })
        .await?;

    let Some(task) = dispatched else {
        return Ok(());
    };
    info!("Dispatched task {} of {} to {}", task_id, ceremony_id, apprentice);
    inflight.insert((ceremony_id.to_string(), task_id.to_string()), Instant::now());

    let dispatcher = dispatcher.clone();
    let report_tx = report_tx.clone();
    let ceremony_id = ceremony_id.to_string();
    tokio::spawn(async move {
        let outcome = dispatcher.execute(&task).await;
        let report = WorkerReport {
            ceremony_id,
            task_id: task.task_id.clone(),
            outcome,
        };
        if report_tx.send(report).await.is_err() {
            debug!("Scheduler gone; dropping outcome for {}", task.task_id);
        }
    });
    Ok(())
}

/// Fold an apprentice outcome back into its session
async fn reconcile(
    sessions: &SessionMap,
    report: WorkerReport,
    inflight: &mut HashMap<(String, String), Instant>,
) {
    let key = (report.ceremony_id.clone(), report.task_id.clone());
    if inflight.remove(&key).is_none() {
        // Task was already timeout-failed; terminal states are final.
        warn!(
            "Outcome for task {} of {} arrived after its deadline; discarding",
            report.task_id, report.ceremony_id
        );
        return;
    }

    let handle = sessions.read().await.get(&report.ceremony_id).cloned();
    let Some(handle) = handle else {
        warn!("Outcome for unknown ceremony {}; discarding", report.ceremony_id);
        return;
    };

    let applied = handle
        .apply(|s| {
            let Some(task) = s.task_mut(&report.task_id) else {
                return false;
            };
            if task.status != TaskStatus::InProgress {
                return false;
            }
            task.completed_at = Some(Utc::now());
            match &report.outcome {
                ApprenticeOutcome::Success { output } => {
                    task.status = TaskStatus::Complete;
                    task.output = Some(output.clone());
                }
                ApprenticeOutcome::Failure { error } => {
                    task.status = TaskStatus::Failed;
                    task.error = Some(error.clone());
                }
            }
            true
        })
        .await;

    match applied {
        Ok(true) => {
            info!("Task {} of {} reported its outcome", report.task_id, report.ceremony_id);
            if let Err(e) = evaluate_session(&handle).await {
                error!("Failed to re-evaluate ceremony {}: {}", report.ceremony_id, e);
            }
        }
        Ok(false) => {
            warn!(
                "Task {} of {} was not in progress; discarding outcome",
                report.task_id, report.ceremony_id
            );
        }
        Err(e) => {
            error!(
                "Failed to persist outcome for task {} of {}: {}",
                report.task_id, report.ceremony_id, e
            );
        }
    }
}

/// Re-evaluate a session's own status after task transitions
async fn evaluate_session(handle: &SessionHandle) -> Result<()> {
    let snap = handle.snapshot().await;
    if snap.status.is_terminal() {
        return Ok(());
    }

    if snap.all_complete() {
        handle
            .apply(|s| {
                s.status = CeremonyStatus::Complete;
                s.completed_at = Some(Utc::now());
            })
            .await?;
        info!("Ceremony {} complete", snap.ceremony_id);
    } else if resolver::is_stalled(&snap.tasks) {
        let stuck = resolver::unsatisfiable(&snap.tasks).join(", ");
        handle.apply(|s| s.status = CeremonyStatus::Blocked).await?;
        warn!(
            "Ceremony {} is blocked; tasks that can never run: [{}]",
            snap.ceremony_id, stuck
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_atelier_config() {
        let mut base = AtelierConfig::default();
        base.max_concurrent_workers = 7;
        base.worker_timeout = 60;
        base.poll_interval = 250;

        let config = SchedulerConfig::from(&base);
        assert_eq!(config.max_concurrent_workers, 7);
        assert_eq!(config.worker_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }
}
