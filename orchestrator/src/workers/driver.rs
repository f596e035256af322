//! Driver worker
//!
//! Pushes running installations forward one task at a time: starts the next
//! pending task on the execution gateway, polls it, and reports the outcome
//! back to the installation. Retries of gateway calls live here, never in
//! the installation itself.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::errors::OrchestratorError;
use crate::gateway::{ExecutionGateway, ExecutionPhase, ExecutionReport, ExecutionRequest};
use crate::models::{Installation, InstallationId, InstallationTask, TaskId, TaskStatus};
use crate::services::InstallationService;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Driver worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between two passes
    pub interval: Duration,

    /// A task running longer than this is cancelled and failed
    pub task_timeout: Duration,

    /// Consecutive gateway failures tolerated per task
    pub max_gateway_attempts: u32,

    /// Backoff between gateway retries
    pub cooldown: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            task_timeout: Duration::from_secs(3600),
            max_gateway_attempts: 5,
            cooldown: CooldownOptions::default(),
        }
    }
}

/// What one pass did to an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do
    Idle,
    TaskStarted(TaskId),
    TaskRunning(TaskId),
    TaskCompleted(TaskId),
    TaskFailed(TaskId),
    /// A gateway call failed and will be retried after a cooldown
    Retrying(TaskId),
}

#[derive(Debug, Clone)]
struct InFlight {
    task_id: TaskId,
    accepted: bool,
    failures: u32,
    retry_after: Option<DateTime<Utc>>,
    last_progress: Option<u8>,
}

impl InFlight {
    fn new(task_id: TaskId, accepted: bool) -> Self {
        Self {
            task_id,
            accepted,
            failures: 0,
            retry_after: None,
            last_progress: None,
        }
    }
}

/// Sequential driver over all running installations
pub struct Driver {
    options: Options,
    service: Arc<InstallationService>,
    gateway: Arc<dyn ExecutionGateway>,
    in_flight: HashMap<InstallationId, InFlight>,
}

impl Driver {
    pub fn new(
        options: Options,
        service: Arc<InstallationService>,
        gateway: Arc<dyn ExecutionGateway>,
    ) -> Self {
        Self {
            options,
            service,
            gateway,
            in_flight: HashMap::new(),
        }
    }

    /// Number of executions the driver is currently tracking
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// One pass: stop executions of installations that ended elsewhere, then
    /// advance every running installation by one step.
    pub async fn tick(&mut self) -> Result<Vec<(InstallationId, StepOutcome)>, OrchestratorError> {
        self.sweep_finished().await;

        let mut outcomes = Vec::new();
        for installation in self.service.list_running().await? {
            let id = installation.id();
            match self.drive(installation).await {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(e) if e.is_domain() => {
                    // the installation changed under us (cancelled, most likely)
                    warn!("Installation {} moved on while driving it: {}", id, e);
                }
                Err(e) => {
                    error!("Failed to drive installation {}: {}", id, e);
                }
            }
        }
        Ok(outcomes)
    }

    async fn sweep_finished(&mut self) {
        let tracked: Vec<(InstallationId, TaskId)> = self
            .in_flight
            .iter()
            .map(|(id, entry)| (*id, entry.task_id))
            .collect();

        for (installation_id, task_id) in tracked {
            let still_running = match self.service.get_installation(installation_id).await {
                Ok(installation) => installation
                    .task(task_id)
                    .is_some_and(|t| t.status() == TaskStatus::Running),
                Err(OrchestratorError::EntityNotFound(_)) => false,
                Err(e) => {
                    error!("Failed to load installation {}: {}", installation_id, e);
                    continue;
                }
            };
            if still_running {
                continue;
            }

            info!(
                "Installation {} stopped task {}, cancelling its execution",
                installation_id, task_id
            );
            match self.gateway.cancel_execution(task_id).await {
                Ok(accepted) => debug!("Cancel of task {} accepted: {}", task_id, accepted),
                Err(e) => warn!("Failed to cancel execution of task {}: {}", task_id, e),
            }
            self.in_flight.remove(&installation_id);
        }
    }

    async fn drive(&mut self, installation: Installation) -> Result<StepOutcome, OrchestratorError> {
        if let Some(task) = installation.running_task() {
            return self.observe(&installation, task).await;
        }
        if let Some(task) = installation.next_pending_task() {
            return self.launch(&installation, task).await;
        }
        Ok(StepOutcome::Idle)
    }

    async fn launch(
        &mut self,
        installation: &Installation,
        task: &InstallationTask,
    ) -> Result<StepOutcome, OrchestratorError> {
        info!(
            "Starting task {} '{}' ({}/{}) of installation {}",
            task.id(),
            task.name(),
            task.order(),
            installation.tasks().len(),
            installation.id()
        );
        self.service.start_task(installation.id(), task.id()).await?;
        self.in_flight
            .insert(installation.id(), InFlight::new(task.id(), false));

        self.submit(installation, task).await
    }

    async fn submit(
        &mut self,
        installation: &Installation,
        task: &InstallationTask,
    ) -> Result<StepOutcome, OrchestratorError> {
        let environment = match self
            .service
            .get_environment(installation.environment_id())
            .await
        {
            Ok(environment) => environment,
            Err(e) => return self.gateway_failure(installation.id(), task.id(), e).await,
        };
        let request = ExecutionRequest::new(task, &environment);

        match self.gateway.start_execution(&request).await {
            Ok(true) => {
                if let Some(entry) = self.in_flight.get_mut(&installation.id()) {
                    entry.accepted = true;
                    entry.failures = 0;
                    entry.retry_after = None;
                }
                Ok(StepOutcome::TaskStarted(task.id()))
            }
            Ok(false) => {
                self.finish_failed(installation.id(), task.id(), "Execution gateway declined the task")
                    .await
            }
            Err(e) => self.gateway_failure(installation.id(), task.id(), e).await,
        }
    }

    async fn observe(
        &mut self,
        installation: &Installation,
        task: &InstallationTask,
    ) -> Result<StepOutcome, OrchestratorError> {
        let id = installation.id();
        let entry = self
            .in_flight
            .entry(id)
            // picked up after a restart: assume the executor has it
            .or_insert_with(|| InFlight::new(task.id(), true))
            .clone();

        if let Some(started_at) = task.started_at() {
            let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();
            if elapsed >= self.options.task_timeout {
                warn!("Task {} timed out after {:?}", task.id(), elapsed);
                if let Err(e) = self.gateway.cancel_execution(task.id()).await {
                    warn!("Failed to cancel timed out task {}: {}", task.id(), e);
                }
                let reason = format!(
                    "Task timed out after {}s",
                    self.options.task_timeout.as_secs()
                );
                return self.finish_failed(id, task.id(), &reason).await;
            }
        }

        if entry.retry_after.is_some_and(|at| Utc::now() < at) {
            return Ok(StepOutcome::Retrying(task.id()));
        }

        if !entry.accepted {
            return self.submit(installation, task).await;
        }

        let report = match self.gateway.poll_status(task.id()).await {
            Ok(report) => report,
            Err(e) => return self.gateway_failure(id, task.id(), e).await,
        };
        debug!("Task {} reported {}", task.id(), report.status);

        match report.phase() {
            ExecutionPhase::Succeeded => {
                self.in_flight.remove(&id);
                self.service.complete_task(id, task.id()).await?;
                info!("Task {} '{}' completed", task.id(), task.name());
                Ok(StepOutcome::TaskCompleted(task.id()))
            }
            ExecutionPhase::Failed => {
                let reason = failure_reason(&report, "Execution failed");
                self.finish_failed(id, task.id(), &reason).await
            }
            ExecutionPhase::Cancelled => {
                self.finish_failed(id, task.id(), "Execution was cancelled by the executor")
                    .await
            }
            ExecutionPhase::Queued | ExecutionPhase::Running => {
                self.forward_progress(id, task, &report).await?;
                Ok(StepOutcome::TaskRunning(task.id()))
            }
            ExecutionPhase::Unknown => {
                let err = OrchestratorError::GatewayError(format!(
                    "Unrecognised execution status '{}'",
                    report.status
                ));
                self.gateway_failure(id, task.id(), err).await
            }
        }
    }

    async fn forward_progress(
        &mut self,
        id: InstallationId,
        task: &InstallationTask,
        report: &ExecutionReport,
    ) -> Result<(), OrchestratorError> {
        let Some(entry) = self.in_flight.get_mut(&id) else {
            return Ok(());
        };
        entry.failures = 0;
        entry.retry_after = None;

        let Some(progress) = report.progress else {
            return Ok(());
        };
        if entry.last_progress == Some(progress) {
            return Ok(());
        }
        entry.last_progress = Some(progress);

        self.service
            .report_progress(id, task.id(), progress.min(100), report.message.as_deref())
            .await?;
        Ok(())
    }

    async fn gateway_failure(
        &mut self,
        id: InstallationId,
        task_id: TaskId,
        err: OrchestratorError,
    ) -> Result<StepOutcome, OrchestratorError> {
        let max_attempts = self.options.max_gateway_attempts;
        let entry = self
            .in_flight
            .entry(id)
            .or_insert_with(|| InFlight::new(task_id, false));
        entry.failures += 1;

        if entry.failures >= max_attempts {
            error!(
                "Giving up on task {} after {} gateway failures: {}",
                task_id, entry.failures, err
            );
            if let Err(e) = self.gateway.cancel_execution(task_id).await {
                debug!("Best effort cancel of task {} failed: {}", task_id, e);
            }
            let reason = match err {
                OrchestratorError::GatewayError(_)
                | OrchestratorError::HttpError(_)
                | OrchestratorError::IoError(_) => format!("Execution gateway unavailable: {}", err),
                _ => format!("Unable to submit task: {}", err),
            };
            return self.finish_failed(id, task_id, &reason).await;
        }

        let delay = calc_exp_backoff(&self.options.cooldown, entry.failures - 1);
        entry.retry_after = Some(
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
        );
        warn!(
            "Gateway call for task {} failed (attempt {}/{}), retrying in {:?}: {}",
            task_id, entry.failures, max_attempts, delay, err
        );
        Ok(StepOutcome::Retrying(task_id))
    }

    async fn finish_failed(
        &mut self,
        id: InstallationId,
        task_id: TaskId,
        reason: &str,
    ) -> Result<StepOutcome, OrchestratorError> {
        self.in_flight.remove(&id);
        self.service.fail_task(id, task_id, reason).await?;
        warn!("Task {} failed: {}", task_id, reason);
        Ok(StepOutcome::TaskFailed(task_id))
    }
}

fn failure_reason(report: &ExecutionReport, fallback: &str) -> String {
    report
        .error
        .clone()
        .or_else(|| report.message.clone())
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Run the driver worker
pub async fn run<S, F>(
    options: &Options,
    service: Arc<InstallationService>,
    gateway: Arc<dyn ExecutionGateway>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Driver worker starting...");

    let mut driver = Driver::new(options.clone(), service, gateway);

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Driver worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        match driver.tick().await {
            Ok(outcomes) => {
                let active = outcomes
                    .iter()
                    .filter(|(_, outcome)| *outcome != StepOutcome::Idle)
                    .count();
                if active > 0 {
                    debug!("Driver pass advanced {} installation(s)", active);
                }
            }
            Err(e) => {
                error!("Driver pass failed: {}", e);
            }
        }
    }
}
