//! Shared fixtures

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rollout::errors::OrchestratorError;
use rollout::gateway::{ExecutionGateway, ExecutionReport, ExecutionRequest};
use rollout::models::{EnvironmentId, InstallationId, TaskId, TenantId};
use rollout::notify::BroadcastNotifier;
use rollout::services::{InstallationService, NewEnvironment, NewTask};
use rollout::storage::MemoryStore;

pub struct Fixture {
    pub service: Arc<InstallationService>,
    pub notifier: Arc<BroadcastNotifier>,
}

pub fn fixture() -> Fixture {
    let notifier = Arc::new(BroadcastNotifier::default());
    let service = Arc::new(InstallationService::new(
        Arc::new(MemoryStore::new()),
        notifier.clone(),
    ));
    Fixture { service, notifier }
}

pub async fn create_environment(service: &InstallationService) -> EnvironmentId {
    service
        .create_environment(NewEnvironment {
            tenant_id: TenantId::new(),
            name: "staging".to_string(),
            server_host: "db01.staging.local".to_string(),
            connection_string: Some("Server=db01;Database=app".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
}

pub fn task(n: usize) -> NewTask {
    NewTask {
        name: format!("step {}", n),
        description: format!("Step number {}", n),
        script_ref: format!("scripts/step{}.sh", n),
        parameters: String::new(),
    }
}

/// Pending installation with `count` tasks
pub async fn pending_installation(
    service: &InstallationService,
    count: usize,
) -> (InstallationId, Vec<TaskId>) {
    let environment_id = create_environment(service).await;
    let installation = service
        .create_installation(environment_id, "5.0.2")
        .await
        .unwrap();

    let mut task_ids = Vec::new();
    for n in 1..=count {
        task_ids.push(service.append_task(installation.id(), task(n)).await.unwrap());
    }
    (installation.id(), task_ids)
}

/// Running installation with `count` tasks
pub async fn running_installation(
    service: &InstallationService,
    count: usize,
) -> (InstallationId, Vec<TaskId>) {
    let (id, task_ids) = pending_installation(service, count).await;
    service.start(id).await.unwrap();
    (id, task_ids)
}

/// Scriptable gateway recording every call
#[derive(Default)]
pub struct MockGateway {
    pub decline: AtomicBool,
    /// Number of upcoming `poll_status` calls that fail
    pub failing_polls: AtomicU32,
    started: Mutex<Vec<TaskId>>,
    cancelled: Mutex<Vec<TaskId>>,
    reports: Mutex<HashMap<TaskId, ExecutionReport>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> Vec<TaskId> {
        self.started.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<TaskId> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn set_report(&self, task_id: TaskId, report: ExecutionReport) {
        self.reports.lock().unwrap().insert(task_id, report);
    }

    pub fn set_status(&self, task_id: TaskId, status: &str) {
        self.set_report(task_id, ExecutionReport::new(status));
    }
}

#[async_trait]
impl ExecutionGateway for MockGateway {
    async fn start_execution(&self, request: &ExecutionRequest) -> Result<bool, OrchestratorError> {
        if self.decline.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.started.lock().unwrap().push(request.task_id);
        Ok(true)
    }

    async fn cancel_execution(&self, task_id: TaskId) -> Result<bool, OrchestratorError> {
        self.cancelled.lock().unwrap().push(task_id);
        Ok(true)
    }

    async fn poll_status(&self, task_id: TaskId) -> Result<ExecutionReport, OrchestratorError> {
        let remaining = self.failing_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_polls.store(remaining - 1, Ordering::SeqCst);
            return Err(OrchestratorError::GatewayError("connection refused".to_string()));
        }
        Ok(self
            .reports
            .lock()
            .unwrap()
            .get(&task_id)
            .cloned()
            .unwrap_or_else(|| ExecutionReport::new("running")))
    }
}
