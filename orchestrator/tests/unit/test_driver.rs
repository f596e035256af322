//! Driver worker tests

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rollout::gateway::ExecutionReport;
use rollout::models::{EnvironmentId, Installation, InstallationStatus, TaskStatus};
use rollout::notify::BroadcastNotifier;
use rollout::services::InstallationService;
use rollout::storage::{InstallationRepository, MemoryStore};
use rollout::utils::CooldownOptions;
use rollout::workers::driver::{self, Driver, StepOutcome};

use crate::support::{fixture, running_installation, Fixture, MockGateway};

fn options() -> driver::Options {
    driver::Options {
        interval: Duration::from_millis(10),
        task_timeout: Duration::from_secs(3600),
        max_gateway_attempts: 3,
        cooldown: CooldownOptions {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 2.0,
        },
    }
}

fn driver_for(fx: &Fixture, gateway: &Arc<MockGateway>, options: driver::Options) -> Driver {
    Driver::new(options, fx.service.clone(), gateway.clone())
}

#[tokio::test]
async fn test_runs_tasks_in_order() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 2).await;
    let mut driver = driver_for(&fx, &gateway, options());

    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskStarted(task_ids[0]))]);
    let installation = fx.service.get_installation(id).await.unwrap();
    assert_eq!(installation.running_task().map(|t| t.id()), Some(task_ids[0]));

    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskRunning(task_ids[0]))]);

    gateway.set_status(task_ids[0], "succeeded");
    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskCompleted(task_ids[0]))]);

    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskStarted(task_ids[1]))]);

    gateway.set_status(task_ids[1], "completed");
    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskCompleted(task_ids[1]))]);

    let installation = fx.service.get_installation(id).await.unwrap();
    assert_eq!(installation.status(), InstallationStatus::Completed);
    assert_eq!(installation.progress_percentage(), 100);
    assert_eq!(gateway.started(), task_ids);
    assert!(gateway.cancelled().is_empty());
    assert_eq!(driver.in_flight_count(), 0);

    // nothing left to drive
    assert!(driver.tick().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_forwards_progress() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 1).await;
    let mut driver = driver_for(&fx, &gateway, options());

    driver.tick().await.unwrap();

    let mut report = ExecutionReport::new("running");
    report.progress = Some(40);
    report.message = Some("copying files".to_string());
    gateway.set_report(task_ids[0], report);

    driver.tick().await.unwrap();
    let installation = fx.service.get_installation(id).await.unwrap();
    let task = installation.task(task_ids[0]).unwrap();
    assert_eq!(task.progress(), 40);
    assert_eq!(task.logs().last().unwrap().message, "copying files");

    // an unchanged report is not logged twice
    driver.tick().await.unwrap();
    let installation = fx.service.get_installation(id).await.unwrap();
    assert_eq!(installation.task(task_ids[0]).unwrap().logs().len(), 1);
}

#[tokio::test]
async fn test_failed_execution_fails_installation() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 2).await;
    let mut driver = driver_for(&fx, &gateway, options());

    driver.tick().await.unwrap();

    let mut report = ExecutionReport::new("failed");
    report.error = Some("exit code 3: permission denied".to_string());
    gateway.set_report(task_ids[0], report);

    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskFailed(task_ids[0]))]);

    let installation = fx.service.get_installation(id).await.unwrap();
    assert_eq!(installation.status(), InstallationStatus::Failed);
    assert!(installation
        .error_message()
        .unwrap()
        .contains("permission denied"));
    assert_eq!(installation.task(task_ids[1]).unwrap().status(), TaskStatus::Pending);
    assert_eq!(gateway.started(), vec![task_ids[0]]);
}

#[tokio::test]
async fn test_declined_execution_fails_task() {
    let fx = fixture();
    let gateway = MockGateway::new();
    gateway.decline.store(true, Ordering::SeqCst);
    let (id, task_ids) = running_installation(&fx.service, 1).await;
    let mut driver = driver_for(&fx, &gateway, options());

    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskFailed(task_ids[0]))]);

    let installation = fx.service.get_installation(id).await.unwrap();
    assert_eq!(installation.status(), InstallationStatus::Failed);
    assert!(installation.error_message().unwrap().contains("declined"));
}

#[tokio::test]
async fn test_cancelled_installation_stops_execution() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 2).await;
    let mut driver = driver_for(&fx, &gateway, options());

    driver.tick().await.unwrap();
    assert_eq!(driver.in_flight_count(), 1);

    fx.service.cancel(id).await.unwrap();

    let outcomes = driver.tick().await.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(gateway.cancelled(), vec![task_ids[0]]);
    assert_eq!(driver.in_flight_count(), 0);

    let installation = fx.service.get_installation(id).await.unwrap();
    assert_eq!(installation.status(), InstallationStatus::Cancelled);
    assert_eq!(installation.task(task_ids[1]).unwrap().status(), TaskStatus::Skipped);
}

#[tokio::test]
async fn test_transient_gateway_errors_are_retried() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 1).await;
    let mut driver = driver_for(&fx, &gateway, options());

    driver.tick().await.unwrap();

    gateway.failing_polls.store(2, Ordering::SeqCst);
    for _ in 0..2 {
        let outcomes = driver.tick().await.unwrap();
        assert_eq!(outcomes, vec![(id, StepOutcome::Retrying(task_ids[0]))]);
    }

    gateway.set_status(task_ids[0], "success");
    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskCompleted(task_ids[0]))]);
    assert_eq!(
        fx.service.get_installation(id).await.unwrap().status(),
        InstallationStatus::Completed
    );
}

#[tokio::test]
async fn test_gateway_gives_up_after_max_attempts() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 1).await;
    let mut driver = driver_for(&fx, &gateway, options());

    driver.tick().await.unwrap();

    gateway.failing_polls.store(10, Ordering::SeqCst);
    driver.tick().await.unwrap();
    driver.tick().await.unwrap();
    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskFailed(task_ids[0]))]);

    let installation = fx.service.get_installation(id).await.unwrap();
    assert_eq!(installation.status(), InstallationStatus::Failed);
    assert!(installation
        .error_message()
        .unwrap()
        .contains("Execution gateway unavailable"));
    assert_eq!(gateway.cancelled(), vec![task_ids[0]]);
}

#[tokio::test]
async fn test_missing_environment_counts_as_failed_attempt() {
    let store = Arc::new(MemoryStore::new());
    let mut installation = Installation::new(EnvironmentId::new(), "4.0.0").unwrap();
    let task_id = installation
        .append_task("migrate", "", "scripts/migrate.sh", "")
        .unwrap();
    installation.start().unwrap();
    store.add_installation(&installation).await.unwrap();
    let id = installation.id();

    let service = Arc::new(InstallationService::new(
        store,
        Arc::new(BroadcastNotifier::default()),
    ));
    let gateway = MockGateway::new();
    let mut driver = Driver::new(options(), service.clone(), gateway.clone());

    for _ in 0..2 {
        let outcomes = driver.tick().await.unwrap();
        assert_eq!(outcomes, vec![(id, StepOutcome::Retrying(task_id))]);
    }
    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskFailed(task_id))]);
    assert_eq!(driver.in_flight_count(), 0);

    let installation = service.get_installation(id).await.unwrap();
    assert_eq!(installation.status(), InstallationStatus::Failed);
    assert!(installation
        .error_message()
        .unwrap()
        .contains("Unable to submit task"));
    assert!(gateway.started().is_empty());
}

#[tokio::test]
async fn test_timed_out_task_is_cancelled() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 1).await;
    let mut driver = driver_for(
        &fx,
        &gateway,
        driver::Options {
            task_timeout: Duration::ZERO,
            ..options()
        },
    );

    driver.tick().await.unwrap();
    let outcomes = driver.tick().await.unwrap();
    assert_eq!(outcomes, vec![(id, StepOutcome::TaskFailed(task_ids[0]))]);
    assert_eq!(gateway.cancelled(), vec![task_ids[0]]);

    let installation = fx.service.get_installation(id).await.unwrap();
    assert!(installation.error_message().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_pending_installations_are_left_alone() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, _) = crate::support::pending_installation(&fx.service, 1).await;
    let mut driver = driver_for(&fx, &gateway, options());

    assert!(driver.tick().await.unwrap().is_empty());
    assert!(gateway.started().is_empty());
    assert_eq!(
        fx.service.get_installation(id).await.unwrap().status(),
        InstallationStatus::Pending
    );
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let fx = fixture();
    let gateway = MockGateway::new();
    let (id, task_ids) = running_installation(&fx.service, 1).await;
    gateway.set_status(task_ids[0], "succeeded");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let service = fx.service.clone();
    let worker_gateway = gateway.clone();
    let handle = tokio::spawn(async move {
        driver::run(
            &options(),
            service,
            worker_gateway,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.await;
            }),
        )
        .await;
    });

    let mut status = InstallationStatus::Running;
    for _ in 0..200 {
        status = fx.service.get_installation(id).await.unwrap().status();
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, InstallationStatus::Completed);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
