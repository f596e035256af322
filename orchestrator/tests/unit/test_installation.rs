//! Installation aggregate tests

use rollout::errors::OrchestratorError;
use rollout::models::installation::CANCELLATION_REASON;
use rollout::models::{
    EnvironmentId, Installation, InstallationEvent, InstallationStatus, TaskId, TaskStatus,
};

fn installation_with_tasks(count: usize) -> (Installation, Vec<TaskId>) {
    let mut installation = Installation::new(EnvironmentId::new(), "3.1.0").unwrap();
    let ids = (1..=count)
        .map(|n| {
            installation
                .append_task(format!("step {}", n), "", format!("scripts/step{}.sh", n), "")
                .unwrap()
        })
        .collect();
    (installation, ids)
}

fn started(count: usize) -> (Installation, Vec<TaskId>) {
    let (mut installation, ids) = installation_with_tasks(count);
    installation.start().unwrap();
    (installation, ids)
}

#[test]
fn test_append_assigns_sequential_order() {
    let (installation, ids) = installation_with_tasks(4);

    let orders: Vec<u32> = installation.tasks().iter().map(|t| t.order()).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);

    let stored_ids: Vec<TaskId> = installation.tasks().iter().map(|t| t.id()).collect();
    assert_eq!(stored_ids, ids);
    assert!(installation
        .tasks()
        .iter()
        .all(|t| t.status() == TaskStatus::Pending));
}

#[test]
fn test_start_without_tasks_fails() {
    let mut installation = Installation::new(EnvironmentId::new(), "3.1.0").unwrap();
    let err = installation.start().unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
    assert_eq!(installation.status(), InstallationStatus::Pending);
}

#[test]
fn test_start_succeeds_once() {
    let (mut installation, _) = installation_with_tasks(1);

    let events = installation.start().unwrap();
    assert_eq!(
        events,
        vec![InstallationEvent::InstallationStarted {
            installation_id: installation.id(),
            environment_id: installation.environment_id(),
        }]
    );
    assert_eq!(installation.status(), InstallationStatus::Running);
    assert!(installation.started_at().is_some());

    let err = installation.start().unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
}

#[test]
fn test_append_after_start_leaves_tasks_unchanged() {
    let (mut installation, _) = started(2);
    let version = installation.version();

    let err = installation
        .append_task("late", "", "late.sh", "")
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
    assert_eq!(installation.tasks().len(), 2);
    assert_eq!(installation.version(), version);
}

#[test]
fn test_complete_in_order_then_finish() {
    let (mut installation, ids) = started(2);

    installation.start_task(ids[0]).unwrap();
    let events = installation.complete_task(ids[0]).unwrap();
    assert_eq!(
        events,
        vec![InstallationEvent::InstallationTaskCompleted {
            installation_id: installation.id(),
            task_id: ids[0],
            status: TaskStatus::Completed,
        }]
    );
    assert_eq!(installation.status(), InstallationStatus::Running);
    assert_eq!(installation.next_pending_task().map(|t| t.id()), Some(ids[1]));
    assert_eq!(installation.progress_percentage(), 50);

    installation.start_task(ids[1]).unwrap();
    let events = installation.complete_task(ids[1]).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        InstallationEvent::InstallationCompleted {
            installation_id: installation.id(),
            success: true,
        }
    );
    assert_eq!(installation.status(), InstallationStatus::Completed);
    assert!(installation.completed_at().is_some());
    assert_eq!(installation.progress_percentage(), 100);
    assert!(installation.next_pending_task().is_none());
}

#[test]
fn test_fail_task_fails_installation_immediately() {
    let (mut installation, ids) = started(2);

    installation.start_task(ids[0]).unwrap();
    let events = installation.fail_task(ids[0], "disk full").unwrap();

    assert_eq!(
        events,
        vec![
            InstallationEvent::InstallationTaskCompleted {
                installation_id: installation.id(),
                task_id: ids[0],
                status: TaskStatus::Failed,
            },
            InstallationEvent::InstallationCompleted {
                installation_id: installation.id(),
                success: false,
            },
        ]
    );
    assert_eq!(installation.status(), InstallationStatus::Failed);
    let message = installation.error_message().unwrap();
    assert!(message.contains("step 1"));
    assert!(message.contains("disk full"));

    let untouched = installation.task(ids[1]).unwrap();
    assert_eq!(untouched.status(), TaskStatus::Pending);
    assert!(untouched.logs().is_empty());
}

#[test]
fn test_fail_task_requires_message() {
    let (mut installation, ids) = started(1);
    installation.start_task(ids[0]).unwrap();

    let err = installation.fail_task(ids[0], "  ").unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    assert_eq!(installation.status(), InstallationStatus::Running);
}

#[test]
fn test_outcome_for_task_not_running_is_rejected() {
    let (mut installation, ids) = started(2);
    let version = installation.version();

    let err = installation.complete_task(ids[0]).unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
    let err = installation.fail_task(ids[1], "boom").unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));

    assert_eq!(installation.version(), version);
    assert_eq!(installation.task(ids[0]).unwrap().status(), TaskStatus::Pending);
}

#[test]
fn test_unknown_task_is_not_found() {
    let (mut installation, _) = started(1);
    let unknown = TaskId::new();

    assert!(matches!(
        installation.complete_task(unknown).unwrap_err(),
        OrchestratorError::EntityNotFound(_)
    ));
    assert!(matches!(
        installation.fail_task(unknown, "boom").unwrap_err(),
        OrchestratorError::EntityNotFound(_)
    ));
    assert!(matches!(
        installation.start_task(unknown).unwrap_err(),
        OrchestratorError::EntityNotFound(_)
    ));
}

#[test]
fn test_tasks_start_strictly_in_order() {
    let (mut installation, ids) = started(3);

    let err = installation.start_task(ids[1]).unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));

    installation.start_task(ids[0]).unwrap();
    assert_eq!(installation.running_task().map(|t| t.id()), Some(ids[0]));

    // only one task runs at a time
    let err = installation.start_task(ids[1]).unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
}

#[test]
fn test_finished_task_cannot_start_again() {
    let (mut installation, ids) = started(2);
    installation.start_task(ids[0]).unwrap();
    installation.complete_task(ids[0]).unwrap();

    let err = installation.start_task(ids[0]).unwrap_err();
    match err {
        OrchestratorError::BusinessRuleViolation(message) => {
            assert!(message.contains("completed"), "{}", message);
            assert!(!message.contains("must run before"), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(installation.task(ids[0]).unwrap().status(), TaskStatus::Completed);
    assert_eq!(installation.task(ids[1]).unwrap().status(), TaskStatus::Pending);
}

#[test]
fn test_start_task_requires_running_installation() {
    let (mut installation, ids) = installation_with_tasks(1);
    let err = installation.start_task(ids[0]).unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
}

#[test]
fn test_report_progress() {
    let (mut installation, ids) = started(1);
    installation.start_task(ids[0]).unwrap();

    installation
        .report_task_progress(ids[0], 60, Some("schema migrated"))
        .unwrap();
    let task = installation.task(ids[0]).unwrap();
    assert_eq!(task.progress(), 60);
    assert_eq!(task.status(), TaskStatus::Running);
    assert_eq!(task.logs().last().unwrap().message, "schema migrated");

    let err = installation
        .report_task_progress(ids[0], 101, None)
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    assert_eq!(installation.task(ids[0]).unwrap().progress(), 60);
}

#[test]
fn test_cancel_running_installation() {
    let (mut installation, ids) = started(2);
    installation.start_task(ids[0]).unwrap();

    let events = installation.cancel().unwrap();
    assert_eq!(
        events,
        vec![InstallationEvent::InstallationCompleted {
            installation_id: installation.id(),
            success: false,
        }]
    );
    assert_eq!(installation.status(), InstallationStatus::Cancelled);
    assert!(installation.completed_at().is_some());

    let running = installation.task(ids[0]).unwrap();
    assert_eq!(running.status(), TaskStatus::Failed);
    assert_eq!(running.error_message(), Some(CANCELLATION_REASON));

    let pending = installation.task(ids[1]).unwrap();
    assert_eq!(pending.status(), TaskStatus::Skipped);
    assert!(pending.completed_at().is_some());
}

#[test]
fn test_cancel_pending_installation_and_double_cancel() {
    let (mut installation, ids) = installation_with_tasks(1);

    installation.cancel().unwrap();
    assert_eq!(installation.status(), InstallationStatus::Cancelled);
    assert_eq!(installation.task(ids[0]).unwrap().status(), TaskStatus::Skipped);

    let err = installation.cancel().unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
}

#[test]
fn test_terminal_installation_rejects_outcomes() {
    let (mut installation, ids) = started(2);
    installation.start_task(ids[0]).unwrap();
    installation.cancel().unwrap();

    let err = installation.complete_task(ids[0]).unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
    let err = installation.start().unwrap_err();
    assert!(matches!(err, OrchestratorError::BusinessRuleViolation(_)));
}

#[test]
fn test_progress_ignores_failed_and_pending() {
    let (mut installation, ids) = started(3);

    installation.start_task(ids[0]).unwrap();
    installation.complete_task(ids[0]).unwrap();
    installation.start_task(ids[1]).unwrap();
    installation.fail_task(ids[1], "timeout").unwrap();

    assert_eq!(installation.task(ids[2]).unwrap().status(), TaskStatus::Pending);
    assert_eq!(installation.progress_percentage(), 33);
}

#[test]
fn test_version_bumps_on_every_mutation() {
    let (mut installation, ids) = installation_with_tasks(1);
    assert_eq!(installation.version(), 1);

    installation.start().unwrap();
    assert_eq!(installation.version(), 2);
    installation.start_task(ids[0]).unwrap();
    assert_eq!(installation.version(), 3);
    installation.report_task_progress(ids[0], 10, None).unwrap();
    assert_eq!(installation.version(), 4);
    installation.complete_task(ids[0]).unwrap();
    assert_eq!(installation.version(), 5);
}

#[test]
fn test_events_serialize_with_type_tag() {
    let (mut installation, _) = installation_with_tasks(1);
    let events = installation.start().unwrap();

    let json = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(json["type"], "installation_started");
    assert_eq!(events[0].event_type(), "installation_started");
    assert_eq!(events[0].installation_id(), installation.id());
}
