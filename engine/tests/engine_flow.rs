// End-to-end flow: domain event -> trigger -> queue -> worker -> run history.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use relay_engine::config::EngineConfig;
use relay_engine::jobs::{InMemoryJobQueue, JobQueue, JobWorker};
use relay_engine::storage::{
    InMemoryEntityStore, InMemoryRunStore, InMemoryWorkflowStore, RecordingDispatcher, RunStore,
};
use relay_engine::workflows::{
    Action, Condition, RunStatus, ThresholdOperator, TriggerEvent, Workflow, WorkflowEngine,
};
use relay_engine::TenantContext;
use relay_shared::{Deal, Entity, User};

struct Harness {
    queue: Arc<InMemoryJobQueue>,
    workflows: Arc<InMemoryWorkflowStore>,
    runs: Arc<InMemoryRunStore>,
    entities: Arc<InMemoryEntityStore>,
    notifier: Arc<RecordingDispatcher>,
    engine: Arc<WorkflowEngine>,
    worker: JobWorker,
    tenant_id: Uuid,
}

fn harness() -> Harness {
    let queue = Arc::new(InMemoryJobQueue::new());
    let workflows = Arc::new(InMemoryWorkflowStore::new());
    let runs = Arc::new(InMemoryRunStore::new());
    let entities = Arc::new(InMemoryEntityStore::new());
    let notifier = Arc::new(RecordingDispatcher::new());
    let engine = Arc::new(WorkflowEngine::new(
        workflows.clone(),
        runs.clone(),
        entities.clone(),
        notifier.clone(),
        queue.clone(),
    ));
    let worker = JobWorker::new(
        queue.clone(),
        workflows.clone(),
        entities.clone(),
        engine.clone(),
        EngineConfig::default(),
    );
    Harness {
        queue,
        workflows,
        runs,
        entities,
        notifier,
        engine,
        worker,
        tenant_id: Uuid::new_v4(),
    }
}

fn deal(tenant_id: Uuid, amount: Decimal, assigned_to: Option<Uuid>) -> Deal {
    Deal {
        id: Uuid::new_v4(),
        tenant_id,
        title: "Acme Renewal".to_string(),
        status: "open".to_string(),
        amount,
        currency: "USD".to_string(),
        expected_close_date: None,
        lead_id: None,
        assigned_to,
        created_by: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn user(tenant_id: Uuid) -> User {
    User {
        id: Uuid::new_v4(),
        tenant_id,
        name: "Jordan".to_string(),
        email: "jordan@example.com".to_string(),
        is_active: true,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn high_value_deal_creates_follow_up_and_notifies() {
    let h = harness();
    let assignee = user(h.tenant_id);
    h.entities.add_user(assignee.clone());

    let workflow = Workflow::new(h.tenant_id, "High value follow up", "deal.created")
        .with_conditions(vec![Condition::ValueThreshold {
            field: "amount".to_string(),
            operator: ThresholdOperator::Gte,
            threshold: 1000.0,
        }])
        .with_actions(vec![
            Action::create_activity("Follow up on {{title}}"),
            Action::SendNotification {
                user_id: None,
                status: Some("new".to_string()),
            },
        ]);
    let workflow_id = workflow.id;
    h.workflows.add(workflow);

    let deal = deal(h.tenant_id, Decimal::new(500000, 2), Some(assignee.id));
    h.entities.add(Entity::Deal(deal.clone()));

    let tenant = TenantContext::new(h.tenant_id);
    let job_ids = h
        .engine
        .trigger(Some(&tenant), TriggerEvent::deal_created(deal))
        .await
        .unwrap();
    assert_eq!(job_ids.len(), 1);

    assert_eq!(h.worker.drain().await.unwrap(), 1);

    let runs = h.runs.list_recent(workflow_id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert!(runs[0].completed_at.is_some());
    assert_eq!(runs[0].trigger_type, "deal");
    assert_eq!(runs[0].execution_log.len(), 2);
    assert!(runs[0].execution_log.iter().all(|r| r.success));

    let activities = h.entities.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].subject, "Follow up on Acme Renewal");
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.notifier.sent()[0].0, assignee.id);
}

#[tokio::test]
async fn conditions_not_met_records_skipped_run() {
    let h = harness();
    let workflow = Workflow::new(h.tenant_id, "Whale alert", "deal.created")
        .with_conditions(vec![Condition::ValueThreshold {
            field: "amount".to_string(),
            operator: ThresholdOperator::Gte,
            threshold: 1_000_000.0,
        }])
        .with_actions(vec![Action::create_activity("Call the whale")]);
    let workflow_id = workflow.id;
    h.workflows.add(workflow);

    let deal = deal(h.tenant_id, Decimal::new(10000, 2), None);
    h.entities.add(Entity::Deal(deal.clone()));

    let tenant = TenantContext::new(h.tenant_id);
    h.engine
        .trigger(Some(&tenant), TriggerEvent::deal_created(deal))
        .await
        .unwrap();
    h.worker.drain().await.unwrap();

    let runs = h.runs.list_recent(workflow_id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].execution_log.len(), 1);
    assert_eq!(
        runs[0].execution_log[0].output,
        Some(json!({"message": "Conditions not met, workflow skipped"}))
    );
    assert!(h.entities.activities().is_empty());
}

#[tokio::test]
async fn trigger_enqueues_in_priority_order() {
    let h = harness();
    let low = Workflow::new(h.tenant_id, "Low", "deal.created").with_priority(1);
    let high = Workflow::new(h.tenant_id, "High", "deal.created").with_priority(10);
    let low_id = low.id;
    let high_id = high.id;
    h.workflows.add(low);
    h.workflows.add(high);

    let deal = deal(h.tenant_id, Decimal::new(10000, 2), None);
    h.entities.add(Entity::Deal(deal.clone()));

    let tenant = TenantContext::new(h.tenant_id);
    h.engine
        .trigger(Some(&tenant), TriggerEvent::deal_created(deal))
        .await
        .unwrap();

    let claimed = h.queue.claim(10).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert_eq!(claimed[0].workflow_id, high_id);
    assert_eq!(claimed[1].workflow_id, low_id);
}

#[tokio::test]
async fn other_tenants_workflows_do_not_fire() {
    let h = harness();
    let other_tenant = Uuid::new_v4();
    h.workflows
        .add(Workflow::new(other_tenant, "Foreign", "deal.created"));

    let deal = deal(h.tenant_id, Decimal::new(10000, 2), None);
    let tenant = TenantContext::new(h.tenant_id);
    let job_ids = h
        .engine
        .trigger(Some(&tenant), TriggerEvent::deal_created(deal))
        .await
        .unwrap();
    assert!(job_ids.is_empty());
    assert_eq!(h.queue.queued_len(), 0);
}

#[tokio::test]
async fn missing_tenant_context_is_a_silent_no_op() {
    let h = harness();
    h.workflows
        .add(Workflow::new(h.tenant_id, "Any", "deal.created"));

    let deal = deal(h.tenant_id, Decimal::new(10000, 2), None);
    let job_ids = h
        .engine
        .trigger(None, TriggerEvent::deal_created(deal))
        .await
        .unwrap();
    assert!(job_ids.is_empty());
    assert_eq!(h.queue.queued_len(), 0);
}

#[tokio::test]
async fn failing_action_marks_run_failed_but_later_actions_still_run() {
    let h = harness();
    let workflow = Workflow::new(h.tenant_id, "Mixed", "deal.created").with_actions(vec![
        // Targets a user that does not exist, so it fails.
        Action::assign_user(Uuid::new_v4()),
        Action::create_activity("Still happens"),
    ]);
    let workflow_id = workflow.id;
    h.workflows.add(workflow);

    let deal = deal(h.tenant_id, Decimal::new(10000, 2), None);
    h.entities.add(Entity::Deal(deal.clone()));

    let tenant = TenantContext::new(h.tenant_id);
    h.engine
        .trigger(Some(&tenant), TriggerEvent::deal_created(deal))
        .await
        .unwrap();
    h.worker.drain().await.unwrap();

    let runs = h.runs.list_recent(workflow_id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].execution_log.len(), 2);
    assert!(!runs[0].execution_log[0].success);
    assert!(runs[0].execution_log[1].success);
    assert_eq!(h.entities.activities().len(), 1);

    // An action failure is a business outcome, not an infrastructure fault:
    // the job completes and is never retried.
    assert_eq!(h.queue.completed().len(), 1);
    assert!(h.queue.dead_letters().is_empty());
    assert_eq!(h.queue.queued_len(), 0);
}

#[tokio::test]
async fn later_actions_see_earlier_mutations() {
    let h = harness();
    let workflow = Workflow::new(h.tenant_id, "Close out", "deal.created").with_actions(vec![
        Action::update_deal_status("won"),
        Action::create_activity("Deal {{title}} is {{status}}"),
    ]);
    h.workflows.add(workflow);

    let deal = deal(h.tenant_id, Decimal::new(10000, 2), None);
    h.entities.add(Entity::Deal(deal.clone()));

    let tenant = TenantContext::new(h.tenant_id);
    h.engine
        .trigger(Some(&tenant), TriggerEvent::deal_created(deal))
        .await
        .unwrap();
    h.worker.drain().await.unwrap();

    let activities = h.entities.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].subject, "Deal Acme Renewal is won");
}

#[tokio::test]
async fn status_change_workflow_updates_deal() {
    let h = harness();
    let workflow = Workflow::new(h.tenant_id, "Auto close out", "deal.status_changed")
        .with_conditions(vec![Condition::StatusChange {
            from_status: None,
            to_status: Some("won".to_string()),
        }])
        .with_actions(vec![Action::create_activity(
            "Send contract for {{title}}",
        )]);
    h.workflows.add(workflow);

    let mut deal = deal(h.tenant_id, Decimal::new(10000, 2), None);
    deal.status = "won".to_string();
    h.entities.add(Entity::Deal(deal.clone()));

    let tenant = TenantContext::new(h.tenant_id);
    h.engine
        .trigger(
            Some(&tenant),
            TriggerEvent::deal_status_changed(deal, "open", "won"),
        )
        .await
        .unwrap();
    h.worker.drain().await.unwrap();

    let activities = h.entities.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].subject, "Send contract for Acme Renewal");
}
