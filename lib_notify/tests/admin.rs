//! Administrative operations over in-memory repositories.

mod common;

use std::time::Duration;

use common::{notices, Harness};
use lib_notify::core::{
    ready_channel, AdminError, CycleOutcome, NoticeAdmin, Scheduler, SchedulerHandle,
};
use lib_notify::model::{AuditAction, TenantId};
use lib_notify::repository::TenantRegistry;
use tokio::sync::broadcast;

fn admin(h: &Harness, scheduler: SchedulerHandle) -> NoticeAdmin {
    NoticeAdmin::new(
        h.tenants.clone(),
        h.subscribers.clone(),
        h.seen.clone(),
        h.audit.clone(),
        h.rebaseline.clone(),
        scheduler,
    )
}

#[tokio::test]
async fn tenant_lifecycle_is_audited() {
    let h = Harness::new();
    let (_scheduler, handle) = Scheduler::new(h.detector(), Duration::from_secs(300));
    let admin = admin(&h, handle);
    let tenant: TenantId = "guild-1".into();

    let joined = admin.register_tenant(&tenant, "Campus").await.unwrap();
    assert!(!joined.enabled);
    assert!(joined.delivery_target.is_none());

    assert!(matches!(
        admin.resume(&tenant, "mod").await,
        Err(AdminError::NotConfigured(_))
    ));

    let configured = admin
        .configure(&tenant, "https://hooks.example/guild-1", "mod")
        .await
        .unwrap();
    assert!(configured.is_deliverable());

    let paused = admin.pause(&tenant, "mod").await.unwrap();
    assert!(!paused.enabled);
    assert_eq!(paused.delivery_target.as_deref(), Some("https://hooks.example/guild-1"));

    let resumed = admin.resume(&tenant, "mod").await.unwrap();
    assert!(resumed.enabled);

    admin.tenant_removed(&tenant, "Campus").await;

    let actions: Vec<_> = h.audit.entries().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::TenantJoined,
            AuditAction::Configured,
            AuditAction::Paused,
            AuditAction::Resumed,
            AuditAction::TenantRemoved,
        ]
    );
    assert_eq!(h.audit.entries()[1].actor_id.as_deref(), Some("mod"));
}

#[tokio::test]
async fn rejoining_disables_but_keeps_the_target() {
    let h = Harness::new();
    let (_scheduler, handle) = Scheduler::new(h.detector(), Duration::from_secs(300));
    let admin = admin(&h, handle);
    let tenant: TenantId = "guild-1".into();

    admin.configure(&tenant, "https://hooks.example/g", "mod").await.unwrap();
    let rejoined = admin.register_tenant(&tenant, "Campus").await.unwrap();

    assert!(!rejoined.enabled);
    assert_eq!(rejoined.delivery_target.as_deref(), Some("https://hooks.example/g"));
    assert!(h.tenants.list_enabled_with_target().await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_target_is_rejected() {
    let h = Harness::new();
    let (_scheduler, handle) = Scheduler::new(h.detector(), Duration::from_secs(300));
    let admin = admin(&h, handle);

    assert!(matches!(
        admin.configure(&"g".into(), "   ", "mod").await,
        Err(AdminError::EmptyTarget)
    ));
}

#[tokio::test]
async fn subscriber_management() {
    let h = Harness::new();
    let (_scheduler, handle) = Scheduler::new(h.detector(), Duration::from_secs(300));
    let admin = admin(&h, handle);
    let tenant: TenantId = "g".into();

    assert!(admin.add_subscriber(&tenant, "10", "Students", "mod").await.unwrap());
    assert!(!admin.add_subscriber(&tenant, "10", "Students", "mod").await.unwrap());
    assert!(admin.add_subscriber(&tenant, "20", "Staff", "mod").await.unwrap());

    let listed = admin.list_subscribers(&tenant).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|s| s.subscriber_id.as_str()).collect();
    assert_eq!(ids, vec!["10", "20"]);
    assert_eq!(listed[0].added_by.as_deref(), Some("mod"));

    assert!(admin.remove_subscriber(&tenant, "10", "mod").await.unwrap());
    assert!(!admin.remove_subscriber(&tenant, "10", "mod").await.unwrap());
    assert_eq!(admin.clear_subscribers(&tenant, "mod").await.unwrap(), 1);
    assert!(admin.list_subscribers(&tenant).await.unwrap().is_empty());

    let added = h
        .audit
        .entries()
        .iter()
        .filter(|e| e.action == AuditAction::SubscriberAdded)
        .count();
    assert_eq!(added, 2);
}

#[tokio::test(start_paused = true)]
async fn clear_history_rebaselines_without_announcing() {
    let h = Harness::new();
    h.tenant("a", Some("https://hooks.example/a"), true).await;
    h.source.set(notices(&["n2", "n1"]));

    let (scheduler, handle) = Scheduler::new(h.detector(), Duration::from_secs(300));
    let admin = admin(&h, handle.clone());
    let (signal, gate) = ready_channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    signal.mark_ready();
    let task = tokio::spawn(async move {
        scheduler.await_ready(gate).await.unwrap().run_forever(shutdown_rx).await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(admin.history_count().await.unwrap(), 2);

    assert_eq!(admin.clear_history("mod").await.unwrap(), 2);
    assert_eq!(admin.history_count().await.unwrap(), 0);
    assert!(h.rebaseline.is_pending());

    h.source.set(notices(&["n3", "n2", "n1"]));
    let ack = handle.run_now().await.unwrap();
    assert!(matches!(
        ack,
        Ok(CycleOutcome::BaselineEstablished { persisted: 3, .. })
    ));
    assert!(h.transport.sent().is_empty());

    let cleared = h
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == AuditAction::HistoryCleared)
        .unwrap();
    assert!(cleared.tenant_id.is_none());

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn check_now_triggers_a_cycle() {
    let h = Harness::new();
    h.source.set(notices(&["n1"]));
    let (scheduler, handle) = Scheduler::new(h.detector(), Duration::from_secs(300));
    let admin = admin(&h, handle);
    let (signal, gate) = ready_channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    signal.mark_ready();
    let task = tokio::spawn(async move {
        scheduler.await_ready(gate).await.unwrap().run_forever(shutdown_rx).await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.source.fetches(), 1);

    admin.check_now(Some(&"g".into()), "mod").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.source.fetches(), 2);
    assert!(h
        .audit
        .entries()
        .iter()
        .any(|e| e.action == AuditAction::ManualCheck));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}
