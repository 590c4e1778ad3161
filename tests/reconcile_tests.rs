//! Tests for roster reconciliation.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use appmetrics::aggregate::record_container_metrics;
use appmetrics::enrich::IdentityResolver;
use appmetrics::reconcile::{reconcile_once, run_reconcile_loop, ReconcileContext};
use appmetrics::store::AppStore;
use appmetrics::types::AppKey;
use common::{app_info, instances, MockDirectory};
use tokio::sync::watch;

fn context(dir: Arc<MockDirectory>) -> ReconcileContext {
    ReconcileContext {
        store: Arc::new(AppStore::new()),
        resolver: Arc::new(IdentityResolver::new(dir)),
    }
}

#[tokio::test]
async fn test_reconcile_registers_roster() {
    let dir = Arc::new(MockDirectory::with_apps(vec![
        app_info("g1", "acme", "prod", "web"),
        app_info("g2", "acme", "dev", "worker"),
    ]));
    dir.set_topology("g1", instances(2));
    let ctx = context(dir.clone());
    let (_tx, rx) = watch::channel(false);

    let report = reconcile_once(&ctx, &rx).await;
    assert_eq!(report.roster_size, 2);
    assert_eq!(report.registered, 2);
    assert_eq!(report.failed, 0);
    assert!(!report.stopped);

    let web = ctx.store.get("acme", "prod", "web").unwrap();
    assert_eq!(web.guid, "g1");
    assert_eq!(web.instances.len(), 2);
    assert_eq!(web.organization.id, "acme-guid");
    assert!(ctx.store.get("acme", "dev", "worker").is_some());

    // The roster warms the identity cache.
    assert_eq!(ctx.resolver.resolve("g2").await.app_name, "worker");
    assert_eq!(dir.lookup_count(), 0);
}

#[tokio::test]
async fn test_reconcile_preserves_cell_ips_and_counters() {
    let dir = Arc::new(MockDirectory::with_apps(vec![app_info(
        "g1", "acme", "prod", "web",
    )]));
    dir.set_topology("g1", instances(3));
    let ctx = context(dir);
    let key = AppKey::new("acme", "prod", "web");

    ctx.store.update(&key, |app| {
        record_container_metrics(app, 0, "10.0.0.1", 1.0, 1, 1);
        record_container_metrics(app, 1, "10.0.0.2", 1.0, 1, 1);
        record_container_metrics(app, 2, "10.0.0.3", 1.0, 1, 1);
        app.event_count = 17;
        app.http_error_count = 2;
    });

    let (_tx, rx) = watch::channel(false);
    let report = reconcile_once(&ctx, &rx).await;
    assert_eq!(report.registered, 1);

    let app = ctx.store.get_key(&key).unwrap();
    let ips: Vec<&str> = app.instances.iter().map(|i| i.cell_ip.as_str()).collect();
    assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    assert_eq!(app.event_count, 17);
    assert_eq!(app.http_error_count, 2);
    assert_eq!(app.state, "STARTED");
}

#[tokio::test]
async fn test_reconcile_isolates_entry_failures() {
    let dir = Arc::new(MockDirectory::with_apps(vec![
        app_info("g1", "acme", "prod", "a"),
        app_info("g2", "acme", "prod", "b"),
        app_info("g3", "acme", "prod", "c"),
    ]));
    dir.fail_annotate_for("g2");
    let ctx = context(dir.clone());
    let (_tx, rx) = watch::channel(false);

    let report = reconcile_once(&ctx, &rx).await;
    assert_eq!(report.registered, 2);
    assert_eq!(report.failed, 1);
    assert!(ctx.store.get("acme", "prod", "a").is_some());
    assert!(ctx.store.get("acme", "prod", "b").is_none());
    assert!(ctx.store.get("acme", "prod", "c").is_some());
    assert_eq!(dir.annotations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_reconcile_roster_failure_changes_nothing() {
    let dir = Arc::new(MockDirectory::with_apps(vec![app_info(
        "g1", "acme", "prod", "web",
    )]));
    *dir.fail_roster.lock().unwrap() = true;
    let ctx = context(dir);
    let (_tx, rx) = watch::channel(false);

    let report = reconcile_once(&ctx, &rx).await;
    assert_eq!(report.roster_size, 0);
    assert!(ctx.store.is_empty());
}

#[tokio::test]
async fn test_reconcile_stops_between_entries() {
    let dir = Arc::new(MockDirectory::with_apps(vec![
        app_info("g1", "acme", "prod", "a"),
        app_info("g2", "acme", "prod", "b"),
    ]));
    let ctx = context(dir.clone());
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = reconcile_once(&ctx, &rx).await;
    assert!(report.stopped);
    assert_eq!(report.registered, 0);
    assert!(ctx.store.is_empty());
    assert_eq!(dir.annotations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reconcile_loop_runs_and_stops() {
    let dir = Arc::new(MockDirectory::with_apps(vec![app_info(
        "g1", "acme", "prod", "web",
    )]));
    let ctx = context(dir);
    let store = ctx.store.clone();
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(run_reconcile_loop(ctx, Duration::from_millis(20), rx));

    let mut seen = false;
    for _ in 0..100 {
        if store.get("acme", "prod", "web").is_some() {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(seen);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop")
        .unwrap();
}
