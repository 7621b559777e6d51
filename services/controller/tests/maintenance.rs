//! Occupancy monitoring and expired-deletion cleanup.

mod common;

use chrono::{TimeZone, Utc};
use common::{fixture, instance, license, pending_instance, FakeProbe};
use fvtt_controller::cleanup::cleanup_expired;
use fvtt_controller::license::reconcile_license;
use fvtt_controller::instances::{monitor_occupancy, process_regeneration_requests};
use fvtt_reconcile::{ProbeError, Verdict};
use fvtt_store::kinds;
use serde_json::json;

#[tokio::test]
async fn test_monitor_records_holder_occupancy() {
    let fx = fixture(FakeProbe::new().world("alpha", 2, "ruins"));
    fx.seed_license(license("main", Some("alpha"), Some("alpha"), "block"))
        .await;
    fx.seed_license(license("idle", None, None, "block")).await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    assert_eq!(monitor_occupancy(&fx.ctx).await.unwrap(), 1);
    assert_eq!(fx.probe.probed(), ["alpha"]);

    let status = fx.get(&kinds::INSTANCE, "alpha").await["status"].clone();
    assert_eq!(status["connectedPlayers"], 2);
    assert_eq!(status["activeWorld"], "ruins");
    assert!(status.get("lastProbeAt").is_some());
    assert!(status.get("probeError").is_none());
}

#[tokio::test]
async fn test_monitor_records_probe_failure() {
    let fx = fixture(FakeProbe::new().failing("alpha", ProbeError::Status(502)));
    fx.seed_license(license("main", Some("alpha"), Some("alpha"), "block"))
        .await;
    fx.seed_instances(vec![instance("alpha", "main")]).await;

    monitor_occupancy(&fx.ctx).await.unwrap();

    let status = fx.get(&kinds::INSTANCE, "alpha").await["status"].clone();
    assert_eq!(status["probeError"], "status endpoint returned HTTP 502");
    assert!(status.get("connectedPlayers").is_none());
}

#[tokio::test]
async fn test_regeneration_flag_without_record_is_cleared() {
    let fx = fixture(FakeProbe::new());
    let mut record = instance("alpha", "main");
    record["spec"]["regeneratePassword"] = json!(true);
    fx.seed_instances(vec![record, instance("beta", "main")])
        .await;

    assert_eq!(process_regeneration_requests(&fx.ctx).await.unwrap(), 1);

    let alpha = fx.get(&kinds::INSTANCE, "alpha").await;
    assert!(alpha["spec"].get("regeneratePassword").is_none());
}

#[tokio::test]
async fn test_cleanup_deletes_expired_instance_and_its_password() {
    let fx = fixture(FakeProbe::new());
    fx.seed_instances(vec![
        pending_instance("old", "main", "2026-03-01T09:00:00Z"),
        pending_instance("later", "main", "2026-03-05T09:00:00Z"),
        pending_instance("broken", "main", "whenever"),
        instance("kept", "main"),
    ])
    .await;
    fx.store
        .insert(
            &kinds::PASSWORD,
            json!({"metadata": {"name": "foundry-password-old", "namespace": common::NS},
                   "spec": {"type": "instance", "instanceRef": {"name": "old"}}}),
        )
        .await;
    fx.store
        .insert(
            &kinds::SECRET,
            json!({"metadata": {"name": "foundry-password-old", "namespace": common::NS},
                   "data": {"adminPassword": "c2VjcmV0"}}),
        )
        .await;

    let now = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    assert_eq!(cleanup_expired(&fx.ctx, now).await.unwrap(), 1);

    assert_eq!(fx.store.count(&kinds::INSTANCE).await, 3);
    assert_eq!(fx.store.count(&kinds::PASSWORD).await, 0);
    assert_eq!(fx.store.count(&kinds::SECRET).await, 0);

    // Nothing left to do on a second run.
    assert_eq!(cleanup_expired(&fx.ctx, now).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_releases_license_held_by_expired_instance() {
    let fx = fixture(FakeProbe::new());
    fx.seed_license(license("main", Some("alpha"), Some("alpha"), "block"))
        .await;
    fx.seed_instances(vec![
        pending_instance("alpha", "main", "2026-03-01T09:00:00Z"),
        instance("beta", "main"),
    ])
    .await;

    let first = reconcile_license(&fx.ctx, "main").await.unwrap();
    assert_eq!(first.holder, None);

    let now = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    assert_eq!(cleanup_expired(&fx.ctx, now).await.unwrap(), 1);

    let main = fx.get(&kinds::LICENSE, "main").await;
    assert!(main["spec"].get("activeInstanceName").is_none());

    let second = reconcile_license(&fx.ctx, "main").await.unwrap();
    assert_eq!(second.holder, None);
    assert_eq!(second.verdict, Verdict::Unchanged);

    let status = fx.get(&kinds::LICENSE, "main").await["status"].clone();
    assert!(status.get("activeInstance").is_none());
    assert_eq!(
        status["registeredInstances"],
        json!([{"name": "beta", "state": "standby"}])
    );
}

#[tokio::test]
async fn test_cleanup_leaves_license_naming_another_instance() {
    let fx = fixture(FakeProbe::new());
    fx.seed_license(license("main", Some("beta"), Some("beta"), "block"))
        .await;
    fx.seed_instances(vec![
        pending_instance("alpha", "main", "2026-03-01T09:00:00Z"),
        instance("beta", "main"),
    ])
    .await;

    let now = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    assert_eq!(cleanup_expired(&fx.ctx, now).await.unwrap(), 1);

    let main = fx.get(&kinds::LICENSE, "main").await;
    assert_eq!(main["spec"]["activeInstanceName"], "beta");
}
