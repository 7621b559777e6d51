//! Full license passes against the in-memory store.

mod common;

use common::{fixture, instance, license, pending_instance, FakeProbe, NS};
use fvtt_controller::license::{reconcile_all, reconcile_license};
use fvtt_controller::ControllerError;
use fvtt_reconcile::{ProbeError, Verdict};
use fvtt_store::{kinds, ResourceStore};
use serde_json::{json, Value};

fn route_states(routes: &[Value]) -> Vec<(String, String)> {
    let mut states: Vec<_> = routes
        .iter()
        .map(|r| {
            (
                r["metadata"]["name"].as_str().unwrap().to_string(),
                r["metadata"]["annotations"]["foundry.platform/route-state"]
                    .as_str()
                    .unwrap()
                    .to_string(),
            )
        })
        .collect();
    states.sort();
    states
}

#[tokio::test]
async fn test_block_mode_denies_switch_while_players_connected() {
    let fx = fixture(FakeProbe::new().users("alpha", 5));
    fx.seed_license(license("main", Some("beta"), Some("alpha"), "block"))
        .await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();

    assert_eq!(outcome.holder.as_deref(), Some("alpha"));
    assert_eq!(outcome.verdict, Verdict::Denied);
    assert_eq!(fx.probe.probed(), ["alpha"]);

    let status = fx.license_status("main").await;
    assert_eq!(status["activeInstance"], "alpha");
    assert_eq!(
        status["warning"],
        "Switch to 'beta' blocked: 5 players connected to 'alpha'"
    );
    assert_eq!(
        status["registeredInstances"],
        json!([
            {"name": "alpha", "state": "active"},
            {"name": "beta", "state": "standby"},
        ])
    );
}

#[tokio::test]
async fn test_block_mode_allows_switch_when_empty_and_clears_warning() {
    let fx = fixture(FakeProbe::new().users("alpha", 0));
    let mut record = license("main", Some("beta"), Some("alpha"), "block");
    record["status"]["warning"] = json!("stale warning");
    fx.seed_license(record).await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();
    assert_eq!(outcome.holder.as_deref(), Some("beta"));
    assert_eq!(outcome.verdict, Verdict::Allowed);

    let status = fx.license_status("main").await;
    assert_eq!(status["activeInstance"], "beta");
    assert!(status.get("warning").is_none());

    let beta = fx.get(&kinds::HTTP_ROUTE, "foundry-id-beta").await;
    assert_eq!(beta["spec"]["hostnames"], json!(["beta.play.example"]));
    assert_eq!(
        beta["spec"]["rules"][0]["backendRefs"][0]["name"],
        "foundry-beta"
    );
    let alpha = fx.get(&kinds::HTTP_ROUTE, "foundry-id-alpha").await;
    assert_eq!(
        alpha["spec"]["rules"][0]["backendRefs"][0]["name"],
        "foundry-standby-page"
    );
}

#[tokio::test]
async fn test_unreachable_holder_denies_switch() {
    let fx = fixture(
        FakeProbe::new().failing("alpha", ProbeError::Transport("connection refused".into())),
    );
    fx.seed_license(license("main", Some("beta"), Some("alpha"), "block"))
        .await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    reconcile_license(&fx.ctx, "main").await.unwrap();

    let status = fx.license_status("main").await;
    assert_eq!(status["activeInstance"], "alpha");
    let warning = status["warning"].as_str().unwrap();
    assert!(warning.contains("unable to verify player count on 'alpha'"));
}

#[tokio::test]
async fn test_force_mode_switches_without_probing() {
    let fx = fixture(FakeProbe::new().users("alpha", 7));
    fx.seed_license(license("main", Some("beta"), Some("alpha"), "force"))
        .await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();

    assert_eq!(outcome.holder.as_deref(), Some("beta"));
    assert_eq!(fx.probe.calls(), 0);
}

#[tokio::test]
async fn test_deactivation_is_never_blocked() {
    let fx = fixture(FakeProbe::new().users("alpha", 3));
    fx.seed_license(license("main", None, Some("alpha"), "block"))
        .await;
    fx.seed_instances(vec![instance("alpha", "main")]).await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();

    assert_eq!(outcome.holder, None);
    assert_eq!(fx.probe.calls(), 0);
    let status = fx.license_status("main").await;
    assert!(status.get("activeInstance").is_none());
    assert!(status.get("warning").is_none());

    let routes = fx.store.list(&kinds::HTTP_ROUTE, NS, None).await.unwrap();
    assert_eq!(
        route_states(&routes),
        [("foundry-id-alpha".to_string(), "standby".to_string())]
    );
}

#[tokio::test]
async fn test_pending_deletion_instance_cannot_become_active() {
    let fx = fixture(FakeProbe::new().users("alpha", 0));
    fx.seed_license(license("main", Some("beta"), Some("alpha"), "block"))
        .await;
    fx.seed_instances(vec![
        instance("alpha", "main"),
        pending_instance("beta", "main", "2099-01-01T00:00:00Z"),
    ])
    .await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();

    assert_eq!(outcome.holder.as_deref(), Some("alpha"));
    let status = fx.license_status("main").await;
    assert_eq!(
        status["warning"],
        "Instance 'beta' is scheduled for deletion and cannot be active"
    );

    // The pending instance still gets a standby route.
    let beta = fx.get(&kinds::HTTP_ROUTE, "foundry-id-beta").await;
    assert_eq!(
        beta["metadata"]["annotations"]["foundry.platform/route-state"],
        "standby"
    );
}

#[tokio::test]
async fn test_missing_holder_is_treated_as_vacant() {
    let fx = fixture(FakeProbe::new());
    fx.seed_license(license("main", Some("beta"), Some("ghost"), "block"))
        .await;
    fx.seed_instances(vec![instance("beta", "main")]).await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();

    assert_eq!(outcome.holder.as_deref(), Some("beta"));
    assert_eq!(outcome.verdict, Verdict::Activated);
    assert_eq!(fx.probe.calls(), 0);
}

#[tokio::test]
async fn test_nonexistent_desired_holder_is_refused() {
    let fx = fixture(FakeProbe::new());
    fx.seed_license(license("main", Some("ghost"), Some("alpha"), "force"))
        .await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();

    assert_eq!(outcome.holder.as_deref(), Some("alpha"));
    assert_eq!(outcome.verdict, Verdict::Unchanged);
    assert_eq!(
        outcome.warning.as_deref(),
        Some("Instance 'ghost' does not exist")
    );
    assert_eq!(fx.probe.calls(), 0);

    let status = fx.get(&kinds::LICENSE, "main").await["status"].clone();
    assert_eq!(status["activeInstance"], "alpha");
    assert_eq!(status["warning"], "Instance 'ghost' does not exist");
}

#[tokio::test]
async fn test_routes_cover_every_bound_instance_once() {
    let fx = fixture(FakeProbe::new());
    fx.seed_license(license("main", Some("b"), None, "block")).await;
    fx.seed_license(license("side", None, None, "block")).await;
    fx.seed_instances(vec![
        instance("a", "main"),
        instance("b", "main"),
        instance("c", "main"),
        instance("x", "side"),
    ])
    .await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();
    assert_eq!(outcome.routes, 3);

    let routes = fx
        .store
        .list(&kinds::HTTP_ROUTE, NS, Some("foundry.platform/license=main"))
        .await
        .unwrap();
    let states = route_states(&routes);
    assert_eq!(
        states,
        [
            ("foundry-id-a".to_string(), "standby".to_string()),
            ("foundry-id-b".to_string(), "active".to_string()),
            ("foundry-id-c".to_string(), "standby".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_stale_routes_are_pruned() {
    let fx = fixture(FakeProbe::new());
    fx.seed_license(license("main", None, None, "block")).await;
    fx.seed_instances(vec![instance("alpha", "main")]).await;

    let stale = |name: &str, license: &str| {
        json!({"metadata": {
            "name": name,
            "namespace": NS,
            "labels": {"foundry.platform/license": license},
        }})
    };
    fx.store
        .insert(&kinds::HTTP_ROUTE, stale("foundry-id-removed", "main"))
        .await;
    fx.store
        .insert(&kinds::HTTP_ROUTE, stale("foundry-id-elsewhere", "side"))
        .await;
    fx.store
        .insert(&kinds::DNS_ENDPOINT, stale("foundry-id-removed", "main"))
        .await;

    let outcome = reconcile_license(&fx.ctx, "main").await.unwrap();

    assert_eq!(outcome.pruned, 2);
    let names: Vec<String> = fx
        .store
        .list(&kinds::HTTP_ROUTE, NS, None)
        .await
        .unwrap()
        .iter()
        .map(|r| r["metadata"]["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["foundry-id-alpha", "foundry-id-elsewhere"]);
    assert_eq!(fx.store.count(&kinds::DNS_ENDPOINT).await, 0);
}

#[tokio::test]
async fn test_dns_bindings_follow_public_endpoint() {
    let fx = fixture(FakeProbe::new());
    let mut record = license("main", Some("alpha"), None, "block");
    record["spec"]["gateway"]["publicIP"] = json!("203.0.113.7");
    fx.seed_license(record).await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    reconcile_license(&fx.ctx, "main").await.unwrap();

    let dns = fx.get(&kinds::DNS_ENDPOINT, "foundry-id-beta").await;
    let endpoint = &dns["spec"]["endpoints"][0];
    assert_eq!(endpoint["dnsName"], "beta.play.example");
    assert_eq!(endpoint["targets"], json!(["203.0.113.7"]));
    assert_eq!(endpoint["recordType"], "A");
}

#[tokio::test]
async fn test_repeated_passes_are_idempotent() {
    let fx = fixture(FakeProbe::new().users("alpha", 2));
    fx.seed_license(license("main", Some("beta"), Some("alpha"), "block"))
        .await;
    fx.seed_instances(vec![instance("alpha", "main"), instance("beta", "main")])
        .await;

    let first = reconcile_license(&fx.ctx, "main").await.unwrap();
    let status_first = fx.license_status("main").await;
    let second = reconcile_license(&fx.ctx, "main").await.unwrap();
    let status_second = fx.license_status("main").await;

    assert_eq!(first, second);
    assert_eq!(status_first, status_second);
    assert_eq!(fx.store.count(&kinds::HTTP_ROUTE).await, 2);
}

#[tokio::test]
async fn test_invalid_license_fails_pass_without_touching_status() {
    let fx = fixture(FakeProbe::new());
    let mut record = license("main", Some("alpha"), None, "block");
    record["spec"]["licenseSecretRef"]["key"] = json!("null");
    fx.seed_license(record).await;
    fx.seed_instances(vec![instance("alpha", "main")]).await;

    let err = reconcile_license(&fx.ctx, "main").await.unwrap_err();

    assert!(matches!(err, ControllerError::InvalidRecord { .. }));
    assert!(fx.get(&kinds::LICENSE, "main").await.get("status").is_none());
    assert_eq!(fx.store.count(&kinds::HTTP_ROUTE).await, 0);
}

#[tokio::test]
async fn test_missing_license_is_not_found() {
    let fx = fixture(FakeProbe::new());
    let err = reconcile_license(&fx.ctx, "nope").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_reconcile_all_handles_each_license() {
    let fx = fixture(FakeProbe::new().users("a1", 4));
    fx.seed_license(license("first", Some("a2"), Some("a1"), "block"))
        .await;
    fx.seed_license(license("second", Some("b1"), None, "block"))
        .await;
    fx.seed_instances(vec![
        instance("a1", "first"),
        instance("a2", "first"),
        instance("b1", "second"),
    ])
    .await;

    let results = reconcile_all(&fx.ctx).await.unwrap();

    assert_eq!(results.len(), 2);
    for (name, result) in &results {
        let outcome = result.as_ref().unwrap();
        match name.as_str() {
            "first" => assert_eq!(outcome.holder.as_deref(), Some("a1")),
            "second" => assert_eq!(outcome.holder.as_deref(), Some("b1")),
            other => panic!("unexpected license {other}"),
        }
    }

    let routes = fx.store.list(&kinds::HTTP_ROUTE, NS, None).await.unwrap();
    let active = route_states(&routes)
        .into_iter()
        .filter(|(_, state)| state == "active")
        .count();
    assert_eq!(active, 2);
}
