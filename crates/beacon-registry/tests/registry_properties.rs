//! End-to-end registration and discovery against in-process ensembles
//!
//! TigerStyle: Each test names the property it checks; faults are injected
//! explicitly through `MemoryEnsemble`.

use beacon_coord::{MemoryEnsemble, RetryPolicy};
use beacon_core::io::ManualClock;
use beacon_registry::{
    format, DiscoveryEngine, HealthProbe, MediaType, RegisterStatus, RegistrationManager,
    ServiceDescriptor, StaticHostResolver, Status,
};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

fn manager() -> RegistrationManager {
    RegistrationManager::new()
        .with_retry_policy(RetryPolicy::exponential_backoff(1, 2))
        .with_host_resolver(Arc::new(StaticHostResolver::new(
            "worker-host",
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
        )))
        .with_time_provider(Arc::new(ManualClock::new(1_700_000_000_000)))
}

fn engine(ensemble: &MemoryEnsemble) -> DiscoveryEngine {
    DiscoveryEngine::new(ensemble.address())
}

fn probe(ensemble: &MemoryEnsemble) -> HealthProbe {
    HealthProbe::new(ensemble.address()).with_timeout(Duration::from_millis(100))
}

fn worker(n: u32) -> ServiceDescriptor {
    ServiceDescriptor::new(format!("Worker_{}", n), 18000 + n as u16, "1.0.0")
        .with_metadata("Check")
}

// =============================================================================
// Register / Query
// =============================================================================

#[tokio::test]
async fn test_register_then_query_returns_matching_instance() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    let descriptor = ServiceDescriptor::new("Worker_1", 18005, "1.0.0").with_metadata("Check");

    assert_eq!(
        manager.register(ensemble.address(), &descriptor).await,
        RegisterStatus::Success
    );

    let instances = engine(&ensemble).query_instances("Worker_1").await.unwrap();
    assert_eq!(instances.len(), 1);
    let instance = &instances[0];
    assert_eq!(instance.name, "Worker_1");
    assert_eq!(instance.port, 18005);
    assert_eq!(instance.payload, "[1.0.0] [Check]");
    assert_eq!(instance.address, "worker-host 192.168.1.20");
    assert!(!instance.id.is_empty());
    assert_eq!(instance.date.len(), "dd/mm/yyyy hh:mm:ss".len());
}

#[tokio::test]
async fn test_empty_metadata_keeps_both_payload_fields() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    manager
        .register_instance(ensemble.address(), &ServiceDescriptor::new("bare", 9000, "2"))
        .await
        .unwrap();

    let instances = engine(&ensemble).query_instances("bare").await.unwrap();
    assert_eq!(instances[0].payload, "[2] []");
}

#[tokio::test]
async fn test_distinct_names_each_map_to_instances() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    const N: u32 = 5;

    for n in 0..N {
        manager
            .register_instance(ensemble.address(), &worker(n))
            .await
            .unwrap();
    }

    let engine = engine(&ensemble);
    let names = engine.list_service_names().await.unwrap();
    assert_eq!(names.len(), N as usize);

    let view = engine.query_all_instances().await.unwrap();
    assert_eq!(view.services.len(), N as usize);
    assert!(view.services.values().all(|instances| instances.len() == 1));
    assert!(view.is_complete());
}

#[tokio::test]
async fn test_duplicate_registrations_are_not_deduplicated() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    let descriptor = ServiceDescriptor::new("Worker_1", 18005, "1.0.0").with_metadata("Check");

    for _ in 0..10 {
        assert_eq!(
            manager.register(ensemble.address(), &descriptor).await,
            RegisterStatus::Success
        );
    }

    let view = engine(&ensemble).query_all_instances().await.unwrap();
    assert_eq!(view.services.len(), 1);
    let instances = view.instances("Worker_1");
    assert_eq!(instances.len(), 10);
    let ids: HashSet<&str> = instances.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn test_conflicting_versions_under_one_name_all_appear() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();

    manager
        .register_instance(ensemble.address(), &ServiceDescriptor::new("api", 80, "1"))
        .await
        .unwrap();
    manager
        .register_instance(ensemble.address(), &ServiceDescriptor::new("api", 81, "2"))
        .await
        .unwrap();

    let instances = engine(&ensemble).query_instances("api").await.unwrap();
    let mut ports: Vec<u16> = instances.iter().map(|i| i.port).collect();
    ports.sort_unstable();
    assert_eq!(ports, vec![80, 81]);
}

// =============================================================================
// Removal
// =============================================================================

#[tokio::test]
async fn test_unregister_removes_instance() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    manager
        .register_instance(ensemble.address(), &worker(1))
        .await
        .unwrap();

    assert!(manager.unregister());
    assert!(engine(&ensemble)
        .query_instances("Worker_1")
        .await
        .unwrap()
        .is_empty());

    // Idempotent
    assert!(!manager.unregister());
}

#[tokio::test]
async fn test_unregister_does_not_touch_other_sessions() {
    let ensemble = MemoryEnsemble::new();
    let producer_a = manager();
    let producer_b = manager();

    producer_a
        .register_instance(ensemble.address(), &worker(1))
        .await
        .unwrap();
    producer_b
        .register_instance(ensemble.address(), &worker(1))
        .await
        .unwrap();

    producer_a.unregister();
    let instances = engine(&ensemble).query_instances("Worker_1").await.unwrap();
    assert_eq!(instances.len(), 1);
}

#[tokio::test]
async fn test_expired_session_instance_reappears_under_new_id() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager().with_reregister_interval_ms(5);
    let registration = manager
        .register_instance(ensemble.address(), &worker(1))
        .await
        .unwrap();

    let owner = ensemble.ephemeral_owner(&registration.path).unwrap();
    assert!(ensemble.expire_session(owner));
    assert!(!ensemble.node_exists(&registration.path));

    let engine = engine(&ensemble);
    let mut reappeared = None;
    for _ in 0..400 {
        let instances = engine.query_instances("Worker_1").await.unwrap();
        if let Some(instance) = instances.into_iter().next() {
            reappeared = Some(instance);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let instance = reappeared.expect("instance was not re-registered");
    assert_ne!(instance.id, registration.instance_id());
    assert_eq!(instance.port, 18001);
    assert_eq!(ensemble.live_sessions().len(), 1);
}

#[tokio::test]
async fn test_admin_deletion_is_reflected() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    manager
        .register_instance(ensemble.address(), &worker(1))
        .await
        .unwrap();
    manager
        .register_instance(ensemble.address(), &worker(2))
        .await
        .unwrap();

    ensemble.delete_node("/zk-srv-discovery/Worker_1");

    let view = engine(&ensemble).query_all_instances().await.unwrap();
    assert!(!view.services.contains_key("Worker_1"));
    assert_eq!(view.instances("Worker_2").len(), 1);
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn test_status_follows_ensemble() {
    let ensemble = MemoryEnsemble::new();
    assert_eq!(probe(&ensemble).status().await, Status::ImOk);

    ensemble.stop();
    assert_eq!(probe(&ensemble).status().await, Status::NoConnection);

    ensemble.start();
    assert_eq!(probe(&ensemble).status().await, Status::ImOk);
}

#[tokio::test]
async fn test_register_fails_against_stopped_ensemble() {
    let ensemble = MemoryEnsemble::new();
    ensemble.stop();
    assert_eq!(
        manager().register(ensemble.address(), &worker(1)).await,
        RegisterStatus::Fail
    );
}

// =============================================================================
// Multiple Ensembles / Restart
// =============================================================================

#[tokio::test]
async fn test_independent_ensembles() {
    let first = MemoryEnsemble::new();
    let second = MemoryEnsemble::new();
    let manager = manager();
    let descriptor = worker(1);

    assert!(manager
        .register(first.address(), &descriptor)
        .await
        .is_success());
    assert!(manager
        .register(second.address(), &descriptor)
        .await
        .is_success());

    assert_eq!(engine(&first).query_instances("Worker_1").await.unwrap().len(), 1);
    assert_eq!(engine(&second).query_instances("Worker_1").await.unwrap().len(), 1);

    // Most recent registration (on `second`) goes first
    manager.unregister();
    assert_eq!(engine(&first).query_instances("Worker_1").await.unwrap().len(), 1);
    assert!(engine(&second)
        .query_instances("Worker_1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_registration_visible_after_restart() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    manager
        .register_instance(ensemble.address(), &worker(1))
        .await
        .unwrap();

    ensemble.restart();

    let instances = engine(&ensemble).query_instances("Worker_1").await.unwrap();
    assert_eq!(instances.len(), 1);
}

#[tokio::test]
async fn test_discovery_waits_out_a_short_outage() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    manager
        .register_instance(ensemble.address(), &worker(1))
        .await
        .unwrap();

    ensemble.stop();
    let starter = ensemble.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        starter.start();
    });

    let engine = engine(&ensemble);
    let view = tokio::time::timeout(Duration::from_secs(5), engine.query_all_instances())
        .await
        .expect("discovery should recover once the ensemble is back")
        .unwrap();
    assert_eq!(view.instances("Worker_1").len(), 1);
}

// =============================================================================
// Rendering
// =============================================================================

#[tokio::test]
async fn test_table_rows_parse_by_offset() {
    let ensemble = MemoryEnsemble::new();
    let manager = manager();
    for n in 0..3 {
        manager
            .register_instance(ensemble.address(), &worker(n))
            .await
            .unwrap();
    }

    let view = engine(&ensemble).query_all_instances().await.unwrap();
    let table = format::render_view(&view, MediaType::TextPlain, ensemble.address(), Some("9.9"))
        .unwrap();

    let names: Vec<String> = table
        .lines()
        .skip(5)
        .map(|line| line[26..26 + "Worker_0".len()].to_string())
        .collect();
    assert_eq!(names, vec!["Worker_0", "Worker_1", "Worker_2"]);
}
