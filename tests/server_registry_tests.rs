use mcphub::models::{HeartbeatRequest, InstanceStatus, ServiceType};
use mcphub::services::{RegistryError, ServerRegistry};
use mcphub::test_utils::test_helpers::{caps, register_reasoning};
use std::collections::HashSet;
use uuid::Uuid;

// Test 1: Empty registry
#[test]
fn test_registry_new() {
    let registry = ServerRegistry::shared();

    assert!(registry.is_empty().unwrap());
    assert!(registry.list_by_capability("reasoning").unwrap().is_empty());
    assert!(registry.get(Uuid::new_v4()).unwrap().is_none());
}

// Test 2: Register an instance
#[test]
fn test_register_instance() {
    let registry = ServerRegistry::shared();

    let instance = registry
        .register(
            ServiceType::Memory,
            "10.0.0.5:7000/",
            caps(&["recall", "store"]),
        )
        .expect("Registration should succeed");

    assert_eq!(instance.status, InstanceStatus::Healthy);
    assert_eq!(instance.current_load, 0);
    assert_eq!(instance.address, "http://10.0.0.5:7000", "stored as base url");

    let stored = registry
        .get(instance.instance_id)
        .unwrap()
        .expect("Instance should be stored");
    assert_eq!(stored, instance);
}

// Test 3: Duplicate healthy registration is rejected
#[test]
fn test_register_duplicate_instance() {
    let registry = ServerRegistry::shared();
    let first = register_reasoning(&registry, "127.0.0.1:9001");

    let result = registry.register(ServiceType::Reasoning, "127.0.0.1:9001", caps(&["reasoning"]));

    match result {
        Err(RegistryError::DuplicateRegistration { existing_id, .. }) => {
            assert_eq!(existing_id, first.instance_id);
        }
        other => panic!("Expected DuplicateRegistration, got {:?}", other),
    }
    assert_eq!(registry.len().unwrap(), 1);
}

// Test 3b: Scheme-less and http:// spellings of one address collide
#[test]
fn test_register_duplicate_across_address_forms() {
    let registry = ServerRegistry::shared();
    let first = register_reasoning(&registry, "127.0.0.1:9001");

    for spelling in ["http://127.0.0.1:9001", "HTTP://127.0.0.1:9001/"] {
        let result = registry.register(ServiceType::Reasoning, spelling, caps(&["reasoning"]));
        match result {
            Err(RegistryError::DuplicateRegistration { existing_id, .. }) => {
                assert_eq!(existing_id, first.instance_id);
            }
            other => panic!("Expected DuplicateRegistration for {}, got {:?}", spelling, other),
        }
    }
    assert_eq!(registry.len().unwrap(), 1);
}

// Test 4: Same address under a different type is a different instance
#[test]
fn test_same_address_different_type_allowed() {
    let registry = ServerRegistry::shared();
    register_reasoning(&registry, "127.0.0.1:9001");

    let result = registry.register(ServiceType::Memory, "127.0.0.1:9001", caps(&["recall"]));
    assert!(result.is_ok());
    assert_eq!(registry.len().unwrap(), 2);
}

// Test 5: A degraded duplicate is replaced
#[test]
fn test_reregister_replaces_degraded_instance() {
    let registry = ServerRegistry::shared();
    let stale = register_reasoning(&registry, "127.0.0.1:9001");
    registry
        .mark_status(stale.instance_id, InstanceStatus::Degraded)
        .unwrap();

    let fresh = register_reasoning(&registry, "127.0.0.1:9001");

    assert_ne!(fresh.instance_id, stale.instance_id);
    assert!(registry.get(stale.instance_id).unwrap().is_none());
    assert_eq!(registry.len().unwrap(), 1);
}

// Test 6: Deregister is idempotent
#[test]
fn test_deregister_idempotent() {
    let registry = ServerRegistry::shared();
    let instance = register_reasoning(&registry, "127.0.0.1:9001");

    assert!(registry.deregister(instance.instance_id).unwrap());
    assert!(!registry.deregister(instance.instance_id).unwrap());
    assert!(!registry.deregister(Uuid::new_v4()).unwrap());
    assert!(registry.list_by_capability("reasoning").unwrap().is_empty());
}

// Test 7: Heartbeat updates fields
#[test]
fn test_heartbeat_updates_metrics() {
    let registry = ServerRegistry::shared();
    let instance = register_reasoning(&registry, "127.0.0.1:9001");

    let updated = registry
        .heartbeat(
            instance.instance_id,
            &HeartbeatRequest {
                load: Some(4),
                latency_ms: Some(87.5),
                status: None,
            },
        )
        .unwrap();

    assert_eq!(updated.current_load, 4);
    assert_eq!(updated.recent_latency_ms, 87.5);
    assert!(updated.last_heartbeat >= instance.last_heartbeat);
}

// Test 8: Heartbeat from an unknown id is an error
#[test]
fn test_heartbeat_unknown_instance() {
    let registry = ServerRegistry::shared();
    let missing = Uuid::new_v4();

    let result = registry.heartbeat(missing, &HeartbeatRequest::default());

    assert!(matches!(result, Err(RegistryError::UnknownInstance(id)) if id == missing));
}

// Test 9: Heartbeat restores a degraded instance
#[test]
fn test_heartbeat_restores_health() {
    let registry = ServerRegistry::shared();
    let instance = register_reasoning(&registry, "127.0.0.1:9001");
    registry
        .mark_status(instance.instance_id, InstanceStatus::Degraded)
        .unwrap();

    let updated = registry
        .heartbeat(instance.instance_id, &HeartbeatRequest::default())
        .unwrap();
    assert_eq!(updated.status, InstanceStatus::Healthy);

    let draining = registry
        .heartbeat(
            instance.instance_id,
            &HeartbeatRequest {
                status: Some(InstanceStatus::Unreachable),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(draining.status, InstanceStatus::Unreachable);
}

// Test 10: Listing ignores health and filters by capability
#[test]
fn test_list_by_capability_includes_unhealthy() {
    let registry = ServerRegistry::shared();
    let a = register_reasoning(&registry, "a:1");
    let b = register_reasoning(&registry, "b:1");
    registry
        .register(ServiceType::Memory, "m:1", caps(&["recall"]))
        .unwrap();
    registry
        .mark_status(b.instance_id, InstanceStatus::Degraded)
        .unwrap();

    let ids: HashSet<Uuid> = registry
        .list_by_capability("reasoning")
        .unwrap()
        .into_iter()
        .map(|i| i.instance_id)
        .collect();

    assert_eq!(ids, HashSet::from([a.instance_id, b.instance_id]));
}

// Test 11: Listing tracks an arbitrary register/deregister sequence
#[test]
fn test_list_reflects_register_deregister_sequence() {
    let registry = ServerRegistry::shared();
    let mut live: HashSet<Uuid> = HashSet::new();

    for round in 0..20 {
        let instance = register_reasoning(&registry, &format!("host-{}:80", round));
        live.insert(instance.instance_id);

        if round % 3 == 0 {
            let victim = *live.iter().next().unwrap();
            registry.deregister(victim).unwrap();
            live.remove(&victim);
        }

        let listed: HashSet<Uuid> = registry
            .list_by_capability("reasoning")
            .unwrap()
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        assert_eq!(listed, live, "registry diverged at round {}", round);
    }
}

// Test 12: Concurrent registration from many tasks
#[tokio::test]
async fn test_concurrent_registration() {
    let registry = ServerRegistry::shared();

    let mut handles = Vec::new();
    for i in 0..10 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.register(ServiceType::Knowledge, &format!("k-{}:80", i), caps(&["lookup"]))
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("Registration should succeed");
    }

    assert_eq!(registry.list_by_capability("lookup").unwrap().len(), 10);
}

// Test 13: Concurrent registration of the same pair admits exactly one
#[tokio::test]
async fn test_concurrent_duplicate_registration() {
    let registry = ServerRegistry::shared();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.register(ServiceType::Reasoning, "same:1", caps(&["reasoning"]))
        }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(registry.len().unwrap(), 1);
}

// Test 14: Concurrent claims and heartbeats never lose updates
#[tokio::test]
async fn test_concurrent_load_bookkeeping() {
    let registry = ServerRegistry::shared();
    let instance = register_reasoning(&registry, "a:1");

    let mut handles = Vec::new();
    for _ in 0..50 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let (_, guard, ()) = registry
                .checkout("reasoning", &[], |_| Some((0, ())))
                .unwrap()
                .expect("candidate");
            tokio::task::yield_now().await;
            guard.release();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let after = registry.get(instance.instance_id).unwrap().unwrap();
    assert_eq!(after.current_load, 0);
}
