//! Service Registry Integration Tests
//!
//! Exactly-once construction under concurrency, re-registration, tags, reset
//! and health reporting.

use maison_core::registry::{HealthCheck, ServiceHealth, ServiceRegistry};
use maison_core::{HealthStatus, RegistryError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct Planning {
    build: usize,
}

#[test]
fn concurrent_first_access_builds_once() {
    const THREADS: usize = 16;

    let registry = Arc::new(ServiceRegistry::new());
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    registry.register(
        "planning",
        move || {
            let build = counter.fetch_add(1, Ordering::SeqCst) + 1;
            // widen the race window
            thread::sleep(Duration::from_millis(20));
            Ok::<_, std::io::Error>(Planning { build })
        },
        &[],
    );

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                registry.get_typed::<Planning>("planning").unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<Planning>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(instances[0].build, 1);
}

#[test]
fn slow_construction_does_not_block_other_services() {
    let registry = Arc::new(ServiceRegistry::new());
    let release = Arc::new(AtomicBool::new(false));
    let started = Arc::new(Barrier::new(2));

    let gate = release.clone();
    let signal = started.clone();
    registry.register(
        "lent",
        move || {
            signal.wait();
            while !gate.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok::<_, std::io::Error>(1u32)
        },
        &[],
    );
    registry.register("rapide", || Ok::<_, std::io::Error>(2u32), &[]);

    let slow_registry = registry.clone();
    let slow = thread::spawn(move || slow_registry.get_typed::<u32>("lent").map(|v| *v));

    started.wait();
    // "lent" is mid-construction; an unrelated name resolves immediately
    assert_eq!(*registry.get_typed::<u32>("rapide").unwrap(), 2);

    release.store(true, Ordering::SeqCst);
    assert_eq!(slow.join().unwrap().unwrap(), 1);
}

#[test]
fn reregistration_keeps_live_instance() {
    let registry = ServiceRegistry::new();
    registry.register("planning", || Ok::<_, std::io::Error>(Planning { build: 1 }), &[]);
    let original = registry.get_typed::<Planning>("planning").unwrap();

    let accepted =
        registry.register("planning", || Ok::<_, std::io::Error>(Planning { build: 2 }), &[]);

    assert!(!accepted);
    let current = registry.get_typed::<Planning>("planning").unwrap();
    assert!(Arc::ptr_eq(&original, &current));
    assert_eq!(current.build, 1);
}

#[test]
fn construction_failure_is_not_cached() {
    let registry = ServiceRegistry::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    registry.register(
        "fragile",
        move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("base indisponible")
            } else {
                Ok(42u64)
            }
        },
        &[],
    );

    let err = registry.get("fragile").unwrap_err();
    assert!(matches!(err, RegistryError::Construction { ref name, .. } if name == "fragile"));
    assert!(!registry.is_instantiated("fragile"));

    assert_eq!(*registry.get_typed::<u64>("fragile").unwrap(), 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn typed_access_and_errors() {
    let registry = ServiceRegistry::new();
    registry.register_instance("nombre", Arc::new(7i32), &[]);

    assert!(matches!(
        registry.get("absent"),
        Err(RegistryError::NotRegistered(_))
    ));
    assert!(matches!(
        registry.get_typed::<String>("nombre"),
        Err(RegistryError::TypeMismatch { .. })
    ));
    assert_eq!(*registry.get_typed::<i32>("nombre").unwrap(), 7);
}

#[test]
fn by_tag_materialises_tagged_services() {
    let registry = ServiceRegistry::new();
    let builds = Arc::new(AtomicUsize::new(0));
    for name in ["recettes", "courses"] {
        let counter = builds.clone();
        registry.register(
            name,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(name.to_string())
            },
            &["domaine"],
        );
    }
    registry.register("autre", || Ok::<_, std::io::Error>(0u8), &["outil"]);

    let services = registry.by_tag("domaine").unwrap();

    assert_eq!(services.len(), 2);
    assert!(services.contains_key("recettes") && services.contains_key("courses"));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert!(!registry.is_instantiated("autre"));
}

#[test]
fn reset_rebuilds_on_next_access() {
    let registry = ServiceRegistry::new();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    registry.register(
        "cache",
        move || Ok::<_, std::io::Error>(counter.fetch_add(1, Ordering::SeqCst)),
        &[],
    );

    let first = registry.get_typed::<usize>("cache").unwrap();
    registry.reset("cache").unwrap();
    let second = registry.get_typed::<usize>("cache").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    registry.reset_all();
    assert!(!registry.is_instantiated("cache"));
    registry.get("cache").unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 3);

    assert!(matches!(
        registry.reset("absent"),
        Err(RegistryError::NotRegistered(_))
    ));
}

struct Sonde {
    ok: bool,
}

impl HealthCheck for Sonde {
    fn health_check(&self) -> ServiceHealth {
        if self.ok {
            ServiceHealth::healthy()
        } else {
            ServiceHealth::unhealthy("connexion perdue")
        }
    }
}

#[test]
fn health_check_only_probes_instantiated_services() {
    let registry = ServiceRegistry::new();
    registry.register_instance_checked("ok", Arc::new(Sonde { ok: true }), &[]);
    registry.register_checked("paresseux", || Ok::<_, std::io::Error>(Sonde { ok: false }), &[]);

    let report = registry.health_check_global();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.uninstantiated, vec!["paresseux".to_string()]);

    registry.get("paresseux").unwrap();
    let report = registry.health_check_global();
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.failing_services(), vec!["paresseux"]);
}

#[test]
fn stats_track_accesses() {
    let registry = ServiceRegistry::new();
    registry.register_instance("a", Arc::new(1u8), &["t"]);
    registry.register("b", || Ok::<_, std::io::Error>(2u8), &[]);
    for _ in 0..3 {
        registry.get("a").unwrap();
    }

    let stats = registry.stats();
    assert_eq!(stats.total_services, 2);
    assert_eq!(stats.instantiated_services, 1);
    assert_eq!(stats.total_accesses, 3);
    assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
}
