// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use super::*;
use crate::errors::RequirementsErr;
use crate::OverlayId;

fn node_with(cores: u32, load: f64, free_mb: u64) -> NodeInfo {
    let mut info = NodeInfo::new(OverlayId(7), "node-7");
    info.resources = ResourceSnapshot {
        cpu_cores: cores,
        cpu_speed_mhz: 2400,
        cpu_load: load,
        memory_total_mb: 8192,
        memory_free_mb: free_mb,
        disk_total_mb: 100_000,
        disk_free_mb: 50_000,
    };
    info
}

#[test]
fn test_parse_requirements_properties() {
    let doc = b"# demo app\ncpu.cores = 2\ncpu.load.max=75.5\nmemory.free=512\nlocations=eu, us\n\nvirtualization.forbidden=true\nunknown.key=1\n";
    let req = Requirements::from_properties(doc).expect("Failed to parse requirements");
    assert_eq!(Some(2), req.cpu_cores);
    assert_eq!(Some(75.5), req.max_cpu_load);
    assert_eq!(Some(512), req.memory_free_mb);
    assert_eq!(vec!["eu".to_string(), "us".to_string()], req.locations);
    assert!(req.no_virtualization);
    assert!(!req.allows_virtualization());
}

#[test]
fn test_parse_requirements_rejects_bad_input() {
    assert_eq!(
        Err(RequirementsErr::MalformedLine("cpu.cores".to_string())),
        Requirements::from_properties(b"cpu.cores")
    );
    assert!(matches!(
        Requirements::from_properties(b"cpu.cores=many"),
        Err(RequirementsErr::InvalidValue { .. })
    ));
    assert_eq!(
        Err(RequirementsErr::Encoding),
        Requirements::from_properties(&[0xff, 0xfe])
    );
}

#[test]
fn test_requirements_predicate() {
    let req = Requirements {
        cpu_cores: Some(2),
        max_cpu_load: Some(50.0),
        memory_free_mb: Some(1024),
        ..Default::default()
    };
    assert!(req.is_satisfied_by(&node_with(4, 10.0, 2048)));
    assert!(!req.is_satisfied_by(&node_with(1, 10.0, 2048)));
    assert!(!req.is_satisfied_by(&node_with(4, 90.0, 2048)));
    assert!(!req.is_satisfied_by(&node_with(4, 10.0, 100)));
    assert!(Requirements::default().is_satisfied_by(&node_with(0, 100.0, 0)));
}

#[test]
fn test_requirements_location_and_virtualization() {
    let req = Requirements {
        locations: vec!["eu".to_string()],
        no_virtualization: true,
        ..Default::default()
    };
    let mut info = node_with(1, 0.0, 0);
    assert!(!req.is_satisfied_by(&info));
    info.location = Some("eu".to_string());
    assert!(req.is_satisfied_by(&info));
    info.virtualized = true;
    assert!(!req.is_satisfied_by(&info));
}

#[test]
fn test_app_info_equality_is_by_name() {
    let a = AppInfo::new("demo", Requirements::default());
    let b = AppInfo::new(
        "demo",
        Requirements {
            cpu_cores: Some(8),
            ..Default::default()
        },
    );
    assert_eq!(a, b);
    assert_eq!("demoService", a.service_name());
    assert_eq!(OverlayId::derive("demo"), a.id());
}

#[test]
fn test_app_role_advertisements() {
    let app = AppInfo::new("demo", Requirements::default());
    let mut info = node_with(1, 0.0, 0);
    info.add_app_role(&app, "Executor", "Executing");
    info.add_app_role(&app, "Main Storage", "Storing");
    assert!(info.advertises("demo", "Executor"));

    info.remove_app_role("demo", "Executor");
    assert!(!info.advertises("demo", "Executor"));
    assert!(info.apps.contains_key("demo"));

    info.remove_app_role("demo", "Main Storage");
    assert!(info.apps.is_empty());
}

#[test]
fn test_overrides_and_staleness() {
    let mut info = node_with(1, 0.0, 0);
    let overrides = ResourceOverrides {
        cpu_load: Some(99.0),
        virtualized: Some(true),
        location: Some("us".to_string()),
        ..Default::default()
    };
    overrides.apply(&mut info);
    assert_eq!(99.0, info.resources.cpu_load);
    assert!(info.virtualized);
    assert_eq!(Some("us".to_string()), info.location);

    let ttl = Duration::from_secs(10);
    assert!(!info.is_stale(info.timestamp + 5_000, ttl));
    assert!(info.is_stale(info.timestamp + 10_001, ttl));

    let tomb = StoredRecord::Tombstone {
        name: "demo".to_string(),
    };
    assert_eq!("demo (removed)", tomb.to_string());
}
