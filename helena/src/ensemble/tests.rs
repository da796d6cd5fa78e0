// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::concurrency::{sleep, spawn};
use crate::OverlayId;

const NODE: OverlayId = OverlayId(9);

#[test]
fn test_ensembles_are_created_lazily() {
    let registry = EnsembleRegistry::default();
    let id = OverlayId::derive("demo");
    assert!(registry.get(&id).is_none());

    let ensemble = registry.get_or_create(id);
    assert_eq!(id, ensemble.id());
    assert!(ensemble.is_empty());
    assert!(Arc::ptr_eq(&ensemble, &registry.get_or_create(id)));
    assert_eq!(1, registry.all().len());
}

#[test]
fn test_start_new_role_schedules_once_per_singleton() {
    let registry = EnsembleRegistry::default();
    let id = OverlayId::derive("demo");
    let started = AtomicUsize::new(0);
    let start = |_: RoleHandle| {
        started.fetch_add(1, Ordering::SeqCst);
    };

    let (first, created) = registry.start_new_role(id, NODE, RoleType::Initiator, start);
    assert!(created);
    let (second, created) = registry.start_new_role(id, NODE, RoleType::Initiator, start);
    assert!(!created);
    assert_eq!(first, second);
    assert_eq!(1, started.load(Ordering::SeqCst));

    let (a, _) = registry.start_new_role(id, NODE, RoleType::Requester, start);
    let (b, _) = registry.start_new_role(id, NODE, RoleType::Requester, start);
    assert_ne!(a, b);
    assert_eq!(3, started.load(Ordering::SeqCst));

    let ensemble = registry.get(&id).expect("Ensemble missing");
    assert_eq!(2, ensemble.get_roles(RoleType::Requester).len());
    assert!(ensemble.has_any(&[RoleType::Deployer, RoleType::Initiator]));
    assert!(!ensemble.has_any(&[RoleType::Executor]));
    assert_eq!(
        Some(RoleType::Initiator),
        ensemble.get_specific_role(&first).map(|r| r.role_type)
    );
    assert_eq!(NODE, first.node);
    assert_eq!(id, first.ensemble);
}

#[tokio::test]
async fn test_wait_empty_observes_last_removal() {
    let registry = EnsembleRegistry::default();
    let ensemble = registry.get_or_create(OverlayId::derive("demo"));
    let (a, _) = ensemble.add_role(NODE, RoleType::Deployer);
    let (b, _) = ensemble.add_role(NODE, RoleType::Executor);

    assert!(!ensemble.wait_empty(Duration::from_millis(20)).await);

    let (a_id, b_id) = (a.id, b.id);
    let remover = ensemble.clone();
    spawn(async move {
        sleep(Duration::from_millis(20)).await;
        remover.remove_role(&a_id);
        sleep(Duration::from_millis(20)).await;
        remover.remove_role(&b_id);
    });
    assert!(ensemble.wait_empty(Duration::from_secs(2)).await);
    assert!(ensemble.get_specific_role(&b_id).is_none());
}
