// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use super::*;
use crate::OverlayId;

fn directory() -> Directory {
    Directory::new(NodeInfo::new(OverlayId(1), "local"), Duration::from_secs(30))
}

fn peer(id: u128, cores: u32) -> NodeInfo {
    let mut info = NodeInfo::new(OverlayId(id), format!("node-{id}"));
    info.resources.cpu_cores = cores;
    info
}

fn sorted_ids(infos: Vec<NodeInfo>) -> Vec<u128> {
    let mut ids: Vec<u128> = infos.into_iter().map(|i| i.id.0).collect();
    ids.sort_unstable();
    ids
}

#[test]
fn test_merge_learns_unknown_peer() {
    let dir = directory();
    let needs_two = Requirements {
        cpu_cores: Some(2),
        ..Default::default()
    };
    assert!(dir.suitable_for(&needs_two).is_empty());

    dir.merge(vec![peer(2, 4)]);
    assert_eq!(vec![2], sorted_ids(dir.suitable_for(&needs_two)));
}

#[test]
fn test_merge_is_idempotent() {
    let dir = directory();
    let info = peer(2, 4);
    dir.merge(vec![info.clone()]);
    let before = dir.known_peers();
    dir.merge(vec![info]);
    assert_eq!(before, dir.known_peers());
}

#[test]
fn test_merge_never_takes_older_or_equal_timestamps() {
    let dir = directory();
    let current = peer(2, 4);
    dir.merge(vec![current.clone()]);

    let mut older = current.clone();
    older.timestamp -= 10;
    older.resources.cpu_cores = 1;
    dir.merge(vec![older]);
    assert_eq!(Some(4), dir.node(&OverlayId(2)).map(|i| i.resources.cpu_cores));

    let mut same = current.clone();
    same.resources.cpu_cores = 1;
    dir.merge(vec![same]);
    assert_eq!(Some(4), dir.node(&OverlayId(2)).map(|i| i.resources.cpu_cores));

    let mut newer = current;
    newer.timestamp += 10;
    newer.resources.cpu_cores = 8;
    dir.merge(vec![newer]);
    assert_eq!(Some(8), dir.node(&OverlayId(2)).map(|i| i.resources.cpu_cores));
}

#[test]
fn test_merge_never_overwrites_local_summary() {
    let dir = directory();
    let mut forged = peer(1, 64);
    forged.timestamp += 1_000_000;
    dir.merge(vec![forged]);
    assert_eq!(0, dir.local_info().resources.cpu_cores);
    assert!(dir.known_peers().is_empty());
}

#[test]
fn test_stale_peers_are_evicted() {
    let dir = directory();
    let fresh = peer(2, 1);
    let mut stale = peer(3, 1);
    stale.timestamp -= 31_000;
    dir.merge(vec![fresh, stale]);

    assert_eq!(vec![1, 2], sorted_ids(dir.suitable_for(&Requirements::default())));
    assert_eq!(vec![1, 2], sorted_ids(dir.gossip_payload()));

    dir.evict_stale_at(unix_millis() + 60_000);
    assert_eq!(vec![1], sorted_ids(dir.gossip_payload()));
}

#[test]
fn test_aged_out_peer_is_hidden_before_eviction() {
    let dir = Directory::new(NodeInfo::new(OverlayId(1), "local"), Duration::from_millis(100));
    dir.merge(vec![peer(2, 4)]);
    assert_eq!(vec![1, 2], sorted_ids(dir.gossip_payload()));

    // no merge and no tick, so nothing evicts it
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(vec![1], sorted_ids(dir.suitable_for(&Requirements::default())));
    assert_eq!(vec![1], sorted_ids(dir.gossip_payload()));
    assert!(dir.known_peers().is_empty());
    assert!(dir.node(&OverlayId(2)).is_none());
    assert_eq!(1, dir.peers.len());
}

#[test]
fn test_local_role_advertisements_bump_timestamp() {
    let dir = directory();
    let before = dir.local_info().timestamp;
    let app = AppInfo::new("demo", Requirements::default());
    dir.add_app_role(&app, "Executor", "Executing");
    let info = dir.local_info();
    assert!(info.timestamp > before);
    assert_eq!(vec![OverlayId(1)], dir.nodes_advertising("demo", "Executor"));
    assert_eq!(vec![app.clone()], dir.known_apps());

    dir.remove_app_role("demo", "Executor");
    assert!(dir.nodes_advertising("demo", "Executor").is_empty());
}

#[test]
fn test_refresh_applies_overrides() {
    let dir = directory();
    dir.set_overrides(ResourceOverrides {
        cpu_load: Some(80.0),
        ..Default::default()
    });
    dir.refresh_local(
        ResourceSnapshot {
            cpu_cores: 4,
            cpu_load: 5.0,
            ..Default::default()
        },
        true,
    );
    let info = dir.local_info();
    assert_eq!(4, info.resources.cpu_cores);
    assert_eq!(80.0, info.resources.cpu_load);
    assert!(info.virtualized);
}

#[test]
fn test_suitable_replacement_for_virtualized_executor() {
    let dir = directory();
    let app = AppInfo::new(
        "demo",
        Requirements {
            cpu_cores: Some(2),
            ..Default::default()
        },
    );
    let mut virtual_executor = peer(2, 4);
    virtual_executor.virtualized = true;
    let physical = peer(3, 4);
    let weak = peer(4, 1);
    let mut other_virtual = peer(5, 4);
    other_virtual.virtualized = true;
    dir.merge(vec![virtual_executor, physical, weak, other_virtual]);

    let executor = OverlayId(2);
    assert!(dir
        .is_suitable_executor_for(&app, &OverlayId(3), &executor)
        .is_some());
    // the coordinator itself, the executor, weak and virtual hosts never qualify
    assert!(dir
        .is_suitable_executor_for(&app, &OverlayId(1), &executor)
        .is_none());
    assert!(dir.is_suitable_executor_for(&app, &executor, &executor).is_none());
    assert!(dir
        .is_suitable_executor_for(&app, &OverlayId(4), &executor)
        .is_none());
    assert!(dir
        .is_suitable_executor_for(&app, &OverlayId(5), &executor)
        .is_none());
    // nothing to replace when the executor is physical
    assert!(dir
        .is_suitable_executor_for(&app, &OverlayId(3), &OverlayId(4))
        .is_none());
}
