// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

#[macro_use]
extern crate criterion;

use criterion::BatchSize;
use criterion::Criterion;
use helena::concurrency::Duration;
use helena::directory::Directory;
use helena::info::{AppInfo, NodeInfo, Requirements};
use helena::OverlayId;

fn peers(count: u128, timestamp: u64) -> Vec<NodeInfo> {
    (2..count + 2)
        .map(|id| {
            let mut info = NodeInfo::new(OverlayId(id), format!("node-{id}"));
            info.resources.cpu_cores = (id % 8) as u32;
            info.timestamp = timestamp;
            info.add_app_role(&AppInfo::new("bench", Requirements::default()), "Executor", "Executing");
            info
        })
        .collect()
}

fn fresh_directory() -> Directory {
    Directory::new(NodeInfo::new(OverlayId(1), "bench"), Duration::from_secs(3600))
}

fn merge_gossip(c: &mut Criterion) {
    let now = helena::concurrency::unix_millis();
    for size in [10u128, 100, 1000] {
        let id = format!("Merge {size} unknown peers");
        c.bench_function(&id, move |b| {
            b.iter_batched(
                || (fresh_directory(), peers(size, now)),
                |(directory, incoming)| directory.merge(incoming),
                BatchSize::SmallInput,
            );
        });

        let id = format!("Merge {size} already known peers");
        c.bench_function(&id, move |b| {
            b.iter_batched(
                || {
                    let directory = fresh_directory();
                    directory.merge(peers(size, now));
                    (directory, peers(size, now))
                },
                |(directory, incoming)| directory.merge(incoming),
                BatchSize::SmallInput,
            );
        });
    }
}

fn query_suitable(c: &mut Criterion) {
    let now = helena::concurrency::unix_millis();
    let directory = fresh_directory();
    directory.merge(peers(1000, now));
    let requirements = Requirements {
        cpu_cores: Some(4),
        ..Default::default()
    };
    c.bench_function("Suitable nodes among 1000 peers", |b| {
        b.iter(|| directory.suitable_for(&requirements))
    });
}

criterion_group!(benches, merge_gossip, query_suitable);
criterion_main!(benches);
