// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::collaborators::{
    AppRuntime, Collaborators, ElasticInfrastructure, HostSpec, Matchmaker, RequirementsMatchmaker,
    StaticSensor,
};
use crate::concurrency::{sleep, Duration, Instant};
use crate::errors::{ElasticErr, ExecutionFailure, RuntimeErr};
use crate::info::{AppInfo, HostHandle, NodeInfo, Requirements, ResourceSnapshot};
use crate::overlay::local::LocalNetwork;
use crate::protocol::{RoleType, UiParams};
use crate::{Node, NodeConfig, NodeId, OverlayId};

pub async fn periodic_check<F>(check: F, timeout: Duration)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert!(check(), "Periodic check failed");
}

pub async fn periodic_async_check<F, Fut>(check: F, timeout: Duration)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check().await {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert!(check().await, "Async periodic check failed");
}

/// Timings short enough for tests
pub fn test_config() -> NodeConfig {
    NodeConfig::scaled(20)
}

/// Counts what the coordination layer asks of it and answers UI requests
/// with `<app>:<target>`
#[derive(Default)]
pub struct RecordingRuntime {
    installs: AtomicUsize,
    stops: AtomicUsize,
    fail_install: AtomicBool,
}

impl RecordingRuntime {
    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn fail_installs(&self, fail: bool) {
        self.fail_install.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AppRuntime for RecordingRuntime {
    async fn install_and_run(&self, _app: &AppInfo, _code: &[u8]) -> Result<(), ExecutionFailure> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail_install.load(Ordering::SeqCst) {
            Err(ExecutionFailure::CouldNotInstall)
        } else {
            Ok(())
        }
    }

    async fn stop(&self, _app: &AppInfo) -> Result<(), RuntimeErr> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_ui(
        &self,
        app: &AppInfo,
        target: &str,
        _params: &UiParams,
    ) -> Result<String, RuntimeErr> {
        Ok(format!("{}:{target}", app.name))
    }
}

/// Hands out numbered hosts which never run anything
#[derive(Default)]
pub struct FakeElastic {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    fail_polls: AtomicBool,
}

impl FakeElastic {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn fail_polls(&self, fail: bool) {
        self.fail_polls.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ElasticInfrastructure for FakeElastic {
    async fn create_host(&self, spec: HostSpec) -> Result<HostHandle, ElasticErr> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(HostHandle(format!("host-{n}-{}cpu", spec.cpu_cores)))
    }

    async fn poll_until_running(&self, handle: &HostHandle) -> Result<(), ElasticErr> {
        if self.fail_polls.load(Ordering::SeqCst) {
            Err(ElasticErr(format!("{handle} never came up")))
        } else {
            Ok(())
        }
    }

    async fn destroy_host(&self, _handle: &HostHandle) -> Result<(), ElasticErr> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Only ever picks the preferred node, and only once it is a fitting candidate.
/// Without a preference it defers to [RequirementsMatchmaker].
#[derive(Default)]
pub struct PreferNode(pub RwLock<Option<NodeId>>);

impl Matchmaker for PreferNode {
    fn choose(&self, requirements: &Requirements, candidates: &[NodeInfo]) -> Option<NodeId> {
        let preferred = *self.0.read().unwrap();
        match preferred {
            Some(id) => candidates
                .iter()
                .find(|c| c.id == id && requirements.is_satisfied_by(c))
                .map(|c| c.id),
            None => RequirementsMatchmaker.choose(requirements, candidates),
        }
    }
}

pub fn roomy_snapshot() -> ResourceSnapshot {
    ResourceSnapshot {
        cpu_cores: 4,
        cpu_speed_mhz: 2400,
        cpu_load: 10.0,
        memory_total_mb: 8192,
        memory_free_mb: 4096,
        disk_total_mb: 100_000,
        disk_free_mb: 50_000,
    }
}

/// A node id `offset` away from the id of application `name`
pub fn id_near(name: &str, offset: u128) -> NodeId {
    OverlayId(OverlayId::derive(name).0.wrapping_add(offset))
}

pub struct TestNode {
    pub node: Node,
    pub runtime: Arc<RecordingRuntime>,
}

impl TestNode {
    pub fn count(&self, app: &str, role_type: RoleType) -> usize {
        self.node
            .roles_for_app(app)
            .iter()
            .filter(|r| r.role_type == role_type)
            .count()
    }
}

/// Nodes on one [LocalNetwork], sharing one matchmaker
pub struct TestCluster {
    pub network: LocalNetwork,
    pub nodes: Vec<TestNode>,
    pub matchmaker: Arc<PreferNode>,
    pub elastic: Option<Arc<FakeElastic>>,
    /// Used by every node added from now on
    pub config: NodeConfig,
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            network: LocalNetwork::new(3),
            nodes: Vec::new(),
            matchmaker: Arc::new(PreferNode::default()),
            elastic: None,
            config: test_config(),
        }
    }

    pub fn with_nodes(ids: &[NodeId]) -> Self {
        let mut cluster = Self::new();
        for id in ids {
            cluster.add(*id);
        }
        cluster
    }

    /// Start a node and join it to the network. Returns its index.
    pub fn add(&mut self, id: NodeId) -> usize {
        let runtime = Arc::new(RecordingRuntime::default());
        let sensor = Arc::new(StaticSensor {
            snapshot: roomy_snapshot(),
            virtualized: false,
        });
        let mut collaborators =
            Collaborators::new(runtime.clone(), sensor).with_matchmaker(self.matchmaker.clone());
        if let Some(elastic) = &self.elastic {
            collaborators = collaborators.with_elastic(elastic.clone());
        }
        let overlay = self.network.attach(id);
        let node = Node::new(
            self.config.clone(),
            format!("node-{}", self.nodes.len()),
            overlay.clone(),
            overlay,
            collaborators,
        );
        self.network.join(id, node.handler());
        node.start();
        self.nodes.push(TestNode { node, runtime });
        self.nodes.len() - 1
    }

    pub fn prefer(&self, id: Option<NodeId>) {
        *self.matchmaker.0.write().unwrap() = id;
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.node.id() == id)
    }

    pub async fn shutdown(&self) {
        for node in self.nodes.iter() {
            node.node.shutdown().await;
        }
    }
}
