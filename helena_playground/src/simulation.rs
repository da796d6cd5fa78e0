// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Cluster scenarios over [LocalNetwork]

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Args;
use helena::collaborators::{AppRuntime, Collaborators, StaticSensor};
use helena::concurrency::{sleep, Duration};
use helena::errors::{ExecutionFailure, RuntimeErr};
use helena::info::{AppInfo, ResourceSnapshot};
use helena::overlay::local::LocalNetwork;
use helena::protocol::UiParams;
use helena::{Node, NodeConfig, OverlayId, Requirements, RoleType};
use rand::seq::SliceRandom;
use rand::Rng;

/// Options of the deploy scenario
#[derive(Args, Debug, Clone)]
pub struct DeployConfig {
    /// Number of nodes
    #[arg(short, long, default_value_t = 5)]
    nodes: usize,
    /// Number of applications
    #[arg(short, long, default_value_t = 3)]
    apps: usize,
    /// How much faster than real time the protocol runs
    #[arg(long, default_value_t = 10)]
    speedup: u32,
    /// Seconds to run for
    #[arg(long, default_value_t = 10)]
    seconds: u64,
}

/// Options of the churn scenario
#[derive(Args, Debug, Clone)]
pub struct ChurnConfig {
    /// Number of nodes kept alive
    #[arg(short, long, default_value_t = 6)]
    nodes: usize,
    /// Number of applications
    #[arg(short, long, default_value_t = 3)]
    apps: usize,
    /// How much faster than real time the protocol runs
    #[arg(long, default_value_t = 10)]
    speedup: u32,
    /// Number of kill-and-replace rounds
    #[arg(long, default_value_t = 5)]
    rounds: usize,
    /// Seconds between rounds
    #[arg(long, default_value_t = 5)]
    round_seconds: u64,
}

/// Pretends to run applications, answers every UI request by echoing it
struct EchoRuntime {
    node: String,
}

#[async_trait::async_trait]
impl AppRuntime for EchoRuntime {
    async fn install_and_run(&self, app: &AppInfo, code: &[u8]) -> Result<(), ExecutionFailure> {
        log::info!("[{}] running '{}' ({} bytes)", self.node, app.name, code.len());
        Ok(())
    }

    async fn stop(&self, app: &AppInfo) -> Result<(), RuntimeErr> {
        log::info!("[{}] stopped '{}'", self.node, app.name);
        Ok(())
    }

    async fn handle_ui(
        &self,
        app: &AppInfo,
        target: &str,
        params: &UiParams,
    ) -> Result<String, RuntimeErr> {
        Ok(format!("{}@{} {target} {params:?}", app.name, self.node))
    }
}

struct Cluster {
    network: LocalNetwork,
    config: NodeConfig,
    nodes: Vec<Node>,
    spawned: usize,
}

impl Cluster {
    fn new(speedup: u32) -> Self {
        Self {
            network: LocalNetwork::new(3),
            config: NodeConfig::scaled(speedup),
            nodes: Vec::new(),
            spawned: 0,
        }
    }

    fn spawn_node(&mut self) -> Node {
        let name = format!("node-{}", self.spawned);
        self.spawned += 1;
        let mut rng = rand::thread_rng();
        let snapshot = ResourceSnapshot {
            cpu_cores: rng.gen_range(1..=8),
            cpu_speed_mhz: 2400,
            cpu_load: rng.gen_range(0.0..80.0),
            memory_total_mb: 16_384,
            memory_free_mb: rng.gen_range(512..8192),
            disk_total_mb: 200_000,
            disk_free_mb: 100_000,
        };
        let runtime = Arc::new(EchoRuntime { node: name.clone() });
        let sensor = Arc::new(StaticSensor {
            snapshot,
            virtualized: false,
        });
        let id = OverlayId::derive(&name);
        let overlay = self.network.attach(id);
        let node = Node::new(
            self.config.clone(),
            name.clone(),
            overlay.clone(),
            overlay,
            Collaborators::new(runtime, sensor),
        );
        self.network.join(id, node.handler());
        node.start();
        log::info!("{name} joined as {id}");
        self.nodes.push(node.clone());
        node
    }

    fn report(&self, apps: &[String]) {
        for app in apps {
            let executors: Vec<_> = self
                .nodes
                .iter()
                .filter(|node| {
                    node.roles_for_app(app)
                        .iter()
                        .any(|r| r.role_type == RoleType::Executor)
                })
                .map(|node| node.local_info().address)
                .collect();
            let coordinators: Vec<_> = self
                .nodes
                .iter()
                .filter(|node| node.current_executor(app).is_some())
                .map(|node| node.local_info().address)
                .collect();
            log::info!("'{app}': executors {executors:?}, coordinators {coordinators:?}");
        }
    }

    async fn shutdown(&self) {
        for node in self.nodes.iter() {
            node.shutdown().await;
        }
    }
}

fn app_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("app-{i}")).collect()
}

async fn deploy_all(cluster: &Cluster, apps: &[String]) {
    let mut rng = rand::thread_rng();
    for app in apps {
        let requirements = Requirements {
            cpu_cores: Some(rng.gen_range(1..=2)),
            ..Default::default()
        };
        if let Some(node) = cluster.nodes.choose(&mut rng) {
            node.deploy(AppInfo::new(app.as_str(), requirements), app.as_bytes().to_vec());
        }
    }
}

async fn ask_all(cluster: &Cluster, apps: &[String]) {
    let mut params = BTreeMap::new();
    params.insert("from".to_string(), vec!["playground".to_string()]);
    for app in apps {
        let node = match cluster.nodes.choose(&mut rand::thread_rng()) {
            Some(node) => node.clone(),
            None => return,
        };
        match node.ui_request(app, "status", params.clone()).await {
            Ok(answer) => log::info!("'{app}' answered: {answer}"),
            Err(err) => log::warn!("'{app}' did not answer: {err}"),
        }
    }
}

/// Run with
///
/// ```bash
/// cargo run -p helena_playground -- deploy --nodes 5 --apps 3
/// ```
pub(crate) async fn deploy(config: DeployConfig) {
    let mut cluster = Cluster::new(config.speedup);
    for _ in 0..config.nodes {
        cluster.spawn_node();
    }
    // let the directories fill up before matchmaking
    sleep(cluster.config.gossip_interval * 4).await;

    let apps = app_names(config.apps);
    deploy_all(&cluster, &apps).await;

    let rounds = config.seconds.max(1);
    for _ in 0..rounds {
        sleep(Duration::from_secs(1)).await;
        cluster.report(&apps);
    }
    ask_all(&cluster, &apps).await;
    cluster.shutdown().await;
}

/// Run with
///
/// ```bash
/// cargo run -p helena_playground -- churn --nodes 6 --rounds 5
/// ```
pub(crate) async fn churn(config: ChurnConfig) {
    let mut cluster = Cluster::new(config.speedup);
    for _ in 0..config.nodes.max(2) {
        cluster.spawn_node();
    }
    sleep(cluster.config.gossip_interval * 4).await;

    let apps = app_names(config.apps);
    deploy_all(&cluster, &apps).await;
    sleep(Duration::from_secs(config.round_seconds)).await;
    cluster.report(&apps);

    for round in 0..config.rounds {
        let victim = rand::thread_rng().gen_range(0..cluster.nodes.len());
        let node = cluster.nodes.remove(victim);
        log::info!("Round {round}: killing {}", node.local_info().address);
        node.shutdown().await;
        cluster.spawn_node();

        sleep(Duration::from_secs(config.round_seconds)).await;
        cluster.report(&apps);
    }
    ask_all(&cluster, &apps).await;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
        _ = sleep(Duration::from_secs(1)) => {}
    }
    cluster.shutdown().await;
}
