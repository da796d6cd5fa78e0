// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The external collaborators a node drives: the application runtime which
//! installs and runs code, the local resource sensor, the elastic
//! infrastructure which provisions hosts, and the matchmaking policy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{ElasticErr, ExecutionFailure, RuntimeErr};
use crate::info::{AppInfo, HostHandle, NodeInfo, Requirements, ResourceSnapshot};
use crate::protocol::UiParams;
use crate::NodeId;

/// Installs, runs and stops application packages
#[async_trait]
pub trait AppRuntime: Send + Sync + 'static {
    /// Install `code` for `app` and start it
    async fn install_and_run(&self, app: &AppInfo, code: &[u8]) -> Result<(), ExecutionFailure>;

    /// Stop and uninstall `app`
    async fn stop(&self, app: &AppInfo) -> Result<(), RuntimeErr>;

    /// Serve one UI request of the running `app`
    async fn handle_ui(
        &self,
        app: &AppInfo,
        target: &str,
        params: &UiParams,
    ) -> Result<String, RuntimeErr>;
}

/// Reads the local node's resources
pub trait ResourceSensor: Send + Sync + 'static {
    /// A fresh reading
    fn snapshot(&self) -> ResourceSnapshot;

    /// Whether the node runs on a virtualized host
    fn is_virtualized(&self) -> bool {
        false
    }
}

/// A sensor which always reports the same reading
#[derive(Debug, Clone, Default)]
pub struct StaticSensor {
    /// The reading
    pub snapshot: ResourceSnapshot,
    /// The virtualization flag
    pub virtualized: bool,
}

impl ResourceSensor for StaticSensor {
    fn snapshot(&self) -> ResourceSnapshot {
        self.snapshot.clone()
    }

    fn is_virtualized(&self) -> bool {
        self.virtualized
    }
}

/// What a provisioned host should look like
#[derive(Debug, Clone, PartialEq)]
pub struct HostSpec {
    /// Cpu cores
    pub cpu_cores: u32,
    /// Memory in MB
    pub memory_mb: u64,
}

/// Creates and destroys virtual execution hosts. Calls may take minutes.
#[async_trait]
pub trait ElasticInfrastructure: Send + Sync + 'static {
    /// Request a new host
    async fn create_host(&self, spec: HostSpec) -> Result<HostHandle, ElasticErr>;

    /// Wait until the host is up
    async fn poll_until_running(&self, handle: &HostHandle) -> Result<(), ElasticErr>;

    /// Tear the host down and wait until it is gone
    async fn destroy_host(&self, handle: &HostHandle) -> Result<(), ElasticErr>;
}

/// Picks the node which should execute an application
pub trait Matchmaker: Send + Sync + 'static {
    /// Choose one of `candidates` for an application with `requirements`
    fn choose(&self, requirements: &Requirements, candidates: &[NodeInfo]) -> Option<NodeId>;
}

/// Picks the least loaded physical node meeting the requirements, falling
/// back to virtualized nodes
#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementsMatchmaker;

impl Matchmaker for RequirementsMatchmaker {
    fn choose(&self, requirements: &Requirements, candidates: &[NodeInfo]) -> Option<NodeId> {
        candidates
            .iter()
            .filter(|c| requirements.is_satisfied_by(c))
            .min_by(|a, b| {
                a.virtualized
                    .cmp(&b.virtualized)
                    .then(a.resources.cpu_load.total_cmp(&b.resources.cpu_load))
                    .then(a.id.cmp(&b.id))
            })
            .map(|c| c.id)
    }
}

/// Everything outside the coordination layer a node needs
#[derive(Clone)]
pub struct Collaborators {
    /// Runs the applications
    pub runtime: Arc<dyn AppRuntime>,
    /// Reads local resources
    pub sensor: Arc<dyn ResourceSensor>,
    /// Picks executors
    pub matchmaker: Arc<dyn Matchmaker>,
    /// Provisions hosts, if configured
    pub elastic: Option<Arc<dyn ElasticInfrastructure>>,
}

impl Collaborators {
    /// The given runtime and sensor, the default matchmaker and no elastic infrastructure
    pub fn new(runtime: Arc<dyn AppRuntime>, sensor: Arc<dyn ResourceSensor>) -> Self {
        Self {
            runtime,
            sensor,
            matchmaker: Arc::new(RequirementsMatchmaker),
            elastic: None,
        }
    }

    /// Replace the matchmaking policy
    pub fn with_matchmaker(mut self, matchmaker: Arc<dyn Matchmaker>) -> Self {
        self.matchmaker = matchmaker;
        self
    }

    /// Enable elastic provisioning
    pub fn with_elastic(mut self, elastic: Arc<dyn ElasticInfrastructure>) -> Self {
        self.elastic = Some(elastic);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Matchmaker, RequirementsMatchmaker};
    use crate::info::{NodeInfo, Requirements};
    use crate::OverlayId;

    fn candidate(id: u128, cores: u32, load: f64, virtualized: bool) -> NodeInfo {
        let mut info = NodeInfo::new(OverlayId(id), "candidate");
        info.resources.cpu_cores = cores;
        info.resources.cpu_load = load;
        info.virtualized = virtualized;
        info
    }

    #[test]
    fn test_matchmaker_prefers_physical_then_idle() {
        let req = Requirements {
            cpu_cores: Some(2),
            ..Default::default()
        };
        let candidates = vec![
            candidate(1, 1, 0.0, false),
            candidate(2, 4, 50.0, false),
            candidate(3, 4, 10.0, true),
            candidate(4, 4, 20.0, false),
        ];
        assert_eq!(
            Some(OverlayId(4)),
            RequirementsMatchmaker.choose(&req, &candidates)
        );
        let only_virtual = vec![candidates[0].clone(), candidates[2].clone()];
        assert_eq!(
            Some(OverlayId(3)),
            RequirementsMatchmaker.choose(&req, &only_virtual)
        );
        assert_eq!(None, RequirementsMatchmaker.choose(&req, &candidates[..1]));
    }
}
