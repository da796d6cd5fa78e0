// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Tunable timings and counts of the coordination protocol

use crate::concurrency::Duration;

/// Configuration of one coordination node. The closest-node rule, the gossip
/// TTL and the liveness interval interact, so they are tuned together.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Period of the gossip tick
    pub gossip_interval: Duration,
    /// Number of random neighbors gossiped to per tick
    pub gossip_fanout: usize,
    /// Age after which a peer summary is evicted
    pub node_info_ttl: Duration,
    /// How long a correlated send waits for its answer
    pub route_timeout: Duration,
    /// How long a new initiator waits for its init request
    pub init_request_timeout: Duration,
    /// How long one-shot roles wait for the request which sets them up
    pub role_setup_timeout: Duration,
    /// How long an executor waits for the application code
    pub code_request_timeout: Duration,
    /// How long a requester waits for the coordinator to report the executor
    pub executor_report_timeout: Duration,
    /// How long a requester waits for the application's UI answer
    pub ui_response_timeout: Duration,
    /// How long a UI call into the node waits overall
    pub ui_request_timeout: Duration,
    /// Pause between failed executor searches
    pub search_backoff: Duration,
    /// Failed search cycles before an elastic host is provisioned
    pub attempts_before_host_creation: u32,
    /// Delay before the first liveness ping of a new executor
    pub liveness_initial_delay: Duration,
    /// Pause between liveness pings of a healthy executor
    pub liveness_interval: Duration,
    /// How long a ping waits for its pong
    pub pong_timeout: Duration,
    /// Pause between pings while the executor violates the requirements
    pub requirements_recheck_interval: Duration,
    /// How long a physical executor may violate the requirements
    pub requirements_grace: Duration,
    /// How often a virtualized executor is checked for a physical replacement
    pub virtualized_check_interval: Duration,
    /// How long a potential executor waits for its executor to come up
    pub execution_timeout: Duration,
    /// How long an initiator waits for a recruited executor, [None] waits forever
    pub recruit_timeout: Option<Duration>,
    /// How long a deployer waits for the storage outcome before retrying, [None] waits forever
    pub storage_outcome_timeout: Option<Duration>,
    /// An executor which is not pinged for this long stops, [None] never
    pub executor_orphan_timeout: Option<Duration>,
    /// Pause before a deployment or undeployment step is retried
    pub retry_backoff: Duration,
    /// Minimum cpu cores of a provisioned host
    pub default_host_cpu: u32,
    /// Minimum memory of a provisioned host, in MB
    pub default_host_memory_mb: u64,
    /// How long shutdown waits for the ensembles to empty
    pub shutdown_grace: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_millis(2500),
            gossip_fanout: 2,
            node_info_ttl: Duration::from_secs(30),
            route_timeout: Duration::from_secs(5),
            init_request_timeout: Duration::from_secs(5),
            role_setup_timeout: Duration::from_secs(10),
            code_request_timeout: Duration::from_secs(5),
            executor_report_timeout: Duration::from_secs(5),
            ui_response_timeout: Duration::from_secs(20),
            ui_request_timeout: Duration::from_secs(30),
            search_backoff: Duration::from_secs(2),
            attempts_before_host_creation: 5,
            liveness_initial_delay: Duration::from_secs(15),
            liveness_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(5),
            requirements_recheck_interval: Duration::from_secs(1),
            requirements_grace: Duration::from_secs(60),
            virtualized_check_interval: Duration::from_secs(300),
            execution_timeout: Duration::from_secs(60),
            recruit_timeout: None,
            storage_outcome_timeout: Some(Duration::from_secs(30)),
            executor_orphan_timeout: Some(Duration::from_secs(120)),
            retry_backoff: Duration::from_secs(1),
            default_host_cpu: 2,
            default_host_memory_mb: 2048,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl NodeConfig {
    /// Timings scaled down for in-process simulations and tests, every
    /// wait shrinks by the same factor so their ratios hold
    pub fn scaled(factor: u32) -> Self {
        let base = Self::default();
        let div = |d: Duration| d / factor.max(1);
        Self {
            gossip_interval: div(base.gossip_interval),
            node_info_ttl: div(base.node_info_ttl),
            route_timeout: div(base.route_timeout),
            init_request_timeout: div(base.init_request_timeout),
            role_setup_timeout: div(base.role_setup_timeout),
            code_request_timeout: div(base.code_request_timeout),
            executor_report_timeout: div(base.executor_report_timeout),
            ui_response_timeout: div(base.ui_response_timeout),
            ui_request_timeout: div(base.ui_request_timeout),
            search_backoff: div(base.search_backoff),
            liveness_initial_delay: div(base.liveness_initial_delay),
            liveness_interval: div(base.liveness_interval),
            pong_timeout: div(base.pong_timeout),
            requirements_recheck_interval: div(base.requirements_recheck_interval),
            requirements_grace: div(base.requirements_grace),
            virtualized_check_interval: div(base.virtualized_check_interval),
            execution_timeout: div(base.execution_timeout),
            recruit_timeout: base.recruit_timeout.map(div),
            storage_outcome_timeout: base.storage_outcome_timeout.map(div),
            executor_orphan_timeout: base.executor_orphan_timeout.map(div),
            retry_backoff: div(base.retry_backoff),
            shutdown_grace: div(base.shutdown_grace),
            ..base
        }
    }
}
