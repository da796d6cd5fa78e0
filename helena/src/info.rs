// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The data exchanged about nodes and applications: resource snapshots,
//! requirements, node capability summaries and stored application records

use std::collections::BTreeMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::concurrency::Duration;
use crate::errors::{ExecutionFailure, RequirementsErr};
use crate::NodeId;

#[cfg(test)]
mod tests;

/// A point-in-time reading of a node's resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Number of cpu cores
    pub cpu_cores: u32,
    /// Cpu clock speed in MHz
    pub cpu_speed_mhz: u32,
    /// Cpu load in percent
    pub cpu_load: f64,
    /// Total memory in MB
    pub memory_total_mb: u64,
    /// Free memory in MB
    pub memory_free_mb: u64,
    /// Total disk in MB
    pub disk_total_mb: u64,
    /// Free disk in MB
    pub disk_free_mb: u64,
}

/// What an application needs from the node executing it. Every constraint is
/// optional, an empty [Requirements] is satisfied by any node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// Minimum number of cpu cores
    pub cpu_cores: Option<u32>,
    /// Minimum cpu speed in MHz
    pub cpu_speed_mhz: Option<u32>,
    /// Maximum tolerated cpu load in percent
    pub max_cpu_load: Option<f64>,
    /// Minimum total memory in MB
    pub memory_total_mb: Option<u64>,
    /// Minimum free memory in MB
    pub memory_free_mb: Option<u64>,
    /// Minimum free disk in MB
    pub disk_free_mb: Option<u64>,
    /// Locations the application may run in, empty means anywhere
    pub locations: Vec<String>,
    /// The application must not run on a virtualized host
    pub no_virtualization: bool,
}

impl Requirements {
    /// Parse a `key=value` properties document. Blank lines and lines starting
    /// with `#` or `!` are skipped, unknown keys are ignored.
    ///
    /// Recognized keys: `cpu.cores`, `cpu.speed`, `cpu.load.max`, `memory.total`,
    /// `memory.free`, `disk.free`, `locations` (comma separated) and
    /// `virtualization.forbidden`.
    pub fn from_properties(bytes: &[u8]) -> Result<Self, RequirementsErr> {
        let text = std::str::from_utf8(bytes).map_err(|_| RequirementsErr::Encoding)?;
        let mut req = Requirements::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| RequirementsErr::MalformedLine(line.to_string()))?;
            match key {
                "cpu.cores" => req.cpu_cores = Some(parse_value(key, value)?),
                "cpu.speed" => req.cpu_speed_mhz = Some(parse_value(key, value)?),
                "cpu.load.max" => req.max_cpu_load = Some(parse_value(key, value)?),
                "memory.total" => req.memory_total_mb = Some(parse_value(key, value)?),
                "memory.free" => req.memory_free_mb = Some(parse_value(key, value)?),
                "disk.free" => req.disk_free_mb = Some(parse_value(key, value)?),
                "locations" => {
                    req.locations = value
                        .split(',')
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(String::from)
                        .collect()
                }
                "virtualization.forbidden" => req.no_virtualization = parse_value(key, value)?,
                other => log::debug!("Ignoring unknown requirement '{other}'"),
            }
        }
        Ok(req)
    }

    /// Whether the node described by `info` meets every constraint
    pub fn is_satisfied_by(&self, info: &NodeInfo) -> bool {
        let res = &info.resources;
        let at_least = |need: Option<u64>, have: u64| need.map_or(true, |n| have >= n);

        self.cpu_cores.map_or(true, |n| res.cpu_cores >= n)
            && self.cpu_speed_mhz.map_or(true, |n| res.cpu_speed_mhz >= n)
            && self.max_cpu_load.map_or(true, |max| res.cpu_load <= max)
            && at_least(self.memory_total_mb, res.memory_total_mb)
            && at_least(self.memory_free_mb, res.memory_free_mb)
            && at_least(self.disk_free_mb, res.disk_free_mb)
            && (self.locations.is_empty()
                || info
                    .location
                    .as_ref()
                    .map_or(false, |l| self.locations.contains(l)))
            && !(self.no_virtualization && info.virtualized)
    }

    /// Whether the application may be placed on a freshly provisioned virtual host
    pub fn allows_virtualization(&self) -> bool {
        !self.no_virtualization
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RequirementsErr> {
    value.parse().map_err(|_| RequirementsErr::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// An application known to the system. Two [AppInfo]s are the same application
/// when their names match, regardless of requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    /// Globally unique application name
    pub name: String,
    /// What the application needs from its executor
    pub requirements: Requirements,
}

impl AppInfo {
    /// A new application description
    pub fn new(name: impl Into<String>, requirements: Requirements) -> Self {
        Self {
            name: name.into(),
            requirements,
        }
    }

    /// The application's id in the overlay, which is also its ensemble id
    pub fn id(&self) -> crate::EnsembleId {
        crate::OverlayId::derive(&self.name)
    }

    /// The name the application's service is published under
    pub fn service_name(&self) -> String {
        format!("{}Service", self.name)
    }
}

impl PartialEq for AppInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AppInfo {}

impl Hash for AppInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for AppInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Opaque handle of a host created by the elastic infrastructure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostHandle(pub String);

impl Display for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The roles a node advertises for one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertisedApp {
    /// The application
    pub app: AppInfo,
    /// Role name to human readable status
    pub roles: BTreeMap<String, String>,
}

/// The capability summary gossiped about every node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The node's overlay id
    pub id: NodeId,
    /// Where the node can be reached
    pub address: String,
    /// The last resource reading
    pub resources: ResourceSnapshot,
    /// Whether the node runs on a virtualized host
    pub virtualized: bool,
    /// The elastic host backing this node, if it was provisioned
    pub deployment: Option<HostHandle>,
    /// Location label of the node
    pub location: Option<String>,
    /// Advertised roles, keyed by application name
    pub apps: BTreeMap<String, AdvertisedApp>,
    /// Milliseconds since the unix epoch of the last refresh
    pub timestamp: u64,
}

impl NodeInfo {
    /// A fresh summary with an empty resource reading
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            resources: ResourceSnapshot::default(),
            virtualized: false,
            deployment: None,
            location: None,
            apps: BTreeMap::new(),
            timestamp: crate::concurrency::unix_millis(),
        }
    }

    /// Whether the summary is older than `ttl` at time `now` (unix millis)
    pub fn is_stale(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.timestamp) > ttl.as_millis() as u64
    }

    /// Whether the node advertises `role` for the application `app`
    pub fn advertises(&self, app: &str, role: &str) -> bool {
        self.apps
            .get(app)
            .map_or(false, |a| a.roles.contains_key(role))
    }

    /// Advertise (or update the status of) a role for an application
    pub fn add_app_role(&mut self, app: &AppInfo, role: &str, status: &str) {
        self.apps
            .entry(app.name.clone())
            .or_insert_with(|| AdvertisedApp {
                app: app.clone(),
                roles: BTreeMap::new(),
            })
            .roles
            .insert(role.to_string(), status.to_string());
    }

    /// Withdraw a role advertisement, dropping the application once it has none
    pub fn remove_app_role(&mut self, app: &str, role: &str) {
        if let Some(advertised) = self.apps.get_mut(app) {
            advertised.roles.remove(role);
            if advertised.roles.is_empty() {
                self.apps.remove(app);
            }
        }
    }
}

/// Local overrides applied over the sensor reading on each refresh, used to
/// inject conditions in tests and simulations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceOverrides {
    /// Cpu load in percent
    pub cpu_load: Option<f64>,
    /// Free memory in MB
    pub free_memory: Option<u64>,
    /// Free disk in MB
    pub free_disk: Option<u64>,
    /// Virtualization flag
    pub virtualized: Option<bool>,
    /// Location label
    pub location: Option<String>,
    /// Elastic host backing the node
    pub deployment: Option<HostHandle>,
}

impl ResourceOverrides {
    /// Overlay the set fields onto `info`
    pub fn apply(&self, info: &mut NodeInfo) {
        if let Some(load) = self.cpu_load {
            info.resources.cpu_load = load;
        }
        if let Some(mem) = self.free_memory {
            info.resources.memory_free_mb = mem;
        }
        if let Some(disk) = self.free_disk {
            info.resources.disk_free_mb = disk;
        }
        if let Some(virtualized) = self.virtualized {
            info.virtualized = virtualized;
        }
        if let Some(location) = &self.location {
            info.location = Some(location.clone());
        }
        if let Some(deployment) = &self.deployment {
            info.deployment = Some(deployment.clone());
        }
    }
}

/// Outcome of an execution attempt, reported by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// The application is installed and running
    Success,
    /// The application could not be brought up
    Failed(ExecutionFailure),
}

/// A record of the replicated content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredRecord {
    /// A deployed application and its code
    AppBinary {
        /// The application
        app: AppInfo,
        /// The application package
        code: Vec<u8>,
    },
    /// Marks the removal of an application
    Tombstone {
        /// The removed application's name
        name: String,
    },
}

impl Display for StoredRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppBinary { app, .. } => write!(f, "{}", app.name),
            Self::Tombstone { name } => write!(f, "{name} (removed)"),
        }
    }
}
