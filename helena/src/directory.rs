// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The directory is a node's view of its peers. It holds one [NodeInfo] per
//! known node, merges gossiped summaries and evicts the ones which age out.
//!
//! The local node's own summary is kept apart from the peers: it is only ever
//! refreshed locally, never learned second-hand through gossip.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use dashmap::DashMap;

use crate::concurrency::{unix_millis, Duration};
use crate::info::{AppInfo, NodeInfo, Requirements, ResourceOverrides, ResourceSnapshot};
use crate::NodeId;

#[cfg(test)]
mod tests;

/// A node's view of itself and its peers
pub struct Directory {
    local: RwLock<NodeInfo>,
    overrides: RwLock<ResourceOverrides>,
    peers: DashMap<NodeId, NodeInfo>,
    ttl: Duration,
}

impl Directory {
    /// A directory knowing only the local node
    pub fn new(local: NodeInfo, ttl: Duration) -> Self {
        Self {
            local: RwLock::new(local),
            overrides: RwLock::new(ResourceOverrides::default()),
            peers: DashMap::new(),
            ttl,
        }
    }

    /// The local node's id
    pub fn local_id(&self) -> NodeId {
        self.local.read().unwrap_or_else(PoisonError::into_inner).id
    }

    /// A copy of the local node's current summary
    pub fn local_info(&self) -> NodeInfo {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_local<F>(&self, f: F)
    where
        F: FnOnce(&mut NodeInfo),
    {
        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut local);
        // strictly newer than anything gossiped before, so peers take it
        local.timestamp = unix_millis().max(local.timestamp + 1);
    }

    /// Replace the resource overrides applied on every refresh
    pub fn set_overrides(&self, overrides: ResourceOverrides) {
        *self
            .overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner) = overrides;
    }

    /// Refresh the local summary from a sensor reading, then apply the overrides
    pub fn refresh_local(&self, snapshot: ResourceSnapshot, virtualized: bool) {
        let overrides = self
            .overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.update_local(|info| {
            info.resources = snapshot;
            info.virtualized = virtualized;
            overrides.apply(info);
        });
    }

    /// Advertise a role of the local node for `app`
    pub fn add_app_role(&self, app: &AppInfo, role: &str, status: &str) {
        self.update_local(|info| info.add_app_role(app, role, status));
    }

    /// Withdraw an advertised role of the local node
    pub fn remove_app_role(&self, app: &str, role: &str) {
        self.update_local(|info| info.remove_app_role(app, role));
    }

    /// Merge gossiped summaries. An entry is taken when its node is unknown or
    /// its timestamp is strictly newer than the one held, the local node's own
    /// summary is never replaced. Stale entries are evicted afterwards.
    pub fn merge<I>(&self, incoming: I)
    where
        I: IntoIterator<Item = NodeInfo>,
    {
        let local_id = self.local_id();
        for info in incoming {
            if info.id == local_id {
                continue;
            }
            match self.peers.entry(info.id) {
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(info);
                }
                dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                    if info.timestamp > occupied.get().timestamp {
                        occupied.insert(info);
                    }
                }
            }
        }
        self.evict_stale();
    }

    /// Remove every peer whose summary is older than the TTL
    pub fn evict_stale(&self) {
        self.evict_stale_at(unix_millis());
    }

    pub(crate) fn evict_stale_at(&self, now: u64) {
        let ttl = self.ttl;
        self.peers.retain(|id, info| {
            let keep = !info.is_stale(now, ttl);
            if !keep {
                log::debug!("Evicting stale summary of node {id}");
            }
            keep
        });
    }

    /// Forget every peer
    pub fn reset(&self) {
        self.peers.clear();
    }

    /// What the node gossips: every known peer plus itself
    pub fn gossip_payload(&self) -> Vec<NodeInfo> {
        let mut payload = self.known_peers();
        payload.push(self.local_info());
        payload
    }

    /// The known peers, without the local node. A peer which aged out since
    /// the last eviction is already left out.
    pub fn known_peers(&self) -> Vec<NodeInfo> {
        let now = unix_millis();
        self.peers
            .iter()
            .filter(|e| !e.value().is_stale(now, self.ttl))
            .map(|e| e.value().clone())
            .collect()
    }

    fn fresh_peer(&self, id: &NodeId) -> Option<NodeInfo> {
        self.peers
            .get(id)
            .map(|e| e.value().clone())
            .filter(|info| !info.is_stale(unix_millis(), self.ttl))
    }

    /// Every known node, the local node included
    pub fn all_nodes(&self) -> Vec<NodeInfo> {
        self.gossip_payload()
    }

    /// The summary of `id`, local node included
    pub fn node(&self, id: &NodeId) -> Option<NodeInfo> {
        if *id == self.local_id() {
            return Some(self.local_info());
        }
        self.fresh_peer(id)
    }

    /// Every known node, the local node included, meeting `requirements`
    pub fn suitable_for(&self, requirements: &Requirements) -> Vec<NodeInfo> {
        self.all_nodes()
            .into_iter()
            .filter(|info| requirements.is_satisfied_by(info))
            .collect()
    }

    /// The summary of `candidate` if it could replace the virtualized executor
    /// running on `current_executor`. The candidate must be neither this
    /// (coordinating) node nor the executor's node, must be physical and meet the
    /// application's requirements, and the executor's node must be virtualized.
    pub fn is_suitable_executor_for(
        &self,
        app: &AppInfo,
        candidate: &NodeId,
        current_executor: &NodeId,
    ) -> Option<NodeInfo> {
        if *candidate == self.local_id() || candidate == current_executor {
            return None;
        }
        let info = self.fresh_peer(candidate)?;
        if info.virtualized || !app.requirements.is_satisfied_by(&info) {
            return None;
        }
        let executor = self.node(current_executor)?;
        if executor.virtualized {
            Some(info)
        } else {
            None
        }
    }

    /// Nodes, local included, which advertise `role` for the application `app`
    pub fn nodes_advertising(&self, app: &str, role: &str) -> Vec<NodeId> {
        self.all_nodes()
            .into_iter()
            .filter(|info| info.advertises(app, role))
            .map(|info| info.id)
            .collect()
    }

    /// Every application advertised by any known node
    pub fn known_apps(&self) -> Vec<AppInfo> {
        let mut seen = HashSet::new();
        self.all_nodes()
            .into_iter()
            .flat_map(|info| info.apps.into_values().map(|a| a.app))
            .filter(|app| seen.insert(app.name.clone()))
            .collect()
    }
}
