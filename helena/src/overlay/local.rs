// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! An in-process overlay. Every member of a [LocalNetwork] is a node in the
//! same process. Envelopes go through the wire codec and are delivered on
//! their own task, so delivery never blocks the sender. Records are
//! replicated on the `replication` live nodes closest to their key and are
//! re-replicated whenever membership changes.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use rand::seq::SliceRandom;

use crate::codec;
use crate::concurrency::spawn;
use crate::info::StoredRecord;
use crate::overlay::{ContentStore, Overlay, OverlayHandler};
use crate::protocol::Envelope;
use crate::{NodeId, OverlayId};

type DropFilter = Arc<dyn Fn(&NodeId, &NodeId, &Envelope) -> bool + Send + Sync>;

struct NetworkState {
    members: RwLock<BTreeMap<NodeId, Arc<dyn OverlayHandler>>>,
    records: DashMap<OverlayId, StoredRecord>,
    replicas: DashMap<NodeId, Arc<DashMap<OverlayId, StoredRecord>>>,
    replication: usize,
    drop_filter: RwLock<Option<DropFilter>>,
}

impl NetworkState {
    fn alive(&self) -> Vec<NodeId> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn handler(&self, id: &NodeId) -> Option<Arc<dyn OverlayHandler>> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn responsible_for(&self, key: &OverlayId) -> Vec<NodeId> {
        let mut alive = self.alive();
        alive.sort_by_key(|n| (n.distance(key), n.0));
        alive.truncate(self.replication);
        alive
    }

    fn replica(&self, node: NodeId) -> Arc<DashMap<OverlayId, StoredRecord>> {
        self.replicas.entry(node).or_default().clone()
    }

    fn replicate(&self, key: OverlayId, record: &StoredRecord) {
        for node in self.responsible_for(&key) {
            self.replica(node).insert(key, record.clone());
        }
    }

    fn replicate_all(&self) {
        for entry in self.records.iter() {
            self.replicate(*entry.key(), entry.value());
        }
    }

    fn dropped(&self, from: &NodeId, to: &NodeId, envelope: &Envelope) -> bool {
        self.drop_filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|filter| filter(from, to, envelope))
            .unwrap_or(false)
    }

    fn send(&self, from: NodeId, target: OverlayId, envelope: Envelope) {
        let alive = self.alive();
        let to = match target.closest(alive.iter()) {
            Some(to) => to,
            None => return,
        };
        if self.dropped(&from, &to, &envelope) {
            log::trace!("Dropping envelope from {from} to {to}");
            return;
        }
        let handler = match self.handler(&to) {
            Some(handler) => handler,
            None => return,
        };
        let frame = match codec::encode(&envelope) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Failed to encode envelope from {from}: {err}");
                return;
            }
        };
        spawn(async move {
            match codec::decode(&frame) {
                Ok(envelope) => handler.on_direct_message(from, envelope),
                Err(err) => log::error!("Failed to decode envelope from {from}: {err}"),
            }
        });
    }

    fn announce(&self, neighbor: NodeId, joined: bool) {
        let others: Vec<_> = self
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| **id != neighbor)
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in others {
            spawn(async move { handler.on_membership_changed(neighbor, joined) });
        }
    }
}

/// A set of nodes sharing one process
#[derive(Clone)]
pub struct LocalNetwork {
    state: Arc<NetworkState>,
}

impl LocalNetwork {
    /// A network replicating every record on `replication` nodes
    pub fn new(replication: usize) -> Self {
        Self {
            state: Arc::new(NetworkState {
                members: RwLock::new(BTreeMap::new()),
                records: DashMap::new(),
                replicas: DashMap::new(),
                replication: replication.max(1),
                drop_filter: RwLock::new(None),
            }),
        }
    }

    /// The overlay handle of node `id`. The node only becomes reachable once it [LocalNetwork::join]s.
    pub fn attach(&self, id: NodeId) -> Arc<LocalOverlay> {
        Arc::new(LocalOverlay {
            id,
            store: self.state.replica(id),
            state: self.state.clone(),
        })
    }

    /// Make `id` a live member delivering into `handler`
    pub fn join(&self, id: NodeId, handler: Arc<dyn OverlayHandler>) {
        self.state
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handler);
        self.state.replicate_all();
        self.state.announce(id, true);
    }

    /// Remove `id` from the live members. Its replicas stay behind.
    pub fn leave(&self, id: &NodeId) {
        let removed = self
            .state
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            self.state.replicate_all();
            self.state.announce(*id, false);
        }
    }

    /// The live members, by id
    pub fn members(&self) -> Vec<NodeId> {
        self.state.alive()
    }

    /// Drop every envelope for which `filter(from, to, envelope)` is true
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(&NodeId, &NodeId, &Envelope) -> bool + Send + Sync + 'static,
    {
        *self
            .state
            .drop_filter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(filter));
    }

    /// Deliver everything again
    pub fn clear_drop_filter(&self) {
        *self
            .state
            .drop_filter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One node's view of a [LocalNetwork]
pub struct LocalOverlay {
    id: NodeId,
    store: Arc<DashMap<OverlayId, StoredRecord>>,
    state: Arc<NetworkState>,
}

impl Overlay for LocalOverlay {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn send_point_to_point(&self, target: OverlayId, envelope: Envelope) {
        self.state.send(self.id, target, envelope);
    }

    fn is_closest_to(&self, id: &OverlayId) -> bool {
        id.closest(self.state.alive().iter()) == Some(self.id)
    }

    fn random_neighbors(&self, n: usize) -> Vec<NodeId> {
        let others: Vec<_> = self
            .state
            .alive()
            .into_iter()
            .filter(|id| *id != self.id)
            .collect();
        others
            .choose_multiple(&mut rand::thread_rng(), n)
            .copied()
            .collect()
    }

    fn leave(&self) {
        LocalNetwork {
            state: self.state.clone(),
        }
        .leave(&self.id);
    }
}

impl ContentStore for LocalOverlay {
    fn put(&self, key: OverlayId, record: StoredRecord) {
        self.state.records.insert(key, record.clone());
        self.state.replicate(key, &record);
    }

    fn scan_local_keys(&self) -> Vec<OverlayId> {
        self.store.iter().map(|entry| *entry.key()).collect()
    }

    fn get_local(&self, key: &OverlayId) -> Option<StoredRecord> {
        self.store.get(key).map(|entry| entry.value().clone())
    }
}
