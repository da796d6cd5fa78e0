// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The structured overlay the coordination layer runs on: key-based routing,
//! closeness queries and a replicated content store.
//!
//! A node only talks to the overlay through [Overlay] and [ContentStore], and
//! the overlay calls back into the node through [OverlayHandler]. [local]
//! provides an in-memory overlay which hosts many nodes in one process.

use crate::info::StoredRecord;
use crate::protocol::Envelope;
use crate::{NodeId, OverlayId};

pub mod local;

/// Routing and closeness as seen by one node
pub trait Overlay: Send + Sync + 'static {
    /// The id of the node this overlay handle belongs to
    fn local_id(&self) -> NodeId;

    /// Send an envelope towards `target`. It is delivered to the live node
    /// closest to `target`, which is `target` itself when that node is alive.
    /// Delivery is at most once and never blocks the caller.
    fn send_point_to_point(&self, target: OverlayId, envelope: Envelope);

    /// Whether this node is the live node closest to `id`
    fn is_closest_to(&self, id: &OverlayId) -> bool;

    /// Map a name into the id space
    fn derive_id(&self, name: &str) -> OverlayId {
        OverlayId::derive(name)
    }

    /// Up to `n` distinct neighbors, picked at random
    fn random_neighbors(&self, n: usize) -> Vec<NodeId>;

    /// Leave the overlay
    fn leave(&self);
}

/// The replicated content store, as seen by one node
pub trait ContentStore: Send + Sync + 'static {
    /// Store `record` under `key` on the nodes responsible for it
    fn put(&self, key: OverlayId, record: StoredRecord);

    /// The keys of the records replicated on this node
    fn scan_local_keys(&self) -> Vec<OverlayId>;

    /// The record replicated on this node under `key`
    fn get_local(&self, key: &OverlayId) -> Option<StoredRecord>;
}

/// Callbacks from the overlay into a node. Implementations must return
/// promptly, they only enqueue work.
pub trait OverlayHandler: Send + Sync + 'static {
    /// An envelope arrived for this node
    fn on_direct_message(&self, from: NodeId, envelope: Envelope);

    /// A neighbor joined (`joined = true`) or left the overlay
    fn on_membership_changed(&self, neighbor: NodeId, joined: bool);
}
