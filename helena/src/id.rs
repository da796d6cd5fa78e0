// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Identifiers in the overlay's circular id space, and the role address built from them

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A point on the overlay's 128-bit identifier ring
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OverlayId(pub u128);

/// Identifies a node of the overlay
pub type NodeId = OverlayId;
/// Identifies an application's ensemble, `derive(app name)`
pub type EnsembleId = OverlayId;
/// Matches an answer to the blocking call which is waiting for it
pub type CorrelationId = OverlayId;

impl OverlayId {
    /// Deterministically hash a name into the id space
    pub fn derive(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(u128::from_be_bytes(bytes))
    }

    /// A fresh random id
    pub fn random() -> Self {
        Self(rand::random::<u128>())
    }

    /// Distance between two points on the ring, taking the shorter way around
    pub fn distance(&self, other: &OverlayId) -> u128 {
        let forward = self.0.wrapping_sub(other.0);
        let backward = other.0.wrapping_sub(self.0);
        forward.min(backward)
    }

    /// Of the given candidates, the one closest to this id. Ties go to the smaller id.
    pub fn closest<'a, I>(&self, candidates: I) -> Option<OverlayId>
    where
        I: IntoIterator<Item = &'a OverlayId>,
    {
        candidates
            .into_iter()
            .min_by_key(|c| (c.distance(self), c.0))
            .copied()
    }
}

impl Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the leading 32 bits are plenty to tell nodes apart in logs
        write!(f, "<{:08x}..>", (self.0 >> 96) as u32)
    }
}

/// The globally unique address of one role instance
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RoleId {
    /// The ensemble (application) the role works for
    pub ensemble: EnsembleId,
    /// The node hosting the role
    pub node: NodeId,
    /// Distinguishes instances within the ensemble
    pub instance: OverlayId,
}

impl RoleId {
    /// A new role address with a random instance id
    pub fn new(ensemble: EnsembleId, node: NodeId) -> Self {
        Self {
            ensemble,
            node,
            instance: OverlayId::random(),
        }
    }
}

impl Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}#{}", self.ensemble, self.node, self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::OverlayId;

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(OverlayId::derive("demo"), OverlayId::derive("demo"));
        assert_ne!(OverlayId::derive("demo"), OverlayId::derive("other"));
    }

    #[test]
    fn distance_wraps_around_the_ring() {
        let low = OverlayId(1);
        let high = OverlayId(u128::MAX);
        assert_eq!(2, low.distance(&high));
        assert_eq!(2, high.distance(&low));
        assert_eq!(0, low.distance(&low));
    }

    #[test]
    fn closest_prefers_smaller_id_on_ties() {
        let key = OverlayId(100);
        let candidates = [OverlayId(110), OverlayId(90), OverlayId(300)];
        assert_eq!(Some(OverlayId(90)), key.closest(candidates.iter()));
        assert_eq!(None, key.closest([].iter()));
    }
}
