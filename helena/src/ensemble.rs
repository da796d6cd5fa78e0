// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Ensembles group the roles a node runs on behalf of one application. An
//! ensemble is created on first reference and lives as long as the node, it is
//! only ever emptied when its roles stop.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dashmap::DashMap;

use crate::concurrency::{timeout, Duration, Notify};
use crate::protocol::RoleType;
use crate::{EnsembleId, NodeId, RoleId};

#[cfg(test)]
mod tests;

/// A running role, as the ensemble knows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHandle {
    /// The role's address
    pub id: RoleId,
    /// What the role does
    pub role_type: RoleType,
}

/// The roles one node runs for one application
pub struct Ensemble {
    id: EnsembleId,
    roles: DashMap<RoleId, RoleHandle>,
    spawn_lock: Mutex<()>,
    current_executor: RwLock<Option<RoleId>>,
    changed: Notify,
}

impl Ensemble {
    fn new(id: EnsembleId) -> Self {
        Self {
            id,
            roles: DashMap::new(),
            spawn_lock: Mutex::new(()),
            current_executor: RwLock::new(None),
            changed: Notify::new(),
        }
    }

    /// The ensemble id, `derive(app name)`
    pub fn id(&self) -> EnsembleId {
        self.id
    }

    /// The role at `id`, if it runs here
    pub fn get_specific_role(&self, id: &RoleId) -> Option<RoleHandle> {
        self.roles.get(id).map(|r| r.value().clone())
    }

    /// Every role of the given type
    pub fn get_roles(&self, role_type: RoleType) -> Vec<RoleHandle> {
        self.roles
            .iter()
            .filter(|r| r.role_type == role_type)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Whether any role of the given types runs here
    pub fn has_any(&self, types: &[RoleType]) -> bool {
        self.roles.iter().any(|r| types.contains(&r.role_type))
    }

    /// Every role in the ensemble
    pub fn roles(&self) -> Vec<RoleHandle> {
        self.roles.iter().map(|r| r.value().clone()).collect()
    }

    /// Whether the ensemble has no running role
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Register a role. Singleton types are only registered when none of the type
    /// runs yet, otherwise the running one is returned with `false`.
    pub(crate) fn add_role(&self, node: NodeId, role_type: RoleType) -> (RoleHandle, bool) {
        let _guard = self
            .spawn_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if role_type.is_singleton() {
            if let Some(existing) = self.get_roles(role_type).into_iter().next() {
                return (existing, false);
            }
        }
        let handle = RoleHandle {
            id: RoleId::new(self.id, node),
            role_type,
        };
        self.roles.insert(handle.id, handle.clone());
        (handle, true)
    }

    /// Unregister a role which has finished
    pub fn remove_role(&self, id: &RoleId) {
        if self.roles.remove(id).is_some() {
            self.changed.notify_waiters();
        }
    }

    async fn wait_until<F>(&self, dur: Duration, done: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        let wait = async {
            loop {
                let changed = self.changed.notified();
                futures::pin_mut!(changed);
                changed.as_mut().enable();
                if done(self) {
                    return;
                }
                changed.await;
            }
        };
        timeout(dur, wait).await.is_ok()
    }

    /// Wait up to `dur` for every role to finish. Returns whether the ensemble emptied.
    pub async fn wait_empty(&self, dur: Duration) -> bool {
        self.wait_until(dur, Ensemble::is_empty).await
    }

    /// Wait up to `dur` for the role `id` to finish. Returns whether it did.
    pub async fn wait_role_gone(&self, id: &RoleId, dur: Duration) -> bool {
        self.wait_until(dur, |ensemble| ensemble.get_specific_role(id).is_none())
            .await
    }

    /// The executor the local coordinator currently supervises
    pub fn current_executor(&self) -> Option<RoleId> {
        *self
            .current_executor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_current_executor(&self, executor: Option<RoleId>) {
        *self
            .current_executor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = executor;
    }
}

/// Every ensemble of a node
#[derive(Default)]
pub struct EnsembleRegistry {
    ensembles: DashMap<EnsembleId, Arc<Ensemble>>,
}

impl EnsembleRegistry {
    /// The ensemble for `id`, if it was ever referenced
    pub fn get(&self, id: &EnsembleId) -> Option<Arc<Ensemble>> {
        self.ensembles.get(id).map(|e| e.value().clone())
    }

    /// The ensemble for `id`, creating it on first reference
    pub fn get_or_create(&self, id: EnsembleId) -> Arc<Ensemble> {
        self.ensembles
            .entry(id)
            .or_insert_with(|| Arc::new(Ensemble::new(id)))
            .value()
            .clone()
    }

    /// Every ensemble
    pub fn all(&self) -> Vec<Arc<Ensemble>> {
        self.ensembles.iter().map(|e| e.value().clone()).collect()
    }

    /// Register a new role in the ensemble `id` (created if need be) and hand it to
    /// `start` to be scheduled. Returns the role's id and whether it is new. For a
    /// singleton type which already runs that is the running instance, and `start`
    /// is not called.
    pub fn start_new_role<F>(
        &self,
        id: EnsembleId,
        node: NodeId,
        role_type: RoleType,
        start: F,
    ) -> (RoleId, bool)
    where
        F: FnOnce(RoleHandle),
    {
        let ensemble = self.get_or_create(id);
        let (handle, created) = ensemble.add_role(node, role_type);
        let role_id = handle.id;
        if created {
            start(handle);
        }
        (role_id, created)
    }
}
