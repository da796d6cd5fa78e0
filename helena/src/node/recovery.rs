// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Leader recovery: the closest live node to an application id coordinates it.

use std::sync::Arc;

use super::NodeContext;
use crate::info::StoredRecord;
use crate::protocol::RoleType;

const COORDINATING: [RoleType; 3] = [
    RoleType::Deployer,
    RoleType::MainStorage,
    RoleType::Initiator,
];

impl NodeContext {
    /// Re-derive, for every application replicated here, whether this node
    /// should coordinate it. Takes over when it is closest and nothing
    /// coordinates yet, stands down when another node became closest.
    pub(crate) fn check_coordination(self: &Arc<Self>) {
        for key in self.store.scan_local_keys() {
            let record = match self.store.get_local(&key) {
                Some(record) => record,
                None => continue,
            };
            let ensemble = self.ensembles.get(&key);

            if self.overlay.is_closest_to(&key) {
                let (app, code) = match record {
                    StoredRecord::AppBinary { app, code } => (app, code),
                    StoredRecord::Tombstone { .. } => continue,
                };
                if let Some(ensemble) = &ensemble {
                    if ensemble.has_any(&COORDINATING) {
                        continue;
                    }
                    // we coordinate now, not execute
                    for executor in ensemble.get_roles(RoleType::Executor) {
                        self.stop_role(&executor);
                    }
                }
                log::info!("Node {} takes over coordination of '{}'", self.id, app.name);
                self.start_deployer(app, code);
            } else if let Some(ensemble) = ensemble {
                let leading: Vec<_> = ensemble
                    .roles()
                    .into_iter()
                    .filter(|r| matches!(r.role_type, RoleType::Initiator | RoleType::MainStorage))
                    .collect();
                if !leading.is_empty() {
                    log::info!("Node {} stands down as coordinator of {}", self.id, record);
                }
                for role in leading {
                    self.stop_role(&role);
                }
            }
        }
    }
}
