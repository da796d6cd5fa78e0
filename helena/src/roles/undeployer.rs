// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Removes an application: tombstones its record, then stops its coordinator
//! and its main storage. Retries until both are gone.

use async_trait::async_trait;

use crate::errors::RoleErr;
use crate::info::{AppInfo, StoredRecord};
use crate::protocol::{MessageKind, RoleBody, RoleMessage, RoleType};
use crate::role::{Role, RoleContext};

#[derive(Default)]
pub(crate) struct UndeployerRole;

impl UndeployerRole {
    /// Locate the role and hand it `body`. Done when delivered or when nothing is there.
    async fn stop(
        &self,
        ctx: &RoleContext,
        app: &AppInfo,
        role_type: RoleType,
        body: RoleBody,
    ) -> Result<(), RoleErr> {
        let target = match ctx.get_role_instance(app.id(), role_type).await {
            Ok(target) => target,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        match ctx.send(target, body).await {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }
}

#[async_trait]
impl Role for UndeployerRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let request = ctx
            .wait_for(
                Some(ctx.config().role_setup_timeout),
                &[MessageKind::UndeployApp],
            )
            .await;
        let app = match request {
            Ok(RoleMessage {
                body: RoleBody::UndeployApp { app },
                ..
            }) => app,
            _ => return,
        };
        ctx.advertise(&app, "Undeploying");
        ctx.node().store.put(
            app.id(),
            StoredRecord::Tombstone {
                name: app.name.clone(),
            },
        );

        let steps = [
            (
                RoleType::Initiator,
                RoleBody::StopAppHandling { app: app.clone() },
            ),
            (
                RoleType::MainStorage,
                RoleBody::UndeployApp { app: app.clone() },
            ),
        ];
        for (role_type, body) in steps.iter() {
            loop {
                match self.stop(ctx, &app, *role_type, body.clone()).await {
                    Ok(()) => break,
                    Err(err) => {
                        log::warn!("Could not stop the {role_type} of '{}' ({err}), retrying", app.name);
                        if !ctx.backoff(ctx.config().retry_backoff).await {
                            ctx.withdraw(&app);
                            return;
                        }
                    }
                }
            }
        }
        log::info!("Application '{}' is undeployed", app.name);
        ctx.withdraw(&app);
    }
}
