// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Shuts a virtualized executor node down and destroys its host

use async_trait::async_trait;

use crate::protocol::{Envelope, MessageKind, RoleBody, RoleMessage};
use crate::role::{Role, RoleContext};

#[derive(Default)]
pub(crate) struct DeploymentStopperRole;

#[async_trait]
impl Role for DeploymentStopperRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let request = ctx
            .wait_for(
                Some(ctx.config().role_setup_timeout),
                &[MessageKind::StopDeployment],
            )
            .await;
        let (app, executor) = match request {
            Ok(RoleMessage {
                body: RoleBody::StopDeployment { app, executor },
                ..
            }) => (app, executor),
            _ => return,
        };
        ctx.advertise(&app, "Stopping deployment");

        ctx.node()
            .overlay
            .send_point_to_point(executor.id, Envelope::ShutdownNode);

        match (&executor.deployment, &ctx.node().collaborators.elastic) {
            (Some(handle), Some(elastic)) => match elastic.destroy_host(handle).await {
                Ok(()) => log::info!("Host {handle} of '{}' destroyed", app.name),
                Err(err) => log::warn!("Could not destroy host {handle}: {err}"),
            },
            (None, _) => log::warn!("Node {} has no host to destroy", executor.id),
            (_, None) => log::warn!("No elastic infrastructure to destroy host with"),
        }
        ctx.withdraw(&app);
    }
}
