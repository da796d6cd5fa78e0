// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Provisions one elastic host for an application and reports the outcome

use async_trait::async_trait;

use crate::collaborators::HostSpec;
use crate::errors::ElasticErr;
use crate::info::{AppInfo, HostHandle};
use crate::protocol::{MessageKind, RoleBody, RoleMessage};
use crate::role::{Role, RoleContext};

#[derive(Default)]
pub(crate) struct DeploymentCreatorRole;

impl DeploymentCreatorRole {
    async fn provision(&self, ctx: &RoleContext, app: &AppInfo) -> Result<HostHandle, ElasticErr> {
        let elastic = ctx
            .node()
            .collaborators
            .elastic
            .clone()
            .ok_or_else(|| ElasticErr("no elastic infrastructure configured".to_string()))?;
        let config = ctx.config();
        let spec = HostSpec {
            cpu_cores: app
                .requirements
                .cpu_cores
                .unwrap_or_default()
                .max(config.default_host_cpu),
            memory_mb: app
                .requirements
                .memory_total_mb
                .unwrap_or_default()
                .max(config.default_host_memory_mb),
        };
        ctx.advertise(app, "Creating deployment");
        let handle = elastic.create_host(spec).await?;
        ctx.advertise(app, "Waiting for deployment");
        if let Err(err) = elastic.poll_until_running(&handle).await {
            // never leave a half started host behind
            if let Err(destroy) = elastic.destroy_host(&handle).await {
                log::warn!("Could not release host {handle}: {destroy}");
            }
            return Err(err);
        }
        Ok(handle)
    }
}

#[async_trait]
impl Role for DeploymentCreatorRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let request = ctx
            .wait_for(
                Some(ctx.config().role_setup_timeout),
                &[MessageKind::CreateDeployment],
            )
            .await;
        let (app, initiator) = match request {
            Ok(RoleMessage {
                from,
                body: RoleBody::CreateDeployment { app },
                ..
            }) => (app, from),
            _ => return,
        };

        let reply = match self.provision(ctx, &app).await {
            Ok(handle) => RoleBody::DeploymentCreated { handle },
            Err(err) => {
                log::warn!("Could not provision a host for '{}': {err}", app.name);
                RoleBody::DeploymentCreationFailed
            }
        };
        if let Err(err) = ctx.send(initiator, reply).await {
            log::warn!("Could not report provisioning to {initiator}: {err}");
        }
        ctx.withdraw(&app);
    }
}
