// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Takes a deploy request, creates the main storage on the node closest to the
//! application id and hands it the code. Retries until the coordinator runs.

use async_trait::async_trait;

use crate::errors::RoleErr;
use crate::info::AppInfo;
use crate::protocol::{MessageKind, RoleBody, RoleType};
use crate::role::{Role, RoleContext};

#[derive(Default)]
pub(crate) struct DeployerRole;

impl DeployerRole {
    /// One attempt at storing the application. `Ok(true)` once the coordinator started.
    async fn store(&self, ctx: &RoleContext, app: &AppInfo, code: &[u8]) -> Result<bool, RoleErr> {
        let storage = ctx
            .create_role_instance(app.id(), RoleType::MainStorage)
            .await?;
        ctx.send(
            storage,
            RoleBody::StoreApp {
                app: app.clone(),
                code: code.to_vec(),
            },
        )
        .await?;
        let outcome = ctx
            .wait_for(
                ctx.config().storage_outcome_timeout,
                &[MessageKind::MainStorageFailed, MessageKind::InitiatingStarted],
            )
            .await?;
        Ok(outcome.kind() == MessageKind::InitiatingStarted)
    }
}

#[async_trait]
impl Role for DeployerRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let (app, code) = match ctx.wait_for(None, &[MessageKind::DeployApp]).await {
            Ok(msg) => match msg.body {
                RoleBody::DeployApp { app, code } => (app, code),
                _ => return,
            },
            Err(_) => return,
        };
        ctx.advertise(&app, "Deploying");

        loop {
            match self.store(ctx, &app, &code).await {
                Ok(true) => {
                    log::info!("Application '{}' is deployed", app.name);
                    break;
                }
                Ok(false) => log::warn!("Main storage for '{}' failed, retrying", app.name),
                Err(RoleErr::Stopped) => break,
                Err(err) => log::warn!("Deploying '{}' failed ({err}), retrying", app.name),
            }
            if !ctx.backoff(ctx.config().retry_backoff).await {
                break;
            }
        }
        ctx.withdraw(&app);
    }
}
