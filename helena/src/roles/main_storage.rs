// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Keeps the application code on the node closest to the application id,
//! starts the coordinator next to it and serves the code to executors

use async_trait::async_trait;

use crate::info::{AppInfo, StoredRecord};
use crate::protocol::{MessageKind, RoleBody, RoleType};
use crate::role::{Role, RoleContext};
use crate::RoleId;

#[derive(Default)]
pub(crate) struct MainStorageRole {
    code: Vec<u8>,
}

impl MainStorageRole {
    fn store(&mut self, ctx: &RoleContext, app: &AppInfo, code: Vec<u8>) {
        self.code = code;
        ctx.node().store.put(
            app.id(),
            StoredRecord::AppBinary {
                app: app.clone(),
                code: self.code.clone(),
            },
        );
    }

    /// Make sure the local coordinator runs and tell the deployer how it went
    async fn start_initiator(&self, ctx: &RoleContext, app: &AppInfo, deployer: RoleId) {
        let (initiator, created) = ctx.node().start_role(ctx.id().ensemble, RoleType::Initiator);
        let started = if created {
            ctx.send(initiator, RoleBody::InitApplication { app: app.clone() })
                .await
        } else {
            Ok(())
        };
        let reply = match started {
            Ok(()) => RoleBody::InitiatingStarted,
            Err(err) => {
                log::warn!("Could not start the initiator of '{}': {err}", app.name);
                RoleBody::MainStorageFailed
            }
        };
        if let Err(err) = ctx.send(deployer, reply).await {
            log::warn!("Could not answer the deployer of '{}': {err}", app.name);
        }
    }
}

#[async_trait]
impl Role for MainStorageRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let request = ctx
            .wait_for(
                Some(ctx.config().role_setup_timeout),
                &[MessageKind::StoreApp, MessageKind::InternalMainStorageShutdown],
            )
            .await;
        let (app, deployer) = match request {
            Ok(msg) => match msg.body {
                RoleBody::StoreApp { app, code } => {
                    self.store(ctx, &app, code);
                    (app, msg.from)
                }
                _ => return,
            },
            Err(err) => {
                log::debug!("Main storage {} gives up waiting for code: {err}", ctx.id());
                return;
            }
        };
        ctx.advertise(&app, "Storing");
        self.start_initiator(ctx, &app, deployer).await;
        ctx.advertise(&app, "Serving code");

        loop {
            let msg = match ctx
                .wait_for(
                    None,
                    &[
                        MessageKind::RequestCode,
                        MessageKind::StoreApp,
                        MessageKind::UndeployApp,
                        MessageKind::InternalMainStorageShutdown,
                    ],
                )
                .await
            {
                Ok(msg) => msg,
                Err(_) => break,
            };
            match msg.body {
                RoleBody::RequestCode { .. } => {
                    let code = RoleBody::AppCode {
                        code: self.code.clone(),
                    };
                    if let Err(err) = ctx.send(msg.from, code).await {
                        log::warn!("Could not hand out the code of '{}': {err}", app.name);
                    }
                }
                RoleBody::StoreApp { app: update, code } => {
                    self.store(ctx, &update, code);
                    self.start_initiator(ctx, &update, msg.from).await;
                }
                RoleBody::UndeployApp { app } => {
                    ctx.node().store.put(
                        app.id(),
                        StoredRecord::Tombstone {
                            name: app.name.clone(),
                        },
                    );
                    log::info!("Main storage of '{}' removed", app.name);
                    break;
                }
                _ => break,
            }
        }
        ctx.withdraw(&app);
    }
}
