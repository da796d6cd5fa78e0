// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Fetches the application code from the main storage, installs and runs it,
//! then serves pings and UI requests until it is told to stop

use async_trait::async_trait;

use crate::errors::{ExecutionFailure, RoleErr};
use crate::info::{AppInfo, ExecutionStatus};
use crate::protocol::{MessageKind, RoleBody, RoleMessage, RoleType};
use crate::role::{Role, RoleContext};
use crate::RoleId;

#[derive(Default)]
pub(crate) struct ExecutorRole {
    /// The role which asked for execution, results are reported there
    requester: Option<RoleId>,
    /// The coordinator pinging us, follows takeovers
    initiator: Option<RoleId>,
}

impl ExecutorRole {
    async fn report(&self, ctx: &RoleContext, status: ExecutionStatus) {
        if let Some(requester) = self.requester {
            if let Err(err) = ctx
                .send(requester, RoleBody::ExecutionResult { status })
                .await
            {
                log::debug!("Could not report {status:?} to {requester}: {err}");
            }
        }
    }

    /// Locate the main storage and fetch the code
    async fn fetch_code(&self, ctx: &RoleContext, app: &AppInfo) -> Result<Vec<u8>, RoleErr> {
        let storage = ctx
            .get_role_instance(app.id(), RoleType::MainStorage)
            .await?;
        ctx.advertise(app, "Grabbing bytecode");
        ctx.send(storage, RoleBody::RequestCode { app: app.clone() })
            .await?;
        let msg = ctx
            .wait_for(
                Some(ctx.config().code_request_timeout),
                &[MessageKind::AppCode, MessageKind::StopAppHandling],
            )
            .await?;
        match msg.body {
            RoleBody::AppCode { code } if !code.is_empty() => Ok(code),
            RoleBody::AppCode { .. } => Err(ExecutionFailure::NoCode.into()),
            _ => Err(RoleErr::Stopped),
        }
    }

    async fn bring_up(&self, ctx: &RoleContext, app: &AppInfo) -> Result<(), RoleErr> {
        let code = self.fetch_code(ctx, app).await.map_err(|err| match err {
            RoleErr::Stopped => RoleErr::Stopped,
            RoleErr::ExecutionFailed(why) => RoleErr::ExecutionFailed(why),
            other => {
                log::warn!("No code for '{}': {other}", app.name);
                RoleErr::ExecutionFailed(ExecutionFailure::NoCode)
            }
        })?;
        ctx.advertise(app, "Trying to execute");
        ctx.node()
            .collaborators
            .runtime
            .install_and_run(app, &code)
            .await?;
        Ok(())
    }

    async fn stop_app(&self, ctx: &RoleContext, app: &AppInfo) {
        log::info!("Stopping '{}' on {}", app.name, ctx.node().id);
        if let Err(err) = ctx.node().collaborators.runtime.stop(app).await {
            log::warn!("Stopping '{}' failed: {err}", app.name);
        }
    }

    async fn serve(&mut self, ctx: &RoleContext, app: &AppInfo) {
        loop {
            let msg = ctx
                .wait_for(
                    ctx.config().executor_orphan_timeout,
                    &[
                        MessageKind::PingExecutor,
                        MessageKind::UiRequest,
                        MessageKind::StopAppHandling,
                    ],
                )
                .await;
            let msg = match msg {
                Ok(msg) => msg,
                Err(RoleErr::Timeout) => {
                    log::warn!("Executor of '{}' is no longer supervised", app.name);
                    return;
                }
                Err(_) => return,
            };
            match msg.body {
                RoleBody::PingExecutor => {
                    if self.initiator != Some(msg.from) {
                        log::debug!("Executor of '{}' now pinged by {}", app.name, msg.from);
                        self.initiator = Some(msg.from);
                    }
                    let pong = RoleBody::PongExecutor {
                        info: ctx.node().directory.local_info(),
                    };
                    if let Err(err) = ctx.send(msg.from, pong).await {
                        log::debug!("Could not answer ping from {}: {err}", msg.from);
                    }
                }
                RoleBody::UiRequest { target, params, .. } => {
                    let result = match ctx
                        .node()
                        .collaborators
                        .runtime
                        .handle_ui(app, &target, &params)
                        .await
                    {
                        Ok(result) => result,
                        Err(err) => err.to_string(),
                    };
                    if let Err(err) = ctx.send(msg.from, RoleBody::UiResponse { result }).await {
                        log::debug!("Could not answer UI request from {}: {err}", msg.from);
                    }
                }
                _ => return,
            }
        }
    }
}

#[async_trait]
impl Role for ExecutorRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let request = ctx
            .wait_for(
                Some(ctx.config().role_setup_timeout),
                &[MessageKind::ExecuteApp],
            )
            .await;
        let app = match request {
            Ok(RoleMessage {
                from,
                body: RoleBody::ExecuteApp { app },
                ..
            }) => {
                self.requester = Some(from);
                app
            }
            _ => return,
        };
        ctx.advertise(&app, "Preparing");

        match self.bring_up(ctx, &app).await {
            Ok(()) => self.report(ctx, ExecutionStatus::Success).await,
            Err(RoleErr::ExecutionFailed(why)) => {
                log::warn!("Could not execute '{}': {why}", app.name);
                self.report(ctx, ExecutionStatus::Failed(why)).await;
                ctx.withdraw(&app);
                return;
            }
            Err(_) => {
                ctx.withdraw(&app);
                return;
            }
        }

        ctx.advertise(&app, "Executing");
        // let the coordinator see the executor before its next gossip round
        ctx.node().gossip_to(app.id());

        let ack = RoleBody::AcknowledgeExecution { executor: ctx.id() };
        let acknowledged = match self.requester {
            Some(requester) => ctx.send(requester, ack).await,
            None => Ok(()),
        };
        match acknowledged {
            Ok(()) => self.serve(ctx, &app).await,
            Err(err) => log::warn!("Execution of '{}' was not acknowledged: {err}", app.name),
        }

        self.stop_app(ctx, &app).await;
        ctx.withdraw(&app);
    }
}
