// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Relays one UI request: asks the coordinator for the executor, forwards the
//! request and deposits the answer in the caller's slot

use async_trait::async_trait;

use crate::errors::{AppRequestErr, RoleErr};
use crate::info::AppInfo;
use crate::protocol::{MessageKind, RoleBody, RoleMessage, RoleType, UiParams};
use crate::role::{Role, RoleContext};
use crate::CorrelationId;

#[derive(Default)]
pub(crate) struct RequesterRole;

impl RequesterRole {
    async fn relay(
        &self,
        ctx: &RoleContext,
        routing: CorrelationId,
        app: &AppInfo,
        target: String,
        params: UiParams,
    ) -> Result<String, AppRequestErr> {
        let describe = |step: &str, err: RoleErr| {
            AppRequestErr(format!("Application '{}': {step} ({err})", app.name))
        };

        let initiator = ctx
            .get_role_instance(app.id(), RoleType::Initiator)
            .await
            .map_err(|err| describe("coordinator not found", err))?;
        ctx.send(initiator, RoleBody::AskForExecutor { app: app.clone() })
            .await
            .map_err(|err| describe("coordinator unreachable", err))?;
        let report = ctx
            .wait_for(
                Some(ctx.config().executor_report_timeout),
                &[MessageKind::ReportOnExecutor],
            )
            .await
            .map_err(|err| describe("coordinator did not report the executor", err))?;
        let executor = match report.body {
            RoleBody::ReportOnExecutor {
                executor: Some(executor),
            } => executor,
            _ => {
                return Err(AppRequestErr(format!(
                    "Application '{}' is not running",
                    app.name
                )))
            }
        };

        let request = RoleBody::UiRequest {
            routing,
            app: app.clone(),
            target,
            params,
        };
        ctx.send(executor, request)
            .await
            .map_err(|err| describe("executor unreachable", err))?;
        let response = ctx
            .wait_for(
                Some(ctx.config().ui_response_timeout),
                &[MessageKind::UiResponse],
            )
            .await
            .map_err(|err| describe("no response from the executor", err))?;
        match response.body {
            RoleBody::UiResponse { result } => Ok(result),
            _ => Err(AppRequestErr(format!(
                "Application '{}' sent an unexpected answer",
                app.name
            ))),
        }
    }
}

#[async_trait]
impl Role for RequesterRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let request = ctx
            .wait_for(
                Some(ctx.config().role_setup_timeout),
                &[MessageKind::RequesterRequest],
            )
            .await;
        let (routing, app, target, params) = match request {
            Ok(RoleMessage {
                body:
                    RoleBody::RequesterRequest {
                        routing,
                        app,
                        target,
                        params,
                    },
                ..
            }) => (routing, app, target, params),
            _ => return,
        };
        let result = self.relay(ctx, routing, &app, target, params).await;
        if let Err(err) = &result {
            log::debug!("UI request failed: {err}");
        }
        ctx.node().deposit_ui_response(routing, result);
    }
}
