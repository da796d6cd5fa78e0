// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Recruited by a coordinator: checks whether this node can run the
//! application, and if so brings up a local executor and relays its outcome

use async_trait::async_trait;

use crate::errors::ExecutionFailure;
use crate::info::ExecutionStatus;
use crate::protocol::{MessageKind, RoleBody, RoleMessage, RoleType};
use crate::role::{Role, RoleContext};

#[derive(Default)]
pub(crate) struct PotentialExecutorRole;

#[async_trait]
impl Role for PotentialExecutorRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let ask = ctx
            .wait_for(
                Some(ctx.config().role_setup_timeout),
                &[MessageKind::AskForExecution],
            )
            .await;
        let (app, initiator) = match ask {
            Ok(RoleMessage {
                from,
                body: RoleBody::AskForExecution { app },
                ..
            }) => (app, from),
            _ => return,
        };

        let local = ctx.node().directory.local_info();
        let busy = ctx
            .node()
            .ensembles
            .get_or_create(ctx.id().ensemble)
            .has_any(&[RoleType::Executor]);
        if busy || !app.requirements.is_satisfied_by(&local) {
            log::debug!("Declining to execute '{}'", app.name);
            if let Err(err) = ctx.send(initiator, RoleBody::DeclineExecution).await {
                log::debug!("Initiator {initiator} went away: {err}");
            }
            return;
        }

        ctx.advertise(&app, "Starting executor");
        let executor = ctx.create_local_role_instance(RoleType::Executor);
        let relay = match ctx
            .send(executor, RoleBody::ExecuteApp { app: app.clone() })
            .await
        {
            Err(err) => {
                log::warn!("Local executor for '{}' did not start: {err}", app.name);
                RoleBody::ExecutionResult {
                    status: ExecutionStatus::Failed(ExecutionFailure::CouldNotStart),
                }
            }
            Ok(()) => loop {
                let outcome = ctx
                    .wait_for(
                        Some(ctx.config().execution_timeout),
                        &[
                            MessageKind::ExecutionResult,
                            MessageKind::AcknowledgeExecution,
                        ],
                    )
                    .await;
                match outcome {
                    Ok(RoleMessage {
                        body: RoleBody::ExecutionResult {
                            status: ExecutionStatus::Success,
                        },
                        ..
                    }) => continue,
                    Ok(msg) => break msg.body,
                    Err(err) => {
                        log::warn!("Executor for '{}' never came up: {err}", app.name);
                        break RoleBody::ExecutionResult {
                            status: ExecutionStatus::Failed(ExecutionFailure::CouldNotStart),
                        };
                    }
                }
            },
        };

        if let Err(err) = ctx.send(initiator, relay).await {
            log::warn!("Could not report back to initiator {initiator}: {err}");
        }
        ctx.withdraw(&app);
    }
}
