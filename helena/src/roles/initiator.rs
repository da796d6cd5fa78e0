// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The coordinator of one application. It finds an executor (adopting one
//! which already runs, or recruiting one through the matchmaker), supervises
//! it with a background liveness pinger and restarts the search whenever the
//! executor fails. After repeated failed searches it may provision a host.

use async_trait::async_trait;

use crate::concurrency::{spawn, Instant};
use crate::errors::RoleErr;
use crate::info::{AppInfo, NodeInfo};
use crate::protocol::{MessageKind, RoleBody, RoleMessage, RoleType};
use crate::role::{Role, RoleContext};
use crate::RoleId;

/// Kinds which end the coordinator, whatever it is waiting for
const STOP_KINDS: [MessageKind; 2] = [
    MessageKind::InternalInitiatorShutdown,
    MessageKind::StopAppHandling,
];

enum Search {
    Found(RoleId),
    NotFound,
    Stop,
}

enum Provision {
    Created,
    Failed,
    Unavailable,
    Stop,
}

enum Supervision {
    Restart,
    Stop,
}

#[derive(Default)]
pub(crate) struct InitiatorRole;

impl InitiatorRole {
    fn set_executor(&self, ctx: &RoleContext, executor: Option<RoleId>) {
        ctx.node()
            .ensembles
            .get_or_create(ctx.id().ensemble)
            .set_current_executor(executor);
    }

    /// Look for a node already advertising an executor for the application. An
    /// executor on this node is stopped, the coordinator never executes.
    async fn find_running_executor(&self, ctx: &RoleContext, app: &AppInfo) -> Search {
        let local = ctx.node().id;
        let advertising = ctx
            .node()
            .directory
            .nodes_advertising(&app.name, RoleType::Executor.name());
        for node in advertising {
            if node == local {
                let ensemble = ctx.node().ensembles.get_or_create(ctx.id().ensemble);
                for executor in ensemble.get_roles(RoleType::Executor) {
                    log::info!("Stopping the local executor of '{}'", app.name);
                    ctx.node().stop_role(&executor);
                    if !ensemble
                        .wait_role_gone(&executor.id, ctx.config().route_timeout)
                        .await
                    {
                        log::warn!("Local executor {} did not stop in time", executor.id);
                    }
                }
                continue;
            }
            match ctx.get_role_instance(node, RoleType::Executor).await {
                Ok(executor) => {
                    log::info!("Adopting executor {executor} of '{}'", app.name);
                    return Search::Found(executor);
                }
                Err(err) => log::debug!("Node {node} has no usable executor: {err}"),
            }
        }
        Search::NotFound
    }

    /// Ask the matchmaker for a node and recruit a potential executor on it
    async fn recruit_executor(&self, ctx: &RoleContext, app: &AppInfo) -> Search {
        let candidates = ctx.node().directory.all_nodes();
        let chosen = ctx
            .node()
            .collaborators
            .matchmaker
            .choose(&app.requirements, &candidates);
        let node = match chosen {
            Some(node) => node,
            None => return Search::NotFound,
        };

        let potential = match ctx
            .create_role_instance(node, RoleType::PotentialExecutor)
            .await
        {
            Ok(potential) => potential,
            Err(err) => {
                log::warn!("Could not recruit node {node} for '{}': {err}", app.name);
                return Search::NotFound;
            }
        };
        if let Err(err) = ctx
            .send(potential, RoleBody::AskForExecution { app: app.clone() })
            .await
        {
            log::warn!("Could not ask node {node} to execute '{}': {err}", app.name);
            return Search::NotFound;
        }

        let mut kinds = vec![
            MessageKind::AcknowledgeExecution,
            MessageKind::DeclineExecution,
            MessageKind::ExecutionResult,
        ];
        kinds.extend_from_slice(&STOP_KINDS);
        match ctx.wait_for(ctx.config().recruit_timeout, &kinds).await {
            Ok(RoleMessage {
                body: RoleBody::AcknowledgeExecution { executor },
                ..
            }) => Search::Found(executor),
            Ok(RoleMessage {
                body: RoleBody::DeclineExecution,
                ..
            }) => {
                log::debug!("Node {node} declined '{}'", app.name);
                Search::NotFound
            }
            Ok(RoleMessage {
                body: RoleBody::ExecutionResult { status },
                ..
            }) => {
                log::warn!("Node {node} failed to execute '{}': {status:?}", app.name);
                Search::NotFound
            }
            Ok(_) | Err(RoleErr::Stopped) => Search::Stop,
            Err(err) => {
                log::warn!("Node {node} never answered for '{}': {err}", app.name);
                Search::NotFound
            }
        }
    }

    async fn provision_host(&self, ctx: &RoleContext, app: &AppInfo) -> Provision {
        if !app.requirements.allows_virtualization() || ctx.node().collaborators.elastic.is_none()
        {
            return Provision::Unavailable;
        }
        log::info!("Provisioning a host for '{}'", app.name);
        let creator = ctx.create_local_role_instance(RoleType::DeploymentCreator);
        if let Err(err) = ctx
            .send(creator, RoleBody::CreateDeployment { app: app.clone() })
            .await
        {
            log::warn!("Could not start provisioning for '{}': {err}", app.name);
            return Provision::Failed;
        }
        let mut kinds = vec![
            MessageKind::DeploymentCreated,
            MessageKind::DeploymentCreationFailed,
        ];
        kinds.extend_from_slice(&STOP_KINDS);
        match ctx.wait_for(None, &kinds).await {
            Ok(RoleMessage {
                body: RoleBody::DeploymentCreated { handle },
                ..
            }) => {
                log::info!("Host {handle} provisioned for '{}'", app.name);
                Provision::Created
            }
            Ok(RoleMessage {
                body: RoleBody::DeploymentCreationFailed,
                ..
            }) => Provision::Failed,
            Ok(_) | Err(_) => Provision::Stop,
        }
    }

    /// Serve the coordinator's waiting loop until the executor fails or the
    /// coordinator is told to stop
    async fn supervise(&self, ctx: &RoleContext, app: &AppInfo, executor: RoleId) -> Supervision {
        loop {
            let msg = match ctx
                .wait_for(
                    None,
                    &[
                        MessageKind::InternalInitiatorShutdown,
                        MessageKind::AskForExecutor,
                        MessageKind::ExecutorFailed,
                        MessageKind::ExecutorFailedRequirements,
                        MessageKind::StopAppHandling,
                    ],
                )
                .await
            {
                Ok(msg) => msg,
                Err(_) => return Supervision::Stop,
            };
            match msg.body {
                RoleBody::AskForExecutor { app: asked } => {
                    if asked == *app {
                        let report = RoleBody::ReportOnExecutor {
                            executor: Some(executor),
                        };
                        if let Err(err) = ctx.send(msg.from, report).await {
                            log::debug!("Requester {} went away: {err}", msg.from);
                        }
                    }
                }
                RoleBody::ExecutorFailed => {
                    log::warn!("Executor {executor} of '{}' failed", app.name);
                    return Supervision::Restart;
                }
                RoleBody::ExecutorFailedRequirements => {
                    log::warn!(
                        "Executor {executor} of '{}' no longer meets the requirements",
                        app.name
                    );
                    self.stop_executor(ctx, app, executor).await;
                    return Supervision::Restart;
                }
                RoleBody::StopAppHandling { .. } => {
                    self.stop_executor(ctx, app, executor).await;
                    self.release_host(ctx, app, executor).await;
                    return Supervision::Stop;
                }
                _ => {
                    log::debug!("Initiator of '{}' hands off, executor keeps running", app.name);
                    return Supervision::Stop;
                }
            }
        }
    }

    /// Drop pongs left over from former executors and tell every requester
    /// which asked in the meantime that there is no executor yet
    async fn discard_stale(&self, ctx: &RoleContext, app: &AppInfo) {
        let stale = ctx.drain_matching(|msg| {
            matches!(
                msg.kind(),
                MessageKind::PongExecutor | MessageKind::AskForExecutor
            )
        });
        for msg in stale {
            if msg.kind() != MessageKind::AskForExecutor {
                continue;
            }
            let report = RoleBody::ReportOnExecutor { executor: None };
            if let Err(err) = ctx.send(msg.from, report).await {
                log::debug!("Requester {} of '{}' went away: {err}", msg.from, app.name);
            }
        }
    }

    async fn stop_executor(&self, ctx: &RoleContext, app: &AppInfo, executor: RoleId) {
        if let Err(err) = ctx
            .send(executor, RoleBody::StopAppHandling { app: app.clone() })
            .await
        {
            log::warn!("Could not stop executor {executor}: {err}");
        }
    }

    /// Destroy the executor's host if it was virtualized
    async fn release_host(&self, ctx: &RoleContext, app: &AppInfo, executor: RoleId) {
        let info = match ctx.node().directory.node(&executor.node) {
            Some(info) if info.virtualized => info,
            _ => return,
        };
        if ctx.node().collaborators.elastic.is_some() {
            spawn_stopper(ctx, app, info).await;
        }
    }
}

async fn spawn_stopper(ctx: &RoleContext, app: &AppInfo, executor: NodeInfo) {
    let stopper = ctx.create_local_role_instance(RoleType::DeploymentStopper);
    let request = RoleBody::StopDeployment {
        app: app.clone(),
        executor,
    };
    if let Err(err) = ctx.send(stopper, request).await {
        log::warn!("Could not start the deployment stopper for '{}': {err}", app.name);
    }
}

/// Ping the executor until it fails or violates the requirements for too long,
/// then tell the coordinator through its own mailbox
async fn observe(ctx: RoleContext, app: AppInfo, executor: RoleId) {
    let config = ctx.config().clone();
    ctx.sleep(config.liveness_initial_delay).await;
    let mut violating_since: Option<Instant> = None;
    let mut last_virtual_check = Instant::now();

    loop {
        let stale = ctx.drain_matching(|msg| {
            msg.kind() == MessageKind::PongExecutor && msg.from != executor
        });
        if !stale.is_empty() {
            log::debug!("Dropped {} pongs from former executors", stale.len());
        }
        let pong = match ctx.send(executor, RoleBody::PingExecutor).await {
            Ok(()) => {
                ctx.wait_matching(Some(config.pong_timeout), move |msg| {
                    msg.kind() == MessageKind::PongExecutor && msg.from == executor
                })
                .await
            }
            Err(err) => Err(err),
        };
        let info = match pong {
            Ok(RoleMessage {
                body: RoleBody::PongExecutor { info },
                ..
            }) => info,
            Ok(_) | Err(RoleErr::Stopped) => return,
            Err(err) => {
                log::warn!("Executor {executor} of '{}' missed a ping: {err}", app.name);
                let _ = ctx.send(ctx.id(), RoleBody::ExecutorFailed).await;
                return;
            }
        };

        let pause = if app.requirements.is_satisfied_by(&info) {
            violating_since = None;
            if info.virtualized && last_virtual_check.elapsed() >= config.virtualized_check_interval
            {
                last_virtual_check = Instant::now();
                replace_virtualized(&ctx, &app, &info).await;
            }
            config.liveness_interval
        } else {
            let since = *violating_since.get_or_insert_with(Instant::now);
            if info.virtualized {
                log::debug!("Tolerating virtualized executor {executor} below requirements");
            } else if since.elapsed() > config.requirements_grace {
                let _ = ctx
                    .send(ctx.id(), RoleBody::ExecutorFailedRequirements)
                    .await;
                return;
            }
            config.requirements_recheck_interval
        };
        ctx.sleep(pause).await;
    }
}

/// While still coordinating, swap a virtualized executor for a fitting physical node
async fn replace_virtualized(ctx: &RoleContext, app: &AppInfo, executor: &NodeInfo) {
    let node = ctx.node();
    if node.collaborators.elastic.is_none() || !node.overlay.is_closest_to(&app.id()) {
        return;
    }
    let replacement = node.directory.known_peers().into_iter().find(|peer| {
        node.directory
            .is_suitable_executor_for(app, &peer.id, &executor.id)
            .is_some()
    });
    if let Some(peer) = replacement {
        log::info!(
            "Node {} can replace the virtualized executor {} of '{}'",
            peer.id,
            executor.id,
            app.name
        );
        // the stopper shuts the executor's host down, the search then finds the peer
        spawn_stopper(ctx, app, executor.clone()).await;
    }
}

#[async_trait]
impl Role for InitiatorRole {
    async fn run(&mut self, ctx: &RoleContext) {
        let init = ctx
            .wait_for(
                Some(ctx.config().init_request_timeout),
                &[
                    MessageKind::InitApplication,
                    MessageKind::InternalInitiatorShutdown,
                ],
            )
            .await;
        let app = match init {
            Ok(RoleMessage {
                body: RoleBody::InitApplication { app },
                ..
            }) => app,
            Ok(_) => return,
            Err(err) => {
                log::debug!("Initiator {} was never initialized: {err}", ctx.id());
                return;
            }
        };
        ctx.advertise(&app, "Initiating App");

        let mut cycle: u32 = 1;
        loop {
            self.set_executor(ctx, None);
            self.discard_stale(ctx, &app).await;
            ctx.advertise(&app, "Searching for Executor");

            let search = match self.find_running_executor(ctx, &app).await {
                Search::NotFound => self.recruit_executor(ctx, &app).await,
                other => other,
            };
            let executor = match search {
                Search::Found(executor) => executor,
                Search::Stop => break,
                Search::NotFound => {
                    if cycle % ctx.config().attempts_before_host_creation.max(1) == 0 {
                        match self.provision_host(ctx, &app).await {
                            Provision::Stop => break,
                            Provision::Failed => cycle = 0,
                            Provision::Created => {}
                            Provision::Unavailable => log::info!(
                                "No executor for '{}' after {cycle} attempts",
                                app.name
                            ),
                        }
                    } else {
                        log::debug!("No executor for '{}' yet, retrying", app.name);
                    }
                    cycle += 1;
                    // back off, but stay stoppable
                    match ctx
                        .wait_for(Some(ctx.config().search_backoff), &STOP_KINDS)
                        .await
                    {
                        Err(RoleErr::Timeout) => continue,
                        _ => break,
                    }
                }
            };

            cycle = 1;
            self.set_executor(ctx, Some(executor));
            ctx.advertise(&app, "Observing Executor");
            let pinger = spawn(observe(
                RoleContext::new(ctx.id(), RoleType::Initiator, ctx.node().clone()),
                app.clone(),
                executor,
            ));
            let outcome = self.supervise(ctx, &app, executor).await;
            pinger.abort();
            match outcome {
                Supervision::Restart => continue,
                Supervision::Stop => break,
            }
        }
        self.set_executor(ctx, None);
        ctx.withdraw(&app);
    }
}
