// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A coordination node. [Node] owns the node's context (directory, fabric,
//! ensembles and collaborators), dispatches what the overlay delivers and
//! exposes the administrative operations.
//!
//! Everything a node knows lives in its own [NodeContext], so any number of
//! nodes can share one process.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use dashmap::DashMap;

use crate::collaborators::Collaborators;
use crate::concurrency::{oneshot, sleep, spawn, timeout, JoinHandle, OneshotSender};
use crate::config::NodeConfig;
use crate::directory::Directory;
use crate::ensemble::{Ensemble, EnsembleRegistry, RoleHandle};
use crate::errors::{AppRequestErr, RemoteErr, RequirementsErr};
use crate::fabric::MessageFabric;
use crate::info::{AppInfo, NodeInfo, Requirements, ResourceOverrides};
use crate::overlay::{ContentStore, Overlay, OverlayHandler};
use crate::protocol::{
    Answer, Envelope, FrameworkRequest, Request, RoleBody, RoleMessage, RoleType, UiParams,
};
use crate::role::RoleContext;
use crate::{roles, CorrelationId, EnsembleId, NodeId, OverlayId, RoleId};

mod recovery;


type UiSlot = OneshotSender<Result<String, AppRequestErr>>;

/// The state owned by one node and shared with every role it runs
pub struct NodeContext {
    pub(crate) id: NodeId,
    pub(crate) config: NodeConfig,
    pub(crate) overlay: Arc<dyn Overlay>,
    pub(crate) store: Arc<dyn ContentStore>,
    pub(crate) directory: Directory,
    pub(crate) fabric: MessageFabric,
    pub(crate) ensembles: EnsembleRegistry,
    pub(crate) collaborators: Collaborators,
    ui_responses: DashMap<CorrelationId, UiSlot>,
    running: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl NodeContext {
    /// Start a role in the ensemble `ensemble`, returning its id and whether it is new
    pub(crate) fn start_role(self: &Arc<Self>, ensemble: EnsembleId, role_type: RoleType) -> (RoleId, bool) {
        let node = self.clone();
        self.ensembles
            .start_new_role(ensemble, self.id, role_type, move |handle| {
                node.spawn_role(handle)
            })
    }

    pub(crate) fn start_new_role(self: &Arc<Self>, ensemble: EnsembleId, role_type: RoleType) -> RoleId {
        self.start_role(ensemble, role_type).0
    }

    fn spawn_role(self: &Arc<Self>, handle: RoleHandle) {
        self.fabric.inbox().open(handle.id);
        log::debug!("Starting {} {}", handle.role_type, handle.id);
        let node = self.clone();
        spawn(async move {
            let ctx = RoleContext::new(handle.id, handle.role_type, node.clone());
            let mut role = roles::build(handle.role_type);
            let finished = futures::FutureExt::catch_unwind(AssertUnwindSafe(role.run(&ctx))).await;
            if finished.is_err() {
                log::error!("{} {} panicked", handle.role_type, handle.id);
            }
            node.role_finished(&handle);
        });
    }

    fn role_finished(&self, handle: &RoleHandle) {
        log::debug!("{} {} finished", handle.role_type, handle.id);
        self.fabric.inbox().remove(&handle.id);
        if let Some(ensemble) = self.ensembles.get(&handle.id.ensemble) {
            ensemble.remove_role(&handle.id);
        }
    }

    /// Ask a role to stop. Coordinators and main storages get their own stop
    /// message, every other role has its mailbox closed.
    pub(crate) fn stop_role(&self, handle: &RoleHandle) {
        let signal = match handle.role_type {
            RoleType::Initiator => Some(RoleBody::InternalInitiatorShutdown),
            RoleType::MainStorage => Some(RoleBody::InternalMainStorageShutdown),
            _ => None,
        };
        log::debug!("Stopping {} {}", handle.role_type, handle.id);
        match signal {
            Some(body) => {
                let msg = RoleMessage {
                    from: handle.id,
                    to: handle.id,
                    body,
                };
                if self.fabric.inbox().deliver(msg).is_err() {
                    log::debug!("{} {} is already stopping", handle.role_type, handle.id);
                }
            }
            None => self.fabric.inbox().close(&handle.id),
        }
    }

    /// Stop every role of an ensemble and wait for it to empty
    pub(crate) async fn stop_all(&self, ensemble: &Ensemble) -> bool {
        for role in ensemble.roles() {
            self.stop_role(&role);
        }
        ensemble.wait_empty(self.config.shutdown_grace).await
    }

    /// Hand a UI result to the caller waiting on `routing`
    pub(crate) fn deposit_ui_response(&self, routing: CorrelationId, result: Result<String, AppRequestErr>) {
        match self.ui_responses.remove(&routing) {
            Some((_, slot)) => {
                if slot.send(result).is_err() {
                    log::debug!("UI caller of {routing} is already gone");
                }
            }
            None => log::debug!("UI response {routing} arrived after its caller gave up"),
        }
    }

    /// Push the gossip payload to the node closest to `target`
    pub(crate) fn gossip_to(&self, target: OverlayId) {
        let known = self.directory.gossip_payload();
        self.overlay
            .send_point_to_point(target, Envelope::Gossip { known });
    }

    /// Refresh the local summary, evict what aged out, gossip to random neighbors
    pub(crate) fn gossip_tick(self: &Arc<Self>) {
        let sensor = &self.collaborators.sensor;
        self.directory
            .refresh_local(sensor.snapshot(), sensor.is_virtualized());
        self.directory.evict_stale();
        for neighbor in self.overlay.random_neighbors(self.config.gossip_fanout) {
            self.gossip_to(neighbor);
        }
        self.check_coordination();
    }

    fn handle_framework(self: &Arc<Self>, request: FrameworkRequest) -> Result<RoleId, RemoteErr> {
        if !self.running.load(Ordering::Acquire) {
            return Err(RemoteErr::RoleCreationFailed(
                "node is shutting down".to_string(),
            ));
        }
        match request {
            FrameworkRequest::CreateRole { from, role_type } => {
                Ok(self.start_new_role(from.ensemble, role_type))
            }
            FrameworkRequest::GetRole { from, role_type } => {
                let ensemble = self
                    .ensembles
                    .get(&from.ensemble)
                    .ok_or(RemoteErr::EnsembleNotFound)?;
                match ensemble.get_roles(role_type).as_slice() {
                    [only] => Ok(only.id),
                    _ => Err(RemoteErr::RoleNotFound),
                }
            }
        }
    }

    /// Dispatch an envelope delivered by the overlay. Never blocks.
    pub(crate) fn on_direct_message(self: &Arc<Self>, from: NodeId, envelope: Envelope) {
        match envelope {
            Envelope::Gossip { known } => {
                self.directory.merge(known);
                if self.running.load(Ordering::Acquire) {
                    self.check_coordination();
                }
            }
            Envelope::Request {
                from: asker,
                correlation,
                body,
            } => {
                let answer = match body {
                    Request::Role(msg) => Answer::Routed(self.fabric.accept(&self.ensembles, msg)),
                    Request::Framework(request) => Answer::Framework(self.handle_framework(request)),
                };
                self.fabric.answer(asker, correlation, answer);
            }
            Envelope::Answer { correlation, body } => self.fabric.resolve(correlation, body),
            Envelope::ShutdownNode => {
                log::info!("Node {} asked to shut down by {from}", self.id);
                let node = self.clone();
                spawn(async move { node.shutdown().await });
            }
        }
    }

    fn start_deployer(self: &Arc<Self>, app: AppInfo, code: Vec<u8>) -> RoleId {
        let deployer = self.start_new_role(app.id(), RoleType::Deployer);
        self.post(deployer, RoleBody::DeployApp { app, code });
        deployer
    }

    /// Put a message from the outside world into a local role's mailbox
    fn post(&self, role: RoleId, body: RoleBody) {
        let msg = RoleMessage {
            from: role,
            to: role,
            body,
        };
        if let Err(msg) = self.fabric.inbox().deliver(msg) {
            log::warn!("Role {} is gone, dropping {:?}", role, msg.kind());
        }
    }

    async fn shutdown(self: &Arc<Self>) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        for ensemble in self.ensembles.all() {
            if !self.stop_all(&ensemble).await {
                log::warn!("Ensemble {} did not empty in time", ensemble.id());
            }
        }
        self.overlay.leave();
        log::info!("Node {} shut down", self.id);
    }
}

struct NodeHandler(Weak<NodeContext>);

impl OverlayHandler for NodeHandler {
    fn on_direct_message(&self, from: NodeId, envelope: Envelope) {
        if let Some(node) = self.0.upgrade() {
            node.on_direct_message(from, envelope);
        }
    }

    fn on_membership_changed(&self, neighbor: NodeId, joined: bool) {
        if let Some(node) = self.0.upgrade() {
            log::debug!(
                "Node {} sees {neighbor} {}",
                node.id,
                if joined { "join" } else { "leave" }
            );
            if node.running.load(Ordering::Acquire) {
                node.check_coordination();
            }
        }
    }
}

/// A coordination node
#[derive(Clone)]
pub struct Node {
    ctx: Arc<NodeContext>,
}

impl Node {
    /// Create a node on `overlay`. The node does nothing until it is [Node::start]ed
    /// and its [Node::handler] is attached to the overlay.
    pub fn new(
        config: NodeConfig,
        address: impl Into<String>,
        overlay: Arc<dyn Overlay>,
        store: Arc<dyn ContentStore>,
        collaborators: Collaborators,
    ) -> Self {
        let id = overlay.local_id();
        let directory = Directory::new(NodeInfo::new(id, address), config.node_info_ttl);
        directory.refresh_local(
            collaborators.sensor.snapshot(),
            collaborators.sensor.is_virtualized(),
        );
        let fabric = MessageFabric::new(overlay.clone(), config.route_timeout);
        Self {
            ctx: Arc::new(NodeContext {
                id,
                config,
                overlay,
                store,
                directory,
                fabric,
                ensembles: EnsembleRegistry::default(),
                collaborators,
                ui_responses: DashMap::new(),
                running: AtomicBool::new(true),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// The callbacks the overlay delivers into
    pub fn handler(&self) -> Arc<dyn OverlayHandler> {
        Arc::new(NodeHandler(Arc::downgrade(&self.ctx)))
    }

    /// Start the periodic gossip tick
    pub fn start(&self) {
        let node = self.ctx.clone();
        let interval = self.ctx.config.gossip_interval;
        let ticker = spawn(async move {
            loop {
                node.gossip_tick();
                sleep(interval).await;
            }
        });
        if let Some(previous) = self
            .ctx
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ticker)
        {
            previous.abort();
        }
    }

    /// Stop every role, leave the overlay and stop ticking
    pub async fn shutdown(&self) {
        self.ctx.shutdown().await;
    }

    /// Whether the node still takes part in the protocol
    pub fn is_running(&self) -> bool {
        self.ctx.running.load(Ordering::Acquire)
    }

    /// The node's overlay id
    pub fn id(&self) -> NodeId {
        self.ctx.id
    }

    /// The node's shared context
    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    /// Deploy an application. The deployment is retried until it succeeds.
    pub fn deploy(&self, app: AppInfo, code: Vec<u8>) -> RoleId {
        log::info!("Deploying '{}' from node {}", app.name, self.ctx.id);
        self.ctx.start_deployer(app, code)
    }

    /// Deploy an application package whose requirements come as a properties document
    pub fn deploy_package(
        &self,
        name: &str,
        requirements: &[u8],
        code: Vec<u8>,
    ) -> Result<RoleId, RequirementsErr> {
        let requirements = Requirements::from_properties(requirements)?;
        Ok(self.deploy(AppInfo::new(name, requirements), code))
    }

    /// Remove an application. The removal is retried until it succeeds.
    pub fn undeploy(&self, name: &str) -> RoleId {
        log::info!("Undeploying '{name}' from node {}", self.ctx.id);
        let app = AppInfo::new(name, Requirements::default());
        let undeployer = self.ctx.start_new_role(app.id(), RoleType::Undeployer);
        self.ctx.post(undeployer, RoleBody::UndeployApp { app });
        undeployer
    }

    /// Relay a UI request to the application's executor
    pub async fn ui_request(
        &self,
        name: &str,
        target: &str,
        params: UiParams,
    ) -> Result<String, AppRequestErr> {
        let app = AppInfo::new(name, Requirements::default());
        let requester = self.ctx.start_new_role(app.id(), RoleType::Requester);
        let routing = OverlayId::random();
        let (tx, rx) = oneshot();
        self.ctx.ui_responses.insert(routing, tx);
        self.ctx.post(
            requester,
            RoleBody::RequesterRequest {
                routing,
                app,
                target: target.to_string(),
                params,
            },
        );

        match timeout(self.ctx.config.ui_request_timeout, rx).await {
            Ok(Ok(result)) => result,
            _ => {
                self.ctx.ui_responses.remove(&routing);
                Err(AppRequestErr(format!(
                    "Application '{name}' did not answer in time"
                )))
            }
        }
    }

    /// Every application advertised anywhere in the known cluster
    pub fn known_apps(&self) -> Vec<AppInfo> {
        self.ctx.directory.known_apps()
    }

    /// Summaries of every known peer
    pub fn known_peers(&self) -> Vec<NodeInfo> {
        self.ctx.directory.known_peers()
    }

    /// The node's own summary
    pub fn local_info(&self) -> NodeInfo {
        self.ctx.directory.local_info()
    }

    /// Override parts of the sensor reading, applied immediately and on every refresh
    pub fn set_resource_overrides(&self, overrides: ResourceOverrides) {
        self.ctx.directory.set_overrides(overrides);
        let sensor = &self.ctx.collaborators.sensor;
        self.ctx
            .directory
            .refresh_local(sensor.snapshot(), sensor.is_virtualized());
    }

    /// The roles this node runs for the application `name`
    pub fn roles_for_app(&self, name: &str) -> Vec<RoleHandle> {
        self.ctx
            .ensembles
            .get(&OverlayId::derive(name))
            .map(|ensemble| ensemble.roles())
            .unwrap_or_default()
    }

    /// The executor this node's coordinator supervises for `name`, if any
    pub fn current_executor(&self, name: &str) -> Option<RoleId> {
        self.ctx
            .ensembles
            .get(&OverlayId::derive(name))
            .and_then(|ensemble| ensemble.current_executor())
    }

    /// Run the leader-recovery check now
    pub fn check_coordination(&self) {
        self.ctx.check_coordination();
    }

    /// Run one gossip tick now
    pub fn gossip_tick(&self) {
        self.ctx.gossip_tick();
    }
}
