// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The role runtime. Every role is a task running a private protocol loop,
//! driven through a [RoleContext] which wraps the owning node's fabric,
//! ensembles and directory.
//!
//! Framework and routing failures surface as [RoleErr]s: role creation failures,
//! missing roles or ensembles, and timeouts. A role decides per step whether to
//! retry, restart its loop or terminate.

use std::sync::Arc;

use async_trait::async_trait;

use crate::concurrency::{sleep, Duration};
use crate::config::NodeConfig;
use crate::errors::RoleErr;
use crate::info::AppInfo;
use crate::node::NodeContext;
use crate::protocol::{FrameworkRequest, MessageKind, RoleBody, RoleMessage, RoleType};
use crate::{OverlayId, RoleId};

/// A role's protocol loop. The role is removed from its ensemble when `run` returns.
#[async_trait]
pub(crate) trait Role: Send + 'static {
    async fn run(&mut self, ctx: &RoleContext);
}

/// A running role's handle onto its node
pub struct RoleContext {
    id: RoleId,
    role_type: RoleType,
    node: Arc<NodeContext>,
}

impl RoleContext {
    pub(crate) fn new(id: RoleId, role_type: RoleType, node: Arc<NodeContext>) -> Self {
        Self {
            id,
            role_type,
            node,
        }
    }

    /// The role's address
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// What the role does
    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    pub(crate) fn node(&self) -> &Arc<NodeContext> {
        &self.node
    }

    pub(crate) fn config(&self) -> &NodeConfig {
        &self.node.config
    }

    /// Send `body` to the role `to`, waiting until it is accepted or rejected
    pub async fn send(&self, to: RoleId, body: RoleBody) -> Result<(), RoleErr> {
        let msg = RoleMessage {
            from: self.id,
            to,
            body,
        };
        self.node
            .fabric
            .route_role_message(&self.node.ensembles, msg)
            .await
    }

    /// Wait for the first message of one of the given kinds, [None] waits until stopped
    pub async fn wait_for(
        &self,
        timeout: Option<Duration>,
        kinds: &[MessageKind],
    ) -> Result<RoleMessage, RoleErr> {
        self.wait_matching(timeout, |msg| kinds.contains(&msg.kind()))
            .await
    }

    /// Wait for the first message matching `predicate`
    pub async fn wait_matching<P>(
        &self,
        timeout: Option<Duration>,
        predicate: P,
    ) -> Result<RoleMessage, RoleErr>
    where
        P: Fn(&RoleMessage) -> bool + Send,
    {
        self.node
            .fabric
            .inbox()
            .wait_for(&self.id, timeout, predicate)
            .await
    }

    /// Take every queued message matching `predicate` without waiting
    pub fn drain_matching<P>(&self, predicate: P) -> Vec<RoleMessage>
    where
        P: Fn(&RoleMessage) -> bool,
    {
        self.node.fabric.inbox().drain(&self.id, predicate)
    }

    /// Start a role of `role_type` for this ensemble on the node closest to `target`
    pub async fn create_role_instance(
        &self,
        target: OverlayId,
        role_type: RoleType,
    ) -> Result<RoleId, RoleErr> {
        let request = FrameworkRequest::CreateRole {
            from: self.id,
            role_type,
        };
        match self.node.fabric.route_framework_message(target, request).await {
            Ok(id) => Ok(id),
            Err(RoleErr::Timeout) => Err(RoleErr::Timeout),
            Err(RoleErr::RoleCreationFailed(reason)) => Err(RoleErr::RoleCreationFailed(reason)),
            Err(other) => Err(RoleErr::RoleCreationFailed(other.to_string())),
        }
    }

    /// Locate the single role of `role_type` for this ensemble on the node closest to `target`
    pub async fn get_role_instance(
        &self,
        target: OverlayId,
        role_type: RoleType,
    ) -> Result<RoleId, RoleErr> {
        let request = FrameworkRequest::GetRole {
            from: self.id,
            role_type,
        };
        self.node.fabric.route_framework_message(target, request).await
    }

    /// Start a role of `role_type` for this ensemble on the local node
    pub fn create_local_role_instance(&self, role_type: RoleType) -> RoleId {
        self.node.start_new_role(self.id.ensemble, role_type)
    }

    /// Advertise this role for `app` with a human readable status
    pub fn advertise(&self, app: &AppInfo, status: &str) {
        log::debug!("{} {} for '{}': {status}", self.role_type, self.id, app.name);
        self.node
            .directory
            .add_app_role(app, self.role_type.name(), status);
    }

    /// Withdraw this role's advertisement for `app`
    pub fn withdraw(&self, app: &AppInfo) {
        self.node
            .directory
            .remove_app_role(&app.name, self.role_type.name());
    }

    /// Suspend the role
    pub async fn sleep(&self, dur: Duration) {
        sleep(dur).await;
    }

    /// Sleep for `dur` unless the role is stopped first. Returns whether the role may carry on.
    pub async fn backoff(&self, dur: Duration) -> bool {
        matches!(
            self.wait_matching(Some(dur), |_| false).await,
            Err(RoleErr::Timeout)
        )
    }
}
