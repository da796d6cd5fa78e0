// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The message fabric carries role messages and framework requests between
//! nodes. Every outbound request gets a fresh correlation id and the caller
//! blocks (up to the route timeout) until the answer carrying that id arrives.
//!
//! On the receiving side a role message is either accepted into the target
//! role's mailbox or rejected with a typed error, it is never silently dropped.
//! Pending correlation entries are removed by whichever of the answer or the
//! caller's timeout comes first.

use std::sync::Arc;

use dashmap::DashMap;

use crate::concurrency::{oneshot, timeout, Duration, OneshotSender};
use crate::ensemble::EnsembleRegistry;
use crate::errors::{RemoteErr, RoleErr};
use crate::overlay::Overlay;
use crate::protocol::{Answer, Envelope, FrameworkRequest, Request, RoleMessage};
use crate::{CorrelationId, NodeId, OverlayId, RoleId};

pub mod inbox;

pub use inbox::Inbox;

#[cfg(test)]
mod tests;

type Pending<T> = DashMap<CorrelationId, OneshotSender<Result<T, RemoteErr>>>;

/// Correlated request/response over the overlay, plus the node's role mailboxes
pub struct MessageFabric {
    local: NodeId,
    overlay: Arc<dyn Overlay>,
    inbox: Inbox,
    pending_routes: Pending<()>,
    pending_framework: Pending<RoleId>,
    route_timeout: Duration,
}

impl MessageFabric {
    /// A fabric sending through `overlay`
    pub fn new(overlay: Arc<dyn Overlay>, route_timeout: Duration) -> Self {
        Self {
            local: overlay.local_id(),
            overlay,
            inbox: Inbox::default(),
            pending_routes: DashMap::new(),
            pending_framework: DashMap::new(),
            route_timeout,
        }
    }

    /// The node's role mailboxes
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Number of calls still waiting for their answer
    pub fn pending_calls(&self) -> usize {
        self.pending_routes.len() + self.pending_framework.len()
    }

    /// Send a role message to its target role and wait for it to be accepted.
    /// Messages for roles on this node skip the network but are checked the same way.
    pub async fn route_role_message(
        &self,
        ensembles: &EnsembleRegistry,
        msg: RoleMessage,
    ) -> Result<(), RoleErr> {
        if msg.to.node == self.local {
            return self.accept(ensembles, msg).map_err(RoleErr::from);
        }
        let target = msg.to.node;
        self.correlate(&self.pending_routes, target, Request::Role(msg))
            .await
    }

    /// Send a framework request towards `target` and wait for the resulting role id
    pub async fn route_framework_message(
        &self,
        target: OverlayId,
        request: FrameworkRequest,
    ) -> Result<RoleId, RoleErr> {
        self.correlate(&self.pending_framework, target, Request::Framework(request))
            .await
    }

    async fn correlate<T>(
        &self,
        pending: &Pending<T>,
        target: OverlayId,
        body: Request,
    ) -> Result<T, RoleErr> {
        let correlation = OverlayId::random();
        let (tx, rx) = oneshot();
        pending.insert(correlation, tx);
        self.overlay.send_point_to_point(
            target,
            Envelope::Request {
                from: self.local,
                correlation,
                body,
            },
        );

        match timeout(self.route_timeout, rx).await {
            Ok(Ok(answer)) => answer.map_err(RoleErr::from),
            Ok(Err(_)) | Err(_) => {
                pending.remove(&correlation);
                Err(RoleErr::Timeout)
            }
        }
    }

    /// Validate and queue a role message arriving for this node. The target's
    /// ensemble and the role itself must exist, otherwise nothing is queued.
    pub fn accept(&self, ensembles: &EnsembleRegistry, msg: RoleMessage) -> Result<(), RemoteErr> {
        let ensemble = ensembles
            .get(&msg.to.ensemble)
            .ok_or(RemoteErr::EnsembleNotFound)?;
        if ensemble.get_specific_role(&msg.to).is_none() {
            return Err(RemoteErr::RoleNotFound);
        }
        self.inbox.deliver(msg).map_err(|_| RemoteErr::RoleNotFound)
    }

    /// Hand an answer to the caller waiting on `correlation`
    pub fn resolve(&self, correlation: CorrelationId, answer: Answer) {
        let delivered = match answer {
            Answer::Routed(result) => self
                .pending_routes
                .remove(&correlation)
                .map(|(_, tx)| tx.send(result).is_ok()),
            Answer::Framework(result) => self
                .pending_framework
                .remove(&correlation)
                .map(|(_, tx)| tx.send(result).is_ok()),
        };
        if delivered != Some(true) {
            log::debug!("Dropping answer {correlation} which nobody waits for");
        }
    }

    /// Answer a correlated request from `to`
    pub fn answer(&self, to: NodeId, correlation: CorrelationId, body: Answer) {
        self.overlay
            .send_point_to_point(to, Envelope::Answer { correlation, body });
    }
}
