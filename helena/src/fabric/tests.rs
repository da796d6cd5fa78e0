// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use function_name::named;

use crate::common_test::{id_near, TestCluster};
use crate::errors::RoleErr;
use crate::node::NodeContext;
use crate::protocol::{Envelope, RoleBody, RoleMessage, RoleType};
use crate::{OverlayId, RoleId};

/// Register a role on `node` with an open mailbox and nobody consuming it
fn idle_role(node: &NodeContext, app: &str) -> RoleId {
    let (id, _) = node.ensembles.start_new_role(
        OverlayId::derive(app),
        node.id,
        RoleType::Requester,
        |handle| node.fabric.inbox().open(handle.id),
    );
    id
}

fn ping(from: RoleId, to: RoleId) -> RoleMessage {
    RoleMessage {
        from,
        to,
        body: RoleBody::PingExecutor,
    }
}

fn pair(app: &str) -> TestCluster {
    TestCluster::with_nodes(&[id_near(app, 1), id_near(app, 1 << 100)])
}

#[named]
#[tokio::test]
async fn test_route_to_existing_role_is_queued() {
    let cluster = pair(function_name!());
    let a = cluster.nodes[0].node.context().clone();
    let b = cluster.nodes[1].node.context().clone();
    let target = idle_role(&b, function_name!());
    let sender = RoleId::new(target.ensemble, a.id);

    let routed = a
        .fabric
        .route_role_message(&a.ensembles, ping(sender, target))
        .await;
    assert_eq!(Ok(()), routed);
    assert_eq!(1, b.fabric.inbox().pending(&target));
    assert_eq!(0, a.fabric.pending_calls());

    cluster.shutdown().await;
}

#[named]
#[tokio::test]
async fn test_route_to_missing_ensemble_is_rejected() {
    let cluster = pair(function_name!());
    let a = cluster.nodes[0].node.context().clone();
    let b = cluster.nodes[1].node.context().clone();
    let existing = idle_role(&b, function_name!());
    let nowhere = RoleId::new(OverlayId::derive("no such app"), b.id);

    let routed = a
        .fabric
        .route_role_message(&a.ensembles, ping(RoleId::new(nowhere.ensemble, a.id), nowhere))
        .await;
    assert_eq!(Err(RoleErr::EnsembleNotFound), routed);
    assert_eq!(0, b.fabric.inbox().pending(&existing));
    assert_eq!(0, a.fabric.pending_calls());

    cluster.shutdown().await;
}

#[named]
#[tokio::test]
async fn test_route_to_missing_role_is_rejected() {
    let cluster = pair(function_name!());
    let a = cluster.nodes[0].node.context().clone();
    let b = cluster.nodes[1].node.context().clone();
    let existing = idle_role(&b, function_name!());
    let stranger = RoleId::new(existing.ensemble, b.id);

    let routed = a
        .fabric
        .route_role_message(&a.ensembles, ping(RoleId::new(existing.ensemble, a.id), stranger))
        .await;
    assert_eq!(Err(RoleErr::RoleNotFound), routed);
    assert_eq!(0, b.fabric.inbox().pending(&existing));
    assert_eq!(0, b.fabric.inbox().pending(&stranger));

    cluster.shutdown().await;
}

#[named]
#[tokio::test]
async fn test_route_without_answer_times_out() {
    let cluster = pair(function_name!());
    let a = cluster.nodes[0].node.context().clone();
    let b = cluster.nodes[1].node.context().clone();
    let target = idle_role(&b, function_name!());
    let b_id = b.id;
    cluster
        .network
        .set_drop_filter(move |_, to, envelope| *to == b_id && matches!(envelope, Envelope::Request { .. }));

    let routed = a
        .fabric
        .route_role_message(&a.ensembles, ping(RoleId::new(target.ensemble, a.id), target))
        .await;
    assert_eq!(Err(RoleErr::Timeout), routed);
    assert_eq!(0, b.fabric.inbox().pending(&target));
    assert_eq!(0, a.fabric.pending_calls());

    cluster.network.clear_drop_filter();
    cluster.shutdown().await;
}

#[named]
#[tokio::test]
async fn test_local_route_skips_the_network() {
    let cluster = pair(function_name!());
    let a = cluster.nodes[0].node.context().clone();
    let target = idle_role(&a, function_name!());
    cluster.network.set_drop_filter(|_, _, _| true);

    let routed = a
        .fabric
        .route_role_message(&a.ensembles, ping(target, target))
        .await;
    assert_eq!(Ok(()), routed);
    assert_eq!(1, a.fabric.inbox().pending(&target));

    let missing = RoleId::new(target.ensemble, a.id);
    let routed = a
        .fabric
        .route_role_message(&a.ensembles, ping(target, missing))
        .await;
    assert_eq!(Err(RoleErr::RoleNotFound), routed);

    cluster.network.clear_drop_filter();
    cluster.shutdown().await;
}

#[named]
#[tokio::test]
async fn test_framework_lookup_finds_single_role() {
    let cluster = pair(function_name!());
    let a = cluster.nodes[0].node.context().clone();
    let b = cluster.nodes[1].node.context().clone();
    let target = idle_role(&b, function_name!());
    let asker = RoleId::new(target.ensemble, a.id);

    let found = a
        .fabric
        .route_framework_message(
            b.id,
            crate::protocol::FrameworkRequest::GetRole {
                from: asker,
                role_type: RoleType::Requester,
            },
        )
        .await;
    assert_eq!(Ok(target), found);

    let missing = a
        .fabric
        .route_framework_message(
            b.id,
            crate::protocol::FrameworkRequest::GetRole {
                from: asker,
                role_type: RoleType::Executor,
            },
        )
        .await;
    assert_eq!(Err(RoleErr::RoleNotFound), missing);

    cluster.shutdown().await;
}

#[test]
fn test_drain_takes_only_matching_messages() {
    let inbox = crate::fabric::inbox::Inbox::default();
    let role = RoleId::new(OverlayId::derive("drain"), OverlayId(1));
    let former = RoleId::new(role.ensemble, OverlayId(2));
    let current = RoleId::new(role.ensemble, OverlayId(3));
    inbox.open(role);
    for from in [former, current, former] {
        assert!(inbox.deliver(ping(from, role)).is_ok());
    }

    let drained = inbox.drain(&role, |msg| msg.from == former);
    assert_eq!(2, drained.len());
    assert_eq!(1, inbox.pending(&role));
    assert!(inbox.drain(&role, |msg| msg.from == former).is_empty());

    let unknown = RoleId::new(role.ensemble, OverlayId(4));
    assert!(inbox.drain(&unknown, |_| true).is_empty());
}
