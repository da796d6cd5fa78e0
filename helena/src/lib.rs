// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! `helena`: decentralized deployment, supervision and failover of
//! applications over a peer-to-peer overlay.
//!
//! Every node runs the same logic. Nodes gossip summaries of their resources
//! and of the application roles they host, and cooperate through a small
//! role protocol: a Deployer stores the application binary with the
//! MainStorage on the node closest to the application's id, that node's
//! Initiator recruits an Executor which fits the application's requirements
//! and supervises it with pings. When membership changes, whichever live node
//! is now closest to the application id takes over coordination and the
//! previous coordinator stands down.
//!
//! ## Getting started
//!
//! A node needs an overlay, a content store and its collaborators (the code
//! runtime and the resource sensor). [overlay::local::LocalNetwork] hosts any
//! number of nodes in one process:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use helena::collaborators::{AppRuntime, Collaborators, StaticSensor};
//! use helena::overlay::local::LocalNetwork;
//! use helena::{Node, NodeConfig, OverlayId};
//!
//! async fn start(runtime: Arc<dyn AppRuntime>) -> Node {
//!     let network = LocalNetwork::new(3);
//!     let id = OverlayId::derive("node-0");
//!     let overlay = network.attach(id);
//!     let collaborators = Collaborators::new(runtime, Arc::new(StaticSensor::default()));
//!     let node = Node::new(
//!         NodeConfig::default(),
//!         "node-0",
//!         overlay.clone(),
//!         overlay,
//!         collaborators,
//!     );
//!     network.join(id, node.handler());
//!     node.start();
//!     node
//! }
//! ```
//!
//! ## Failure model
//!
//! Delivery is at most once. Every correlated call is bounded by a timeout and
//! roles retry at the workflow level. At most one coordinator per application
//! is an emergent property of the closest-node rule, so brief windows of dual
//! coordination during churn are tolerated by making takeover idempotent.

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod collaborators;
pub mod concurrency;
pub mod config;
pub mod directory;
pub mod ensemble;
pub mod errors;
pub mod fabric;
pub mod id;
pub mod info;
pub mod node;
pub mod overlay;
pub mod protocol;
mod role;
mod roles;

#[cfg(test)]
mod common_test;

pub use config::NodeConfig;
pub use errors::{AppRequestErr, ExecutionFailure, RemoteErr, RequirementsErr, RoleErr};
pub use id::{CorrelationId, EnsembleId, NodeId, OverlayId, RoleId};
pub use info::{AppInfo, NodeInfo, Requirements};
pub use node::Node;
pub use protocol::RoleType;
