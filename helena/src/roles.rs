// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The coordination roles: the state machines implementing deployment,
//! execution, liveness supervision, UI relay and teardown

use crate::protocol::RoleType;
use crate::role::Role;

mod deployer;
mod deployment_creator;
mod deployment_stopper;
mod executor;
mod initiator;
mod main_storage;
mod potential_executor;
mod requester;
mod undeployer;

/// A fresh instance of the role's state machine
pub(crate) fn build(role_type: RoleType) -> Box<dyn Role> {
    match role_type {
        RoleType::Deployer => Box::new(deployer::DeployerRole::default()),
        RoleType::Initiator => Box::new(initiator::InitiatorRole::default()),
        RoleType::PotentialExecutor => {
            Box::new(potential_executor::PotentialExecutorRole::default())
        }
        RoleType::Executor => Box::new(executor::ExecutorRole::default()),
        RoleType::MainStorage => Box::new(main_storage::MainStorageRole::default()),
        RoleType::Requester => Box::new(requester::RequesterRole::default()),
        RoleType::Undeployer => Box::new(undeployer::UndeployerRole::default()),
        RoleType::DeploymentCreator => {
            Box::new(deployment_creator::DeploymentCreatorRole::default())
        }
        RoleType::DeploymentStopper => {
            Box::new(deployment_stopper::DeploymentStopperRole::default())
        }
    }
}
