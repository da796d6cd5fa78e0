// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The messages exchanged between nodes and between roles

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::RemoteErr;
use crate::info::{AppInfo, ExecutionStatus, HostHandle, NodeInfo};
use crate::{CorrelationId, NodeId, RoleId};

/// The kinds of roles which take part in the deployment protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleType {
    /// Stores the application and starts its coordinator
    Deployer,
    /// Coordinates the application: finds and supervises its executor
    Initiator,
    /// Checks whether its node can execute an application
    PotentialExecutor,
    /// Runs the application
    Executor,
    /// Holds the application code on the node closest to its id
    MainStorage,
    /// Relays one UI request to the executor
    Requester,
    /// Tears an application down
    Undeployer,
    /// Provisions an elastic host
    DeploymentCreator,
    /// Destroys an elastic host
    DeploymentStopper,
}

impl RoleType {
    /// The name a node advertises the role under
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deployer => "Deployer",
            Self::Initiator => "Initiator",
            Self::PotentialExecutor => "Potential Executor",
            Self::Executor => "Executor",
            Self::MainStorage => "Main Storage",
            Self::Requester => "Requester",
            Self::Undeployer => "Undeployer",
            Self::DeploymentCreator => "Deployment Creator",
            Self::DeploymentStopper => "Deployment Stopper",
        }
    }

    /// At most one instance of a singleton role runs per ensemble and node
    pub fn is_singleton(&self) -> bool {
        matches!(self, Self::Initiator | Self::MainStorage)
    }
}

impl Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parameters of a UI request, each key may carry several values
pub type UiParams = BTreeMap<String, Vec<String>>;

/// The payload of a role-to-role message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoleBody {
    /// Admin layer to deployer: deploy this application
    DeployApp {
        /// The application
        app: AppInfo,
        /// Its package
        code: Vec<u8>,
    },
    /// Deployer to main storage: store this application
    StoreApp {
        /// The application
        app: AppInfo,
        /// Its package
        code: Vec<u8>,
    },
    /// Main storage to deployer: the coordinator could not be started
    MainStorageFailed,
    /// Main storage to deployer: the coordinator is running
    InitiatingStarted,
    /// Main storage to initiator: start coordinating
    InitApplication {
        /// The application
        app: AppInfo,
    },
    /// Initiator to potential executor: can you run this?
    AskForExecution {
        /// The application
        app: AppInfo,
    },
    /// The executor is running the application
    AcknowledgeExecution {
        /// The running executor
        executor: RoleId,
    },
    /// Potential executor to initiator: this node cannot run the application
    DeclineExecution,
    /// Potential executor to executor: bring the application up
    ExecuteApp {
        /// The application
        app: AppInfo,
    },
    /// Outcome of an execution attempt
    ExecutionResult {
        /// What happened
        status: ExecutionStatus,
    },
    /// Executor to main storage: send me the code
    RequestCode {
        /// The application
        app: AppInfo,
    },
    /// Main storage to executor: the code
    AppCode {
        /// The application package
        code: Vec<u8>,
    },
    /// Liveness probe
    PingExecutor,
    /// Liveness answer carrying the executor node's summary
    PongExecutor {
        /// The executor's node summary
        info: NodeInfo,
    },
    /// Initiator's pinger to itself: the executor stopped answering
    ExecutorFailed,
    /// Initiator's pinger to itself: the executor violates the requirements
    ExecutorFailedRequirements,
    /// Stop handling the application
    StopAppHandling {
        /// The application
        app: AppInfo,
    },
    /// Requester to initiator: who executes this application?
    AskForExecutor {
        /// The application
        app: AppInfo,
    },
    /// Initiator to requester: the current executor
    ReportOnExecutor {
        /// The executor, if the application is running
        executor: Option<RoleId>,
    },
    /// The initiator's own stop signal
    InternalInitiatorShutdown,
    /// The main storage's own stop signal
    InternalMainStorageShutdown,
    /// Remove the application
    UndeployApp {
        /// The application
        app: AppInfo,
    },
    /// Admin layer to requester: relay this UI request
    RequesterRequest {
        /// Slot the answer is deposited in
        routing: CorrelationId,
        /// The application
        app: AppInfo,
        /// Target inside the application
        target: String,
        /// Request parameters
        params: UiParams,
    },
    /// Requester to executor: a UI request
    UiRequest {
        /// Slot the answer is deposited in
        routing: CorrelationId,
        /// The application
        app: AppInfo,
        /// Target inside the application
        target: String,
        /// Request parameters
        params: UiParams,
    },
    /// Executor to requester: the application's answer
    UiResponse {
        /// The textual result
        result: String,
    },
    /// Initiator to deployment creator: provision a host
    CreateDeployment {
        /// The application the host is for
        app: AppInfo,
    },
    /// A host is up
    DeploymentCreated {
        /// The new host
        handle: HostHandle,
    },
    /// No host could be provisioned
    DeploymentCreationFailed,
    /// Initiator to deployment stopper: destroy the executor's host
    StopDeployment {
        /// The application
        app: AppInfo,
        /// The virtualized executor node
        executor: NodeInfo,
    },
}

/// Fieldless tags of [RoleBody], used for selective receive
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    DeployApp,
    StoreApp,
    MainStorageFailed,
    InitiatingStarted,
    InitApplication,
    AskForExecution,
    AcknowledgeExecution,
    DeclineExecution,
    ExecuteApp,
    ExecutionResult,
    RequestCode,
    AppCode,
    PingExecutor,
    PongExecutor,
    ExecutorFailed,
    ExecutorFailedRequirements,
    StopAppHandling,
    AskForExecutor,
    ReportOnExecutor,
    InternalInitiatorShutdown,
    InternalMainStorageShutdown,
    UndeployApp,
    RequesterRequest,
    UiRequest,
    UiResponse,
    CreateDeployment,
    DeploymentCreated,
    DeploymentCreationFailed,
    StopDeployment,
}

impl RoleBody {
    /// The tag of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::DeployApp { .. } => MessageKind::DeployApp,
            Self::StoreApp { .. } => MessageKind::StoreApp,
            Self::MainStorageFailed => MessageKind::MainStorageFailed,
            Self::InitiatingStarted => MessageKind::InitiatingStarted,
            Self::InitApplication { .. } => MessageKind::InitApplication,
            Self::AskForExecution { .. } => MessageKind::AskForExecution,
            Self::AcknowledgeExecution { .. } => MessageKind::AcknowledgeExecution,
            Self::DeclineExecution => MessageKind::DeclineExecution,
            Self::ExecuteApp { .. } => MessageKind::ExecuteApp,
            Self::ExecutionResult { .. } => MessageKind::ExecutionResult,
            Self::RequestCode { .. } => MessageKind::RequestCode,
            Self::AppCode { .. } => MessageKind::AppCode,
            Self::PingExecutor => MessageKind::PingExecutor,
            Self::PongExecutor { .. } => MessageKind::PongExecutor,
            Self::ExecutorFailed => MessageKind::ExecutorFailed,
            Self::ExecutorFailedRequirements => MessageKind::ExecutorFailedRequirements,
            Self::StopAppHandling { .. } => MessageKind::StopAppHandling,
            Self::AskForExecutor { .. } => MessageKind::AskForExecutor,
            Self::ReportOnExecutor { .. } => MessageKind::ReportOnExecutor,
            Self::InternalInitiatorShutdown => MessageKind::InternalInitiatorShutdown,
            Self::InternalMainStorageShutdown => MessageKind::InternalMainStorageShutdown,
            Self::UndeployApp { .. } => MessageKind::UndeployApp,
            Self::RequesterRequest { .. } => MessageKind::RequesterRequest,
            Self::UiRequest { .. } => MessageKind::UiRequest,
            Self::UiResponse { .. } => MessageKind::UiResponse,
            Self::CreateDeployment { .. } => MessageKind::CreateDeployment,
            Self::DeploymentCreated { .. } => MessageKind::DeploymentCreated,
            Self::DeploymentCreationFailed => MessageKind::DeploymentCreationFailed,
            Self::StopDeployment { .. } => MessageKind::StopDeployment,
        }
    }
}

/// A message from one role to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMessage {
    /// The sending role
    pub from: RoleId,
    /// The receiving role
    pub to: RoleId,
    /// The payload
    pub body: RoleBody,
}

impl RoleMessage {
    /// The tag of the payload
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

/// Cross-node role management requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameworkRequest {
    /// Start a role of `role_type` in the caller's ensemble on the receiving node
    CreateRole {
        /// The asking role
        from: RoleId,
        /// What to start
        role_type: RoleType,
    },
    /// Look up the single role of `role_type` in the caller's ensemble on the receiving node
    GetRole {
        /// The asking role
        from: RoleId,
        /// What to look up
        role_type: RoleType,
    },
}

impl FrameworkRequest {
    /// The asking role
    pub fn from(&self) -> &RoleId {
        match self {
            Self::CreateRole { from, .. } | Self::GetRole { from, .. } => from,
        }
    }
}

/// A request which expects a correlated answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Deliver to a role's inbox
    Role(RoleMessage),
    /// Role management
    Framework(FrameworkRequest),
}

/// The answer to a [Request]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Answer {
    /// The role message was queued, or why it was rejected
    Routed(Result<(), RemoteErr>),
    /// The created or located role, or why there is none
    Framework(Result<RoleId, RemoteErr>),
}

/// Everything one node sends to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Envelope {
    /// Known node summaries
    Gossip {
        /// Summaries of every node the sender knows, itself included
        known: Vec<NodeInfo>,
    },
    /// A correlated request
    Request {
        /// The node to answer to
        from: NodeId,
        /// Matches the answer to the waiting caller
        correlation: CorrelationId,
        /// The request
        body: Request,
    },
    /// The answer to a correlated request
    Answer {
        /// Matches the answer to the waiting caller
        correlation: CorrelationId,
        /// The answer
        body: Answer,
    },
    /// Ask the receiving node to shut down
    ShutdownNode,
}
