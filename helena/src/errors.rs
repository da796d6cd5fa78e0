// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Coordination error types

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The reason an application could not be brought up on an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionFailure {
    /// No code could be retrieved for the application
    NoCode,
    /// The code was installed but failed to start
    CouldNotStart,
    /// The code is not a package the runtime understands
    WrongCodeType,
    /// The runtime refused to install the code
    CouldNotInstall,
}

impl Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCode => write!(f, "no code available"),
            Self::CouldNotStart => write!(f, "could not start"),
            Self::WrongCodeType => write!(f, "wrong code type"),
            Self::CouldNotInstall => write!(f, "could not install"),
        }
    }
}

impl std::error::Error for ExecutionFailure {}

/// Errors which are carried back across the network inside an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErr {
    /// The target node hosts no ensemble for the requested id
    EnsembleNotFound,
    /// The ensemble exists but the requested role does not (or is ambiguous)
    RoleNotFound,
    /// The target node could not start the requested role
    RoleCreationFailed(String),
}

impl Display for RemoteErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnsembleNotFound => write!(f, "Ensemble not found"),
            Self::RoleNotFound => write!(f, "Role not found"),
            Self::RoleCreationFailed(reason) => write!(f, "Role creation failed '{reason}'"),
        }
    }
}

impl std::error::Error for RemoteErr {}

/// Errors surfaced to a role by its runtime helpers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleErr {
    /// The target node hosts no ensemble for the requested id
    EnsembleNotFound,
    /// The ensemble exists but the requested role does not
    RoleNotFound,
    /// A role could not be created
    RoleCreationFailed(String),
    /// No answer (or no matching message) arrived in time
    Timeout,
    /// The role's inbox was closed by a stop signal
    Stopped,
    /// The application could not be executed
    ExecutionFailed(ExecutionFailure),
}

impl std::error::Error for RoleErr {}

impl Display for RoleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnsembleNotFound => write!(f, "Ensemble not found"),
            Self::RoleNotFound => write!(f, "Role not found"),
            Self::RoleCreationFailed(reason) => write!(f, "Role creation failed '{reason}'"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Stopped => write!(f, "Role stopped"),
            Self::ExecutionFailed(why) => write!(f, "Execution failed '{why}'"),
        }
    }
}

impl From<RemoteErr> for RoleErr {
    fn from(value: RemoteErr) -> Self {
        match value {
            RemoteErr::EnsembleNotFound => Self::EnsembleNotFound,
            RemoteErr::RoleNotFound => Self::RoleNotFound,
            RemoteErr::RoleCreationFailed(reason) => Self::RoleCreationFailed(reason),
        }
    }
}

impl From<crate::concurrency::Timeout> for RoleErr {
    fn from(_: crate::concurrency::Timeout) -> Self {
        Self::Timeout
    }
}

impl From<ExecutionFailure> for RoleErr {
    fn from(value: ExecutionFailure) -> Self {
        Self::ExecutionFailed(value)
    }
}

impl RoleErr {
    /// Is this a "nothing is there" answer rather than a transient failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EnsembleNotFound | Self::RoleNotFound)
    }
}

/// Frame encoding or decoding failed
#[derive(Debug)]
pub enum CodecErr {
    /// The frame is shorter than its length prefix claims
    Truncated,
    /// The payload could not be (de)serialized
    Serialization(bincode::Error),
}

impl std::error::Error for CodecErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl Display for CodecErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "Frame truncated"),
            Self::Serialization(inner) => write!(f, "Frame serialization failed '{inner}'"),
        }
    }
}

impl From<bincode::Error> for CodecErr {
    fn from(value: bincode::Error) -> Self {
        Self::Serialization(value)
    }
}

/// A requirements document could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementsErr {
    /// The document is not valid UTF-8
    Encoding,
    /// A line is not of the form `key=value`
    MalformedLine(String),
    /// A known key carries a value which does not parse
    InvalidValue {
        /// The offending key
        key: String,
        /// The raw value
        value: String,
    },
}

impl std::error::Error for RequirementsErr {}

impl Display for RequirementsErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encoding => write!(f, "Requirements are not valid UTF-8"),
            Self::MalformedLine(line) => write!(f, "Malformed requirements line '{line}'"),
            Self::InvalidValue { key, value } => {
                write!(f, "Invalid value '{value}' for requirement '{key}'")
            }
        }
    }
}

/// The elastic infrastructure failed to provision or destroy a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticErr(pub String);

impl std::error::Error for ElasticErr {}

impl Display for ElasticErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Elastic infrastructure error '{}'", self.0)
    }
}

/// The application runtime failed to serve a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeErr(pub String);

impl std::error::Error for RuntimeErr {}

impl Display for RuntimeErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Application runtime error '{}'", self.0)
    }
}

/// A UI request could not be answered. Displays as the descriptive string
/// handed back to the administrative layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRequestErr(pub String);

impl std::error::Error for AppRequestErr {}

impl Display for AppRequestErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
