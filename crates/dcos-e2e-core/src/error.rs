//! Error types for dcos-e2e-core.

use crate::node::Role;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for dcos-e2e-core operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur while managing a cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Cluster creation failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// The cluster never became ready.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// Node addresses could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A command run on a node exited non-zero.
    #[error(transparent)]
    Command(#[from] CommandFailure),

    /// Cluster cleanup failed.
    #[error(transparent)]
    Teardown(#[from] TeardownError),

    /// The cluster spec was rejected before anything was started.
    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    /// Invalid cluster state for operation
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Returns true if this is a remote command that exited non-zero.
    ///
    /// Tests that expect a command to fail match on this rather than on
    /// the error message.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::Command(_))
    }

    /// Returns the command failure details, if this is one.
    pub fn as_command_failure(&self) -> Option<&CommandFailure> {
        match self {
            Self::Command(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Failure of a local tool invocation (`git`, `make`).
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Rendered command line
        command: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero code.
    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    Exit {
        /// Rendered command line
        command: String,
        /// Process exit code (-1 if killed by a signal)
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },
}

/// Errors raised while standing up a cluster.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The working directory for the provisioning tool could not be set up.
    #[error("failed to prepare working directory {path}: {source}")]
    WorkDir {
        /// Directory that could not be prepared
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Fetching the provisioning tool failed.
    #[error("failed to fetch dcos-docker: {0}")]
    Fetch(#[source] ToolError),

    /// The provisioning tool failed to create the cluster.
    #[error("failed to create cluster: {0}")]
    Create(#[source] ToolError),

    /// The configuration overlay could not be serialized.
    #[error("failed to serialize configuration overlay: {0}")]
    Overlay(#[from] serde_yaml::Error),
}

/// Errors raised while waiting for a cluster to become ready.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The readiness check exited non-zero.
    #[error("postflight check failed: {0}")]
    Postflight(#[source] ToolError),

    /// The readiness check did not finish in time.
    #[error("cluster not ready after {0:?}")]
    Timeout(Duration),

    /// Readiness was requested before provisioning.
    #[error("cluster has not been provisioned")]
    NotProvisioned,
}

/// Errors raised while mapping cluster roles to node addresses.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Could not reach the container runtime.
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),

    /// The container runtime returned an error for a query.
    #[error("failed to inspect container {container}: {message}")]
    Inspect {
        /// Container being inspected
        container: String,
        /// Error reported by the runtime
        message: String,
    },

    /// Fewer containers than expected appeared before the deadline.
    #[error("resolved {found} of {expected} {role} nodes within {timeout:?}")]
    Timeout {
        /// Role being resolved
        role: Role,
        /// Number of nodes requested
        expected: u32,
        /// Number of nodes found before giving up
        found: usize,
        /// Configured deadline
        timeout: Duration,
    },
}

/// A command run on a node exited non-zero.
///
/// This is an expected outcome for tests that assert failure, so it carries
/// the full captured output instead of just a message.
#[derive(Debug, Error)]
#[error("command `{command}` on {node} exited with code {exit_code}")]
pub struct CommandFailure {
    /// Address of the node the command ran on
    pub node: IpAddr,
    /// Command as passed to the node
    pub command: String,
    /// Remote exit code (255 is also used by `ssh` itself)
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

/// Errors raised while destroying a cluster.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// The provisioning tool's cleanup target failed.
    #[error("failed to clean cluster: {0}")]
    Clean(#[source] ToolError),

    /// The per-run working directory could not be removed.
    #[error("failed to remove working directory {path}: {source}")]
    RemoveWorkDir {
        /// Directory that could not be removed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
