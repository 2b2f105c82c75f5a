//! Cluster nodes and remote command execution.

use crate::error::{ClusterError, CommandFailure};
use crate::process::{CommandRunner, ExecResult, Invocation};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Account commands are run as on every node.
const SSH_USER: &str = "root";

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Master node.
    Master,
    /// Private agent.
    Agent,
    /// Public agent.
    PublicAgent,
}

impl Role {
    /// All roles, in provisioning order.
    pub const ALL: [Role; 3] = [Role::Master, Role::Agent, Role::PublicAgent];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Agent => write!(f, "agent"),
            Self::PublicAgent => write!(f, "public-agent"),
        }
    }
}

/// A single cluster node, reachable over SSH.
///
/// The address is resolved once when the node is produced and never
/// refreshed. A node holds no reference back to its cluster; once the
/// cluster is torn down the node is simply unreachable.
#[derive(Clone)]
pub struct Node {
    ip_address: IpAddr,
    ssh_key_path: PathBuf,
    role: Role,
    runner: Arc<dyn CommandRunner>,
}

impl Node {
    /// Create a node record.
    pub fn new(
        ip_address: IpAddr,
        ssh_key_path: impl Into<PathBuf>,
        role: Role,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            ip_address,
            ssh_key_path: ssh_key_path.into(),
            role,
            runner,
        }
    }

    /// The node's address.
    pub fn ip_address(&self) -> IpAddr {
        self.ip_address
    }

    /// Private key used to log in.
    pub fn ssh_key_path(&self) -> &Path {
        &self.ssh_key_path
    }

    /// The node's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The `ssh` invocation that runs `args` as root on this node.
    ///
    /// Host key checking is disabled. Nodes are short-lived containers
    /// whose keys change on every run; do not reuse this against
    /// long-lived hosts.
    pub fn ssh_invocation<S: AsRef<str>>(&self, args: &[S]) -> Invocation {
        Invocation::new("ssh")
            // Suppress warnings, in particular about changed host keys.
            .arg("-q")
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "PreferredAuthentications=publickey"])
            .arg("-i")
            .arg(self.ssh_key_path.to_string_lossy())
            .args(["-l", SSH_USER])
            .arg(self.ip_address.to_string())
            .args(args.iter().map(|a| a.as_ref().to_string()))
    }

    /// Run a command on this node as root.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Command`] if the command exits non-zero
    /// (including `ssh`'s own 255 on connection failure), and
    /// [`ClusterError::Io`] if `ssh` could not be started.
    pub async fn run_as_root<S: AsRef<str>>(&self, args: &[S]) -> Result<ExecResult, ClusterError> {
        let command = args
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(node = %self.ip_address, role = %self.role, cmd = %command, "Running command as root");

        let result = self.runner.run(&self.ssh_invocation(args)).await?;
        tracing::debug!(
            node = %self.ip_address,
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Remote command completed"
        );

        if !result.success() {
            return Err(CommandFailure {
                node: self.ip_address,
                command,
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            }
            .into());
        }
        Ok(result)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("ip_address", &self.ip_address)
            .field("ssh_key_path", &self.ssh_key_path)
            .field("role", &self.role)
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ip_address == other.ip_address
            && self.ssh_key_path == other.ssh_key_path
            && self.role == other.role
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip_address.hash(state);
        self.ssh_key_path.hash(state);
        self.role.hash(state);
    }
}
