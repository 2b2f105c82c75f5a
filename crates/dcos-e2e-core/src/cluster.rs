//! Cluster type - a provisioned DC/OS cluster with guaranteed teardown.

use crate::config::{ClusterSpec, DcosDockerConfig};
use crate::error::ClusterError;
use crate::node::{Node, Role};
use crate::process::{CommandRunner, TokioRunner};
use crate::provisioner::ClusterProvisioner;
use crate::resolver::{ContainerInspector, ContainerResolver, DockerInspector};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(Uuid);

impl ClusterId {
    /// Create a new random cluster ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First eight hex digits, for directory names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ClusterId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// Handle exists, nothing started.
    Created,
    /// Containers are being created or DC/OS is installing.
    Provisioning,
    /// Cluster is ready for commands.
    Ready,
    /// Cleanup is running.
    TearingDown,
    /// Cluster is destroyed.
    Destroyed,
    /// Provisioning failed and cleanup has run.
    Failed,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Ready => write!(f, "Ready"),
            Self::TearingDown => write!(f, "TearingDown"),
            Self::Destroyed => write!(f, "Destroyed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// A running DC/OS cluster.
///
/// A cluster consists of:
/// - The dcos-docker checkout it was created from
/// - The node containers created by `make`
///
/// Each handle is single-use: it is ready when [`create`](Self::create)
/// returns and cannot be provisioned again after teardown. Prefer
/// [`scoped`](Self::scoped), which tears the cluster down on every exit
/// path. A handle is meant for one owner; it is `Sync` so node queries can
/// be shared, but teardown requires exclusive access.
pub struct Cluster {
    id: ClusterId,
    spec: ClusterSpec,
    provisioner: ClusterProvisioner,
    resolver: ContainerResolver,
    state: ClusterState,
    created_at: DateTime<Utc>,
}

impl Cluster {
    /// Create a cluster using the local `make`, `git`, `ssh` and Docker daemon.
    ///
    /// This will:
    /// 1. Fetch dcos-docker (or use the configured checkout)
    /// 2. Run `make` to create the containers and install DC/OS
    /// 3. Wait for the cluster to be ready
    ///
    /// If any step fails, whatever was created is torn down before the
    /// original error is returned.
    pub async fn create(spec: ClusterSpec, config: DcosDockerConfig) -> Result<Self, ClusterError> {
        let inspector = DockerInspector::connect()?;
        Self::create_with(spec, config, Arc::new(TokioRunner), Arc::new(inspector)).await
    }

    /// Create a cluster with explicit process and container runtime backends.
    pub async fn create_with(
        spec: ClusterSpec,
        config: DcosDockerConfig,
        runner: Arc<dyn CommandRunner>,
        inspector: Arc<dyn ContainerInspector>,
    ) -> Result<Self, ClusterError> {
        spec.validate()?;
        let id = ClusterId::new();
        let start = std::time::Instant::now();
        tracing::info!(
            cluster_id = %id,
            masters = spec.masters,
            agents = spec.agents,
            public_agents = spec.public_agents,
            variant = ?spec.variant,
            "Creating cluster"
        );

        let resolver_config = config.resolver.clone();
        let mut provisioner = ClusterProvisioner::new(config, runner.clone());

        tracing::debug!(cluster_id = %id, state = %ClusterState::Provisioning, "Cluster state changed");
        if let Err(e) = Self::bring_up(&mut provisioner, &spec, id).await {
            tracing::error!(cluster_id = %id, error = %e, "Cluster creation failed");
            tracing::debug!(cluster_id = %id, state = %ClusterState::TearingDown, "Cluster state changed");
            if let Err(teardown) = provisioner.teardown().await {
                tracing::warn!(cluster_id = %id, error = %teardown, "Cleanup after failed creation also failed");
            }
            tracing::debug!(cluster_id = %id, state = %ClusterState::Failed, "Cluster state changed");
            return Err(e);
        }

        let Some(ssh_key_path) = provisioner.ssh_key_path() else {
            provisioner.teardown().await.ok();
            return Err(ClusterError::InvalidState {
                expected: "working directory".into(),
                actual: "none".into(),
            });
        };
        let resolver = ContainerResolver::new(inspector, runner, resolver_config, ssh_key_path);

        tracing::info!(
            cluster_id = %id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cluster ready"
        );

        Ok(Self {
            id,
            spec,
            provisioner,
            resolver,
            state: ClusterState::Ready,
            created_at: Utc::now(),
        })
    }

    /// Create a cluster, run `body` against it, then tear it down.
    ///
    /// Teardown runs whether `body` succeeds, fails or panics (the panic is
    /// resumed afterwards). If both `body` and teardown fail, the teardown
    /// error is logged and `body`'s error is returned.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let spec = ClusterSpec::builder().masters(1).build()?;
    /// Cluster::scoped(spec, DcosDockerConfig::default(), |cluster| {
    ///     Box::pin(async move {
    ///         for master in cluster.masters().await? {
    ///             master.run_as_root(&["test", "-f", "/etc/hosts"]).await?;
    ///         }
    ///         Ok(())
    ///     })
    /// })
    /// .await?;
    /// ```
    pub async fn scoped<F, R>(
        spec: ClusterSpec,
        config: DcosDockerConfig,
        body: F,
    ) -> Result<R, ClusterError>
    where
        F: for<'c> FnOnce(&'c Cluster) -> BoxFuture<'c, Result<R, ClusterError>>,
    {
        Self::create(spec, config).await?.run_scoped(body).await
    }

    /// Run `body` against this cluster, then tear it down.
    ///
    /// See [`scoped`](Self::scoped) for the error and panic behaviour.
    pub async fn run_scoped<F, R>(mut self, body: F) -> Result<R, ClusterError>
    where
        F: for<'c> FnOnce(&'c Cluster) -> BoxFuture<'c, Result<R, ClusterError>>,
    {
        let outcome = AssertUnwindSafe(body(&self)).catch_unwind().await;
        let teardown = self.teardown().await;

        match outcome {
            Err(panic) => {
                if let Err(e) = teardown {
                    tracing::warn!(cluster_id = %self.id, error = %e, "Teardown failed while unwinding");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(e)) => {
                if let Err(teardown) = teardown {
                    tracing::warn!(
                        cluster_id = %self.id,
                        error = %teardown,
                        "Teardown failed after an earlier error"
                    );
                }
                Err(e)
            }
            Ok(Ok(value)) => teardown.map(|()| value),
        }
    }

    /// Get the cluster ID.
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Get the current state.
    pub fn state(&self) -> ClusterState {
        self.state
    }

    /// Get the creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the spec used to create this cluster.
    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    /// The dcos-docker checkout backing this cluster.
    pub fn path(&self) -> Option<&Path> {
        self.provisioner.path()
    }

    /// All master nodes.
    pub async fn masters(&self) -> Result<HashSet<Node>, ClusterError> {
        self.nodes(Role::Master).await
    }

    /// All private agent nodes.
    pub async fn agents(&self) -> Result<HashSet<Node>, ClusterError> {
        self.nodes(Role::Agent).await
    }

    /// All public agent nodes.
    pub async fn public_agents(&self) -> Result<HashSet<Node>, ClusterError> {
        self.nodes(Role::PublicAgent).await
    }

    /// All nodes with the given role.
    ///
    /// Addresses are looked up again on every call, so containers that
    /// were restarted are picked up.
    pub async fn nodes(&self, role: Role) -> Result<HashSet<Node>, ClusterError> {
        self.ensure_ready()?;
        let expected = self.spec.node_count(role);
        tracing::debug!(cluster_id = %self.id, role = %role, expected, "Looking up nodes");
        Ok(self.resolver.resolve(role, expected).await?)
    }

    /// Destroy the cluster.
    ///
    /// Runs `make clean` and removes the per-cluster working directory.
    /// Once this has succeeded, further calls are no-ops. If it fails the
    /// cluster stays in `TearingDown` and calling it again retries.
    pub async fn teardown(&mut self) -> Result<(), ClusterError> {
        if self.state == ClusterState::Destroyed {
            tracing::debug!(cluster_id = %self.id, "Cluster already destroyed");
            return Ok(());
        }

        let start = std::time::Instant::now();
        tracing::info!(cluster_id = %self.id, "Destroying cluster");
        self.state = ClusterState::TearingDown;
        if let Err(e) = self.provisioner.teardown().await {
            tracing::warn!(
                cluster_id = %self.id,
                path = ?self.path(),
                error = %e,
                "Teardown failed, cluster may still be running"
            );
            return Err(e.into());
        }
        self.state = ClusterState::Destroyed;

        tracing::info!(
            cluster_id = %self.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cluster destroyed"
        );
        Ok(())
    }

    /// Destroy the cluster, consuming the handle.
    pub async fn destroy(mut self) -> Result<(), ClusterError> {
        self.teardown().await
    }

    async fn bring_up(
        provisioner: &mut ClusterProvisioner,
        spec: &ClusterSpec,
        id: ClusterId,
    ) -> Result<(), ClusterError> {
        provisioner.provision(spec, &id.short()).await?;
        provisioner.await_ready(spec).await?;
        Ok(())
    }

    /// Ensure the cluster is in the Ready state.
    fn ensure_ready(&self) -> Result<(), ClusterError> {
        if self.state != ClusterState::Ready {
            return Err(ClusterError::InvalidState {
                expected: "Ready".into(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("path", &self.path())
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if !self.provisioner.needs_teardown() {
            return;
        }

        tracing::warn!(cluster_id = %self.id, "Cluster dropped without teardown");
        // If the task never completes, dropping `orphan` keeps the working
        // directory on disk.
        let mut orphan = self.provisioner.detach();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = orphan.teardown().await {
                        tracing::error!(cluster_id = %id, error = %e, "Background teardown failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    cluster_id = %id,
                    path = ?orphan.path(),
                    "No async runtime to tear down cluster; containers may be left running"
                );
            }
        }
    }
}
