//! Node address resolution through the container runtime.
//!
//! The provisioning tool does not report which containers it created, so
//! nodes are found by name: `{prefix}{ordinal}` for ordinals `1..=count`.
//! Containers may still be starting when resolution begins, so each one is
//! polled until it is running with an address or the deadline passes.

use crate::config::ResolverConfig;
use crate::error::ResolutionError;
use crate::node::{Node, Role};
use crate::process::CommandRunner;
use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::Docker;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, timeout_at, Instant};

/// Looks up a container's network address by name.
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Address of a running container.
    ///
    /// Returns `Ok(None)` if the container does not exist yet, is not
    /// running, or has no address. Any other runtime failure is an error.
    async fn ip_address(&self, container: &str) -> Result<Option<IpAddr>, ResolutionError>;
}

/// [`ContainerInspector`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerInspector {
    docker: Docker,
}

impl DockerInspector {
    /// Connect using the local defaults (`DOCKER_HOST` or the Unix socket).
    pub fn connect() -> Result<Self, ResolutionError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ResolutionError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerInspector for DockerInspector {
    async fn ip_address(&self, container: &str) -> Result<Option<IpAddr>, ResolutionError> {
        let details = match self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                tracing::trace!(container = %container, "Container does not exist yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(ResolutionError::Inspect {
                    container: container.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let running = details
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false);
        if !running {
            tracing::trace!(container = %container, "Container not running");
            return Ok(None);
        }

        let Some(raw) = details
            .network_settings
            .and_then(|settings| settings.ip_address)
            .filter(|ip| !ip.is_empty())
        else {
            return Ok(None);
        };

        raw.parse()
            .map(Some)
            .map_err(|_| ResolutionError::Inspect {
                container: container.to_string(),
                message: format!("invalid IP address {raw:?}"),
            })
    }
}

/// Maps a role and node count to the cluster's [`Node`]s.
#[derive(Clone)]
pub struct ContainerResolver {
    inspector: Arc<dyn ContainerInspector>,
    runner: Arc<dyn CommandRunner>,
    config: ResolverConfig,
    ssh_key_path: PathBuf,
}

impl ContainerResolver {
    /// Create a resolver. Produced nodes log in with `ssh_key_path`.
    pub fn new(
        inspector: Arc<dyn ContainerInspector>,
        runner: Arc<dyn CommandRunner>,
        config: ResolverConfig,
        ssh_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inspector,
            runner,
            config,
            ssh_key_path: ssh_key_path.into(),
        }
    }

    /// Resolve `expected` distinct nodes for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::Timeout`] if fewer than `expected` nodes
    /// have addresses when the configured timeout elapses, or the
    /// inspector's error if the runtime query fails.
    pub async fn resolve(&self, role: Role, expected: u32) -> Result<HashSet<Node>, ResolutionError> {
        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut nodes = HashSet::with_capacity(expected as usize);
        let mut attempts = 0u32;
        tracing::debug!(role = %role, expected, "Resolving nodes");

        for ordinal in 1..=expected {
            let container = self.config.naming.container_name(role, ordinal);
            loop {
                attempts += 1;
                // A hung runtime query must not outlive the deadline.
                let address = timeout_at(deadline, self.inspector.ip_address(&container))
                    .await
                    .ok()
                    .transpose()?
                    .flatten();
                if let Some(ip) = address {
                    let node = Node::new(ip, &self.ssh_key_path, role, self.runner.clone());
                    if nodes.insert(node) {
                        tracing::debug!(container = %container, ip = %ip, "Resolved node");
                        break;
                    }
                    tracing::trace!(container = %container, ip = %ip, "Duplicate address, waiting");
                }

                if Instant::now() >= deadline {
                    tracing::warn!(
                        role = %role,
                        container = %container,
                        expected,
                        found = nodes.len(),
                        attempts,
                        "Node resolution timeout"
                    );
                    return Err(ResolutionError::Timeout {
                        role,
                        expected,
                        found: nodes.len(),
                        timeout: self.config.timeout,
                    });
                }
                tracing::trace!(container = %container, attempt = attempts, "Container not ready, retrying...");
                sleep(self.config.poll_interval).await;
            }
        }

        tracing::info!(
            role = %role,
            count = nodes.len(),
            attempts,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Nodes resolved"
        );
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeInspector, RecordingRunner};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(172, 17, 0, last))
    }

    fn resolver(inspector: Arc<FakeInspector>) -> ContainerResolver {
        ContainerResolver::new(
            inspector,
            RecordingRunner::new(),
            ResolverConfig::default(),
            "/tmp/dcos-docker/include/ssh/id_rsa",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_all_running() {
        let inspector = FakeInspector::new();
        inspector.running("dcos-docker-agent1", ip(3));
        inspector.running("dcos-docker-agent2", ip(4));
        inspector.running("dcos-docker-agent3", ip(5));

        let nodes = resolver(inspector).resolve(Role::Agent, 3).await.unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|n| n.role() == Role::Agent));
        let addresses: HashSet<_> = nodes.iter().map(Node::ip_address).collect();
        assert_eq!(addresses, HashSet::from([ip(3), ip(4), ip(5)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_zero_nodes() {
        let nodes = resolver(FakeInspector::new())
            .resolve(Role::PublicAgent, 0)
            .await
            .unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_waits_for_late_container() {
        let inspector = FakeInspector::new();
        inspector.appears_after("dcos-docker-master1", ip(2), 5);

        let start = Instant::now();
        let nodes = resolver(inspector.clone())
            .resolve(Role::Master, 1)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(inspector.polls("dcos-docker-master1"), 6);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_times_out_when_container_missing() {
        let inspector = FakeInspector::new();
        inspector.running("dcos-docker-master1", ip(2));

        let start = Instant::now();
        let err = resolver(inspector)
            .resolve(Role::Master, 2)
            .await
            .unwrap_err();
        match err {
            ResolutionError::Timeout {
                role,
                expected,
                found,
                timeout,
            } => {
                assert_eq!(role, Role::Master);
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
                assert_eq!(timeout, Duration::from_secs(60));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(start.elapsed() <= Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_duplicate_address_is_not_counted() {
        let inspector = FakeInspector::new();
        inspector.running("dcos-docker-agent1", ip(3));
        inspector.running("dcos-docker-agent2", ip(3));

        let err = resolver(inspector).resolve(Role::Agent, 2).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Timeout { found: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_runtime_error_fails_fast() {
        let inspector = FakeInspector::new();
        inspector.break_runtime("connection refused");

        let start = Instant::now();
        let err = resolver(inspector).resolve(Role::Master, 1).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Inspect { .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_hung_query_respects_deadline() {
        let inspector = FakeInspector::new();
        inspector.running("dcos-docker-master1", ip(2));
        inspector.hangs("dcos-docker-master2");

        let start = Instant::now();
        let err = resolver(inspector).resolve(Role::Master, 2).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Timeout { found: 1, .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }
}
