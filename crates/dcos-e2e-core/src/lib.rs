//! # dcos-e2e-core
//!
//! Throwaway DC/OS clusters for end-to-end tests.
//!
//! This crate creates a DC/OS cluster from Docker containers using the
//! dcos-docker tool, hands back its nodes, runs commands on them over SSH,
//! and always tears the cluster down afterwards.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    dcos-e2e-core (host)                  │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │    Cluster      │────▶│  ClusterProvisioner      │   │
//! │  │  - create()     │     │  git clone / make        │   │
//! │  │  - masters()    │     └──────────────────────────┘   │
//! │  │  - scoped()     │                                    │
//! │  │  - destroy()    │     ┌──────────────────────────┐   │
//! │  └─────────────────┘────▶│  ContainerResolver       │   │
//! │           │              │  (Docker Engine API)     │   │
//! │           ▼              └──────────────────────────┘   │
//! │  ┌─────────────────┐                                    │
//! │  │     Node        │──── ssh root@<ip> ────▶ container  │
//! │  │  - run_as_root()│                                    │
//! │  └─────────────────┘                                    │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use dcos_e2e_core::{Cluster, ClusterSpec, DcosDockerConfig, ExtraConfig};
//! use serde_json::json;
//!
//! # async fn example() -> dcos_e2e_core::Result<()> {
//! let overlay = ExtraConfig::try_from(json!({
//!     "cluster_docker_credentials_enabled": true,
//! }))?;
//!
//! let spec = ClusterSpec::builder()
//!     .masters(1)
//!     .agents(1)
//!     .extra_config(overlay)
//!     .build()?;
//!
//! Cluster::scoped(spec, DcosDockerConfig::default(), |cluster| {
//!     Box::pin(async move {
//!         for master in cluster.masters().await? {
//!             master.run_as_root(&["test", "-f", "/etc/hosts"]).await?;
//!         }
//!         Ok(())
//!     })
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Requirements
//!
//! `git`, `make` and `ssh` on `PATH`, and a Docker daemon reachable with
//! the local defaults.

mod cluster;
mod config;
mod error;
mod node;
mod process;
mod provisioner;
mod resolver;

#[cfg(test)]
mod testing;

pub use cluster::{Cluster, ClusterId, ClusterState};
pub use config::{
    ClusterSpec, ClusterSpecBuilder, ContainerNaming, DcosDockerConfig, DcosDockerSource,
    DcosVariant, ExtraConfig, InstallerArtifact, ResolverConfig, DCOS_DOCKER_URL,
};
pub use error::{
    ClusterError, CommandFailure, ProvisionError, ReadinessError, ResolutionError, Result,
    TeardownError, ToolError,
};
pub use node::{Node, Role};
pub use process::{CommandRunner, ExecResult, Invocation, TokioRunner};
pub use provisioner::ClusterProvisioner;
pub use resolver::{ContainerInspector, ContainerResolver, DockerInspector};
