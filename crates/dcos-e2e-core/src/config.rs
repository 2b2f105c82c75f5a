//! Cluster and harness configuration types.

use crate::error::ClusterError;
use crate::node::Role;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Upstream repository of the provisioning tool.
pub const DCOS_DOCKER_URL: &str = "https://github.com/dcos/dcos-docker.git";

/// Which DC/OS distribution the cluster runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DcosVariant {
    /// Open source DC/OS.
    #[default]
    Oss,
    /// DC/OS Enterprise. `make postflight` does not work for it.
    Enterprise,
}

/// A pre-built installer for the provisioning tool to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerArtifact {
    /// Download the installer from a URL.
    Url(String),
    /// Use an installer already on disk.
    Path(PathBuf),
}

/// Extra installation settings merged into the cluster's base config.
///
/// Keys are kept sorted, so the serialized overlay is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraConfig(Map<String, Value>);

impl ExtraConfig {
    /// Create an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// True if there are no settings.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Access the settings.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Serialize as block-style YAML, appendable to the base config.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.0)
    }
}

impl From<Map<String, Value>> for ExtraConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for ExtraConfig {
    type Error = ClusterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(ClusterError::InvalidSpec(format!(
                "extra config must be a mapping, got {other}"
            ))),
        }
    }
}

/// What cluster to create.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    /// Number of master nodes (default: 1).
    pub masters: u32,
    /// Number of private agents (default: 0).
    pub agents: u32,
    /// Number of public agents (default: 0).
    pub public_agents: u32,
    /// Settings appended to the generated installer config.
    pub extra_config: ExtraConfig,
    /// Installer to use instead of the tool's default.
    pub installer: Option<InstallerArtifact>,
    /// Distribution variant; changes how readiness is awaited.
    pub variant: DcosVariant,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            masters: 1,
            agents: 0,
            public_agents: 0,
            extra_config: ExtraConfig::default(),
            installer: None,
            variant: DcosVariant::Oss,
        }
    }
}

impl ClusterSpec {
    /// Create a new spec builder.
    pub fn builder() -> ClusterSpecBuilder {
        ClusterSpecBuilder::default()
    }

    /// Number of nodes requested for a role.
    pub fn node_count(&self, role: Role) -> u32 {
        match role {
            Role::Master => self.masters,
            Role::Agent => self.agents,
            Role::PublicAgent => self.public_agents,
        }
    }

    /// Validate the spec.
    ///
    /// Node counts are not policed here: zero masters is the caller's call.
    pub fn validate(&self) -> Result<(), ClusterError> {
        match &self.installer {
            Some(InstallerArtifact::Url(url)) if url.trim().is_empty() => {
                Err(ClusterError::InvalidSpec("installer URL is empty".into()))
            }
            Some(InstallerArtifact::Path(path)) if path.as_os_str().is_empty() => {
                Err(ClusterError::InvalidSpec("installer path is empty".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Builder for ClusterSpec.
#[derive(Debug, Default)]
pub struct ClusterSpecBuilder {
    spec: ClusterSpec,
}

impl ClusterSpecBuilder {
    /// Set the number of masters.
    pub fn masters(mut self, count: u32) -> Self {
        self.spec.masters = count;
        self
    }

    /// Set the number of private agents.
    pub fn agents(mut self, count: u32) -> Self {
        self.spec.agents = count;
        self
    }

    /// Set the number of public agents.
    pub fn public_agents(mut self, count: u32) -> Self {
        self.spec.public_agents = count;
        self
    }

    /// Set the configuration overlay.
    pub fn extra_config(mut self, config: impl Into<ExtraConfig>) -> Self {
        self.spec.extra_config = config.into();
        self
    }

    /// Install from an installer URL.
    pub fn installer_url(mut self, url: impl Into<String>) -> Self {
        self.spec.installer = Some(InstallerArtifact::Url(url.into()));
        self
    }

    /// Install from a local installer.
    pub fn installer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.installer = Some(InstallerArtifact::Path(path.into()));
        self
    }

    /// Mark the cluster as DC/OS Enterprise.
    pub fn enterprise(mut self) -> Self {
        self.spec.variant = DcosVariant::Enterprise;
        self
    }

    /// Build the spec, validating all fields.
    pub fn build(self) -> Result<ClusterSpec, ClusterError> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// Container name prefixes the provisioning tool uses for each role.
///
/// The container for ordinal `n` is named `{prefix}{n}`, counting from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNaming {
    /// Prefix for master containers.
    pub master: String,
    /// Prefix for private agent containers.
    pub agent: String,
    /// Prefix for public agent containers.
    pub public_agent: String,
}

impl Default for ContainerNaming {
    fn default() -> Self {
        Self {
            master: "dcos-docker-master".into(),
            agent: "dcos-docker-agent".into(),
            public_agent: "dcos-docker-pubagent".into(),
        }
    }
}

impl ContainerNaming {
    /// Prefix for a role.
    pub fn prefix(&self, role: Role) -> &str {
        match role {
            Role::Master => &self.master,
            Role::Agent => &self.agent,
            Role::PublicAgent => &self.public_agent,
        }
    }

    /// Container name for the `ordinal`th node of a role.
    pub fn container_name(&self, role: Role, ordinal: u32) -> String {
        format!("{}{}", self.prefix(role), ordinal)
    }
}

/// How node addresses are polled from the container runtime.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Delay between polls (default: 1 second).
    pub poll_interval: Duration,
    /// Give up after this long (default: 60 seconds).
    pub timeout: Duration,
    /// Container naming scheme.
    pub naming: ContainerNaming,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
            naming: ContainerNaming::default(),
        }
    }
}

/// Where the provisioning tool comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DcosDockerSource {
    /// Clone into a fresh directory per cluster, removed on teardown.
    Git {
        /// Repository URL.
        url: String,
        /// Branch or tag to check out (default branch if `None`).
        reference: Option<String>,
    },
    /// Use an existing checkout in place. Never removed.
    Checkout(PathBuf),
}

impl Default for DcosDockerSource {
    fn default() -> Self {
        Self::Git {
            url: DCOS_DOCKER_URL.into(),
            reference: None,
        }
    }
}

/// Configuration for the dcos-docker backend.
#[derive(Debug, Clone)]
pub struct DcosDockerConfig {
    /// Where to get dcos-docker from.
    pub source: DcosDockerSource,
    /// Parent directory for per-cluster clones (default: system temp dir).
    pub workspace_root: PathBuf,
    /// Fixed wait used instead of `make postflight` for Enterprise
    /// (default: 8 minutes, an overestimate).
    pub enterprise_wait: Duration,
    /// Upper bound on `make postflight` (default: 30 minutes).
    pub readiness_timeout: Duration,
    /// Node address resolution settings.
    pub resolver: ResolverConfig,
}

impl Default for DcosDockerConfig {
    fn default() -> Self {
        Self {
            source: DcosDockerSource::default(),
            workspace_root: std::env::temp_dir(),
            enterprise_wait: Duration::from_secs(8 * 60),
            readiness_timeout: Duration::from_secs(30 * 60),
            resolver: ResolverConfig::default(),
        }
    }
}
