//! Configuration for the CLI.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use dcos_e2e_core::{ClusterSpecBuilder, DcosDockerConfig, DcosDockerSource, DCOS_DOCKER_URL};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the dcos-e2e CLI.
#[derive(Debug, Clone)]
pub struct E2eConfig {
    /// Repository dcos-docker is cloned from.
    pub dcos_docker_url: String,

    /// Branch or tag to clone (default branch if unset).
    pub dcos_docker_ref: Option<String>,

    /// Existing dcos-docker checkout; disables cloning when set.
    pub dcos_docker_path: Option<PathBuf>,

    /// Parent directory for per-cluster clones.
    pub workspace_root: PathBuf,

    /// Installer URL passed to dcos-docker.
    pub installer_url: Option<String>,

    /// Local installer passed to dcos-docker.
    pub installer_path: Option<PathBuf>,

    /// Treat the cluster as DC/OS Enterprise (default: false).
    pub enterprise: bool,

    /// Fixed wait for Enterprise clusters (default: 480 seconds).
    pub enterprise_wait: Duration,

    /// Upper bound on `make postflight` (default: 1800 seconds).
    pub readiness_timeout: Duration,

    /// Upper bound on node address lookup (default: 60 seconds).
    pub resolve_timeout: Duration,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("dcos-docker checkout not found: {0}")]
    MissingCheckout(PathBuf),

    #[error("installer not found: {0}")]
    MissingInstaller(PathBuf),

    #[error("both DCOS_E2E_INSTALLER_URL and DCOS_E2E_INSTALLER_PATH are set")]
    ConflictingInstaller,

    #[error("workspace root not found: {0}")]
    MissingWorkspaceRoot(PathBuf),
}

impl Default for E2eConfig {
    fn default() -> Self {
        let docker = DcosDockerConfig::default();
        Self {
            dcos_docker_url: DCOS_DOCKER_URL.to_string(),
            dcos_docker_ref: None,
            dcos_docker_path: None,
            workspace_root: docker.workspace_root,
            installer_url: None,
            installer_path: None,
            enterprise: false,
            enterprise_wait: docker.enterprise_wait,
            readiness_timeout: docker.readiness_timeout,
            resolve_timeout: docker.resolver.timeout,
        }
    }
}

impl E2eConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DCOS_E2E_DCOS_DOCKER_URL` | `https://github.com/dcos/dcos-docker.git` |
    /// | `DCOS_E2E_DCOS_DOCKER_REF` | default branch |
    /// | `DCOS_E2E_DCOS_DOCKER_PATH` | unset (clone per cluster) |
    /// | `DCOS_E2E_WORKSPACE` | system temp dir |
    /// | `DCOS_E2E_INSTALLER_URL` | unset (dcos-docker's default) |
    /// | `DCOS_E2E_INSTALLER_PATH` | unset |
    /// | `DCOS_E2E_ENTERPRISE` | `false` |
    /// | `DCOS_E2E_ENTERPRISE_WAIT_SECS` | `480` |
    /// | `DCOS_E2E_READINESS_TIMEOUT_SECS` | `1800` |
    /// | `DCOS_E2E_RESOLVE_TIMEOUT_SECS` | `60` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let seconds = |key: &str, fallback: Duration| {
            non_empty(key)
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            dcos_docker_url: non_empty("DCOS_E2E_DCOS_DOCKER_URL").unwrap_or(default.dcos_docker_url),
            dcos_docker_ref: non_empty("DCOS_E2E_DCOS_DOCKER_REF"),
            dcos_docker_path: non_empty("DCOS_E2E_DCOS_DOCKER_PATH").map(PathBuf::from),
            workspace_root: non_empty("DCOS_E2E_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or(default.workspace_root),
            installer_url: non_empty("DCOS_E2E_INSTALLER_URL"),
            installer_path: non_empty("DCOS_E2E_INSTALLER_PATH").map(PathBuf::from),
            enterprise: non_empty("DCOS_E2E_ENTERPRISE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(default.enterprise),
            enterprise_wait: seconds("DCOS_E2E_ENTERPRISE_WAIT_SECS", default.enterprise_wait),
            readiness_timeout: seconds("DCOS_E2E_READINESS_TIMEOUT_SECS", default.readiness_timeout),
            resolve_timeout: seconds("DCOS_E2E_RESOLVE_TIMEOUT_SECS", default.resolve_timeout),
        }
    }

    /// Validate that configured paths exist and settings agree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.installer_url.is_some() && self.installer_path.is_some() {
            return Err(ConfigError::ConflictingInstaller);
        }

        if let Some(path) = &self.dcos_docker_path {
            if !path.is_dir() {
                return Err(ConfigError::MissingCheckout(path.clone()));
            }
        }

        if let Some(path) = &self.installer_path {
            if !path.is_file() {
                return Err(ConfigError::MissingInstaller(path.clone()));
            }
        }

        // Clones are created on demand, so only the parent has to exist.
        if let Some(parent) = self.workspace_root.parent() {
            if !parent.exists() {
                return Err(ConfigError::MissingWorkspaceRoot(self.workspace_root.clone()));
            }
        }

        Ok(())
    }

    /// Validate configuration but only log warnings instead of failing.
    pub fn validate_warn(&self) {
        if let Err(e) = self.validate() {
            tracing::warn!(error = %e, "Configuration problem");
        }
    }

    /// Backend configuration for the library.
    pub fn docker_config(&self) -> DcosDockerConfig {
        let mut config = DcosDockerConfig::default();
        config.source = match &self.dcos_docker_path {
            Some(path) => DcosDockerSource::Checkout(path.clone()),
            None => DcosDockerSource::Git {
                url: self.dcos_docker_url.clone(),
                reference: self.dcos_docker_ref.clone(),
            },
        };
        config.workspace_root = self.workspace_root.clone();
        config.enterprise_wait = self.enterprise_wait;
        config.readiness_timeout = self.readiness_timeout;
        config.resolver.timeout = self.resolve_timeout;
        config
    }

    /// Apply the installer and variant settings to a spec under construction.
    pub fn apply(&self, mut builder: ClusterSpecBuilder) -> ClusterSpecBuilder {
        if let Some(url) = &self.installer_url {
            builder = builder.installer_url(url);
        } else if let Some(path) = &self.installer_path {
            builder = builder.installer_path(path);
        }
        if self.enterprise {
            builder = builder.enterprise();
        }
        builder
    }
}
