//! Cluster provisioning through dcos-docker.
//!
//! dcos-docker is driven purely through `make`: the default target creates
//! the containers and installs DC/OS, `postflight` waits for the install
//! to finish, and `clean` removes everything. This module builds those
//! invocations and owns the checkout they run in.

use crate::config::{ClusterSpec, DcosDockerConfig, DcosDockerSource, DcosVariant, InstallerArtifact};
use crate::error::{ProvisionError, ReadinessError, TeardownError};
use crate::process::{run_checked, CommandRunner, Invocation};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Location of the node SSH key inside a dcos-docker checkout.
const SSH_KEY_PATH: &str = "include/ssh/id_rsa";

/// Directory the provisioning tool runs in.
#[derive(Debug)]
enum WorkDir {
    /// Created for this cluster and removed on teardown.
    Ephemeral(TempDir),
    /// Supplied by the caller and left in place.
    Existing(PathBuf),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            Self::Ephemeral(dir) => dir.path(),
            Self::Existing(path) => path,
        }
    }

    /// Stop the directory from being removed when dropped.
    fn keep(self) -> PathBuf {
        match self {
            Self::Ephemeral(dir) => dir.keep(),
            Self::Existing(path) => path,
        }
    }
}

/// Stands up, checks and destroys one cluster with dcos-docker.
///
/// Each provisioner is used for a single cluster. It does not track the
/// containers it creates; `make clean` is responsible for finding them.
///
/// Dropping a provisioner whose containers may still exist leaves the
/// working directory on disk, so `make clean` can still be run by hand.
pub struct ClusterProvisioner {
    config: DcosDockerConfig,
    runner: Arc<dyn CommandRunner>,
    workdir: Option<WorkDir>,
    /// Set once `make` has been invoked, i.e. containers may exist.
    started: bool,
}

impl ClusterProvisioner {
    /// Create a provisioner. Nothing is touched until [`provision`](Self::provision).
    pub fn new(config: DcosDockerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            workdir: None,
            started: false,
        }
    }

    /// Working directory of the provisioning tool, once prepared.
    pub fn path(&self) -> Option<&Path> {
        self.workdir.as_ref().map(WorkDir::path)
    }

    /// SSH key for the cluster's nodes, once prepared.
    pub fn ssh_key_path(&self) -> Option<PathBuf> {
        self.path().map(|path| path.join(SSH_KEY_PATH))
    }

    /// True if teardown still has something to do.
    pub fn needs_teardown(&self) -> bool {
        self.workdir.is_some()
    }

    /// Arguments passed to `make` to create a cluster for `spec`.
    ///
    /// Node counts are always present. The overlay is only passed when it
    /// has settings: an explicit empty document confuses dcos-docker's
    /// config generation.
    pub fn make_arguments(spec: &ClusterSpec) -> Result<Vec<String>, ProvisionError> {
        let mut args = vec![
            format!("MASTERS={}", spec.masters),
            format!("AGENTS={}", spec.agents),
            format!("PUBLIC_AGENTS={}", spec.public_agents),
        ];

        if !spec.extra_config.is_empty() {
            args.push(format!("EXTRA_GENCONF_CONFIG={}", spec.extra_config.to_yaml()?));
        }

        match &spec.installer {
            Some(InstallerArtifact::Url(url)) => {
                args.push(format!("DCOS_GENERATE_CONFIG_URL={url}"));
            }
            Some(InstallerArtifact::Path(path)) => {
                args.push(format!("DCOS_GENERATE_CONFIG_PATH={}", path.display()));
            }
            None => {}
        }

        Ok(args)
    }

    /// Create the cluster's containers and install DC/OS on them.
    ///
    /// `label` names the per-cluster working directory.
    pub async fn provision(&mut self, spec: &ClusterSpec, label: &str) -> Result<(), ProvisionError> {
        let start = std::time::Instant::now();
        let args = Self::make_arguments(spec)?;
        let workdir = self.prepare(label).await?;

        tracing::info!(
            masters = spec.masters,
            agents = spec.agents,
            public_agents = spec.public_agents,
            extra_config = !spec.extra_config.is_empty(),
            path = %workdir.display(),
            "Creating cluster"
        );
        let invocation = Invocation::new("make").args(args).current_dir(&workdir);
        self.started = true;
        run_checked(self.runner.as_ref(), &invocation)
            .await
            .map_err(ProvisionError::Create)?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cluster containers created"
        );
        Ok(())
    }

    /// Wait until the cluster can run tests.
    ///
    /// For Enterprise this is a fixed sleep of
    /// [`enterprise_wait`](DcosDockerConfig::enterprise_wait): `make
    /// postflight` does not work for it, and the default is a guess with
    /// headroom rather than a measured bound.
    pub async fn await_ready(&self, spec: &ClusterSpec) -> Result<(), ReadinessError> {
        let workdir = self.path().ok_or(ReadinessError::NotProvisioned)?;
        let start = std::time::Instant::now();

        if spec.variant == DcosVariant::Enterprise {
            tracing::warn!(
                wait_secs = self.config.enterprise_wait.as_secs(),
                "Enterprise cluster: waiting a fixed time instead of running postflight"
            );
            tokio::time::sleep(self.config.enterprise_wait).await;
            return Ok(());
        }

        tracing::info!(
            timeout_secs = self.config.readiness_timeout.as_secs(),
            "Waiting for cluster to be ready"
        );
        let invocation = Invocation::new("make").arg("postflight").current_dir(workdir);
        match tokio::time::timeout(
            self.config.readiness_timeout,
            run_checked(self.runner.as_ref(), &invocation),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ReadinessError::Postflight(e)),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.readiness_timeout.as_secs(),
                    "Postflight timeout"
                );
                return Err(ReadinessError::Timeout(self.config.readiness_timeout));
            }
        }

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cluster ready"
        );
        Ok(())
    }

    /// Destroy the cluster's containers and remove the per-run directory.
    ///
    /// Safe after a partial or failed [`provision`](Self::provision), and a
    /// no-op once it has succeeded. If `make clean` fails the directory is
    /// kept and a later call runs `make clean` again.
    pub async fn teardown(&mut self) -> Result<(), TeardownError> {
        let Some(workdir) = self.workdir.take() else {
            tracing::debug!("Nothing to tear down");
            return Ok(());
        };
        let started = std::mem::take(&mut self.started);
        let path = workdir.path().to_path_buf();
        tracing::info!(path = %path.display(), "Destroying cluster");

        if started {
            let invocation = Invocation::new("make").arg("clean").current_dir(&path);
            if let Err(e) = run_checked(self.runner.as_ref(), &invocation).await {
                tracing::error!(error = %e, path = %path.display(), "make clean failed, keeping working directory");
                self.workdir = Some(workdir);
                self.started = true;
                return Err(TeardownError::Clean(e));
            }
        } else {
            tracing::debug!("make never ran, skipping clean");
        }

        if let WorkDir::Ephemeral(dir) = workdir {
            tracing::debug!(path = %path.display(), "Removing working directory");
            if let Err(source) = dir.close() {
                if source.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %source, "Failed to remove working directory");
                    return Err(TeardownError::RemoveWorkDir { path, source });
                }
            }
        }

        Ok(())
    }

    /// Move the live working directory into a new provisioner.
    ///
    /// Used to finish teardown on another task when the owner is dropped.
    pub(crate) fn detach(&mut self) -> Self {
        Self {
            config: self.config.clone(),
            runner: self.runner.clone(),
            workdir: self.workdir.take(),
            started: std::mem::take(&mut self.started),
        }
    }

    /// Set up the working directory, fetching dcos-docker if needed.
    async fn prepare(&mut self, label: &str) -> Result<PathBuf, ProvisionError> {
        if let Some(workdir) = &self.workdir {
            return Ok(workdir.path().to_path_buf());
        }

        match self.config.source.clone() {
            DcosDockerSource::Checkout(path) => {
                if !path.is_dir() {
                    return Err(ProvisionError::WorkDir {
                        path,
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "dcos-docker checkout not found",
                        ),
                    });
                }
                self.workdir = Some(WorkDir::Existing(path.clone()));
                Ok(path)
            }
            DcosDockerSource::Git { url, reference } => {
                let dir = self.create_ephemeral(label).await?;
                let path = dir.path().to_path_buf();
                // Owned from here so teardown removes it even if the clone fails.
                self.workdir = Some(WorkDir::Ephemeral(dir));
                self.clone_into(&url, reference.as_deref(), &path).await?;
                Ok(path)
            }
        }
    }

    async fn create_ephemeral(&self, label: &str) -> Result<TempDir, ProvisionError> {
        let root = &self.config.workspace_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| ProvisionError::WorkDir {
                path: root.clone(),
                source,
            })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("dcos-docker-{label}-"))
            .tempdir_in(root)
            .map_err(|source| ProvisionError::WorkDir {
                path: root.clone(),
                source,
            })?;
        tracing::debug!(path = %dir.path().display(), "Created working directory");
        Ok(dir)
    }

    async fn clone_into(
        &self,
        url: &str,
        reference: Option<&str>,
        target: &Path,
    ) -> Result<(), ProvisionError> {
        let start = std::time::Instant::now();
        tracing::info!(url = %url, reference = ?reference, "Cloning dcos-docker");

        let mut invocation = Invocation::new("git").args(["clone", "--depth", "1"]);
        if let Some(reference) = reference {
            invocation = invocation.args(["--branch", reference]);
        }
        let invocation = invocation.arg(url).arg(target.to_string_lossy());

        run_checked(self.runner.as_ref(), &invocation)
            .await
            .map_err(ProvisionError::Fetch)?;

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "dcos-docker cloned"
        );
        Ok(())
    }
}

impl Drop for ClusterProvisioner {
    fn drop(&mut self) {
        let Some(workdir) = self.workdir.take() else {
            return;
        };
        if !self.started {
            return;
        }
        let path = workdir.keep();
        tracing::warn!(
            path = %path.display(),
            "Cluster was not cleaned up; run `make clean` in the working directory"
        );
    }
}
