//! End-to-end tests against real DC/OS clusters.
//!
//! These tests require:
//! - A Docker daemon reachable with the local defaults
//! - `git`, `make` and `ssh` on `PATH`
//! - Network access to fetch dcos-docker and the installer
//!
//! Run with: `cargo test -p dcos-e2e-core -- --ignored`
//!
//! Set `DCOS_E2E_DCOS_DOCKER_PATH` to reuse a local dcos-docker checkout and
//! `DCOS_E2E_INSTALLER_URL` to pick the installer.

use dcos_e2e_core::{Cluster, ClusterSpec, DcosDockerConfig, DcosDockerSource, ExtraConfig};
use serde_json::json;
use std::path::PathBuf;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dcos_e2e_core=debug")
        .with_test_writer()
        .try_init();
}

fn config() -> DcosDockerConfig {
    let mut config = DcosDockerConfig::default();
    if let Ok(path) = std::env::var("DCOS_E2E_DCOS_DOCKER_PATH") {
        config.source = DcosDockerSource::Checkout(PathBuf::from(path));
    }
    config
}

fn spec(extra_config: ExtraConfig) -> ClusterSpec {
    let mut builder = ClusterSpec::builder()
        .masters(1)
        .agents(0)
        .public_agents(0)
        .extra_config(extra_config);
    if let Ok(url) = std::env::var("DCOS_E2E_INSTALLER_URL") {
        builder = builder.installer_url(url);
    }
    builder.build().expect("valid spec")
}

/// A single-master cluster comes up and every node runs commands as root.
#[tokio::test]
#[ignore = "requires Docker + git + make + ssh"]
async fn test_run_command_on_masters() {
    init_logging();

    Cluster::scoped(spec(ExtraConfig::new()), config(), |cluster| {
        Box::pin(async move {
            let masters = cluster.masters().await?;
            assert_eq!(masters.len(), 1);
            assert!(cluster.agents().await?.is_empty());
            assert!(cluster.public_agents().await?.is_empty());

            for master in &masters {
                master.run_as_root(&["test", "-f", "/etc/hosts"]).await?;
            }
            Ok(())
        })
    })
    .await
    .expect("cluster lifecycle");
}

/// Registry credentials from the overlay end up on the masters.
#[tokio::test]
#[ignore = "requires Docker + git + make + ssh"]
async fn test_docker_credentials_overlay() {
    init_logging();

    let overlay = ExtraConfig::try_from(json!({
        "cluster_docker_credentials": {
            "auths": {
                "https://index.docker.io/v1/": {
                    "auth": "dXNlcm5hbWU6cGFzc3dvcmQ=",
                },
            },
        },
        "cluster_docker_credentials_enabled": true,
    }))
    .expect("object overlay");

    Cluster::scoped(spec(overlay), config(), |cluster| {
        Box::pin(async move {
            for master in cluster.masters().await? {
                master
                    .run_as_root(&["test", "-f", "/opt/mesosphere/etc/docker_credentials"])
                    .await?;

                let err = master
                    .run_as_root(&["test", "-f", "/opt/mesosphere/etc/not_a_file"])
                    .await
                    .expect_err("missing file");
                assert!(err.is_command_failure());
                assert_eq!(err.as_command_failure().map(|f| f.exit_code), Some(1));
            }
            Ok(())
        })
    })
    .await
    .expect("cluster lifecycle");
}

/// A torn down cluster rejects node queries and its ephemeral checkout is gone.
#[tokio::test]
#[ignore = "requires Docker + git + make + ssh"]
async fn test_explicit_destroy() {
    init_logging();

    let mut cluster = Cluster::create(spec(ExtraConfig::new()), config())
        .await
        .expect("Failed to create cluster");
    let workdir = cluster.path().map(PathBuf::from);

    cluster.teardown().await.expect("Failed to destroy cluster");
    assert!(cluster.masters().await.is_err());

    if std::env::var("DCOS_E2E_DCOS_DOCKER_PATH").is_err() {
        let workdir = workdir.expect("ephemeral checkout");
        assert!(!workdir.exists());
    }
}
