//! # dcos-e2e-cli
//!
//! Creates a DC/OS cluster, runs one command on its nodes and tears the
//! cluster down again, whatever happened.
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run -p dcos-e2e-cli -- --masters 1 -- test -f /etc/hosts
//! ```
//!
//! Configure the provisioning tool via environment variables:
//!
//! ```bash
//! export DCOS_E2E_DCOS_DOCKER_PATH=/path/to/dcos-docker
//! export DCOS_E2E_INSTALLER_URL=https://downloads.dcos.io/dcos/stable/dcos_generate_config.sh
//! cargo run -p dcos-e2e-cli -- --agents 1 --on agents -- docker ps
//! ```
//!
//! The exit status is 0 when the command succeeded on every selected node
//! (or failed on every node with `--expect-failure`).

mod config;
mod overlay;

pub use config::{ConfigError, E2eConfig};
pub use overlay::{load_overlay, OverlayError};
