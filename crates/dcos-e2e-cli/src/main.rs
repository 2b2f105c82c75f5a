//! dcos-e2e entry point.
//!
//! Creates a cluster, runs one command as root on the selected nodes and
//! tears the cluster down on every exit path.
//!
//! # Usage
//!
//! ```text
//! dcos-e2e --masters 1 --agents 1 --on all -- test -f /etc/hosts
//! dcos-e2e --extra-config overlay.yaml --expect-failure -- test -f /missing
//! ```

use clap::{Parser, ValueEnum};
use dcos_e2e_cli::{load_overlay, E2eConfig};
use dcos_e2e_core::{Cluster, ClusterError, ClusterSpec, Node, Role};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dcos-e2e", about = "Run a command on a throwaway DC/OS cluster")]
struct Cli {
    /// Number of master nodes.
    #[arg(long, default_value_t = 1)]
    masters: u32,

    /// Number of private agents.
    #[arg(long, default_value_t = 0)]
    agents: u32,

    /// Number of public agents.
    #[arg(long, default_value_t = 0)]
    public_agents: u32,

    /// YAML or JSON file merged into the installer config.
    #[arg(long)]
    extra_config: Option<PathBuf>,

    /// Nodes to run the command on.
    #[arg(long, value_enum, default_value_t = Target::Masters)]
    on: Target,

    /// Succeed only if the command fails on every selected node.
    #[arg(long)]
    expect_failure: bool,

    /// Command to run as root.
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Masters,
    Agents,
    PublicAgents,
    All,
}

impl Target {
    fn roles(self) -> &'static [Role] {
        match self {
            Self::Masters => &[Role::Master],
            Self::Agents => &[Role::Agent],
            Self::PublicAgents => &[Role::PublicAgent],
            Self::All => &Role::ALL,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr; stdout carries the command's output.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("dcos_e2e=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = E2eConfig::from_env();
    tracing::info!(?config, "Configuration loaded");
    config.validate_warn();

    let mut builder = ClusterSpec::builder()
        .masters(cli.masters)
        .agents(cli.agents)
        .public_agents(cli.public_agents);
    if let Some(path) = &cli.extra_config {
        builder = builder.extra_config(load_overlay(path)?);
    }
    let spec = config.apply(builder).build()?;

    let roles = cli.on.roles();
    let command = cli.command;
    let expect_failure = cli.expect_failure;

    let failures = Cluster::scoped(spec, config.docker_config(), |cluster| {
        Box::pin(async move {
            let mut failures = 0usize;
            let mut total = 0usize;
            for &role in roles {
                for node in cluster.nodes(role).await? {
                    total += 1;
                    if !run_on(&node, &command).await? {
                        failures += 1;
                    }
                }
            }
            Ok((failures, total))
        })
    })
    .await;

    let (failures, total) = failures?;
    tracing::info!(failures, total, "Command finished on all nodes");

    let ok = if expect_failure {
        total > 0 && failures == total
    } else {
        failures == 0
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Run the command on one node, echoing its output. Returns whether it succeeded.
async fn run_on(node: &Node, command: &[String]) -> Result<bool, ClusterError> {
    match node.run_as_root(command).await {
        Ok(output) => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            Ok(true)
        }
        Err(ClusterError::Command(failure)) => {
            tracing::warn!(
                node = %failure.node,
                exit_code = failure.exit_code,
                "Command failed"
            );
            print!("{}", failure.stdout);
            eprint!("{}", failure.stderr);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
