//! cloudock - OpenStack cluster orchestration for Docker workloads
//!
//! This is the main CLI entry point for cloudock.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cloudock::config::{ClusterConfig, ConfigParser, NodeTypeSpec};
use cloudock::docker::{ContainerOp, Deployer, HttpConnector};
use cloudock::node::lifecycle::{node_row, NODE_COLUMNS};
use cloudock::node::{AssumeYes, Confirm, NodeManager, SshShell, StdinConfirm};
use cloudock::openstack::OpenStack;
use cloudock::orchestrator::Orchestrator;
use cloudock::progress::{print_table, sink_for, ProgressTable, Report};
use cloudock::secgroup::SecurityGroupReconciler;
use cloudock::topology::Selector;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// cloudock - OpenStack cluster orchestration for Docker workloads
#[derive(Parser)]
#[command(name = "cloudock")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Provision an OpenStack cluster and deploy Docker workloads on it", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Cluster configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only process the workloads of this node type
    #[arg(long, global = true)]
    nodetype: Option<String>,

    /// Only process this node
    #[arg(long, global = true)]
    nodeid: Option<String>,

    /// Only process this container (or image, for rmi)
    #[arg(long, global = true)]
    containerid: Option<String>,

    /// Do not ask before destroying anything
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage cluster nodes
    #[command(subcommand)]
    Node(NodeCommands),

    /// Manage cluster security groups
    #[command(subcommand)]
    Secgroup(SecgroupCommands),

    /// Manage workload containers and images
    #[command(subcommand)]
    Docker(DockerCommands),

    /// Create security groups and nodes, then apply rules and hosts files
    Launch,

    /// Destroy nodes, then security groups
    Teardown,
}

#[derive(Subcommand)]
enum NodeCommands {
    /// Create every declared node and wait until it is running
    Create,
    /// Destroy every node of the cluster
    Destroy,
    /// List the nodes of the cluster
    List {
        /// Only list nodes in this status
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Add every cluster node to the hosts file of the others
    Dns,
}

#[derive(Subcommand)]
enum SecgroupCommands {
    /// Create every declared security group
    Create,
    /// Destroy every security group of the cluster
    Destroy,
    /// Apply the declared rules against the current nodes
    Update,
    /// List the security groups of the cluster
    List,
}

#[derive(Subcommand)]
enum DockerCommands {
    /// Pull the workload images on every node
    Pull,
    /// Create and start the workload containers
    Run,
    /// List containers
    Ps,
    /// Start containers
    Start,
    /// Stop containers
    Stop,
    /// Remove containers
    #[command(name = "rm")]
    Remove,
    /// Remove images
    Rmi,
    /// List images
    Images,
    /// Run the declared smoke tests
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr; stdout carries the live progress table
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pending operations");
            interrupt.cancel();
        }
    });

    let config = load_config(cli.config.as_deref())?;
    let selector = Selector {
        node_type: cli.nodetype,
        node_id: cli.nodeid,
        container_id: cli.containerid,
    };
    let confirm: Box<dyn Confirm> = if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm)
    };

    match cli.command {
        Commands::Node(command) => {
            node_command(command, &config, &selector, confirm.as_ref(), cancel).await
        }
        Commands::Secgroup(command) => secgroup_command(command, &config).await,
        Commands::Docker(command) => docker_command(command, &config, &selector).await,
        Commands::Launch => {
            let cloud = connect(&config).await?;
            let mut sink = sink_for("launch", node_count(&config.node_types));
            let report = Orchestrator::new(&config, &cloud.compute, &cloud.network, &SshShell)
                .with_cancellation(cancel)
                .launch(sink.as_mut())
                .await?;
            conclude(report)
        }
        Commands::Teardown => {
            let cloud = connect(&config).await?;
            let mut sink = sink_for("teardown", node_count(&config.node_types));
            let report = Orchestrator::new(&config, &cloud.compute, &cloud.network, &SshShell)
                .with_cancellation(cancel)
                .teardown(confirm.as_ref(), sink.as_mut())
                .await?;
            conclude(report)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ClusterConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().context("Failed to read the working directory")?;
            match ConfigParser::find_config_file(&cwd) {
                Some(path) => path,
                None => bail!("No cloudock.yaml found, pass one with --config"),
            }
        }
    };

    let (config, warnings) = ConfigParser::load(&path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    for warning in warnings {
        warn!("{}", warning);
    }
    info!("Using cluster {} from {}", config.cluster, path.display());
    Ok(config)
}

async fn connect(config: &ClusterConfig) -> Result<OpenStack> {
    OpenStack::connect(&config.provider)
        .await
        .context("Failed to connect to OpenStack")
}

fn node_count(node_types: &[NodeTypeSpec]) -> usize {
    node_types.iter().map(|t| t.replication as usize).sum()
}

/// Print a report and fail when it carries an error
fn conclude(report: Report) -> Result<()> {
    for warning in report.warnings() {
        warn!("{}", warning);
    }
    println!("{}", report);
    match report.error() {
        Some(e) => bail!("{} failed: {}", report.operation(), e),
        None => Ok(()),
    }
}

async fn node_command(
    command: NodeCommands,
    config: &ClusterConfig,
    selector: &Selector,
    confirm: &dyn Confirm,
    cancel: CancellationToken,
) -> Result<()> {
    let cloud = connect(config).await?;
    let manager = NodeManager::new(config, &cloud.compute).with_cancellation(cancel.clone());

    match command {
        NodeCommands::Create => {
            let node_types: Vec<NodeTypeSpec> = config
                .node_types
                .iter()
                .filter(|t| selector.node_type.as_ref().map_or(true, |n| &t.name == n))
                .cloned()
                .collect();
            let mut sink = sink_for("node create", node_count(&node_types));
            conclude(manager.create(&node_types, sink.as_mut()).await?)
        }
        NodeCommands::Destroy => {
            // Sized from the catalog so nothing is listed before confirmation
            let mut sink = sink_for("node destroy", node_count(&config.node_types));
            conclude(manager.destroy(confirm, sink.as_mut()).await?)
        }
        NodeCommands::List { status } => {
            let mut table = ProgressTable::new(NODE_COLUMNS).with_status_column(3);
            for node in manager.list(status.as_deref()).await? {
                table.upsert(node.id.clone(), node_row(&node));
            }
            print_table(&table);
            Ok(())
        }
        NodeCommands::Dns => {
            let orchestrator = Orchestrator::new(config, &cloud.compute, &cloud.network, &SshShell)
                .with_cancellation(cancel);
            conclude(orchestrator.dns().await?)
        }
    }
}

async fn secgroup_command(command: SecgroupCommands, config: &ClusterConfig) -> Result<()> {
    let cloud = connect(config).await?;
    let reconciler = SecurityGroupReconciler::new(config, &cloud.network, &cloud.compute);

    match command {
        SecgroupCommands::Create => conclude(reconciler.create().await?),
        SecgroupCommands::Destroy => conclude(reconciler.destroy().await?),
        SecgroupCommands::Update => conclude(reconciler.update().await?),
        SecgroupCommands::List => {
            let mut table = ProgressTable::new(&["Id", "Name", "Description"]);
            for group in reconciler.list().await? {
                table.upsert(
                    group.id.clone(),
                    vec![group.id, group.name, group.description],
                );
            }
            print_table(&table);
            Ok(())
        }
    }
}

async fn docker_command(
    command: DockerCommands,
    config: &ClusterConfig,
    selector: &Selector,
) -> Result<()> {
    let cloud = connect(config).await?;
    let connector = HttpConnector::new(&config.docker)?;
    let deployer = Deployer::new(config, &cloud.compute, &connector);

    match command {
        DockerCommands::Pull => {
            let rows = deployer.active_nodes().await?.len();
            let mut sink = sink_for("docker pull", rows);
            conclude(deployer.pull(sink.as_mut()).await?)
        }
        DockerCommands::Run => conclude(deployer.run(selector).await?),
        DockerCommands::Ps => {
            let mut table =
                ProgressTable::new(&["Node", "Container Id", "Image", "State", "Status"]);
            for entry in deployer.ps(selector).await? {
                let container = entry.container;
                table.upsert(
                    format!("{}/{}", entry.node.id, container.id),
                    vec![
                        entry.node.name,
                        container.id.chars().take(12).collect(),
                        container.image,
                        container.state,
                        container.status,
                    ],
                );
            }
            print_table(&table);
            Ok(())
        }
        DockerCommands::Start => conclude(deployer.operate(ContainerOp::Start, selector).await?),
        DockerCommands::Stop => conclude(deployer.operate(ContainerOp::Stop, selector).await?),
        DockerCommands::Remove => {
            conclude(deployer.operate(ContainerOp::Remove, selector).await?)
        }
        DockerCommands::Rmi => conclude(deployer.rmi(selector).await?),
        DockerCommands::Images => {
            let mut table = ProgressTable::new(&["Node", "Image", "Image Id", "Created"]);
            for entry in deployer.images().await? {
                let created = chrono::DateTime::from_timestamp(entry.image.created, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                table.upsert(
                    format!("{}/{}", entry.node.id, entry.image.id),
                    vec![
                        entry.node.name.clone(),
                        entry.image.first_tag().to_string(),
                        entry.image.id.clone(),
                        created,
                    ],
                );
            }
            print_table(&table);
            Ok(())
        }
        DockerCommands::Test => conclude(deployer.test(&reqwest::Client::new()).await?),
    }
}
