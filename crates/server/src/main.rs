//! clusterd binary.
//!
//! Drives the membership API from the command line:
//!
//! ```bash
//! # Create a new cluster on this node
//! clusterd --config /etc/clusterd/clusterd.toml create prod
//!
//! # Add / inspect / remove members
//! clusterd add worker2 --link0 10.0.0.12
//! clusterd nodes
//! clusterd del worker2
//!
//! # Join an existing cluster through its shared store root
//! clusterd join /mnt/cluster-store --secret s3kr1t --fingerprint <hex>
//! ```

use std::{fs, path::PathBuf, sync::Arc};

use clap::{ArgAction, Parser, Subcommand};
use clusterd_server::{
    api::ClusterApi,
    comm::ToolComm,
    config::DaemonConfig,
    context::ClusterContext,
    gateway::StoreGateway,
    orchestrator::{BootstrapRequest, JoinRequest},
    registry::AddNodeRequest,
    tasks::{TaskHandle, TaskState},
    trust::FileTrustStore,
};
use clusterd_store::FileStore;
use clusterd_types::LinkSpec;
use tracing_subscriber::EnvFilter;

/// Cluster membership coordinator.
#[derive(Parser)]
#[command(name = "clusterd", version, about)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new cluster with this node as its first member.
    Create {
        /// Name of the new cluster.
        cluster_name: String,
        /// Node id for this node (default: 1).
        #[arg(long)]
        nodeid: Option<u32>,
        /// Vote weight for this node (default: 1).
        #[arg(long)]
        votes: Option<u32>,
        /// Ring-0 link, "address[,priority=N]".
        #[arg(long)]
        link0: Option<LinkSpec>,
        /// Ring-1 link, "address[,priority=N]".
        #[arg(long)]
        link1: Option<LinkSpec>,
    },
    /// List cluster members.
    Nodes,
    /// Add a member to the cluster.
    Add {
        /// Name of the node to add.
        name: String,
        /// Explicit node id (default: smallest unused).
        #[arg(long)]
        nodeid: Option<u32>,
        /// Vote weight (default: 1).
        #[arg(long)]
        votes: Option<u32>,
        /// Allow idempotent re-add of an existing member.
        #[arg(long)]
        force: bool,
        /// Ring-0 link, "address[,priority=N]".
        #[arg(long)]
        link0: Option<LinkSpec>,
        /// Ring-1 link, "address[,priority=N]".
        #[arg(long)]
        link1: Option<LinkSpec>,
    },
    /// Remove a member by name or link address.
    Del {
        /// Node name or any of its link addresses.
        node: String,
    },
    /// Show the information a joining candidate would receive.
    JoinInfo {
        /// Preferred member to join through (default: this node).
        #[arg(long)]
        node: Option<String>,
    },
    /// Join an existing cluster through its shared store root.
    Join {
        /// Store root of the cluster to join.
        cluster_store: PathBuf,
        /// Join credential.
        #[arg(long)]
        secret: String,
        /// Expected cluster identity fingerprint (hex).
        #[arg(long)]
        fingerprint: String,
        /// Explicit node id (default: allocated by the cluster).
        #[arg(long)]
        nodeid: Option<u32>,
        /// Vote weight (default: 1).
        #[arg(long)]
        votes: Option<u32>,
        /// Allow idempotent re-join when already a member.
        #[arg(long)]
        force: bool,
        /// Ring-0 link, "address[,priority=N]".
        #[arg(long)]
        link0: Option<LinkSpec>,
        /// Ring-1 link, "address[,priority=N]".
        #[arg(long)]
        link1: Option<LinkSpec>,
    },
    /// Show the totem transport settings.
    Totem,
    /// Show the quorum-witness status snapshot.
    Qdevice,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("clusterd={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = DaemonConfig::load(cli.config.as_deref())?;
    let api = ClusterApi::new(build_context(&config)?);

    match cli.command {
        Command::Create { cluster_name, nodeid, votes, link0, link1 } => {
            let handle = api.create_cluster(BootstrapRequest {
                cluster_name,
                nodeid,
                votes,
                link0,
                link1,
            });
            finish_task(handle).await
        },
        Command::Nodes => print_json(&api.nodes()?),
        Command::Add { name, nodeid, votes, force, link0, link1 } => {
            let outcome =
                api.add_node(&name, &AddNodeRequest { nodeid, votes, force, link0, link1 })?;
            for warning in &outcome.warnings {
                eprintln!("warning: {warning}");
            }
            print_json(&outcome)
        },
        Command::Del { node } => {
            api.remove_node(&node)?;
            Ok(())
        },
        Command::JoinInfo { node } => print_json(&api.join_info(node.as_deref())?),
        Command::Join {
            cluster_store,
            secret,
            fingerprint,
            nodeid,
            votes,
            force,
            link0,
            link1,
        } => {
            let gateway = store_gateway(&config, &cluster_store)?;
            let handle = api.join(gateway, JoinRequest {
                hostname: cluster_store.display().to_string(),
                credential: secret,
                fingerprint,
                nodeid,
                votes,
                force,
                link0,
                link1,
            });
            finish_task(handle).await
        },
        Command::Totem => print_json(&api.totem()?),
        Command::Qdevice => print_json(&api.qdevice_status().await?),
    }
}

fn build_context(config: &DaemonConfig) -> Result<ClusterContext, Box<dyn std::error::Error>> {
    let store = Arc::new(FileStore::open(&config.store_root)?);
    Ok(ClusterContext::new(
        store,
        Arc::new(ToolComm::default()),
        Arc::new(FileTrustStore::new(config.trust_dir())),
        config.node_name.clone(),
        config.lock_file.clone(),
        config.lock_timeout,
        config.qdevice_socket.clone(),
    ))
}

/// Builds the gateway into the target cluster's shared store root.
///
/// The cluster's join secret is provisioned by its administrator as a
/// `join-secret` file under the store root; network transports replace this
/// gateway in embedding products.
fn store_gateway(
    config: &DaemonConfig,
    cluster_store: &std::path::Path,
) -> Result<Arc<StoreGateway>, Box<dyn std::error::Error>> {
    let expected_secret = fs::read_to_string(cluster_store.join("join-secret"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let remote_store = Arc::new(FileStore::open(cluster_store)?);
    let remote_ctx = ClusterContext::new(
        remote_store,
        Arc::new(ToolComm::default()),
        Arc::new(FileTrustStore::new(cluster_store.join("trust"))),
        config.node_name.clone(),
        cluster_store.join("membership.lock"),
        config.lock_timeout,
        config.qdevice_socket.clone(),
    );
    Ok(Arc::new(StoreGateway::new(
        remote_ctx,
        cluster_store.display().to_string(),
        expected_secret,
    )))
}

async fn finish_task(mut handle: TaskHandle) -> Result<(), Box<dyn std::error::Error>> {
    let state = handle.wait().await;
    for line in handle.log().snapshot() {
        eprintln!("{line}");
    }
    match state {
        TaskState::Failed { message } => Err(message.into()),
        _ => {
            println!("{}", handle.id());
            Ok(())
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
