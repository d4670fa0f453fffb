use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kvbench::config::{BenchConfig, ClusterConfig, StoreConfig, WorkloadConfig};
use kvbench::coordinator;
use kvbench::session::{BenchSession, RunReport};
use kvbench::store::StoreAdapter;
use kvbench::types::format_secs;

#[derive(Parser, Debug)]
#[command(name = "kvbench", about = "Distributed key-value write benchmark")]
struct Args {
    /// Number of concurrent load workers.
    #[arg(long, default_value_t = 10)]
    clients: usize,

    /// Writes issued by each worker.
    #[arg(long, default_value_t = 1000)]
    ops: usize,

    /// Payload size in bytes.
    #[arg(long, default_value_t = 32)]
    data_size: usize,

    /// Optional expiry in seconds applied to every key.
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Store backend to write against.
    #[arg(long, value_enum, default_value_t = StoreArg::Redis)]
    store: StoreArg,

    /// Store endpoint(s); only the first is used unless --cluster is set.
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1:6379")]
    redis_addr: Vec<String>,

    /// Connect to the store as a cluster.
    #[arg(long, default_value_t = false)]
    cluster: bool,

    /// Ordered node addresses for a multi-node run; the first is the master.
    #[arg(long, value_delimiter = ',')]
    nodes: Vec<String>,

    /// This node's own entry in --nodes.
    #[arg(long)]
    node_addr: Option<String>,

    /// Bind address for the master's settlement listener.
    #[arg(long)]
    listen_addr: Option<String>,

    /// Give up waiting for worker settlements after this many seconds.
    #[arg(long)]
    settle_timeout_secs: Option<u64>,

    /// Timeout for a worker's connection to the master.
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Load the full configuration from a JSON file instead of flags.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the final report to this JSON file.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum StoreArg {
    Redis,
    Memory,
}

impl Args {
    fn into_config(self) -> Result<BenchConfig> {
        if let Some(path) = &self.config {
            return BenchConfig::from_json_file(path)
                .with_context(|| format!("load config from {}", path.display()));
        }

        let workload = WorkloadConfig {
            workers: self.clients,
            ops_per_worker: self.ops,
            payload_size: self.data_size,
            ttl: self.ttl_secs.map(Duration::from_secs),
        };
        let store = match self.store {
            StoreArg::Redis => StoreConfig::redis(self.redis_addr, self.cluster),
            StoreArg::Memory => StoreConfig::memory(),
        };
        let cluster = ClusterConfig {
            nodes: self.nodes,
            node_addr: self.node_addr,
            listen_addr: self.listen_addr,
            settle_timeout: self.settle_timeout_secs.map(Duration::from_secs),
            connect_timeout: Some(Duration::from_millis(self.connect_timeout_ms)),
        };
        Ok(BenchConfig::new(workload, store).with_cluster(cluster))
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    setup_tracing();

    if let Err(err) = run(Args::parse()).await {
        error!("benchmark failed: {err:#}");
        std::process::exit(1);
    }
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> Result<()> {
    let report_path = args.report.clone();
    let config = args.into_config()?;
    config.validate().context("invalid configuration")?;
    info!(?config, "configuration loaded");

    let mut session = BenchSession::new(config.workload.clone());
    if let Some(topology) = config.topology()? {
        info!(
            order = topology.local.order,
            role = ?topology.local.role,
            total_nodes = topology.total_nodes,
            "multi-node run"
        );
        let coordinator = coordinator::connect(
            &topology,
            session.barrier(),
            config.cluster.listen_addr.as_deref(),
            config.cluster.settle_timeout,
            config.cluster.connect_timeout,
        )
        .await
        .context("start node coordinator")?;
        session = session.with_coordinator(coordinator);
    }

    let store = StoreAdapter::connect(&config.store)
        .await
        .context("connect to store")?
        .into_shared();

    let report = session.run(store).await?;
    print_report(&report);

    if let Some(path) = report_path {
        report
            .write_json(&path)
            .with_context(|| format!("write report to {}", path.display()))?;
        println!("    wrote {}", path.display());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let local = &report.local;
    println!("# BENCHMARK DONE (run {})", report.run_id);
    println!(
        "* SUM: {}, DUR: {}, TPS: {}",
        local.total_ops,
        format_secs(local.total_dur),
        local.throughput()
    );

    match (&report.node, &report.summary) {
        (Some(node), None) if !node.is_master() => println!("see summary info on node 1"),
        (Some(_), Some(summary)) => {
            println!("# SUMMARY ({} nodes)", summary.nodes);
            println!(
                "* SUM: {}, DUR: {}, TPS: {}",
                summary.total_ops,
                format_secs(summary.total_dur),
                summary.throughput
            );
        }
        _ => {}
    }
}
