// experiments/src/main.rs

// Scaling, burst-fault and storage experiments against a running ring DHT cluster.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use ring_harness::discovery::{ClusterLauncher, CommandLauncher, ManifestLauncher, StaticLauncher};
use ring_harness::experiment::{
    merge_records, merge_storage, select_counts, Experiment, ExperimentRunner, OperationKind, ResultSink,
    StatsAggregator,
};
use ring_harness::network::HttpController;
use ring_harness::{Cluster, HarnessConfig};

#[derive(Parser, Debug)]
#[command(name = "experiments")]
#[command(about = "Chaos and benchmark runs for ring DHT clusters", long_about = None)]
struct Cli {
    /// JSON configuration file; missing fields use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    discovery: DiscoveryArgs,

    /// Seed for random node selection
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Repeats per scaling experiment
    #[arg(long, global = true)]
    repeats: Option<usize>,

    /// Leave the nodes running when done
    #[arg(long, global = true)]
    keep_running: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DiscoveryArgs {
    /// Comma-separated host:port list
    #[arg(long, global = true, conflicts_with_all = ["manifest", "launcher"])]
    nodes: Option<String>,

    /// JSON manifest of node endpoints
    #[arg(long, global = true, conflicts_with = "launcher")]
    manifest: Option<PathBuf>,

    /// Program that starts N nodes and prints their endpoints as JSON
    #[arg(long, global = true)]
    launcher: Option<String>,

    /// Extra argument passed to the launcher before the node count (repeatable)
    #[arg(long = "launcher-arg", global = true)]
    launcher_args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grow and shrink the ring through the configured node counts and record join/leave times
    Scaling {
        /// Also time a put and a read-back from every member at each node count
        #[arg(long)]
        storage: bool,
    },

    /// Crash and recover growing bursts of random nodes until the ring breaks
    Burst {
        /// Cluster size (defaults to the largest configured node count)
        #[arg(long)]
        size: Option<usize>,

        /// Largest burst to try
        #[arg(long)]
        max_burst: Option<usize>,

        /// Where to write the burst report as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Store a key through the introducer and read it back from every member, once per repeat
    Probe {
        #[arg(long)]
        size: Option<usize>,

        #[arg(long, default_value = "probe-key")]
        key: String,

        #[arg(long, default_value = "probe-value")]
        value: String,
    },
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(repeats) = cli.repeats {
        config.repeats = repeats;
    }
    config.validate()?;
    Ok(config)
}

fn launcher(args: &DiscoveryArgs) -> Result<Box<dyn ClusterLauncher>> {
    if let Some(list) = &args.nodes {
        return Ok(Box::new(StaticLauncher::from_list(list)?));
    }
    if let Some(path) = &args.manifest {
        return Ok(Box::new(ManifestLauncher::new(path)));
    }
    if let Some(program) = &args.launcher {
        return Ok(Box::new(CommandLauncher::new(program, args.launcher_args.clone())));
    }
    bail!("no node source given: pass --nodes, --manifest or --launcher")
}

async fn build_runner(cli: &Cli, config: &HarnessConfig, size: usize) -> Result<ExperimentRunner> {
    let addrs = launcher(&cli.discovery)?.launch(size).await?;
    let cluster = Cluster::new(addrs)?;
    println!("Discovered {} node(s), introducer {}", cluster.len(), cluster.introducer().addr());
    let control = Arc::new(HttpController::new(config.request_timeout)?);
    Ok(ExperimentRunner::new(cluster, control, config))
}

async fn run_scaling(runner: &mut ExperimentRunner, config: &HarnessConfig) -> Result<()> {
    let experiments = vec![
        Experiment::Growth { targets: config.node_counts.clone() },
        Experiment::Shrink { targets: config.node_counts.clone() },
    ];
    let aggregator = StatsAggregator::from_config(config);
    let runs = aggregator.run_repeated(runner, &experiments, config.repeats).await?;

    let growth = runs.trials_for(0);
    let join = aggregator.aggregate(growth, OperationKind::Join)?;
    let leave = aggregator.aggregate(runs.trials_for(1), OperationKind::Leave)?;
    let put = aggregator.aggregate(growth, OperationKind::Put)?;
    let get = aggregator.aggregate(growth, OperationKind::Get)?;
    let records = select_counts(merge_storage(merge_records(&join, &leave), &put, &get), &config.node_counts);

    println!(
        "{:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "nodes", "join_avg", "join_std", "leave_avg", "leave_std", "put_avg", "put_std"
    );
    for r in &records {
        println!(
            "{:>6} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
            r.nodes, r.join_avg, r.join_std, r.leave_avg, r.leave_std, r.put_avg, r.put_std
        );
    }
    ResultSink::new(&config.results_path).persist(&records)?;
    println!("Results written to {}", config.results_path.display());
    Ok(())
}

async fn run_burst(
    runner: &mut ExperimentRunner,
    config: &HarnessConfig,
    max_burst: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    if !runner.form_ring().await.is_stable() {
        warn!("Ring did not stabilize after initialization; continuing");
    }
    let report = runner.run_burst_faults(max_burst.unwrap_or(config.max_burst)).await;
    for line in report.summary_lines() {
        println!("{}", line);
    }
    match report.tolerated() {
        Some(b) => println!("Largest tolerated burst: {}", b),
        None => println!("No burst was tolerated"),
    }
    if let Some(path) = output.or_else(|| config.burst_results_path.clone()) {
        ResultSink::persist_bursts(&path, std::slice::from_ref(&report))?;
    }
    Ok(())
}

async fn run_probe(runner: &mut ExperimentRunner, config: &HarnessConfig, key: &str, value: &str) -> Result<()> {
    if !runner.form_ring().await.is_stable() {
        warn!("Ring did not stabilize after initialization; continuing");
    }
    let mut trials = Vec::with_capacity(config.repeats);
    let mut mismatched = 0;
    for repeat in 0..config.repeats {
        let probe = runner.probe_storage(key, value, repeat).await;
        if !probe.stored {
            bail!("could not store `{}` through the introducer", key);
        }
        for addr in &probe.mismatches {
            println!("Mismatch on {} (round {})", addr, repeat + 1);
        }
        mismatched += probe.mismatches.len();
        trials.push(probe.trial);
    }

    let aggregator = StatsAggregator::from_config(config);
    for kind in [OperationKind::Put, OperationKind::Get] {
        for p in aggregator.aggregate(&trials, kind)? {
            println!(
                "{:?} at {} node(s): avg {:.3}s, std {:.3}s over {} sample(s)",
                kind, p.nodes, p.mean, p.std_dev, p.samples
            );
        }
    }
    if mismatched > 0 {
        bail!("{} read(s) did not return the stored value", mismatched);
    }
    println!("All {} member(s) returned `{}` for `{}`", runner.cluster().member_count(), value, key);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    if let Command::Scaling { storage: true } = cli.command {
        config.storage_checkpoints = true;
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();
    info!("Configuration: {:?}", config);

    let size = match &cli.command {
        Command::Scaling { .. } => config.max_nodes(),
        Command::Burst { size, .. } | Command::Probe { size, .. } => size.unwrap_or_else(|| config.max_nodes()),
    };
    let mut runner = build_runner(&cli, &config, size).await?;

    let result = match &cli.command {
        Command::Scaling { .. } => run_scaling(&mut runner, &config).await,
        Command::Burst { max_burst, output, .. } => run_burst(&mut runner, &config, *max_burst, output.clone()).await,
        Command::Probe { key, value, .. } => run_probe(&mut runner, &config, key, value).await,
    };

    if cli.keep_running {
        println!("Leaving {} node(s) running", runner.cluster().len());
    } else {
        runner.shutdown_all().await;
        println!("Shut down {} node(s)", runner.cluster().len());
    }
    result
}
