use std::time::Instant;

use clap::Parser;
use log::info;

use bighouse_datacenter::{build_experiment, run_replicas, ExperimentConfig};

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to experiment config
    #[clap(short, long)]
    config: String,

    /// Number of independent replicas (1 runs a single experiment)
    #[clap(short, long, default_value_t = 1)]
    replicas: usize,

    /// Number of threads to use for replicas (default - use all available cores)
    #[clap(short, long, default_value_t = std::thread::available_parallelism().map_or(1, |n| n.get()))]
    threads: usize,

    /// Print the final statistics as JSON
    #[clap(long)]
    json: bool,
}

fn main() {
    init_logger();

    let args = Args::parse();
    let simulation_start = Instant::now();
    let config = ExperimentConfig::from_file(&args.config);
    info!(
        "Simulating {} servers, capping {}",
        config.server_count(),
        if config.capping.is_some() { "on" } else { "off" }
    );

    let stats = if args.replicas > 1 {
        let results = run_replicas(&config, args.replicas, args.threads);
        for (i, run) in results.runs.iter().enumerate() {
            println!(
                "replica {}: {:?} after {} events at time {:.3}",
                i, run.termination, run.events_processed, run.end_time
            );
        }
        results.stats
    } else {
        let mut experiment = build_experiment(&config);
        let summary = experiment.run();
        println!(
            "{:?} after {} events at time {:.3}",
            summary.termination, summary.events_processed, summary.end_time
        );
        experiment.into_stats()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats).unwrap());
    } else {
        for line in stats.summary() {
            println!("{}", line);
        }
    }
    println!("Simulation process time {:.2?}", simulation_start.elapsed());
}
