use beacon_window::{AllowList, EmissionPolicy, Summary, WindowConfig, WindowScheduler};
use clap::Parser;
use spdlog::prelude::*;
use std::thread;
use std::time::{Duration, Instant};

mod simulator;

use simulator::GatewaySimulator;

#[derive(Parser)]
struct Args {
    /// Rotation period in seconds.
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Allow-listed gateway id. Repeat for several; defaults to the site gateways.
    #[arg(long = "gateway")]
    gateways: Vec<String>,

    /// Number of threads feeding simulated beacon sightings.
    #[arg(long, default_value_t = 3)]
    producers: usize,

    #[arg(long, default_value_t = 20)]
    run_secs: u64,

    /// Report every allow-listed gateway, including idle ones.
    #[arg(long)]
    emit_all: bool,
}

fn report(summary: Summary) {
    for line in summary.to_string().lines() {
        info!("{}", line);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let allow_list = if args.gateways.is_empty() {
        AllowList::default_gateways()
    } else {
        AllowList::new(&args.gateways)
    };
    let emission = if args.emit_all {
        EmissionPolicy::AllowList
    } else {
        EmissionPolicy::TouchedOnly
    };

    let config = WindowConfig::new(allow_list.clone())
        .with_interval(Duration::from_secs(args.interval_secs))
        .with_emission(emission)
        .with_flush_on_stop(true)
        .with_latency_stats(true);

    let scheduler = WindowScheduler::new(config, report)?;
    scheduler.start()?;
    info!(
        "[System] Replaying {} producers for {}s",
        args.producers, args.run_secs
    );

    let deadline = Instant::now() + Duration::from_secs(args.run_secs);
    let mut gateways: Vec<String> = allow_list.iter().map(|g| g.to_string()).collect();
    gateways.push(GatewaySimulator::ROGUE_GATEWAY.to_string());

    let producers: Vec<_> = (0..args.producers)
        .map(|seed| {
            let ingestor = scheduler.ingestor();
            let mut simulator = GatewaySimulator::new(gateways.clone(), seed as u64 + 1);
            thread::spawn(move || simulator.run_until(&ingestor, deadline))
        })
        .collect();

    let mut sent = 0;
    for producer in producers {
        sent += producer.join().map_err(|_| "producer thread panicked")?;
    }
    scheduler.stop();

    let stats = scheduler.stats();
    info!(
        "[System] Sent {} events: accepted={}, discarded={}, missing={}, windows={}",
        sent, stats.accepted, stats.discarded, stats.missing, stats.rotations
    );
    Ok(())
}
