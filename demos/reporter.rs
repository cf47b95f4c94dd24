// Example of wiring instruments into a reporting pipeline with metron

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use metron::config::{ConfigBuilder, LogLevel, parse_duration};
use metron::factory::InstrumentFactory;
use metron::instrument::{Instrument, InstrumentIdentity, MeasurementUnit};
use metron::reporting::{LogSender, ReporterSettings, select_topology, spawn_ticker};
use metron::util::logging;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments for the reporter example
#[derive(Parser, Debug)]
#[command(name = "reporter", about = "Metron reporting pipeline example")]
struct Args {
    /// Path to the configuration file (required)
    #[arg(short, long)]
    config: PathBuf,

    /// Interval at which instruments are collected
    #[arg(short, long, default_value = "1s", value_parser = |s: &str| parse_duration(s))]
    tick_interval: Duration,

    /// How long to run before shutting down
    #[arg(short, long, default_value = "30s", value_parser = |s: &str| parse_duration(s))]
    run_for: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigBuilder::new()
        .add_file(&args.config)
        .add_env("METRON")
        .build()
        .context("loading configuration")?;

    logging::init(&LogLevel::from_config(&config)?);

    let factory = InstrumentFactory::from_config(&config)?;
    let reporter = ReporterSettings::from_config(&config)?;
    info!(
        "Reporting to {} (max packet {} bytes)",
        reporter.address(),
        reporter.max_packet_size
    );

    let requests = Arc::new(factory.build_counter(
        InstrumentIdentity::new("demo.requests").with_tag("service", "reporter"),
        MeasurementUnit::None,
    ));
    let latency = Arc::new(factory.build_histogram(
        InstrumentIdentity::new("demo.latency").with_tag("service", "reporter"),
        MeasurementUnit::Milliseconds,
        None,
    ));
    let in_flight = Arc::new(factory.build_range_sampler(
        InstrumentIdentity::new("demo.in-flight"),
        MeasurementUnit::None,
        None,
        None,
    ));
    let workers = Arc::new(factory.build_gauge(
        InstrumentIdentity::new("demo.workers"),
        MeasurementUnit::None,
    ));
    let sampling = in_flight.spawn_sampling();

    let sender = Arc::new(LogSender::new(reporter.address()));
    let topology = Arc::new(select_topology(
        args.tick_interval,
        reporter.flush_interval,
        sender,
    )?);
    let flusher = topology.start().await;

    let instruments = vec![
        requests.clone() as Arc<dyn Instrument>,
        latency.clone() as Arc<dyn Instrument>,
        in_flight.clone() as Arc<dyn Instrument>,
        workers.clone() as Arc<dyn Instrument>,
    ];
    let ticker = spawn_ticker(instruments, args.tick_interval, Arc::clone(&topology));

    // Simulated workload
    let deadline = tokio::time::Instant::now() + args.run_for;
    let mut step: u64 = 0;
    while tokio::time::Instant::now() < deadline {
        step += 1;
        in_flight.increment();
        workers.set((step % 8) as i64);
        requests.increment();
        latency.record(5 + step % 250)?;
        tokio::time::sleep(Duration::from_millis(25)).await;
        in_flight.decrement();
        debug!("Completed simulated request {}", step);
    }

    ticker.abort();
    sampling.abort();
    topology.shutdown().await?;
    if let Some(flusher) = flusher {
        flusher.abort();
    }

    info!("Reporter stopped after {} simulated requests", step);
    Ok(())
}
