//! Endpoint failure detector - command-line driver

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use failure_detector::{
    EndpointSample, FailureDetector, Snapshot,
    cli::{Cli, Command, OutputFormat},
    config::Config,
    setup_tracing,
};

/// Parameters of a simulation run
struct Simulation {
    samples: usize,
    endpoints: u8,
    services: usize,
    error_rate: f64,
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Simulate {
            samples,
            endpoints,
            services,
            error_rate,
            format,
        } => {
            run_simulation(
                config,
                Simulation {
                    samples,
                    endpoints,
                    services,
                    error_rate,
                    format,
                },
            )
            .await
        }
        Command::Config => print_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Drive the detector with random samples and print the final snapshot
async fn run_simulation(config: Config, sim: Simulation) -> anyhow::Result<()> {
    let detector = FailureDetector::new(&config).context("failed to build detector")?;
    let collector = detector.collector();
    let reader = detector.reader();

    let token = CancellationToken::new();
    let worker = tokio::spawn(detector.run(token.clone()));

    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping simulation");
            shutdown.cancel();
        }
    });

    let started = Instant::now();
    let mut submitted = 0usize;
    for _ in 0..sim.samples {
        let sample = random_sample(&sim)?;
        if collector.submit(sample).await.is_err() {
            break;
        }
        submitted += 1;
    }
    // Dropping the last collector lets the detector drain and stop
    drop(collector);

    worker.await.context("detector task failed")??;
    info!(
        submitted,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Simulation finished"
    );

    print_snapshot(&reader.load(), sim.format)
}

/// One random probe outcome against one of `endpoints` addresses
fn random_sample(sim: &Simulation) -> anyhow::Result<EndpointSample> {
    let mut rng = rand::rng();
    let service = rng.random_range(0..sim.services.max(1));
    let host = rng.random_range(0..sim.endpoints.max(1));
    let url = Url::parse(&format!("https://1.1.1.{host}:6443"))?;

    let service_key = format!("default/service-{service}");
    if rng.random_bool(sim.error_rate.clamp(0.0, 1.0)) {
        Ok(EndpointSample::failure(service_key, url, "nasty error"))
    } else {
        Ok(EndpointSample::success(service_key, url))
    }
}

fn print_snapshot(snapshot: &Snapshot, format: OutputFormat) -> anyhow::Result<()> {
    let verdicts = snapshot.verdicts();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&verdicts)?);
        }
        OutputFormat::Text => {
            if verdicts.is_empty() {
                println!("No endpoint verdicts published.");
                return Ok(());
            }
            for (service, endpoints) in &verdicts {
                println!("📦 {service}");
                for (endpoint, verdict) in endpoints {
                    println!(
                        "   {endpoint:<24} weight {:.1}  status {}",
                        verdict.weight, verdict.status
                    );
                }
                println!();
            }
        }
    }
    Ok(())
}

fn print_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
