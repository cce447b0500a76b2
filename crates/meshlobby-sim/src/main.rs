//! meshlobby simulator
//!
//! Runs a seeded multi-peer lobby over the in-memory mesh and logs the final
//! lobbies. The same seed always produces the same identities and trace.

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use meshlobby_core::CoordinatorConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod simulation;

use simulation::{SimConfig, Topology};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "meshlobby-sim")]
#[command(about = "Seeded lobby simulation over an in-memory mesh")]
struct Args {
    /// Number of peers
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=32))]
    peers: u8,

    /// RNG seed for identities
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Who joins whom
    #[arg(short, long, value_enum, default_value_t = Topology::Star)]
    topology: Topology,

    /// Service tag every peer advertises and browses for
    #[arg(long, default_value = "meshlobby")]
    service_tag: String,

    /// Join deadline in milliseconds
    #[arg(long, default_value_t = 15_000)]
    join_timeout_ms: u64,

    /// Index of a peer that leaves once the lobbies have formed
    #[arg(long)]
    leave: Option<u8>,
}

impl From<Args> for SimConfig {
    fn from(args: Args) -> Self {
        Self {
            peers: args.peers,
            seed: args.seed,
            topology: args.topology,
            lobby: CoordinatorConfig {
                service_tag: args.service_tag,
                join_timeout: Duration::from_millis(args.join_timeout_ms),
                ..CoordinatorConfig::default()
            },
            leave: args.leave,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SimConfig::from(Args::parse());
    match simulation::run(&config) {
        Ok(report) => {
            report.log();
            ExitCode::SUCCESS
        },
        Err(error) => {
            error!(%error, "simulation failed");
            ExitCode::FAILURE
        },
    }
}
