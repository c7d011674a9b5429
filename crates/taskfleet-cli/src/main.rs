//! # Taskfleet CLI Entry Point
//!
//! Main binary for the Taskfleet supervisor. Starts the control plane and
//! runs until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Start a supervisor on the default port
//! taskfleet supervisor
//!
//! # Custom bind address and routing strategy
//! taskfleet supervisor -b 0.0.0.0:8080 --routing-strategy capability-match
//!
//! # Tighter liveness: 10s heartbeats, offline after 2 misses
//! taskfleet supervisor --heartbeat-interval-ms 10000 --missed-heartbeats-threshold 2
//! ```
//!
//! ## Exit codes
//!
//! - `0` — graceful shutdown after SIGINT
//! - `1` — failure to bind the control-plane port (or other startup error)

use anyhow::Result;
use argh::FromArgs;
use std::net::SocketAddr;
use std::sync::Arc;
use taskfleet_supervisor::{RoutingStrategy, Supervisor, SupervisorConfig, SupervisorServer};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Taskfleet - supervisory control plane for a worker fleet
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Supervisor(SupervisorArgs),
}

/// Arguments for starting a supervisor.
///
/// The supervisor accepts task submissions and worker registrations over
/// HTTP, routes tasks to workers, and supervises their lifecycle. Workers
/// are expected to register themselves and heartbeat at the configured
/// interval.
#[derive(FromArgs)]
#[argh(subcommand, name = "supervisor")]
/// start a Taskfleet supervisor
struct SupervisorArgs {
    /// address to bind the control plane to
    ///
    /// Defaults to "0.0.0.0:7070" for accessibility from other machines.
    #[argh(option, short = 'b', default = "\"0.0.0.0:7070\".into()")]
    bind: String,

    /// worker selection strategy
    ///
    /// One of: round-robin, least-loaded, capability-match, random.
    /// Defaults to least-loaded.
    #[argh(option, long = "routing-strategy", default = "RoutingStrategy::LeastLoaded")]
    routing_strategy: RoutingStrategy,

    /// expected worker heartbeat interval in milliseconds
    ///
    /// The liveness sweep runs at this cadence. Defaults to 30000.
    #[argh(option, long = "heartbeat-interval-ms", default = "30000")]
    heartbeat_interval_ms: u64,

    /// missed heartbeats before a worker is marked offline
    ///
    /// A worker silent for more than interval * threshold is flipped to
    /// offline (its record is kept for observability). Defaults to 3.
    #[argh(option, long = "missed-heartbeats-threshold", default = "3")]
    missed_heartbeats_threshold: u32,

    /// default timeout for submissions that omit timeoutMs
    ///
    /// Defaults to 60000 milliseconds.
    #[argh(option, long = "default-task-timeout-ms", default = "60000")]
    default_task_timeout_ms: u64,

    /// default retry budget for submissions that omit maxRetries
    ///
    /// Defaults to 2.
    #[argh(option, long = "default-max-retries", default = "2")]
    default_max_retries: u32,

    /// maximum number of queued tasks
    ///
    /// Submissions beyond this bound are rejected with 400. Defaults to
    /// 1000.
    #[argh(option, long = "max-queue-size", default = "1000")]
    max_queue_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level INFO, overridable via RUST_LOG.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Supervisor(args) => run_supervisor(args).await,
    }
}

async fn run_supervisor(args: SupervisorArgs) -> Result<()> {
    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;

    let config = SupervisorConfig {
        routing_strategy: args.routing_strategy,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        missed_heartbeats_threshold: args.missed_heartbeats_threshold,
        default_task_timeout_ms: args.default_task_timeout_ms,
        default_max_retries: args.default_max_retries,
        max_queue_size: args.max_queue_size,
        ..Default::default()
    };

    tracing::info!("Starting Taskfleet supervisor");
    tracing::info!("Binding to: {}", addr);
    tracing::info!("Routing strategy: {}", config.routing_strategy);

    let supervisor = Arc::new(Supervisor::new(config));
    supervisor.start();

    let server = SupervisorServer::new(supervisor.clone());
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("SIGINT received, shutting down");
    };

    // A bind failure propagates as Err and the process exits 1.
    server.run_with_shutdown(addr, shutdown).await?;

    supervisor.stop();
    tracing::info!("Supervisor stopped");
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_supervisor_defaults() {
        let cli: Cli = Cli::from_args(&["taskfleet"], &["supervisor"]).unwrap();
        match cli.command {
            Commands::Supervisor(args) => {
                assert_eq!(args.bind, "0.0.0.0:7070");
                assert_eq!(args.routing_strategy, RoutingStrategy::LeastLoaded);
                assert_eq!(args.heartbeat_interval_ms, 30_000);
                assert_eq!(args.missed_heartbeats_threshold, 3);
                assert_eq!(args.default_task_timeout_ms, 60_000);
                assert_eq!(args.default_max_retries, 2);
                assert_eq!(args.max_queue_size, 1_000);
            }
        }
    }

    #[test]
    fn test_cli_parse_supervisor_custom() {
        let cli: Cli = Cli::from_args(
            &["taskfleet"],
            &[
                "supervisor",
                "-b",
                "127.0.0.1:8080",
                "--routing-strategy",
                "capability-match",
                "--heartbeat-interval-ms",
                "10000",
                "--missed-heartbeats-threshold",
                "2",
                "--default-task-timeout-ms",
                "5000",
                "--default-max-retries",
                "0",
                "--max-queue-size",
                "50",
            ],
        )
        .unwrap();
        match cli.command {
            Commands::Supervisor(args) => {
                assert_eq!(args.bind, "127.0.0.1:8080");
                assert_eq!(args.routing_strategy, RoutingStrategy::CapabilityMatch);
                assert_eq!(args.heartbeat_interval_ms, 10_000);
                assert_eq!(args.missed_heartbeats_threshold, 2);
                assert_eq!(args.default_task_timeout_ms, 5_000);
                assert_eq!(args.default_max_retries, 0);
                assert_eq!(args.max_queue_size, 50);
            }
        }
    }

    #[test]
    fn test_cli_rejects_unknown_strategy() {
        let result = Cli::from_args(
            &["taskfleet"],
            &["supervisor", "--routing-strategy", "weighted"],
        );
        assert!(result.is_err());
    }
}
