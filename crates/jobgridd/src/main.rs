//! jobgridd — the jobgrid daemon.
//!
//! Single binary that assembles the orchestrator:
//! - Resource telemetry sampler
//! - External scheduler bridge (SLURM or LSF, optional)
//! - Job lifecycle manager (dispatch + scheduler monitor)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! jobgridd serve --config /etc/jobgrid/jobgrid.toml --port 8080
//! jobgridd config --config /etc/jobgrid/jobgrid.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use jobgrid_core::DaemonConfig;

#[derive(Parser)]
#[command(name = "jobgridd", about = "Simulation job orchestrator daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator and serve the REST API.
    Serve {
        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on. Overrides `[server] port`.
        #[arg(long)]
        port: Option<u16>,

        /// Log output format.
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,

        /// Append every job event as a JSON line to this file.
        #[arg(long)]
        event_log: Option<PathBuf>,
    },
    /// Print the effective configuration and exit.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,jobgridd=debug,jobgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DaemonConfig> {
    match path {
        Some(p) => DaemonConfig::from_file(p),
        None => Ok(DaemonConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            log_format,
            event_log,
        } => {
            init_tracing(log_format);
            let mut config = load_config(config.as_ref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            daemon::run_serve(config, event_log).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
