mod commands;
mod logging;
mod ui;
mod web;

use clap::{Args, Parser, Subcommand, ValueEnum};
use slo_core::backend::{PrometheusBackend, PrometheusConfig};
use slo_engine::config::DEFAULT_INTERVAL_SECONDS;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "slo-exporter")]
#[command(about = "Evaluates SLO error budgets against Prometheus and exports them as metrics", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Logging level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long = "log.level", alias = "log-level", global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long = "log.format", alias = "log-format", global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate objectives continuously and serve them on /metrics
    Run(RunArgs),

    /// Validate a config file and print the queries it renders
    Validate {
        /// Path to config file (YAML, TOML, or JSON)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Evaluate every objective once and print a summary
    Check(CheckArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to config file (YAML, TOML, or JSON)
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Seconds between evaluations, capped by each budget window
    #[arg(long = "interval.seconds", alias = "interval-seconds", default_value_t = DEFAULT_INTERVAL_SECONDS)]
    pub interval_seconds: u64,

    /// Address to listen on for web interface and telemetry
    #[arg(long = "web.listen-address", alias = "web-listen-address", default_value = "0.0.0.0:28180")]
    pub web_listen_address: String,

    /// Time allowed for in-flight work after a shutdown signal
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub graceful_shutdown_period: Duration,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Path to config file (YAML, TOML, or JSON)
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Args)]
pub struct BackendArgs {
    /// Prometheus base URL
    #[arg(long = "prometheus.url", alias = "prometheus-url", env = "PROMETHEUS_URL", default_value = "")]
    pub prometheus_url: String,

    /// Prometheus basic auth user
    #[arg(long = "prometheus.user", alias = "prometheus-user", env = "PROMETHEUS_USER")]
    pub prometheus_user: Option<String>,

    /// Prometheus basic auth password
    #[arg(long = "prometheus.password", alias = "prometheus-password", env = "PROMETHEUS_PASSWORD", hide_env_values = true)]
    pub prometheus_password: Option<String>,
}

impl BackendArgs {
    pub fn build(&self) -> anyhow::Result<PrometheusBackend> {
        let mut config = PrometheusConfig::new(self.prometheus_url.clone());

        if let Some(user) = self.prometheus_user.as_deref().filter(|u| !u.is_empty()) {
            config = config.basic_auth(user, self.prometheus_password.clone().unwrap_or_default());
        }

        Ok(PrometheusBackend::new(config)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // flushes buffered log lines on drop
    let _guard = logging::init(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Run(args) => {
            commands::run::execute(args).await?;
        }

        Commands::Validate { config } => {
            commands::validate::execute(config).await?;
        }

        Commands::Check(args) => {
            commands::check::execute(args).await?;
        }
    }

    Ok(())
}
