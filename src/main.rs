use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ma_horizon::analysis::run_fetch_pipeline;
use ma_horizon::config::FetchConfig;
use ma_horizon::ma_trend::calc_ma_trend;
use ma_horizon::table::preview_table;
use ma_horizon::timefmt::parse_yyyymmddhh;
use ma_horizon::window::window_starts;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ma-horizon")]
#[command(about = "Fetch hourly candles and derive MA30/MA60 tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log pagination progress
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Page through candle history and write the MA csv
    Fetch(FetchArgs),

    /// Print the first hour of the MA30 and MA60 windows ending at HOUR
    Starts {
        /// End hour as YYYYMMDDHH
        hour: String,
    },

    /// Compare the last two MA rows at or before HOUR
    Trend {
        /// End hour as YYYYMMDDHH
        hour: String,

        /// Csv with timestamp,ma30,ma60 columns
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(clap::Args)]
struct FetchArgs {
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instrument id, e.g. SOL-USDT-SWAP
    #[arg(long)]
    inst_id: Option<String>,

    /// Days of MA rows to produce
    #[arg(long)]
    days: Option<u32>,

    /// Output csv path
    #[arg(short, long)]
    output: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Attempts per request
    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    base_url: Option<String>,

    /// HTTP/HTTPS proxy, e.g. http://127.0.0.1:7890
    #[arg(long)]
    proxy: Option<String>,

    /// Skip TLS certificate validation (diagnostics only)
    #[arg(long)]
    insecure: bool,

    /// Ceiling on page requests
    #[arg(long)]
    max_batches: Option<u32>,
}

impl FetchArgs {
    fn apply(self, mut config: FetchConfig) -> FetchConfig {
        if let Some(v) = self.inst_id {
            config.inst_id = v;
        }
        if let Some(v) = self.days {
            config.days = v;
        }
        if let Some(v) = self.output {
            config.output = v;
        }
        if let Some(v) = self.timeout {
            config.timeout_secs = v;
        }
        if let Some(v) = self.retries {
            config.retries = v;
        }
        if let Some(v) = self.base_url {
            config.base_url = v;
        }
        if self.proxy.is_some() {
            config.proxy = self.proxy;
        }
        if self.insecure {
            config.insecure = true;
        }
        if let Some(v) = self.max_batches {
            config.max_batches = v;
        }
        config
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Fetch(args) => {
            let base = match &args.config {
                Some(path) => FetchConfig::load(path)
                    .await
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => FetchConfig::default(),
            };
            let config = args.apply(base);

            let output = run_fetch_pipeline(&config).await?;
            println!("\n{}", preview_table(&output.rows, 10));
            if output.conflicts > 0 {
                eprintln!(
                    "warning: {} timestamp(s) had conflicting closes across pages",
                    output.conflicts
                );
            }
            println!("wrote {} rows to {}", output.rows.len(), config.output);
        }
        Commands::Starts { hour } => {
            let end = parse_yyyymmddhh(&hour)?;
            let starts = window_starts(end);
            let body = json!({
                "input": hour.trim(),
                "ma30_start": starts.ma30_start,
                "ma60_start": starts.ma60_start,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Trend { hour, csv } => {
            let end = parse_yyyymmddhh(&hour)?;
            let result = calc_ma_trend(end, &csv)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
